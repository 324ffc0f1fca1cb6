//! The core streamline record

use std::collections::BTreeSet;

use crate::core::types::Vec3;
use crate::space::PointType;

/// One fiber-tracking path: an ordered sequence of 3D points with optional
/// per-point scalar properties and the set of region labels it passed through
///
/// Points carry an explicit coordinate representation. `voxel_dims` records
/// the voxel sizes the points were generated under, so that path lengths can
/// be reported in world units for voxel-space points. The seed index marks
/// the point the path was grown from; for a non-empty streamline it is
/// always a valid point index.
#[derive(Clone, Debug, Default)]
pub struct Streamline {
    points: Vec<Vec3>,
    point_type: Option<PointType>,
    voxel_dims: Vec3,
    seed_index: usize,
    labels: BTreeSet<i32>,
    property_names: Vec<String>,
    point_properties: Vec<Vec<f32>>,
    properties: Vec<f32>,
}

impl Streamline {
    /// Create an empty streamline
    pub fn new() -> Self {
        Self {
            voxel_dims: Vec3::ONE,
            ..Default::default()
        }
    }

    /// Assemble a streamline from two half-lines grown in opposite
    /// directions from the same seed
    ///
    /// `left` runs from the point after the seed outwards; it is reversed
    /// and prepended to `right`, which starts at the seed. The seed index
    /// marks the join.
    pub fn from_halves(
        left: Vec<Vec3>,
        right: Vec<Vec3>,
        point_type: PointType,
        voxel_dims: Vec3,
    ) -> Self {
        let seed_index = left.len();
        let mut points = left;
        points.reverse();
        points.extend(right);
        Self {
            points,
            point_type: Some(point_type),
            voxel_dims,
            seed_index,
            ..Default::default()
        }
    }

    /// Points in path order
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the path has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinate representation of the points, if any have been set
    pub fn point_type(&self) -> Option<PointType> {
        self.point_type
    }

    /// Voxel sizes the points were generated under
    pub fn voxel_dims(&self) -> Vec3 {
        self.voxel_dims
    }

    /// Index of the seed point
    pub fn seed_index(&self) -> usize {
        self.seed_index
    }

    /// Set the seed index; must be a valid point index when non-empty
    pub fn set_seed_index(&mut self, index: usize) {
        debug_assert!(self.points.is_empty() || index < self.points.len());
        self.seed_index = index;
    }

    /// Append a point, fixing the representation on first use
    pub fn push(&mut self, point: Vec3, point_type: PointType) {
        debug_assert!(self.point_type.is_none() || self.point_type == Some(point_type));
        self.point_type = Some(point_type);
        self.points.push(point);
    }

    /// Replace all points at once
    pub fn set_points(&mut self, points: Vec<Vec3>, point_type: PointType, voxel_dims: Vec3) {
        self.points = points;
        self.point_type = Some(point_type);
        self.voxel_dims = voxel_dims;
        if self.seed_index >= self.points.len() {
            self.seed_index = 0;
        }
    }

    /// Visited region labels
    pub fn labels(&self) -> &BTreeSet<i32> {
        &self.labels
    }

    /// Record a visited region label
    pub fn add_label(&mut self, label: i32) {
        self.labels.insert(label);
    }

    /// Replace the label set
    pub fn set_labels(&mut self, labels: BTreeSet<i32>) {
        self.labels = labels;
    }

    /// Names of the per-point scalar properties
    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    /// Per-point scalar property values, one vector per point
    pub fn point_properties(&self) -> &[Vec<f32>] {
        &self.point_properties
    }

    /// Per-streamline scalar property values
    pub fn properties(&self) -> &[f32] {
        &self.properties
    }

    /// Set the per-point properties (one value vector per point)
    pub fn set_point_properties(&mut self, names: Vec<String>, values: Vec<Vec<f32>>) {
        debug_assert!(values.is_empty() || values.len() == self.points.len());
        self.property_names = names;
        self.point_properties = values;
    }

    /// Set the per-streamline properties
    pub fn set_properties(&mut self, values: Vec<f32>) {
        self.properties = values;
    }

    /// Total path length in world units
    ///
    /// Voxel-space points are scaled per axis by the stored voxel sizes;
    /// scaled and world points are measured directly.
    pub fn length(&self) -> f32 {
        let scale = match self.point_type {
            Some(PointType::Voxel) => self.voxel_dims,
            _ => Vec3::ONE,
        };
        self.points
            .windows(2)
            .map(|pair| ((pair[1] - pair[0]) * scale).length())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_halves_seed_at_join() {
        let left = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)];
        let right = vec![Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.0)];
        let streamline = Streamline::from_halves(left, right, PointType::Voxel, Vec3::ONE);

        assert_eq!(streamline.len(), 4);
        assert_eq!(streamline.seed_index(), 2);
        assert_eq!(streamline.points()[0], Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(streamline.points()[2], Vec3::ZERO);
    }

    #[test]
    fn test_length_scales_voxel_points() {
        let mut streamline = Streamline::new();
        streamline.set_points(
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)],
            PointType::Voxel,
            Vec3::new(2.0, 3.0, 1.0),
        );
        assert!((streamline.length() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_length_world_points_direct() {
        let mut streamline = Streamline::new();
        streamline.set_points(
            vec![Vec3::ZERO, Vec3::new(0.0, 4.0, 3.0)],
            PointType::World,
            Vec3::splat(2.0),
        );
        assert!((streamline.length() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_labels_are_distinct() {
        let mut streamline = Streamline::new();
        streamline.add_label(4);
        streamline.add_label(4);
        streamline.add_label(2);
        assert_eq!(streamline.labels().len(), 2);
    }
}
