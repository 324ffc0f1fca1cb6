//! Voxel-visitation density map accumulation

use std::collections::HashSet;

use log::info;

use crate::core::types::{IVec3, Result, UVec3};
use crate::core::Error;
use crate::image::Image;
use crate::pipeline::DataSink;
use crate::space::{ImageSpace, PointType};
use crate::streamline::Streamline;

/// Accumulates per-voxel visit counts across streamlines
///
/// Each streamline increments a voxel at most once, however many of its
/// points fall there. Counting happens in voxel space; streamlines in other
/// representations are converted through an attached [`ImageSpace`], and
/// accumulating one without a space attached is an error. The finished map
/// is read back through [`map`](Self::map); exporting it to an image file
/// is the host's concern.
pub struct VisitationMapSink {
    map: Image<u32>,
    space: Option<ImageSpace>,
    streamlines: usize,
}

impl VisitationMapSink {
    /// Create a sink over a grid of the given dimensions
    pub fn new(dim: UVec3) -> Self {
        Self {
            map: Image::filled(dim, 0u32),
            space: None,
            streamlines: 0,
        }
    }

    /// Attach the image space used to convert non-voxel streamline points
    pub fn with_space(mut self, space: ImageSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// The accumulated density map
    pub fn map(&self) -> &Image<u32> {
        &self.map
    }

    /// Number of streamlines accumulated
    pub fn streamlines(&self) -> usize {
        self.streamlines
    }
}

impl DataSink<Streamline> for VisitationMapSink {
    fn put(&mut self, data: &Streamline) -> Result<()> {
        let representation = data.point_type().unwrap_or(PointType::Voxel);
        let mut visited: HashSet<IVec3> = HashSet::new();
        for &point in data.points() {
            let voxel = match representation {
                PointType::Voxel => point,
                other => self
                    .space
                    .as_ref()
                    .ok_or_else(|| {
                        Error::Image("no image space attached for non-voxel points".into())
                    })?
                    .to_voxel(point, other),
            };
            let rounded = voxel.round();
            let voxel = IVec3::new(rounded.x as i32, rounded.y as i32, rounded.z as i32);
            if voxel.min_element() < 0 || !visited.insert(voxel) {
                continue;
            }
            let loc = UVec3::new(voxel.x as u32, voxel.y as u32, voxel.z as u32);
            if let Some(count) = self.map.get_mut(loc) {
                *count += 1;
            }
        }
        self.streamlines += 1;
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        info!("visitation map accumulated over {} streamlines", self.streamlines);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;
    use crate::space::PointType;

    fn voxel_streamline(points: Vec<Vec3>) -> Streamline {
        let mut data = Streamline::new();
        data.set_points(points, PointType::Voxel, Vec3::ONE);
        data
    }

    #[test]
    fn test_counts_each_streamline_once_per_voxel() {
        let mut sink = VisitationMapSink::new(UVec3::new(8, 8, 8));

        // Two points in the same voxel still count once
        sink.put(&voxel_streamline(vec![
            Vec3::new(1.1, 1.0, 1.0),
            Vec3::new(0.9, 1.0, 1.0),
            Vec3::new(2.0, 1.0, 1.0),
        ]))
        .unwrap();
        sink.put(&voxel_streamline(vec![Vec3::new(1.0, 1.0, 1.0)])).unwrap();
        sink.done().unwrap();

        assert_eq!(*sink.map().get(UVec3::new(1, 1, 1)).unwrap(), 2);
        assert_eq!(*sink.map().get(UVec3::new(2, 1, 1)).unwrap(), 1);
        assert_eq!(*sink.map().get(UVec3::new(3, 1, 1)).unwrap(), 0);
        assert_eq!(sink.streamlines(), 2);
    }

    #[test]
    fn test_scaled_points_convert_through_space() {
        let dim = UVec3::new(8, 8, 8);
        let space = ImageSpace::from_pixdim(dim, Vec3::splat(2.0)).unwrap();
        let mut sink = VisitationMapSink::new(dim).with_space(space);

        let mut data = Streamline::new();
        data.set_points(vec![Vec3::new(6.0, 2.0, 4.0)], PointType::Scaled, Vec3::splat(2.0));
        sink.put(&data).unwrap();

        assert_eq!(*sink.map().get(UVec3::new(3, 1, 2)).unwrap(), 1);
        assert_eq!(*sink.map().get(UVec3::new(6, 2, 4)).unwrap(), 0);
    }

    #[test]
    fn test_non_voxel_points_without_space_error() {
        let mut sink = VisitationMapSink::new(UVec3::new(8, 8, 8));
        let mut data = Streamline::new();
        data.set_points(vec![Vec3::ONE], PointType::World, Vec3::ONE);
        assert!(sink.put(&data).is_err());
    }

    #[test]
    fn test_out_of_range_points_ignored() {
        let mut sink = VisitationMapSink::new(UVec3::new(4, 4, 4));
        sink.put(&voxel_streamline(vec![Vec3::new(-2.0, 0.0, 0.0), Vec3::splat(9.0)]))
            .unwrap();
        assert!(sink.map().data().iter().all(|&v| v == 0));
    }
}
