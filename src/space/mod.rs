//! Voxel/world geometry and transform math

pub mod grid;

pub use grid::GridDescriptor;

use crate::core::types::{Mat3, Mat4, Result, UVec3, Vec3};
use crate::core::Error;
use rand::Rng;

/// Determinant magnitude below which a transform is treated as singular
const SINGULAR_EPSILON: f32 = 1e-6;

/// Location conventions: voxel-indexed, scaled for voxel dimensions only (as
/// with a diagonal transform), or world coordinates fully respecting it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointType {
    Voxel,
    Scaled,
    World,
}

/// Rounding strategies: none, conventional for nearest-neighbour, or
/// probabilistic for stochastic nearest neighbour (probabilities
/// proportional to distance)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundingType {
    None,
    Conventional,
    Probabilistic,
}

/// Positive-direction NIfTI orientation codes per world axis (x, y, z)
const ORIENTATION_POSITIVE: [char; 3] = ['R', 'A', 'S'];
/// Negative-direction counterparts
const ORIENTATION_NEGATIVE: [char; 3] = ['L', 'P', 'I'];

/// Voxel grid geometry: dimensions, voxel sizes, and the affine transform
/// from voxel indices to world coordinates
///
/// The inverse transform is precomputed at construction; a singular
/// transform is rejected with [`Error::InvalidTransform`].
#[derive(Clone, Debug)]
pub struct ImageSpace {
    dim: UVec3,
    pixdim: Vec3,
    transform: Mat4,
    inverse: Mat4,
}

impl ImageSpace {
    /// Create a space from explicit dimensions, voxel sizes and transform
    pub fn new(dim: UVec3, pixdim: Vec3, transform: Mat4) -> Result<Self> {
        if transform.determinant().abs() < SINGULAR_EPSILON {
            return Err(Error::InvalidTransform);
        }
        Ok(Self {
            dim,
            pixdim,
            transform,
            inverse: transform.inverse(),
        })
    }

    /// Create a space with a diagonal transform derived from the voxel sizes
    pub fn from_pixdim(dim: UVec3, pixdim: Vec3) -> Result<Self> {
        Self::new(dim, pixdim, Mat4::from_scale(pixdim))
    }

    /// Create a space with unit voxels and an identity transform
    pub fn from_dim(dim: UVec3) -> Self {
        Self {
            dim,
            pixdim: Vec3::ONE,
            transform: Mat4::IDENTITY,
            inverse: Mat4::IDENTITY,
        }
    }

    /// Grid dimensions
    pub fn dim(&self) -> UVec3 {
        self.dim
    }

    /// Voxel sizes
    pub fn pixdim(&self) -> Vec3 {
        self.pixdim
    }

    /// Voxel-to-world affine transform
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Convert a point in any representation to fractional voxel space
    ///
    /// Out-of-range voxel indices are not detected here; bounds checking is
    /// the caller's responsibility.
    pub fn to_voxel(&self, point: Vec3, from: PointType) -> Vec3 {
        match from {
            PointType::Voxel => point,
            PointType::Scaled => point / self.pixdim,
            PointType::World => self.inverse.transform_point3(point),
        }
    }

    /// Convert a fractional voxel point to world coordinates
    pub fn to_world(&self, voxel: Vec3) -> Vec3 {
        self.transform.transform_point3(voxel)
    }

    /// Convert a fractional voxel point to scaled-voxel coordinates
    pub fn to_scaled(&self, voxel: Vec3) -> Vec3 {
        voxel * self.pixdim
    }

    /// Three-character anatomical axis code (e.g. "LAS") for the transform
    ///
    /// Each voxel axis maps to the world axis its transform column is most
    /// aligned with, signed by the direction of increase.
    pub fn orientation(&self) -> String {
        let rotation = Mat3::from_mat4(self.transform);
        let mut code = String::with_capacity(3);
        for axis in 0..3 {
            let column = rotation.col(axis);
            let components = [column.x, column.y, column.z];
            let mut dominant = 0;
            for world_axis in 1..3 {
                if components[world_axis].abs() > components[dominant].abs() {
                    dominant = world_axis;
                }
            }
            if components[dominant] >= 0.0 {
                code.push(ORIENTATION_POSITIVE[dominant]);
            } else {
                code.push(ORIENTATION_NEGATIVE[dominant]);
            }
        }
        code
    }
}

/// Apply a rounding policy to a fractional voxel coordinate
///
/// Probabilistic rounding chooses between floor and ceiling independently
/// per axis, with probability inversely proportional to the distance to each
/// neighbouring integer, so that repeated sampling near a voxel boundary
/// yields unbiased voxel selection.
pub fn round_point<R: Rng>(point: Vec3, rounding: RoundingType, rng: &mut R) -> Vec3 {
    match rounding {
        RoundingType::None => point,
        RoundingType::Conventional => point.round(),
        RoundingType::Probabilistic => {
            let floor = point.floor();
            let frac = point - floor;
            Vec3::new(
                floor.x + if rng.gen_range(0.0..1.0) < frac.x { 1.0 } else { 0.0 },
                floor.y + if rng.gen_range(0.0..1.0) < frac.y { 1.0 } else { 0.0 },
                floor.z + if rng.gen_range(0.0..1.0) < frac.z { 1.0 } else { 0.0 },
            )
        }
    }
}

/// Euclidean norm of a vector
pub fn norm(vector: Vec3) -> f32 {
    vector.length()
}

/// Inner product of two vectors
pub fn dot(first: Vec3, second: Vec3) -> f32 {
    first.dot(second)
}

/// Step vector from one point to another
pub fn step(from: Vec3, to: Vec3) -> Vec3 {
    to - from
}

/// Convert spherical coordinates (radius, polar angle, azimuth) to Cartesian
pub fn spherical_to_cartesian(spherical: Vec3) -> Vec3 {
    let (r, theta, phi) = (spherical.x, spherical.y, spherical.z);
    Vec3::new(
        r * theta.sin() * phi.cos(),
        r * theta.sin() * phi.sin(),
        r * theta.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_space() -> ImageSpace {
        // Axis-flipped transform with an offset, typical of scanner space
        let transform = Mat4::from_cols_array(&[
            -2.0, 0.0, 0.0, 0.0,
            0.0, 2.0, 0.0, 0.0,
            0.0, 0.0, 2.5, 0.0,
            90.0, -126.0, -72.0, 1.0,
        ]);
        ImageSpace::new(UVec3::new(96, 96, 60), Vec3::new(2.0, 2.0, 2.5), transform).unwrap()
    }

    #[test]
    fn test_singular_transform_rejected() {
        let result = ImageSpace::new(UVec3::ONE, Vec3::ONE, Mat4::ZERO);
        assert!(matches!(result, Err(Error::InvalidTransform)));
    }

    #[test]
    fn test_world_voxel_roundtrip() {
        let space = test_space();
        let point = Vec3::new(12.25, 40.5, 7.75);
        let world = space.to_world(point);
        let back = space.to_voxel(world, PointType::World);
        assert!((back - point).length() < 1e-4);
    }

    #[test]
    fn test_scaled_conversion_ignores_rotation() {
        let space = test_space();
        let voxel = Vec3::new(3.0, 4.0, 5.0);
        let scaled = space.to_scaled(voxel);
        assert_eq!(scaled, Vec3::new(6.0, 8.0, 12.5));
        assert_eq!(space.to_voxel(scaled, PointType::Scaled), voxel);
    }

    #[test]
    fn test_conventional_rounding() {
        let mut rng = StdRng::seed_from_u64(1);
        let rounded = round_point(Vec3::new(1.4, 2.6, -0.5), RoundingType::Conventional, &mut rng);
        assert_eq!(rounded, Vec3::new(1.0, 3.0, -1.0));
    }

    #[test]
    fn test_probabilistic_rounding_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let point = Vec3::new(0.25, 0.75, 3.0);
        let trials = 10_000;
        let mut up = [0u32; 3];
        for _ in 0..trials {
            let rounded = round_point(point, RoundingType::Probabilistic, &mut rng);
            if rounded.x > 0.5 {
                up[0] += 1;
            }
            if rounded.y > 0.5 {
                up[1] += 1;
            }
            assert_eq!(rounded.z, 3.0);
        }
        let x_rate = up[0] as f32 / trials as f32;
        let y_rate = up[1] as f32 / trials as f32;
        assert!((x_rate - 0.25).abs() < 0.02);
        assert!((y_rate - 0.75).abs() < 0.02);
    }

    #[test]
    fn test_orientation_code() {
        let space = test_space();
        assert_eq!(space.orientation(), "LAS");

        let identity = ImageSpace::from_dim(UVec3::ONE);
        assert_eq!(identity.orientation(), "RAS");
    }

    #[test]
    fn test_spherical_to_cartesian() {
        use std::f32::consts::FRAC_PI_2;
        let cartesian = spherical_to_cartesian(Vec3::new(2.0, FRAC_PI_2, 0.0));
        assert!((cartesian - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);

        let pole = spherical_to_cartesian(Vec3::new(1.0, 0.0, 0.0));
        assert!((pole - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_vector_helpers() {
        assert_eq!(norm(Vec3::new(3.0, 4.0, 0.0)), 5.0);
        assert_eq!(dot(Vec3::X, Vec3::Y), 0.0);
        assert_eq!(step(Vec3::ONE, Vec3::splat(3.0)), Vec3::splat(2.0));
    }
}
