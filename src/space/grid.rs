//! Compact spatial-extent descriptor for streamline files

use crate::core::types::{Mat4, Result, UVec3, Vec3};
use crate::space::ImageSpace;

/// Read-only snapshot of an [`ImageSpace`] embedded in a streamline file
///
/// Keeping the grid with the file makes the voxel coordinates stored there
/// reproducible without re-deriving them from the original scan. Created
/// once when a source or sink attaches to a file, immutable thereafter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridDescriptor {
    dim: UVec3,
    pixdim: Vec3,
    transform: Mat4,
}

impl GridDescriptor {
    /// Snapshot a grid from explicit fields, as decoded from a file header
    pub fn new(dim: UVec3, pixdim: Vec3, transform: Mat4) -> Self {
        Self { dim, pixdim, transform }
    }

    /// Snapshot the geometry of an image space
    pub fn from_space(space: &ImageSpace) -> Self {
        Self {
            dim: space.dim(),
            pixdim: space.pixdim(),
            transform: space.transform(),
        }
    }

    /// Rebuild a full image space from the snapshot
    pub fn to_space(&self) -> Result<ImageSpace> {
        ImageSpace::new(self.dim, self.pixdim, self.transform)
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip() {
        let space = ImageSpace::from_pixdim(UVec3::new(10, 12, 14), Vec3::new(1.0, 1.5, 2.0))
            .unwrap();
        let grid = GridDescriptor::from_space(&space);
        assert_eq!(grid.dim(), UVec3::new(10, 12, 14));
        assert_eq!(grid.pixdim(), Vec3::new(1.0, 1.5, 2.0));

        let rebuilt = grid.to_space().unwrap();
        assert_eq!(rebuilt.transform(), space.transform());
    }
}
