//! Dense volumetric grids over an image space

use crate::core::types::{Result, UVec3, Vec3};
use crate::core::Error;
use crate::space::{ImageSpace, PointType};

/// Dense 3D voxel grid with the first index moving fastest
///
/// Optionally carries the [`ImageSpace`] it was sampled in, which enables
/// point-based lookup in any coordinate representation.
#[derive(Clone, Debug)]
pub struct Image<T> {
    dim: UVec3,
    data: Vec<T>,
    space: Option<ImageSpace>,
}

impl<T: Clone> Image<T> {
    /// Create an image filled with a constant value
    pub fn filled(dim: UVec3, value: T) -> Self {
        let size = (dim.x * dim.y * dim.z) as usize;
        Self {
            dim,
            data: vec![value; size],
            space: None,
        }
    }
}

impl<T> Image<T> {
    /// Create an image from existing data in x-fastest order
    pub fn from_data(dim: UVec3, data: Vec<T>) -> Result<Self> {
        let size = (dim.x * dim.y * dim.z) as usize;
        if data.len() != size {
            return Err(Error::Image(format!(
                "data size {} does not match dimensions {:?}",
                data.len(),
                dim
            )));
        }
        Ok(Self { dim, data, space: None })
    }

    /// Attach the image space the grid was sampled in
    pub fn with_space(mut self, space: ImageSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// Grid dimensions
    pub fn dim(&self) -> UVec3 {
        self.dim
    }

    /// The attached image space, if any
    pub fn space(&self) -> Option<&ImageSpace> {
        self.space.as_ref()
    }

    /// Total number of voxels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the grid is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw voxel data in x-fastest order
    pub fn data(&self) -> &[T] {
        &self.data
    }

    fn flatten(&self, loc: UVec3) -> usize {
        (loc.x + self.dim.x * (loc.y + self.dim.y * loc.z)) as usize
    }

    /// Bounds-checked voxel access
    pub fn get(&self, loc: UVec3) -> Option<&T> {
        if loc.x < self.dim.x && loc.y < self.dim.y && loc.z < self.dim.z {
            Some(&self.data[self.flatten(loc)])
        } else {
            None
        }
    }

    /// Bounds-checked mutable voxel access
    pub fn get_mut(&mut self, loc: UVec3) -> Option<&mut T> {
        if loc.x < self.dim.x && loc.y < self.dim.y && loc.z < self.dim.z {
            let index = self.flatten(loc);
            Some(&mut self.data[index])
        } else {
            None
        }
    }

    /// Look up the voxel containing a point, resolving the point through the
    /// attached space with conventional rounding
    ///
    /// Returns `None` when the point falls outside the grid. Errors when no
    /// space is attached.
    pub fn value_at(&self, point: Vec3, from: PointType) -> Result<Option<&T>> {
        let space = self
            .space
            .as_ref()
            .ok_or_else(|| Error::Image("no image space is attached".into()))?;
        let voxel = space.to_voxel(point, from).round();
        if voxel.min_element() < 0.0 {
            return Ok(None);
        }
        Ok(self.get(UVec3::new(voxel.x as u32, voxel.y as u32, voxel.z as u32)))
    }
}

/// Element layout of an imported volume buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// One value per voxel
    Scalar,
    /// Three concatenated scalar volumes forming one vector per voxel
    Vector,
}

/// An imported volume, scalar- or vector-valued
#[derive(Clone, Debug)]
pub enum VolumeData {
    Scalar(Image<f32>),
    Vector(Image<Vec3>),
}

/// Import a flat buffer from a volumetric data provider
///
/// Dispatches one conversion per element kind: scalar buffers map directly,
/// vector buffers are expected FSL-style (three whole scalar volumes
/// back to back).
pub fn import_volume(kind: ElementKind, dim: UVec3, buffer: &[f32]) -> Result<VolumeData> {
    let volume = (dim.x * dim.y * dim.z) as usize;
    match kind {
        ElementKind::Scalar => {
            let image = Image::from_data(dim, buffer.to_vec())?;
            Ok(VolumeData::Scalar(image))
        }
        ElementKind::Vector => {
            if buffer.len() != volume * 3 {
                return Err(Error::Image(format!(
                    "vector buffer length {} is not three volumes of {}",
                    buffer.len(),
                    volume
                )));
            }
            let data = (0..volume)
                .map(|i| Vec3::new(buffer[i], buffer[i + volume], buffer[i + 2 * volume]))
                .collect();
            let image = Image::from_data(dim, data)?;
            Ok(VolumeData::Vector(image))
        }
    }
}
