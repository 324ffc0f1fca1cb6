//! TrackVis (.trk) streamline codec
//!
//! The primary geometry format: a fixed 1000-byte header carrying grid
//! dimensions, voxel sizes, the voxel-to-world transform and property name
//! tables, followed by one variable-length record per streamline. Point
//! coordinates are stored in scaled-voxel space using the voxel-center
//! convention, `scaled = (voxel + 0.5) * pixdim`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, SeekFrom};
use std::path::PathBuf;

use log::debug;

use crate::core::types::{Mat4, Result, UVec3, Vec3};
use crate::core::Error;
use crate::files::binary::{BinaryReader, BinaryWriter, Endianness};
use crate::files::{HandleState, StreamlineFileReader, StreamlineFileWriter};
use crate::space::{GridDescriptor, ImageSpace, PointType};
use crate::streamline::Streamline;

/// Total header size; doubles as the format's byte-order sentinel
const HEADER_SIZE: i32 = 1000;
/// Byte offset of the streamline count field in the header
const COUNT_OFFSET: u64 = 988;
/// The header reserves ten 20-character name slots per table
const NAME_SLOTS: usize = 10;
const NAME_LENGTH: usize = 20;
/// Per-streamline property slot used to carry the seed point index
const SEED_PROPERTY: &str = "seed";

const MAGIC: &[u8; 6] = b"TRACK\0";

fn other(endianness: Endianness) -> Endianness {
    match endianness {
        Endianness::Little => Endianness::Big,
        Endianness::Big => Endianness::Little,
    }
}

/// Decoded header fields shared by the reader and the append path
struct Header {
    grid: GridDescriptor,
    scalar_names: Vec<String>,
    property_names: Vec<String>,
    count: usize,
    endianness: Endianness,
}

fn read_header(stream: &mut BinaryReader<BufReader<File>>) -> Result<Header> {
    let mut endianness = Endianness::native();
    stream.set_endianness(endianness);

    // The declared header size doubles as an endianness sentinel
    stream.seek(SeekFrom::Start(996))?;
    let header_size: i32 = stream.read_value()?;
    if header_size != HEADER_SIZE {
        if header_size.swap_bytes() == HEADER_SIZE {
            endianness = other(endianness);
            stream.set_endianness(endianness);
        } else {
            return Err(Error::Format(format!(
                "unexpected trackvis header size {header_size}"
            )));
        }
    }

    stream.seek(SeekFrom::Start(0))?;
    let magic = stream.read_bytes(6)?;
    if magic != MAGIC {
        return Err(Error::Format("not a trackvis file".into()));
    }

    let dim: Vec<i32> = stream.read_vector::<i16, i32>(3)?;
    if dim.iter().any(|&d| d < 0) {
        return Err(Error::Format(format!("negative grid dimension in {dim:?}")));
    }
    let voxel_size: Vec<f32> = stream.read_vector::<f32, f32>(3)?;
    let _origin: Vec<f32> = stream.read_vector::<f32, f32>(3)?;

    let n_scalars: i16 = stream.read_value()?;
    let mut scalar_names = Vec::new();
    for slot in 0..NAME_SLOTS {
        let name = stream.read_string_fixed(NAME_LENGTH)?;
        if slot < n_scalars as usize {
            scalar_names.push(name);
        }
    }

    let n_properties: i16 = stream.read_value()?;
    let mut property_names = Vec::new();
    for slot in 0..NAME_SLOTS {
        let name = stream.read_string_fixed(NAME_LENGTH)?;
        if slot < n_properties as usize {
            property_names.push(name);
        }
    }

    if n_scalars < 0 || n_scalars as usize > NAME_SLOTS
        || n_properties < 0 || n_properties as usize > NAME_SLOTS
    {
        return Err(Error::Format(format!(
            "implausible scalar/property counts {n_scalars}/{n_properties}"
        )));
    }

    // Stored row-major; glam matrices are column-major
    let elements: Vec<f32> = stream.read_vector::<f32, f32>(16)?;
    let mut array = [0.0f32; 16];
    array.copy_from_slice(&elements);
    let mut transform = Mat4::from_cols_array(&array).transpose();
    if transform.w_axis.w == 0.0 {
        // Version 1 files leave the transform zeroed; fall back to a
        // diagonal transform from the voxel sizes
        transform = Mat4::from_scale(Vec3::new(voxel_size[0], voxel_size[1], voxel_size[2]));
    }

    stream.seek(SeekFrom::Start(COUNT_OFFSET))?;
    let count: i32 = stream.read_value()?;
    let version: i32 = stream.read_value()?;
    if !(1..=2).contains(&version) {
        return Err(Error::Format(format!("unsupported trackvis version {version}")));
    }
    stream.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

    Ok(Header {
        grid: GridDescriptor::new(
            UVec3::new(dim[0] as u32, dim[1] as u32, dim[2] as u32),
            Vec3::new(voxel_size[0], voxel_size[1], voxel_size[2]),
            transform,
        ),
        scalar_names,
        property_names,
        count: count.max(0) as usize,
        endianness,
    })
}

/// Reader for TrackVis streamline files
pub struct TrackvisReader {
    path: PathBuf,
    stream: BinaryReader<BufReader<File>>,
    state: HandleState,
    point_type: PointType,
    grid: Option<GridDescriptor>,
    space: Option<ImageSpace>,
    scalar_names: Vec<String>,
    property_names: Vec<String>,
    count: usize,
}

impl TrackvisReader {
    /// Create an unopened reader for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: BinaryReader::new(),
            state: HandleState::Unopened,
            point_type: PointType::Voxel,
            grid: None,
            space: None,
            scalar_names: Vec::new(),
            property_names: Vec::new(),
            count: 0,
        }
    }

    /// Choose the coordinate representation decoded points are returned in
    pub fn with_point_type(mut self, point_type: PointType) -> Self {
        self.point_type = point_type;
        self
    }

    /// Names of the per-point scalar properties
    pub fn scalar_names(&self) -> &[String] {
        &self.scalar_names
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Unopened => Err(Error::Format("file has not been opened".into())),
            HandleState::Closed => Err(Error::Closed),
        }
    }

    fn grid_or_err(&self) -> Result<&GridDescriptor> {
        self.grid
            .as_ref()
            .ok_or_else(|| Error::Format("no grid descriptor available".into()))
    }
}

impl StreamlineFileReader for TrackvisReader {
    fn open(&mut self) -> Result<()> {
        if self.state == HandleState::Closed {
            return Err(Error::Closed);
        }
        let file = File::open(&self.path)?;
        self.stream.attach(BufReader::new(file));

        let header = read_header(&mut self.stream)?;
        self.space = header.grid.to_space().ok();
        self.grid = Some(header.grid);
        self.scalar_names = header.scalar_names;
        self.property_names = header.property_names;
        self.count = header.count;
        self.state = HandleState::Open;
        debug!(
            "opened {:?}: {} streamlines, {} scalars, {} properties",
            self.path,
            self.count,
            self.scalar_names.len(),
            self.property_names.len()
        );
        Ok(())
    }

    fn count(&self) -> usize {
        self.count
    }

    fn property_names(&self) -> &[String] {
        &self.property_names
    }

    fn grid(&self) -> Option<&GridDescriptor> {
        self.grid.as_ref()
    }

    fn data_offset(&self) -> u64 {
        HEADER_SIZE as u64
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.check_open()?;
        self.stream.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self) -> Result<Streamline> {
        self.check_open()?;
        let pixdim = self.grid_or_err()?.pixdim();

        let n_points: i32 = self.stream.read_value()?;
        if n_points < 0 {
            return Err(Error::Format(format!("negative point count {n_points}")));
        }

        let n_scalars = self.scalar_names.len();
        let mut points = Vec::with_capacity(n_points as usize);
        let mut point_properties = Vec::new();
        for _ in 0..n_points {
            let coords: Vec<f32> = self.stream.read_vector::<f32, f32>(3)?;
            let scaled = Vec3::new(coords[0], coords[1], coords[2]);
            let voxel = scaled / pixdim - 0.5;
            let point = match self.point_type {
                PointType::Voxel => voxel,
                PointType::Scaled => scaled,
                PointType::World => self
                    .space
                    .as_ref()
                    .ok_or_else(|| Error::Format("grid transform is singular".into()))?
                    .to_world(voxel),
            };
            points.push(point);
            if n_scalars > 0 {
                point_properties.push(self.stream.read_vector::<f32, f32>(n_scalars)?);
            }
        }

        let properties: Vec<f32> = self
            .stream
            .read_vector::<f32, f32>(self.property_names.len())?;

        let mut data = Streamline::new();
        data.set_points(points, self.point_type, pixdim);
        if n_scalars > 0 {
            data.set_point_properties(self.scalar_names.clone(), point_properties);
        }
        if let Some(index) = self.property_names.iter().position(|n| n == SEED_PROPERTY) {
            let seed = properties[index].round().max(0.0) as usize;
            data.set_seed_index(seed.min(data.len().saturating_sub(1)));
        }
        data.set_properties(properties);
        Ok(data)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.check_open()?;
        // Record sizes are derivable from the per-record point count, so
        // skipping is offset arithmetic rather than decode-and-discard
        let point_size = (3 + self.scalar_names.len()) * 4;
        let trailer = self.property_names.len() * 4;
        for _ in 0..n {
            let n_points: i32 = self.stream.read_value()?;
            if n_points < 0 {
                return Err(Error::Format(format!("negative point count {n_points}")));
            }
            let advance = n_points as i64 * point_size as i64 + trailer as i64;
            self.stream.seek(SeekFrom::Current(advance))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream.detach();
        self.state = HandleState::Closed;
        Ok(())
    }
}

/// Writer for TrackVis streamline files
///
/// `open` writes a placeholder header (or validates an existing one when
/// appending); `close` rewrites the final streamline count.
pub struct TrackvisWriter {
    path: PathBuf,
    stream: BinaryWriter<BufWriter<File>>,
    state: HandleState,
    grid: GridDescriptor,
    space: Option<ImageSpace>,
    scalar_names: Vec<String>,
    property_names: Vec<String>,
    count: usize,
}

impl TrackvisWriter {
    /// Create an unopened writer for the given path and grid
    pub fn new(path: impl Into<PathBuf>, grid: GridDescriptor) -> Self {
        Self {
            path: path.into(),
            stream: BinaryWriter::new(),
            state: HandleState::Unopened,
            space: grid.to_space().ok(),
            grid,
            scalar_names: Vec::new(),
            property_names: vec![SEED_PROPERTY.to_owned()],
            count: 0,
        }
    }

    /// Declare named per-point scalar properties for every record
    pub fn with_scalars(mut self, names: Vec<String>) -> Self {
        self.scalar_names = names;
        self
    }

    /// Declare additional per-streamline properties beyond the seed index
    pub fn with_properties(mut self, names: Vec<String>) -> Self {
        for name in names {
            if !self.property_names.contains(&name) {
                self.property_names.push(name);
            }
        }
        self
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Unopened => Err(Error::Format("file has not been opened".into())),
            HandleState::Closed => Err(Error::Closed),
        }
    }

    fn write_header(&mut self) -> Result<()> {
        if self.scalar_names.len() > NAME_SLOTS || self.property_names.len() > NAME_SLOTS {
            return Err(Error::Format(format!(
                "at most {NAME_SLOTS} scalar or property names are representable"
            )));
        }

        let dim = self.grid.dim();
        let pixdim = self.grid.pixdim();
        let orientation = match &self.space {
            Some(space) => space.orientation(),
            None => "RAS".to_owned(),
        };

        self.stream.write_bytes(MAGIC)?;
        self.stream
            .write_vector::<i16, i32>(&[dim.x as i32, dim.y as i32, dim.z as i32])?;
        self.stream
            .write_vector::<f32, f32>(&[pixdim.x, pixdim.y, pixdim.z])?;
        self.stream.write_vector::<f32, f32>(&[0.0; 3])?; // origin

        self.stream.write_value(self.scalar_names.len() as i16)?;
        for slot in 0..NAME_SLOTS {
            let name = self.scalar_names.get(slot).map(String::as_str).unwrap_or("");
            self.stream.write_string_fixed(name, NAME_LENGTH)?;
        }

        self.stream.write_value(self.property_names.len() as i16)?;
        for slot in 0..NAME_SLOTS {
            let name = self.property_names.get(slot).map(String::as_str).unwrap_or("");
            self.stream.write_string_fixed(name, NAME_LENGTH)?;
        }

        // Stored row-major
        let elements = self.grid.transform().transpose().to_cols_array();
        self.stream.write_vector::<f32, f32>(&elements)?;

        self.stream.write_bytes(&[0u8; 444])?; // reserved
        self.stream.write_string_fixed(&orientation, 4)?;
        self.stream.write_bytes(&[0u8; 4])?; // pad2
        self.stream.write_vector::<f32, f32>(&[0.0; 6])?; // image orientation
        self.stream.write_bytes(&[0u8; 2])?; // pad1
        self.stream.write_bytes(&[0u8; 6])?; // invert/swap flags
        self.stream.write_value(0i32)?; // count placeholder
        self.stream.write_value(2i32)?; // version
        self.stream.write_value(HEADER_SIZE)?;
        Ok(())
    }

    fn to_scaled(&self, point: Vec3, from: PointType) -> Result<Vec3> {
        let pixdim = self.grid.pixdim();
        let voxel = match from {
            PointType::Voxel => point,
            PointType::Scaled => return Ok(point),
            PointType::World => self
                .space
                .as_ref()
                .ok_or_else(|| Error::Format("grid transform is singular".into()))?
                .to_voxel(point, PointType::World),
        };
        Ok((voxel + 0.5) * pixdim)
    }
}

impl StreamlineFileWriter for TrackvisWriter {
    fn open(&mut self, append: bool) -> Result<()> {
        if self.state == HandleState::Closed {
            return Err(Error::Closed);
        }

        if append {
            // Validate the existing header and inherit its count
            let mut probe = BinaryReader::attached(BufReader::new(File::open(&self.path)?));
            let header = read_header(&mut probe)?;
            if header.scalar_names != self.scalar_names
                || header.property_names != self.property_names
            {
                return Err(Error::Format(
                    "existing file declares different scalar or property names".into(),
                ));
            }
            if header.endianness != Endianness::native() {
                return Err(Error::Format(
                    "appending to a byte-swapped file is unsupported".into(),
                ));
            }
            self.count = header.count;
            let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
            self.stream.attach(BufWriter::new(file));
            self.stream.seek(SeekFrom::End(0))?;
        } else {
            let file = File::create(&self.path)?;
            self.stream.attach(BufWriter::new(file));
            self.count = 0;
            self.write_header()?;
        }
        self.state = HandleState::Open;
        Ok(())
    }

    fn write(&mut self, data: &Streamline) -> Result<u64> {
        self.check_open()?;
        let offset = self.stream.position()?;

        let from = data.point_type().unwrap_or(PointType::Voxel);
        let n_scalars = self.scalar_names.len();
        if n_scalars > 0 && data.point_properties().len() != data.len() {
            return Err(Error::Format(format!(
                "streamline carries {} per-point property vectors for {} points",
                data.point_properties().len(),
                data.len()
            )));
        }

        self.stream.write_value(data.len() as i32)?;
        for (index, &point) in data.points().iter().enumerate() {
            let scaled = self.to_scaled(point, from)?;
            self.stream
                .write_vector::<f32, f32>(&[scaled.x, scaled.y, scaled.z])?;
            for slot in 0..n_scalars {
                let value = data.point_properties()[index].get(slot).copied().unwrap_or(0.0);
                self.stream.write_value(value)?;
            }
        }

        for (index, name) in self.property_names.iter().enumerate() {
            // Values align positionally with the header's property table;
            // the seed slot is always refreshed from the record itself
            let value = if name == SEED_PROPERTY {
                data.seed_index() as f32
            } else {
                data.properties().get(index).copied().unwrap_or(0.0)
            };
            self.stream.write_value(value)?;
        }

        self.count += 1;
        Ok(offset)
    }

    fn count(&self) -> usize {
        self.count
    }

    fn close(&mut self) -> Result<()> {
        if self.state == HandleState::Closed {
            return Ok(());
        }
        if self.state == HandleState::Open {
            self.stream.seek(SeekFrom::Start(COUNT_OFFSET))?;
            self.stream.write_value(self.count as i32)?;
            self.stream.flush()?;
            self.stream.detach();
        }
        self.state = HandleState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_grid() -> GridDescriptor {
        GridDescriptor::new(
            UVec3::new(96, 96, 60),
            Vec3::new(2.0, 2.0, 2.5),
            Mat4::from_scale(Vec3::new(2.0, 2.0, 2.5)),
        )
    }

    fn streamline(points: Vec<Vec3>, seed: usize) -> Streamline {
        let mut data = Streamline::new();
        data.set_points(points, PointType::Voxel, Vec3::new(2.0, 2.0, 2.5));
        data.set_seed_index(seed);
        data
    }

    #[test]
    fn test_roundtrip_geometry_and_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracts.trk");

        let originals = vec![
            streamline(vec![Vec3::ZERO, Vec3::new(1.0, 0.5, 0.25), Vec3::splat(2.0)], 1),
            streamline(vec![Vec3::new(5.0, 6.0, 7.0)], 0),
            streamline(vec![Vec3::splat(1.5), Vec3::splat(2.5), Vec3::splat(3.5), Vec3::ONE], 2),
        ];

        let mut writer = TrackvisWriter::new(&path, test_grid());
        writer.open(false).unwrap();
        for data in &originals {
            writer.write(data).unwrap();
        }
        writer.close().unwrap();

        let mut reader = TrackvisReader::new(&path);
        reader.open().unwrap();
        assert_eq!(reader.count(), 3);
        assert_eq!(reader.grid().unwrap().pixdim(), Vec3::new(2.0, 2.0, 2.5));

        for original in &originals {
            let decoded = reader.read().unwrap();
            assert_eq!(decoded.len(), original.len());
            assert_eq!(decoded.seed_index(), original.seed_index());
            for (a, b) in decoded.points().iter().zip(original.points()) {
                assert!((*a - *b).length() < 1e-4);
            }
        }
        reader.close().unwrap();
    }

    #[test]
    fn test_roundtrip_scalars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scalars.trk");

        let mut data = streamline(vec![Vec3::ZERO, Vec3::ONE], 0);
        data.set_point_properties(vec!["fa".to_owned()], vec![vec![0.25], vec![0.5]]);

        let mut writer = TrackvisWriter::new(&path, test_grid()).with_scalars(vec!["fa".to_owned()]);
        writer.open(false).unwrap();
        writer.write(&data).unwrap();
        writer.close().unwrap();

        let mut reader = TrackvisReader::new(&path);
        reader.open().unwrap();
        assert_eq!(reader.scalar_names(), ["fa"]);
        let decoded = reader.read().unwrap();
        assert_eq!(decoded.point_properties(), &[vec![0.25], vec![0.5]]);
    }

    #[test]
    fn test_append_extends_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("append.trk");

        let mut writer = TrackvisWriter::new(&path, test_grid());
        writer.open(false).unwrap();
        writer.write(&streamline(vec![Vec3::ZERO, Vec3::ONE], 0)).unwrap();
        writer.close().unwrap();

        let mut appender = TrackvisWriter::new(&path, test_grid());
        appender.open(true).unwrap();
        appender.write(&streamline(vec![Vec3::splat(4.0)], 0)).unwrap();
        appender.close().unwrap();

        let mut reader = TrackvisReader::new(&path);
        reader.open().unwrap();
        assert_eq!(reader.count(), 2);
        reader.read().unwrap();
        assert_eq!(reader.read().unwrap().len(), 1);
    }

    #[test]
    fn test_skip_matches_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skip.trk");

        let mut writer = TrackvisWriter::new(&path, test_grid());
        writer.open(false).unwrap();
        for i in 0..4 {
            writer
                .write(&streamline(vec![Vec3::splat(i as f32); (i + 1) as usize], 0))
                .unwrap();
        }
        writer.close().unwrap();

        let mut reader = TrackvisReader::new(&path);
        reader.open().unwrap();
        reader.skip(2).unwrap();
        let third = reader.read().unwrap();
        assert_eq!(third.len(), 3);
        assert!((third.points()[0] - Vec3::splat(2.0)).length() < 1e-4);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.trk");
        std::fs::write(&path, vec![0u8; 1200]).unwrap();

        let mut reader = TrackvisReader::new(&path);
        assert!(reader.open().is_err());
    }

    #[test]
    fn test_closed_handle_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("closed.trk");

        let mut writer = TrackvisWriter::new(&path, test_grid());
        writer.open(false).unwrap();
        writer.close().unwrap();
        writer.close().unwrap(); // idempotent
        assert!(matches!(writer.open(false), Err(Error::Closed)));

        let mut reader = TrackvisReader::new(&path);
        reader.open().unwrap();
        reader.close().unwrap();
        reader.close().unwrap();
        assert!(matches!(reader.read(), Err(Error::Closed)));
    }
}
