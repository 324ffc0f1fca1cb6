//! MRtrix (.tck) streamline codec
//!
//! The simpler format family: a textual key-value header followed by raw
//! f32 point triplets in world coordinates. A NaN triplet ends each
//! streamline and an Inf triplet ends the file. No per-point properties and
//! no embedded grid.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, SeekFrom};
use std::path::PathBuf;

use log::debug;

use crate::core::types::{Result, Vec3};
use crate::core::Error;
use crate::files::binary::{BinaryReader, BinaryWriter, Endianness};
use crate::files::{HandleState, StreamlineFileReader, StreamlineFileWriter};
use crate::space::{GridDescriptor, ImageSpace, PointType};
use crate::streamline::Streamline;

const MAGIC_LINE: &str = "mrtrix tracks";
/// The count value is zero-padded to fixed width so it can be rewritten in
/// place when the file is finalized
const COUNT_WIDTH: usize = 10;

/// Reader for MRtrix track files
pub struct MrtrixReader {
    path: PathBuf,
    stream: BinaryReader<BufReader<File>>,
    state: HandleState,
    point_type: PointType,
    space: Option<ImageSpace>,
    count: usize,
    count_offset: u64,
    count_width: usize,
    endianness: Endianness,
    data_offset: u64,
    property_names: Vec<String>,
}

impl MrtrixReader {
    /// Create an unopened reader for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: BinaryReader::new(),
            state: HandleState::Unopened,
            point_type: PointType::World,
            space: None,
            count: 0,
            count_offset: 0,
            count_width: 0,
            endianness: Endianness::Little,
            data_offset: 0,
            property_names: Vec::new(),
        }
    }

    /// Choose the coordinate representation decoded points are returned in
    ///
    /// Anything other than world coordinates requires an image space,
    /// supplied with [`with_space`](Self::with_space), since the format
    /// itself carries no grid.
    pub fn with_point_type(mut self, point_type: PointType) -> Self {
        self.point_type = point_type;
        self
    }

    /// Supply the image space used for non-world output representations
    pub fn with_space(mut self, space: ImageSpace) -> Self {
        self.space = Some(space);
        self
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Unopened => Err(Error::Format("file has not been opened".into())),
            HandleState::Closed => Err(Error::Closed),
        }
    }

    fn read_triplet(&mut self) -> Result<Vec3> {
        let x: f32 = self.stream.read_value()?;
        let y: f32 = self.stream.read_value()?;
        let z: f32 = self.stream.read_value()?;
        Ok(Vec3::new(x, y, z))
    }
}

impl StreamlineFileReader for MrtrixReader {
    fn open(&mut self) -> Result<()> {
        if self.state == HandleState::Closed {
            return Err(Error::Closed);
        }
        let file = File::open(&self.path)?;
        self.stream.attach(BufReader::new(file));

        let magic = self.stream.read_string(b'\n')?;
        if magic.trim() != MAGIC_LINE {
            return Err(Error::Format("not an mrtrix track file".into()));
        }

        let mut datatype = String::new();
        loop {
            let line_start = self.stream.position()?;
            let raw = self.stream.read_string(b'\n')?;
            let line = raw.trim();
            if line == "END" {
                break;
            }
            if line.is_empty() {
                return Err(Error::Format("unterminated mrtrix header".into()));
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::Format(format!("malformed header line {line:?}")));
            };
            let value = value.trim();
            match key.trim() {
                "count" => {
                    self.count = value
                        .parse()
                        .map_err(|_| Error::Format(format!("bad count {value:?}")))?;
                    // Byte span of the value within the file, so the field
                    // can later be rewritten in place
                    let after_colon = raw.find(':').map(|i| i + 1).unwrap_or(0);
                    let lead = raw[after_colon..].len() - raw[after_colon..].trim_start().len();
                    let value_pos = after_colon + lead;
                    self.count_offset = line_start + value_pos as u64;
                    self.count_width = raw.trim_end().len() - value_pos;
                }
                "datatype" => datatype = value.to_owned(),
                "file" => {
                    let offset = value
                        .strip_prefix(". ")
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .ok_or_else(|| Error::Format(format!("bad file field {value:?}")))?;
                    self.data_offset = offset;
                }
                _ => {}
            }
        }

        self.endianness = match datatype.as_str() {
            "Float32LE" => Endianness::Little,
            "Float32BE" => Endianness::Big,
            other => {
                return Err(Error::Format(format!("unsupported datatype {other:?}")));
            }
        };
        self.stream.set_endianness(self.endianness);
        if self.data_offset == 0 {
            return Err(Error::Format("header declares no data offset".into()));
        }

        self.stream.seek(SeekFrom::Start(self.data_offset))?;
        self.state = HandleState::Open;
        debug!("opened {:?}: {} streamlines", self.path, self.count);
        Ok(())
    }

    fn count(&self) -> usize {
        self.count
    }

    fn property_names(&self) -> &[String] {
        &self.property_names
    }

    fn grid(&self) -> Option<&GridDescriptor> {
        None
    }

    fn data_offset(&self) -> u64 {
        self.data_offset
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.check_open()?;
        self.stream.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self) -> Result<Streamline> {
        self.check_open()?;
        let mut points = Vec::new();
        loop {
            let triplet = self.read_triplet()?;
            if triplet.x.is_nan() {
                break;
            }
            if triplet.x.is_infinite() {
                if points.is_empty() {
                    return Err(Error::Format("read past the end of the track data".into()));
                }
                // Step back so a subsequent read also sees the terminator
                self.stream.seek(SeekFrom::Current(-12))?;
                break;
            }
            let point = match self.point_type {
                PointType::World => triplet,
                representation => {
                    let space = self.space.as_ref().ok_or_else(|| {
                        Error::Format("no image space supplied for coordinate conversion".into())
                    })?;
                    let voxel = space.to_voxel(triplet, PointType::World);
                    match representation {
                        PointType::Voxel => voxel,
                        PointType::Scaled => space.to_scaled(voxel),
                        PointType::World => unreachable!(),
                    }
                }
            };
            points.push(point);
        }

        let voxel_dims = self.space.as_ref().map(|s| s.pixdim()).unwrap_or(Vec3::ONE);
        let mut data = Streamline::new();
        data.set_points(points, self.point_type, voxel_dims);
        Ok(data)
    }

    fn close(&mut self) -> Result<()> {
        self.stream.detach();
        self.state = HandleState::Closed;
        Ok(())
    }
}

/// Writer for MRtrix track files
///
/// Points are stored in world coordinates; voxel- or scaled-space input is
/// converted through the supplied image space.
pub struct MrtrixWriter {
    path: PathBuf,
    stream: BinaryWriter<BufWriter<File>>,
    state: HandleState,
    space: Option<ImageSpace>,
    count: usize,
    count_offset: u64,
}

impl MrtrixWriter {
    /// Create an unopened writer for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: BinaryWriter::new(),
            state: HandleState::Unopened,
            space: None,
            count: 0,
            count_offset: 0,
        }
    }

    /// Supply the image space used to convert non-world input points
    pub fn with_space(mut self, space: ImageSpace) -> Self {
        self.space = Some(space);
        self
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Unopened => Err(Error::Format("file has not been opened".into())),
            HandleState::Closed => Err(Error::Closed),
        }
    }

    fn write_triplet(&mut self, point: Vec3) -> Result<()> {
        self.stream.write_value(point.x)?;
        self.stream.write_value(point.y)?;
        self.stream.write_value(point.z)?;
        Ok(())
    }
}

impl StreamlineFileWriter for MrtrixWriter {
    fn open(&mut self, append: bool) -> Result<()> {
        if self.state == HandleState::Closed {
            return Err(Error::Closed);
        }

        if append {
            let mut probe = MrtrixReader::new(&self.path);
            probe.open()?;
            // The count field must be rewritable in place on close, and
            // appended triplets share the existing byte order
            if probe.endianness != Endianness::Little {
                return Err(Error::Format(
                    "appending to a big-endian track file is unsupported".into(),
                ));
            }
            if probe.count_width != COUNT_WIDTH {
                return Err(Error::Format(format!(
                    "count field is {} characters wide and cannot be rewritten in place",
                    probe.count_width
                )));
            }
            self.count = probe.count();
            self.count_offset = probe.count_offset;
            probe.close()?;

            let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
            self.stream.attach(BufWriter::new(file));
            self.stream.set_endianness(Endianness::Little);
            // Overwrite the trailing Inf terminator
            self.stream.seek(SeekFrom::End(-12))?;
        } else {
            let file = File::create(&self.path)?;
            self.stream.attach(BufWriter::new(file));
            self.count = 0;

            let prefix = format!("{MAGIC_LINE}\ndatatype: Float32LE\n");
            // Header length is fixed up front so the data offset is known
            // before the count is
            let placeholder = format!(
                "{prefix}file: . @@@@\ncount: {:0width$}\nEND\n",
                0,
                width = COUNT_WIDTH
            );
            let data_offset = placeholder.len();
            let header = format!(
                "{prefix}file: . {data_offset:4}\ncount: {:0width$}\nEND\n",
                0,
                width = COUNT_WIDTH
            );
            self.count_offset = (prefix.len() + format!("file: . {data_offset:4}\ncount: ").len()) as u64;
            self.stream.write_bytes(header.as_bytes())?;
            self.stream.set_endianness(Endianness::Little);
        }
        self.state = HandleState::Open;
        Ok(())
    }

    fn write(&mut self, data: &Streamline) -> Result<u64> {
        self.check_open()?;
        let offset = self.stream.position()?;

        let from = data.point_type().unwrap_or(PointType::World);
        for &point in data.points() {
            let world = match from {
                PointType::World => point,
                representation => {
                    let space = self.space.as_ref().ok_or_else(|| {
                        Error::Format("no image space supplied for coordinate conversion".into())
                    })?;
                    let voxel = space.to_voxel(point, representation);
                    space.to_world(voxel)
                }
            };
            self.write_triplet(world)?;
        }
        self.write_triplet(Vec3::splat(f32::NAN))?;

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
            self.write_triplet(Vec3::splat(f32::INFINITY))?;
            self.stream.seek(SeekFrom::Start(self.count_offset))?;
            let padded = format!("{:0width$}", self.count, width = COUNT_WIDTH);
            self.stream.write_bytes(padded.as_bytes())?;
            self.stream.flush()?;
            self.stream.detach();
        }
        self.state = HandleState::Closed;
        Ok(())
    }
}
