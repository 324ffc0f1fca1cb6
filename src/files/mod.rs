//! Streamline file formats and the binary codec beneath them

pub mod binary;
pub mod trackvis;
pub mod mrtrix;
pub mod labels;
pub mod source;
pub mod sink;

pub use binary::{BinaryReader, BinaryWriter, Endianness};
pub use labels::StreamlineLabelList;
pub use mrtrix::{MrtrixReader, MrtrixWriter};
pub use source::StreamlineFileSource;
pub use sink::StreamlineFileSink;
pub use trackvis::{TrackvisReader, TrackvisWriter};

use std::path::Path;

use crate::core::types::Result;
use crate::space::GridDescriptor;
use crate::streamline::Streamline;

/// Lifecycle of a file handle: unopened → open → closed
///
/// `close` is idempotent; any other operation on a closed handle is an
/// error. Concurrent handles to the same path are unsupported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Unopened,
    Open,
    Closed,
}

/// Format-specific streamline file reader
///
/// `open` parses the header; afterwards the handle exposes the streamline
/// count, property names and embedded grid, and decodes records in order.
pub trait StreamlineFileReader {
    /// Parse the header and position at the first record
    fn open(&mut self) -> Result<()>;

    /// Number of streamlines the header declares
    fn count(&self) -> usize;

    /// Names of the per-streamline properties
    fn property_names(&self) -> &[String];

    /// Grid descriptor embedded in the file, when the format carries one
    fn grid(&self) -> Option<&GridDescriptor>;

    /// Byte offset of the first record
    fn data_offset(&self) -> u64;

    /// Reposition to an absolute byte offset
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Decode the next record
    fn read(&mut self) -> Result<Streamline>;

    /// Advance past `n` records without materializing them
    ///
    /// The default decodes and discards; formats whose record sizes are
    /// derivable from the header override this with offset arithmetic.
    fn skip(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.read()?;
        }
        Ok(())
    }

    /// Release the handle; idempotent
    fn close(&mut self) -> Result<()>;
}

/// Format-specific streamline file writer
pub trait StreamlineFileWriter {
    /// Create the file with a placeholder header, or position for append
    fn open(&mut self, append: bool) -> Result<()>;

    /// Encode one record, returning its byte offset in the file
    fn write(&mut self, data: &Streamline) -> Result<u64>;

    /// Number of records written so far
    fn count(&self) -> usize;

    /// Finalize the header with the final record count; idempotent
    fn close(&mut self) -> Result<()>;
}

/// Probe a path stem against the known format extensions, in order
///
/// Returns the matching reader, or [`Error::MissingSource`] when no
/// candidate file exists.
///
/// [`Error::MissingSource`]: crate::core::Error::MissingSource
pub fn reader_for_stem(stem: &str) -> Result<Box<dyn StreamlineFileReader>> {
    let trk = format!("{stem}.trk");
    if Path::new(&trk).is_file() {
        return Ok(Box::new(TrackvisReader::new(trk)));
    }
    let tck = format!("{stem}.tck");
    if Path::new(&tck).is_file() {
        return Ok(Box::new(MrtrixReader::new(tck)));
    }
    Err(crate::core::Error::MissingSource(stem.to_owned()))
}
