//! Endian-aware positional binary codec

use std::io::{Read, Seek, SeekFrom, Write};

use crate::core::types::Result;
use crate::core::Error;

/// Byte order for multi-byte transfers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the running platform
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width primitive transferable through the codec
///
/// Conversion between on-disk and in-memory element types routes through
/// f64, which is wide enough for every supported primitive.
pub trait Primitive: Copy + sealed::Sealed {
    const SIZE: usize;

    fn decode(bytes: &[u8], swap: bool) -> Self;
    fn encode(self, out: &mut [u8], swap: bool);
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8], swap: bool) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    if swap {
                        raw.reverse();
                    }
                    <$ty>::from_ne_bytes(raw)
                }

                fn encode(self, out: &mut [u8], swap: bool) {
                    let mut raw = self.to_ne_bytes();
                    if swap {
                        raw.reverse();
                    }
                    out.copy_from_slice(&raw);
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Endian-aware reader over an attached byte stream
///
/// A detached reader is inert: every operation returns [`Error::Detached`].
pub struct BinaryReader<R> {
    stream: Option<R>,
    swap: bool,
}

impl<R: Read> BinaryReader<R> {
    /// Create a detached reader
    pub fn new() -> Self {
        Self { stream: None, swap: false }
    }

    /// Create a reader attached to a stream
    pub fn attached(stream: R) -> Self {
        Self { stream: Some(stream), swap: false }
    }

    /// Attach a stream, replacing any previous one
    pub fn attach(&mut self, stream: R) {
        self.stream = Some(stream);
    }

    /// Detach the stream, leaving the reader inert
    pub fn detach(&mut self) -> Option<R> {
        self.stream.take()
    }

    /// Whether a stream is attached
    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Select the byte order for subsequent reads; defaults to native
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.swap = endianness != Endianness::native();
    }

    fn stream(&mut self) -> Result<&mut R> {
        self.stream.as_mut().ok_or(Error::Detached)
    }

    /// Read one primitive value
    pub fn read_value<T: Primitive>(&mut self) -> Result<T> {
        let swap = self.swap;
        let stream = self.stream()?;
        let mut bytes = [0u8; 8];
        stream.read_exact(&mut bytes[..T::SIZE])?;
        Ok(T::decode(&bytes[..T::SIZE], swap))
    }

    /// Read `n` elements stored on disk as `S`, converting to `T` in memory
    pub fn read_vector<S: Primitive, T: Primitive>(&mut self, n: usize) -> Result<Vec<T>> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            let raw: S = self.read_value()?;
            values.push(T::from_f64(raw.to_f64()));
        }
        Ok(values)
    }

    /// Read a delimiter-terminated string; stops at end-of-stream if the
    /// delimiter is never found
    pub fn read_string(&mut self, delim: u8) -> Result<String> {
        let stream = self.stream()?;
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match stream.read_exact(&mut byte) {
                Ok(()) => {
                    if byte[0] == delim {
                        break;
                    }
                    bytes.push(byte[0]);
                }
                Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(error) => return Err(error.into()),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a fixed-length null-padded string
    pub fn read_string_fixed(&mut self, n: usize) -> Result<String> {
        let stream = self.stream()?;
        let mut bytes = vec![0u8; n];
        stream.read_exact(&mut bytes)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(n);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let stream = self.stream()?;
        let mut bytes = vec![0u8; n];
        stream.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Reposition the stream
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.stream()?.seek(pos)?)
    }

    /// Current byte offset
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream()?.stream_position()?)
    }
}

impl<R: Read> Default for BinaryReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Endian-aware writer over an attached byte stream
pub struct BinaryWriter<W> {
    stream: Option<W>,
    swap: bool,
}

impl<W: Write> BinaryWriter<W> {
    /// Create a detached writer
    pub fn new() -> Self {
        Self { stream: None, swap: false }
    }

    /// Create a writer attached to a stream
    pub fn attached(stream: W) -> Self {
        Self { stream: Some(stream), swap: false }
    }

    /// Attach a stream, replacing any previous one
    pub fn attach(&mut self, stream: W) {
        self.stream = Some(stream);
    }

    /// Detach the stream, leaving the writer inert
    pub fn detach(&mut self) -> Option<W> {
        self.stream.take()
    }

    /// Whether a stream is attached
    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Select the byte order for subsequent writes; defaults to native
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.swap = endianness != Endianness::native();
    }

    fn stream(&mut self) -> Result<&mut W> {
        self.stream.as_mut().ok_or(Error::Detached)
    }

    /// Write one primitive value
    pub fn write_value<T: Primitive>(&mut self, value: T) -> Result<()> {
        let swap = self.swap;
        let stream = self.stream()?;
        let mut bytes = [0u8; 8];
        value.encode(&mut bytes[..T::SIZE], swap);
        stream.write_all(&bytes[..T::SIZE])?;
        Ok(())
    }

    /// Write the same value `n` times
    pub fn write_values<T: Primitive>(&mut self, value: T, n: usize) -> Result<()> {
        for _ in 0..n {
            self.write_value(value)?;
        }
        Ok(())
    }

    /// Write elements held in memory as `S`, stored on disk as `T`
    pub fn write_vector<T: Primitive, S: Primitive>(&mut self, values: &[S]) -> Result<()> {
        for &value in values {
            self.write_value(T::from_f64(value.to_f64()))?;
        }
        Ok(())
    }

    /// Write a null-terminated string
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(value.as_bytes())?;
        stream.write_all(&[0u8])?;
        Ok(())
    }

    /// Write a string into a fixed-length null-padded field, truncating if
    /// necessary
    pub fn write_string_fixed(&mut self, value: &str, n: usize) -> Result<()> {
        let stream = self.stream()?;
        let mut bytes = vec![0u8; n];
        let take = value.len().min(n);
        bytes[..take].copy_from_slice(&value.as_bytes()[..take]);
        stream.write_all(&bytes)?;
        Ok(())
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream()?.write_all(bytes)?;
        Ok(())
    }

    /// Flush the underlying stream
    pub fn flush(&mut self) -> Result<()> {
        self.stream()?.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> BinaryWriter<W> {
    /// Reposition the stream
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.stream()?.seek(pos)?)
    }

    /// Current byte offset
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream()?.stream_position()?)
    }
}

impl<W: Write> Default for BinaryWriter<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn non_native() -> Endianness {
        match Endianness::native() {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        }
    }

    #[test]
    fn test_native_roundtrip_no_swap() {
        let mut writer = BinaryWriter::attached(Cursor::new(Vec::new()));
        writer.write_value(0x1234_5678u32).unwrap();
        let buffer = writer.detach().unwrap().into_inner();
        assert_eq!(buffer, 0x1234_5678u32.to_ne_bytes());
    }

    #[test]
    fn test_non_native_roundtrip() {
        let mut writer = BinaryWriter::attached(Cursor::new(Vec::new()));
        writer.set_endianness(non_native());
        writer.write_value(-40_000i32).unwrap();
        writer.write_value(2.5f64).unwrap();
        writer.write_value(1234u16).unwrap();
        let buffer = writer.detach().unwrap().into_inner();

        let mut reader = BinaryReader::attached(Cursor::new(buffer));
        reader.set_endianness(non_native());
        assert_eq!(reader.read_value::<i32>().unwrap(), -40_000);
        assert_eq!(reader.read_value::<f64>().unwrap(), 2.5);
        assert_eq!(reader.read_value::<u16>().unwrap(), 1234);
    }

    #[test]
    fn test_swapped_bytes_on_disk() {
        let mut writer = BinaryWriter::attached(Cursor::new(Vec::new()));
        writer.set_endianness(non_native());
        writer.write_value(0x0102_0304u32).unwrap();
        let buffer = writer.detach().unwrap().into_inner();
        let mut swapped = 0x0102_0304u32.to_ne_bytes();
        swapped.reverse();
        assert_eq!(buffer, swapped);
    }

    #[test]
    fn test_vector_type_conversion() {
        let mut writer = BinaryWriter::attached(Cursor::new(Vec::new()));
        // In memory as f64, on disk as f32
        writer.write_vector::<f32, f64>(&[1.5, -2.25, 8.0]).unwrap();
        let buffer = writer.detach().unwrap().into_inner();
        assert_eq!(buffer.len(), 12);

        let mut reader = BinaryReader::attached(Cursor::new(buffer));
        let values: Vec<f64> = reader.read_vector::<f32, f64>(3).unwrap();
        assert_eq!(values, vec![1.5, -2.25, 8.0]);
    }

    #[test]
    fn test_strings() {
        let mut writer = BinaryWriter::attached(Cursor::new(Vec::new()));
        writer.write_string("seed").unwrap();
        writer.write_string_fixed("curvature", 20).unwrap();
        let buffer = writer.detach().unwrap().into_inner();
        assert_eq!(buffer.len(), 25);

        let mut reader = BinaryReader::attached(Cursor::new(buffer));
        assert_eq!(reader.read_string(0).unwrap(), "seed");
        assert_eq!(reader.read_string_fixed(20).unwrap(), "curvature");
    }

    #[test]
    fn test_delimited_string_stops_at_eof() {
        let mut reader = BinaryReader::attached(Cursor::new(b"unterminated".to_vec()));
        assert_eq!(reader.read_string(0).unwrap(), "unterminated");
    }

    #[test]
    fn test_detached_is_inert() {
        let mut reader: BinaryReader<Cursor<Vec<u8>>> = BinaryReader::new();
        assert!(matches!(reader.read_value::<u8>(), Err(Error::Detached)));

        let mut writer = BinaryWriter::attached(Cursor::new(Vec::new()));
        writer.detach();
        assert!(matches!(writer.write_value(1u8), Err(Error::Detached)));
    }
}
