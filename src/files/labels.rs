//! Streamline label list sidecar (.trkl)
//!
//! Stores per-streamline region label sets, keyed purely by positional
//! correspondence with the main geometry file: entry *i* belongs to the
//! *i*-th streamline. Also records each streamline's byte offset in the
//! geometry file, enabling fast seeking, and an optional dictionary naming
//! the label values.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::core::types::Result;
use crate::core::Error;
use crate::files::binary::{BinaryReader, BinaryWriter};

const MAGIC: &[u8; 4] = b"TRKL";
const VERSION: u8 = 1;

/// Per-streamline label sets with matching geometry-file offsets
#[derive(Clone, Debug, Default)]
pub struct StreamlineLabelList {
    labels: Vec<BTreeSet<i32>>,
    offsets: Vec<u64>,
    dictionary: BTreeMap<i32, String>,
}

impl StreamlineLabelList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a dictionary naming the label values
    pub fn with_dictionary(mut self, dictionary: BTreeMap<i32, String>) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label set for streamline `index`
    pub fn labels(&self, index: usize) -> Option<&BTreeSet<i32>> {
        self.labels.get(index)
    }

    /// Geometry-file byte offset of streamline `index`
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    /// Dictionary naming the label values
    pub fn dictionary(&self) -> &BTreeMap<i32, String> {
        &self.dictionary
    }

    /// Append one entry, in lockstep with the geometry writer
    pub fn push(&mut self, labels: BTreeSet<i32>, offset: u64) {
        self.labels.push(labels);
        self.offsets.push(offset);
    }

    /// Read a sidecar file, validating against the geometry streamline count
    pub fn read(path: impl AsRef<Path>, expected_count: usize) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut stream = BinaryReader::attached(BufReader::new(file));

        let magic = stream.read_bytes(4)?;
        if magic != MAGIC {
            return Err(Error::Format("not a streamline label file".into()));
        }
        let version: u8 = stream.read_value()?;
        if version != VERSION {
            return Err(Error::Format(format!("unsupported label file version {version}")));
        }

        let count: i32 = stream.read_value()?;
        if count < 0 {
            return Err(Error::Format(format!("negative entry count {count}")));
        }
        if count as usize != expected_count {
            return Err(Error::Format(format!(
                "label list holds {count} entries but the geometry file holds {expected_count}"
            )));
        }

        let dictionary_size: i32 = stream.read_value()?;
        let mut dictionary = BTreeMap::new();
        for _ in 0..dictionary_size {
            let value: i32 = stream.read_value()?;
            let name = stream.read_string(0)?;
            dictionary.insert(value, name);
        }

        let mut list = Self::default().with_dictionary(dictionary);
        for _ in 0..count {
            let offset: u64 = stream.read_value()?;
            let n_labels: i32 = stream.read_value()?;
            if n_labels < 0 {
                return Err(Error::Format(format!("negative label count {n_labels}")));
            }
            let mut labels = BTreeSet::new();
            for _ in 0..n_labels {
                labels.insert(stream.read_value::<i32>()?);
            }
            list.push(labels, offset);
        }
        Ok(list)
    }

    /// Write the sidecar file in one pass
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut stream = BinaryWriter::attached(BufWriter::new(file));

        stream.write_bytes(MAGIC)?;
        stream.write_value(VERSION)?;
        stream.write_value(self.labels.len() as i32)?;

        stream.write_value(self.dictionary.len() as i32)?;
        for (&value, name) in &self.dictionary {
            stream.write_value(value)?;
            stream.write_string(name)?;
        }

        for (labels, &offset) in self.labels.iter().zip(&self.offsets) {
            stream.write_value(offset)?;
            stream.write_value(labels.len() as i32)?;
            for &label in labels {
                stream.write_value(label)?;
            }
        }
        stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set(values: &[i32]) -> BTreeSet<i32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracts.trkl");

        let mut dictionary = BTreeMap::new();
        dictionary.insert(4, "thalamus".to_owned());
        dictionary.insert(7, "precentral".to_owned());

        let mut list = StreamlineLabelList::new().with_dictionary(dictionary);
        list.push(set(&[4, 7]), 1000);
        list.push(set(&[]), 1456);
        list.push(set(&[7]), 1480);
        list.write(&path).unwrap();

        let decoded = StreamlineLabelList::read(&path, 3).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.labels(0), Some(&set(&[4, 7])));
        assert_eq!(decoded.labels(1), Some(&set(&[])));
        assert_eq!(decoded.offset(2), Some(1480));
        assert_eq!(decoded.dictionary().get(&4).map(String::as_str), Some("thalamus"));
    }

    #[test]
    fn test_count_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.trkl");

        let mut list = StreamlineLabelList::new();
        list.push(set(&[1]), 1000);
        list.write(&path).unwrap();

        assert!(StreamlineLabelList::read(&path, 2).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.trkl");
        std::fs::write(&path, b"XXXX\x01\x00\x00\x00\x00").unwrap();

        assert!(StreamlineLabelList::read(&path, 0).is_err());
    }
}
