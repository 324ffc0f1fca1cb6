//! Streamline file source facade

use std::path::Path;

use log::debug;

use crate::core::types::Result;
use crate::files::{reader_for_stem, StreamlineFileReader, StreamlineLabelList};
use crate::pipeline::DataSource;
use crate::streamline::Streamline;

/// Reads streamlines from whichever format exists for a path stem
///
/// Probes `<stem>.trk` then `<stem>.tck`; neither existing is a hard error.
/// When a `<stem>.trkl` sidecar is present its label sets are attached to
/// the streamlines by positional correspondence.
pub struct StreamlineFileSource {
    reader: Box<dyn StreamlineFileReader>,
    labels: Option<StreamlineLabelList>,
    current: usize,
    total: usize,
}

impl StreamlineFileSource {
    /// Open a source for the given path stem
    pub fn open(stem: &str) -> Result<Self> {
        Self::open_with_labels(stem, true)
    }

    /// Open a source, optionally skipping the label sidecar
    pub fn open_with_labels(stem: &str, read_labels: bool) -> Result<Self> {
        let mut reader = reader_for_stem(stem)?;
        reader.open()?;
        let total = reader.count();

        let sidecar = format!("{stem}.trkl");
        let labels = if read_labels && Path::new(&sidecar).is_file() {
            debug!("loading label sidecar {sidecar:?}");
            Some(StreamlineLabelList::read(&sidecar, total)?)
        } else {
            None
        };

        Ok(Self {
            reader,
            labels,
            current: 0,
            total,
        })
    }

    /// Total number of streamlines in the file
    pub fn count(&self) -> usize {
        self.total
    }

    /// The label list loaded from the sidecar, if any
    pub fn labels(&self) -> Option<&StreamlineLabelList> {
        self.labels.as_ref()
    }

    /// The underlying format reader
    pub fn reader(&self) -> &dyn StreamlineFileReader {
        self.reader.as_ref()
    }

    /// Release the file handle; idempotent
    pub fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}

impl DataSource<Streamline> for StreamlineFileSource {
    fn more(&mut self) -> bool {
        self.current < self.total
    }

    fn get(&mut self) -> Result<Streamline> {
        let mut data = self.reader.read()?;
        if let Some(list) = &self.labels {
            if let Some(labels) = list.labels(self.current) {
                data.set_labels(labels.clone());
            }
        }
        self.current += 1;
        Ok(data)
    }

    fn seek(&mut self, n: usize) {
        // Sidecar offsets allow direct repositioning; otherwise rewind and
        // skip forward record by record
        let result = match self.labels.as_ref().and_then(|list| list.offset(n)) {
            Some(offset) => self.reader.seek(offset),
            None => {
                let data_offset = self.reader.data_offset();
                self.reader
                    .seek(data_offset)
                    .and_then(|_| self.reader.skip(n))
            }
        };
        if result.is_ok() {
            self.current = n;
        }
    }

    fn seekable(&self) -> bool {
        true
    }
}
