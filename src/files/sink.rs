//! Streamline file sink facade

use std::collections::BTreeMap;

use log::debug;

use crate::core::types::Result;
use crate::files::{StreamlineFileWriter, StreamlineLabelList, TrackvisWriter};
use crate::pipeline::DataSink;
use crate::space::GridDescriptor;
use crate::streamline::Streamline;

/// Writes streamlines to a TrackVis file, with an optional label sidecar
///
/// The sidecar is written in lockstep with the geometry: entry *i* holds the
/// label set and record offset of the *i*-th streamline. `done` finalizes
/// the geometry header and emits the sidecar.
pub struct StreamlineFileSink {
    stem: String,
    writer: TrackvisWriter,
    labels: Option<StreamlineLabelList>,
}

impl StreamlineFileSink {
    /// Create a sink writing `<stem>.trk` (and `<stem>.trkl`)
    pub fn new(stem: &str, grid: GridDescriptor) -> Result<Self> {
        Self::with_options(stem, grid, true, false, BTreeMap::new())
    }

    /// Create a sink with explicit label, append and dictionary settings
    pub fn with_options(
        stem: &str,
        grid: GridDescriptor,
        write_labels: bool,
        append: bool,
        dictionary: BTreeMap<i32, String>,
    ) -> Result<Self> {
        let mut writer = TrackvisWriter::new(format!("{stem}.trk"), grid);
        writer.open(append)?;
        let labels = if write_labels {
            Some(StreamlineLabelList::new().with_dictionary(dictionary))
        } else {
            None
        };
        Ok(Self {
            stem: stem.to_owned(),
            writer,
            labels,
        })
    }

    /// Number of streamlines written so far
    pub fn count(&self) -> usize {
        self.writer.count()
    }
}

impl DataSink<Streamline> for StreamlineFileSink {
    fn put(&mut self, data: &Streamline) -> Result<()> {
        let offset = self.writer.write(data)?;
        if let Some(list) = &mut self.labels {
            list.push(data.labels().clone(), offset);
        }
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        self.writer.close()?;
        if let Some(list) = &self.labels {
            let sidecar = format!("{}.trkl", self.stem);
            debug!("writing label sidecar {sidecar:?}");
            list.write(sidecar)?;
        }
        Ok(())
    }
}
