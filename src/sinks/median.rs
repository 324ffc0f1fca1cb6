//! Representative-path sink

use log::warn;

use crate::core::types::Result;
use crate::files::{StreamlineFileWriter, TrackvisWriter};
use crate::pipeline::DataSink;
use crate::space::GridDescriptor;
use crate::streamline::Streamline;

/// Selects a representative streamline per run and writes it to its own file
///
/// The representative is the streamline whose world length sits at the
/// configured quantile of the block's length distribution. Because the
/// selection needs the whole dataset, the pipeline must process the entire
/// source as a single block when this sink is registered.
pub struct MedianSink {
    path: String,
    grid: GridDescriptor,
    quantile: f64,
    median: Option<Streamline>,
}

impl MedianSink {
    /// Create a sink writing the representative path to `path`
    pub fn new(path: &str, grid: GridDescriptor) -> Self {
        Self::with_quantile(path, grid, 0.99)
    }

    /// Create a sink selecting at an explicit length quantile
    pub fn with_quantile(path: &str, grid: GridDescriptor, quantile: f64) -> Self {
        Self {
            path: path.to_owned(),
            grid,
            quantile: quantile.clamp(0.0, 1.0),
            median: None,
        }
    }

    /// The selected representative, once a block has been seen
    pub fn median(&self) -> Option<&Streamline> {
        self.median.as_ref()
    }
}

impl DataSink<Streamline> for MedianSink {
    fn setup(&mut self, block: &[Streamline]) -> Result<()> {
        if self.median.is_some() {
            warn!("median sink received more than one block; selection covers the first only");
            return Ok(());
        }
        if block.is_empty() {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..block.len()).collect();
        order.sort_by(|&a, &b| {
            block[a]
                .length()
                .partial_cmp(&block[b].length())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let rank = ((block.len() - 1) as f64 * self.quantile).round() as usize;
        self.median = Some(block[order[rank]].clone());
        Ok(())
    }

    fn put(&mut self, _data: &Streamline) -> Result<()> {
        // Selection happens in setup; individual elements are not consumed
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        let Some(median) = self.median.take() else {
            warn!("no streamlines survived; median file {:?} not written", self.path);
            return Ok(());
        };
        let mut writer = TrackvisWriter::new(&self.path, self.grid);
        writer.open(false)?;
        writer.write(&median)?;
        writer.close()?;
        self.median = Some(median);
        Ok(())
    }
}
