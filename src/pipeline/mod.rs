//! Generic source → manipulator → sink pipeline

use log::{debug, info};

use crate::core::types::Result;

/// Produces data elements one at a time
///
/// Sources are pull-based: `more` reports whether an element remains and
/// `get` produces it. Seekable sources additionally support repositioning,
/// used when a run restarts a batch.
pub trait DataSource<T> {
    fn more(&mut self) -> bool;
    fn get(&mut self) -> Result<T>;

    /// Reposition the cursor to element `n`; meaningful only when
    /// [`seekable`](Self::seekable) reports true
    fn seek(&mut self, _n: usize) {}
    fn seekable(&self) -> bool {
        false
    }
}

/// Transforms or removes data elements
///
/// Returning false vetoes the element: it is removed immediately and no
/// later manipulator or sink sees it again. Rejection is signalled only
/// through the return value, never through an error.
pub trait DataManipulator<T> {
    fn process(&mut self, data: &mut T) -> bool;
}

/// Consumes data elements, either streaming or per whole block
///
/// `setup` and `finish` are optional block hooks with explicit do-nothing
/// defaults; `setup` receives the entire surviving block so sinks that need
/// global knowledge (medians, quantiles) can compute it before the per-item
/// `put` calls. `done` is called exactly once after the source is exhausted.
pub trait DataSink<T> {
    /// Called once per block before any `put`, with the surviving elements
    fn setup(&mut self, _block: &[T]) -> Result<()> {
        Ok(())
    }

    fn put(&mut self, data: &T) -> Result<()>;

    /// Called once per block after the last `put`
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn done(&mut self) -> Result<()>;
}

/// Block-buffered pipeline connecting one source to a chain of manipulators
/// and a fan-out of sinks
///
/// With no block size set the entire source is processed as a single block,
/// which is required whenever any registered sink needs global knowledge.
/// Elements are presented to every sink in source order, and blocks follow
/// source order. The first error from any stage aborts the run; remaining
/// sinks' `done` is not invoked and the run's outputs are considered invalid.
pub struct Pipeline<'a, T> {
    source: &'a mut dyn DataSource<T>,
    manipulators: Vec<&'a mut dyn DataManipulator<T>>,
    sinks: Vec<&'a mut dyn DataSink<T>>,
    block_size: Option<usize>,
}

impl<'a, T> Pipeline<'a, T> {
    /// Create a pipeline around a source
    pub fn new(source: &'a mut dyn DataSource<T>) -> Self {
        Self {
            source,
            manipulators: Vec::new(),
            sinks: Vec::new(),
            block_size: None,
        }
    }

    /// Set the number of elements buffered per block
    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = Some(size.max(1));
    }

    /// Register a manipulator; manipulators run in registration order
    pub fn add_manipulator(&mut self, manipulator: &'a mut dyn DataManipulator<T>) {
        self.manipulators.push(manipulator);
    }

    /// Register a sink
    pub fn add_sink(&mut self, sink: &'a mut dyn DataSink<T>) {
        self.sinks.push(sink);
    }

    /// Drive the source to exhaustion, returning the surviving element count
    pub fn run(&mut self) -> Result<usize> {
        let block_size = self.block_size.unwrap_or(usize::MAX);
        let mut total = 0usize;
        let mut blocks = 0usize;

        while self.source.more() {
            let mut block: Vec<T> = Vec::new();
            while block.len() < block_size && self.source.more() {
                block.push(self.source.get()?);
            }

            let before = block.len();
            block.retain_mut(|item| {
                self.manipulators
                    .iter_mut()
                    .all(|manipulator| manipulator.process(item))
            });
            debug!(
                "block {}: {} of {} elements retained",
                blocks,
                block.len(),
                before
            );

            for sink in &mut self.sinks {
                sink.setup(&block)?;
                for item in &block {
                    sink.put(item)?;
                }
                sink.finish()?;
            }

            total += block.len();
            blocks += 1;
        }

        for sink in &mut self.sinks {
            sink.done()?;
        }

        info!("pipeline retained {} elements over {} blocks", total, blocks);
        Ok(total)
    }
}
