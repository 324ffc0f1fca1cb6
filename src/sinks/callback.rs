//! Per-streamline host callback sink

use crate::core::types::Result;
use crate::pipeline::DataSink;
use crate::streamline::Streamline;

/// Invokes a closure for every surviving streamline
///
/// The boundary to an embedding host: per-streamline profiling, progress
/// reporting and similar concerns plug in here without implementing a sink
/// themselves.
pub struct CallbackSink<F: FnMut(&Streamline)> {
    callback: F,
    count: usize,
}

impl<F: FnMut(&Streamline)> CallbackSink<F> {
    /// Wrap a closure as a sink
    pub fn new(callback: F) -> Self {
        Self { callback, count: 0 }
    }

    /// Number of streamlines seen
    pub fn count(&self) -> usize {
        self.count
    }
}

impl<F: FnMut(&Streamline)> DataSink<Streamline> for CallbackSink<F> {
    fn put(&mut self, data: &Streamline) -> Result<()> {
        (self.callback)(data);
        self.count += 1;
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;
    use crate::space::PointType;

    #[test]
    fn test_callback_sees_every_streamline() {
        let mut lengths = Vec::new();
        let mut sink = CallbackSink::new(|data: &Streamline| lengths.push(data.len()));

        for n in 1..=3 {
            let mut data = Streamline::new();
            data.set_points(vec![Vec3::ZERO; n], PointType::Voxel, Vec3::ONE);
            sink.put(&data).unwrap();
        }
        sink.done().unwrap();
        assert_eq!(sink.count(), 3);
        drop(sink);
        assert_eq!(lengths, vec![1, 2, 3]);
    }
}
