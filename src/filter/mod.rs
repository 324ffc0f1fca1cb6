//! Streamline filters

use crate::pipeline::DataManipulator;
use crate::streamline::Streamline;

/// Vetoes streamlines that visited fewer distinct region labels than the
/// configured minimum
pub struct LabelCountFilter {
    min_count: usize,
}

impl LabelCountFilter {
    pub fn new(min_count: usize) -> Self {
        Self { min_count }
    }
}

impl DataManipulator<Streamline> for LabelCountFilter {
    fn process(&mut self, data: &mut Streamline) -> bool {
        data.labels().len() >= self.min_count
    }
}

/// Vetoes streamlines shorter than the configured minimum world-unit length
pub struct LengthFilter {
    min_length: f32,
}

impl LengthFilter {
    pub fn new(min_length: f32) -> Self {
        Self { min_length }
    }
}

impl DataManipulator<Streamline> for LengthFilter {
    fn process(&mut self, data: &mut Streamline) -> bool {
        data.length() >= self.min_length
    }
}
