//! Seed adapter: turns a seed batch and a tracker into a streamline source

use rayon::prelude::*;

use crate::core::types::{Result, Vec3};
use crate::core::Error;
use crate::pipeline::DataSource;
use crate::streamline::Streamline;
use crate::tracker::{OrientationSampler, Tracker};

/// Lazy streamline source over an ordered set of seed points
///
/// Each `get` call performs fresh tracking work; nothing is buffered. The
/// cursor is seekable so a pipeline can restart a batch.
pub struct TractographySource<S> {
    tracker: Tracker<S>,
    seeds: Vec<Vec3>,
    per_seed: usize,
    cursor: usize,
}

impl<S: OrientationSampler> TractographySource<S> {
    /// Create a source generating `per_seed` streamlines per seed point
    pub fn new(tracker: Tracker<S>, seeds: Vec<Vec3>, per_seed: usize) -> Self {
        Self {
            tracker,
            seeds,
            per_seed: per_seed.max(1),
            cursor: 0,
        }
    }

    /// Total number of streamlines this source will generate
    pub fn total(&self) -> usize {
        self.seeds.len() * self.per_seed
    }

    /// The wrapped tracker
    pub fn tracker(&self) -> &Tracker<S> {
        &self.tracker
    }

    /// Track every seed across worker threads, preserving seed order
    ///
    /// Each worker clones the tracker, so samplers must be cloneable and
    /// thread-safe. The single-threaded pipeline path is unaffected; this
    /// is an opt-in for embarrassingly parallel batches.
    pub fn generate_all_parallel(&self) -> Vec<Streamline>
    where
        S: Clone + Send + Sync,
    {
        (0..self.total())
            .into_par_iter()
            .map_init(
                || self.tracker.clone(),
                |tracker, index| tracker.generate(self.seeds[index / self.per_seed]),
            )
            .collect()
    }
}

impl<S: OrientationSampler> DataSource<Streamline> for TractographySource<S> {
    fn more(&mut self) -> bool {
        self.cursor < self.total()
    }

    fn get(&mut self) -> Result<Streamline> {
        let seed = self
            .seeds
            .get(self.cursor / self.per_seed)
            .copied()
            .ok_or(Error::Exhausted)?;
        self.cursor += 1;
        Ok(self.tracker.generate(seed))
    }

    fn seek(&mut self, n: usize) {
        self.cursor = n.min(self.total());
    }

    fn seekable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UVec3;
    use crate::space::ImageSpace;
    use crate::tracker::TrackerConfig;

    #[derive(Clone)]
    struct ConstantSampler(Vec3);

    impl OrientationSampler for ConstantSampler {
        fn sample(&mut self, _point: Vec3, _reference: Option<Vec3>) -> Option<Vec3> {
            Some(self.0)
        }
    }

    fn test_tracker() -> Tracker<ConstantSampler> {
        let space = ImageSpace::from_dim(UVec3::new(32, 32, 32));
        let config = TrackerConfig {
            max_steps: 8,
            ..TrackerConfig::default()
        };
        Tracker::new(ConstantSampler(Vec3::X), space, config)
    }

    #[test]
    fn test_exhaustion_and_repetition() {
        let seeds = vec![Vec3::splat(10.0), Vec3::splat(16.0)];
        let mut source = TractographySource::new(test_tracker(), seeds, 3);
        assert_eq!(source.total(), 6);

        let mut generated = Vec::new();
        while source.more() {
            generated.push(source.get().unwrap());
        }
        assert_eq!(generated.len(), 6);
        // First three share a seed, the rest use the second one
        assert_eq!(generated[0].points()[generated[0].seed_index()], Vec3::splat(10.0));
        assert_eq!(generated[3].points()[generated[3].seed_index()], Vec3::splat(16.0));
        assert!(!source.more());
    }

    #[test]
    fn test_get_past_exhaustion_errors() {
        let mut empty = TractographySource::new(test_tracker(), Vec::new(), 1);
        assert!(!empty.more());
        assert!(matches!(empty.get(), Err(Error::Exhausted)));

        let mut source = TractographySource::new(test_tracker(), vec![Vec3::splat(10.0)], 1);
        source.get().unwrap();
        assert!(!source.more());
        assert!(matches!(source.get(), Err(Error::Exhausted)));
    }

    #[test]
    fn test_seek_restarts_batch() {
        let seeds = vec![Vec3::splat(10.0)];
        let mut source = TractographySource::new(test_tracker(), seeds, 2);
        while source.more() {
            source.get().unwrap();
        }
        assert!(source.seekable());
        source.seek(0);
        assert!(source.more());
    }

    #[test]
    fn test_parallel_generation_preserves_order() {
        let seeds = vec![Vec3::splat(8.0), Vec3::splat(12.0), Vec3::splat(20.0)];
        let mut source = TractographySource::new(test_tracker(), seeds, 2);

        let parallel = source.generate_all_parallel();
        let mut serial = Vec::new();
        while source.more() {
            serial.push(source.get().unwrap());
        }

        assert_eq!(parallel.len(), serial.len());
        for (a, b) in parallel.iter().zip(&serial) {
            assert_eq!(a.points(), b.points());
        }
    }
}
