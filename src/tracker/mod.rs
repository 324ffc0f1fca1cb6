//! Streamline tracking state machine

pub mod source;

pub use source::TractographySource;

use std::collections::{BTreeSet, HashMap};

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::types::{IVec3, Vec3};
use crate::image::Image;
use crate::space::{ImageSpace, PointType};
use crate::streamline::Streamline;

/// Loopcheck cells span this many voxels per axis
const LOOPCHECK_RATIO: f32 = 5.0;
/// Candidate directions shorter than this are treated as no estimate
const DEGENERATE_LENGTH_SQ: f32 = 1e-12;

/// External diffusion-model capability: given a voxel-space position and an
/// optional reference direction, return a candidate unit fiber orientation
/// or indicate that no usable estimate exists
pub trait OrientationSampler {
    fn sample(&mut self, point: Vec3, reference: Option<Vec3>) -> Option<Vec3>;
}

/// Independent, composable termination policies
#[derive(Clone, Copy, Debug, Default)]
pub struct TrackerFlags {
    /// Terminate a path that revisits a prior position
    pub loopcheck: bool,
    /// Terminate on entering a target region, recording its label
    pub terminate_at_targets: bool,
    /// Terminate on leaving the mask footprint
    pub terminate_outside_mask: bool,
    /// Suppress all termination checks until the path exits the seed voxel
    pub must_leave_mask: bool,
}

/// Tracking parameters
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Maximum total step count across both directions
    pub max_steps: usize,
    /// Step length in world units
    pub step_length: f32,
    /// Minimum inner product of successive unit directions; a curvature proxy
    pub curvature_threshold: f32,
    /// Resolves the sign ambiguity of the very first sampled orientation
    pub rightwards_vector: Option<Vec3>,
    pub flags: TrackerFlags,
    /// Perturb the seed uniformly within its voxel before the first step
    pub jitter: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_steps: 2000,
            step_length: 0.5,
            curvature_threshold: 0.2,
            rightwards_vector: None,
            flags: TrackerFlags::default(),
            jitter: false,
        }
    }
}

/// Why a half-streamline stopped growing
///
/// These are normal outcomes of the stepping loop, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Termination {
    NoEstimate,
    Curvature,
    Loop,
    MaskExit,
    TargetHit,
    MaxSteps,
}

/// Grows one streamline per seed point by stepping through the orientation
/// field in both directions
///
/// Tracking is deterministic for a fixed seed position exactly when jitter
/// is disabled and the sampler is itself deterministic.
#[derive(Clone)]
pub struct Tracker<S> {
    sampler: S,
    config: TrackerConfig,
    space: ImageSpace,
    mask: Option<Image<i16>>,
    targets: Option<Image<i32>>,
    rng: StdRng,
}

impl<S: OrientationSampler> Tracker<S> {
    /// Create a tracker over an image space
    pub fn new(sampler: S, space: ImageSpace, config: TrackerConfig) -> Self {
        Self {
            sampler,
            config,
            space,
            mask: None,
            targets: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed the internal random number generator, for reproducible jitter
    /// and probabilistic rounding
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Supply the bounding mask image (nonzero voxels are inside)
    pub fn with_mask(mut self, mask: Image<i16>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Supply the target-region label image (nonzero voxels are targets)
    pub fn with_targets(mut self, targets: Image<i32>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// The tracking configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The image space tracking runs in
    pub fn space(&self) -> &ImageSpace {
        &self.space
    }

    /// Grow one streamline from a voxel-space seed point
    ///
    /// Two half-streamlines are grown along the opposite signs of the first
    /// sampled orientation and concatenated seed-to-seed; the streamline's
    /// seed index marks the join. Visited target labels from both halves
    /// are attached for downstream filters.
    pub fn generate(&mut self, seed: Vec3) -> Streamline {
        let seed = if self.config.jitter {
            seed + Vec3::new(
                self.rng.gen_range(-0.5..0.5),
                self.rng.gen_range(-0.5..0.5),
                self.rng.gen_range(-0.5..0.5),
            )
        } else {
            seed
        };

        let pixdim = self.space.pixdim();
        let mut data = Streamline::new();

        let first = self
            .sampler
            .sample(seed, self.config.rightwards_vector)
            .filter(|v| v.length_squared() > DEGENERATE_LENGTH_SQ);
        let Some(mut first) = first else {
            trace!("no orientation estimate at seed {seed:?}");
            data.set_points(vec![seed], PointType::Voxel, pixdim);
            return data;
        };
        first = first.normalize();

        // The first estimate is arbitrarily signed; resolve it toward the
        // rightwards vector when one was supplied
        if let Some(rightwards) = self.config.rightwards_vector {
            if first.dot(rightwards) < 0.0 {
                first = -first;
            }
        }

        let half_max = self.config.max_steps / 2;
        let (mut right, mut labels) = self.track_half(seed, first, half_max);
        let (left, more_labels) = self.track_half(seed, -first, half_max);
        labels.extend(more_labels);

        let mut right_points = Vec::with_capacity(right.len() + 1);
        right_points.push(seed);
        right_points.append(&mut right);

        let mut data = Streamline::from_halves(left, right_points, PointType::Voxel, pixdim);
        data.set_labels(labels);
        data
    }

    /// Step one half-streamline from the seed along an initial direction
    ///
    /// Returns the points after the seed, in step order, plus any target
    /// labels encountered.
    fn track_half(
        &mut self,
        seed: Vec3,
        initial: Vec3,
        max_steps: usize,
    ) -> (Vec<Vec3>, BTreeSet<i32>) {
        let pixdim = self.space.pixdim();
        let seed_voxel = seed.round();

        let mut points = Vec::new();
        let mut labels = BTreeSet::new();
        let mut loop_cache: HashMap<IVec3, Vec3> = HashMap::new();
        let mut pos = seed;
        let mut dir = initial;
        let mut left_seed_voxel = false;

        let mut outcome = Termination::MaxSteps;
        for step in 0..max_steps {
            let candidate = if step == 0 {
                dir
            } else {
                match self
                    .sampler
                    .sample(pos, Some(dir))
                    .filter(|v| v.length_squared() > DEGENERATE_LENGTH_SQ)
                {
                    Some(v) => v.normalize(),
                    None => {
                        outcome = Termination::NoEstimate;
                        break;
                    }
                }
            };

            // Orient the candidate consistently with the previous step
            let candidate = if candidate.dot(dir) < 0.0 { -candidate } else { candidate };
            if step > 0 && candidate.dot(dir) < self.config.curvature_threshold {
                outcome = Termination::Curvature;
                break;
            }

            // Step length is in world units; movement in voxel space divides
            // by the voxel size per axis
            pos += candidate * self.config.step_length / pixdim;
            dir = candidate;
            points.push(pos);

            if !left_seed_voxel && pos.round() != seed_voxel {
                left_seed_voxel = true;
            }
            if self.config.flags.must_leave_mask && !left_seed_voxel {
                continue;
            }

            if self.config.flags.loopcheck {
                let cell = (pos / LOOPCHECK_RATIO).floor();
                let cell = IVec3::new(cell.x as i32, cell.y as i32, cell.z as i32);
                if let Some(&previous) = loop_cache.get(&cell) {
                    if previous.dot(dir) < 0.0 {
                        outcome = Termination::Loop;
                        points.pop();
                        break;
                    }
                }
                loop_cache.insert(cell, dir);
            }

            if self.config.flags.terminate_outside_mask {
                if let Some(mask) = &self.mask {
                    let inside = matches!(
                        mask.value_at(pos, PointType::Voxel),
                        Ok(Some(&value)) if value != 0
                    );
                    if !inside {
                        outcome = Termination::MaskExit;
                        points.pop();
                        break;
                    }
                }
            }

            if let Some(targets) = &self.targets {
                if let Ok(Some(&label)) = targets.value_at(pos, PointType::Voxel) {
                    if label != 0 {
                        labels.insert(label);
                        if self.config.flags.terminate_at_targets {
                            outcome = Termination::TargetHit;
                            break;
                        }
                    }
                }
            }
        }

        trace!(
            "half-streamline from {seed:?} stopped after {} steps: {outcome:?}",
            points.len()
        );
        (points, labels)
    }
}
