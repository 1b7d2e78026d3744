//! Periodically retrained isolation-forest-style anomaly detector
//!
//! A bounded forest rebuilt every `retrain_interval` observations from the
//! recent feature window. Between retrains, points are scored by the
//! normalized average path length needed to isolate them: short paths mean
//! easy isolation, i.e. anomalous points.

use crate::features::FeatureVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tracing::debug;

const DIM: usize = FeatureVector::DIM;

/// Euler-Mascheroni constant for the average path normalizer
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Minimum buffered samples before a retrain is attempted
const MIN_TRAIN_SAMPLES: usize = 50;

/// Default score threshold for the firing decision
const SCORE_THRESHOLD: f64 = 0.6;

#[derive(Debug)]
enum ITreeNode {
    Internal {
        dim: usize,
        split: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug)]
struct ITree {
    nodes: Vec<ITreeNode>,
}

/// Isolation forest detector with bounded periodic retraining
#[derive(Debug)]
pub struct IsolationForestDetector {
    n_estimators: usize,
    sample_size: usize,
    retrain_interval: usize,
    window_size: usize,
    buffer: VecDeque<[f64; DIM]>,
    forest: Vec<ITree>,
    trained_sample: usize,
    since_train: usize,
    rng: StdRng,
    anomaly_count: u64,
}

impl IsolationForestDetector {
    /// Create a detector with `n_estimators` trees over sub-samples of
    /// `sample_size`, rebuilt every `retrain_interval` observations from a
    /// buffer of at most `window_size` feature vectors
    #[must_use]
    pub fn new(
        n_estimators: usize,
        sample_size: usize,
        retrain_interval: usize,
        window_size: usize,
        seed: u64,
    ) -> Self {
        let sample_size = sample_size.clamp(8, 512);
        Self {
            n_estimators: n_estimators.clamp(1, 200),
            sample_size,
            retrain_interval: retrain_interval.max(1),
            window_size: window_size.max(sample_size),
            buffer: VecDeque::new(),
            forest: Vec::new(),
            trained_sample: 0,
            since_train: 0,
            rng: StdRng::seed_from_u64(seed),
            anomaly_count: 0,
        }
    }

    /// Score the point with the current forest, then buffer it and retrain
    /// when the cadence comes due
    ///
    /// Neutral 0 until the first fit.
    pub fn observe(&mut self, features: &FeatureVector) -> f64 {
        let point = features.as_array();
        let score = if self.forest.is_empty() {
            0.0
        } else {
            self.score(&point)
        };

        if self.buffer.len() == self.window_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(point);

        self.since_train += 1;
        if self.since_train >= self.retrain_interval {
            // Deferred, not forced: an undersized buffer waits for the
            // next cycle rather than fitting a degenerate forest
            if self.buffer.len() >= MIN_TRAIN_SAMPLES {
                self.retrain();
                self.since_train = 0;
            }
        }

        if self.is_anomaly(score) {
            self.anomaly_count += 1;
        }
        score
    }

    /// True when the score is past the firing boundary
    #[must_use]
    pub fn is_anomaly(&self, score: f64) -> bool {
        score > SCORE_THRESHOLD
    }

    /// True once a forest has been fitted
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.forest.is_empty()
    }

    /// Buffered feature vectors
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Observations that fired so far
    #[must_use]
    pub const fn anomaly_count(&self) -> u64 {
        self.anomaly_count
    }

    /// Rebuild the forest from bounded random sub-samples of the buffer
    ///
    /// Work per retrain is capped by `n_estimators` trees of at most
    /// `sample_size` points and height ceil(log2(sample_size)).
    fn retrain(&mut self) {
        let data: Vec<[f64; DIM]> = self.buffer.iter().copied().collect();
        let sample = self.sample_size.min(data.len());
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let height_limit = (sample as f64).log2().ceil() as usize;

        let mut forest = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let mut indices: Vec<usize> =
                (0..sample).map(|_| self.rng.gen_range(0..data.len())).collect();
            let mut tree = ITree { nodes: Vec::new() };
            Self::build_node(&mut tree, &data, &mut indices, 0, height_limit, &mut self.rng);
            forest.push(tree);
        }
        self.forest = forest;
        self.trained_sample = sample;
        debug!(samples = data.len(), trees = self.forest.len(), "isolation forest retrained");
    }

    fn build_node(
        tree: &mut ITree,
        data: &[[f64; DIM]],
        indices: &mut [usize],
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        if depth >= height_limit || indices.len() <= 1 {
            let id = tree.nodes.len();
            tree.nodes.push(ITreeNode::Leaf {
                size: indices.len(),
            });
            return id;
        }

        // Pick a dimension with spread; give up after a few draws
        let span = |indices: &[usize], dim: usize| {
            let lo = indices.iter().map(|&i| data[i][dim]).fold(f64::INFINITY, f64::min);
            let hi = indices
                .iter()
                .map(|&i| data[i][dim])
                .fold(f64::NEG_INFINITY, f64::max);
            (lo, hi)
        };
        let mut dim = rng.gen_range(0..DIM);
        let (mut lo, mut hi) = span(indices, dim);
        for _ in 0..DIM {
            if hi > lo {
                break;
            }
            dim = rng.gen_range(0..DIM);
            (lo, hi) = span(indices, dim);
        }
        if hi <= lo {
            let id = tree.nodes.len();
            tree.nodes.push(ITreeNode::Leaf {
                size: indices.len(),
            });
            return id;
        }

        let split = rng.gen_range(lo..hi);
        let mut mid = 0;
        for i in 0..indices.len() {
            if data[indices[i]][dim] < split {
                indices.swap(i, mid);
                mid += 1;
            }
        }
        // A random split inside (lo, hi) always separates at least one point
        let id = tree.nodes.len();
        tree.nodes.push(ITreeNode::Leaf { size: 0 });

        let (left_ids, right_ids) = indices.split_at_mut(mid);
        let left = Self::build_node(tree, data, left_ids, depth + 1, height_limit, rng);
        let right = Self::build_node(tree, data, right_ids, depth + 1, height_limit, rng);
        tree.nodes[id] = ITreeNode::Internal {
            dim,
            split,
            left,
            right,
        };
        id
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, point: &[f64; DIM]) -> f64 {
        let avg_path: f64 = self
            .forest
            .iter()
            .map(|tree| Self::path_length(tree, point))
            .sum::<f64>()
            / self.forest.len() as f64;
        let norm = average_path_length(self.trained_sample);
        if norm <= 0.0 {
            return 0.0;
        }
        2.0f64.powf(-avg_path / norm)
    }

    #[allow(clippy::cast_precision_loss)]
    fn path_length(tree: &ITree, point: &[f64; DIM]) -> f64 {
        let mut node = 0usize;
        let mut depth = 0usize;
        loop {
            match &tree.nodes[node] {
                ITreeNode::Leaf { size } => {
                    return depth as f64 + average_path_length(*size);
                }
                ITreeNode::Internal {
                    dim,
                    split,
                    left,
                    right,
                } => {
                    node = if point[*dim] < *split { *left } else { *right };
                    depth += 1;
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
#[allow(clippy::cast_precision_loss)]
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let nf = n as f64;
    let harmonic = (nf - 1.0).ln() + EULER_GAMMA;
    2.0 * harmonic - 2.0 * (nf - 1.0) / nf
}
