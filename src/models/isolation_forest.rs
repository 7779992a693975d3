//! Isolation forest over standardized feature vectors.
//!
//! Each tree isolates a random sub-sample by splitting on a random feature at
//! a random threshold. Outliers are isolated in fewer splits, so a short
//! average path length means a high anomaly score.

use crate::error::{EngineError, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// One isolation tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build(data: &[Vec<f64>], indices: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: build_node(data, indices, 0, height_limit, rng),
        }
    }

    /// Path length of `x`, with the expected remainder added at leaves
    pub fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

fn build_node(
    data: &[Vec<f64>],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only features that still vary inside this node can separate samples
    let dims = data[indices[0]].len();
    let mut candidates = Vec::with_capacity(dims);
    for feature in 0..dims {
        let (min, max) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            let v = data[i][feature];
            (lo.min(v), hi.max(v))
        });
        if max > min {
            candidates.push((feature, min, max));
        }
    }

    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = if (max - min).is_finite() {
        rng.gen_range(min..max)
    } else {
        let u: f64 = rng.gen();
        min * (1.0 - u) + max * u
    };

    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| data[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(data, left, depth + 1, height_limit, rng)),
        right: Box::new(build_node(data, right, depth + 1, height_limit, rng)),
    }
}

/// Average path length of an unsuccessful search in a binary search tree of `n` nodes
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Trained forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    dimension: usize,
}

impl IsolationForest {
    /// Fit a forest on `data`. Deterministic for a given seed.
    pub fn fit(data: &[Vec<f64>], params: &ForestParams) -> Result<Self> {
        if data.len() < 2 {
            return Err(EngineError::InsufficientData {
                required: 2,
                actual: data.len(),
            });
        }
        if params.n_estimators == 0 {
            return Err(EngineError::Validation(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if params.max_samples < 2 {
            return Err(EngineError::Validation(
                "max_samples must be at least 2".to_string(),
            ));
        }

        let dimension = data[0].len();
        if let Some(row) = data.iter().find(|row| row.len() != dimension) {
            return Err(EngineError::DimensionMismatch {
                expected: dimension,
                actual: row.len(),
            });
        }

        let sample_size = params.max_samples.min(data.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let indices = sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::build(data, indices, height_limit, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Anomaly score in (0, 1]; higher is more anomalous, ~0.5 is unremarkable
    pub fn score(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                actual: x.len(),
            });
        }

        let mean_path =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size);

        Ok(2f64.powf(-mean_path / normalizer))
    }
}

/// Score at quantile `q` of `scores` with linear interpolation
pub fn quantile(scores: &[f64], q: f64) -> f64 {
    if scores.is_empty() {
        return f64::NAN;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let t = i as f64 / 40.0;
                vec![t.sin() * 0.1, t.cos() * 0.1]
            })
            .collect();
        data.push(vec![8.0, -8.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn test_outlier_scores_higher() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();

        let outlier = forest.score(&[8.0, -8.0]).unwrap();
        let inlier = forest.score(&data[5]).unwrap();
        assert!(outlier > inlier, "outlier {outlier} <= inlier {inlier}");
        assert!(outlier > 0.5);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = cluster_with_outlier();
        let a = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        let b = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_samples_produce_neutral_scores() {
        let data = vec![vec![1.0, 1.0]; 20];
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();

        let score = forest.score(&[1.0, 1.0]).unwrap();
        assert!((score - 0.5).abs() < 1e-12);
        // Every tree is a single leaf, so any point gets the same score
        assert_eq!(forest.score(&[100.0, -3.0]).unwrap(), score);
    }

    #[test]
    fn test_split_across_full_float_range() {
        let data: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![if i % 2 == 0 { f64::MAX } else { -f64::MAX }, i as f64])
            .collect();
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();

        let score = forest.score(&[f64::MAX, 3.0]).unwrap();
        assert!(score.is_finite() && score > 0.0 && score <= 1.0);
    }

    #[test]
    fn test_score_dimension_mismatch() {
        let forest = IsolationForest::fit(&cluster_with_outlier(), &ForestParams::default()).unwrap();
        assert!(matches!(
            forest.score(&[1.0]),
            Err(EngineError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_quantile_interpolates() {
        let scores = [0.1, 0.4, 0.2, 0.3];
        assert!((quantile(&scores, 0.5) - 0.25).abs() < 1e-12);
        assert_eq!(quantile(&scores, 1.0), 0.4);
        assert_eq!(quantile(&scores, 0.0), 0.1);
    }
}
