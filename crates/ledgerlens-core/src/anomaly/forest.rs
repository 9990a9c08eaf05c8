//! Seeded isolation forest
//!
//! Each tree isolates a random subsample by splitting on a random feature
//! at a random threshold. Points that are isolated after few splits are
//! unusual. The score is `2^(-E[h(x)] / c(n))`, so it sits near 0.5 for
//! ordinary points and approaches 1 for outliers.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Average path length of an unsuccessful BST search over `n` points
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

#[derive(Debug)]
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

impl Node {
    fn build(data: &[Vec<f64>], rows: Vec<usize>, depth: usize, limit: usize, rng: &mut StdRng) -> Self {
        if depth >= limit || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        let features = data[rows[0]].len();
        let splittable: Vec<(usize, f64, f64)> = (0..features)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][f]), hi.max(data[r][f]))
                });
                // The uniform sampler needs a finite, non-empty range
                (hi > lo && (hi - lo).is_finite()).then_some((f, lo, hi))
            })
            .collect();
        if splittable.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(data, left, depth + 1, limit, rng)),
            right: Box::new(Node::build(data, right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, point: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] < *threshold {
                    left.path_length(point, depth + 1)
                } else {
                    right.path_length(point, depth + 1)
                }
            }
        }
    }
}

/// A fitted forest
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit `trees` trees over subsamples of at most `sample_size` rows
    ///
    /// The same data, parameters and seed always produce the same forest.
    pub fn fit(data: &[Vec<f64>], trees: usize, sample_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let subsample = sample_size.min(data.len());
        let limit = (subsample.max(2) as f64).log2().ceil() as usize;

        let trees = if subsample == 0 {
            Vec::new()
        } else {
            (0..trees.max(1))
                .map(|_| {
                    let rows = index::sample(&mut rng, data.len(), subsample).into_vec();
                    Node::build(data, rows, 0, limit, &mut rng)
                })
                .collect()
        };

        Self { trees, subsample }
    }

    /// Anomaly score in `(0, 1]`; 0.5 when the forest is empty
    pub fn score(&self, point: &[f64]) -> f64 {
        let c = average_path_length(self.subsample);
        if self.trees.is_empty() || c == 0.0 {
            return 0.5;
        }
        let mean = self
            .trees
            .iter()
            .map(|t| t.path_length(point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean / c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![10.0 + (i % 7) as f64, (i % 3) as f64])
            .collect();
        data.push(vec![900.0, 9.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.24).abs() < 0.05, "c(256) = {}", c256);
    }

    #[test]
    fn test_outlier_scores_highest() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&data, 100, 256, 7);
        let outlier = forest.score(&data[60]);
        let typical = forest.score(&data[3]);
        assert!(outlier > typical);
        assert!(outlier > 0.6, "outlier score {}", outlier);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let data = cluster_with_outlier();
        let a = IsolationForest::fit(&data, 50, 32, 42);
        let b = IsolationForest::fit(&data, 50, 32, 42);
        for point in &data {
            assert_eq!(a.score(point), b.score(point));
        }
    }

    #[test]
    fn test_identical_points_do_not_split() {
        let data = vec![vec![1.0, 1.0]; 20];
        let forest = IsolationForest::fit(&data, 10, 16, 1);
        let s = forest.score(&data[0]);
        // Every tree is a single leaf of 16 points: h = c(16), score = 0.5
        assert!((s - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unbounded_feature_is_not_split() {
        let mut data = cluster_with_outlier();
        data.push(vec![f64::INFINITY, 1.0]);
        data.push(vec![-f64::MAX, 2.0]);
        data.push(vec![f64::MAX, 2.0]);
        let forest = IsolationForest::fit(&data, 20, 64, 3);
        for point in &data {
            let s = forest.score(point);
            assert!(s > 0.0 && s <= 1.0, "score {}", s);
        }
    }

    #[test]
    fn test_empty_forest() {
        let forest = IsolationForest::fit(&[], 10, 16, 1);
        assert_eq!(forest.score(&[1.0]), 0.5);
    }
}
