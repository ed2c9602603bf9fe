//! Isolation forest: an ensemble of randomized partitioning trees.
//!
//! Each tree recursively splits a subsample of the training rows on a
//! random feature at a random cut point until rows are isolated or a depth
//! limit is reached. Outliers isolate in fewer splits, so a short average
//! path length across the ensemble marks an anomalous row. The ensemble is
//! built from a caller-seeded RNG, so identical training input and seed
//! produce an identical forest (and identical scores).

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Euler–Mascheroni constant, used in the average path length estimate.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// One node of an isolation tree, stored in a flat arena so the tree
/// serializes without recursion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Number of training rows that ended in this leaf.
        size: usize,
    },
}

/// A single isolation tree. The root is node 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    /// Grow a tree over `rows` (indices into `data`), splitting until rows
    /// are isolated, become constant, or `height_limit` is reached.
    fn fit(data: &[Vec<f64>], rows: &[usize], height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, rows, 0, height_limit, rng);
        tree
    }

    /// Recursively grow the subtree for `rows`; returns the node index.
    fn grow(
        &mut self,
        data: &[Vec<f64>],
        rows: &[usize],
        height: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        if rows.len() <= 1 || height >= height_limit {
            return self.push(Node::Leaf { size: rows.len() });
        }

        // Candidate features: those not constant over the current rows.
        let dims = data[rows[0]].len();
        let mut spreads = Vec::with_capacity(dims);
        for feature in 0..dims {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for &r in rows {
                let v = data[r][feature];
                min = min.min(v);
                max = max.max(v);
            }
            if max > min {
                spreads.push((feature, min, max));
            }
        }
        if spreads.is_empty() {
            // All rows identical in every feature; cannot split further.
            return self.push(Node::Leaf { size: rows.len() });
        }

        let (feature, min, max) = spreads[rng.random_range(0..spreads.len())];
        let threshold = rng.random_range(min..max);

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| data[r][feature] < threshold);

        // Reserve the split slot before growing children so the root stays
        // at index 0.
        let slot = self.push(Node::Leaf { size: 0 });
        let left = self.grow(data, &left_rows, height + 1, height_limit, rng);
        let right = self.grow(data, &right_rows, height + 1, height_limit, rng);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Path length from the root to the leaf this row falls into, plus the
    /// unbuilt-subtree estimate `c(leaf size)`.
    fn path_length(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Expected path length `c(n)` of an unsuccessful BST search over `n` rows.
///
/// Normalizes raw path lengths into the `2^(-E[h]/c(n))` score.
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

/// The trained ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Rows per tree actually used at fit time (min of the configured
    /// subsample size and the training row count).
    subsample_size: usize,
}

impl IsolationForest {
    /// Fit `tree_count` trees, each over a random subsample of up to
    /// `subsample_size` rows drawn without replacement from `data`.
    ///
    /// `data` must be non-empty and rectangular; the caller (the model
    /// training path) guarantees both.
    pub fn fit(
        data: &[Vec<f64>],
        tree_count: usize,
        subsample_size: usize,
        rng: &mut StdRng,
    ) -> Self {
        let n = data.len();
        let subsample = subsample_size.min(n).max(1);
        let height_limit = (subsample as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..tree_count)
            .map(|_| {
                let rows = sample_without_replacement(n, subsample, rng);
                IsolationTree::fit(data, &rows, height_limit, rng)
            })
            .collect();

        Self {
            trees,
            subsample_size: subsample,
        }
    }

    /// Anomaly score in `(0, 1]`: near 1 for isolated outliers, around 0.5
    /// and below for inliers.
    pub fn score(&self, row: &[f64]) -> f64 {
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(row))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.subsample_size).max(f64::MIN_POSITIVE);
        2f64.powf(-mean_path / norm)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Draw `k` distinct indices from `0..n` via a partial Fisher–Yates pass.
fn sample_without_replacement(n: usize, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let k = k.min(n);
    for i in 0..k {
        let j = rng.random_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
