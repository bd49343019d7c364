//! Random-forest classifier over binary labels.
//!
//! Trees are CART with Gini impurity, grown on bootstrap samples with
//! `floor(sqrt(n_features))` candidate features per node. Every tree owns a
//! ChaCha8 stream seeded with `random_state + tree_index`, so the forest is
//! identical whatever the worker count.

use log::debug;
use ndarray::{Array2, ArrayView1};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::error::FitError;
use crate::features::domain::Label;

use super::domain::RandomForestParams;

/// One node of a flattened tree; the root is at index 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Fraction of positive samples that reached the leaf.
        proba: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted CART tree stored as a flat node arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn proba(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { proba, .. } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Random forest with averaged leaf probabilities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: RandomForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    /// Fit `params.n_estimators` trees on `x` and `y`.
    pub fn fit(
        params: &RandomForestParams,
        x: &Array2<f64>,
        y: &[Label],
    ) -> Result<Self, FitError> {
        params.validate()?;
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(FitError::Empty);
        }
        if y.len() != n_rows {
            return Err(FitError::LabelMismatch {
                rows: n_rows,
                labels: y.len(),
            });
        }
        if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(FitError::NonFinite {
                column: format!("x{col}"),
                row,
            });
        }

        let base_seed = params.random_state.unwrap_or_else(rand::random);
        let grower = TreeGrower {
            x,
            y,
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            max_features: ((n_features as f64).sqrt().floor() as usize).max(1),
        };
        let grow = |i: usize| grower.grow(base_seed.wrapping_add(i as u64));

        let trees: Vec<DecisionTree> = match params.n_jobs {
            1 => (0..params.n_estimators).map(grow).collect(),
            -1 => (0..params.n_estimators).into_par_iter().map(grow).collect(),
            k => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(k as usize)
                    .build()
                    .map_err(|e| FitError::WorkerPool(e.to_string()))?;
                pool.install(|| (0..params.n_estimators).into_par_iter().map(grow).collect())
            }
        };
        debug!(
            "forest fitted: {} trees, {} rows, {} features, max depth {}",
            trees.len(),
            n_rows,
            n_features,
            trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
        );

        Ok(Self {
            params: params.clone(),
            n_features,
            trees,
        })
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean positive-class probability per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, FitError> {
        if x.ncols() != self.n_features {
            return Err(FitError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.proba(row)).sum::<f64>() / n_trees)
            .collect())
    }

    /// Class 1 when the mean probability exceeds 0.5.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<Label>, FitError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| Label::from(p > 0.5))
            .collect())
    }
}

struct TreeGrower<'a> {
    x: &'a Array2<f64>,
    y: &'a [Label],
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeGrower<'_> {
    fn grow(&self, seed: u64) -> DecisionTree {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = self.y.len();
        let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
        let mut nodes = Vec::new();
        self.build(&mut nodes, sample, 0, &mut rng);
        DecisionTree { nodes }
    }

    fn build(
        &self,
        nodes: &mut Vec<Node>,
        rows: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let idx = nodes.len();
        let n = rows.len();
        let positives = rows.iter().filter(|&&r| self.y[r] == 1).count();
        let leaf = Node::Leaf {
            proba: positives as f64 / n as f64,
            n_samples: n,
        };

        let pure = positives == 0 || positives == n;
        let too_deep = self.max_depth.is_some_and(|d| depth >= d);
        if pure || too_deep || n < self.min_samples_split {
            nodes.push(leaf);
            return idx;
        }
        let Some(split) = self.best_split(&rows, rng) else {
            nodes.push(leaf);
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.x[[r, split.feature]] <= split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            nodes.push(leaf);
            return idx;
        }
        nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let left = self.build(nodes, left_rows, depth + 1, rng);
        let right = self.build(nodes, right_rows, depth + 1, rng);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut nodes[idx]
        {
            *l = left;
            *r = right;
        }
        idx
    }

    /// Best Gini split over a random feature order; keeps drawing past
    /// `max_features` while every candidate so far was constant.
    fn best_split(&self, rows: &[usize], rng: &mut ChaCha8Rng) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let order = index::sample(rng, n_features, n_features);
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;
        let mut pairs: Vec<(f64, Label)> = Vec::with_capacity(rows.len());

        for feature in order.iter() {
            if visited >= self.max_features {
                break;
            }
            pairs.clear();
            pairs.extend(rows.iter().map(|&r| (self.x[[r, feature]], self.y[r])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            if pairs[0].0 == pairs[pairs.len() - 1].0 {
                continue;
            }
            visited += 1;
            if let Some(candidate) = sweep(&pairs, feature) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }
}

/// Scan sorted `(value, label)` pairs and return the lowest weighted Gini split.
fn sweep(pairs: &[(f64, Label)], feature: usize) -> Option<SplitCandidate> {
    let n = pairs.len();
    let total_pos = pairs.iter().filter(|p| p.1 == 1).count();
    let mut left_pos = 0;
    let mut best: Option<SplitCandidate> = None;

    for i in 0..n - 1 {
        if pairs[i].1 == 1 {
            left_pos += 1;
        }
        if pairs[i].0 == pairs[i + 1].0 {
            continue;
        }
        let left_n = i + 1;
        let right_n = n - left_n;
        let impurity = (left_n as f64 * gini(left_pos, left_n)
            + right_n as f64 * gini(total_pos - left_pos, right_n))
            / n as f64;
        if best.as_ref().map_or(true, |b| impurity < b.impurity) {
            // Midpoint of adjacent floats can round up to the upper value.
            let mut threshold = (pairs[i].0 + pairs[i + 1].0) / 2.0;
            if threshold >= pairs[i + 1].0 {
                threshold = pairs[i].0;
            }
            best = Some(SplitCandidate {
                feature,
                threshold,
                impurity,
            });
        }
    }
    best
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(n_jobs: i32) -> RandomForestParams {
        RandomForestParams {
            n_estimators: 15,
            max_depth: Some(8),
            min_samples_split: 2,
            random_state: Some(7),
            n_jobs,
        }
    }

    /// Label is 1 exactly when the first feature exceeds 5.
    fn threshold_data() -> (Array2<f64>, Vec<Label>) {
        let n = 100;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                (i % 10) as f64
            } else {
                ((i * 7) % 3) as f64
            }
        });
        let y = (0..n).map(|i| Label::from(i % 10 > 5)).collect();
        (x, y)
    }

    #[test]
    fn gini_of_balanced_node_is_half() {
        assert_eq!(gini(2, 4), 0.5);
        assert_eq!(gini(0, 4), 0.0);
        assert_eq!(gini(0, 0), 0.0);
    }

    #[test]
    fn sweep_finds_the_clean_cut() {
        let pairs = [(1.0, 0), (2.0, 0), (3.0, 1), (4.0, 1)];
        let split = sweep(&pairs, 0).unwrap();
        assert_eq!(split.threshold, 2.5);
        assert_eq!(split.impurity, 0.0);
    }

    #[test]
    fn sweep_skips_tied_values() {
        let pairs = [(1.0, 0), (1.0, 1)];
        assert!(sweep(&pairs, 0).is_none());
    }

    fn next_up(v: f64) -> f64 {
        f64::from_bits(v.to_bits() + 1)
    }

    #[test]
    fn sweep_keeps_adjacent_floats_apart() {
        let a = next_up(1.0);
        let b = next_up(a);
        let split = sweep(&[(a, 0), (a, 0), (b, 1), (b, 1)], 0).unwrap();
        assert_eq!(split.threshold, a);
    }

    #[test]
    fn unbounded_tree_on_adjacent_floats_terminates() {
        let a = next_up(1.0);
        let b = next_up(a);
        let x = Array2::from_shape_vec((4, 1), vec![a, a, b, b]).unwrap();
        let y = [0, 0, 1, 1];
        let grower = TreeGrower {
            x: &x,
            y: &y,
            max_depth: None,
            min_samples_split: 2,
            max_features: 1,
        };
        let mut nodes = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        grower.build(&mut nodes, vec![0, 1, 2, 3], 0, &mut rng);
        let tree = DecisionTree { nodes };

        assert_eq!(tree.nodes().len(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.proba(x.row(0)), 0.0);
        assert_eq!(tree.proba(x.row(3)), 1.0);
        assert!(tree.nodes().iter().all(|n| match n {
            Node::Leaf { proba, .. } => proba.is_finite(),
            Node::Split { .. } => true,
        }));
    }

    #[test]
    fn learns_a_threshold() {
        let (x, y) = threshold_data();
        let forest = RandomForestClassifier::fit(&params(1), &x, &y).unwrap();
        assert_eq!(forest.trees().len(), 15);
        let rows = array![[0.0, 1.0], [9.0, 1.0]];
        assert_eq!(forest.predict(&rows).unwrap(), vec![0, 1]);
    }

    #[test]
    fn worker_count_does_not_change_the_model() {
        let (x, y) = threshold_data();
        let sequential = RandomForestClassifier::fit(&params(1), &x, &y).unwrap();
        let pooled = RandomForestClassifier::fit(&params(3), &x, &y).unwrap();
        let global = RandomForestClassifier::fit(&params(-1), &x, &y).unwrap();
        assert_eq!(sequential.trees(), pooled.trees());
        assert_eq!(sequential.trees(), global.trees());
    }

    #[test]
    fn depth_is_bounded() {
        let (x, y) = threshold_data();
        let mut p = params(1);
        p.max_depth = Some(1);
        let forest = RandomForestClassifier::fit(&p, &x, &y).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn single_class_yields_leaves() {
        let x = Array2::from_shape_fn((6, 2), |(i, j)| (i + j) as f64);
        let forest = RandomForestClassifier::fit(&params(1), &x, &[0; 6]).unwrap();
        assert!(forest.trees().iter().all(|t| t.nodes().len() == 1));
        assert_eq!(forest.predict_proba(&x).unwrap(), vec![0.0; 6]);
    }

    #[test]
    fn rejects_nan() {
        let x = array![[1.0, f64::NAN], [2.0, 3.0]];
        let err = RandomForestClassifier::fit(&params(1), &x, &[0, 1]).unwrap_err();
        assert!(matches!(err, FitError::NonFinite { row: 0, .. }));
    }

    #[test]
    fn rejects_empty_and_mismatched_input() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            RandomForestClassifier::fit(&params(1), &empty, &[]),
            Err(FitError::Empty)
        ));
        let x = array![[1.0], [2.0]];
        assert!(matches!(
            RandomForestClassifier::fit(&params(1), &x, &[1]),
            Err(FitError::LabelMismatch { rows: 2, labels: 1 })
        ));
    }

    #[test]
    fn predict_checks_column_count() {
        let (x, y) = threshold_data();
        let forest = RandomForestClassifier::fit(&params(1), &x, &y).unwrap();
        let err = forest.predict(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, FitError::ShapeMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn round_trips_through_json() {
        let (x, y) = threshold_data();
        let forest = RandomForestClassifier::fit(&params(1), &x, &y).unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let back: RandomForestClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predict(&x).unwrap(), forest.predict(&x).unwrap());
    }
}
