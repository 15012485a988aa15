//! Random Forest
//!
//! Binary CART trees (Gini impurity) stored as flat node arrays so a forest
//! serializes directly to the JSON model artifact.
//!
//! Node layout invariant: a split's children always sit at higher indices
//! than the split itself, so evaluation walks strictly forward and a
//! validated tree cannot loop.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::FEATURE_COUNT;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Weighted impurity decrease, used for feature importances
        #[serde(default)]
        gain: f64,
    },
    Leaf {
        anomaly_probability: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

/// Training parameters
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Candidate features per split
    pub max_features: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 10,
            max_depth: 8,
            min_samples_split: 2,
            max_features: 2, // sqrt(FEATURE_COUNT)
            seed: 42,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training set has {rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("label {0} is not a binary class")]
    InvalidLabel(u8),

    #[error("forest must have at least one tree")]
    NoTrees,

    #[error("expected {expected} features, model declares {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("tree {tree}: {reason}")]
    InvalidTree { tree: usize, reason: String },
}

// ============================================================================
// PREDICTION
// ============================================================================

impl DecisionTree {
    pub fn predict_proba(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { anomaly_probability } => return *anomaly_probability,
                Node::Split { feature, threshold, left, right, .. } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("no nodes".to_string());
        }

        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split { feature, threshold, left, right, gain } => {
                    if *feature >= n_features {
                        return Err(format!("node {} splits on unknown feature {}", i, feature));
                    }
                    if !threshold.is_finite() || !gain.is_finite() {
                        return Err(format!("node {} has a non-finite threshold or gain", i));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= len {
                            return Err(format!("node {} has out-of-order child {}", i, child));
                        }
                    }
                }
                Node::Leaf { anomaly_probability } => {
                    if !(0.0..=1.0).contains(anomaly_probability) {
                        return Err(format!("node {} probability {} outside 0..=1", i, anomaly_probability));
                    }
                }
            }
        }
        Ok(())
    }

    /// Per-feature share of this tree's impurity decrease. All zeros for a single leaf.
    fn importances(&self) -> [f64; FEATURE_COUNT] {
        let mut totals = [0.0; FEATURE_COUNT];
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                if let Some(slot) = totals.get_mut(*feature) {
                    *slot += gain.max(0.0);
                }
            }
        }

        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }
}

impl RandomForest {
    /// Mean anomaly probability across trees
    pub fn predict_proba(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(x)).sum();
        sum / self.trees.len() as f64
    }

    pub fn validate(&self) -> Result<(), ForestError> {
        if self.n_features != FEATURE_COUNT {
            return Err(ForestError::FeatureCount {
                expected: FEATURE_COUNT,
                actual: self.n_features,
            });
        }
        if self.trees.is_empty() {
            return Err(ForestError::NoTrees);
        }
        for (tree, t) in self.trees.iter().enumerate() {
            t.validate(self.n_features)
                .map_err(|reason| ForestError::InvalidTree { tree, reason })?;
        }
        Ok(())
    }

    /// Normalized mean decrease in impurity per feature
    pub fn feature_importances(&self) -> [f64; FEATURE_COUNT] {
        let mut totals = [0.0; FEATURE_COUNT];
        for tree in &self.trees {
            for (slot, v) in totals.iter_mut().zip(tree.importances()) {
                *slot += v;
            }
        }

        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }
}

// ============================================================================
// TRAINING
// ============================================================================

impl RandomForest {
    /// Fit a forest. Deterministic for a given `params.seed`.
    ///
    /// Each tree sees a stratified bootstrap sample: rows are redrawn with
    /// replacement within each class, so every tree trains on both classes
    /// whenever the training set has both.
    pub fn fit(
        x: &[[f64; FEATURE_COUNT]],
        y: &[u8],
        params: &ForestParams,
    ) -> Result<Self, ForestError> {
        if x.is_empty() {
            return Err(ForestError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ForestError::LengthMismatch { rows: x.len(), labels: y.len() });
        }
        if let Some(bad) = y.iter().find(|&&label| label > 1) {
            return Err(ForestError::InvalidLabel(*bad));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let by_class: Vec<Vec<usize>> = (0..=1u8)
            .map(|class| (0..y.len()).filter(|&i| y[i] == class).collect())
            .collect();

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let mut sample = Vec::with_capacity(y.len());
                for rows in by_class.iter().filter(|rows| !rows.is_empty()) {
                    for _ in 0..rows.len() {
                        sample.push(rows[rng.gen_range(0..rows.len())]);
                    }
                }

                let mut nodes = Vec::new();
                let mut builder = TreeBuilder { x, y, params, rng: &mut rng, nodes: &mut nodes };
                builder.build(&sample, 0);
                DecisionTree { nodes }
            })
            .collect();

        Ok(Self { n_features: FEATURE_COUNT, trees })
    }
}

struct TreeBuilder<'a> {
    x: &'a [[f64; FEATURE_COUNT]],
    y: &'a [u8],
    params: &'a ForestParams,
    rng: &'a mut StdRng,
    nodes: &'a mut Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    /// Grow a subtree over `rows` and return its root index.
    fn build(&mut self, rows: &[usize], depth: usize) -> usize {
        let node_id = self.nodes.len();
        let positives = rows.iter().filter(|&&i| self.y[i] == 1).count();
        self.nodes.push(Node::Leaf {
            anomaly_probability: positives as f64 / rows.len() as f64,
        });

        let pure = positives == 0 || positives == rows.len();
        if pure || depth >= self.params.max_depth || rows.len() < self.params.min_samples_split {
            return node_id;
        }

        let Some(split) = self.best_split(rows) else {
            return node_id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.x[i][split.feature] <= split.threshold);

        let left = self.build(&left_rows, depth + 1);
        let right = self.build(&right_rows, depth + 1);

        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            gain: split.gain * rows.len() as f64,
        };
        node_id
    }

    /// Best Gini split over up to `max_features` informative features, visited in random order.
    fn best_split(&mut self, rows: &[usize]) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
        features.shuffle(&mut *self.rng);

        let parent = gini(rows.iter().filter(|&&i| self.y[i] == 1).count(), rows.len());
        let mut best: Option<SplitCandidate> = None;
        let mut informative = 0;

        for feature in features {
            if informative >= self.params.max_features {
                break;
            }

            let mut column: Vec<(f64, u8)> = rows
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            if column.first().map(|c| c.0) == column.last().map(|c| c.0) {
                continue; // constant in this node
            }
            informative += 1;

            let n = column.len();
            let total_pos = column.iter().filter(|c| c.1 == 1).count();
            let mut left_pos = 0;

            for k in 1..n {
                left_pos += usize::from(column[k - 1].1 == 1);
                if column[k - 1].0 == column[k].0 {
                    continue;
                }

                let weighted = (k as f64 / n as f64) * gini(left_pos, k)
                    + ((n - k) as f64 / n as f64) * gini(total_pos - left_pos, n - k);
                let gain = parent - weighted;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (column[k - 1].0 + column[k].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const X: [[f64; FEATURE_COUNT]; 4] = [
        [75.0, 100.0, 45.0, 12.0],
        [85.0, 120.0, 60.0, 15.0],
        [70.0, 95.0, 40.0, 11.0],
        [90.0, 130.0, 70.0, 18.0],
    ];
    const Y: [u8; 4] = [0, 1, 0, 1];

    fn stump(feature: usize, threshold: f64) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                Node::Split { feature, threshold, left: 1, right: 2, gain: 1.0 },
                Node::Leaf { anomaly_probability: 0.0 },
                Node::Leaf { anomaly_probability: 1.0 },
            ],
        }
    }

    #[test]
    fn test_fit_puts_training_rows_on_their_label_side() {
        let forest = RandomForest::fit(&X, &Y, &ForestParams::default()).unwrap();

        assert_eq!(forest.trees.len(), 10);
        assert!(forest.validate().is_ok());
        for (row, label) in X.iter().zip(Y) {
            assert_eq!(forest.predict_proba(row) > 0.5, label == 1, "{row:?}");
        }
        // Interior rows may be outvoted by single trees; these two are not
        assert_eq!(forest.predict_proba(&X[0]), 0.0);
        assert_eq!(forest.predict_proba(&X[3]), 1.0);
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let a = RandomForest::fit(&X, &Y, &ForestParams::default()).unwrap();
        let b = RandomForest::fit(&X, &Y, &ForestParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_bad_training_sets() {
        let params = ForestParams::default();
        assert_eq!(RandomForest::fit(&[], &[], &params), Err(ForestError::EmptyTrainingSet));
        assert_eq!(
            RandomForest::fit(&X, &Y[..3], &params),
            Err(ForestError::LengthMismatch { rows: 4, labels: 3 })
        );
        assert_eq!(RandomForest::fit(&X, &[0, 1, 2, 1], &params), Err(ForestError::InvalidLabel(2)));
    }

    #[test]
    fn test_single_class_training_yields_leaves() {
        let forest = RandomForest::fit(&X[..1], &[0], &ForestParams::default()).unwrap();
        assert!(forest.trees.iter().all(|t| t.nodes.len() == 1));
        assert_eq!(forest.predict_proba(&[999.0; FEATURE_COUNT]), 0.0);
        assert_eq!(forest.feature_importances(), [0.0; FEATURE_COUNT]);
    }

    #[test]
    fn test_predict_averages_trees() {
        let forest = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![stump(0, 80.0), stump(1, 200.0)],
        };
        // Above the temp stump, below the pressure stump
        assert_eq!(forest.predict_proba(&[90.0, 130.0, 0.0, 0.0]), 0.5);
    }

    #[test]
    fn test_feature_importances_sum_to_one() {
        let forest = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![stump(0, 80.0), stump(0, 81.0), stump(2, 50.0), stump(2, 51.0)],
        };
        let imp = forest.feature_importances();
        assert_eq!(imp, [0.5, 0.0, 0.5, 0.0]);

        let trained = RandomForest::fit(&X, &Y, &ForestParams::default()).unwrap();
        let sum: f64 = trained.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_malformed_trees() {
        let mut forest = RandomForest { n_features: FEATURE_COUNT, trees: vec![stump(0, 1.0)] };
        assert!(forest.validate().is_ok());

        forest.trees[0].nodes[0] = Node::Split { feature: 7, threshold: 1.0, left: 1, right: 2, gain: 0.0 };
        assert!(matches!(forest.validate(), Err(ForestError::InvalidTree { tree: 0, .. })));

        // Self-loop would never terminate
        forest.trees[0].nodes[0] = Node::Split { feature: 0, threshold: 1.0, left: 0, right: 2, gain: 0.0 };
        assert!(forest.validate().is_err());

        forest.trees[0] = DecisionTree { nodes: vec![Node::Leaf { anomaly_probability: 1.5 }] };
        assert!(forest.validate().is_err());

        forest.trees.clear();
        assert_eq!(forest.validate(), Err(ForestError::NoTrees));

        let wrong_width = RandomForest { n_features: 3, trees: vec![stump(0, 1.0)] };
        assert_eq!(
            wrong_width.validate(),
            Err(ForestError::FeatureCount { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_artifact_json_shape() {
        let json = r#"{"n_features": 4, "trees": [{"nodes": [
            {"type": "split", "feature": 3, "threshold": 14.0, "left": 1, "right": 2},
            {"type": "leaf", "anomaly_probability": 0.0},
            {"type": "leaf", "anomaly_probability": 1.0}
        ]}]}"#;
        let forest: RandomForest = serde_json::from_str(json).unwrap();
        assert!(forest.validate().is_ok());
        assert_eq!(forest.predict_proba(&[0.0, 0.0, 0.0, 18.0]), 1.0);
        assert_eq!(forest.predict_proba(&[0.0, 0.0, 0.0, 12.0]), 0.0);
    }
}
