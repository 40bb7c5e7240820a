//! Binary Random Forest loaded from a scikit-learn style JSON export.
//!
//! Trees are stored as parallel arrays exactly as sklearn's `tree_` exposes
//! them. Structure is validated once at load time so that traversal during
//! the search can index without further checks.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::data::{FeatureMatrix, Label};
use crate::error::AttackError;
use crate::model::{Ensemble, SplitArrays, FEATURE_LEAF_SENTINEL};

/// Number of classes of a sign-encoded binary forest.
pub const NUM_CLASSES: usize = 2;

/// Sentinel value for child indices indicating a leaf node.
pub const CHILD_LEAF_SENTINEL: i64 = -1;

/// Sentinel value in `leaf_classes` for internal nodes.
const INTERNAL_NODE_CLASS_SENTINEL: usize = usize::MAX;

/// A Random Forest over sign-encoded labels.
///
/// Class index 0 is label -1 and class index 1 is label +1, matching
/// sklearn's sorted `classes_`.
#[derive(Deserialize, Debug, Clone)]
pub struct Forest {
    /// Width of the instances the forest was trained on.
    pub n_features: usize,
    /// The total number of trees in the forest.
    pub n_total_trees: usize,
    /// `features[tree_idx][node_idx]`: split feature, or -2 for leaves.
    pub features: Vec<Vec<i64>>,
    /// `thresholds[tree_idx][node_idx]`: split threshold, -2.0 for leaves.
    pub thresholds: Vec<Vec<f64>>,
    /// Left child (taken if `x[feature] <= threshold`), -1 for leaves.
    pub children_left: Vec<Vec<i64>>,
    /// Right child (taken if `x[feature] > threshold`), -1 for leaves.
    pub children_right: Vec<Vec<i64>>,
    /// `values[tree_idx][node_idx][class_idx]`: class distribution at the node.
    pub values: Vec<Vec<Vec<f64>>>,
    /// Precomputed majority class for each leaf. `usize::MAX` for non-leaves.
    #[serde(skip)]
    leaf_classes: Vec<Vec<usize>>,
}

impl Forest {
    /// Builds a forest from sklearn-style parallel arrays and validates it.
    pub fn new(
        n_features: usize,
        features: Vec<Vec<i64>>,
        thresholds: Vec<Vec<f64>>,
        children_left: Vec<Vec<i64>>,
        children_right: Vec<Vec<i64>>,
        values: Vec<Vec<Vec<f64>>>,
    ) -> Result<Self, AttackError> {
        let mut forest = Forest {
            n_features,
            n_total_trees: features.len(),
            features,
            thresholds,
            children_left,
            children_right,
            values,
            leaf_classes: Vec::new(),
        };
        forest.prepare()?;
        Ok(forest)
    }

    /// Validates structure and precomputes leaf classes.
    fn prepare(&mut self) -> Result<(), AttackError> {
        if self.n_features == 0 {
            return Err(AttackError::NoFeatures);
        }
        if self.n_total_trees == 0 {
            return Err(AttackError::InvalidModel("forest has no trees".into()));
        }
        if self.n_total_trees != self.features.len()
            || self.n_total_trees != self.thresholds.len()
            || self.n_total_trees != self.children_left.len()
            || self.n_total_trees != self.children_right.len()
            || self.n_total_trees != self.values.len()
        {
            return Err(AttackError::InvalidModel(format!(
                "inconsistent number of trees ({}) across the raw arrays",
                self.n_total_trees
            )));
        }

        self.leaf_classes = Vec::with_capacity(self.n_total_trees);
        for tree_idx in 0..self.n_total_trees {
            self.validate_tree(tree_idx)?;
            let leaf_classes = compute_leaf_classes(&self.features[tree_idx], &self.values[tree_idx]);
            self.leaf_classes.push(leaf_classes);
        }
        Ok(())
    }

    fn validate_tree(&self, tree_idx: usize) -> Result<(), AttackError> {
        let features = &self.features[tree_idx];
        let n_nodes = features.len();
        if n_nodes == 0 {
            return Err(AttackError::InvalidModel(format!("tree {} has no nodes", tree_idx)));
        }
        if self.thresholds[tree_idx].len() != n_nodes
            || self.children_left[tree_idx].len() != n_nodes
            || self.children_right[tree_idx].len() != n_nodes
            || self.values[tree_idx].len() != n_nodes
        {
            return Err(AttackError::InvalidModel(format!("tree {} has arrays of different lengths", tree_idx)));
        }

        for (node_idx, &feature) in features.iter().enumerate() {
            if feature == FEATURE_LEAF_SENTINEL {
                if self.values[tree_idx][node_idx].len() != NUM_CLASSES {
                    return Err(AttackError::InvalidModel(format!(
                        "leaf {} of tree {} has {} class values, expected {}",
                        node_idx,
                        tree_idx,
                        self.values[tree_idx][node_idx].len(),
                        NUM_CLASSES
                    )));
                }
                continue;
            }
            if feature < 0 || feature as usize >= self.n_features {
                return Err(AttackError::InvalidModel(format!(
                    "feature index {} at tree {}, node {} is out of bounds (n_features = {})",
                    feature, tree_idx, node_idx, self.n_features
                )));
            }
            if !self.thresholds[tree_idx][node_idx].is_finite() {
                return Err(AttackError::InvalidModel(format!(
                    "non-finite threshold at tree {}, node {}",
                    tree_idx, node_idx
                )));
            }
            // Children must come after their parent, which rules out cycles.
            for child in [self.children_left[tree_idx][node_idx], self.children_right[tree_idx][node_idx]] {
                if child <= node_idx as i64 || child as usize >= n_nodes {
                    return Err(AttackError::InvalidModel(format!(
                        "invalid child index {} at tree {}, node {}",
                        child, tree_idx, node_idx
                    )));
                }
            }
        }
        Ok(())
    }

    /// Walks tree `tree_idx` for `row`, pushing every tested feature onto
    /// `path`. Returns the class index of the reached leaf.
    ///
    /// A feature tested more than once on the path is pushed more than once.
    pub fn decision_path(&self, tree_idx: usize, row: &[f64], path: &mut Vec<usize>) -> usize {
        let features = &self.features[tree_idx];
        let mut node = 0usize;
        loop {
            let feature = features[node];
            if feature == FEATURE_LEAF_SENTINEL {
                return self.leaf_classes[tree_idx][node];
            }
            path.push(feature as usize);
            node = self.next_node(tree_idx, node, row) as usize;
        }
    }

    /// Class index predicted by a single tree.
    #[inline(always)]
    pub fn predict_tree(&self, tree_idx: usize, row: &[f64]) -> usize {
        let features = &self.features[tree_idx];
        let mut node = 0usize;
        while features[node] != FEATURE_LEAF_SENTINEL {
            node = self.next_node(tree_idx, node, row) as usize;
        }
        self.leaf_classes[tree_idx][node]
    }

    #[inline(always)]
    fn next_node(&self, tree_idx: usize, node: usize, row: &[f64]) -> i64 {
        let feature = self.features[tree_idx][node] as usize;
        if row[feature] <= self.thresholds[tree_idx][node] {
            self.children_left[tree_idx][node]
        } else {
            self.children_right[tree_idx][node]
        }
    }

    /// Majority vote over all trees. Ties go to the lower class index (-1).
    pub fn predict_row(&self, row: &[f64]) -> Label {
        let mut votes = [0u32; NUM_CLASSES];
        for tree_idx in 0..self.n_total_trees {
            votes[self.predict_tree(tree_idx, row)] += 1;
        }
        Label::from_class_index(majority_class(&votes))
    }
}

impl Ensemble for Forest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_trees(&self) -> usize {
        self.n_total_trees
    }

    fn tree_splits(&self, tree_idx: usize) -> SplitArrays<'_> {
        SplitArrays {
            features: &self.features[tree_idx],
            thresholds: &self.thresholds[tree_idx],
        }
    }

    fn predict(&self, batch: &FeatureMatrix) -> Result<Vec<Label>, AttackError> {
        if batch.n_features() != self.n_features {
            return Err(AttackError::FeatureCountMismatch {
                model: self.n_features,
                data: batch.n_features(),
            });
        }
        Ok(batch.rows().map(|row| self.predict_row(row)).collect())
    }
}

/// Index of the class with the most votes. Ties are broken by the lower index.
#[inline(always)]
pub fn majority_class(votes: &[u32]) -> usize {
    let mut winning_index = 0;
    for (index, &count) in votes.iter().enumerate().skip(1) {
        if count > votes[winning_index] {
            winning_index = index;
        }
    }
    winning_index
}

/// Computes the majority class of every leaf of one tree.
fn compute_leaf_classes(features: &[i64], values: &[Vec<f64>]) -> Vec<usize> {
    features
        .iter()
        .zip(values)
        .map(|(&feature, node_values)| {
            if feature != FEATURE_LEAF_SENTINEL {
                return INTERNAL_NODE_CLASS_SENTINEL;
            }
            let mut leaf_class = 0;
            for (cls_idx, &val) in node_values.iter().enumerate() {
                if val > node_values[leaf_class] {
                    leaf_class = cls_idx;
                }
            }
            leaf_class
        })
        .collect()
}

/// Loads a forest from a JSON file holding the fields of [`Forest`].
pub fn load_forest<P: AsRef<Path>>(filename: P) -> Result<Forest, AttackError> {
    let filename_ref = filename.as_ref();
    let file_content = fs::read_to_string(filename_ref)?;
    let mut forest: Forest = serde_json::from_str(&file_content)?;
    forest
        .prepare()
        .map_err(|e| AttackError::InvalidModel(format!("{:?}: {}", filename_ref, e)))?;
    Ok(forest)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_majority_ties_go_to_lower_index() {
        assert_eq!(majority_class(&[1, 5]), 1);
        assert_eq!(majority_class(&[3, 3]), 0);
        assert_eq!(majority_class(&[4, 2]), 0);
    }

    #[test]
    fn test_predict_follows_le_to_the_left() {
        let forest = two_stump_forest();
        assert_eq!(forest.predict_row(&[0.2, 3.0]), Label::Positive);
        assert_eq!(forest.predict_row(&[0.5, 3.0]), Label::Positive);
        // One vote each: tie resolved to -1.
        assert_eq!(forest.predict_row(&[1.5, 3.0]), Label::Negative);
        assert_eq!(forest.predict_row(&[4.0, 3.0]), Label::Negative);
    }

    #[test]
    fn test_batch_predict_preserves_order_and_checks_width() {
        let forest = two_stump_forest();
        let batch = FeatureMatrix::from_rows(vec![vec![2.0, 0.0], vec![0.0, 0.0]]).unwrap();
        assert_eq!(forest.predict(&batch).unwrap(), vec![Label::Negative, Label::Positive]);

        let narrow = FeatureMatrix::from_rows(vec![vec![0.0]]).unwrap();
        assert!(matches!(forest.predict(&narrow), Err(AttackError::FeatureCountMismatch { .. })));
    }

    #[test]
    fn test_decision_path_lists_tested_features() {
        let forest = stump_forest(3, &[(2, 1.0, Label::Negative, Label::Positive)]);
        let mut path = Vec::new();
        let class = forest.decision_path(0, &[0.0, 0.0, 5.0], &mut path);
        assert_eq!(class, 1);
        assert_eq!(path, vec![2]);
    }

    #[test]
    fn test_validation_rejects_bad_structure() {
        let (f, t, l, r, v) = stump_arrays(5, 0.5, Label::Negative, Label::Positive);
        let err = Forest::new(2, vec![f], vec![t], vec![l], vec![r], vec![v]).unwrap_err();
        assert!(matches!(err, AttackError::InvalidModel(_)));

        let (f, t, mut l, r, v) = stump_arrays(0, 0.5, Label::Negative, Label::Positive);
        l[0] = 0; // self loop
        assert!(Forest::new(2, vec![f], vec![t], vec![l], vec![r], vec![v]).is_err());

        let (f, mut t, l, r, v) = stump_arrays(0, 0.5, Label::Negative, Label::Positive);
        t[0] = f64::NAN;
        assert!(Forest::new(2, vec![f], vec![t], vec![l], vec![r], vec![v]).is_err());
    }

    #[test]
    fn test_load_forest_from_json() {
        let json = r#"{
            "n_features": 2,
            "n_total_trees": 1,
            "features": [[1, -2, -2]],
            "thresholds": [[0.25, -2.0, -2.0]],
            "children_left": [[1, -1, -1]],
            "children_right": [[2, -1, -1]],
            "values": [[[5.0, 5.0], [9.0, 1.0], [2.0, 8.0]]]
        }"#;
        let dir = std::env::temp_dir().join(format!("rf_attack_forest_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        std::fs::write(&path, json).unwrap();

        let forest = load_forest(&path).unwrap();
        assert_eq!(forest.n_trees(), 1);
        assert_eq!(forest.predict_row(&[9.0, 0.0]), Label::Negative);
        assert_eq!(forest.predict_row(&[9.0, 1.0]), Label::Positive);

        std::fs::remove_file(&path).unwrap();
    }
}
