//! The interface the attack engine needs from a tree-ensemble classifier.

use crate::data::{FeatureMatrix, Label};
use crate::error::AttackError;

/// Sentinel value for feature index indicating a leaf node (sklearn convention).
pub const FEATURE_LEAF_SENTINEL: i64 = -2;

/// The split arrays of one tree, sklearn style: `features[node]` is the
/// feature tested at `node` (or [`FEATURE_LEAF_SENTINEL`]) and
/// `thresholds[node]` its threshold.
#[derive(Debug, Clone, Copy)]
pub struct SplitArrays<'a> {
    pub features: &'a [i64],
    pub thresholds: &'a [f64],
}

impl<'a> SplitArrays<'a> {
    /// Iterates `(feature, threshold)` over internal nodes only.
    pub fn internal_splits(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.features
            .iter()
            .zip(self.thresholds.iter())
            .filter(|(&f, _)| f >= 0)
            .map(|(&f, &t)| (f as usize, t))
    }
}

/// A tree-ensemble classifier over sign-encoded labels.
///
/// `predict` is called concurrently from the worker pool, hence `Sync`.
/// Implementations must not mutate shared state during inference.
pub trait Ensemble: Sync {
    /// Width of the instances the model accepts.
    fn n_features(&self) -> usize;

    /// Number of trees in the ensemble.
    fn n_trees(&self) -> usize;

    /// Split arrays of tree `tree_idx`.
    ///
    /// # Panics
    /// May panic if `tree_idx >= self.n_trees()`.
    fn tree_splits(&self, tree_idx: usize) -> SplitArrays<'_>;

    /// Predicts every row of `batch`, preserving row order.
    fn predict(&self, batch: &FeatureMatrix) -> Result<Vec<Label>, AttackError>;
}
