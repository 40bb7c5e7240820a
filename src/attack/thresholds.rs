//! Per-feature candidate perturbation values.
//!
//! Only threshold crossings change a tree's output, so the attacker's
//! candidate values for a feature are the split thresholds the ensemble uses
//! on it, plus one sentinel larger than every value in the dataset.

use rustc_hash::FxHashSet;

use crate::data::FeatureMatrix;
use crate::error::AttackError;
use crate::model::Ensemble;

/// Distinct candidate values for one feature, sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    values: Vec<f64>,
}

impl ThresholdSet {
    /// Wraps values that are already sorted and distinct.
    pub(crate) fn from_sorted(values: Vec<f64>) -> Self {
        debug_assert!(values.windows(2).all(|w| w[0] < w[1]), "threshold values must be sorted and distinct");
        ThresholdSet { values }
    }

    #[inline(always)]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.values.iter().any(|&v| v == value)
    }
}

/// Candidate values for every feature of the ensemble.
#[derive(Debug, Clone)]
pub struct ThresholdSets {
    sets: Vec<ThresholdSet>,
    sentinel: f64,
}

impl ThresholdSets {
    #[inline(always)]
    pub fn get(&self, feature: usize) -> &ThresholdSet {
        &self.sets[feature]
    }

    #[inline(always)]
    pub fn n_features(&self) -> usize {
        self.sets.len()
    }

    /// The dataset-wide sentinel: global maximum + 1.
    #[inline(always)]
    pub fn sentinel(&self) -> f64 {
        self.sentinel
    }

    /// Size of the full search space for one instance at budget `k`
    /// (saturating), summed over every feature combination.
    pub fn search_space(&self, k: usize) -> u128 {
        fn rec(sets: &[ThresholdSet], k: usize) -> u128 {
            if k == 0 {
                return 1;
            }
            if sets.len() < k {
                return 0;
            }
            let with_first = (sets[0].len() as u128 + 1).saturating_mul(rec(&sets[1..], k - 1));
            with_first.saturating_add(rec(&sets[1..], k))
        }
        rec(&self.sets, k)
    }
}

/// Collects, per feature, every split threshold of the ensemble plus the
/// dataset-wide sentinel (`max(data) + 1`).
///
/// The sentinel is shared by all features, so a feature no tree splits on
/// still gets exactly one candidate. Leaf nodes (negative feature index) are
/// skipped.
pub fn extract_thresholds<E: Ensemble + ?Sized>(
    model: &E,
    data: &FeatureMatrix,
) -> Result<ThresholdSets, AttackError> {
    let n_features = model.n_features();
    let sentinel = data.max_value().ok_or(AttackError::EmptyDataset)? + 1.0;

    // Keyed by bit pattern; 0.0 is normalised first so -0.0 does not duplicate it.
    let mut seen: Vec<FxHashSet<u64>> = vec![FxHashSet::default(); n_features];
    let mut candidates: Vec<Vec<f64>> = vec![Vec::new(); n_features];
    let mut insert = |feature: usize, value: f64| {
        let value = if value == 0.0 { 0.0 } else { value };
        if seen[feature].insert(value.to_bits()) {
            candidates[feature].push(value);
        }
    };

    for feature in 0..n_features {
        insert(feature, sentinel);
    }
    for tree_idx in 0..model.n_trees() {
        for (feature, threshold) in model.tree_splits(tree_idx).internal_splits() {
            if feature >= n_features {
                return Err(AttackError::InvalidModel(format!(
                    "tree {} splits on feature {} but the model has {} features",
                    tree_idx, feature, n_features
                )));
            }
            if !threshold.is_finite() {
                return Err(AttackError::InvalidModel(format!(
                    "tree {} splits feature {} on non-finite threshold {}",
                    tree_idx, feature, threshold
                )));
            }
            insert(feature, threshold);
        }
    }

    let sets = candidates
        .into_iter()
        .map(|mut values| {
            values.sort_unstable_by(f64::total_cmp);
            ThresholdSet::from_sorted(values)
        })
        .collect();
    Ok(ThresholdSets { sets, sentinel })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Label;
    use crate::forest::fixtures::{stump_forest, two_stump_forest};
    use crate::model::SplitArrays;

    #[test]
    fn collects_thresholds_and_sentinel() {
        let forest = two_stump_forest();
        let data = FeatureMatrix::from_rows(vec![vec![0.2, 3.0]]).unwrap();
        let sets = extract_thresholds(&forest, &data).unwrap();

        assert_eq!(sets.sentinel(), 4.0);
        assert_eq!(sets.get(0).values(), &[0.5, 1.5, 4.0]);
        // Feature 1 is never split on but still carries the sentinel.
        assert_eq!(sets.get(1).values(), &[4.0]);
    }

    #[test]
    fn duplicate_thresholds_are_kept_once() {
        let forest = stump_forest(
            1,
            &[
                (0, 0.5, Label::Positive, Label::Negative),
                (0, 0.5, Label::Negative, Label::Positive),
                (0, 2.0, Label::Negative, Label::Positive),
            ],
        );
        let data = FeatureMatrix::from_rows(vec![vec![1.0], vec![-3.0]]).unwrap();
        let sets = extract_thresholds(&forest, &data).unwrap();
        assert_eq!(sets.get(0).values(), &[0.5, 2.0]);
        assert!(sets.get(0).contains(sets.sentinel()));
        assert_eq!(sets.sentinel(), 2.0);
    }

    #[test]
    fn non_finite_thresholds_are_rejected() {
        /// Reports a NaN split, which `Forest` itself would refuse to load.
        struct NanSplits;

        impl Ensemble for NanSplits {
            fn n_features(&self) -> usize {
                1
            }
            fn n_trees(&self) -> usize {
                1
            }
            fn tree_splits(&self, _tree_idx: usize) -> SplitArrays<'_> {
                SplitArrays { features: &[0, 0, -2], thresholds: &[0.5, f64::NAN, -2.0] }
            }
            fn predict(&self, batch: &FeatureMatrix) -> Result<Vec<Label>, AttackError> {
                Ok(vec![Label::Positive; batch.n_rows()])
            }
        }

        let data = FeatureMatrix::from_rows(vec![vec![1.0]]).unwrap();
        let err = extract_thresholds(&NanSplits, &data).unwrap_err();
        assert!(matches!(err, AttackError::InvalidModel(_)));
    }

    #[test]
    fn search_space_counts_choices_per_combination() {
        let forest = two_stump_forest();
        let data = FeatureMatrix::from_rows(vec![vec![0.2, 3.0]]).unwrap();
        let sets = extract_thresholds(&forest, &data).unwrap();
        // Feature 0 has 3 candidates (+ original), feature 1 has 1 (+ original).
        assert_eq!(sets.search_space(0), 1);
        assert_eq!(sets.search_space(1), 4 + 2);
        assert_eq!(sets.search_space(2), 4 * 2);
    }
}
