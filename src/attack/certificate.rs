//! Conservative pruning certificates.
//!
//! A certificate looks at the baseline-correct instances and returns the
//! ones it *cannot* prove robust at budget `k`; the rest skip brute force.
//! Soundness is one-directional: a certificate may keep a robust instance
//! (extra work) but must never drop a breakable one.

use crate::data::{FeatureMatrix, Label};
use crate::error::AttackError;
use crate::forest::{Forest, NUM_CLASSES};
use crate::model::Ensemble;

pub trait PruningCertificate<E: ?Sized>: Sync {
    /// Indices into `instances` that are not certified robust at budget `k`.
    fn fast_lower_bound(
        &self,
        model: &E,
        instances: &FeatureMatrix,
        labels: &[Label],
        k: usize,
    ) -> Result<Vec<usize>, AttackError>;
}

/// Certifies nothing: every instance goes to brute force.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPruning;

impl<E: Ensemble + ?Sized> PruningCertificate<E> for NoPruning {
    fn fast_lower_bound(
        &self,
        _model: &E,
        instances: &FeatureMatrix,
        _labels: &[Label],
        _k: usize,
    ) -> Result<Vec<usize>, AttackError> {
        Ok((0..instances.n_rows()).collect())
    }
}

/// Decision-path cover bound for binary forests.
///
/// A tree's vote can only change if the attacker rewrites a feature tested
/// on the instance's decision path in that tree. Counting, per feature, the
/// correctly-voting trees whose path tests it, the `k` largest counts bound
/// how many correct votes any `k`-feature attack can flip. If the label
/// still wins with that many votes moved to the other class (ties resolved as
/// in [`Forest::predict_row`]), the instance is certified.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathCoverCertificate;

impl PathCoverCertificate {
    /// Upper bound on the correct votes a `k`-feature attack can flip for `row`,
    /// together with the current (correct, wrong) vote counts.
    fn flippable_votes(forest: &Forest, row: &[f64], label: Label, k: usize) -> (u32, u32, u32) {
        let mut touching = vec![0u32; forest.n_features];
        let mut path = Vec::new();
        let mut votes = [0u32; NUM_CLASSES];
        let correct_class = usize::from(label == Label::Positive);

        for tree_idx in 0..forest.n_total_trees {
            path.clear();
            let class = forest.decision_path(tree_idx, row, &mut path);
            votes[class] += 1;
            if class != correct_class {
                continue;
            }
            path.sort_unstable();
            path.dedup();
            for &feature in &path {
                touching[feature] += 1;
            }
        }

        touching.sort_unstable_by(|a, b| b.cmp(a));
        let bound: u32 = touching.iter().take(k).sum();
        (bound, votes[correct_class], votes[1 - correct_class])
    }
}

impl PruningCertificate<Forest> for PathCoverCertificate {
    fn fast_lower_bound(
        &self,
        model: &Forest,
        instances: &FeatureMatrix,
        labels: &[Label],
        k: usize,
    ) -> Result<Vec<usize>, AttackError> {
        if instances.n_rows() != labels.len() {
            return Err(AttackError::ShapeMismatch { instances: instances.n_rows(), labels: labels.len() });
        }
        if instances.n_features() != model.n_features {
            return Err(AttackError::FeatureCountMismatch { model: model.n_features, data: instances.n_features() });
        }

        let mut not_certified = Vec::new();
        for (idx, (row, &label)) in instances.rows().zip(labels).enumerate() {
            let (flippable, correct, wrong) = Self::flippable_votes(model, row, label, k);
            let flipped = flippable.min(correct);
            let (after_correct, after_wrong) = (correct - flipped, wrong + flipped);
            // -1 wins ties, +1 needs a strict majority.
            let survives = match label {
                Label::Negative => after_correct >= after_wrong,
                Label::Positive => after_correct > after_wrong,
            };
            if !survives {
                not_certified.push(idx);
            }
        }
        Ok(not_certified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::search::search_instance;
    use crate::attack::thresholds::extract_thresholds;
    use crate::forest::fixtures::stump_forest;
    use proptest::prelude::*;

    #[test]
    fn no_pruning_keeps_everything() {
        let forest = stump_forest(1, &[(0, 0.5, Label::Negative, Label::Positive)]);
        let x = FeatureMatrix::from_rows(vec![vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        let y = vec![Label::Negative, Label::Positive, Label::Positive];
        assert_eq!(NoPruning.fast_lower_bound(&forest, &x, &y, 1).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn path_cover_certifies_untouchable_majorities() {
        // Three trees on feature 0, one on feature 1: touching feature 1 flips
        // at most one vote out of four.
        let forest = stump_forest(
            2,
            &[
                (0, 0.5, Label::Positive, Label::Negative),
                (0, 0.7, Label::Positive, Label::Negative),
                (0, 0.9, Label::Positive, Label::Negative),
                (1, 0.5, Label::Positive, Label::Negative),
            ],
        );
        let x = FeatureMatrix::from_rows(vec![vec![0.0, 0.0]]).unwrap();
        let y = vec![Label::Positive];
        assert!(PathCoverCertificate.fast_lower_bound(&forest, &x, &y, 0).unwrap().is_empty());
        // Feature 0 alone reaches three of the four votes.
        assert_eq!(PathCoverCertificate.fast_lower_bound(&forest, &x, &y, 1).unwrap(), vec![0]);
    }

    #[test]
    fn path_cover_respects_the_tie_rule() {
        // Three single-feature votes for the label plus one fixed vote against:
        // any one feature flips at most one vote, leaving a 2-2 tie.
        let forest_for = |label: Label, other: Label| {
            stump_forest(
                3,
                &[
                    (0, 0.5, label, other),
                    (1, 0.5, label, other),
                    (2, 0.5, label, other),
                    (0, 0.5, other, other),
                ],
            )
        };
        let x = FeatureMatrix::from_rows(vec![vec![0.0, 0.0, 0.0]]).unwrap();

        let negative = forest_for(Label::Negative, Label::Positive);
        let (bound, correct, wrong) = PathCoverCertificate::flippable_votes(&negative, x.row(0), Label::Negative, 1);
        assert_eq!((bound, correct, wrong), (1, 3, 1));
        // -1 wins the tie, so it is certified.
        assert!(PathCoverCertificate.fast_lower_bound(&negative, &x, &[Label::Negative], 1).unwrap().is_empty());

        // +1 needs a strict majority, so it is not.
        let positive = forest_for(Label::Positive, Label::Negative);
        assert_eq!(PathCoverCertificate.fast_lower_bound(&positive, &x, &[Label::Positive], 1).unwrap(), vec![0]);
    }

    fn arb_forest_and_instance() -> impl Strategy<Value = (Forest, Vec<f64>, Label, usize)> {
        let stump = (0i64..3, 0.0f64..4.0, any::<bool>(), any::<bool>());
        (
            prop::collection::vec(stump, 1..7),
            prop::collection::vec(0.0f64..4.0, 3),
            any::<bool>(),
            0usize..=3,
        )
            .prop_map(|(stumps, x, positive, k)| {
                let as_label = |b: bool| if b { Label::Positive } else { Label::Negative };
                let stumps: Vec<_> = stumps
                    .into_iter()
                    .map(|(f, t, l, r)| (f, t, as_label(l), as_label(r)))
                    .collect();
                (stump_forest(3, &stumps), x, as_label(positive), k)
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(150))]

        #[test]
        fn prop_certified_instances_resist_brute_force((forest, x, label, k) in arb_forest_and_instance()) {
            let data = FeatureMatrix::from_rows(vec![x.clone()]).unwrap();
            prop_assume!(forest.predict_row(&x) == label);

            let kept = PathCoverCertificate.fast_lower_bound(&forest, &data, &[label], k).unwrap();
            if kept.is_empty() {
                let sets = extract_thresholds(&forest, &data).unwrap();
                let result = search_instance(&forest, &x, label, &sets, k, 64).unwrap();
                prop_assert!(!result.attack_found());
            }
        }
    }
}
