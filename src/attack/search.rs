//! Exhaustive search for an evasion attack on a single instance.

use std::ops::ControlFlow;

use itertools::Itertools;

use super::enumerate::enumerate_perturbations;
use super::thresholds::{ThresholdSet, ThresholdSets};
use crate::data::{Batch, Label};
use crate::error::AttackError;
use crate::model::Ensemble;

/// Rows reserved up front; the buffer grows towards `batch_size` only if needed.
const INITIAL_BATCH_ROWS: usize = 4096;

/// A perturbed instance the ensemble misclassifies.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterExample {
    /// The attacked feature combination (sorted).
    pub features: Vec<usize>,
    /// The perturbed instance.
    pub instance: Vec<f64>,
    /// What the ensemble predicted for it.
    pub predicted: Label,
}

impl CounterExample {
    /// Feature positions where the counter-example differs from `original`.
    pub fn changed_features(&self, original: &[f64]) -> Vec<usize> {
        original
            .iter()
            .zip(&self.instance)
            .enumerate()
            .filter(|(_, (a, b))| a.to_bits() != b.to_bits())
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    AttackFound(CounterExample),
    NoAttackFound,
}

/// Outcome of one instance's search plus how much work it took.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub outcome: SearchOutcome,
    pub perturbations_tested: u64,
    pub batches_tested: u64,
}

impl SearchResult {
    #[inline(always)]
    pub fn attack_found(&self) -> bool {
        matches!(self.outcome, SearchOutcome::AttackFound(_))
    }
}

/// Tries every perturbation of at most `k` features of `instance`.
///
/// Feature subsets of size exactly `k` are visited in lexicographic order.
/// For each, every batch produced by the enumerator is predicted in a single
/// call to the model and compared against `label`. The first disagreement
/// stops the whole search. Running to completion without one certifies the
/// instance at budget `k` for the threshold-restricted attacker.
///
/// # Arguments
/// * `model` - The ensemble under attack.
/// * `instance` - The original instance. Not modified; the search works on a private copy.
/// * `label` - The instance's true label.
/// * `thresholds` - Candidate values per feature.
/// * `k` - Number of features the attacker may rewrite.
/// * `batch_size` - Maximum number of perturbed instances per model call.
pub fn search_instance<E: Ensemble + ?Sized>(
    model: &E,
    instance: &[f64],
    label: Label,
    thresholds: &ThresholdSets,
    k: usize,
    batch_size: usize,
) -> Result<SearchResult, AttackError> {
    let n_features = instance.len();
    if thresholds.n_features() != n_features {
        return Err(AttackError::FeatureCountMismatch { model: thresholds.n_features(), data: n_features });
    }

    let mut working = instance.to_vec();
    let mut buffer = Batch::with_capacity(n_features, batch_size.clamp(1, INITIAL_BATCH_ROWS))?;
    let mut perturbations_tested = 0u64;
    let mut batches_tested = 0u64;

    for combination in (0..n_features).combinations(k) {
        let choices: Vec<(usize, &ThresholdSet)> =
            combination.iter().map(|&f| (f, thresholds.get(f))).collect();

        let mut check_batch = |batch: &Batch| -> ControlFlow<Result<CounterExample, AttackError>> {
            let predictions = match model.predict(batch) {
                Ok(p) => p,
                Err(e) => return ControlFlow::Break(Err(e)),
            };
            if predictions.len() != batch.n_rows() {
                return ControlFlow::Break(Err(AttackError::Model(format!(
                    "predicted {} labels for a batch of {}",
                    predictions.len(),
                    batch.n_rows()
                ))));
            }
            batches_tested += 1;
            perturbations_tested += batch.n_rows() as u64;

            match predictions.iter().position(|&p| !p.agrees_with(label)) {
                Some(row) => ControlFlow::Break(Ok(CounterExample {
                    features: combination.clone(),
                    instance: batch.row(row).to_vec(),
                    predicted: predictions[row],
                })),
                None => ControlFlow::Continue(()),
            }
        };

        match enumerate_perturbations(&mut working, &choices, &mut buffer, batch_size, &mut check_batch) {
            ControlFlow::Continue(()) => {}
            ControlFlow::Break(Ok(counter_example)) => {
                return Ok(SearchResult {
                    outcome: SearchOutcome::AttackFound(counter_example),
                    perturbations_tested,
                    batches_tested,
                });
            }
            ControlFlow::Break(Err(e)) => return Err(e),
        }
    }

    Ok(SearchResult {
        outcome: SearchOutcome::NoAttackFound,
        perturbations_tested,
        batches_tested,
    })
}
