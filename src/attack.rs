//! Brute-force evasion attacks on tree ensembles with a `k`-feature budget.
//!
//! The attacker may rewrite at most `k` features of an instance, choosing
//! values among the ensemble's own split thresholds (only threshold crossings
//! change a tree's output) plus one sentinel above every observed value.
//! Exhausting that space without a misclassification certifies the instance.
//!
//! Main entry point: [`brute_force`], which
//! 1. extracts the per-feature candidate values ([`thresholds`]),
//! 2. drops instances the model already gets wrong,
//! 3. lets a [`PruningCertificate`] certify what it can cheaply,
//! 4. runs [`search_instance`] for the rest on a rayon worker pool, and
//! 5. aggregates the verdicts into the accuracy under attack.

pub mod certificate;
pub mod enumerate;
pub mod progress;
pub mod search;
pub mod thresholds;

pub use certificate::{NoPruning, PathCoverCertificate, PruningCertificate};
pub use enumerate::enumerate_perturbations;
pub use progress::{AttackObserver, ProgressCounter, SilentObserver};
pub use search::{search_instance, CounterExample, SearchOutcome, SearchResult};
pub use thresholds::{extract_thresholds, ThresholdSet, ThresholdSets};

#[cfg(not(feature = "non-parallel"))]
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::AttackConfig;
use crate::data::{FeatureMatrix, Label};
use crate::error::AttackError;
use crate::model::Ensemble;
use crate::utils::round_to_decimals;

/// Final state of one dataset instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Misclassified without any perturbation. Counts as non-robust.
    BaselineIncorrect,
    /// Proven robust by the pruning certificate; never searched.
    CertifiedRobust,
    /// Brute force found a misclassified perturbation.
    AttackFound,
    /// Brute force exhausted the search space without one.
    NoAttackFound,
}

impl Verdict {
    /// Whether the instance counts towards the accuracy under attack.
    #[inline(always)]
    pub fn is_robust(self) -> bool {
        matches!(self, Verdict::CertifiedRobust | Verdict::NoAttackFound)
    }
}

/// Timing information for the phases of one [`brute_force`] run.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttackStats {
    pub threshold_duration: Duration,
    pub filter_duration: Duration,
    pub search_duration: Duration,
    /// Perturbed instances predicted across all searches.
    pub perturbations_tested: u64,
    pub batch_size: usize,
}

/// Everything a [`brute_force`] run produced.
#[derive(Debug, Clone)]
pub struct AttackReport {
    pub k: usize,
    /// Verdict of every instance, by original dataset index.
    pub verdicts: Vec<Verdict>,
    /// Counter-examples found, sorted by original dataset index.
    pub counter_examples: Vec<(usize, CounterExample)>,
    /// Baseline accuracy (unrounded).
    pub baseline_accuracy: f64,
    /// Fraction of instances that withstand every attack, rounded to three decimals.
    pub accuracy_under_attack: f64,
    pub stats: AttackStats,
}

impl AttackReport {
    pub fn n_instances(&self) -> usize {
        self.verdicts.len()
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.verdicts.iter().filter(|&&v| v == verdict).count()
    }

    pub fn n_robust(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_robust()).count()
    }
}

/// Rejects inputs the search cannot run on before any work is dispatched.
pub fn validate_inputs<E: Ensemble + ?Sized>(
    model: &E,
    data: &FeatureMatrix,
    labels: &[Label],
    k: usize,
) -> Result<(), AttackError> {
    if data.is_empty() {
        return Err(AttackError::EmptyDataset);
    }
    if data.n_rows() != labels.len() {
        return Err(AttackError::ShapeMismatch { instances: data.n_rows(), labels: labels.len() });
    }
    if model.n_features() != data.n_features() {
        return Err(AttackError::FeatureCountMismatch { model: model.n_features(), data: data.n_features() });
    }
    if k > data.n_features() {
        return Err(AttackError::BudgetTooLarge { k, n_features: data.n_features() });
    }
    data.check_finite()
}

/// Computes the accuracy under attack of `model` on (`data`, `labels`).
///
/// Baseline-incorrect instances count 0. Instances `certificate` leaves out
/// count 1 without being searched. Every other instance is searched
/// exhaustively by [`search_instance`] on a pool of `config.n_threads`
/// workers and counts 1 only if no attack exists.
///
/// Any failure inside a search aborts the run with
/// [`AttackError::Task`] naming the original dataset index; no instance is
/// ever silently dropped from the aggregate.
pub fn brute_force<E, C>(
    model: &E,
    data: &FeatureMatrix,
    labels: &[Label],
    config: &AttackConfig,
    certificate: &C,
    observer: &dyn AttackObserver,
) -> Result<AttackReport, AttackError>
where
    E: Ensemble + ?Sized,
    C: PruningCertificate<E> + ?Sized,
{
    let k = config.k;
    validate_inputs(model, data, labels, k)?;
    let n_instances = data.n_rows();
    let mut stats = AttackStats::default();

    // --- 1. Candidate values ---
    let start = Instant::now();
    let thresholds = extract_thresholds(model, data)?;
    stats.batch_size = config.batch_size(data.n_features());
    stats.threshold_duration = start.elapsed();

    // --- 2. Baseline and certificate filtering ---
    let start = Instant::now();
    let predictions = model.predict(data)?;
    if predictions.len() != n_instances {
        return Err(AttackError::Model(format!(
            "predicted {} labels for {} instances",
            predictions.len(),
            n_instances
        )));
    }
    let mut verdicts = vec![Verdict::BaselineIncorrect; n_instances];
    let idx_correct: Vec<usize> = (0..n_instances)
        .filter(|&i| predictions[i].agrees_with(labels[i]))
        .collect();

    let correct_x = data.select_rows(&idx_correct);
    let correct_y: Vec<Label> = idx_correct.iter().map(|&i| labels[i]).collect();
    let mut kept = certificate.fast_lower_bound(model, &correct_x, &correct_y, k)?;
    kept.sort_unstable();
    kept.dedup();
    if let Some(&bad) = kept.iter().find(|&&i| i >= idx_correct.len()) {
        return Err(AttackError::Certificate(format!(
            "returned index {} but only {} instances were submitted",
            bad,
            idx_correct.len()
        )));
    }
    for &i in &idx_correct {
        verdicts[i] = Verdict::CertifiedRobust;
    }
    let idx_broken: Vec<usize> = kept.iter().map(|&i| idx_correct[i]).collect();
    stats.filter_duration = start.elapsed();

    info!(
        k,
        instances = n_instances,
        baseline_correct = idx_correct.len(),
        to_search = idx_broken.len(),
        features = data.n_features(),
        batch_size = stats.batch_size,
        search_space = %thresholds.search_space(k),
        "starting brute-force attack"
    );

    // --- 3. Exhaustive search ---
    let start = Instant::now();
    let run_one = |idx: usize| -> Result<(usize, SearchResult), AttackError> {
        observer.instance_started(idx);
        let result = search_instance(model, data.row(idx), labels[idx], &thresholds, k, stats.batch_size)
            .map_err(|e| e.in_instance(idx))?;
        let verdict = if result.attack_found() { Verdict::AttackFound } else { Verdict::NoAttackFound };
        observer.instance_finished(idx, verdict);
        Ok((idx, result))
    };

    #[cfg(not(feature = "non-parallel"))]
    let results: Vec<(usize, SearchResult)> = {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_threads.max(1))
            .build()
            .map_err(|e| AttackError::ThreadPool(e.to_string()))?;
        pool.install(|| {
            idx_broken
                .par_iter()
                .with_max_len(1)
                .map(|&idx| run_one(idx))
                .collect::<Result<Vec<_>, _>>()
        })?
    };
    #[cfg(feature = "non-parallel")]
    let results: Vec<(usize, SearchResult)> =
        idx_broken.iter().map(|&idx| run_one(idx)).collect::<Result<Vec<_>, _>>()?;
    stats.search_duration = start.elapsed();

    // --- 4. Aggregation ---
    let mut counter_examples = Vec::new();
    for (idx, result) in results {
        stats.perturbations_tested += result.perturbations_tested;
        let perturbations = result.perturbations_tested;
        match result.outcome {
            SearchOutcome::AttackFound(ce) => {
                verdicts[idx] = Verdict::AttackFound;
                counter_examples.push((idx, ce));
            }
            SearchOutcome::NoAttackFound => verdicts[idx] = Verdict::NoAttackFound,
        }
        if config.verbose {
            debug!(instance = idx, verdict = ?verdicts[idx], perturbations, "instance searched");
        }
    }
    counter_examples.sort_by_key(|(idx, _)| *idx);

    let n_robust = verdicts.iter().filter(|v| v.is_robust()).count();
    let accuracy_under_attack = round_to_decimals(n_robust as f64 / n_instances as f64, 3);
    let baseline_accuracy = idx_correct.len() as f64 / n_instances as f64;

    info!(
        k,
        baseline_accuracy,
        accuracy_under_attack,
        attacks = counter_examples.len(),
        "brute-force attack finished"
    );

    Ok(AttackReport {
        k,
        verdicts,
        counter_examples,
        baseline_accuracy,
        accuracy_under_attack,
        stats,
    })
}
