use std::{error::Error, time::{Duration, Instant}};

use tracing::info;

use crate::{
    attack::{brute_force, AttackReport, ProgressCounter, PruningCertificate},
    config::{AttackConfig, K_VALUES, NUM_BENCHMARK_RUNS, NUM_THREADS, VERBOSE},
    cpu_time::CpuStopwatch,
    data::{FeatureMatrix, Label},
    model::Ensemble,
    results::AttackResult,
    utils::calculate_stats,
};

/// Attacks the dataset with a single budget `k`.
///
/// Runs `brute_force` `NUM_BENCHMARK_RUNS` times, collects wall and CPU
/// timings, checks that every run reached the same verdicts, and returns the
/// result row built from the first run.
pub fn benchmark_single_k<E, C>(
    dataset: &str,
    model: &E,
    data: &FeatureMatrix,
    labels: &[Label],
    certificate: &C,
    k: usize,
) -> Result<AttackResult, Box<dyn Error>>
where
    E: Ensemble + ?Sized,
    C: PruningCertificate<E> + ?Sized,
{
    println!("\n--- Attacking {} with k = {} ---", dataset, k);
    let config = AttackConfig { k, n_threads: NUM_THREADS, verbose: VERBOSE, ..AttackConfig::default() };

    let runs = NUM_BENCHMARK_RUNS.max(1);
    let mut wall_durations: Vec<Duration> = Vec::with_capacity(runs);
    let mut search_durations: Vec<Duration> = Vec::with_capacity(runs);
    let mut cpu_total = Duration::ZERO;
    let mut first_report: Option<AttackReport> = None;

    for run in 0..runs {
        let cpu = CpuStopwatch::start();
        let start = Instant::now();
        let progress = ProgressCounter::default();
        let report = brute_force(model, data, labels, &config, certificate, &progress)?;
        wall_durations.push(start.elapsed());
        cpu_total += cpu.elapsed();
        search_durations.push(report.stats.search_duration);
        info!(k, run, searched = progress.finished(), attacked = progress.attacked(), "run finished");

        match &first_report {
            None => first_report = Some(report),
            Some(first) if first.verdicts != report.verdicts => {
                return Err(format!("run {} of k={} disagrees with the first run", run, k).into());
            }
            Some(_) => {}
        }
    }

    let report = first_report.ok_or(format!("no run completed for k={}", k))?;
    let (wall_time_min, wall_time_median, wall_time_max, wall_time_mean) = calculate_stats(&wall_durations);
    let (_, _, _, search_time_mean) = calculate_stats(&search_durations);

    println!(
        "[RESULT] Accuracy under attack: {:.3} (baseline {:.3}), {} counter-examples",
        report.accuracy_under_attack,
        report.baseline_accuracy,
        report.counter_examples.len()
    );
    println!(
        "[RESULT] Wall: min={:.3}s med={:.3}s max={:.3}s mean={:.3}s",
        wall_time_min, wall_time_median, wall_time_max, wall_time_mean
    );
    info!(k, perturbations = report.stats.perturbations_tested, cpu_secs = cpu_total.as_secs_f64(), "budget done");

    Ok(AttackResult {
        wall_time_min,
        wall_time_median,
        wall_time_max,
        wall_time_mean,
        search_time_mean,
        cpu_time: cpu_total.as_secs_f64(),
        ..AttackResult::from_report(dataset, config.n_threads, &report)
    })
}

/// Runs the attack for every configured budget in `K_VALUES`.
pub fn run_benchmarks<E, C>(
    dataset: &str,
    model: &E,
    data: &FeatureMatrix,
    labels: &[Label],
    certificate: &C,
) -> Result<Vec<AttackResult>, Box<dyn Error>>
where
    E: Ensemble + ?Sized,
    C: PruningCertificate<E> + ?Sized,
{
    let mut all_results: Vec<AttackResult> = Vec::with_capacity(K_VALUES.len());
    for &k in K_VALUES.iter() {
        all_results.push(benchmark_single_k(dataset, model, data, labels, certificate, k)?);
    }
    Ok(all_results)
}
