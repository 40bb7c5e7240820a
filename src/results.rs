use std::{error::Error, fs::{File, OpenOptions}, path::Path};

use csv::WriterBuilder;

use crate::attack::{AttackReport, Verdict};

/// One row of the results table: a dataset attacked at one budget.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackResult {
    pub dataset: String,
    pub k: usize,
    pub n_threads: usize,
    // --- Verdict Counts ---
    pub n_instances: usize,
    pub baseline_incorrect: usize,
    pub certified: usize,     // Skipped thanks to the pruning certificate
    pub attacked: usize,      // Brute force found a counter-example
    pub not_attacked: usize,  // Brute force exhausted the space
    // --- Metrics ---
    pub baseline_accuracy: f64,
    pub accuracy_under_attack: f64,
    pub perturbations_tested: u64,
    // --- Wall Time Metrics (seconds, over NUM_BENCHMARK_RUNS) ---
    pub wall_time_min: f64,
    pub wall_time_median: f64,
    pub wall_time_max: f64,
    pub wall_time_mean: f64,
    pub search_time_mean: f64, // Time inside the worker pool only
    // --- CPU Time (seconds, all threads, summed over runs) ---
    pub cpu_time: f64,
}

impl AttackResult {
    /// Fills the count and metric columns from a report; timings start at zero.
    pub fn from_report(dataset: &str, n_threads: usize, report: &AttackReport) -> Self {
        AttackResult {
            dataset: dataset.to_string(),
            k: report.k,
            n_threads,
            n_instances: report.n_instances(),
            baseline_incorrect: report.count(Verdict::BaselineIncorrect),
            certified: report.count(Verdict::CertifiedRobust),
            attacked: report.count(Verdict::AttackFound),
            not_attacked: report.count(Verdict::NoAttackFound),
            baseline_accuracy: report.baseline_accuracy,
            accuracy_under_attack: report.accuracy_under_attack,
            perturbations_tested: report.stats.perturbations_tested,
            wall_time_min: 0.0,
            wall_time_median: 0.0,
            wall_time_max: 0.0,
            wall_time_mean: 0.0,
            search_time_mean: report.stats.search_duration.as_secs_f64(),
            cpu_time: 0.0,
        }
    }
}

/// Prints a formatted summary table of attack results to the console.
pub fn print_summary_table(results: &[AttackResult]) {
    println!("\n======== ATTACK SUMMARY ========");
    println!("Dataset        | k | Thr | Inst  | Wrong | Cert  | Broken | Robust | Base Acc | Acc@k | Wall (min, s) | CPU (s)");
    println!("---------------|---|-----|-------|-------|-------|--------|--------|----------|-------|---------------|--------");
    for result in results {
        println!(
            "{:<14} |{:>2} | {:>3} | {:>5} | {:>5} | {:>5} | {:>6} | {:>6} | {:>8.3} | {:>5.3} | {:>13.3} | {:>7.3}",
            result.dataset,
            result.k,
            result.n_threads,
            result.n_instances,
            result.baseline_incorrect,
            result.certified,
            result.attacked,
            result.not_attacked,
            result.baseline_accuracy,
            result.accuracy_under_attack,
            result.wall_time_min,
            result.cpu_time
        );
    }
    println!("================================");
}

/// Writes only the header row to the specified CSV file. Creates the file if needed.
pub fn write_csv_header(csv_path: &Path) -> Result<(), Box<dyn Error>> {
    let file = File::create(csv_path)?;
    let mut wtr = WriterBuilder::new().from_writer(file);
    wtr.write_record([
        "Dataset", "k", "Threads",
        "Instances", "BaselineIncorrect", "Certified", "Attacked", "NotAttacked",
        "BaselineAccuracy", "AccuracyUnderAttack", "PerturbationsTested",
        "WallTime_Min", "WallTime_Median", "WallTime_Max", "WallTime_Mean", "SearchTime_Mean",
        "CpuTime",
    ])?;
    wtr.flush()?;
    Ok(())
}

/// Appends `results` as data rows to an existing CSV file.
pub fn append_results_to_csv(results: &[AttackResult], csv_path: &Path) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().append(true).open(csv_path)?;
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);

    for result in results {
        wtr.write_record(&[
            result.dataset.clone(),
            result.k.to_string(),
            result.n_threads.to_string(),
            result.n_instances.to_string(),
            result.baseline_incorrect.to_string(),
            result.certified.to_string(),
            result.attacked.to_string(),
            result.not_attacked.to_string(),
            format!("{:.6}", result.baseline_accuracy),
            format!("{:.3}", result.accuracy_under_attack),
            result.perturbations_tested.to_string(),
            format!("{:.6}", result.wall_time_min),
            format!("{:.6}", result.wall_time_median),
            format!("{:.6}", result.wall_time_max),
            format!("{:.6}", result.wall_time_mean),
            format!("{:.6}", result.search_time_mean),
            format!("{:.6}", result.cpu_time),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
