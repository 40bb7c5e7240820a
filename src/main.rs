use std::{error::Error, fs, path::PathBuf};

use tracing_subscriber::EnvFilter;

use rf_attack_certifier::{
    attack::PathCoverCertificate,
    benchmark::run_benchmarks,
    config::DATASET_NAME,
    load_dataset, load_forest,
    results::{append_results_to_csv, print_summary_table, write_csv_header},
};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let dataset_dir = root.join("data").join(DATASET_NAME);
    let model_path = dataset_dir.join("model.json");
    let data_path = dataset_dir.join("test.csv");

    println!("Loading model from {:?}", model_path);
    let forest = load_forest(&model_path)?;
    println!("Loading test set from {:?}", data_path);
    let (data, labels) = load_dataset(&data_path)?;
    println!(
        "Loaded {} trees, {} instances, {} features",
        forest.n_total_trees,
        data.n_rows(),
        data.n_features()
    );

    let results = run_benchmarks(DATASET_NAME, &forest, &data, &labels, &PathCoverCertificate)?;
    print_summary_table(&results);

    let results_dir = root.join("results");
    fs::create_dir_all(&results_dir)?;
    let csv_path = results_dir.join(format!("attack_results_{}.csv", DATASET_NAME));
    write_csv_header(&csv_path)?;
    append_results_to_csv(&results, &csv_path)?;
    println!("Results written to {:?}", csv_path);

    Ok(())
}
