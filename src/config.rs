// --- Run Configuration ---
// Compile-time settings for the attack benchmark driver (`main.rs`).
// Change these and rebuild to attack a different dataset or budget.

/// Dataset directory under `data/`, holding `model.json` and `test.csv`.
pub const DATASET_NAME: &str = "banknote";
/// Attacker budgets to evaluate (remember to change [usize; N] to the correct number)
pub const K_VALUES: [usize; 3] = [1, 2, 3];
/// Number of times each budget is attacked, for timing statistics.
pub const NUM_BENCHMARK_RUNS: usize = 1;
/// Worker threads for the per-instance searches.
pub const NUM_THREADS: usize = 4;
/// Emit a debug event per searched instance.
pub const VERBOSE: bool = false;

// --- Memory Budget ---
/// Total bytes the perturbation batches of all workers may hold at once.
pub const MEMORY_CEILING_BYTES: usize = 1_000_000_000;
/// Bytes per stored feature value (`f64`).
pub const BYTES_PER_VALUE: usize = std::mem::size_of::<f64>();

/// Parameters of one brute-force run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackConfig {
    /// Maximum number of features the attacker may rewrite.
    pub k: usize,
    /// Size of the worker pool.
    pub n_threads: usize,
    /// Log every per-instance verdict.
    pub verbose: bool,
    /// Byte budget shared by the batches of all workers.
    pub memory_ceiling_bytes: usize,
}

impl AttackConfig {
    pub fn new(k: usize) -> Self {
        AttackConfig { k, ..Self::default() }
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Static batch size: the memory ceiling split across workers, divided by
    /// the footprint of one instance. Never below 1.
    pub fn batch_size(&self, n_features: usize) -> usize {
        let instance_bytes = BYTES_PER_VALUE * n_features.max(1) * self.n_threads.max(1);
        (self.memory_ceiling_bytes / instance_bytes).max(1)
    }
}

impl Default for AttackConfig {
    fn default() -> Self {
        AttackConfig {
            k: 1,
            n_threads: NUM_THREADS,
            verbose: VERBOSE,
            memory_ceiling_bytes: MEMORY_CEILING_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_divides_the_ceiling() {
        let config = AttackConfig::new(2).with_threads(4);
        // 10^9 / (8 * 10 * 4)
        assert_eq!(config.batch_size(10), 3_125_000);

        let tiny = AttackConfig { memory_ceiling_bytes: 10, ..config };
        assert_eq!(tiny.batch_size(10), 1);
    }
}
