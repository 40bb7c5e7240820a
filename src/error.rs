//! Error type shared by the attack engine and its collaborators.

use thiserror::Error;

/// Errors raised while validating inputs, loading models or running a search.
///
/// Input-contract violations are reported before any search is dispatched.
/// Failures inside a per-instance search are wrapped in [`AttackError::Task`]
/// so the caller learns which dataset row aborted the run.
#[derive(Debug, Error)]
pub enum AttackError {
    #[error("instance/label count mismatch: {instances} instances, {labels} labels")]
    ShapeMismatch { instances: usize, labels: usize },

    #[error("model expects {model} features but the data has {data}")]
    FeatureCountMismatch { model: usize, data: usize },

    #[error("row has {found} values, expected {expected}")]
    RowWidthMismatch { expected: usize, found: usize },

    #[error("budget k = {k} exceeds the number of features ({n_features})")]
    BudgetTooLarge { k: usize, n_features: usize },

    #[error("non-finite value {value} at row {row}, column {col}")]
    NonFiniteValue { row: usize, col: usize, value: f64 },

    #[error("dataset contains no instances")]
    EmptyDataset,

    #[error("dataset has no feature columns")]
    NoFeatures,

    #[error("invalid label {value:?} at row {row}: expected -1 or +1")]
    InvalidLabel { row: usize, value: String },

    #[error("column '{column}' not found in {path}")]
    MissingColumn { column: String, path: String },

    #[error("cannot parse {value:?} at row {row}, column {col}")]
    Parse { row: usize, col: usize, value: String },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("model inference failed: {0}")]
    Model(String),

    #[error("pruning certificate failed: {0}")]
    Certificate(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("search for instance {instance} failed: {source}")]
    Task {
        instance: usize,
        #[source]
        source: Box<AttackError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AttackError {
    /// Wraps `self` with the original dataset index of the failing instance.
    pub fn in_instance(self, instance: usize) -> Self {
        AttackError::Task {
            instance,
            source: Box::new(self),
        }
    }
}
