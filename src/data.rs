//! Dense feature matrices, sign-encoded labels and CSV dataset loading.
//!
//! This module does not have performance critical code except for the row
//! accessors, which the enumerator and the forest traversal hit on every
//! perturbed instance.

use std::fmt;
use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;

use crate::error::AttackError;

/// Name of the CSV column holding the -1/+1 labels.
pub const LABEL_COLUMN: &str = "label";

/// Binary class label in the sign-encoded space {-1, +1}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    /// Returns the sign encoding (-1 or +1).
    #[inline(always)]
    pub fn as_sign(self) -> i8 {
        match self {
            Label::Negative => -1,
            Label::Positive => 1,
        }
    }

    /// Parses a sign-encoded value. Anything other than -1 or +1 is rejected.
    pub fn from_sign(value: f64) -> Option<Self> {
        if value == -1.0 {
            Some(Label::Negative)
        } else if value == 1.0 {
            Some(Label::Positive)
        } else {
            None
        }
    }

    /// Maps a binary class index (sklearn `classes_ = [-1, 1]`) to a label.
    #[inline(always)]
    pub fn from_class_index(class: usize) -> Self {
        if class == 0 { Label::Negative } else { Label::Positive }
    }

    /// Agreement check between a prediction and a true label.
    ///
    /// Sign-encoded labels agree exactly when their product is +1.
    #[inline(always)]
    pub fn agrees_with(self, other: Label) -> bool {
        self.as_sign() * other.as_sign() == 1
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.as_sign())
    }
}

/// Row-major matrix of feature values.
///
/// Used both for datasets and for the memory-bounded batches of perturbed
/// instances produced by the enumerator.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_features: usize,
    values: Vec<f64>,
}

/// A batch of perturbed instances is just a (bounded) feature matrix.
pub type Batch = FeatureMatrix;

impl FeatureMatrix {
    /// Builds a matrix from flat row-major values.
    pub fn new(n_features: usize, values: Vec<f64>) -> Result<Self, AttackError> {
        if n_features == 0 {
            return Err(AttackError::NoFeatures);
        }
        if values.len() % n_features != 0 {
            return Err(AttackError::RowWidthMismatch {
                expected: n_features,
                found: values.len() % n_features,
            });
        }
        Ok(FeatureMatrix { n_features, values })
    }

    /// Builds a matrix from owned rows, checking that they all have the same width.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, AttackError> {
        let n_features = rows.first().map(Vec::len).ok_or(AttackError::EmptyDataset)?;
        let mut matrix = Self::with_capacity(n_features, rows.len())?;
        for row in &rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    /// Creates an empty matrix with room for `rows` rows.
    pub fn with_capacity(n_features: usize, rows: usize) -> Result<Self, AttackError> {
        if n_features == 0 {
            return Err(AttackError::NoFeatures);
        }
        Ok(FeatureMatrix {
            n_features,
            values: Vec::with_capacity(n_features * rows),
        })
    }

    #[inline(always)]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline(always)]
    pub fn n_rows(&self) -> usize {
        self.values.len() / self.n_features
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// # Panics
    /// Panics if `idx` is out of bounds.
    #[inline(always)]
    pub fn row(&self, idx: usize) -> &[f64] {
        let start = idx * self.n_features;
        &self.values[start..start + self.n_features]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.n_features)
    }

    /// Appends a copy of `row`.
    #[inline(always)]
    pub fn push_row(&mut self, row: &[f64]) -> Result<(), AttackError> {
        if row.len() != self.n_features {
            return Err(AttackError::RowWidthMismatch {
                expected: self.n_features,
                found: row.len(),
            });
        }
        self.values.extend_from_slice(row);
        Ok(())
    }

    /// Appends a row whose width the caller has already checked.
    #[inline(always)]
    pub(crate) fn push_row_unchecked(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.n_features);
        self.values.extend_from_slice(row);
    }

    /// Drops every row but keeps the allocation.
    #[inline(always)]
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Copies the rows at `indices`, in that order, into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        let mut values = Vec::with_capacity(indices.len() * self.n_features);
        for &idx in indices {
            values.extend_from_slice(self.row(idx));
        }
        FeatureMatrix { n_features: self.n_features, values }
    }

    /// Largest value anywhere in the matrix, `None` when empty.
    pub fn max_value(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Fails on the first NaN or infinite value.
    pub fn check_finite(&self) -> Result<(), AttackError> {
        match self.values.iter().position(|v| !v.is_finite()) {
            Some(pos) => Err(AttackError::NonFiniteValue {
                row: pos / self.n_features,
                col: pos % self.n_features,
                value: self.values[pos],
            }),
            None => Ok(()),
        }
    }
}

/// Loads a dataset from a CSV file with a header row.
///
/// Every column except [`LABEL_COLUMN`] is read as a numeric feature, in file
/// order. Labels must be -1 or +1.
///
/// # Returns
/// The feature matrix and the label of each row.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<(FeatureMatrix, Vec<Label>), AttackError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = rdr.headers()?.clone();
    let label_col = headers.iter().position(|h| h.trim() == LABEL_COLUMN).ok_or_else(|| AttackError::MissingColumn {
        column: LABEL_COLUMN.to_string(),
        path: path.display().to_string(),
    })?;
    let n_features = headers.len() - 1;
    if n_features == 0 {
        return Err(AttackError::NoFeatures);
    }

    let mut values = Vec::new();
    let mut labels = Vec::new();
    for (row_idx, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(AttackError::RowWidthMismatch { expected: headers.len(), found: record.len() });
        }
        for (col, field) in record.iter().enumerate() {
            let field = field.trim();
            if col == label_col {
                let label = field
                    .parse::<f64>()
                    .ok()
                    .and_then(Label::from_sign)
                    .ok_or_else(|| AttackError::InvalidLabel { row: row_idx, value: field.to_string() })?;
                labels.push(label);
            } else {
                let value: f64 = field.parse().map_err(|_| AttackError::Parse {
                    row: row_idx,
                    col,
                    value: field.to_string(),
                })?;
                values.push(value);
            }
        }
    }

    if labels.is_empty() {
        return Err(AttackError::EmptyDataset);
    }
    let matrix = FeatureMatrix::new(n_features, values)?;
    Ok((matrix, labels))
}
