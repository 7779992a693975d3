//! Feature preparation for anomaly model training and scoring.
//!
//! Records are named maps of JSON values. The preparer selects the configured
//! columns in a fixed order and refuses anything it cannot read as a finite
//! number; there is no imputation. The scaler standardizes each column with
//! the mean and standard deviation seen at training time.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Named record fed to the preparer
pub type Record = BTreeMap<String, Value>;

/// Ordered numeric encoding of one record
pub type FeatureVector = Vec<f64>;

/// Rows of feature vectors sharing one column layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureVector>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<FeatureVector>) -> Result<Self> {
        for row in &rows {
            if row.len() != columns.len() {
                return Err(EngineError::DimensionMismatch {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.columns.len()
    }
}

/// Turns named records into fixed-order feature vectors
#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    columns: Vec<String>,
}

impl FeaturePreparer {
    /// Create a preparer for the given ordered columns
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    /// Prepare every record; output order matches input order
    pub fn prepare(&self, records: &[Record]) -> Result<FeatureMatrix> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.extract(index, record))
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureMatrix {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Prepare the readable records and count the ones that were dropped
    pub fn prepare_valid(&self, records: &[Record]) -> (FeatureMatrix, Vec<EngineError>) {
        let mut rows = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match self.extract(index, record) {
                Ok(row) => rows.push(row),
                Err(e) => rejected.push(e),
            }
        }

        let matrix = FeatureMatrix {
            columns: self.columns.clone(),
            rows,
        };
        (matrix, rejected)
    }

    /// Prepare a single record
    pub fn prepare_one(&self, record: &Record) -> Result<FeatureVector> {
        self.extract(0, record)
    }

    fn extract(&self, index: usize, record: &Record) -> Result<FeatureVector> {
        let mut features = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let value = record
                .get(column)
                .ok_or_else(|| EngineError::MissingColumn {
                    column: column.clone(),
                    record: index,
                })?;
            let number = numeric_value(value).map_err(|reason| EngineError::InvalidValue {
                column: column.clone(),
                record: index,
                reason,
            })?;
            features.push(number);
        }

        Ok(features)
    }
}

fn numeric_value(value: &Value) -> std::result::Result<f64, String> {
    let number = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("number {} is not representable as f64", n))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not numeric", s))?,
        Value::Null => return Err("value is missing".to_string()),
        other => return Err(format!("expected a number, found {}", type_name(other))),
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(format!("{} is not finite", number))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Population standard deviation of one column. Columns whose squared
/// deviations overflow are measured relative to their largest magnitude.
fn column_std_dev(rows: &[FeatureVector], column: usize, mean: f64, n: f64) -> f64 {
    let variance: f64 = rows.iter().map(|r| (r[column] - mean).powi(2) / n).sum();
    if variance.is_finite() {
        return variance.sqrt();
    }

    let max_abs = rows.iter().fold(0.0_f64, |acc, r| acc.max(r[column].abs()));
    let relative_mean = mean / max_abs;
    let relative_variance: f64 = rows
        .iter()
        .map(|r| (r[column] / max_abs - relative_mean).powi(2) / n)
        .sum();
    (relative_variance.sqrt() * max_abs).min(f64::MAX)
}

/// `(x - mean) / scale`, saturating at the largest finite value
fn standardize(x: f64, mean: f64, scale: f64) -> f64 {
    let diff = x - mean;
    let z = if diff.is_finite() {
        diff / scale
    } else {
        x / scale - mean / scale
    };
    z.clamp(-f64::MAX, f64::MAX)
}

/// Per-column standardization fitted on training data.
///
/// A column with zero spread gets a scale of 1 so it maps to a constant
/// instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl FeatureScaler {
    /// Fit population mean and standard deviation for each column
    pub fn fit(matrix: &FeatureMatrix) -> Result<Self> {
        if matrix.is_empty() {
            return Err(EngineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let n = matrix.len() as f64;
        let dims = matrix.dimension();
        let mut means = vec![0.0; dims];
        let mut scales = vec![0.0; dims];

        for row in &matrix.rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / n;
            }
        }

        for (column, (scale, mean)) in scales.iter_mut().zip(&means).enumerate() {
            let std_dev = column_std_dev(&matrix.rows, column, *mean, n);
            *scale = if std_dev > f64::EPSILON { std_dev } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Standardize one raw vector
    pub fn transform(&self, features: &[f64]) -> Result<FeatureVector> {
        if features.len() != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: features.len(),
            });
        }

        Ok(features
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| standardize(*x, *mean, *scale))
            .collect())
    }

    /// Standardize and tag the result with this scaler's fingerprint
    pub fn transform_tagged(&self, features: &[f64]) -> Result<ScaledVector> {
        Ok(ScaledVector {
            values: self.transform(features)?,
            scaler_fingerprint: self.fingerprint(),
        })
    }

    /// Stable identity of the fitted parameters
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for value in self.means.iter().chain(&self.scales) {
            value.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Feature vector that has already been standardized by a specific scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledVector {
    pub values: FeatureVector,
    pub scaler_fingerprint: u64,
}
