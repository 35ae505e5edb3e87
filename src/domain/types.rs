//! Shared domain types.
//!
//! These types are kept lightweight and serializable so a host application can:
//!
//! - hand curves to the analysis core
//! - receive named result curves and tables back
//! - persist them in whatever project format it uses

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ErrorKind, Result};

/// A named curve: ordered `(x, y)` pairs with an optional Y error column.
///
/// Datasets are never mutated by the core; every operation returns a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y_error: Option<Vec<f64>>,
}

/// Wire form of [`Dataset`], checked through the constructors on the way in.
#[derive(Deserialize)]
struct RawDataset {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    #[serde(default)]
    y_error: Option<Vec<f64>>,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = AnalysisError;

    fn try_from(raw: RawDataset) -> Result<Self> {
        let data = Dataset::new(raw.name, raw.x, raw.y)?;
        match raw.y_error {
            Some(errors) => data.with_y_errors(errors),
            None => Ok(data),
        }
    }
}

impl Dataset {
    /// Build a dataset, checking that both columns are non-empty and equally long.
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if x.len() != y.len() {
            return Err(AnalysisError::new(
                "Dataset",
                ErrorKind::LengthMismatch {
                    x: x.len(),
                    y: y.len(),
                },
            ));
        }
        if x.is_empty() {
            return Err(AnalysisError::new(
                "Dataset",
                ErrorKind::InsufficientData {
                    required: 1,
                    available: 0,
                },
            ));
        }
        Ok(Self {
            name,
            x,
            y,
            y_error: None,
        })
    }

    /// Build a dataset whose x column is the 1-based row index.
    pub fn from_values(name: impl Into<String>, y: Vec<f64>) -> Result<Self> {
        let x = (1..=y.len()).map(|i| i as f64).collect();
        Self::new(name, x, y)
    }

    /// Attach a Y error column (one value per point).
    pub fn with_y_errors(mut self, errors: Vec<f64>) -> Result<Self> {
        if errors.len() != self.y.len() {
            return Err(AnalysisError::new(
                "Dataset",
                ErrorKind::LengthMismatch {
                    x: self.y.len(),
                    y: errors.len(),
                },
            ));
        }
        self.y_error = Some(errors);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Y error column, if the curve carries a non-empty one.
    pub fn y_errors(&self) -> Option<&[f64]> {
        self.y_error.as_deref().filter(|e| !e.is_empty())
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Smallest and largest x value.
    pub fn x_range(&self) -> (f64, f64) {
        min_max(&self.x)
    }

    /// Iterate over `(x, y)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// One bound of an x-range, as the host's "min"/"max" text boxes express it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeBound {
    Explicit(f64),
    DatasetMin,
    DatasetMax,
}

impl RangeBound {
    /// Resolve against a dataset's x extrema.
    pub fn resolve(self, data: &Dataset) -> f64 {
        let (lo, hi) = data.x_range();
        match self {
            RangeBound::Explicit(v) => v,
            RangeBound::DatasetMin => lo,
            RangeBound::DatasetMax => hi,
        }
    }
}

impl FromStr for RangeBound {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("min") {
            return Ok(RangeBound::DatasetMin);
        }
        if t.eq_ignore_ascii_case("max") {
            return Ok(RangeBound::DatasetMax);
        }
        t.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(RangeBound::Explicit)
            .ok_or_else(|| {
                AnalysisError::new(
                    "Range",
                    ErrorKind::ExpressionError {
                        expression: s.to_string(),
                        message: "expected a number, 'min' or 'max'".to_string(),
                    },
                )
            })
    }
}

/// An inclusive `[from, to]` range whose ends may refer to the data extrema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XRange {
    pub from: RangeBound,
    pub to: RangeBound,
}

impl XRange {
    pub fn full() -> Self {
        Self {
            from: RangeBound::DatasetMin,
            to: RangeBound::DatasetMax,
        }
    }

    pub fn explicit(from: f64, to: f64) -> Self {
        Self {
            from: RangeBound::Explicit(from),
            to: RangeBound::Explicit(to),
        }
    }

    /// Resolve both ends and require `from < to`.
    pub fn resolve(&self, data: &Dataset, operation: &str) -> Result<(f64, f64)> {
        let from = self.from.resolve(data);
        let to = self.to.resolve(data);
        if !(from.is_finite() && to.is_finite() && from < to) {
            return Err(AnalysisError::new(
                operation,
                ErrorKind::InvalidRange { from, to },
            ));
        }
        Ok((from, to))
    }
}

impl Default for XRange {
    fn default() -> Self {
        Self::full()
    }
}

/// Values of a result table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }
}

/// A named result table (parameter tables, covariance matrices, FFT output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Numeric values of a column, if it exists and is numeric.
    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match &self.column(name)?.values {
            ColumnValues::Numeric(v) => Some(v),
            ColumnValues::Text(_) => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_rejects_mismatched_columns() {
        let err = Dataset::new("d", vec![1.0, 2.0], vec![1.0]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::LengthMismatch { x: 2, y: 1 });
    }

    #[test]
    fn deserialized_dataset_is_validated() {
        let ok: Dataset =
            serde_json::from_str(r#"{"name":"Good","x":[0,1],"y":[1,2],"y_error":[0.1,0.2]}"#).unwrap();
        assert_eq!(ok.y_errors(), Some(&[0.1, 0.2][..]));

        let err = serde_json::from_str::<Dataset>(r#"{"name":"Bad","x":[0,1,2,3],"y":[1,2]}"#).unwrap_err();
        assert!(err.to_string().contains("differ in length"), "{err}");
        let err = serde_json::from_str::<Dataset>(r#"{"name":"Empty","x":[],"y":[]}"#).unwrap_err();
        assert!(err.to_string().contains("insufficient data"), "{err}");
        let err = serde_json::from_str::<Dataset>(r#"{"name":"Errs","x":[0,1],"y":[1,2],"y_error":[0.1]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("differ in length"), "{err}");
    }

    #[test]
    fn dataset_rejects_empty() {
        let err = Dataset::new("d", vec![], vec![]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InsufficientData { .. }));
    }

    #[test]
    fn empty_error_column_counts_as_missing() {
        let d = Dataset::new("d", vec![1.0], vec![2.0]).unwrap();
        assert!(d.y_errors().is_none());
        let d = d.with_y_errors(vec![0.1]).unwrap();
        assert_eq!(d.y_errors(), Some(&[0.1][..]));
    }

    #[test]
    fn range_bounds_parse_sentinels() {
        assert_eq!("min".parse::<RangeBound>().unwrap(), RangeBound::DatasetMin);
        assert_eq!(" MAX ".parse::<RangeBound>().unwrap(), RangeBound::DatasetMax);
        assert_eq!("2.5".parse::<RangeBound>().unwrap(), RangeBound::Explicit(2.5));
        assert!("abc".parse::<RangeBound>().is_err());
    }

    #[test]
    fn range_resolves_before_checking_order() {
        let d = Dataset::new("d", vec![3.0, 1.0, 2.0], vec![0.0; 3]).unwrap();
        let r = XRange {
            from: RangeBound::DatasetMin,
            to: RangeBound::Explicit(2.5),
        };
        assert_eq!(r.resolve(&d, "Test").unwrap(), (1.0, 2.5));

        let bad = XRange {
            from: RangeBound::DatasetMax,
            to: RangeBound::DatasetMin,
        };
        let err = bad.resolve(&d, "Test").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidRange { from: 3.0, to: 1.0 });
    }
}
