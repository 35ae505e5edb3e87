//! Per-point fit weights `w_i`.
//!
//! | policy       | weight                                  |
//! |--------------|-----------------------------------------|
//! | None         | 1                                       |
//! | Instrumental | 1/σ², σ from the Y error column         |
//! | Statistical  | 1/|y| (1 where y = 0)                   |
//! | Arbitrary    | 1/σ², σ from the chosen column          |

use crate::domain::WeightingPolicy;
use crate::error::{AnalysisError, ErrorKind, Result};

fn inverse_variance(sigma: &[f64]) -> Result<Vec<f64>> {
    sigma
        .iter()
        .enumerate()
        .map(|(index, &s)| {
            if s.is_finite() && s > 0.0 {
                Ok(1.0 / (s * s))
            } else {
                Err(AnalysisError::new("Fit", ErrorKind::InvalidWeight { index, value: s }))
            }
        })
        .collect()
}

/// Weights for the points of the fitted range.
///
/// `errors` is the Y error column restricted to the same points, when the
/// curve has one.
pub fn fit_weights(
    policy: &WeightingPolicy,
    dataset: &str,
    y: &[f64],
    errors: Option<&[f64]>,
) -> Result<Vec<f64>> {
    match policy {
        WeightingPolicy::None => Ok(vec![1.0; y.len()]),
        WeightingPolicy::Instrumental => {
            let sigma = errors.ok_or_else(|| {
                AnalysisError::new(
                    "Fit",
                    ErrorKind::MissingWeightColumn {
                        dataset: dataset.to_string(),
                    },
                )
            })?;
            inverse_variance(sigma)
        }
        WeightingPolicy::Statistical => Ok(y
            .iter()
            .map(|&v| if v != 0.0 { 1.0 / v.abs() } else { 1.0 })
            .collect()),
        WeightingPolicy::ArbitraryDataset { name, values } => {
            if values.len() != y.len() {
                return Err(AnalysisError::new(
                    "Fit",
                    ErrorKind::WeightLengthMismatch {
                        dataset: name.clone(),
                        expected: y.len(),
                        actual: values.len(),
                    },
                ));
            }
            inverse_variance(values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrumental_needs_error_column() {
        let err = fit_weights(&WeightingPolicy::Instrumental, "Data1", &[1.0], None).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::MissingWeightColumn {
                dataset: "Data1".into()
            }
        );
        let w = fit_weights(&WeightingPolicy::Instrumental, "Data1", &[1.0, 2.0], Some(&[0.5, 2.0])).unwrap();
        assert_eq!(w, vec![4.0, 0.25]);
    }

    #[test]
    fn zero_sigma_is_rejected() {
        let err = fit_weights(&WeightingPolicy::Instrumental, "d", &[1.0, 2.0], Some(&[0.5, 0.0])).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidWeight { index: 1, value: 0.0 });
    }

    #[test]
    fn statistical_uses_counts() {
        let w = fit_weights(&WeightingPolicy::Statistical, "d", &[4.0, 0.0, -2.0], None).unwrap();
        assert_eq!(w, vec![0.25, 1.0, 0.5]);
    }

    #[test]
    fn arbitrary_length_must_match_range() {
        let policy = WeightingPolicy::ArbitraryDataset {
            name: "Sigma".into(),
            values: vec![1.0, 1.0],
        };
        let err = fit_weights(&policy, "d", &[1.0, 2.0, 3.0], None).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::WeightLengthMismatch {
                dataset: "Sigma".into(),
                expected: 3,
                actual: 2
            }
        );
    }
}
