//! Output tables built from fit results, and the naming rule of every
//! emitted dataset or table.

use crate::domain::{Column, FitResult, Table};

/// `"<operation> of <source>"`, the name of every output the core emits.
pub fn output_name(operation: &str, source: &str) -> String {
    format!("{operation} of {source}")
}

/// One row per parameter: `Parameter | Value | Error`.
pub fn parameters_table(result: &FitResult) -> Table {
    Table::new(
        output_name("Parameters", &output_name(&format!("{} fit", result.model_label), &result.source)),
        vec![
            Column::text("Parameter", result.parameter_names.clone()),
            Column::numeric("Value", result.parameters.clone()),
            Column::numeric("Error", result.errors.clone()),
        ],
    )
}

/// The `P×P` covariance matrix, labelled by parameter in the first column.
pub fn covariance_table(result: &FitResult) -> Table {
    let mut columns = Vec::with_capacity(result.parameter_names.len() + 1);
    columns.push(Column::text("Parameter", result.parameter_names.clone()));
    for (j, name) in result.parameter_names.iter().enumerate() {
        let values = result
            .covariance
            .iter()
            .map(|row| row.get(j).copied().unwrap_or(0.0))
            .collect();
        columns.push(Column::numeric(name.as_str(), values));
    }
    Table::new(
        output_name("Covariance", &output_name(&format!("{} fit", result.model_label), &result.source)),
        columns,
    )
}

/// One row per fitted peak; `None` for fits that do not decompose into peaks.
pub fn peak_table(result: &FitResult) -> Option<Table> {
    if result.peaks.is_empty() {
        return None;
    }
    let rows = &result.peaks;
    Some(Table::new(
        output_name("Peaks", &output_name(&format!("{} fit", result.model_label), &result.source)),
        vec![
            Column::numeric("Peak", (1..=rows.len()).map(|i| i as f64).collect()),
            Column::numeric("Area", rows.iter().map(|r| r.area).collect()),
            Column::numeric("Center", rows.iter().map(|r| r.center).collect()),
            Column::numeric("Width", rows.iter().map(|r| r.width).collect()),
            Column::numeric("Height", rows.iter().map(|r| r.height).collect()),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::domain::{Dataset, FitConfig};
    use crate::fit::fit;
    use crate::models::{ModelRegistry, ModelSpec, PeakKind};

    fn line_fit() -> FitResult {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = x.iter().map(|v| 2.0 * v + 1.0 + if (*v as usize) % 2 == 0 { 0.1 } else { -0.1 }).collect();
        let data = Dataset::new("Data1", x, y).unwrap();
        let config = FitConfig::new(ModelSpec::Linear);
        fit(&data, &config, &ModelRegistry::new()).unwrap()
    }

    #[test]
    fn naming_follows_operation_of_source() {
        assert_eq!(output_name("Low Pass FFT Filter", "Data2"), "Low Pass FFT Filter of Data2");
    }

    #[test]
    fn parameter_and_covariance_tables() {
        let result = line_fit();
        let params = parameters_table(&result);
        assert_eq!(params.name, "Parameters of Linear fit of Data1");
        assert_eq!(params.row_count(), 2);
        assert_eq!(params.numeric("Value").unwrap(), result.parameters.as_slice());
        assert_eq!(params.numeric("Error").unwrap(), result.errors.as_slice());

        let cov = covariance_table(&result);
        assert_eq!(cov.columns.len(), 3);
        let a = cov.numeric("A").unwrap();
        let b = cov.numeric("B").unwrap();
        assert_relative_eq!(a[1], b[0], epsilon = 1e-12);
        assert_relative_eq!(a[0].sqrt(), result.errors[0], epsilon = 1e-9);
    }

    #[test]
    fn peak_table_only_for_peak_fits() {
        assert!(peak_table(&line_fit()).is_none());

        let x: Vec<f64> = (0..=100).map(|i| i as f64 * 0.1).collect();
        let y = x.iter().map(|v| 4.0 * (-(v - 5.0) * (v - 5.0) / 2.0).exp()).collect();
        let data = Dataset::new("Peak1", x, y).unwrap();
        let config = FitConfig::new(ModelSpec::MultiPeak {
            kind: PeakKind::Gaussian,
            peaks: 1,
            seeds: vec![],
        });
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        let table = peak_table(&result).unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.numeric("Peak").unwrap(), &[1.0]);
        assert_relative_eq!(table.numeric("Center").unwrap()[0], 5.0, epsilon = 1e-3);
        assert_relative_eq!(table.numeric("Height").unwrap()[0], 4.0, epsilon = 1e-3);
    }
}
