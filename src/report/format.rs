//! Human-readable log entries and formula annotations.
//!
//! We keep formatting code in one place so:
//! - the numeric code stays free of presentation concerns
//! - changes to the log layout are localized

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::analysis::IntegrationResult;
use crate::domain::FitResult;

const RULE: &str = "---------------------------------------------------------------------------------------";

/// Presentation settings of log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Significant digits of printed numbers.
    pub precision: usize,
    /// Name of the plot the result belongs to, if any.
    pub plot: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            precision: 6,
            plot: None,
        }
    }
}

/// Format `v` with `digits` significant digits, like C's `%g`.
pub fn fmt_sig(v: f64, digits: usize) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    if v == 0.0 {
        return "0".to_string();
    }
    let digits = digits.max(1);
    // Round first: the exponent of the rounded value picks the notation.
    let sci = format!("{:.*e}", digits - 1, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= digits as i32 {
        format!("{}e{exp}", trim_zeros(mantissa))
    } else {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn header(opts: &LogOptions, timestamp: DateTime<Local>) -> String {
    let time = timestamp.format("%Y-%m-%d %H:%M:%S");
    match &opts.plot {
        Some(plot) => format!("[{time}\tPlot: ''{plot}'']\n"),
        None => format!("[{time}]\n"),
    }
}

/// The model formula with parameter values substituted and doubled signs
/// collapsed.
pub fn formula_with_values(result: &FitResult, precision: usize) -> String {
    let mut out = String::with_capacity(result.formula.len() * 2);
    let chars: Vec<char> = result.formula.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            match result.parameter(&ident) {
                Some(v) => out.push_str(&fmt_sig(v, precision)),
                None => out.push_str(&ident),
            }
        } else if c.is_ascii_digit() || c == '.' {
            // Numbers pass through whole, so an exponent is never taken for a name.
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            out.extend(&chars[start..i]);
        } else {
            out.push(c);
            i += 1;
        }
    }
    collapse_signs(&out)
}

fn collapse_signs(s: &str) -> String {
    let mut out = s.to_string();
    loop {
        let next = out.replace("--", "+").replace("+-", "-").replace("-+", "-");
        if next == out {
            return out;
        }
        out = next;
    }
}

/// Log entry of a fit, stamped with `timestamp`.
pub fn format_fit_log_at(result: &FitResult, opts: &LogOptions, timestamp: DateTime<Local>) -> String {
    let p = opts.precision;
    let mut out = header(opts, timestamp);

    out.push_str(&format!(
        "{} fit of dataset: {}, using function: {}\n",
        result.model_label, result.source, result.formula
    ));
    out.push_str(&format!("Weighting Method: {}\n", result.weighting));
    if result.closed_form {
        out.push_str("Linear least squares (closed form)\n");
    } else {
        out.push_str(&format!(
            "{} algorithm with tolerance = {}\n",
            result.algorithm.label(),
            fmt_sig(result.tolerance, p)
        ));
    }
    out.push_str(&format!(
        "From x = {} to x = {}\n",
        fmt_sig(result.x_from, p),
        fmt_sig(result.x_to, p)
    ));

    for (i, name) in result.parameter_names.iter().enumerate() {
        let held = if result.held.get(i).copied().unwrap_or(false) {
            " (fixed)"
        } else {
            ""
        };
        out.push_str(&format!(
            "{name} = {} +/- {}{held}\n",
            fmt_sig(result.parameters[i], p),
            fmt_sig(result.errors[i], p)
        ));
    }

    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Chi^2/doF = {}\n", fmt_sig(result.chi_square_per_dof(), p)));
    out.push_str(&format!("R^2 = {}\n", fmt_sig(result.r_square, p)));
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Iterations = {}\n", result.iterations));
    out.push_str(&format!("Status = {}\n", result.status));
    out
}

/// Log entry of a fit, stamped with the current local time.
pub fn format_fit_log(result: &FitResult, opts: &LogOptions) -> String {
    format_fit_log_at(result, opts, Local::now())
}

/// Log entry of an integration, stamped with `timestamp`.
pub fn format_integration_log_at(
    result: &IntegrationResult,
    opts: &LogOptions,
    timestamp: DateTime<Local>,
) -> String {
    let p = opts.precision;
    let mut out = header(opts, timestamp);
    out.push_str(&format!(
        "Numerical integration of: {} using {} interpolation\n",
        result.dataset,
        result.method.label()
    ));
    out.push_str(&format!(
        "Order {}, {} iterations{}\n",
        result.order,
        result.iterations,
        if result.converged { "" } else { " (tolerance not reached)" }
    ));
    out.push_str(&format!(
        "From x = {} to x = {}\n",
        fmt_sig(result.from, p),
        fmt_sig(result.to, p)
    ));
    out.push_str(&format!("Area = {}\n", fmt_sig(result.area, p)));
    out.push_str(&format!(
        "Peak at x = {}\ty = {}\n",
        fmt_sig(result.peak_x, p),
        fmt_sig(result.peak_y, p)
    ));
    out
}

pub fn format_integration_log(result: &IntegrationResult, opts: &LogOptions) -> String {
    format_integration_log_at(result, opts, Local::now())
}
