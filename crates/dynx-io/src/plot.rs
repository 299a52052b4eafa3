//! Two-column history plot files.
//!
//! A plot file holds one time series: two header lines followed by one
//! `time value` row per sample, both written in C-style scientific notation
//! (`1.2345678E-03`) so that files can be diffed numerically against
//! reference curves.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

const PLOT_HEADER: &str = "#DynELA_plot history file";
const PLOTTED_PREFIX: &str = "#plotted :";

/// A named (time, value) series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlotSeries {
    pub name: String,
    pub samples: Vec<(f64, f64)>,
}

impl PlotSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, time: f64, value: f64) {
        self.samples.push((time, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(t, _)| *t)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(_, v)| *v)
    }
}

/// Format a value like C's `%.7E`: seven decimals, signed two-digit exponent.
pub fn format_scientific(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    let raw = format!("{value:.7E}");
    match raw.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", exponent.abs())
        }
        None => raw,
    }
}

/// Render a series to the plot text layout.
pub fn render_plot(series: &PlotSeries) -> String {
    let mut body = String::with_capacity(32 * (series.samples.len() + 2));
    body.push_str(PLOT_HEADER);
    body.push('\n');
    body.push_str(&format!("{PLOTTED_PREFIX} time {}\n", series.name));
    for (time, value) in &series.samples {
        body.push_str(&format_scientific(*time));
        body.push(' ');
        body.push_str(&format_scientific(*value));
        body.push('\n');
    }
    body
}

pub fn write_plot(path: impl AsRef<Path>, series: &PlotSeries) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    fs::write(path, render_plot(series))?;
    tracing::debug!(path = %path.display(), samples = series.len(), "wrote plot file");
    Ok(())
}

/// Parse plot text. Lines starting with `#` are comments except for the
/// `#plotted :` line, which provides the series name.
pub fn parse_plot(text: &str) -> Result<PlotSeries> {
    let mut series = PlotSeries::default();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(PLOTTED_PREFIX) {
            let mut names = rest.split_whitespace();
            // First column is always time.
            names.next();
            series.name = names.collect::<Vec<_>>().join(" ");
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let mut columns = line.split_whitespace();
        let (Some(time), Some(value)) = (columns.next(), columns.next()) else {
            return Err(IoError::Parse(format!(
                "line {}: expected two columns, got '{}'",
                line_no + 1,
                line
            )));
        };
        let time = parse_number(time, line_no)?;
        let value = parse_number(value, line_no)?;
        series.push(time, value);
    }
    Ok(series)
}

pub fn read_plot(path: impl AsRef<Path>) -> Result<PlotSeries> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound(path.display().to_string()));
    }
    let text = fs::read_to_string(path)?;
    parse_plot(&text)
}

fn parse_number(token: &str, line_no: usize) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| IoError::Parse(format!("line {}: invalid number '{}'", line_no + 1, token)))
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
