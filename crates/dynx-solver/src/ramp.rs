//! Time modulation of imposed loads.
//!
//! A ramp scales a boundary value by a factor in time. The time is clamped
//! to the window `[start, stop]` before the shape is evaluated, so every
//! shape holds its end values outside the window:
//!
//! | Shape    | before `start` | inside, `p = (t - start)/(stop - start)` | after `stop` |
//! |----------|----------------|------------------------------------------|--------------|
//! | Constant | 1              | 1                                        | 1            |
//! | Linear   | 0              | p                                        | 1            |
//! | Sinus    | 0              | sin(πp/2)                                | 1            |
//! | Soft     | 0              | (1 − cos πp)/2                           | 1            |
//! | Tabular  | first value    | piecewise linear in t                    | last value   |
//!
//! A window with `stop == start` acts as a step at `start`.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RampShape {
    Constant,
    Linear,
    Sinus,
    Soft,
    /// `(time, factor)` pairs with strictly increasing times
    Tabular(Vec<(f64, f64)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ramp {
    pub shape: RampShape,
    pub start: f64,
    pub stop: f64,
}

impl Ramp {
    pub fn new(shape: RampShape, start: f64, stop: f64) -> Self {
        Self { shape, start, stop }
    }

    pub fn constant() -> Self {
        Self::new(RampShape::Constant, 0.0, 0.0)
    }

    pub fn linear(start: f64, stop: f64) -> Self {
        Self::new(RampShape::Linear, start, stop)
    }

    pub fn sinus(start: f64, stop: f64) -> Self {
        Self::new(RampShape::Sinus, start, stop)
    }

    pub fn soft(start: f64, stop: f64) -> Self {
        Self::new(RampShape::Soft, start, stop)
    }

    /// Piecewise-linear table; the window spans the first and last times.
    pub fn tabular(points: Vec<(f64, f64)>) -> Self {
        let start = points.first().map_or(0.0, |p| p.0);
        let stop = points.last().map_or(0.0, |p| p.0);
        Self::new(RampShape::Tabular(points), start, stop)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start.is_finite() || !self.stop.is_finite() || self.stop < self.start {
            return Err(SolverError::config(format!(
                "ramp window [{}, {}] is invalid",
                self.start, self.stop
            )));
        }
        if let RampShape::Tabular(points) = &self.shape {
            validate_table(points, "tabular ramp")?;
        }
        Ok(())
    }

    /// Scale factor at time `time`
    pub fn evaluate(&self, time: f64) -> f64 {
        let clamped = time.max(self.start).min(self.stop);
        let progress = if self.stop > self.start {
            (clamped - self.start) / (self.stop - self.start)
        } else if time >= self.start {
            1.0
        } else {
            0.0
        };

        match &self.shape {
            RampShape::Constant => 1.0,
            RampShape::Linear => progress,
            RampShape::Sinus => (0.5 * PI * progress).sin(),
            RampShape::Soft => 0.5 * (1.0 - (PI * progress).cos()),
            RampShape::Tabular(points) => interpolate(points, clamped),
        }
    }
}

/// Piecewise-linear value of a table with strictly increasing abscissae,
/// holding the end values outside it
pub(crate) fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    let Some(&(first_x, first_value)) = points.first() else {
        return 0.0;
    };
    if x <= first_x {
        return first_value;
    }
    for pair in points.windows(2) {
        let (x0, v0) = pair[0];
        let (x1, v1) = pair[1];
        if x <= x1 {
            return v0 + (v1 - v0) * (x - x0) / (x1 - x0);
        }
    }
    points.last().map_or(first_value, |p| p.1)
}

/// Slope of the segment holding `x`, zero outside the table
pub(crate) fn slope(points: &[(f64, f64)], x: f64) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if x >= first.0 && x <= last.0 => points
            .windows(2)
            .find(|pair| x <= pair[1].0)
            .map_or(0.0, |pair| (pair[1].1 - pair[0].1) / (pair[1].0 - pair[0].0)),
        _ => 0.0,
    }
}

/// Check a table: non-empty, finite, strictly increasing abscissae
pub(crate) fn validate_table(points: &[(f64, f64)], what: &str) -> Result<()> {
    if points.is_empty() {
        return Err(SolverError::config(format!("{what} has no points")));
    }
    if points.iter().any(|(x, v)| !x.is_finite() || !v.is_finite()) {
        return Err(SolverError::config(format!("{what} has non-finite entries")));
    }
    if points.windows(2).any(|pair| pair[1].0 <= pair[0].0) {
        return Err(SolverError::config(format!(
            "{what} abscissae must be strictly increasing"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_ramp_clamps_outside_window() {
        let ramp = Ramp::linear(1.0, 3.0);
        assert_eq!(ramp.evaluate(0.0), 0.0);
        assert_relative_eq!(ramp.evaluate(2.0), 0.5);
        assert_eq!(ramp.evaluate(3.0), 1.0);
        assert_eq!(ramp.evaluate(10.0), 1.0);
    }

    #[test]
    fn test_smooth_shapes_reach_unity() {
        for ramp in [Ramp::sinus(0.0, 2.0), Ramp::soft(0.0, 2.0)] {
            assert_relative_eq!(ramp.evaluate(0.0), 0.0, epsilon = 1e-15);
            assert_relative_eq!(ramp.evaluate(2.0), 1.0, epsilon = 1e-15);
            assert!(ramp.evaluate(1.0) > 0.0 && ramp.evaluate(1.0) < 1.0);
        }
        assert_relative_eq!(Ramp::soft(0.0, 2.0).evaluate(1.0), 0.5, epsilon = 1e-15);
        assert_relative_eq!(
            Ramp::sinus(0.0, 2.0).evaluate(1.0),
            (PI / 4.0).sin(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_constant_ramp_ignores_window() {
        let ramp = Ramp::new(RampShape::Constant, 5.0, 6.0);
        assert_eq!(ramp.evaluate(0.0), 1.0);
        assert_eq!(ramp.evaluate(100.0), 1.0);
    }

    #[test]
    fn test_degenerate_window_is_a_step() {
        let ramp = Ramp::linear(1.0, 1.0);
        assert_eq!(ramp.evaluate(0.999), 0.0);
        assert_eq!(ramp.evaluate(1.0), 1.0);
    }

    #[test]
    fn test_tabular_ramp() {
        let ramp = Ramp::tabular(vec![(1.0, 2.0), (2.0, 4.0), (4.0, 0.0)]);
        assert!(ramp.validate().is_ok());
        assert_eq!(ramp.evaluate(0.0), 2.0);
        assert_relative_eq!(ramp.evaluate(1.5), 3.0);
        assert_relative_eq!(ramp.evaluate(3.0), 2.0);
        assert_eq!(ramp.evaluate(9.0), 0.0);
    }

    #[test]
    fn test_invalid_ramps() {
        assert!(Ramp::linear(2.0, 1.0).validate().is_err());
        assert!(Ramp::tabular(vec![]).validate().is_err());
        assert!(Ramp::tabular(vec![(1.0, 0.0), (1.0, 1.0)]).validate().is_err());
    }
}
