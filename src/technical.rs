//! Technical analysis indicators
//!
//! Series-level SMA, EMA, and MACD used by the charting layer. EMA uses
//! the standard smoothing factor `alpha = 2 / (period + 1)` seeded from
//! the first observation.

use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};

/// MACD line set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacdSeries {
    /// Fast EMA minus slow EMA
    pub macd: Vec<f64>,

    /// EMA of the MACD line
    pub signal: Vec<f64>,

    /// MACD minus signal
    pub histogram: Vec<f64>,
}

fn validate_period(period: usize, n: usize) -> Result<()> {
    if period == 0 {
        return Err(RiskError::InvalidParameter(
            "Indicator period must be positive".to_string(),
        ));
    }
    if period > n {
        return Err(RiskError::InsufficientData(format!(
            "Period {} exceeds series length {}",
            period, n
        )));
    }
    Ok(())
}

/// Simple moving average; output has length `n - period + 1`
pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>> {
    validate_period(period, values.len())?;
    Ok(values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect())
}

/// Exponential moving average; same length as the input
pub fn ema(values: &[f64], period: usize) -> Result<Vec<f64>> {
    validate_period(period, values.len())?;

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = values[0];
    out.push(current);
    for value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }
    Ok(out)
}

/// MACD with the conventional (fast, slow, signal) parameterization
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Result<MacdSeries> {
    if fast_period >= slow_period {
        return Err(RiskError::InvalidParameter(format!(
            "MACD fast period {} must be below slow period {}",
            fast_period, slow_period
        )));
    }
    let fast = ema(values, fast_period)?;
    let slow = ema(values, slow_period)?;

    let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&macd_line, signal_period)?;
    let histogram = macd_line.iter().zip(&signal).map(|(m, s)| m - s).collect();

    Ok(MacdSeries {
        macd: macd_line,
        signal,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_eq!(out, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ema_converges_to_constant() {
        let out = ema(&[10.0; 50], 12).unwrap();
        assert_relative_eq!(*out.last().unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ema_tracks_trend_with_lag() {
        let values: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let out = ema(&values, 10).unwrap();
        // EMA lags a rising series from below
        assert!(out.last().unwrap() < values.last().unwrap());
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let out = macd(&[5.0; 60], 12, 26, 9).unwrap();
        assert!(out.macd.iter().all(|v| v.abs() < 1e-12));
        assert!(out.histogram.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_macd_rejects_inverted_periods() {
        assert!(macd(&[1.0; 60], 26, 12, 9).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(sma(&[1.0, 2.0], 0).is_err());
        assert!(sma(&[1.0, 2.0], 3).is_err());
    }
}
