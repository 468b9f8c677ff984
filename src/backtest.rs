//! Rolling-window VaR backtesting
//!
//! Re-estimates VaR on a trailing window at each step, counts exceptions
//! (realized loss above the forecast), and validates the model with the
//! Kupiec proportion-of-failures test, the Christoffersen independence /
//! conditional-coverage tests, and a Basel traffic-light classification.
//!
//! Only the historical, std, and ewma methods are supported here; GARCH and
//! EVT refits at every step are rejected up front.

use crate::error::{Result, RiskError};
use crate::series::mean;
use crate::var::{validate_confidence, var_by_method, VarMethod};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Minimum observations required to run a backtest
pub const MIN_BACKTEST_OBSERVATIONS: usize = 30;

/// Default cap on the rolling estimation window
pub const DEFAULT_BACKTEST_WINDOW: usize = 250;

/// Basel traffic-light zone
///
/// Thresholds are fixed at 1% / 2% of observations regardless of the VaR
/// confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselZone {
    Green,
    Amber,
    Red,
}

impl BaselZone {
    /// Classify an exception rate
    pub fn classify(exception_rate: f64) -> Self {
        if exception_rate <= 0.01 {
            BaselZone::Green
        } else if exception_rate <= 0.02 {
            BaselZone::Amber
        } else {
            BaselZone::Red
        }
    }
}

/// Kupiec proportion-of-failures test output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KupiecTest {
    /// Likelihood-ratio statistic, asymptotically chi-square(1)
    pub lr_statistic: f64,

    pub p_value: f64,
}

/// Christoffersen independence / conditional-coverage test output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChristoffersenTest {
    /// Lag-1 autocorrelation of the exception indicator
    pub autocorrelation: f64,

    /// Independence statistic `n * autocorr^2`, chi-square(1)
    pub lr_independence: f64,

    pub p_value_independence: f64,

    /// Conditional coverage: Kupiec LR + independence LR, chi-square(2)
    pub lr_conditional: f64,

    pub p_value_conditional: f64,
}

/// Rolling VaR backtest result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarBacktest {
    pub method: VarMethod,
    pub confidence: f64,

    /// Rolling estimation window actually used
    pub window: usize,

    /// Number of out-of-sample forecasts compared
    pub n_obs: usize,

    pub n_exceptions: usize,
    pub exception_rate: f64,

    /// Nominal rate `1 - confidence`
    pub expected_rate: f64,

    pub kupiec: KupiecTest,
    pub christoffersen: ChristoffersenTest,
    pub zone: BaselZone,
}

/// Backtest a VaR method over a return series with a rolling window
pub fn backtest_var(
    returns: &[f64],
    confidence: f64,
    method: VarMethod,
    ewma_lambda: f64,
    window_cap: usize,
) -> Result<VarBacktest> {
    validate_confidence(confidence)?;
    if !matches!(method, VarMethod::Historical | VarMethod::Std | VarMethod::Ewma) {
        return Err(RiskError::UnsupportedMethod {
            method: method.as_str().to_string(),
            operation: "backtest".to_string(),
        });
    }
    if returns.len() < MIN_BACKTEST_OBSERVATIONS {
        return Err(RiskError::InsufficientData(format!(
            "Backtest needs at least {} returns, got {}",
            MIN_BACKTEST_OBSERVATIONS,
            returns.len()
        )));
    }

    let window = window_cap.min(returns.len() - 1).max(2);

    let mut hits = Vec::with_capacity(returns.len() - window);
    for t in window..returns.len() {
        let estimate = var_by_method(&returns[t - window..t], confidence, method, ewma_lambda)?;
        hits.push(-returns[t] > estimate);
    }

    let n = hits.len();
    let n_exceptions = hits.iter().filter(|h| **h).count();
    let exception_rate = n_exceptions as f64 / n as f64;
    let expected_rate = 1.0 - confidence;

    let kupiec = kupiec_test(n, n_exceptions, expected_rate)?;
    let christoffersen = christoffersen_test(&hits, n_exceptions, &kupiec)?;

    Ok(VarBacktest {
        method,
        confidence,
        window,
        n_obs: n,
        n_exceptions,
        exception_rate,
        expected_rate,
        kupiec,
        christoffersen,
        zone: BaselZone::classify(exception_rate),
    })
}

fn kupiec_test(n: usize, exceptions: usize, expected_rate: f64) -> Result<KupiecTest> {
    if exceptions == 0 {
        return Ok(KupiecTest {
            lr_statistic: 0.0,
            p_value: 1.0,
        });
    }

    let p = expected_rate.clamp(1e-12, 1.0 - 1e-12);
    let pi = (exceptions as f64 / n as f64).clamp(1e-12, 1.0 - 1e-12);
    let misses = (n - exceptions) as f64;
    let x = exceptions as f64;

    let ln_l0 = misses * (1.0 - p).ln() + x * p.ln();
    let ln_l1 = misses * (1.0 - pi).ln() + x * pi.ln();
    let lr_statistic = (2.0 * (ln_l1 - ln_l0)).max(0.0);

    let chi = ChiSquared::new(1.0).map_err(|e| RiskError::CalculationError(e.to_string()))?;
    Ok(KupiecTest {
        lr_statistic,
        p_value: 1.0 - chi.cdf(lr_statistic),
    })
}

fn christoffersen_test(
    hits: &[bool],
    n_exceptions: usize,
    kupiec: &KupiecTest,
) -> Result<ChristoffersenTest> {
    let chi1 = ChiSquared::new(1.0).map_err(|e| RiskError::CalculationError(e.to_string()))?;
    let chi2 = ChiSquared::new(2.0).map_err(|e| RiskError::CalculationError(e.to_string()))?;

    // With at most one exception, clustering is not identifiable
    let autocorrelation = if n_exceptions <= 1 {
        0.0
    } else {
        lag1_autocorrelation(hits)
    };

    let n = hits.len() as f64;
    let lr_independence = n * autocorrelation * autocorrelation;
    let lr_conditional = kupiec.lr_statistic + lr_independence;

    Ok(ChristoffersenTest {
        autocorrelation,
        lr_independence,
        p_value_independence: 1.0 - chi1.cdf(lr_independence),
        lr_conditional,
        p_value_conditional: 1.0 - chi2.cdf(lr_conditional),
    })
}

fn lag1_autocorrelation(hits: &[bool]) -> f64 {
    let series: Vec<f64> = hits.iter().map(|h| if *h { 1.0 } else { 0.0 }).collect();
    let m = mean(&series);

    let denom: f64 = series.iter().map(|x| (x - m).powi(2)).sum();
    if denom <= 0.0 {
        return 0.0;
    }

    let num: f64 = series
        .windows(2)
        .map(|w| (w[0] - m) * (w[1] - m))
        .sum();
    num / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volatility::DEFAULT_EWMA_LAMBDA;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn normal_returns(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0002, 0.012).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_basel_zone_boundaries() {
        assert_eq!(BaselZone::classify(0.005), BaselZone::Green);
        assert_eq!(BaselZone::classify(0.01), BaselZone::Green);
        assert_eq!(BaselZone::classify(0.015), BaselZone::Amber);
        assert_eq!(BaselZone::classify(0.02), BaselZone::Amber);
        assert_eq!(BaselZone::classify(0.03), BaselZone::Red);
    }

    #[test]
    fn test_backtest_well_specified_model() {
        let returns = normal_returns(1000, 21);
        let result =
            backtest_var(&returns, 0.99, VarMethod::Std, DEFAULT_EWMA_LAMBDA, 250).unwrap();

        assert_eq!(result.window, 250);
        assert_eq!(result.n_obs, 750);
        // A correctly specified model breaches rarely
        assert!(result.exception_rate < 0.05);
        assert!((0.0..=1.0).contains(&result.kupiec.p_value));
        assert!((0.0..=1.0).contains(&result.christoffersen.p_value_conditional));
    }

    #[test]
    fn test_backtest_window_capped_by_sample() {
        let returns = normal_returns(60, 22);
        let result =
            backtest_var(&returns, 0.95, VarMethod::Historical, DEFAULT_EWMA_LAMBDA, 250)
                .unwrap();

        assert_eq!(result.window, 59);
        assert_eq!(result.n_obs, 1);
    }

    #[test]
    fn test_backtest_zero_exceptions_degenerate() {
        // Constant positive returns never breach the forecast
        let returns = vec![0.001; 100];
        let result =
            backtest_var(&returns, 0.99, VarMethod::Historical, DEFAULT_EWMA_LAMBDA, 50).unwrap();

        assert_eq!(result.n_exceptions, 0);
        assert_eq!(result.kupiec.lr_statistic, 0.0);
        assert_eq!(result.kupiec.p_value, 1.0);
        assert_eq!(result.christoffersen.lr_independence, 0.0);
        assert_eq!(result.zone, BaselZone::Green);
    }

    #[test]
    fn test_backtest_rejects_unsupported_methods() {
        let returns = normal_returns(300, 23);
        for method in [VarMethod::Garch, VarMethod::Evt] {
            let err = backtest_var(&returns, 0.99, method, DEFAULT_EWMA_LAMBDA, 250).unwrap_err();
            assert!(matches!(err, RiskError::UnsupportedMethod { .. }));
        }
    }

    #[test]
    fn test_backtest_rejects_short_series() {
        let returns = normal_returns(20, 24);
        let err = backtest_var(&returns, 0.99, VarMethod::Std, DEFAULT_EWMA_LAMBDA, 250)
            .unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData(_)));
    }
}
