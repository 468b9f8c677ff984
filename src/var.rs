//! Value at Risk and Expected Shortfall estimators
//!
//! Implements the VaR/ES methodologies dispatched by the engine:
//! - Historical: empirical quantile of the return distribution
//! - Parametric: normal VaR with std/EWMA/GARCH volatility
//! - EVT: Generalized Pareto tail fitted to threshold exceedances, with a
//!   historical fallback when the sample or the tail is too thin
//!
//! All estimators follow a loss-positive convention: the reported value is a
//! positive loss magnitude. Degenerate outputs (empty ES tail) are `None`
//! rather than zero so callers can tell them from legitimate zeros.

use crate::error::{Result, RiskError};
use crate::series::{empirical_quantile, mean};
use crate::volatility::{sigma_estimate, VolModel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::debug;

/// Quantile of losses used as the EVT fitting threshold
pub const DEFAULT_EVT_THRESHOLD_QUANTILE: f64 = 0.9;

/// Minimum sample size for an EVT fit
const EVT_MIN_OBSERVATIONS: usize = 100;

/// Minimum number of threshold exceedances for an EVT fit
const EVT_MIN_EXCESSES: usize = 10;

/// VaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarMethod {
    Historical,
    Std,
    Ewma,
    Garch,
    Evt,
}

impl VarMethod {
    /// Method name as it appears in request payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            VarMethod::Historical => "historical",
            VarMethod::Std => "std",
            VarMethod::Ewma => "ewma",
            VarMethod::Garch => "garch",
            VarMethod::Evt => "evt",
        }
    }

    /// Volatility model behind the parametric variants
    pub fn vol_model(&self) -> Option<VolModel> {
        match self {
            VarMethod::Std => Some(VolModel::Std),
            VarMethod::Ewma => Some(VolModel::Ewma),
            VarMethod::Garch => Some(VolModel::Garch),
            VarMethod::Historical | VarMethod::Evt => None,
        }
    }
}

/// Historical VaR result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalVar {
    /// VaR as a positive loss magnitude
    pub value: f64,

    pub confidence: f64,

    /// Empirical return quantile the VaR was read from
    pub quantile: f64,

    pub n_obs: usize,
}

/// Historical Expected Shortfall result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalEs {
    /// ES as a positive loss magnitude; `None` when no return falls
    /// strictly below the threshold
    pub value: Option<f64>,

    pub confidence: f64,

    /// Return quantile separating the tail
    pub threshold: f64,

    /// Number of returns strictly below the threshold
    pub n_tail: usize,
}

/// Parametric (normal) VaR result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametricVar {
    pub value: f64,
    pub confidence: f64,
    pub mean: f64,
    pub sigma: f64,

    /// Normal quantile `Φ⁻¹(1 - confidence)`
    pub z: f64,

    pub model: VolModel,

    /// Decay factor, present for the EWMA model
    pub ewma_lambda: Option<f64>,
}

/// Parametric (normal) Expected Shortfall result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametricEs {
    pub value: f64,
    pub confidence: f64,
    pub mean: f64,
    pub sigma: f64,
    pub model: VolModel,
    pub ewma_lambda: Option<f64>,
}

/// Fitted Generalized Pareto tail
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GpdTail {
    /// Shape parameter
    pub xi: f64,

    /// Scale parameter
    pub beta: f64,

    /// Loss threshold the excesses were measured over
    pub threshold: f64,

    /// Fraction of observations exceeding the threshold
    pub tail_fraction: f64,
}

/// EVT VaR result
///
/// `tail` is `None` when the estimator fell back to historical VaR
/// (sample too small, tail too thin, or degenerate fit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvtVar {
    pub value: f64,
    pub confidence: f64,
    pub tail: Option<GpdTail>,
}

/// EVT Expected Shortfall result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvtEs {
    /// `None` only on the historical-fallback path with an empty tail
    pub value: Option<f64>,

    pub confidence: f64,

    /// `None` when the estimator fell back to historical ES
    pub tail: Option<GpdTail>,
}

/// Maximum drawdown report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownReport {
    /// Most negative drawdown (0 for a series that never declines)
    pub max_drawdown: f64,

    /// Date the trough was reached
    pub trough_date: NaiveDate,

    /// Last date the cumulative value was within 0.01% of the prior peak
    pub start_date: NaiveDate,
}

pub(crate) fn validate_confidence(confidence: f64) -> Result<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(RiskError::InvalidConfidenceLevel(confidence));
    }
    Ok(())
}

fn validate_returns(returns: &[f64]) -> Result<()> {
    if returns.is_empty() {
        return Err(RiskError::InsufficientData(
            "Return series is empty".to_string(),
        ));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(RiskError::InvalidParameter(
            "Return series contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Historical VaR: negated `(1 - confidence)` empirical return quantile
pub fn historical_var(returns: &[f64], confidence: f64) -> Result<HistoricalVar> {
    validate_returns(returns)?;
    validate_confidence(confidence)?;

    let quantile = empirical_quantile(returns, 1.0 - confidence);
    Ok(HistoricalVar {
        value: -quantile,
        confidence,
        quantile,
        n_obs: returns.len(),
    })
}

/// Historical ES: negated mean of returns strictly below the VaR quantile
pub fn historical_es(returns: &[f64], confidence: f64) -> Result<HistoricalEs> {
    validate_returns(returns)?;
    validate_confidence(confidence)?;

    let threshold = empirical_quantile(returns, 1.0 - confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r < threshold).collect();

    let value = if tail.is_empty() {
        None
    } else {
        Some(-mean(&tail))
    };

    Ok(HistoricalEs {
        value,
        confidence,
        threshold,
        n_tail: tail.len(),
    })
}

/// Parametric VaR: `-(μ + z·σ)` with `z = Φ⁻¹(1 - confidence)`
pub fn parametric_var(
    returns: &[f64],
    confidence: f64,
    model: VolModel,
    ewma_lambda: f64,
) -> Result<ParametricVar> {
    validate_returns(returns)?;
    validate_confidence(confidence)?;

    let mu = mean(returns);
    let sigma = sigma_estimate(returns, model, ewma_lambda)?;

    let normal =
        Normal::new(0.0, 1.0).map_err(|e| RiskError::CalculationError(e.to_string()))?;
    let z = normal.inverse_cdf(1.0 - confidence);

    Ok(ParametricVar {
        value: -(mu + z * sigma),
        confidence,
        mean: mu,
        sigma,
        z,
        model,
        ewma_lambda: (model == VolModel::Ewma).then_some(ewma_lambda),
    })
}

/// Parametric ES: `-(μ - σ·φ(z)/(1 - confidence))`
pub fn parametric_es(
    returns: &[f64],
    confidence: f64,
    model: VolModel,
    ewma_lambda: f64,
) -> Result<ParametricEs> {
    let var = parametric_var(returns, confidence, model, ewma_lambda)?;

    let normal =
        Normal::new(0.0, 1.0).map_err(|e| RiskError::CalculationError(e.to_string()))?;
    let value = -(var.mean - var.sigma * normal.pdf(var.z) / (1.0 - confidence));

    Ok(ParametricEs {
        value,
        confidence,
        mean: var.mean,
        sigma: var.sigma,
        model,
        ewma_lambda: var.ewma_lambda,
    })
}

/// EVT VaR with a Generalized Pareto tail over threshold exceedances
///
/// Falls back to historical VaR when the sample has fewer than 100
/// observations, fewer than 10 exceedances, or the fit degenerates; the
/// fallback is signalled by `tail: None`.
pub fn evt_var(
    returns: &[f64],
    confidence: f64,
    threshold_quantile: f64,
) -> Result<EvtVar> {
    validate_returns(returns)?;
    validate_confidence(confidence)?;
    if !(threshold_quantile > 0.0 && threshold_quantile < 1.0) {
        return Err(RiskError::InvalidParameter(format!(
            "EVT threshold quantile {} must be in (0, 1)",
            threshold_quantile
        )));
    }

    let losses: Vec<f64> = returns.iter().map(|r| -r).collect();
    let n = losses.len();
    let u = empirical_quantile(&losses, threshold_quantile);
    let excesses: Vec<f64> = losses.iter().filter(|l| **l > u).map(|l| l - u).collect();

    let fallback = |reason: &str| -> Result<EvtVar> {
        debug!(reason, "EVT VaR falling back to historical");
        let hist = historical_var(returns, confidence)?;
        Ok(EvtVar {
            value: hist.value,
            confidence,
            tail: None,
        })
    };

    if n < EVT_MIN_OBSERVATIONS || excesses.len() < EVT_MIN_EXCESSES {
        return fallback("sample or tail too small");
    }

    let (xi, beta) = match fit_gpd_pwm(&excesses) {
        Some(params) => params,
        None => return fallback("degenerate GPD fit"),
    };

    let tail_fraction = excesses.len() as f64 / n as f64;
    let ratio = tail_fraction / (1.0 - confidence);
    let value = if xi.abs() > 1e-9 {
        u + beta / xi * (ratio.powf(-xi) - 1.0)
    } else {
        u + beta * ratio.ln()
    };

    if !value.is_finite() {
        return fallback("non-finite EVT quantile");
    }

    Ok(EvtVar {
        value,
        confidence,
        tail: Some(GpdTail {
            xi,
            beta,
            threshold: u,
            tail_fraction,
        }),
    })
}

/// EVT ES derived from the fitted tail; requires shape < 1
pub fn evt_es(returns: &[f64], confidence: f64, threshold_quantile: f64) -> Result<EvtEs> {
    let var = evt_var(returns, confidence, threshold_quantile)?;

    let tail = match var.tail {
        Some(tail) if tail.xi < 1.0 => tail,
        _ => {
            debug!("EVT ES falling back to historical");
            let hist = historical_es(returns, confidence)?;
            return Ok(EvtEs {
                value: hist.value,
                confidence,
                tail: None,
            });
        }
    };

    let value =
        var.value / (1.0 - tail.xi) + (tail.beta - tail.xi * tail.threshold) / (1.0 - tail.xi);

    Ok(EvtEs {
        value: Some(value),
        confidence,
        tail: Some(tail),
    })
}

/// Probability-weighted-moments fit for a Generalized Pareto Distribution
/// with location fixed at zero
///
/// Returns `None` when the moment system degenerates or yields a
/// non-positive scale.
fn fit_gpd_pwm(excesses: &[f64]) -> Option<(f64, f64)> {
    let n = excesses.len();
    if n < 2 {
        return None;
    }

    let mut sorted = excesses.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let b0 = mean(&sorted);
    let b1 = sorted
        .iter()
        .enumerate()
        .map(|(i, y)| y * (n - 1 - i) as f64 / (n - 1) as f64)
        .sum::<f64>()
        / n as f64;

    let denom = b0 - 2.0 * b1;
    if denom.abs() < 1e-12 {
        return None;
    }

    let xi = 2.0 - b0 / denom;
    let beta = 2.0 * b0 * b1 / denom;

    (beta > 0.0 && xi.is_finite()).then_some((xi, beta))
}

/// Portfolio VaR by method, as a positive loss magnitude
///
/// The closed dispatch used by attribution, backtesting, and the engine.
pub fn var_by_method(
    returns: &[f64],
    confidence: f64,
    method: VarMethod,
    ewma_lambda: f64,
) -> Result<f64> {
    match method {
        VarMethod::Historical => historical_var(returns, confidence).map(|r| r.value),
        VarMethod::Std | VarMethod::Ewma | VarMethod::Garch => {
            let model = method.vol_model().unwrap();
            parametric_var(returns, confidence, model, ewma_lambda).map(|r| r.value)
        }
        VarMethod::Evt => {
            evt_var(returns, confidence, DEFAULT_EVT_THRESHOLD_QUANTILE).map(|r| r.value)
        }
    }
}

/// Maximum drawdown of the cumulative wealth path
///
/// The recovery start is found by scanning backward from the trough to the
/// last date the cumulative value sat within 0.01% of the prior peak.
pub fn drawdown(dates: &[NaiveDate], returns: &[f64]) -> Result<DrawdownReport> {
    validate_returns(returns)?;
    if dates.len() != returns.len() {
        return Err(RiskError::InvalidParameter(format!(
            "{} dates for {} returns",
            dates.len(),
            returns.len()
        )));
    }

    let mut wealth = Vec::with_capacity(returns.len());
    let mut cum = 1.0;
    for r in returns {
        cum *= 1.0 + r;
        wealth.push(cum);
    }

    let mut running_max = Vec::with_capacity(wealth.len());
    let mut peak = f64::MIN;
    for w in &wealth {
        peak = peak.max(*w);
        running_max.push(peak);
    }

    let mut trough = 0;
    let mut max_drawdown = 0.0;
    for (i, (w, p)) in wealth.iter().zip(&running_max).enumerate() {
        let dd = w / p - 1.0;
        if dd < max_drawdown {
            max_drawdown = dd;
            trough = i;
        }
    }

    let prior_peak = running_max[trough];
    let mut start = trough;
    for i in (0..=trough).rev() {
        if wealth[i] >= prior_peak * (1.0 - 1e-4) {
            start = i;
            break;
        }
    }

    Ok(DrawdownReport {
        max_drawdown,
        trough_date: dates[trough],
        start_date: dates[start],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volatility::DEFAULT_EWMA_LAMBDA;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal as RandNormal};

    fn loss_skewed_returns() -> Vec<f64> {
        let mut returns = Vec::with_capacity(50);
        for i in 0..50 {
            let r = match i % 10 {
                0 => -0.06,
                1 => -0.03,
                _ => 0.004 + (i % 3) as f64 * 0.002,
            };
            returns.push(r);
        }
        returns
    }

    #[test]
    fn test_historical_var_monotone_in_confidence() {
        let returns = loss_skewed_returns();
        let var_95 = historical_var(&returns, 0.95).unwrap();
        let var_99 = historical_var(&returns, 0.99).unwrap();
        assert!(var_99.value >= var_95.value);
    }

    #[test]
    fn test_historical_es_counts_strict_tail() {
        let returns = loss_skewed_returns();
        let es = historical_es(&returns, 0.95).unwrap();

        let expected_count = returns.iter().filter(|r| **r < es.threshold).count();
        assert_eq!(es.n_tail, expected_count);
        assert!(es.value.unwrap() > 0.0);
    }

    #[test]
    fn test_historical_es_empty_tail_is_none() {
        // Constant series: nothing lies strictly below the quantile
        let returns = vec![0.01; 40];
        let es = historical_es(&returns, 0.95).unwrap();
        assert_eq!(es.n_tail, 0);
        assert!(es.value.is_none());
    }

    #[test]
    fn test_parametric_var_constant_series() {
        let returns = vec![0.01; 30];
        let var = parametric_var(&returns, 0.95, VolModel::Std, DEFAULT_EWMA_LAMBDA).unwrap();
        assert_eq!(var.sigma, 0.0);
        assert_relative_eq!(var.value, -0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_parametric_var_matches_normal_quantile() {
        let mut rng = StdRng::seed_from_u64(11);
        let normal = RandNormal::new(0.0, 0.02).unwrap();
        let returns: Vec<f64> = (0..5000).map(|_| normal.sample(&mut rng)).collect();

        let var = parametric_var(&returns, 0.99, VolModel::Std, DEFAULT_EWMA_LAMBDA).unwrap();
        // z(0.99) = 2.326; VaR ≈ 2.326 * 0.02
        assert_relative_eq!(var.value, 2.326 * 0.02, epsilon = 4e-3);
    }

    #[test]
    fn test_parametric_es_exceeds_var() {
        let mut rng = StdRng::seed_from_u64(12);
        let normal = RandNormal::new(0.0, 0.02).unwrap();
        let returns: Vec<f64> = (0..2000).map(|_| normal.sample(&mut rng)).collect();

        let var = parametric_var(&returns, 0.95, VolModel::Std, DEFAULT_EWMA_LAMBDA).unwrap();
        let es = parametric_es(&returns, 0.95, VolModel::Std, DEFAULT_EWMA_LAMBDA).unwrap();
        assert!(es.value > var.value);
    }

    #[test]
    fn test_evt_falls_back_on_small_sample() {
        let returns = loss_skewed_returns();
        let evt = evt_var(&returns, 0.99, DEFAULT_EVT_THRESHOLD_QUANTILE).unwrap();
        let hist = historical_var(&returns, 0.99).unwrap();

        assert!(evt.tail.is_none());
        assert_relative_eq!(evt.value, hist.value, epsilon = 1e-12);
    }

    #[test]
    fn test_evt_fits_fat_tail() {
        // Student-t-like fat tails via a normal mixture
        let mut rng = StdRng::seed_from_u64(13);
        let body = RandNormal::new(0.0, 0.01).unwrap();
        let tail = RandNormal::new(0.0, 0.05).unwrap();
        let returns: Vec<f64> = (0..2000)
            .map(|i| {
                if i % 10 == 0 {
                    tail.sample(&mut rng)
                } else {
                    body.sample(&mut rng)
                }
            })
            .collect();

        let evt = evt_var(&returns, 0.99, DEFAULT_EVT_THRESHOLD_QUANTILE).unwrap();
        let fitted = evt.tail.expect("large fat-tailed sample should fit");

        assert!(fitted.beta > 0.0);
        assert!(evt.value > 0.0);
        assert_relative_eq!(fitted.tail_fraction, 0.1, epsilon = 0.02);

        let es = evt_es(&returns, 0.99, DEFAULT_EVT_THRESHOLD_QUANTILE).unwrap();
        assert!(es.tail.is_some());
        assert!(es.value.unwrap() >= evt.value);
    }

    #[test]
    fn test_drawdown_known_path() {
        let dates: Vec<NaiveDate> = (1..=6)
            .map(|day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
            .collect();
        let returns = vec![0.10, 0.05, -0.20, -0.10, 0.15, 0.05];

        let report = drawdown(&dates, &returns).unwrap();

        // Peak after day 2 at 1.155, trough after day 4 at 0.8316
        assert_relative_eq!(report.max_drawdown, 0.8316 / 1.155 - 1.0, epsilon = 1e-9);
        assert_eq!(report.trough_date, dates[3]);
        assert_eq!(report.start_date, dates[1]);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(historical_var(&[], 0.95).is_err());
        assert!(historical_var(&[0.01], 1.5).is_err());
        assert!(historical_var(&[0.01], 0.0).is_err());
        assert!(evt_var(&loss_skewed_returns(), 0.95, 1.2).is_err());
    }
}
