//! Volatility estimation for parametric VaR and simulation
//!
//! Supports three models behind a closed enum:
//! - `Std`: sample standard deviation (ddof = 1)
//! - `Ewma`: RiskMetrics recursion `var_t = λ·var_{t-1} + (1-λ)·x_t²`,
//!   seeded from the sample variance
//! - `Garch`: GARCH(1,1) conditional volatility, available only when the
//!   crate is built with the `garch` feature
//!
//! GARCH is fitted on returns scaled by 100 for numerical stability and the
//! resulting conditional volatility is scaled back.

use crate::error::{Result, RiskError};
use crate::series::{sample_std, sample_variance};
use serde::{Deserialize, Serialize};

/// Default RiskMetrics decay factor
pub const DEFAULT_EWMA_LAMBDA: f64 = 0.94;

/// Volatility model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolModel {
    Std,
    Ewma,
    Garch,
}

impl VolModel {
    /// Method name as it appears in request payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            VolModel::Std => "std",
            VolModel::Ewma => "ewma",
            VolModel::Garch => "garch",
        }
    }
}

/// Whether the GARCH backend was compiled in
pub fn garch_available() -> bool {
    cfg!(feature = "garch")
}

/// EWMA volatility series over the full sample
///
/// Output has the same length as `returns`; the recursion starts from the
/// sample variance.
pub fn ewma_volatility(returns: &[f64], lambda: f64) -> Result<Vec<f64>> {
    if returns.is_empty() {
        return Err(RiskError::InsufficientData(
            "EWMA volatility needs at least one return".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&lambda) {
        return Err(RiskError::InvalidParameter(format!(
            "EWMA lambda {} must be in [0, 1)",
            lambda
        )));
    }

    let mut variance = sample_variance(returns);
    let mut out = Vec::with_capacity(returns.len());
    for r in returns {
        variance = lambda * variance + (1.0 - lambda) * r * r;
        out.push(variance.max(0.0).sqrt());
    }
    Ok(out)
}

/// Point volatility estimate for a return series under the chosen model
pub fn sigma_estimate(returns: &[f64], model: VolModel, ewma_lambda: f64) -> Result<f64> {
    if returns.len() < 2 {
        return Err(RiskError::InsufficientData(format!(
            "Need at least 2 returns for a volatility estimate, got {}",
            returns.len()
        )));
    }

    match model {
        VolModel::Std => Ok(sample_std(returns)),
        VolModel::Ewma => {
            let series = ewma_volatility(returns, ewma_lambda)?;
            Ok(*series.last().unwrap())
        }
        VolModel::Garch => garch_sigma(returns),
    }
}

#[cfg(feature = "garch")]
fn garch_sigma(returns: &[f64]) -> Result<f64> {
    let scaled: Vec<f64> = returns.iter().map(|r| r * 100.0).collect();
    let fit = garch::fit(&scaled)?;
    Ok(fit.conditional_volatility / 100.0)
}

#[cfg(not(feature = "garch"))]
fn garch_sigma(_returns: &[f64]) -> Result<f64> {
    Err(RiskError::GarchUnavailable)
}

/// GARCH(1,1) maximum-likelihood fit
#[cfg(feature = "garch")]
pub mod garch {
    use super::*;
    use crate::series::mean;

    /// Minimum observations for a stable GARCH fit
    const MIN_OBSERVATIONS: usize = 20;

    /// Fitted GARCH(1,1) parameters and the end-of-sample state
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GarchFit {
        pub omega: f64,
        pub alpha: f64,
        pub beta: f64,

        /// Conditional volatility at the last observation
        pub conditional_volatility: f64,

        pub log_likelihood: f64,
    }

    /// Fit GARCH(1,1) by grid-searched Gaussian quasi-MLE
    ///
    /// Omega is tied to the sample variance by variance targeting
    /// (`omega = v·(1 - alpha - beta)`), and `(alpha, beta)` is found with a
    /// coarse grid pass followed by one local refinement. Deterministic.
    pub fn fit(returns: &[f64]) -> Result<GarchFit> {
        if returns.len() < MIN_OBSERVATIONS {
            return Err(RiskError::InsufficientData(format!(
                "GARCH fit needs at least {} returns, got {}",
                MIN_OBSERVATIONS,
                returns.len()
            )));
        }

        let mu = mean(returns);
        let x: Vec<f64> = returns.iter().map(|r| r - mu).collect();
        let sample_var = sample_variance(&x);
        if sample_var <= 0.0 {
            return Err(RiskError::CalculationError(
                "Zero-variance series cannot be fitted by GARCH".to_string(),
            ));
        }

        let mut best = (0.05, 0.90);
        let mut best_ll = f64::NEG_INFINITY;

        let evaluate = |alpha: f64, beta: f64, best: &mut (f64, f64), best_ll: &mut f64| {
            if alpha <= 0.0 || beta < 0.0 || alpha + beta >= 0.999 {
                return;
            }
            if let Some(ll) = log_likelihood(&x, sample_var, alpha, beta) {
                if ll > *best_ll {
                    *best_ll = ll;
                    *best = (alpha, beta);
                }
            }
        };

        for i in 0..30 {
            let alpha = 0.005 + i as f64 * 0.01;
            for j in 0..50 {
                let beta = j as f64 * 0.02;
                evaluate(alpha, beta, &mut best, &mut best_ll);
            }
        }

        let (a0, b0) = best;
        for i in -10i32..=10 {
            let alpha = a0 + i as f64 * 0.001;
            for j in -10i32..=10 {
                let beta = b0 + j as f64 * 0.002;
                evaluate(alpha, beta, &mut best, &mut best_ll);
            }
        }

        if best_ll == f64::NEG_INFINITY {
            return Err(RiskError::CalculationError(
                "GARCH likelihood maximization failed".to_string(),
            ));
        }

        let (alpha, beta) = best;
        let omega = sample_var * (1.0 - alpha - beta);
        let last_var = conditional_variances(&x, sample_var, omega, alpha, beta)
            .last()
            .copied()
            .unwrap();

        Ok(GarchFit {
            omega,
            alpha,
            beta,
            conditional_volatility: last_var.sqrt(),
            log_likelihood: best_ll,
        })
    }

    fn conditional_variances(
        x: &[f64],
        initial: f64,
        omega: f64,
        alpha: f64,
        beta: f64,
    ) -> Vec<f64> {
        let mut h = initial;
        let mut out = Vec::with_capacity(x.len());
        out.push(h);
        for t in 1..x.len() {
            h = omega + alpha * x[t - 1] * x[t - 1] + beta * h;
            out.push(h);
        }
        out
    }

    fn log_likelihood(x: &[f64], sample_var: f64, alpha: f64, beta: f64) -> Option<f64> {
        let omega = sample_var * (1.0 - alpha - beta);
        if omega <= 0.0 {
            return None;
        }
        let variances = conditional_variances(x, sample_var, omega, alpha, beta);
        let mut ll = 0.0;
        for (xt, h) in x.iter().zip(&variances) {
            if *h <= 0.0 {
                return None;
            }
            ll += -0.5 * (h.ln() + xt * xt / h);
        }
        ll.is_finite().then_some(ll)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ewma_matches_manual_recursion() {
        let returns = vec![0.01, -0.02, 0.015, -0.005];
        let lambda = 0.94;
        let vols = ewma_volatility(&returns, lambda).unwrap();

        let mut v = sample_variance(&returns);
        for (r, vol) in returns.iter().zip(&vols) {
            v = lambda * v + (1.0 - lambda) * r * r;
            assert_relative_eq!(*vol, v.sqrt(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_std_sigma_is_sample_std() {
        let returns = vec![0.01, 0.02, -0.01, 0.03, -0.02];
        let sigma = sigma_estimate(&returns, VolModel::Std, DEFAULT_EWMA_LAMBDA).unwrap();
        assert_relative_eq!(sigma, sample_std(&returns), epsilon = 1e-12);
    }

    #[test]
    fn test_constant_series_has_zero_sigma() {
        let returns = vec![0.01; 30];
        let sigma = sigma_estimate(&returns, VolModel::Std, DEFAULT_EWMA_LAMBDA).unwrap();
        assert_eq!(sigma, 0.0);
    }

    #[cfg(not(feature = "garch"))]
    #[test]
    fn test_garch_unavailable_without_feature() {
        let returns = vec![0.01; 50];
        let err = sigma_estimate(&returns, VolModel::Garch, DEFAULT_EWMA_LAMBDA).unwrap_err();
        assert!(matches!(err, RiskError::GarchUnavailable));
    }

    #[test]
    fn test_invalid_lambda_rejected() {
        assert!(ewma_volatility(&[0.01], 1.0).is_err());
        assert!(ewma_volatility(&[0.01], -0.1).is_err());
    }
}
