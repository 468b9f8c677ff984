//! Covariance estimation and portfolio risk attribution
//!
//! Provides:
//! - Ledoit-Wolf shrinkage toward a scaled-identity target, positive
//!   definite even when observations < assets, with a sample-covariance
//!   fallback (`shrinkage: 0.0`) when the intensity estimate degenerates
//! - Per-asset contribution to portfolio volatility
//! - Incremental VaR (weight perturbation) and marginal VaR (asset removal)
//! - Relative VaR against a benchmark series

use crate::error::{Result, RiskError};
use crate::series::{normalize_weights, DatedSeries, ReturnPanel};
use crate::var::{var_by_method, VarMethod};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shrunk covariance estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShrunkCovariance {
    /// Asset order matching the matrix rows/columns
    pub assets: Vec<String>,

    /// N x N covariance matrix
    pub matrix: DMatrix<f64>,

    /// Shrinkage intensity in [0, 1]; 0 signals the sample-covariance
    /// fallback
    pub shrinkage: f64,

    /// Complete observation rows the estimate was computed from
    pub n_obs: usize,
}

/// Volatility decomposition across assets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityAttribution {
    /// Portfolio volatility `sqrt(wᵀ Σ w)`
    pub portfolio_volatility: f64,

    /// Per-asset contribution `w_i (Σw)_i / σ_p`; sums to the portfolio
    /// volatility
    pub contributions: Vec<f64>,
}

/// Incremental VaR report: weight bump deltas per asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalVar {
    pub base_var: f64,
    pub method: VarMethod,

    /// Weight perturbation applied before renormalization
    pub delta: f64,

    /// `VaR_new - VaR_base` per asset
    pub deltas: Vec<f64>,
}

/// Marginal VaR report: asset removal deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginalVar {
    pub base_var: f64,
    pub method: VarMethod,

    /// `VaR_without_asset - VaR_base` per asset; `None` when removal
    /// leaves no portfolio
    pub deltas: Vec<Option<f64>>,
}

/// Relative VaR of a portfolio against a benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeVar {
    /// VaR of the (portfolio - benchmark) return series
    pub value: f64,

    pub method: VarMethod,

    /// Overlapping observations the estimate used
    pub n_obs: usize,
}

/// Ledoit-Wolf shrinkage estimate from a returns panel
///
/// Uses complete rows only (every asset present). The target is
/// `μ·I` with μ the average sample variance; the intensity follows
/// Ledoit-Wolf (2004) and is clamped to [0, 1].
pub fn shrunk_covariance(panel: &ReturnPanel) -> Result<ShrunkCovariance> {
    if panel.assets.is_empty() {
        return Err(RiskError::NoData("Panel has no assets".to_string()));
    }

    let (x, n_obs) = panel.complete_rows();
    if n_obs < 2 {
        return Err(RiskError::InsufficientData(format!(
            "Covariance needs at least 2 complete observation rows, got {}",
            n_obs
        )));
    }

    let (matrix, shrinkage) = ledoit_wolf(&x);
    Ok(ShrunkCovariance {
        assets: panel.assets.clone(),
        matrix,
        shrinkage,
        n_obs,
    })
}

/// Ledoit-Wolf shrinkage on an observations-by-assets matrix
///
/// Returns the shrunk covariance and the intensity used. Degenerate
/// dispersion estimates fall back to the sample covariance with
/// intensity 0.
pub fn ledoit_wolf(x: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let t = x.nrows();
    let n = x.ncols();

    let mut centered = x.clone();
    for col in 0..n {
        let mean = x.column(col).mean();
        for row in 0..t {
            centered[(row, col)] -= mean;
        }
    }

    let s_pop = centered.transpose() * &centered / t as f64;
    let s_sample = centered.transpose() * &centered / (t - 1) as f64;

    let mu = s_pop.trace() / n as f64;
    let target = DMatrix::from_diagonal_element(n, n, mu);

    // pi_hat: average squared Frobenius distance between per-observation
    // outer products and the population covariance
    let mut pi_hat = 0.0;
    for row in 0..t {
        let obs = centered.row(row).transpose();
        let outer = &obs * obs.transpose();
        pi_hat += (&outer - &s_pop).norm_squared();
    }
    pi_hat /= t as f64;

    let delta_hat = (&s_pop - &target).norm_squared();

    if delta_hat <= f64::EPSILON || !delta_hat.is_finite() {
        warn!("Ledoit-Wolf dispersion degenerate, using sample covariance");
        return (s_sample, 0.0);
    }

    let shrinkage = (pi_hat / (delta_hat * t as f64)).clamp(0.0, 1.0);
    let shrunk = &s_sample * (1.0 - shrinkage) + &target * shrinkage;
    (shrunk, shrinkage)
}

/// Per-asset contribution to portfolio volatility
///
/// `contrib_i = w_i (Σw)_i / σ_p`, so contributions sum to `σ_p`.
pub fn risk_contributions(weights: &[f64], cov: &DMatrix<f64>) -> Result<VolatilityAttribution> {
    if weights.len() != cov.nrows() || cov.nrows() != cov.ncols() {
        return Err(RiskError::MatrixError(format!(
            "{} weights for a {}x{} covariance",
            weights.len(),
            cov.nrows(),
            cov.ncols()
        )));
    }

    let w = DVector::from_column_slice(weights);
    let marginal = cov * &w;
    let variance = w.dot(&marginal);
    if variance < 0.0 {
        return Err(RiskError::MatrixError(format!(
            "Negative portfolio variance: {}",
            variance
        )));
    }

    let sigma = variance.sqrt();
    if sigma == 0.0 {
        return Err(RiskError::CalculationError(
            "Portfolio volatility is zero".to_string(),
        ));
    }

    let contributions = weights
        .iter()
        .zip(marginal.iter())
        .map(|(wi, mi)| wi * mi / sigma)
        .collect();

    Ok(VolatilityAttribution {
        portfolio_volatility: sigma,
        contributions,
    })
}

/// Incremental VaR: bump each asset's weight by `delta`, renormalize, and
/// recompute portfolio VaR by the chosen method
pub fn incremental_var(
    panel: &ReturnPanel,
    weights: &[f64],
    confidence: f64,
    method: VarMethod,
    ewma_lambda: f64,
    delta: f64,
) -> Result<IncrementalVar> {
    if delta <= 0.0 {
        return Err(RiskError::InvalidParameter(format!(
            "IVaR perturbation {} must be positive",
            delta
        )));
    }
    let weights = normalize_weights(weights, panel.assets.len())?;
    let base_var = portfolio_var(panel, &weights, confidence, method, ewma_lambda)?;

    let mut deltas = Vec::with_capacity(weights.len());
    for i in 0..weights.len() {
        let mut bumped = weights.clone();
        bumped[i] += delta;
        let bumped = normalize_weights(&bumped, bumped.len())?;
        let var = portfolio_var(panel, &bumped, confidence, method, ewma_lambda)?;
        deltas.push(var - base_var);
    }

    Ok(IncrementalVar {
        base_var,
        method,
        delta,
        deltas,
    })
}

/// Marginal VaR: remove each asset entirely, renormalize the remainder,
/// and recompute portfolio VaR
///
/// Removal that leaves no weighted asset (single-asset portfolio, or a
/// sole fully-weighted asset) reports `None`.
pub fn marginal_var(
    panel: &ReturnPanel,
    weights: &[f64],
    confidence: f64,
    method: VarMethod,
    ewma_lambda: f64,
) -> Result<MarginalVar> {
    let weights = normalize_weights(weights, panel.assets.len())?;
    let base_var = portfolio_var(panel, &weights, confidence, method, ewma_lambda)?;

    let mut deltas = Vec::with_capacity(weights.len());
    for i in 0..weights.len() {
        let mut reduced = weights.clone();
        reduced[i] = 0.0;
        if reduced.iter().sum::<f64>() <= 0.0 {
            deltas.push(None);
            continue;
        }
        let reduced = normalize_weights(&reduced, reduced.len())?;
        let var = portfolio_var(panel, &reduced, confidence, method, ewma_lambda)?;
        deltas.push(Some(var - base_var));
    }

    Ok(MarginalVar {
        base_var,
        method,
        deltas,
    })
}

/// Relative VaR: VaR of the portfolio-minus-benchmark return series over
/// their common dates
///
/// Fails with `NoOverlap` when the series share no dates.
pub fn relative_var(
    portfolio: &DatedSeries,
    benchmark: &DatedSeries,
    confidence: f64,
    method: VarMethod,
    ewma_lambda: f64,
) -> Result<RelativeVar> {
    let (p, b) = portfolio.align(benchmark);
    if p.is_empty() {
        return Err(RiskError::NoOverlap(
            "portfolio".to_string(),
            "benchmark".to_string(),
        ));
    }

    let diff: Vec<f64> = p.iter().zip(&b).map(|(x, y)| x - y).collect();
    let value = var_by_method(&diff, confidence, method, ewma_lambda)?;

    Ok(RelativeVar {
        value,
        method,
        n_obs: diff.len(),
    })
}

fn portfolio_var(
    panel: &ReturnPanel,
    weights: &[f64],
    confidence: f64,
    method: VarMethod,
    ewma_lambda: f64,
) -> Result<f64> {
    let series = panel.portfolio_returns(weights)?;
    var_by_method(&series.values, confidence, method, ewma_lambda)
}
