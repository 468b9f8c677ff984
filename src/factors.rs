//! Fama-French factor-model regressions
//!
//! Converts daily prices to month-end returns, aligns them with monthly
//! factor returns and the risk-free rate on intersecting months, and fits
//! an OLS regression of each asset's excess return on the factor set
//! (FF3: MKT_RF/SMB/HML; FF5 adds RMW/CMA). Reports alpha, per-factor
//! betas with t-stats and p-values, and R² per asset.

use crate::error::{Result, RiskError};
use crate::series::{DatedSeries, PricePanel};
use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Minimum aligned observations for a per-asset regression
pub const MIN_REGRESSION_OBSERVATIONS: usize = 10;

/// Minimum aligned months across the dataset before any regression runs
pub const MIN_ALIGNED_MONTHS: usize = 6;

/// Observation count below which estimates are flagged as unstable
const FEW_OBSERVATIONS: usize = 12;

/// Factor model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorModelKind {
    #[serde(rename = "ff3")]
    ThreeFactor,

    #[serde(rename = "ff5")]
    FiveFactor,
}

impl FactorModelKind {
    /// Factor column names required by the model
    pub fn factor_names(&self) -> &'static [&'static str] {
        match self {
            FactorModelKind::ThreeFactor => &["MKT_RF", "SMB", "HML"],
            FactorModelKind::FiveFactor => &["MKT_RF", "SMB", "HML", "RMW", "CMA"],
        }
    }
}

/// Monthly factor returns, dense, one column per factor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorPanel {
    pub dates: Vec<NaiveDate>,
    pub factors: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// One fitted factor loading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorBeta {
    pub factor: String,
    pub beta: f64,
    pub t_stat: f64,
    pub p_value: f64,
}

/// Per-asset regression output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorRegression {
    /// Intercept of the excess-return regression
    pub alpha: f64,
    pub alpha_t_stat: f64,
    pub alpha_p_value: f64,

    pub betas: Vec<FactorBeta>,
    pub r_squared: f64,
    pub n_obs: usize,

    /// Advisory note, set when the sample is thin
    pub note: Option<String>,
}

/// Regression results keyed by asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorReport {
    pub model: FactorModelKind,

    /// Aligned months available across the dataset
    pub aligned_months: usize,

    pub results: BTreeMap<String, FactorRegression>,
}

type MonthKey = (i32, u32);

fn month_key(date: NaiveDate) -> MonthKey {
    (date.year(), date.month())
}

/// Fit the factor model for every asset in a daily price panel
///
/// Assets with fewer than `min_obs` aligned months are skipped silently
/// (`MIN_REGRESSION_OBSERVATIONS` is the conventional choice); fewer than
/// 6 aligned months across the whole dataset is a client error.
pub fn factor_regression(
    prices: &PricePanel,
    factors: &FactorPanel,
    risk_free: &DatedSeries,
    model: FactorModelKind,
    min_obs: usize,
) -> Result<FactorReport> {
    let factor_idx: Vec<usize> = model
        .factor_names()
        .iter()
        .map(|name| {
            factors
                .factors
                .iter()
                .position(|f| f == name)
                .ok_or_else(|| {
                    RiskError::InvalidParameter(format!("Factor series missing column {}", name))
                })
        })
        .collect::<Result<_>>()?;

    let monthly = prices.month_end().returns();
    if monthly.is_empty() {
        return Err(RiskError::NoData(
            "No monthly returns could be derived from prices".to_string(),
        ));
    }

    // Month-keyed lookups; factor and RF series are monthly already
    let mut factor_rows: HashMap<MonthKey, &Vec<f64>> = HashMap::new();
    for (date, row) in factors.dates.iter().zip(&factors.values) {
        factor_rows.insert(month_key(*date), row);
    }
    let mut rf_rows: HashMap<MonthKey, f64> = HashMap::new();
    for (date, value) in risk_free.dates.iter().zip(&risk_free.values) {
        rf_rows.insert(month_key(*date), *value);
    }

    let aligned_months = monthly
        .dates
        .iter()
        .zip(&monthly.values)
        .filter(|(date, row)| {
            let key = month_key(**date);
            factor_rows.contains_key(&key)
                && rf_rows.contains_key(&key)
                && row.iter().any(|r| r.is_some())
        })
        .count();

    if aligned_months < MIN_ALIGNED_MONTHS {
        return Err(RiskError::InsufficientData(format!(
            "Only {} aligned months between prices, factors, and risk-free rate (need {})",
            aligned_months, MIN_ALIGNED_MONTHS
        )));
    }

    let mut results = BTreeMap::new();
    for (col, asset) in monthly.assets.iter().enumerate() {
        let mut y = Vec::new();
        let mut x_rows = Vec::new();

        for (date, row) in monthly.dates.iter().zip(&monthly.values) {
            let key = month_key(*date);
            let (Some(ret), Some(factor_row), Some(rf)) =
                (row[col], factor_rows.get(&key), rf_rows.get(&key))
            else {
                continue;
            };

            y.push(ret - rf);
            let mut x = Vec::with_capacity(factor_idx.len() + 1);
            x.push(1.0);
            for &idx in &factor_idx {
                x.push(factor_row[idx]);
            }
            x_rows.push(x);
        }

        if y.len() < min_obs.max(MIN_ALIGNED_MONTHS) {
            debug!(asset = %asset, n_obs = y.len(), "Skipping asset with thin sample");
            continue;
        }

        match fit_ols(&y, &x_rows, model) {
            Some(regression) => {
                results.insert(asset.clone(), regression);
            }
            None => {
                debug!(asset = %asset, "Skipping asset with singular design matrix");
            }
        }
    }

    Ok(FactorReport {
        model,
        aligned_months,
        results,
    })
}

fn fit_ols(y: &[f64], x_rows: &[Vec<f64>], model: FactorModelKind) -> Option<FactorRegression> {
    let n = y.len();
    let k = x_rows[0].len();
    if n <= k {
        return None;
    }

    let x = DMatrix::from_fn(n, k, |i, j| x_rows[i][j]);
    let yv = DVector::from_column_slice(y);

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse()?;
    let beta = &xtx_inv * x.transpose() * &yv;

    let residuals = &yv - &x * &beta;
    let ssr = residuals.norm_squared();
    let df = (n - k) as f64;
    let sigma2 = ssr / df;

    let y_mean = yv.mean();
    let sst: f64 = yv.iter().map(|v| (v - y_mean).powi(2)).sum();
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { 0.0 };

    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let stats = |j: usize| -> (f64, f64, f64) {
        let se = (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt();
        let coefficient = beta[j];
        let t_stat = if se > 0.0 { coefficient / se } else { 0.0 };
        let p_value = 2.0 * (1.0 - t_dist.cdf(t_stat.abs()));
        (coefficient, t_stat, p_value)
    };

    let (alpha, alpha_t_stat, alpha_p_value) = stats(0);
    let betas = model
        .factor_names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let (beta, t_stat, p_value) = stats(i + 1);
            FactorBeta {
                factor: name.to_string(),
                beta,
                t_stat,
                p_value,
            }
        })
        .collect();

    let note = (n < FEW_OBSERVATIONS)
        .then(|| "few observations, unstable estimates".to_string());

    Some(FactorRegression {
        alpha,
        alpha_t_stat,
        alpha_p_value,
        betas,
        r_squared,
        n_obs: n,
        note,
    })
}
