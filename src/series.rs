//! Time-series building blocks shared by every analytic
//!
//! Provides the panel types produced by data providers, price-to-return
//! conversion, portfolio weighting with masked renormalization, date
//! alignment, month-end resampling, and annualization helpers.

use crate::error::{Result, RiskError};
use chrono::{Datelike, NaiveDate};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Trading days per year used for annualization defaults
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Price observations for a set of assets over a common date index
///
/// Dates are strictly increasing; gaps (an asset without a price on a
/// given date) are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePanel {
    /// Observation dates, strictly increasing
    pub dates: Vec<NaiveDate>,

    /// Asset identifiers, one per column
    pub assets: Vec<String>,

    /// Row-major values: `values[row][col]` is asset `col` on date `row`
    pub values: Vec<Vec<Option<f64>>>,
}

impl PricePanel {
    /// Build a panel, validating shape and date ordering
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if values.len() != dates.len() {
            return Err(RiskError::InvalidParameter(format!(
                "Panel has {} rows but {} dates",
                values.len(),
                dates.len()
            )));
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != assets.len() {
                return Err(RiskError::InvalidParameter(format!(
                    "Row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    assets.len()
                )));
            }
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RiskError::InvalidParameter(
                "Panel dates must be strictly increasing".to_string(),
            ));
        }
        for (row, date) in values.iter().zip(&dates) {
            for (col, value) in row.iter().enumerate() {
                if let Some(p) = value {
                    if !p.is_finite() || *p <= 0.0 {
                        return Err(RiskError::InvalidParameter(format!(
                            "Non-positive price {} for {} on {}",
                            p, assets[col], date
                        )));
                    }
                }
            }
        }
        Ok(Self {
            dates,
            assets,
            values,
        })
    }

    /// Number of date rows
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True when the panel has no rows
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Simple percentage-change returns: `r[t] = p[t]/p[t-1] - 1`
    ///
    /// The first row is dropped (no prior price). A return is present only
    /// when both the current and the previous price are present.
    pub fn returns(&self) -> ReturnPanel {
        let n_assets = self.assets.len();
        let mut dates = Vec::new();
        let mut values = Vec::new();

        for t in 1..self.dates.len() {
            let mut row = Vec::with_capacity(n_assets);
            for col in 0..n_assets {
                let r = match (self.values[t - 1][col], self.values[t][col]) {
                    (Some(prev), Some(cur)) => Some(cur / prev - 1.0),
                    _ => None,
                };
                row.push(r);
            }
            dates.push(self.dates[t]);
            values.push(row);
        }

        ReturnPanel {
            dates,
            assets: self.assets.clone(),
            values,
        }
    }

    /// Resample to month-end: the last observed price per calendar month
    ///
    /// Each output row is stamped with the last panel date of that month;
    /// a column is `None` when the asset had no price at all that month.
    pub fn month_end(&self) -> PricePanel {
        let n_assets = self.assets.len();
        let mut dates: Vec<NaiveDate> = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = Vec::new();

        for (row, date) in self.values.iter().zip(&self.dates) {
            let same_month = dates
                .last()
                .map(|d: &NaiveDate| d.year() == date.year() && d.month() == date.month())
                .unwrap_or(false);

            if same_month {
                *dates.last_mut().unwrap() = *date;
                let last = values.last_mut().unwrap();
                for col in 0..n_assets {
                    if row[col].is_some() {
                        last[col] = row[col];
                    }
                }
            } else {
                dates.push(*date);
                values.push(row.clone());
            }
        }

        PricePanel {
            dates,
            assets: self.assets.clone(),
            values,
        }
    }
}

/// Return observations for a set of assets over a common date index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnPanel {
    pub dates: Vec<NaiveDate>,
    pub assets: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl ReturnPanel {
    /// Number of date rows
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True when the panel has no rows
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Dense return series for one asset, keeping only present observations
    pub fn column(&self, asset_index: usize) -> DatedSeries {
        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (row, date) in self.values.iter().zip(&self.dates) {
            if let Some(r) = row[asset_index] {
                dates.push(*date);
                values.push(r);
            }
        }
        DatedSeries { dates, values }
    }

    /// Most recent observed return per asset
    ///
    /// `None` for an asset with no observations at all.
    pub fn latest_returns(&self) -> Vec<Option<f64>> {
        let n_assets = self.assets.len();
        let mut latest = vec![None; n_assets];
        for row in self.values.iter().rev() {
            for col in 0..n_assets {
                if latest[col].is_none() {
                    latest[col] = row[col];
                }
            }
            if latest.iter().all(|v| v.is_some()) {
                break;
            }
        }
        latest
    }

    /// Weighted portfolio return series with masked renormalization
    ///
    /// On each date, weights are renormalized over the assets that have a
    /// return that day; dates where no asset is present are dropped.
    /// Weights must already be validated/normalized.
    pub fn portfolio_returns(&self, weights: &[f64]) -> Result<DatedSeries> {
        if weights.len() != self.assets.len() {
            return Err(RiskError::InvalidWeights(format!(
                "{} weights for {} assets",
                weights.len(),
                self.assets.len()
            )));
        }

        let mut dates = Vec::new();
        let mut values = Vec::new();

        for (row, date) in self.values.iter().zip(&self.dates) {
            let present_weight: f64 = row
                .iter()
                .zip(weights)
                .filter(|(r, _)| r.is_some())
                .map(|(_, w)| w)
                .sum();

            if present_weight <= 0.0 {
                continue;
            }

            let ret: f64 = row
                .iter()
                .zip(weights)
                .filter_map(|(r, w)| r.map(|r| r * w / present_weight))
                .sum();

            dates.push(*date);
            values.push(ret);
        }

        if values.is_empty() {
            return Err(RiskError::NoData(
                "No dates with at least one asset return".to_string(),
            ));
        }

        Ok(DatedSeries { dates, values })
    }

    /// Observations-by-assets matrix over rows where every asset is present
    ///
    /// Covariance estimation needs complete rows; incomplete rows are
    /// dropped and the number of kept rows is returned alongside.
    pub fn complete_rows(&self) -> (DMatrix<f64>, usize) {
        let n_assets = self.assets.len();
        let rows: Vec<&Vec<Option<f64>>> = self
            .values
            .iter()
            .filter(|row| row.iter().all(|v| v.is_some()))
            .collect();

        let n_obs = rows.len();
        let mut m = DMatrix::zeros(n_obs, n_assets);
        for (i, row) in rows.iter().enumerate() {
            for col in 0..n_assets {
                m[(i, col)] = row[col].unwrap();
            }
        }
        (m, n_obs)
    }
}

/// Dense dated series (portfolio returns, risk-free rate, factor column)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatedSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl DatedSeries {
    /// Number of observations
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the series has no observations
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Inner join on dates, returning paired values in date order
    ///
    /// Both series must be date-sorted, which panel construction enforces.
    pub fn align(&self, other: &DatedSeries) -> (Vec<f64>, Vec<f64>) {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.dates.len() && j < other.dates.len() {
            match self.dates[i].cmp(&other.dates[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    a.push(self.values[i]);
                    b.push(other.values[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        (a, b)
    }
}

/// Validate portfolio weights and normalize them to sum to 1
///
/// Rejects length mismatches, negative entries, and non-positive sums.
pub fn normalize_weights(weights: &[f64], n_assets: usize) -> Result<Vec<f64>> {
    if weights.len() != n_assets {
        return Err(RiskError::InvalidWeights(format!(
            "{} weights for {} assets",
            weights.len(),
            n_assets
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(RiskError::InvalidWeights(
            "Weights must be finite and non-negative".to_string(),
        ));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(RiskError::InvalidWeights(
            "Weights must sum to a positive number".to_string(),
        ));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

/// Simple returns from a dense price series
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Annualize a per-period mean return
pub fn annualized_mean(mean: f64, periods_per_year: f64) -> f64 {
    mean * periods_per_year
}

/// Annualize a per-period volatility
pub fn annualized_volatility(sigma: f64, periods_per_year: f64) -> f64 {
    sigma * periods_per_year.sqrt()
}

/// Annualize a per-period covariance matrix
pub fn annualized_covariance(cov: &DMatrix<f64>, periods_per_year: f64) -> DMatrix<f64> {
    cov * periods_per_year
}

/// Mean of a slice; 0 for empty input
pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (ddof = 1); 0 when fewer than two observations
pub(crate) fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Sample standard deviation (ddof = 1)
pub(crate) fn sample_std(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

/// Linearly interpolated empirical quantile, `p` in [0, 1]
pub(crate) fn empirical_quantile(data: &[f64], p: f64) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let w = rank - lo as f64;
        sorted[lo] + w * (sorted[hi] - sorted[lo])
    }
}
