//! Market data provider interface
//!
//! The engine consumes price, factor, and risk-free series through the
//! `DataProvider` trait. Implementations may return partial data (missing
//! assets, truncated ranges); the engine is responsible for turning empty
//! results into a clear no-data error. `MemoryProvider` is the in-memory
//! implementation used by tests and demos.

use crate::error::{Result, RiskError};
use crate::factors::{FactorModelKind, FactorPanel};
use crate::series::{DatedSeries, PricePanel};
use chrono::NaiveDate;

/// Source of historical market data
pub trait DataProvider {
    /// Daily prices for the requested assets over `[start, end]`
    ///
    /// May return a subset of the requested assets and dates; must not
    /// fail just because some assets are unknown.
    fn fetch_prices(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel>;

    /// Monthly factor returns covering the requested model
    fn fetch_factor_returns(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        model: FactorModelKind,
    ) -> Result<FactorPanel>;

    /// Monthly risk-free rate series
    fn fetch_risk_free(&self, start: NaiveDate, end: NaiveDate) -> Result<DatedSeries>;
}

/// In-memory data provider backed by preloaded panels
pub struct MemoryProvider {
    prices: PricePanel,
    factors: Option<FactorPanel>,
    risk_free: Option<DatedSeries>,
}

impl MemoryProvider {
    /// Provider serving the given price panel
    pub fn new(prices: PricePanel) -> Self {
        Self {
            prices,
            factors: None,
            risk_free: None,
        }
    }

    /// Attach monthly factor returns
    pub fn with_factors(mut self, factors: FactorPanel) -> Self {
        self.factors = Some(factors);
        self
    }

    /// Attach a monthly risk-free series
    pub fn with_risk_free(mut self, risk_free: DatedSeries) -> Self {
        self.risk_free = Some(risk_free);
        self
    }
}

impl DataProvider for MemoryProvider {
    fn fetch_prices(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel> {
        // Known assets only; unknown tickers are dropped, not an error
        let columns: Vec<usize> = assets
            .iter()
            .filter_map(|asset| self.prices.assets.iter().position(|a| a == asset))
            .collect();

        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (date, row) in self.prices.dates.iter().zip(&self.prices.values) {
            if *date < start || *date > end {
                continue;
            }
            dates.push(*date);
            values.push(columns.iter().map(|col| row[*col]).collect());
        }

        Ok(PricePanel {
            dates,
            assets: columns
                .iter()
                .map(|col| self.prices.assets[*col].clone())
                .collect(),
            values,
        })
    }

    fn fetch_factor_returns(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        _model: FactorModelKind,
    ) -> Result<FactorPanel> {
        let factors = self
            .factors
            .as_ref()
            .ok_or_else(|| RiskError::NoData("No factor series loaded".to_string()))?;

        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (date, row) in factors.dates.iter().zip(&factors.values) {
            if *date >= start && *date <= end {
                dates.push(*date);
                values.push(row.clone());
            }
        }

        Ok(FactorPanel {
            dates,
            factors: factors.factors.clone(),
            values,
        })
    }

    fn fetch_risk_free(&self, start: NaiveDate, end: NaiveDate) -> Result<DatedSeries> {
        let series = self
            .risk_free
            .as_ref()
            .ok_or_else(|| RiskError::NoData("No risk-free series loaded".to_string()))?;

        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (date, value) in series.dates.iter().zip(&series.values) {
            if *date >= start && *date <= end {
                dates.push(*date);
                values.push(*value);
            }
        }

        Ok(DatedSeries { dates, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> MemoryProvider {
        let panel = PricePanel::new(
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            ],
            vec!["AAA".to_string(), "BBB".to_string()],
            vec![
                vec![Some(100.0), Some(50.0)],
                vec![Some(101.0), Some(49.5)],
                vec![Some(102.0), Some(50.5)],
            ],
        )
        .unwrap();
        MemoryProvider::new(panel)
    }

    #[test]
    fn test_unknown_asset_dropped_silently() {
        let panel = provider()
            .fetch_prices(
                &["AAA".to_string(), "ZZZ".to_string()],
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            )
            .unwrap();

        assert_eq!(panel.assets, vec!["AAA".to_string()]);
        assert_eq!(panel.len(), 3);
    }

    #[test]
    fn test_date_range_filter() {
        let panel = provider()
            .fetch_prices(
                &["AAA".to_string()],
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            )
            .unwrap();

        assert_eq!(panel.len(), 1);
        assert_eq!(panel.values[0][0], Some(101.0));
    }

    #[test]
    fn test_missing_factor_series_is_no_data() {
        let err = provider()
            .fetch_factor_returns(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                FactorModelKind::ThreeFactor,
            )
            .unwrap_err();
        assert!(matches!(err, RiskError::NoData(_)));
    }
}
