//! Risk engine orchestrator
//!
//! Turns validated (assets, date range, weights, confidence, method)
//! requests into portfolio return series and dispatches to the metric
//! implementations. Holds the immutable engine configuration and the data
//! provider; every result is a serde-serializable struct the service layer
//! can forward as JSON.

use crate::backtest::{backtest_var, VarBacktest, DEFAULT_BACKTEST_WINDOW};
use crate::covariance::{
    self, IncrementalVar, MarginalVar, RelativeVar, ShrunkCovariance,
};
use crate::error::{Result, RiskError};
use crate::factors::{self, FactorModelKind, FactorReport, MIN_REGRESSION_OBSERVATIONS};
use crate::provider::DataProvider;
use crate::series::{normalize_weights, DatedSeries, ReturnPanel, TRADING_DAYS_PER_YEAR};
use crate::simulation::{MonteCarloConfig, MonteCarloEngine, SimulationResult};
use crate::stress::{StressEngine, StressReport, StressResult, StressScenario};
use crate::var::{
    self, drawdown, DrawdownReport, EvtEs, EvtVar, HistoricalEs, HistoricalVar, ParametricEs,
    ParametricVar, VarMethod, DEFAULT_EVT_THRESHOLD_QUANTILE,
};
use crate::volatility::DEFAULT_EWMA_LAMBDA;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Engine-wide configuration, built once at startup and immutable after
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Day count used for annualization
    pub trading_days_per_year: f64,

    /// EWMA decay factor for the ewma volatility model
    pub ewma_lambda: f64,

    /// Cap on the rolling backtest window
    pub backtest_window: usize,

    /// Weight perturbation for incremental VaR
    pub ivar_delta: f64,

    /// Loss quantile the EVT tail is fitted over
    pub evt_threshold_quantile: f64,

    /// Minimum aligned months per asset in factor regressions
    pub factor_min_obs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
            ewma_lambda: DEFAULT_EWMA_LAMBDA,
            backtest_window: DEFAULT_BACKTEST_WINDOW,
            ivar_delta: 0.01,
            evt_threshold_quantile: DEFAULT_EVT_THRESHOLD_QUANTILE,
            factor_min_obs: MIN_REGRESSION_OBSERVATIONS,
        }
    }
}

/// VaR result across methods
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum VarReport {
    Historical(HistoricalVar),
    Parametric(ParametricVar),
    Evt(EvtVar),
}

impl VarReport {
    /// VaR as a positive loss magnitude
    pub fn value(&self) -> f64 {
        match self {
            VarReport::Historical(r) => r.value,
            VarReport::Parametric(r) => r.value,
            VarReport::Evt(r) => r.value,
        }
    }
}

/// ES result across methods
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EsReport {
    Historical(HistoricalEs),
    Parametric(ParametricEs),
    Evt(EvtEs),
}

impl EsReport {
    /// ES as a positive loss magnitude; `None` for a degenerate empty tail
    pub fn value(&self) -> Option<f64> {
        match self {
            EsReport::Historical(r) => r.value,
            EsReport::Parametric(r) => Some(r.value),
            EsReport::Evt(r) => r.value,
        }
    }
}

/// Per-asset slice of the volatility attribution
#[derive(Debug, Clone, Serialize)]
pub struct AssetContribution {
    pub asset: String,
    pub weight: f64,

    /// Contribution to daily portfolio volatility
    pub contribution: f64,
}

/// Covariance-based attribution report
#[derive(Debug, Clone, Serialize)]
pub struct AttributionReport {
    pub portfolio_volatility: f64,
    pub annualized_volatility: f64,
    pub contributions: Vec<AssetContribution>,

    /// Shrinkage intensity of the underlying covariance estimate
    pub shrinkage: f64,

    pub n_obs: usize,
}

/// Incremental VaR keyed by asset
#[derive(Debug, Clone, Serialize)]
pub struct IvarReport {
    pub base_var: f64,
    pub method: VarMethod,
    pub delta: f64,
    pub deltas: BTreeMap<String, f64>,
}

/// Marginal VaR keyed by asset
#[derive(Debug, Clone, Serialize)]
pub struct MvarReport {
    pub base_var: f64,
    pub method: VarMethod,

    /// `None` marks an asset whose removal leaves no portfolio
    pub deltas: BTreeMap<String, Option<f64>>,
}

/// Portfolio risk and factor analytics engine
pub struct RiskEngine {
    provider: Box<dyn DataProvider>,
    config: EngineConfig,
}

impl RiskEngine {
    /// Create an engine over a data provider
    pub fn new(provider: Box<dyn DataProvider>, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Weighted portfolio return series over the requested range
    pub fn portfolio_returns(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
    ) -> Result<DatedSeries> {
        let (panel, weights) = self.load_portfolio(assets, start, end, weights)?;
        panel.portfolio_returns(&weights)
    }

    /// Portfolio VaR by the requested method
    pub fn value_at_risk(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        confidence: f64,
        method: VarMethod,
    ) -> Result<VarReport> {
        let series = self.portfolio_returns(assets, start, end, weights)?;
        let returns = &series.values;
        let cfg = &self.config;

        Ok(match method {
            VarMethod::Historical => {
                VarReport::Historical(var::historical_var(returns, confidence)?)
            }
            VarMethod::Std | VarMethod::Ewma | VarMethod::Garch => VarReport::Parametric(
                var::parametric_var(
                    returns,
                    confidence,
                    method.vol_model().unwrap(),
                    cfg.ewma_lambda,
                )?,
            ),
            VarMethod::Evt => VarReport::Evt(var::evt_var(
                returns,
                confidence,
                cfg.evt_threshold_quantile,
            )?),
        })
    }

    /// Portfolio Expected Shortfall by the requested method
    pub fn expected_shortfall(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        confidence: f64,
        method: VarMethod,
    ) -> Result<EsReport> {
        let series = self.portfolio_returns(assets, start, end, weights)?;
        let returns = &series.values;
        let cfg = &self.config;

        Ok(match method {
            VarMethod::Historical => EsReport::Historical(var::historical_es(returns, confidence)?),
            VarMethod::Std | VarMethod::Ewma | VarMethod::Garch => EsReport::Parametric(
                var::parametric_es(
                    returns,
                    confidence,
                    method.vol_model().unwrap(),
                    cfg.ewma_lambda,
                )?,
            ),
            VarMethod::Evt => EsReport::Evt(var::evt_es(
                returns,
                confidence,
                cfg.evt_threshold_quantile,
            )?),
        })
    }

    /// Maximum drawdown of the portfolio wealth path
    pub fn drawdown(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
    ) -> Result<DrawdownReport> {
        let series = self.portfolio_returns(assets, start, end, weights)?;
        drawdown(&series.dates, &series.values)
    }

    /// Shrunk covariance over the requested assets
    pub fn covariance(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ShrunkCovariance> {
        let panel = self.load_panel(assets, start, end)?;
        covariance::shrunk_covariance(&panel)
    }

    /// Volatility attribution across assets
    pub fn risk_attribution(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
    ) -> Result<AttributionReport> {
        let (panel, weights) = self.load_portfolio(assets, start, end, weights)?;
        let cov = covariance::shrunk_covariance(&panel)?;
        let attribution = covariance::risk_contributions(&weights, &cov.matrix)?;

        let contributions = panel
            .assets
            .iter()
            .zip(&weights)
            .zip(&attribution.contributions)
            .map(|((asset, weight), contribution)| AssetContribution {
                asset: asset.clone(),
                weight: *weight,
                contribution: *contribution,
            })
            .collect();

        Ok(AttributionReport {
            portfolio_volatility: attribution.portfolio_volatility,
            annualized_volatility: attribution.portfolio_volatility
                * self.config.trading_days_per_year.sqrt(),
            contributions,
            shrinkage: cov.shrinkage,
            n_obs: cov.n_obs,
        })
    }

    /// Incremental VaR per asset
    pub fn incremental_var(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        confidence: f64,
        method: VarMethod,
    ) -> Result<IvarReport> {
        let (panel, weights) = self.load_portfolio(assets, start, end, weights)?;
        let report: IncrementalVar = covariance::incremental_var(
            &panel,
            &weights,
            confidence,
            method,
            self.config.ewma_lambda,
            self.config.ivar_delta,
        )?;

        Ok(IvarReport {
            base_var: report.base_var,
            method,
            delta: report.delta,
            deltas: panel
                .assets
                .iter()
                .cloned()
                .zip(report.deltas)
                .collect(),
        })
    }

    /// Marginal VaR per asset
    pub fn marginal_var(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        confidence: f64,
        method: VarMethod,
    ) -> Result<MvarReport> {
        let (panel, weights) = self.load_portfolio(assets, start, end, weights)?;
        let report: MarginalVar = covariance::marginal_var(
            &panel,
            &weights,
            confidence,
            method,
            self.config.ewma_lambda,
        )?;

        Ok(MvarReport {
            base_var: report.base_var,
            method,
            deltas: panel
                .assets
                .iter()
                .cloned()
                .zip(report.deltas)
                .collect(),
        })
    }

    /// VaR of the portfolio relative to a benchmark asset
    pub fn relative_var(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        benchmark: &str,
        confidence: f64,
        method: VarMethod,
    ) -> Result<RelativeVar> {
        let portfolio = self.portfolio_returns(assets, start, end, weights)?;

        let benchmark_panel = self.load_panel(&[benchmark.to_string()], start, end)?;
        let benchmark_series = benchmark_panel.column(0);
        if benchmark_series.is_empty() {
            return Err(RiskError::NoData(format!(
                "No benchmark returns for {}",
                benchmark
            )));
        }

        covariance::relative_var(
            &portfolio,
            &benchmark_series,
            confidence,
            method,
            self.config.ewma_lambda,
        )
    }

    /// Uniform stress shock on the latest returns
    pub fn stress_test(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        shock: f64,
    ) -> Result<StressResult> {
        let (panel, weights) = self.load_portfolio(assets, start, end, weights)?;
        let scenario = StressScenario {
            name: "Uniform shock".to_string(),
            description: format!("{:+.1}% shock to every asset", shock * 100.0),
            shock,
            asset_shocks: HashMap::new(),
        };
        StressEngine::new(vec![]).run(&panel, &weights, &scenario)
    }

    /// Run a scenario set and summarize it
    pub fn stress_scenarios(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        stress: &StressEngine,
    ) -> Result<StressReport> {
        let (panel, weights) = self.load_portfolio(assets, start, end, weights)?;
        let results = stress.run_all(&panel, &weights)?;
        stress.report(&results)
    }

    /// Rolling VaR backtest of the portfolio series
    pub fn backtest(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        confidence: f64,
        method: VarMethod,
    ) -> Result<VarBacktest> {
        let series = self.portfolio_returns(assets, start, end, weights)?;
        backtest_var(
            &series.values,
            confidence,
            method,
            self.config.ewma_lambda,
            self.config.backtest_window,
        )
    }

    /// Fama-French factor regressions per asset
    pub fn factor_regression(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        model: FactorModelKind,
    ) -> Result<FactorReport> {
        self.validate_request(assets, start, end)?;

        let prices = self.provider.fetch_prices(assets, start, end)?;
        if prices.is_empty() || prices.assets.is_empty() {
            return Err(RiskError::NoData(
                "Provider returned no prices for the requested assets".to_string(),
            ));
        }

        let factor_panel = self.provider.fetch_factor_returns(start, end, model)?;
        if factor_panel.dates.is_empty() {
            return Err(RiskError::NoData(
                "Provider returned no factor observations".to_string(),
            ));
        }
        let risk_free = self.provider.fetch_risk_free(start, end)?;

        factors::factor_regression(
            &prices,
            &factor_panel,
            &risk_free,
            model,
            self.config.factor_min_obs,
        )
    }

    /// Monte Carlo simulation calibrated to the portfolio series
    pub fn monte_carlo(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
        mc_config: MonteCarloConfig,
    ) -> Result<SimulationResult> {
        let series = self.portfolio_returns(assets, start, end, weights)?;
        MonteCarloEngine::new(mc_config)?.simulate(&series.values)
    }

    fn validate_request(&self, assets: &[String], start: NaiveDate, end: NaiveDate) -> Result<()> {
        if assets.is_empty() {
            return Err(RiskError::InvalidParameter(
                "Asset list is empty".to_string(),
            ));
        }
        if start >= end {
            return Err(RiskError::InvalidParameter(format!(
                "Start date {} is not before end date {}",
                start, end
            )));
        }
        Ok(())
    }

    /// Fetch prices and convert to a return panel, tolerating partial data
    fn load_panel(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ReturnPanel> {
        self.validate_request(assets, start, end)?;

        let prices = self.provider.fetch_prices(assets, start, end)?;
        if prices.assets.is_empty() || prices.len() < 2 {
            return Err(RiskError::NoData(format!(
                "Provider returned {} assets over {} dates",
                prices.assets.len(),
                prices.len()
            )));
        }

        for requested in assets {
            if !prices.assets.contains(requested) {
                warn!(asset = %requested, "Asset missing from provider data, dropping");
            }
        }

        Ok(prices.returns())
    }

    /// Load a return panel and remap the requested weights onto the assets
    /// the provider actually returned
    fn load_portfolio(
        &self,
        assets: &[String],
        start: NaiveDate,
        end: NaiveDate,
        weights: &[f64],
    ) -> Result<(ReturnPanel, Vec<f64>)> {
        // Validate the request before fetching anything
        self.validate_request(assets, start, end)?;
        let requested = normalize_weights(weights, assets.len())?;
        let panel = self.load_panel(assets, start, end)?;

        let mut surviving = Vec::with_capacity(panel.assets.len());
        for asset in &panel.assets {
            let idx = assets.iter().position(|a| a == asset).ok_or_else(|| {
                RiskError::CalculationError(format!(
                    "Provider returned unrequested asset {}",
                    asset
                ))
            })?;
            surviving.push(requested[idx]);
        }

        if surviving.iter().sum::<f64>() <= 0.0 {
            return Err(RiskError::NoData(
                "Every weighted asset is missing from provider data".to_string(),
            ));
        }

        let weights = normalize_weights(&surviving, surviving.len())?;
        Ok((panel, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use crate::series::PricePanel;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn date(days: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(days)
    }

    fn engine_with_universe(n_obs: usize, seed: u64) -> RiskEngine {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0004, 0.013).unwrap();
        let assets = vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()];

        let mut values = Vec::with_capacity(n_obs);
        let mut prices = [100.0, 50.0, 200.0];
        for _ in 0..n_obs {
            for p in prices.iter_mut() {
                *p *= 1.0 + normal.sample(&mut rng);
            }
            values.push(prices.iter().map(|p| Some(*p)).collect());
        }

        let panel = PricePanel::new((0..n_obs).map(|i| date(i as i64)).collect(), assets, values)
            .unwrap();
        RiskEngine::new(
            Box::new(MemoryProvider::new(panel)),
            EngineConfig::default(),
        )
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_value_at_risk_methods_agree_on_sign() {
        let engine = engine_with_universe(300, 41);
        let assets = tickers(&["AAA", "BBB", "CCC"]);

        for method in [VarMethod::Historical, VarMethod::Std, VarMethod::Ewma] {
            let report = engine
                .value_at_risk(
                    &assets,
                    date(0),
                    date(400),
                    &[0.4, 0.3, 0.3],
                    0.99,
                    method,
                )
                .unwrap();
            assert!(report.value() > 0.0, "method {:?}", method);
        }
    }

    #[test]
    fn test_missing_asset_dropped_and_weights_renormalized() {
        let engine = engine_with_universe(120, 42);
        let assets = tickers(&["AAA", "BBB", "ZZZ"]);

        let series = engine
            .portfolio_returns(&assets, date(0), date(200), &[0.4, 0.4, 0.2])
            .unwrap();
        let direct = engine
            .portfolio_returns(&tickers(&["AAA", "BBB"]), date(0), date(200), &[0.5, 0.5])
            .unwrap();

        assert_eq!(series.values, direct.values);
    }

    #[test]
    fn test_all_weighted_assets_missing_is_no_data() {
        let engine = engine_with_universe(120, 43);
        let err = engine
            .portfolio_returns(&tickers(&["YYY", "ZZZ"]), date(0), date(200), &[0.5, 0.5])
            .unwrap_err();
        assert!(matches!(err, RiskError::NoData(_)));
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let engine = engine_with_universe(120, 44);
        let assets = tickers(&["AAA"]);

        assert!(matches!(
            engine.portfolio_returns(&[], date(0), date(200), &[]),
            Err(RiskError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.portfolio_returns(&assets, date(200), date(0), &[1.0]),
            Err(RiskError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.portfolio_returns(&assets, date(0), date(200), &[-1.0]),
            Err(RiskError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_attribution_invariant_through_engine() {
        let engine = engine_with_universe(250, 45);
        let report = engine
            .risk_attribution(
                &tickers(&["AAA", "BBB", "CCC"]),
                date(0),
                date(400),
                &[0.5, 0.25, 0.25],
            )
            .unwrap();

        let total: f64 = report.contributions.iter().map(|c| c.contribution).sum();
        assert_relative_eq!(total, report.portfolio_volatility, epsilon = 1e-6);
        assert_relative_eq!(
            report.annualized_volatility,
            report.portfolio_volatility * TRADING_DAYS_PER_YEAR.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_expected_shortfall_and_attribution_surfaces() {
        let engine = engine_with_universe(300, 50);
        let assets = tickers(&["AAA", "BBB", "CCC"]);
        let weights = [0.4, 0.3, 0.3];

        let var = engine
            .value_at_risk(&assets, date(0), date(400), &weights, 0.95, VarMethod::Historical)
            .unwrap();
        let es = engine
            .expected_shortfall(&assets, date(0), date(400), &weights, 0.95, VarMethod::Historical)
            .unwrap();
        // Tail mean sits beyond the quantile
        assert!(es.value().unwrap() > var.value());

        let cov = engine.covariance(&assets, date(0), date(400)).unwrap();
        assert_eq!(cov.assets.len(), 3);
        assert_eq!(cov.matrix.nrows(), 3);

        let ivar = engine
            .incremental_var(&assets, date(0), date(400), &weights, 0.95, VarMethod::Historical)
            .unwrap();
        assert_eq!(ivar.deltas.len(), 3);
        assert!(ivar.base_var > 0.0);
        assert!(ivar.deltas.contains_key("AAA"));

        let mvar = engine
            .marginal_var(&assets, date(0), date(400), &weights, 0.95, VarMethod::Historical)
            .unwrap();
        assert!(mvar.deltas.values().all(|d| d.is_some()));
    }

    #[test]
    fn test_relative_var_against_own_asset() {
        let engine = engine_with_universe(200, 46);
        let report = engine
            .relative_var(
                &tickers(&["AAA", "BBB"]),
                date(0),
                date(300),
                &[0.5, 0.5],
                "CCC",
                0.95,
                VarMethod::Historical,
            )
            .unwrap();

        assert!(report.value.is_finite());
        assert!(report.n_obs > 100);
    }

    #[test]
    fn test_stress_uniform_shock() {
        let engine = engine_with_universe(50, 47);
        let result = engine
            .stress_test(
                &tickers(&["AAA", "BBB", "CCC"]),
                date(0),
                date(100),
                &[0.4, 0.3, 0.3],
                -0.10,
            )
            .unwrap();

        assert_relative_eq!(result.impact, -0.10, epsilon = 1e-12);
        assert_eq!(result.asset_results.len(), 3);
    }

    #[test]
    fn test_backtest_through_engine() {
        let engine = engine_with_universe(400, 48);
        let result = engine
            .backtest(
                &tickers(&["AAA", "BBB", "CCC"]),
                date(0),
                date(600),
                &[0.4, 0.3, 0.3],
                0.99,
                VarMethod::Historical,
            )
            .unwrap();

        assert_eq!(result.window, 250);
        assert!(result.n_obs > 0);
    }

    #[test]
    fn test_monte_carlo_through_engine() {
        let engine = engine_with_universe(250, 49);
        let result = engine
            .monte_carlo(
                &tickers(&["AAA", "BBB", "CCC"]),
                date(0),
                date(400),
                &[0.4, 0.3, 0.3],
                MonteCarloConfig {
                    paths: 1_000,
                    horizon_days: 21,
                    seed: Some(5),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(result.var > 0.0);
        assert_eq!(result.paths, 1_000);
    }
}
