//! Stress testing and scenario analysis
//!
//! Applies percentage shocks to each asset's most recent observed return
//! and reports the shocked portfolio return against the unshocked one.
//! Scenarios carry a uniform shock with optional per-asset overrides, can
//! be loaded from YAML, and a predefined historical set is provided.

use crate::error::{Result, RiskError};
use crate::series::{normalize_weights, ReturnPanel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stress test scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScenario {
    /// Scenario name
    pub name: String,

    /// Scenario description
    #[serde(default)]
    pub description: String,

    /// Uniform shock applied to every asset's latest return
    /// (e.g. -0.20 for -20%)
    #[serde(default)]
    pub shock: f64,

    /// Per-asset overrides of the uniform shock
    #[serde(default)]
    pub asset_shocks: HashMap<String, f64>,
}

impl StressScenario {
    /// Effective shock for one asset
    pub fn shock_for(&self, asset: &str) -> f64 {
        self.asset_shocks.get(asset).copied().unwrap_or(self.shock)
    }
}

/// Scenario file layout for YAML loading
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioConfig {
    scenarios: Vec<StressScenario>,
}

/// Shock outcome for a single asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetShock {
    pub asset: String,

    /// Shock applied to this asset
    pub shock: f64,

    /// Latest observed return; `None` when the asset has no observations
    pub original_return: Option<f64>,

    /// Latest return plus shock
    pub shocked_return: Option<f64>,
}

/// Result of a single stress scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: String,

    /// Portfolio return with shocks applied
    pub shocked_portfolio_return: f64,

    /// Portfolio return from the unshocked latest returns
    pub unshocked_portfolio_return: f64,

    /// Shocked minus unshocked portfolio return
    pub impact: f64,

    pub asset_results: Vec<AssetShock>,
}

/// Summary over a scenario set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    pub results: Vec<StressResult>,
    pub worst_scenario: String,
    pub max_loss: f64,
    pub best_scenario: String,
    pub max_gain: f64,
    pub average_impact: f64,
}

/// Stress testing engine holding a scenario set
pub struct StressEngine {
    scenarios: Vec<StressScenario>,
}

impl StressEngine {
    /// Create an engine with the given scenarios
    pub fn new(scenarios: Vec<StressScenario>) -> Self {
        Self { scenarios }
    }

    /// Engine with a predefined historical scenario set
    pub fn with_historical_scenarios() -> Self {
        let make = |name: &str, description: &str, shock: f64| StressScenario {
            name: name.to_string(),
            description: description.to_string(),
            shock,
            asset_shocks: HashMap::new(),
        };

        Self::new(vec![
            make(
                "2008 Financial Crisis",
                "Lehman Brothers collapse and credit crisis",
                -0.38,
            ),
            make("2020 COVID Crash", "Pandemic-induced market crash", -0.34),
            make(
                "2022 Inflation Shock",
                "Rate hikes and inflation concerns",
                -0.19,
            ),
            make("Flash Crash", "Rapid intraday market crash", -0.10),
            make("Mild Correction", "Normal market pullback", -0.05),
        ])
    }

    /// Load scenarios from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RiskError::InvalidParameter(format!("Failed to parse scenarios: {}", e)))?;
        Ok(Self::new(config.scenarios))
    }

    /// Add a scenario
    pub fn add_scenario(&mut self, scenario: StressScenario) {
        self.scenarios.push(scenario);
    }

    /// All configured scenarios
    pub fn scenarios(&self) -> &[StressScenario] {
        &self.scenarios
    }

    /// Apply one scenario to the latest returns of a panel
    ///
    /// Weights are masked-renormalized over assets that have at least one
    /// observation, matching the portfolio weighting policy.
    pub fn run(
        &self,
        panel: &ReturnPanel,
        weights: &[f64],
        scenario: &StressScenario,
    ) -> Result<StressResult> {
        let weights = normalize_weights(weights, panel.assets.len())?;
        let latest = panel.latest_returns();

        let present_weight: f64 = latest
            .iter()
            .zip(&weights)
            .filter(|(r, _)| r.is_some())
            .map(|(_, w)| w)
            .sum();
        if present_weight <= 0.0 {
            return Err(RiskError::NoData(
                "No weighted asset has an observed return".to_string(),
            ));
        }

        let mut shocked_total = 0.0;
        let mut unshocked_total = 0.0;
        let mut asset_results = Vec::with_capacity(panel.assets.len());

        for ((asset, weight), original) in panel.assets.iter().zip(&weights).zip(&latest) {
            let shock = scenario.shock_for(asset);
            let shocked = original.map(|r| r + shock);

            if let (Some(orig), Some(shocked)) = (original, shocked) {
                let w = weight / present_weight;
                unshocked_total += w * orig;
                shocked_total += w * shocked;
            }

            asset_results.push(AssetShock {
                asset: asset.clone(),
                shock,
                original_return: *original,
                shocked_return: shocked,
            });
        }

        Ok(StressResult {
            scenario: scenario.name.clone(),
            shocked_portfolio_return: shocked_total,
            unshocked_portfolio_return: unshocked_total,
            impact: shocked_total - unshocked_total,
            asset_results,
        })
    }

    /// Run every configured scenario
    pub fn run_all(&self, panel: &ReturnPanel, weights: &[f64]) -> Result<Vec<StressResult>> {
        self.scenarios
            .iter()
            .map(|scenario| self.run(panel, weights, scenario))
            .collect()
    }

    /// Summarize a set of scenario results
    pub fn report(&self, results: &[StressResult]) -> Result<StressReport> {
        if results.is_empty() {
            return Err(RiskError::InsufficientData(
                "No stress results to summarize".to_string(),
            ));
        }

        let first = &results[0];
        let mut worst = (first.scenario.clone(), first.impact);
        let mut best = (first.scenario.clone(), first.impact);
        let mut total = 0.0;

        for result in results {
            total += result.impact;
            if result.impact < worst.1 {
                worst = (result.scenario.clone(), result.impact);
            }
            if result.impact > best.1 {
                best = (result.scenario.clone(), result.impact);
            }
        }

        Ok(StressReport {
            results: results.to_vec(),
            worst_scenario: worst.0,
            max_loss: worst.1,
            best_scenario: best.0,
            max_gain: best.1,
            average_impact: total / results.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn test_panel() -> ReturnPanel {
        ReturnPanel {
            dates: vec![
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            ],
            assets: vec!["AAA".to_string(), "BBB".to_string()],
            values: vec![
                vec![Some(0.01), Some(0.02)],
                vec![Some(0.005), Some(-0.01)],
            ],
        }
    }

    #[test]
    fn test_uniform_shock_impact() {
        let engine = StressEngine::new(vec![]);
        let scenario = StressScenario {
            name: "Down 10".to_string(),
            description: String::new(),
            shock: -0.10,
            asset_shocks: HashMap::new(),
        };

        let result = engine.run(&test_panel(), &[0.5, 0.5], &scenario).unwrap();

        assert_relative_eq!(
            result.unshocked_portfolio_return,
            0.5 * 0.005 + 0.5 * (-0.01),
            epsilon = 1e-12
        );
        // Uniform shock on fully-weighted assets shifts the portfolio by
        // exactly the shock
        assert_relative_eq!(result.impact, -0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_asset_override_takes_precedence() {
        let engine = StressEngine::new(vec![]);
        let mut asset_shocks = HashMap::new();
        asset_shocks.insert("AAA".to_string(), -0.30);
        let scenario = StressScenario {
            name: "Tech rout".to_string(),
            description: String::new(),
            shock: -0.05,
            asset_shocks,
        };

        let result = engine.run(&test_panel(), &[0.5, 0.5], &scenario).unwrap();
        assert_relative_eq!(result.impact, 0.5 * -0.30 + 0.5 * -0.05, epsilon = 1e-12);
        assert_relative_eq!(result.asset_results[0].shock, -0.30);
    }

    #[test]
    fn test_missing_asset_renormalizes() {
        let panel = ReturnPanel {
            dates: vec![NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()],
            assets: vec!["AAA".to_string(), "BBB".to_string()],
            values: vec![vec![Some(0.01), None]],
        };
        let engine = StressEngine::new(vec![]);
        let scenario = StressScenario {
            name: "Down 10".to_string(),
            description: String::new(),
            shock: -0.10,
            asset_shocks: HashMap::new(),
        };

        let result = engine.run(&panel, &[0.5, 0.5], &scenario).unwrap();

        // BBB never traded: full weight lands on AAA
        assert_relative_eq!(result.unshocked_portfolio_return, 0.01, epsilon = 1e-12);
        assert_relative_eq!(result.shocked_portfolio_return, -0.09, epsilon = 1e-12);
        assert!(result.asset_results[1].original_return.is_none());
    }

    #[test]
    fn test_yaml_round_trip_and_report() {
        let yaml = r#"
scenarios:
  - name: Selloff
    description: Broad selloff
    shock: -0.15
  - name: Rally
    shock: 0.05
"#;
        let engine = StressEngine::from_yaml(yaml).unwrap();
        assert_eq!(engine.scenarios().len(), 2);

        let results = engine.run_all(&test_panel(), &[0.6, 0.4]).unwrap();
        let report = engine.report(&results).unwrap();

        assert_eq!(report.worst_scenario, "Selloff");
        assert_eq!(report.best_scenario, "Rally");
        assert_relative_eq!(report.max_loss, -0.15, epsilon = 1e-12);
        assert_relative_eq!(report.max_gain, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_historical_set_is_loaded() {
        let engine = StressEngine::with_historical_scenarios();
        assert_eq!(engine.scenarios().len(), 5);
        assert!(engine.scenarios().iter().all(|s| s.shock < 0.0));
    }
}
