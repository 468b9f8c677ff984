//! Monte Carlo simulation of portfolio price paths
//!
//! Simulates independent paths under Geometric Brownian Motion: daily
//! shocks drawn i.i.d. Normal(mu, sigma) from the historical estimate and
//! compounded multiplicatively (`wealth *= 1 + shock`). VaR/ES are read
//! from the terminal return distribution with the historical estimators.
//! A seed makes runs reproducible.

use crate::error::{Result, RiskError};
use crate::series::mean;
use crate::var::{historical_es, historical_var, validate_confidence};
use crate::volatility::{sigma_estimate, VolModel, DEFAULT_EWMA_LAMBDA};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Monte Carlo engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of simulated paths
    pub paths: usize,

    /// Days per path
    pub horizon_days: usize,

    /// Volatility model for the (mu, sigma) estimate
    pub vol_model: VolModel,

    /// EWMA decay factor, used when `vol_model` is EWMA
    pub ewma_lambda: f64,

    /// Confidence level for terminal VaR/ES
    pub confidence: f64,

    /// Random seed for reproducible runs (None = entropy)
    pub seed: Option<u64>,

    /// Number of full wealth paths to retain for rendering
    pub keep_paths: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            paths: 20_000,
            horizon_days: 252,
            vol_model: VolModel::Std,
            ewma_lambda: DEFAULT_EWMA_LAMBDA,
            confidence: 0.95,
            seed: None,
            keep_paths: 0,
        }
    }
}

/// Simulation output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Daily drift estimated from the input series
    pub mu: f64,

    /// Daily volatility estimated from the input series
    pub sigma: f64,

    pub paths: usize,
    pub horizon_days: usize,
    pub confidence: f64,

    /// VaR of the terminal return distribution (positive loss)
    pub var: f64,

    /// ES of the terminal return distribution; `None` when no terminal
    /// return falls below the VaR quantile
    pub es: Option<f64>,

    pub mean_terminal_return: f64,

    /// First `keep_paths` wealth trajectories (starting value 1.0)
    pub sample_paths: Vec<Vec<f64>>,
}

/// GBM Monte Carlo engine
pub struct MonteCarloEngine {
    config: MonteCarloConfig,
}

impl MonteCarloEngine {
    /// Create an engine, validating the configuration
    pub fn new(config: MonteCarloConfig) -> Result<Self> {
        if config.paths == 0 {
            return Err(RiskError::InvalidParameter(
                "Number of simulation paths must be positive".to_string(),
            ));
        }
        if config.horizon_days == 0 {
            return Err(RiskError::InvalidParameter(
                "Simulation horizon must be positive".to_string(),
            ));
        }
        validate_confidence(config.confidence)?;
        Ok(Self { config })
    }

    /// Engine configuration
    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Simulate paths calibrated to a historical return series
    pub fn simulate(&self, returns: &[f64]) -> Result<SimulationResult> {
        let cfg = &self.config;
        let mu = mean(returns);
        let sigma = sigma_estimate(returns, cfg.vol_model, cfg.ewma_lambda)?;

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let shocks =
            Normal::new(mu, sigma).map_err(|e| RiskError::CalculationError(e.to_string()))?;

        let mut terminal_returns = Vec::with_capacity(cfg.paths);
        let mut sample_paths = Vec::with_capacity(cfg.keep_paths.min(cfg.paths));

        for path in 0..cfg.paths {
            let keep = path < cfg.keep_paths;
            let mut trajectory = keep.then(|| Vec::with_capacity(cfg.horizon_days));

            let mut wealth: f64 = 1.0;
            for _ in 0..cfg.horizon_days {
                wealth *= 1.0 + shocks.sample(&mut rng);
                if let Some(t) = trajectory.as_mut() {
                    t.push(wealth);
                }
            }

            terminal_returns.push(wealth - 1.0);
            if let Some(t) = trajectory {
                sample_paths.push(t);
            }
        }

        let var = historical_var(&terminal_returns, cfg.confidence)?;
        let es = historical_es(&terminal_returns, cfg.confidence)?;

        Ok(SimulationResult {
            mu,
            sigma,
            paths: cfg.paths,
            horizon_days: cfg.horizon_days,
            confidence: cfg.confidence,
            var: var.value,
            es: es.value,
            mean_terminal_return: mean(&terminal_returns),
            sample_paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand_distr::Normal as RandNormal;

    fn calibration_returns(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = RandNormal::new(0.0005, 0.01).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn engine(seed: u64) -> MonteCarloEngine {
        MonteCarloEngine::new(MonteCarloConfig {
            paths: 2_000,
            horizon_days: 21,
            seed: Some(seed),
            keep_paths: 3,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let returns = calibration_returns(500, 31);
        let a = engine(7).simulate(&returns).unwrap();
        let b = engine(7).simulate(&returns).unwrap();

        assert_eq!(a.var, b.var);
        assert_eq!(a.es, b.es);
        assert_eq!(a.sample_paths, b.sample_paths);
    }

    #[test]
    fn test_different_seeds_differ() {
        let returns = calibration_returns(500, 31);
        let a = engine(7).simulate(&returns).unwrap();
        let b = engine(8).simulate(&returns).unwrap();
        assert_ne!(a.var, b.var);
    }

    #[test]
    fn test_terminal_distribution_tracks_drift() {
        let returns = calibration_returns(500, 32);
        let result = engine(9).simulate(&returns).unwrap();

        // E[terminal] = (1 + mu)^horizon - 1
        let expected = (1.0 + result.mu).powi(result.horizon_days as i32) - 1.0;
        assert_relative_eq!(result.mean_terminal_return, expected, epsilon = 5e-3);
        assert!(result.var > 0.0);
        assert!(result.es.unwrap() >= result.var);
    }

    #[test]
    fn test_sample_paths_retained() {
        let returns = calibration_returns(200, 33);
        let result = engine(10).simulate(&returns).unwrap();

        assert_eq!(result.sample_paths.len(), 3);
        assert!(result.sample_paths.iter().all(|p| p.len() == 21));
    }

    #[test]
    fn test_zero_paths_rejected() {
        let config = MonteCarloConfig {
            paths: 0,
            ..Default::default()
        };
        assert!(MonteCarloEngine::new(config).is_err());
    }
}
