//! # portrisk: Portfolio Risk & Factor Analytics Engine
//!
//! This library turns asset price histories into portfolio risk and
//! attribution statistics. It is the computational core behind a risk API:
//! a service layer validates requests, calls into [`RiskEngine`], and
//! forwards the serde-serializable results as JSON.
//!
//! ## Core Components
//!
//! - **RiskEngine**: orchestrator dispatching (assets, dates, weights,
//!   confidence, method) requests
//! - **VaR/ES estimators**: historical, parametric (std/EWMA/GARCH), and
//!   EVT (Generalized Pareto) methods, plus drawdown
//! - **Covariance & attribution**: Ledoit-Wolf shrinkage, volatility
//!   contributions, incremental/marginal/relative VaR
//! - **Stress testing**: shock scenarios, YAML-loadable scenario sets
//! - **Backtesting**: rolling VaR backtests with Kupiec/Christoffersen
//!   tests and Basel traffic-light zones
//! - **Factor models**: Fama-French 3/5-factor regressions
//! - **Monte Carlo**: GBM path simulation with pluggable volatility
//!
//! GARCH volatility is optional: build with the `garch` feature to enable
//! it, and check [`garch_available`] at startup.
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use portrisk::series::PricePanel;
//! use portrisk::{EngineConfig, MemoryProvider, RiskEngine, VarMethod};
//!
//! // Sixty days of prices for two assets
//! let dates: Vec<NaiveDate> = (0..60)
//!     .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i))
//!     .collect();
//! let values = (0..60)
//!     .map(|i| vec![Some(100.0 + (i % 7) as f64), Some(50.0 + (i % 5) as f64)])
//!     .collect();
//! let panel = PricePanel::new(
//!     dates,
//!     vec!["AAA".to_string(), "BBB".to_string()],
//!     values,
//! ).unwrap();
//!
//! let engine = RiskEngine::new(
//!     Box::new(MemoryProvider::new(panel)),
//!     EngineConfig::default(),
//! );
//!
//! let report = engine.value_at_risk(
//!     &["AAA".to_string(), "BBB".to_string()],
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//!     &[0.6, 0.4],
//!     0.95,
//!     VarMethod::Historical,
//! ).unwrap();
//!
//! assert!(report.value() > 0.0);
//! ```

pub mod backtest;
pub mod covariance;
pub mod engine;
pub mod error;
pub mod factors;
pub mod provider;
pub mod series;
pub mod simulation;
pub mod stress;
pub mod technical;
pub mod var;
pub mod volatility;

pub use backtest::{BaselZone, VarBacktest};
pub use covariance::{RelativeVar, ShrunkCovariance};
pub use engine::{EngineConfig, EsReport, RiskEngine, VarReport};
pub use error::{Result, RiskError};
pub use factors::{FactorModelKind, FactorReport};
pub use provider::{DataProvider, MemoryProvider};
pub use simulation::{MonteCarloConfig, MonteCarloEngine, SimulationResult};
pub use stress::{StressEngine, StressScenario};
pub use var::{DrawdownReport, VarMethod};
pub use volatility::{garch_available, VolModel};
