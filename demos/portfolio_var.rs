//! Portfolio VaR walkthrough
//!
//! Demonstrates the engine end-to-end over an in-memory data provider:
//! VaR across methods, attribution, a stress scenario set, and a seeded
//! Monte Carlo run.
//!
//! Run with: cargo run --example portfolio_var

use chrono::NaiveDate;
use portrisk::series::PricePanel;
use portrisk::{
    EngineConfig, MemoryProvider, MonteCarloConfig, RiskEngine, StressEngine, VarMethod,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Portfolio Risk Analytics Example ===\n");

    // 1. Build two years of synthetic daily prices for three assets
    let n_obs = 504;
    let assets = vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()];
    let mut prices = [100.0, 55.0, 210.0];
    let mut values = Vec::with_capacity(n_obs);
    for i in 0..n_obs {
        for (j, p) in prices.iter_mut().enumerate() {
            let drift = 0.0003 * (j + 1) as f64;
            let swing = ((i * (7 + j)) as f64 * 0.11).sin() * 0.012;
            *p *= 1.0 + drift + swing;
        }
        values.push(prices.iter().map(|p| Some(*p)).collect());
    }
    let dates: Vec<NaiveDate> = (0..n_obs)
        .map(|i| NaiveDate::from_ymd_opt(2022, 1, 3).unwrap() + chrono::Duration::days(i as i64))
        .collect();
    let panel = PricePanel::new(dates, assets.clone(), values)?;

    let engine = RiskEngine::new(
        Box::new(MemoryProvider::new(panel)),
        EngineConfig::default(),
    );

    let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    let weights = [0.5, 0.3, 0.2];
    let confidence = 0.99;

    // 2. VaR across methods
    println!("--- 99% one-day VaR ---");
    for method in [VarMethod::Historical, VarMethod::Std, VarMethod::Ewma, VarMethod::Evt] {
        let report = engine.value_at_risk(&assets, start, end, &weights, confidence, method)?;
        println!("  {:<12} {:.4}%", method.as_str(), report.value() * 100.0);
    }
    println!();

    // 3. Volatility attribution
    println!("--- Risk attribution ---");
    let attribution = engine.risk_attribution(&assets, start, end, &weights)?;
    println!(
        "  Portfolio vol: {:.4}% daily ({:.2}% annualized, shrinkage {:.3})",
        attribution.portfolio_volatility * 100.0,
        attribution.annualized_volatility * 100.0,
        attribution.shrinkage
    );
    for contribution in &attribution.contributions {
        println!(
            "  {:<4} weight {:.2}  contribution {:.4}%",
            contribution.asset,
            contribution.weight,
            contribution.contribution * 100.0
        );
    }
    println!();

    // 4. Historical stress scenarios
    println!("--- Stress scenarios ---");
    let report = engine.stress_scenarios(
        &assets,
        start,
        end,
        &weights,
        &StressEngine::with_historical_scenarios(),
    )?;
    for result in &report.results {
        println!("  {:<24} impact {:+.2}%", result.scenario, result.impact * 100.0);
    }
    println!(
        "  Worst: {} ({:+.2}%)\n",
        report.worst_scenario,
        report.max_loss * 100.0
    );

    // 5. Seeded Monte Carlo over a 21-day horizon
    println!("--- Monte Carlo (21 days, 20k paths) ---");
    let simulation = engine.monte_carlo(
        &assets,
        start,
        end,
        &weights,
        MonteCarloConfig {
            horizon_days: 21,
            seed: Some(42),
            ..Default::default()
        },
    )?;
    println!(
        "  mu {:.5}  sigma {:.5}  terminal mean {:+.2}%",
        simulation.mu,
        simulation.sigma,
        simulation.mean_terminal_return * 100.0
    );
    println!(
        "  95% terminal VaR {:.2}%  ES {:.2}%",
        simulation.var * 100.0,
        simulation.es.map(|es| es * 100.0).unwrap_or(f64::NAN)
    );

    Ok(())
}
