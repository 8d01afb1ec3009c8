//! Daily reconciliation example
//!
//! ```text
//! cargo run --example daily_reconciliation -- 2024-05-15 stripe paypal square
//! ```
//!
//! Set `RECON_PROCESSOR_API_URL` and `RECON_INTERNAL_API_URL` to pull live
//! data; otherwise built-in sample data is used. `RUST_LOG` controls logging.

use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, Utc};
use reconciliation_core::utils::MemorySource;
use reconciliation_core::{
    format_money, HttpTransactionSource, ReconciliationConfig, ReconciliationSystem,
    RunStatus, TransactionBuilder, TransactionSource,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn sample_source() -> Result<MemorySource, Box<dyn std::error::Error>> {
    let at = Utc::now() - Duration::hours(2);
    let mut source = MemorySource::new();

    for (processor, amounts, missing) in [
        ("stripe", vec!["120.00", "89.99", "1500.00", "42.50"], vec![2]),
        ("paypal", vec!["19.99", "250.00", "75.25"], vec![]),
        ("square", vec!["9.99", "310.40"], vec![0, 1]),
    ] {
        let mut processor_side = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            let id = format!("TXN_{}_{:04}", processor.to_uppercase(), i + 1);
            processor_side.push(
                TransactionBuilder::new(id, processor, BigDecimal::from_str(amount)?, at)
                    .merchant_id("MERCH_001")
                    .reference_number(format!("REF_{}_{}", processor.to_uppercase(), i + 1))
                    .fee(BigDecimal::from_str("0.30")?)
                    .build(),
            );
        }
        let internal_side = processor_side
            .iter()
            .enumerate()
            .filter(|(i, _)| !missing.contains(i))
            .map(|(_, txn)| txn.clone())
            .collect();
        source = source.with_transactions(processor, processor_side, internal_side);
    }
    Ok(source)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reconciliation_core=info".parse()?))
        .init();

    println!("🏦 Reconciliation Core - Daily Reconciliation Example\n");

    let mut args = std::env::args().skip(1);
    let run_date = match args.next() {
        Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")?,
        None => Utc::now().date_naive() - Duration::days(1),
    };
    let mut processors: Vec<String> = args.collect();
    if processors.is_empty() {
        processors = vec!["stripe".into(), "paypal".into(), "square".into()];
    }

    // 1. Configuration from the environment (and .env)
    let config = ReconciliationConfig::from_env()?;
    println!("⚙️  Configuration");
    println!("  ✓ Reports: {}", config.report_output_dir.display());
    println!("  ✓ Archive: {}", config.archive_dir.display());
    println!(
        "  ✓ Slack alerts: {}\n",
        if config.slack_webhook_url.is_some() { "enabled" } else { "disabled" }
    );

    // 2. Pick the data source
    let source: Arc<dyn TransactionSource> =
        match (&config.processor_api_url, &config.internal_api_url) {
            (Some(processor_api), Some(internal_api)) => {
                println!("🌐 Fetching from {} and {}\n", processor_api, internal_api);
                Arc::new(
                    HttpTransactionSource::new(processor_api.clone(), internal_api.clone())?
                        .with_limits(Some(30), Some(25)),
                )
            }
            _ => {
                println!("📦 Using built-in sample data\n");
                Arc::new(sample_source()?)
            }
        };

    // 3. Run every processor
    let system = ReconciliationSystem::with_defaults(config, source)?;
    println!("🔄 Reconciling {} for {}...\n", processors.join(", "), run_date);
    let report = system.run(run_date, &processors).await;

    // 4. Results
    println!("📊 Results");
    for outcome in &report.outcomes {
        match (&outcome.status, &outcome.summary) {
            (RunStatus::Completed, Some(summary)) => {
                println!(
                    "  ✓ {}: {} processor / {} internal, {} missing (${})",
                    outcome.processor,
                    summary.processor_transactions,
                    summary.internal_transactions,
                    summary.missing_transactions_count,
                    format_money(&summary.total_discrepancy_amount)
                );
                if let Some(location) = &outcome.report_location {
                    println!("    report: {}", location);
                }
            }
            _ => println!(
                "  ✗ {}: {}",
                outcome.processor,
                outcome.error.as_deref().unwrap_or("failed")
            ),
        }
    }

    println!("\n💚 Storage healthy: {}", system.health_check().await);

    if !report.all_succeeded() {
        return Err(format!("{} processor(s) failed", report.failed().count()).into());
    }
    println!("\n🎉 Daily reconciliation completed");
    Ok(())
}
