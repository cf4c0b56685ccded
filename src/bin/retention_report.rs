//! Weekly Leader Retention - how many of this week's leaders come back?
//!
//! Market weeks run Friday to Thursday. Retention compares each week's
//! leader set against the next week that actually has orders.
//!
//! Run: ./target/release/retention_report --from 2025-03-01 --to 2025-05-31

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use sgl_analytics::aliases::AliasIndex;
use sgl_analytics::benchmark::BenchmarkClient;
use sgl_analytics::config::Config;
use sgl_analytics::geocode::GeocodeCache;
use sgl_analytics::models::{LeaderCoords, PriceSeries};
use sgl_analytics::orders::SGL_DEAL_TYPES;
use sgl_analytics::retention::compute_weekly_retention;
use sgl_analytics::{db, ledger, orders, pricing};
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Start of the analysis window (inclusive)
    #[arg(long)]
    from: NaiveDate,

    /// End of the analysis window (inclusive)
    #[arg(long)]
    to: NaiveDate,

    /// Only report this product (canonical name, case-insensitive)
    #[arg(long)]
    product: Option<String>,

    /// Emit the full result as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    anyhow::ensure!(args.from <= args.to, "--from must not be after --to");

    let config = Config::from_env()?;
    let aliases = AliasIndex::load(&config.alias_file)?;
    let geocoder = GeocodeCache::new(config.geocoder_url.clone());

    let benchmark_series = match &config.benchmark {
        Some(benchmark) => {
            BenchmarkClient::new(benchmark, config.chunk_days)
                .fetch_price_series(args.from, args.to, &aliases, &geocoder)
                .await
        }
        None => {
            warn!("no benchmark API configured; reference series uses the ledger only");
            PriceSeries::new()
        }
    };
    let ledger_rows = ledger::load_ledger(&config.ledger_file);
    let distribution_series =
        ledger::distribution_series(&ledger_rows, args.from, args.to, &aliases);
    let prices = pricing::merge_price_series(benchmark_series, distribution_series);

    let db = db::connect(&config.store_path).await?;
    let order_series = orders::extract(&db, args.from, args.to, &SGL_DEAL_TYPES, &aliases).await?;

    // Retention only keys leaders by id, coordinates are not needed here.
    let leader_coords = LeaderCoords::new();
    let mut records = compute_weekly_retention(&order_series, &prices, &leader_coords);

    if let Some(filter) = &args.product {
        let needle = filter.trim().to_lowercase();
        records.retain(|record| record.product.to_lowercase() == needle);
        anyhow::ensure!(!records.is_empty(), "no orders found for product {filter:?}");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    info!(
        "computed retention for {} products over {} order buckets",
        records.len(),
        order_series.len()
    );

    println!("\n{}", "═".repeat(86));
    println!(
        "  WEEKLY LEADER RETENTION  {} → {}  (weeks start Friday)",
        args.from, args.to
    );
    println!("{}", "═".repeat(86));

    for record in &records {
        println!("\n  {}", record.product);
        println!(
            "  {:>12} {:>9} {:>11} {:>11} {:>11} {:>10}",
            "Week", "Leaders", "Avg ETB/kg", "Local Δ", "Distr Δ", "Retained"
        );
        println!("  {}", "─".repeat(84));
        for week in &record.weeks {
            let cell = |v: Option<f64>| match v {
                Some(v) => format!("{v:>11.2}"),
                None => format!("{:>11}", "—"),
            };
            let retained = match week.retained_pct {
                Some(pct) => format!("{pct:>9.1}%"),
                None => format!("{:>10}", "—"),
            };
            println!(
                "  {:>12} {:>9} {:>11} {:>11} {:>11} {:>10}",
                week.week_start.to_string(),
                week.active_leaders,
                cell(week.avg_unit_price),
                cell(week.price_gaps.local_etb),
                cell(week.price_gaps.distribution_etb),
                retained,
            );
        }
    }

    println!("\n{}", "═".repeat(86));
    Ok(())
}
