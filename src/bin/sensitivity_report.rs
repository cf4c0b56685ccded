//! Leader Price Sensitivity - who sells below the market, and by how much?
//!
//! Run: ./target/release/sensitivity_report --from 2025-03-01 --to 2025-03-31

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use csv::ReaderBuilder;
use serde::Deserialize;
use sgl_analytics::aliases::AliasIndex;
use sgl_analytics::benchmark::BenchmarkClient;
use sgl_analytics::config::Config;
use sgl_analytics::geocode::GeocodeCache;
use sgl_analytics::models::{LeaderCoords, Period, PriceSeries};
use sgl_analytics::orders::SGL_DEAL_TYPES;
use sgl_analytics::sensitivity::compute_leader_sensitivity;
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

    /// CSV of leader delivery coordinates (leader_phone, lat, lon)
    #[arg(long, default_value = "data/leader_coords.csv")]
    coords: PathBuf,

    /// Emit the full result as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Deserialize)]
struct CoordRow {
    leader_phone: String,
    lat: f64,
    lon: f64,
}

fn load_leader_coords(path: &PathBuf) -> LeaderCoords {
    let mut reader = match ReaderBuilder::new().has_headers(true).from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!("leader coordinates unreadable at {:?}: {err}", path);
            return LeaderCoords::new();
        }
    };
    reader
        .deserialize::<CoordRow>()
        .filter_map(|r| r.ok())
        .map(|row| (row.leader_phone, (row.lat, row.lon)))
        .collect()
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
    let leader_coords = load_leader_coords(&args.coords);

    let result = compute_leader_sensitivity(
        &order_series,
        &prices,
        &leader_coords,
        config.blend,
        Period {
            start_date: args.from,
            end_date: args.to,
        },
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    info!(
        "computed sensitivity for {} leaders over {} order buckets",
        result.by_leader_id.len(),
        order_series.len()
    );

    println!("\n{}", "═".repeat(98));
    println!(
        "  LEADER PRICE SENSITIVITY  {} → {}",
        args.from, args.to
    );
    println!("{}\n", "═".repeat(98));

    let mut leaders: Vec<_> = result.by_leader_id.values().collect();
    leaders.sort_by(|a, b| {
        b.total_kg
            .partial_cmp(&a.total_kg)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    println!(
        "  {:22} {:>9} {:>10} {:>10} {:>10} {:>9} {:>7} {:>12}",
        "Leader", "Volume", "Local Δ", "Distr Δ", "Combined", "≥Local%", "Days", "Nearest km"
    );
    println!("  {}", "─".repeat(96));
    for record in leaders.iter().take(20) {
        let name = record
            .leader_name
            .as_deref()
            .unwrap_or(record.leader_id.as_str());
        let fmt = |v: Option<f64>| match v {
            Some(v) => format!("{v:>9.2}"),
            None => format!("{:>9}", "—"),
        };
        println!(
            "  {:22} {:>8.1}kg {:>10} {:>10} {:>10} {:>9} {:>7} {:>12}",
            name.get(..22).unwrap_or(name),
            record.total_kg,
            fmt(record.local_discount_etb),
            fmt(record.distribution_discount_etb),
            fmt(record.combined_sensitivity_etb),
            fmt(record.pct_volume_at_or_above_local),
            record.coverage_days,
            fmt(record.closest_benchmark.distance_km),
        );
    }

    println!("\n{}", "═".repeat(98));
    Ok(())
}
