//! Load an order-lines CSV export into the local order store.
//!
//! Run: ./target/release/ingest --csv raw-data/order-lines.csv

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use csv::ReaderBuilder;
use sgl_analytics::db;
use sgl_analytics::models::{OrderLine, OrderLineCsv};
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Path to the order-lines CSV export
    #[arg(long, default_value = "raw-data/order-lines.csv")]
    csv: PathBuf,

    /// Path to the order store
    #[arg(long, default_value = "data/orders.db")]
    store: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();

    info!("Connecting to order store at {}", args.store);
    let db = db::connect(&args.store).await?;

    info!("Initializing schema...");
    db::init_schema(&db).await?;

    info!("Reading CSV from {:?}", args.csv);
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(&args.csv)?;

    let records: Vec<OrderLineCsv> = reader.deserialize().filter_map(|r| r.ok()).collect();
    info!("Parsed {} records from CSV", records.len());

    let mut inserted = 0usize;
    let mut error_count = 0usize;

    for (i, record) in records.iter().enumerate() {
        match record.to_order_line() {
            Ok(line) => {
                let _: Option<OrderLine> = db.create("order_line").content(line).await?;
                inserted += 1;
            }
            Err(err) => {
                error_count += 1;
                if error_count <= 10 {
                    warn!("Row {}: {}", i, err);
                }
            }
        }

        if (i + 1) % 1000 == 0 {
            info!("Processed {}/{} records", i + 1, records.len());
        }
    }

    info!(
        "Ingestion complete: {} order lines inserted, {} errors",
        inserted, error_count
    );

    Ok(())
}
