//! Purchase-price ledger: the spreadsheet-derived history of what the
//! business actually paid per product, used as the distribution-channel
//! fallback when the benchmark API has no figure.

use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::{info, warn};

use crate::aliases::{AliasIndex, Vocabulary};
use crate::benchmark::parse_flexible_date;
use crate::models::{Channel, PriceSeries, PriceSource};
use crate::pricing::{RawSample, SeriesBuilder};

/// One row of the ledger export. Headers follow the source sheet.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "Product Name")]
    pub product_name: String,
    #[serde(rename = "date")]
    pub date: String,
    #[serde(rename = "PurchasingPrice")]
    pub purchasing_price: String,
}

/// Load the ledger export. An unreadable ledger degrades to an empty history
/// with a warning; the distribution channel then simply stays empty.
pub fn load_ledger(path: &Path) -> Vec<LedgerRow> {
    let mut reader = match ReaderBuilder::new().has_headers(true).from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!("purchase ledger unreadable at {}: {err}", path.display());
            return Vec::new();
        }
    };

    let rows: Vec<LedgerRow> = reader.deserialize().filter_map(|r| r.ok()).collect();
    info!("loaded {} purchase ledger rows from {}", rows.len(), path.display());
    rows
}

/// Sheet exports format prices with thousands separators.
fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().replace(',', "").parse::<f64>().ok()
}

/// Build the distribution-channel price series from ledger rows: date-range
/// filter, distribution-vocabulary aliasing, non-positive prices dropped.
/// Ledger data carries no coordinates, so it never contributes
/// nearest-neighbor points.
pub fn distribution_series(
    rows: &[LedgerRow],
    start_date: NaiveDate,
    end_date: NaiveDate,
    aliases: &AliasIndex,
) -> PriceSeries {
    let mut builder = SeriesBuilder::default();

    for row in rows {
        let Some(canonical) = aliases.resolve(Vocabulary::Distribution, &row.product_name) else {
            continue;
        };
        let canonical = canonical.to_string();
        let Some(day) = parse_flexible_date(&row.date) else {
            continue;
        };
        if day < start_date || day > end_date {
            continue;
        }
        let Some(price) = parse_price(&row.purchasing_price).filter(|p| *p > 0.0) else {
            continue;
        };

        builder.add_sample(
            &canonical,
            day,
            Channel::Distribution,
            RawSample {
                price,
                lat: None,
                lon: None,
                location: String::new(),
                location_group: String::new(),
            },
            PriceSource::DistributionFallback,
        );
    }

    builder.finish()
}
