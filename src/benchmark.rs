//! Benchmark price API client: fetches daily reference prices in date-range
//! chunks and folds them into a per-(product, date) price series.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::aliases::{AliasIndex, Vocabulary};
use crate::config::BenchmarkConfig;
use crate::geocode::GeocodeCache;
use crate::models::{Channel, PriceSeries, PriceSource};
use crate::pricing::{RawSample, SeriesBuilder};

/// Location groups requested from the API. Only the three channel groups
/// are folded into the series; the rest are tolerated in responses.
const LOCATION_GROUPS: [&str; 6] = [
    "farm",
    "distribution-center",
    "local-shops",
    "sunday-market",
    "supermarket",
    "ecommerce",
];

#[derive(Debug, Deserialize)]
struct BenchmarkPayload {
    #[serde(default)]
    data: Vec<BenchmarkEntry>,
}

#[derive(Debug, Deserialize)]
struct BenchmarkEntry {
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    location_group: Option<String>,
    #[serde(default, alias = "lat", alias = "location_latitude")]
    latitude: Option<f64>,
    #[serde(default, alias = "lon", alias = "location_longitude")]
    longitude: Option<f64>,
}

/// Parse a benchmark date string: ISO first, US-style fallback. Payloads mix
/// both and sometimes carry a time suffix.
pub(crate) fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%m/%d/%Y"))
        .ok()
}

fn channel_for_group(group: &str) -> Option<Channel> {
    match group {
        "local-shops" => Some(Channel::Local),
        "distribution-center" | "farm" => Some(Channel::Distribution),
        "sunday-market" => Some(Channel::Sunday),
        _ => None,
    }
}

pub struct BenchmarkClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    chunk_days: i64,
}

impl BenchmarkClient {
    pub fn new(config: &BenchmarkConfig, chunk_days: i64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            chunk_days: chunk_days.max(1),
        }
    }

    /// Fetch the benchmark series for a date range. The range is split into
    /// chunks to respect API limits; a failed chunk is skipped with a
    /// warning so the rest of the window still comes back.
    pub async fn fetch_price_series(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        aliases: &AliasIndex,
        geocoder: &GeocodeCache,
    ) -> PriceSeries {
        let mut builder = SeriesBuilder::default();
        let mut cursor = start_date;

        while cursor <= end_date {
            let chunk_end = std::cmp::min(
                cursor + chrono::Duration::days(self.chunk_days - 1),
                end_date,
            );
            match self.fetch_chunk(cursor, chunk_end).await {
                Ok(entries) => {
                    debug!("benchmark chunk {cursor}..{chunk_end}: {} entries", entries.len());
                    for entry in entries {
                        self.fold_entry(entry, start_date, end_date, aliases, geocoder, &mut builder)
                            .await;
                    }
                }
                Err(err) => {
                    warn!("benchmark chunk {cursor}..{chunk_end} failed, skipping: {err}");
                }
            }
            cursor = chunk_end + chrono::Duration::days(1);
        }

        let series = builder.finish();
        info!("benchmark series covers {} (product, day) keys", series.len());
        series
    }

    async fn fetch_chunk(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<BenchmarkEntry>> {
        let payload: BenchmarkPayload = self
            .client
            .get(&self.url)
            .query(&[
                ("dateFrom", from.format("%Y-%m-%d").to_string()),
                ("dateTo", to.format("%Y-%m-%d").to_string()),
                ("frequency", "daily".to_string()),
                ("comparisonType", "avg".to_string()),
                ("locationGroups", LOCATION_GROUPS.join(",")),
            ])
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(payload.data)
    }

    async fn fold_entry(
        &self,
        entry: BenchmarkEntry,
        start_date: NaiveDate,
        end_date: NaiveDate,
        aliases: &AliasIndex,
        geocoder: &GeocodeCache,
        builder: &mut SeriesBuilder,
    ) {
        // Entries with no benchmark-vocabulary alias are dropped.
        let Some(canonical) = entry
            .product_name
            .as_deref()
            .and_then(|name| aliases.resolve(Vocabulary::Benchmark, name))
        else {
            return;
        };
        let canonical = canonical.to_string();

        let Some(day) = entry.date.as_deref().and_then(parse_flexible_date) else {
            return;
        };
        if day < start_date || day > end_date {
            return;
        }
        let Some(price) = entry.price.filter(|p| *p > 0.0) else {
            return;
        };
        let group = entry
            .location_group
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let Some(channel) = channel_for_group(&group) else {
            return;
        };
        let location = entry.location.as_deref().unwrap_or_default().trim().to_string();

        // Coordinates straight from the API when present, geocoding fallback
        // otherwise.
        let (mut lat, mut lon) = (entry.latitude, entry.longitude);
        if (lat.is_none() || lon.is_none()) && !location.is_empty() {
            if let Some((glat, glon)) = geocoder.get_or_fetch(&location, &group).await {
                lat = Some(glat);
                lon = Some(glon);
            }
        }

        builder.add_sample(
            &canonical,
            day,
            channel,
            RawSample {
                price,
                lat,
                lon,
                location,
                location_group: group,
            },
            PriceSource::BenchmarkApi,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_and_us_dates() {
        assert_eq!(parse_flexible_date("2025-03-07"), "2025-03-07".parse().ok());
        assert_eq!(parse_flexible_date("2025-03-07T10:30:00"), "2025-03-07".parse().ok());
        assert_eq!(parse_flexible_date("03/07/2025"), "2025-03-07".parse().ok());
        assert_eq!(parse_flexible_date("not a date"), None);
        assert_eq!(parse_flexible_date(""), None);
    }

    #[test]
    fn channel_mapping_covers_the_three_channels() {
        assert_eq!(channel_for_group("local-shops"), Some(Channel::Local));
        assert_eq!(channel_for_group("distribution-center"), Some(Channel::Distribution));
        assert_eq!(channel_for_group("farm"), Some(Channel::Distribution));
        assert_eq!(channel_for_group("sunday-market"), Some(Channel::Sunday));
        assert_eq!(channel_for_group("supermarket"), None);
    }

    #[test]
    fn entry_deserializes_coordinate_aliases() {
        let entry: BenchmarkEntry = serde_json::from_str(
            r#"{"product_name":"onion","price":12.0,"date":"2025-03-07",
                "location":"Merkato","location_group":"local-shops",
                "lat":9.02,"lon":38.74}"#,
        )
        .unwrap();
        assert_eq!(entry.latitude, Some(9.02));
        assert_eq!(entry.longitude, Some(38.74));
    }
}
