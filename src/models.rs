//! Domain records shared across the analytics pipeline.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw order line from the warehouse CSV export
#[derive(Debug, Deserialize)]
pub struct OrderLineCsv {
    pub created_at: String,
    pub leader_id: String,
    pub leader_phone: Option<String>,
    pub leader_name: Option<String>,
    pub product_name: String,
    pub quantity_kg: f64,
    pub unit_price_etb: f64,
    pub deal_type: String,
    pub status: String,
    pub deleted: Option<bool>,
}

/// Order line as stored. `order_day` is the ISO day bucket, precomputed at
/// ingest so grouped queries stay simple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_day: String,
    pub leader_id: String,
    pub leader_phone: Option<String>,
    pub leader_name: Option<String>,
    pub product_name: String,
    pub quantity_kg: f64,
    pub unit_price_etb: f64,
    pub deal_type: String,
    pub status: String,
    pub deleted: bool,
}

impl OrderLineCsv {
    pub fn to_order_line(&self) -> anyhow::Result<OrderLine> {
        // Exports carry either a full timestamp or a bare date.
        let head = self.created_at.get(..10).unwrap_or(&self.created_at);
        let day = NaiveDate::parse_from_str(head, "%Y-%m-%d")?;
        Ok(OrderLine {
            order_day: day.format("%Y-%m-%d").to_string(),
            leader_id: self.leader_id.clone(),
            leader_phone: self.leader_phone.clone().filter(|p| !p.trim().is_empty()),
            leader_name: self.leader_name.clone().filter(|n| !n.trim().is_empty()),
            product_name: self.product_name.clone(),
            quantity_kg: self.quantity_kg,
            unit_price_etb: self.unit_price_etb,
            deal_type: self.deal_type.clone(),
            status: self.status.clone(),
            deleted: self.deleted.unwrap_or(false),
        })
    }
}

/// One (order_date, leader, product) aggregate from the order store.
/// `unit_price_etb` is the volume-weighted average price for the bucket and
/// is always positive; non-positive buckets are dropped at extraction.
#[derive(Debug, Clone, Serialize)]
pub struct OrderObservation {
    pub order_date: NaiveDate,
    pub leader_id: String,
    pub leader_phone: Option<String>,
    pub leader_name: Option<String>,
    pub canonical_product: String,
    pub total_kg: f64,
    pub unit_price_etb: f64,
}

/// Reference price channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    Local,
    Distribution,
    Sunday,
}

/// Provenance of a price series entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    BenchmarkApi,
    DistributionFallback,
}

/// One benchmark price sample with resolved coordinates. Samples without
/// coordinates contribute to channel averages but are never retained as
/// points.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkPricePoint {
    pub price: f64,
    pub lat: f64,
    pub lon: f64,
    pub location: String,
    pub location_group: String,
}

/// Per-channel slice of a price series entry
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelPrices {
    pub avg: Option<f64>,
    pub points: Vec<BenchmarkPricePoint>,
}

/// Reference prices for one (canonical product, date) key
#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceSeriesEntry {
    pub local: ChannelPrices,
    pub distribution: ChannelPrices,
    pub sunday: ChannelPrices,
    pub sources: HashSet<PriceSource>,
}

impl PriceSeriesEntry {
    pub fn channel(&self, channel: Channel) -> &ChannelPrices {
        match channel {
            Channel::Local => &self.local,
            Channel::Distribution => &self.distribution,
            Channel::Sunday => &self.sunday,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut ChannelPrices {
        match channel {
            Channel::Local => &mut self.local,
            Channel::Distribution => &mut self.distribution,
            Channel::Sunday => &mut self.sunday,
        }
    }
}

/// Merged reference price series keyed by (canonical product, date)
pub type PriceSeries = HashMap<(String, NaiveDate), PriceSeriesEntry>;

/// Most recent known delivery coordinate per leader phone
pub type LeaderCoords = HashMap<String, (f64, f64)>;

/// How a reference price was chosen for one (leader, product, day) lookup.
/// Callers can tell a nearest-market price from a city-wide average instead
/// of inferring it from null fields.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceResolution {
    Nearest {
        price: f64,
        distance_km: f64,
        location: String,
        location_group: String,
    },
    Averaged {
        price: f64,
    },
    Missing,
}

impl PriceResolution {
    pub fn price(&self) -> Option<f64> {
        match self {
            PriceResolution::Nearest { price, .. } | PriceResolution::Averaged { price } => {
                Some(*price)
            }
            PriceResolution::Missing => None,
        }
    }
}

/// Nearest benchmark point seen for a leader across the analysis window
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClosestBenchmark {
    pub distance_km: Option<f64>,
    pub location: Option<String>,
    pub location_group: Option<String>,
}

impl ClosestBenchmark {
    /// Keep the candidate if it is closer than anything seen so far.
    pub fn consider(&mut self, distance_km: f64, location: &str, location_group: &str) {
        if self.distance_km.map_or(true, |current| distance_km < current) {
            self.distance_km = Some(distance_km);
            self.location = Some(location.to_string());
            self.location_group = Some(location_group.to_string());
        }
    }
}

/// Which reference sources contributed to a leader's metrics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceFlags {
    pub benchmark_api: bool,
    pub distribution_fallback: bool,
}

/// Analysis window echoed back on every record
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Per-product slice of a leader's sensitivity record, capped to the top
/// products by volume.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSensitivity {
    pub product_name: String,
    pub total_kg: f64,
    pub volume_share_pct: f64,
    pub local_discount_etb: Option<f64>,
    pub local_discount_pct: Option<f64>,
    pub distribution_discount_etb: Option<f64>,
    pub distribution_discount_pct: Option<f64>,
    pub combined_sensitivity_etb: Option<f64>,
    pub combined_sensitivity_pct: Option<f64>,
    pub local_observations: usize,
    pub distribution_observations: usize,
    pub pct_volume_at_or_above_local: Option<f64>,
}

/// Price-sensitivity metrics for one leader. Discounts are positive when the
/// leader sold below the reference channel; all `*_pct` fields are on the
/// 0-100 scale.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderSensitivityRecord {
    pub leader_id: String,
    pub leader_phone: Option<String>,
    pub leader_name: Option<String>,
    pub total_kg: f64,
    pub local_discount_etb: Option<f64>,
    pub distribution_discount_etb: Option<f64>,
    pub combined_sensitivity_etb: Option<f64>,
    pub combined_sensitivity_pct: Option<f64>,
    pub local_discount_pct: Option<f64>,
    pub distribution_discount_pct: Option<f64>,
    pub coverage_days: usize,
    pub local_observations: usize,
    pub distribution_observations: usize,
    pub pct_volume_at_or_above_local: Option<f64>,
    pub source_flags: SourceFlags,
    pub period: Period,
    pub product_sensitivity: Vec<ProductSensitivity>,
    pub closest_benchmark: ClosestBenchmark,
    pub closest_local_benchmark: ClosestBenchmark,
    pub closest_distribution_benchmark: ClosestBenchmark,
}

/// The same record set indexed three ways for downstream joins
#[derive(Debug, Default, Serialize)]
pub struct SensitivityIndexes {
    pub by_phone: HashMap<String, LeaderSensitivityRecord>,
    pub by_leader_id: HashMap<String, LeaderSensitivityRecord>,
    pub by_name: HashMap<String, LeaderSensitivityRecord>,
}

/// Volume-weighted price-gap metrics per channel for one market week
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelGaps {
    pub local_etb: Option<f64>,
    pub local_pct: Option<f64>,
    pub distribution_etb: Option<f64>,
    pub distribution_pct: Option<f64>,
    pub sunday_etb: Option<f64>,
    pub sunday_pct: Option<f64>,
}

/// One market week in a product's retention series. `retained_pct` compares
/// this week's leader set against the next week present in the data (not the
/// calendar-next week) and is null for the last populated week.
#[derive(Debug, Clone, Serialize)]
pub struct WeekSummary {
    pub week_start: NaiveDate,
    pub active_leaders: usize,
    pub avg_unit_price: Option<f64>,
    pub retained_pct: Option<f64>,
    pub price_gaps: ChannelGaps,
}

/// Weekly retention series for one canonical product, weeks ascending
#[derive(Debug, Clone, Serialize)]
pub struct ProductRetentionRecord {
    pub product: String,
    pub weeks: Vec<WeekSummary>,
}
