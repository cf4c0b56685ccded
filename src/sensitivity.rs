//! Sensitivity Aggregator: joins order observations against the reference
//! price series and derives per-leader and per-product discount metrics.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::config::BlendWeights;
use crate::models::{
    Channel, ClosestBenchmark, LeaderCoords, LeaderSensitivityRecord, OrderObservation, Period,
    PriceResolution, PriceSeries, PriceSource, ProductSensitivity, SensitivityIndexes,
    SourceFlags,
};
use crate::pricing::select_price;

/// Running volume-weighted gap totals for one reference channel.
#[derive(Debug, Default)]
struct ChannelAccumulator {
    gap_sum: f64,
    weight: f64,
    pct_sum: f64,
    above_volume: f64,
    dates: BTreeSet<NaiveDate>,
}

impl ChannelAccumulator {
    fn observe(&mut self, reference_price: f64, unit_price: f64, kg: f64, day: NaiveDate) {
        let gap = reference_price - unit_price;
        self.gap_sum += gap * kg;
        self.weight += kg;
        self.pct_sum += gap / reference_price * kg;
        if unit_price >= reference_price {
            self.above_volume += kg;
        }
        self.dates.insert(day);
    }

    fn discount_etb(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.gap_sum / self.weight)
    }

    fn discount_pct(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.pct_sum / self.weight * 100.0)
    }

    fn pct_volume_at_or_above(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.above_volume / self.weight * 100.0)
    }

    fn observations(&self) -> usize {
        self.dates.len()
    }
}

#[derive(Debug, Default)]
struct ProductAccumulator {
    total_kg: f64,
    local: ChannelAccumulator,
    distribution: ChannelAccumulator,
}

#[derive(Debug)]
struct LeaderAccumulator {
    leader_id: String,
    leader_phone: Option<String>,
    leader_name: Option<String>,
    total_kg: f64,
    local: ChannelAccumulator,
    distribution: ChannelAccumulator,
    sources: HashSet<PriceSource>,
    products: HashMap<String, ProductAccumulator>,
    closest_local: ClosestBenchmark,
    closest_distribution: ClosestBenchmark,
}

impl LeaderAccumulator {
    fn new(leader_id: &str) -> Self {
        Self {
            leader_id: leader_id.to_string(),
            leader_phone: None,
            leader_name: None,
            total_kg: 0.0,
            local: ChannelAccumulator::default(),
            distribution: ChannelAccumulator::default(),
            sources: HashSet::new(),
            products: HashMap::new(),
            closest_local: ClosestBenchmark::default(),
            closest_distribution: ClosestBenchmark::default(),
        }
    }
}

/// Blend the two channel figures, or use whichever is available; never blend
/// against a phantom zero.
fn combine(weights: BlendWeights, local: Option<f64>, distribution: Option<f64>) -> Option<f64> {
    match (local, distribution) {
        (Some(l), Some(d)) => Some(weights.local * l + weights.distribution * d),
        (Some(l), None) => Some(l),
        (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}

fn track_closest(target: &mut ClosestBenchmark, resolution: &PriceResolution) {
    if let PriceResolution::Nearest {
        distance_km,
        location,
        location_group,
        ..
    } = resolution
    {
        target.consider(*distance_km, location, location_group);
    }
}

/// Compute per-leader price-sensitivity metrics for an order window. Pure
/// over its inputs: an empty price series yields records with null metrics,
/// never an error.
pub fn compute_leader_sensitivity(
    orders: &[OrderObservation],
    prices: &PriceSeries,
    leader_coords: &LeaderCoords,
    weights: BlendWeights,
    period: Period,
) -> SensitivityIndexes {
    let mut leaders: HashMap<String, LeaderAccumulator> = HashMap::new();

    for order in orders {
        let key = (order.canonical_product.clone(), order.order_date);
        let entry = prices.get(&key);
        let leader_coord = order
            .leader_phone
            .as_deref()
            .and_then(|phone| leader_coords.get(phone))
            .copied();

        let local = select_price(entry, Channel::Local, leader_coord);
        let distribution = select_price(entry, Channel::Distribution, leader_coord);

        let acc = leaders
            .entry(order.leader_id.clone())
            .or_insert_with(|| LeaderAccumulator::new(&order.leader_id));
        if acc.leader_phone.is_none() {
            acc.leader_phone = order.leader_phone.clone();
        }
        if acc.leader_name.is_none() {
            acc.leader_name = order.leader_name.clone();
        }

        track_closest(&mut acc.closest_local, &local);
        track_closest(&mut acc.closest_distribution, &distribution);

        acc.total_kg += order.total_kg;
        if let Some(entry) = entry {
            acc.sources.extend(entry.sources.iter().copied());
        }

        let product = acc
            .products
            .entry(order.canonical_product.clone())
            .or_default();
        product.total_kg += order.total_kg;

        if let Some(price) = local.price().filter(|p| *p > 0.0) {
            acc.local
                .observe(price, order.unit_price_etb, order.total_kg, order.order_date);
            product
                .local
                .observe(price, order.unit_price_etb, order.total_kg, order.order_date);
        }
        if let Some(price) = distribution.price().filter(|p| *p > 0.0) {
            acc.distribution
                .observe(price, order.unit_price_etb, order.total_kg, order.order_date);
            product
                .distribution
                .observe(price, order.unit_price_etb, order.total_kg, order.order_date);
        }
    }

    debug!("aggregated sensitivity for {} leaders", leaders.len());

    let mut indexes = SensitivityIndexes::default();
    for acc in leaders.into_values() {
        let record = finalize_leader(acc, weights, period);
        if let Some(phone) = record.leader_phone.clone() {
            indexes.by_phone.insert(phone, record.clone());
        }
        if let Some(name) = record.leader_name.as_deref() {
            indexes
                .by_name
                .insert(name.trim().to_lowercase(), record.clone());
        }
        indexes.by_leader_id.insert(record.leader_id.clone(), record);
    }
    indexes
}

fn finalize_leader(
    acc: LeaderAccumulator,
    weights: BlendWeights,
    period: Period,
) -> LeaderSensitivityRecord {
    let local_discount_etb = acc.local.discount_etb();
    let local_discount_pct = acc.local.discount_pct();
    let distribution_discount_etb = acc.distribution.discount_etb();
    let distribution_discount_pct = acc.distribution.discount_pct();

    let coverage_days = acc
        .local
        .dates
        .union(&acc.distribution.dates)
        .count();

    let mut product_sensitivity: Vec<ProductSensitivity> = acc
        .products
        .iter()
        .filter(|(_, product)| product.total_kg > 0.0)
        .map(|(name, product)| {
            let local_etb = product.local.discount_etb();
            let local_pct = product.local.discount_pct();
            let distribution_etb = product.distribution.discount_etb();
            let distribution_pct = product.distribution.discount_pct();
            ProductSensitivity {
                product_name: name.clone(),
                total_kg: product.total_kg,
                volume_share_pct: if acc.total_kg > 0.0 {
                    product.total_kg / acc.total_kg * 100.0
                } else {
                    0.0
                },
                local_discount_etb: local_etb,
                local_discount_pct: local_pct,
                distribution_discount_etb: distribution_etb,
                distribution_discount_pct: distribution_pct,
                combined_sensitivity_etb: combine(weights, local_etb, distribution_etb),
                combined_sensitivity_pct: combine(weights, local_pct, distribution_pct),
                local_observations: product.local.observations(),
                distribution_observations: product.distribution.observations(),
                pct_volume_at_or_above_local: product.local.pct_volume_at_or_above(),
            }
        })
        .collect();
    product_sensitivity.sort_by(|a, b| {
        b.total_kg
            .partial_cmp(&a.total_kg)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    product_sensitivity.truncate(5);

    // The merged closest benchmark is the nearer of the two channel bests.
    let closest_benchmark = match (
        acc.closest_local.distance_km,
        acc.closest_distribution.distance_km,
    ) {
        (Some(l), Some(d)) if d < l => acc.closest_distribution.clone(),
        (Some(_), _) => acc.closest_local.clone(),
        (None, Some(_)) => acc.closest_distribution.clone(),
        (None, None) => ClosestBenchmark::default(),
    };

    LeaderSensitivityRecord {
        leader_id: acc.leader_id,
        leader_phone: acc.leader_phone,
        leader_name: acc.leader_name,
        total_kg: acc.total_kg,
        local_discount_etb,
        distribution_discount_etb,
        combined_sensitivity_etb: combine(weights, local_discount_etb, distribution_discount_etb),
        combined_sensitivity_pct: combine(weights, local_discount_pct, distribution_discount_pct),
        local_discount_pct,
        distribution_discount_pct,
        coverage_days,
        local_observations: acc.local.observations(),
        distribution_observations: acc.distribution.observations(),
        pct_volume_at_or_above_local: acc.local.pct_volume_at_or_above(),
        source_flags: SourceFlags {
            benchmark_api: acc.sources.contains(&PriceSource::BenchmarkApi),
            distribution_fallback: acc.sources.contains(&PriceSource::DistributionFallback),
        },
        period,
        product_sensitivity,
        closest_benchmark,
        closest_local_benchmark: acc.closest_local,
        closest_distribution_benchmark: acc.closest_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkPricePoint, ChannelPrices, PriceSeriesEntry};

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn period() -> Period {
        Period {
            start_date: day("2025-03-01"),
            end_date: day("2025-03-31"),
        }
    }

    fn order(
        leader: &str,
        phone: Option<&str>,
        product: &str,
        date: &str,
        kg: f64,
        price: f64,
    ) -> OrderObservation {
        OrderObservation {
            order_date: day(date),
            leader_id: leader.to_string(),
            leader_phone: phone.map(String::from),
            leader_name: Some(format!("Leader {leader}")),
            canonical_product: product.to_string(),
            total_kg: kg,
            unit_price_etb: price,
        }
    }

    fn avg_entry(local: Option<f64>, distribution: Option<f64>) -> PriceSeriesEntry {
        PriceSeriesEntry {
            local: ChannelPrices {
                avg: local,
                points: vec![],
            },
            distribution: ChannelPrices {
                avg: distribution,
                points: vec![],
            },
            sources: [PriceSource::BenchmarkApi].into_iter().collect(),
            ..Default::default()
        }
    }

    fn series_with(product: &str, date: &str, entry: PriceSeriesEntry) -> PriceSeries {
        let mut series = PriceSeries::new();
        series.insert((product.to_string(), day(date)), entry);
        series
    }

    #[test]
    fn discount_sign_convention() {
        // Sold at 8 against a local benchmark of 10: discount 2 ETB, 20%.
        let orders = vec![order("L1", None, "Red Onion", "2025-03-03", 5.0, 8.0)];
        let prices = series_with("Red Onion", "2025-03-03", avg_entry(Some(10.0), None));

        let out = compute_leader_sensitivity(
            &orders,
            &prices,
            &LeaderCoords::new(),
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        assert!((record.local_discount_etb.unwrap() - 2.0).abs() < 1e-9);
        assert!((record.local_discount_pct.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(record.coverage_days, 1);
        assert!(record.source_flags.benchmark_api);
    }

    #[test]
    fn combined_sensitivity_blends_both_channels() {
        // local discount 4, distribution discount 2 -> 0.6*4 + 0.4*2 = 3.2
        let orders = vec![order("L1", None, "Red Onion", "2025-03-03", 10.0, 6.0)];
        let prices = series_with("Red Onion", "2025-03-03", avg_entry(Some(10.0), Some(8.0)));

        let out = compute_leader_sensitivity(
            &orders,
            &prices,
            &LeaderCoords::new(),
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        assert!((record.combined_sensitivity_etb.unwrap() - 3.2).abs() < 1e-9);
    }

    #[test]
    fn single_channel_falls_back_without_blending() {
        let orders = vec![order("L1", None, "Red Onion", "2025-03-03", 10.0, 5.0)];
        let prices = series_with("Red Onion", "2025-03-03", avg_entry(Some(10.0), None));

        let out = compute_leader_sensitivity(
            &orders,
            &prices,
            &LeaderCoords::new(),
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        // Only a local discount of 5: combined must be exactly 5.
        assert!((record.combined_sensitivity_etb.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(record.distribution_discount_etb, None);
    }

    #[test]
    fn empty_price_series_yields_null_metrics() {
        let orders = vec![order("L1", None, "Red Onion", "2025-03-03", 10.0, 5.0)];
        let out = compute_leader_sensitivity(
            &orders,
            &PriceSeries::new(),
            &LeaderCoords::new(),
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        assert_eq!(record.local_discount_etb, None);
        assert_eq!(record.combined_sensitivity_etb, None);
        assert_eq!(record.coverage_days, 0);
        assert!((record.total_kg - 10.0).abs() < 1e-9);
    }

    #[test]
    fn volume_at_or_above_local_tracks_share() {
        let orders = vec![
            order("L1", None, "Red Onion", "2025-03-03", 6.0, 12.0), // at/above 10
            order("L1", None, "Red Onion", "2025-03-04", 4.0, 8.0),  // below
        ];
        let mut prices = series_with("Red Onion", "2025-03-03", avg_entry(Some(10.0), None));
        prices.insert(
            ("Red Onion".to_string(), day("2025-03-04")),
            avg_entry(Some(10.0), None),
        );

        let out = compute_leader_sensitivity(
            &orders,
            &prices,
            &LeaderCoords::new(),
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        assert!((record.pct_volume_at_or_above_local.unwrap() - 60.0).abs() < 1e-9);
        assert_eq!(record.local_observations, 2);
        assert_eq!(record.coverage_days, 2);
    }

    #[test]
    fn product_breakdown_caps_at_top_five_by_volume() {
        let products = ["A", "B", "C", "D", "E", "F"];
        let orders: Vec<OrderObservation> = products
            .iter()
            .enumerate()
            .map(|(i, p)| order("L1", None, p, "2025-03-03", (i + 1) as f64, 5.0))
            .collect();

        let out = compute_leader_sensitivity(
            &orders,
            &PriceSeries::new(),
            &LeaderCoords::new(),
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        assert_eq!(record.product_sensitivity.len(), 5);
        assert_eq!(record.product_sensitivity[0].product_name, "F");
        // Lowest-volume product A fell off the list.
        assert!(record
            .product_sensitivity
            .iter()
            .all(|p| p.product_name != "A"));
        let share: f64 = record.product_sensitivity[0].volume_share_pct;
        assert!((share - 6.0 / 21.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn closest_benchmark_uses_nearest_point_across_orders() {
        let leader_coord = (9.0, 38.74);
        let mut coords = LeaderCoords::new();
        coords.insert("+251900000001".to_string(), leader_coord);

        let entry = PriceSeriesEntry {
            local: ChannelPrices {
                avg: None,
                points: vec![
                    BenchmarkPricePoint {
                        price: 10.0,
                        lat: 9.009,
                        lon: 38.74,
                        location: "Merkato".to_string(),
                        location_group: "local-shops".to_string(),
                    },
                    BenchmarkPricePoint {
                        price: 14.0,
                        lat: 9.45,
                        lon: 38.74,
                        location: "Sholla".to_string(),
                        location_group: "local-shops".to_string(),
                    },
                ],
            },
            sources: [PriceSource::BenchmarkApi].into_iter().collect(),
            ..Default::default()
        };
        let prices = series_with("Red Onion", "2025-03-03", entry);
        let orders = vec![order(
            "L1",
            Some("+251900000001"),
            "Red Onion",
            "2025-03-03",
            5.0,
            8.0,
        )];

        let out = compute_leader_sensitivity(
            &orders,
            &prices,
            &coords,
            BlendWeights::default(),
            period(),
        );
        let record = &out.by_leader_id["L1"];
        let closest = &record.closest_benchmark;
        assert_eq!(closest.location.as_deref(), Some("Merkato"));
        assert!(closest.distance_km.unwrap() < 1.5);
        // Gap computed against the nearest point's price (10), not Sholla's.
        assert!((record.local_discount_etb.unwrap() - 2.0).abs() < 1e-9);
        // Phone index carries the same record.
        assert!(out.by_phone.contains_key("+251900000001"));
        assert!(out.by_name.contains_key("leader l1"));
    }
}
