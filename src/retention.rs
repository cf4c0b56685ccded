//! Retention Aggregator: buckets orders into Friday-anchored market weeks
//! and computes week-over-week leader retention per product, with weekly
//! price-gap metrics reusing the reference price series.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

use crate::models::{
    Channel, ChannelGaps, LeaderCoords, OrderObservation, PriceSeries, ProductRetentionRecord,
    WeekSummary,
};
use crate::pricing::select_price;

/// Start of the market week containing `day`. Weeks are anchored to Friday,
/// the business's weekly sales cycle, not calendar Monday.
pub fn market_week_start(day: NaiveDate) -> NaiveDate {
    let days_since_friday =
        (day.weekday().num_days_from_monday() as i64 - 4).rem_euclid(7);
    day - Duration::days(days_since_friday)
}

#[derive(Debug, Default)]
struct GapAccumulator {
    gap_sum: f64,
    weight: f64,
    pct_sum: f64,
}

impl GapAccumulator {
    fn observe(&mut self, reference_price: f64, unit_price: f64, kg: f64) {
        let gap = reference_price - unit_price;
        self.gap_sum += gap * kg;
        self.weight += kg;
        self.pct_sum += gap / reference_price * kg;
    }

    fn etb(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.gap_sum / self.weight)
    }

    fn pct(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.pct_sum / self.weight * 100.0)
    }
}

#[derive(Debug, Default)]
struct WeekAccumulator {
    leaders: HashSet<String>,
    unit_price_sum: f64,
    unit_price_weight: f64,
    local: GapAccumulator,
    distribution: GapAccumulator,
    sunday: GapAccumulator,
}

/// Compute per-product weekly retention. Retention for a week is the share
/// of its leaders also active in the next week present in that product's
/// data; weeks with no orders are simply absent, so a gap compares against
/// the next populated week. Products are sorted by name, weeks ascending.
pub fn compute_weekly_retention(
    orders: &[OrderObservation],
    prices: &PriceSeries,
    leader_coords: &LeaderCoords,
) -> Vec<ProductRetentionRecord> {
    let mut product_weeks: BTreeMap<String, BTreeMap<NaiveDate, WeekAccumulator>> =
        BTreeMap::new();

    for order in orders {
        let week_start = market_week_start(order.order_date);
        let week = product_weeks
            .entry(order.canonical_product.clone())
            .or_default()
            .entry(week_start)
            .or_default();

        week.leaders.insert(order.leader_id.clone());
        week.unit_price_sum += order.unit_price_etb * order.total_kg;
        week.unit_price_weight += order.total_kg;

        let leader_coord = order
            .leader_phone
            .as_deref()
            .and_then(|phone| leader_coords.get(phone))
            .copied();
        let entry = prices.get(&(order.canonical_product.clone(), order.order_date));

        for (channel, acc) in [
            (Channel::Local, &mut week.local),
            (Channel::Distribution, &mut week.distribution),
            (Channel::Sunday, &mut week.sunday),
        ] {
            if let Some(price) = select_price(entry, channel, leader_coord)
                .price()
                .filter(|p| *p > 0.0)
            {
                acc.observe(price, order.unit_price_etb, order.total_kg);
            }
        }
    }

    debug!("retention bucketed {} products", product_weeks.len());

    product_weeks
        .into_iter()
        .map(|(product, weeks)| {
            let ordered: Vec<(NaiveDate, WeekAccumulator)> = weeks.into_iter().collect();
            let summaries = ordered
                .iter()
                .enumerate()
                .map(|(idx, (week_start, week))| {
                    let retained_pct = match ordered.get(idx + 1) {
                        Some((_, next)) if !week.leaders.is_empty() => {
                            let retained =
                                week.leaders.intersection(&next.leaders).count();
                            Some(retained as f64 / week.leaders.len() as f64 * 100.0)
                        }
                        _ => None,
                    };
                    WeekSummary {
                        week_start: *week_start,
                        active_leaders: week.leaders.len(),
                        avg_unit_price: (week.unit_price_weight > 0.0)
                            .then(|| week.unit_price_sum / week.unit_price_weight),
                        retained_pct,
                        price_gaps: ChannelGaps {
                            local_etb: week.local.etb(),
                            local_pct: week.local.pct(),
                            distribution_etb: week.distribution.etb(),
                            distribution_pct: week.distribution.pct(),
                            sunday_etb: week.sunday.etb(),
                            sunday_pct: week.sunday.pct(),
                        },
                    }
                })
                .collect();
            ProductRetentionRecord {
                product,
                weeks: summaries,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelPrices, PriceSeriesEntry};

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn order(leader: &str, product: &str, date: &str, kg: f64, price: f64) -> OrderObservation {
        OrderObservation {
            order_date: day(date),
            leader_id: leader.to_string(),
            leader_phone: None,
            leader_name: None,
            canonical_product: product.to_string(),
            total_kg: kg,
            unit_price_etb: price,
        }
    }

    #[test]
    fn weeks_anchor_to_friday() {
        // 2025-03-07 is a Friday.
        assert_eq!(market_week_start(day("2025-03-07")), day("2025-03-07"));
        // Thursday belongs to the previous Friday's week.
        assert_eq!(market_week_start(day("2025-03-13")), day("2025-03-07"));
        // The following Friday starts a new week.
        assert_eq!(market_week_start(day("2025-03-14")), day("2025-03-14"));
        // Monday after a Friday anchor.
        assert_eq!(market_week_start(day("2025-03-10")), day("2025-03-07"));
    }

    #[test]
    fn two_week_retention_is_two_thirds() {
        // Week 1 (Fri 2025-03-07): leaders A, B, C. Week 2: A, B.
        let orders = vec![
            order("A", "Red Onion", "2025-03-07", 1.0, 10.0),
            order("B", "Red Onion", "2025-03-08", 1.0, 10.0),
            order("C", "Red Onion", "2025-03-09", 1.0, 10.0),
            order("A", "Red Onion", "2025-03-14", 1.0, 10.0),
            order("B", "Red Onion", "2025-03-15", 1.0, 10.0),
        ];
        let records =
            compute_weekly_retention(&orders, &PriceSeries::new(), &LeaderCoords::new());
        assert_eq!(records.len(), 1);
        let weeks = &records[0].weeks;
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].week_start, day("2025-03-07"));
        assert_eq!(weeks[0].active_leaders, 3);
        assert!((weeks[0].retained_pct.unwrap() - 200.0 / 3.0).abs() < 1e-9);
        // Last week has no successor: retention is null.
        assert_eq!(weeks[1].retained_pct, None);
    }

    #[test]
    fn retention_skips_calendar_gaps() {
        // Weeks of 03-07 and 03-28 are populated; the two in between are not.
        let orders = vec![
            order("A", "Red Onion", "2025-03-07", 1.0, 10.0),
            order("B", "Red Onion", "2025-03-07", 1.0, 10.0),
            order("A", "Red Onion", "2025-03-28", 1.0, 10.0),
        ];
        let records =
            compute_weekly_retention(&orders, &PriceSeries::new(), &LeaderCoords::new());
        let weeks = &records[0].weeks;
        assert_eq!(weeks.len(), 2);
        // Retention compares against the next populated week, not 03-14.
        assert!((weeks[0].retained_pct.unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn retention_stays_within_bounds() {
        let orders = vec![
            order("A", "Red Onion", "2025-03-07", 1.0, 10.0),
            order("B", "Red Onion", "2025-03-14", 1.0, 10.0),
        ];
        let records =
            compute_weekly_retention(&orders, &PriceSeries::new(), &LeaderCoords::new());
        let weeks = &records[0].weeks;
        // No overlap at all: exactly 0, never negative.
        assert!((weeks[0].retained_pct.unwrap() - 0.0).abs() < 1e-9);
        for week in weeks {
            if let Some(pct) = week.retained_pct {
                assert!((0.0..=100.0).contains(&pct));
            }
        }
    }

    #[test]
    fn weekly_price_gaps_are_volume_weighted() {
        let mut prices = PriceSeries::new();
        prices.insert(
            ("Red Onion".to_string(), day("2025-03-07")),
            PriceSeriesEntry {
                local: ChannelPrices {
                    avg: Some(12.0),
                    points: vec![],
                },
                ..Default::default()
            },
        );
        prices.insert(
            ("Red Onion".to_string(), day("2025-03-08")),
            PriceSeriesEntry {
                local: ChannelPrices {
                    avg: Some(12.0),
                    points: vec![],
                },
                ..Default::default()
            },
        );

        // Gaps: (12-10)*3kg and (12-8)*1kg -> weighted mean (6+4)/4 = 2.5
        let orders = vec![
            order("A", "Red Onion", "2025-03-07", 3.0, 10.0),
            order("A", "Red Onion", "2025-03-08", 1.0, 8.0),
        ];
        let records = compute_weekly_retention(&orders, &prices, &LeaderCoords::new());
        let week = &records[0].weeks[0];
        assert!((week.price_gaps.local_etb.unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(week.price_gaps.sunday_etb, None);
        // Weighted average unit price: (10*3 + 8*1)/4 = 9.5
        assert!((week.avg_unit_price.unwrap() - 9.5).abs() < 1e-9);
    }

    #[test]
    fn products_are_reported_separately_and_sorted() {
        let orders = vec![
            order("A", "Tomato", "2025-03-07", 1.0, 10.0),
            order("A", "Red Onion", "2025-03-07", 1.0, 10.0),
        ];
        let records =
            compute_weekly_retention(&orders, &PriceSeries::new(), &LeaderCoords::new());
        let names: Vec<&str> = records.iter().map(|r| r.product.as_str()).collect();
        assert_eq!(names, vec!["Red Onion", "Tomato"]);
    }
}
