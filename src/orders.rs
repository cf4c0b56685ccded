//! Order Series Extractor: per-(day, leader, product) aggregates from the
//! order store, restricted to a deal-type set and completed, non-deleted
//! records.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::aliases::{AliasIndex, Vocabulary};
use crate::db::DbConn;
use crate::models::OrderObservation;

/// Deal types of the super-group-leader program
pub const SGL_DEAL_TYPES: [&str; 4] = [
    "SUPER_GROUP",
    "SUPER_GROUP_FLASH_SALE",
    "SUPER_GROUP_REGULAR",
    "SUPER_GROUP_RECURRENT",
];

#[derive(Debug, Deserialize)]
struct OrderRow {
    order_day: String,
    leader_id: String,
    leader_phone: Option<String>,
    leader_name: Option<String>,
    product_name: String,
    total_kg: f64,
    revenue_etb: f64,
}

/// Pull order aggregates for a date range. The unit price per bucket is the
/// volume-weighted average sum(kg * price) / sum(kg), so one large cheap
/// order is not weighted like many small ones. Buckets with a non-positive
/// unit price are dropped as source noise; product names without an alias
/// participate under their trimmed raw name.
pub async fn extract(
    db: &DbConn,
    start_date: NaiveDate,
    end_date: NaiveDate,
    deal_types: &[&str],
    aliases: &AliasIndex,
) -> Result<Vec<OrderObservation>> {
    let deal_types: Vec<String> = deal_types.iter().map(|s| s.to_string()).collect();
    let rows: Vec<OrderRow> = db
        .query(
            r#"
            SELECT
                order_day,
                leader_id,
                leader_phone,
                leader_name,
                product_name,
                math::sum(quantity_kg) AS total_kg,
                math::sum(quantity_kg * unit_price_etb) AS revenue_etb
            FROM order_line
            WHERE deleted = false
                AND status = 'COMPLETED'
                AND deal_type INSIDE $deal_types
                AND order_day >= $from
                AND order_day <= $to
            GROUP BY order_day, leader_id, leader_phone, leader_name, product_name
            "#,
        )
        .bind(("deal_types", deal_types))
        .bind(("from", start_date.format("%Y-%m-%d").to_string()))
        .bind(("to", end_date.format("%Y-%m-%d").to_string()))
        .await?
        .take(0)?;

    let mut observations = Vec::with_capacity(rows.len());
    for row in rows {
        let Ok(order_date) = row.order_day.parse::<NaiveDate>() else {
            continue;
        };
        if row.total_kg <= 0.0 {
            continue;
        }
        let unit_price_etb = row.revenue_etb / row.total_kg;
        if unit_price_etb <= 0.0 {
            continue;
        }
        let product = row.product_name.trim();
        if product.is_empty() {
            continue;
        }
        observations.push(OrderObservation {
            order_date,
            leader_id: row.leader_id,
            leader_phone: row.leader_phone.filter(|p| !p.trim().is_empty()),
            leader_name: row.leader_name.filter(|n| !n.trim().is_empty()),
            canonical_product: aliases.resolve_or_raw(Vocabulary::Order, product),
            total_kg: row.total_kg,
            unit_price_etb,
        });
    }

    info!(
        "extracted {} order observations for {start_date}..{end_date}",
        observations.len()
    );
    Ok(observations)
}
