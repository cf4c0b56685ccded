use anyhow::Result;
use sgl_analytics::db;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let db = db::connect("data/orders.db").await?;

    info!("Connected to order store");

    info!("=== Order Store Statistics ===");

    let status_stats: Vec<serde_json::Value> = db
        .query("SELECT status, count() as cnt FROM order_line GROUP BY status")
        .await?
        .take(0)?;
    info!("Status Distribution: {:?}", status_stats);

    let deal_stats: Vec<serde_json::Value> = db
        .query("SELECT deal_type, count() as cnt FROM order_line GROUP BY deal_type")
        .await?
        .take(0)?;
    info!("Deal Type Distribution: {:?}", deal_stats);

    // Top 5 products by total volume
    let top_products: Vec<serde_json::Value> = db
        .query(
            r#"
            SELECT * FROM (
                SELECT
                    product_name,
                    math::sum(quantity_kg) as total_kg
                FROM order_line
                GROUP BY product_name
            )
            ORDER BY total_kg DESC
            LIMIT 5
            "#,
        )
        .await?
        .take(0)?;
    info!("Top 5 Products: {:?}", top_products);

    // Daily order volume range
    let day_range: Vec<serde_json::Value> = db
        .query(
            r#"
            SELECT
                math::min(order_day) as first_day,
                math::max(order_day) as last_day,
                count() as lines
            FROM order_line
            GROUP ALL
            "#,
        )
        .await?
        .take(0)?;
    info!("Coverage: {:?}", day_range);

    Ok(())
}
