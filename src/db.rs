use anyhow::Result;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;

pub type DbConn = Surreal<Db>;

/// Initialize database connection with RocksDB backend
pub async fn connect(path: &str) -> Result<DbConn> {
    let db = Surreal::new::<RocksDb>(path).await?;
    db.use_ns("sgl").use_db("analytics").await?;
    Ok(db)
}

/// Initialize order store schema
pub async fn init_schema(db: &DbConn) -> Result<()> {
    db.query(
        r#"
        -- Order lines (schemaless for flexibility)
        DEFINE TABLE order_line SCHEMALESS;
        DEFINE INDEX idx_order_day ON order_line FIELDS order_day;
        DEFINE INDEX idx_deal_type ON order_line FIELDS deal_type;
        DEFINE INDEX idx_leader ON order_line FIELDS leader_id;
        DEFINE INDEX idx_status ON order_line FIELDS status;
        "#,
    )
    .await?;

    Ok(())
}
