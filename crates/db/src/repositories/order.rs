use sqlx::Row;

use concierge_core::domain::order::{OrderId, OrderRecord};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT order_id, user_id, status, created_at FROM orders WHERE order_id = ?1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<OrderRecord, RepositoryError> {
            Ok(OrderRecord {
                order_id: OrderId(row.try_get("order_id")?),
                user_id: row.try_get("user_id")?,
                status: row.try_get("status")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }
}
