use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(QueryAnalytics, "analytics", {
    query: String,
    response_time_ms: i64
});

impl QueryAnalytics {
    pub fn new(query: String, response_time_ms: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            query,
            response_time_ms,
        }
    }

    /// Writes the single observation each chat request emits.
    pub async fn record(
        query: &str,
        response_time_ms: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.store_item(Self::new(query.to_string(), response_time_ms))
            .await?;
        Ok(())
    }

    pub async fn get_recent(limit: usize, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let records: Vec<Self> = db
            .client
            .query(format!(
                "SELECT * FROM type::table($table) ORDER BY created_at DESC LIMIT {limit}"
            ))
            .bind(("table", Self::table_name()))
            .await?
            .take(0)?;

        Ok(records)
    }
}
