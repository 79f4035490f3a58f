use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Document, "document", {
    title: String,
    content: String,
    category: String,
    size_bytes: i64,
    file_type: String,
    uploaded_by: String
});

impl Document {
    pub fn new(
        title: String,
        content: String,
        category: String,
        size_bytes: i64,
        file_type: String,
        uploaded_by: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            content,
            category,
            size_bytes,
            file_type,
            uploaded_by,
        }
    }

    /// Documents for the admin listing, newest upload first.
    pub async fn get_recent(limit: usize, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let documents: Vec<Self> = db
            .client
            .query(format!(
                "SELECT * FROM type::table($table) ORDER BY created_at DESC LIMIT {limit}"
            ))
            .bind(("table", Self::table_name()))
            .await?
            .take(0)?;

        Ok(documents)
    }
}
