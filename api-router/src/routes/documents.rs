use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::storage::types::document::Document;
use ingestion_pipeline::FileUpload;

use crate::{api_state::ApiState, error::ApiError};

const USER_ID_HEADER: &str = "x-user-id";
const ADMIN_FALLBACK: &str = "admin";
const LIST_DEFAULT_LIMIT: usize = 100;

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub title: Option<String>,
    pub category: Option<String>,
    #[form_data(limit = "10MiB")]
    pub file: FieldData<Bytes>,
}

/// Document metadata returned by the API. Extracted text stays server-side.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub file_type: String,
    pub size_bytes: i64,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentSummary {
    fn from(document: Document) -> Self {
        DocumentSummary {
            id: document.id,
            title: document.title,
            category: document.category,
            file_type: document.file_type,
            size_bytes: document.size_bytes,
            uploaded_by: document.uploaded_by,
            created_at: document.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub document: DocumentSummary,
    pub chunk_count: usize,
}

pub async fn upload_document(
    State(state): State<ApiState>,
    headers: HeaderMap,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input
        .file
        .metadata
        .file_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("uploaded file has no name".to_string()))?;

    let bytes = input.file.contents;
    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "file exceeds the {} byte upload limit",
            state.config.max_upload_bytes
        )));
    }

    let file_type = std::path::Path::new(&file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::ValidationError(format!("cannot determine file type of '{file_name}'"))
        })?;

    let title = input
        .title
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| file_name.clone());
    let category = input
        .category
        .filter(|category| !category.trim().is_empty())
        .unwrap_or_else(|| "general".to_string());

    let uploaded_by = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ADMIN_FALLBACK)
        .to_string();

    info!(
        file_name,
        file_type,
        size_bytes = bytes.len(),
        "received document upload"
    );

    let outcome = state
        .ingestion
        .ingest(FileUpload {
            title,
            category,
            file_type,
            bytes: bytes.to_vec(),
            uploaded_by,
        })
        .await?;

    Ok(Json(UploadResponse {
        document: DocumentSummary::from(outcome.document),
        chunk_count: outcome.chunk_count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    LIST_DEFAULT_LIMIT
}

pub async fn list_documents(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let documents = Document::get_recent(query.limit, &state.db).await?;

    Ok(Json(
        documents.into_iter().map(DocumentSummary::from).collect(),
    ))
}

pub async fn get_document(
    State(state): State<ApiState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentSummary>, ApiError> {
    let document: Document = state
        .db
        .get_item(&document_id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("document {document_id}")))?;

    Ok(Json(DocumentSummary::from(document)))
}

pub async fn delete_document(
    State(state): State<ApiState>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.ingestion.delete_document(&document_id).await?;

    Ok(Json(
        serde_json::json!({ "message": "Document deleted successfully" }),
    ))
}
