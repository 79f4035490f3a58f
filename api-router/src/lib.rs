use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    chat::{chat, chat_history, conversation},
    documents::{delete_document, get_document, list_documents, upload_document},
    liveness::live,
    readiness::ready,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let api = Router::new()
        .route("/chat", post(chat))
        .route("/chat/history", get(chat_history))
        .route("/chat/conversation/{conversation_id}", get(conversation))
        .route(
            "/documents",
            get(list_documents)
                .post(upload_document)
                .layer(DefaultBodyLimit::max(app_state.config.max_upload_bytes)),
        )
        .route(
            "/documents/{document_id}",
            get(get_document).delete(delete_document),
        );

    public.merge(api)
}
