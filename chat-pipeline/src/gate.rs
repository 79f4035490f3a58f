//! Domain gate in front of retrieval and generation.

use tracing::warn;

use crate::services::ChatServices;

/// Decides whether a query should enter the pipeline. The classifier failing
/// must never block a student, so any error collapses to "in domain" and the
/// request proceeds.
pub async fn is_in_domain(services: &dyn ChatServices, query: &str) -> bool {
    match services.classify_domain(query).await {
        Ok(verdict) => verdict,
        Err(err) => {
            warn!(error = %err, "domain classifier unavailable, letting query through");
            true
        }
    }
}
