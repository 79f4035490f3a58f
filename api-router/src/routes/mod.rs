pub mod chat;
pub mod documents;
pub mod liveness;
pub mod readiness;
