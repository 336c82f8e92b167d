use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// SHA-256 of `TRACE_SERVICE_TOKEN`. `None` disables auth entirely
    /// (local development against a throwaway database).
    pub service_token_hash: Option<String>,
}

impl AppState {
    pub fn new(db: PgPool) -> Self {
        let service_token_hash = match std::env::var("TRACE_SERVICE_TOKEN") {
            Ok(token) if !token.is_empty() => Some(trace_core::auth::hash_token(&token)),
            _ => {
                tracing::warn!(
                    "TRACE_SERVICE_TOKEN is not set; /v1/safety routes accept unauthenticated requests"
                );
                None
            }
        };

        Self {
            db,
            service_token_hash,
        }
    }
}
