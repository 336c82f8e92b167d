use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use trace_core::auth::token_matches;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the shared service token.
///
/// The API is internal: its only caller is the chat-handling service, which
/// authenticates every request with `Authorization: Bearer
/// <TRACE_SERVICE_TOKEN>`. Tokens are compared as SHA-256 digests; the raw
/// secret is never held in `AppState`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAuth;

impl FromRequestParts<AppState> for ServiceAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // No token configured: development mode, warned about at startup.
        let Some(expected_hash) = state.service_token_hash.as_deref() else {
            return Ok(Self);
        };

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some(
                    "Include 'Authorization: Bearer <service token>'. The token is the \
                     TRACE_SERVICE_TOKEN shared with the chat service."
                        .to_string(),
                ),
            })?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authorization header must use Bearer scheme".to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer <service token>'".to_string()),
            })?;

        if token_matches(token, expected_hash) {
            Ok(Self)
        } else {
            Err(AppError::Unauthorized {
                message: "Invalid service token".to_string(),
                docs_hint: Some(
                    "Check that TRACE_SERVICE_TOKEN matches on both services.".to_string(),
                ),
            })
        }
    }
}
