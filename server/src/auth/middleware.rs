//! Bearer token gate for the data-export capability.
//!
//! Export and import move the whole business dataset, so all three
//! endpoints require the same capability. When no `EXPORT_TOKEN` is
//! configured the gate is open (development mode).

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Proof that the caller holds the data-export capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCapability {
    /// Whether the capability came from a token or from open mode
    pub authenticated: bool,
}

impl FromRequestParts<AppState> for ExportCapability {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        check_capability(state.config.export_token.as_deref(), auth_header)
    }
}

/// Decide whether an `Authorization` header grants the capability.
pub fn check_capability(
    expected: Option<&str>,
    auth_header: Option<&str>,
) -> Result<ExportCapability, AppError> {
    let Some(expected) = expected else {
        return Ok(ExportCapability {
            authenticated: false,
        });
    };

    match auth_header.map(|header| header.strip_prefix("Bearer ")) {
        Some(Some(token)) => {
            if token.is_empty() {
                return Err(AppError::Unauthorized("Empty bearer token"));
            }
            if token != expected {
                tracing::warn!("Rejected export token");
                return Err(AppError::Forbidden);
            }
            Ok(ExportCapability {
                authenticated: true,
            })
        }
        Some(None) => Err(AppError::Unauthorized(
            "Invalid authorization header format",
        )),
        None => Err(AppError::Unauthorized("Missing authorization header")),
    }
}
