//! # Authentication Middleware
//!
//! Validates the participant token on REST requests and injects the
//! authenticated [`CurrentParticipant`] into request extensions.
//!
//! The live channel authenticates during the upgrade request with the same
//! [`authenticate_token`] helper, accepting the token from the
//! `Authorization` header or a `token` query parameter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/api/conversations", get(list_conversations))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));
//! ```
//!
//! Handlers then extract the participant:
//!
//! ```rust,ignore
//! async fn handler(Extension(me): Extension<CurrentParticipant>) -> String {
//!     format!("Hello, {}!", me.participant)
//! }
//! ```

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use lib_auth::{decode_jwt, TokenError};
use lib_core::{AppError, Config, ParticipantKind, ParticipantRef, Result};
use tracing::{debug, warn};

/// The participant a request or session acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentParticipant {
    pub participant: ParticipantRef,
    pub display_name: String,
}

/// Bearer token from the `Authorization` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a token into the participant it was issued to.
pub fn authenticate_token(token: &str, config: &Config) -> Result<CurrentParticipant> {
    let claims = decode_jwt(token, &config.jwt_secret).map_err(|e| match e {
        TokenError::Expired => AppError::Authentication("Token expired".to_string()),
        other => AppError::Authentication(other.to_string()),
    })?;

    let kind: ParticipantKind = claims
        .kind
        .parse()
        .map_err(|_| AppError::Authentication(format!("Unknown participant kind '{}'", claims.kind)))?;
    let id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Authentication("Malformed token subject".to_string()))?;

    Ok(CurrentParticipant {
        participant: ParticipantRef::new(kind, id),
        display_name: claims.name,
    })
}

/// Authentication middleware for the REST surface.
///
/// - **Valid token**: continues with [`CurrentParticipant`] in extensions
/// - **Missing/invalid token**: `401 Unauthorized`
pub async fn require_auth(
    State(config): State<Config>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        warn!("[AUTH] Missing or malformed Authorization header");
        AppError::Authentication("Missing bearer token".to_string())
    })?;

    let current = authenticate_token(token, &config).inspect_err(|e| {
        warn!("[AUTH] Token rejected: {}", e);
    })?;

    debug!("[AUTH] Authenticated participant: {} ({})", current.participant, current.display_name);

    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}
