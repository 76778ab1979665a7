//! Request authentication
//!
//! Bearer-token middleware resolving the caller to an account principal.
//! Token issuance and session handling live with the external identity
//! provider; this layer only maps a presented token to a provisioned
//! account and enforces that it has been approved and not suspended.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::api::AppState;
use crate::domain::entities::account::AccountStatus;

/// Middleware requiring an active account principal for protected routes.
/// The resolved `Account` is inserted into request extensions for handlers.
pub async fn require_account(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(auth) if auth.starts_with("Bearer ") => &auth[7..],
        Some(_) => {
            warn!("Invalid Authorization header format (expected Bearer token)");
            return Err(StatusCode::UNAUTHORIZED);
        }
        None => {
            warn!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let account = state.accounts.get_by_token(token).await.map_err(|e| {
        error!("Token lookup failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match account {
        None => {
            warn!("Unknown API token attempted");
            Err(StatusCode::UNAUTHORIZED)
        }
        Some(account) if account.status != AccountStatus::Active => {
            warn!(
                "Rejected {} principal {}",
                account.status.as_str(),
                account.username
            );
            Err(StatusCode::FORBIDDEN)
        }
        Some(account) => {
            request.extensions_mut().insert(account);
            Ok(next.run(request).await)
        }
    }
}
