//! Authentication Middleware
//!
//! Bearer token validation, role gating and rate limiting. Each function is
//! mounted with `axum::middleware::from_fn_with_state` so it reaches the
//! service through router state rather than the environment.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::extractors::{AuthUser, ClientInfo};
use crate::handlers::AuthState;
use crate::models::{TokenClaims, UserRole};
use crate::rate_limit::{RateLimitIdentity, RateLimitScope};

/// Extract the token from `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)
}

/// Require a valid access token
///
/// Stores the claims in request extensions for the `AuthUser` extractor.
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;
    let claims = auth.validate_access_token(token)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Require one of `roles`; mount inside `require_auth`
///
/// ```rust,ignore
/// get(handler).route_layer(from_fn_with_state(&[UserRole::Admin][..], require_role))
/// ```
pub async fn require_role(
    State(roles): State<&'static [UserRole]>,
    user: AuthUser,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !user.has_any_role(roles) {
        tracing::debug!(user_id = %user.id, role = %user.role, "Role not permitted");
        return Err(AuthError::Forbidden);
    }

    Ok(next.run(req).await)
}

/// Count every API request against the global limiter
///
/// Callers presenting a valid access token are counted per user, everyone
/// else per client address.
pub async fn global_rate_limit(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = match authenticated_claims(&auth, req.headers()) {
        Some(claims) => RateLimitIdentity::User(claims.sub),
        None => client_identity(&auth, &req),
    };

    auth.enforce_rate_limit(RateLimitScope::Global, &identity)
        .await?;

    Ok(next.run(req).await)
}

/// Count login attempts per client address
pub async fn login_rate_limit(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = client_identity(&auth, &req);

    auth.enforce_rate_limit(RateLimitScope::Login, &identity)
        .await?;

    Ok(next.run(req).await)
}

fn authenticated_claims(auth: &AuthState, headers: &HeaderMap) -> Option<TokenClaims> {
    let token = bearer_token(headers).ok()?;
    auth.validate_access_token(token).ok()
}

fn client_identity(auth: &AuthState, req: &Request) -> RateLimitIdentity {
    let client = ClientInfo::resolve(
        req.headers(),
        req.extensions(),
        auth.config().trust_proxy_headers,
    );
    if client.ip.is_none() {
        tracing::warn!("Client address unavailable; counting against the shared bucket");
    }
    RateLimitIdentity::from(client.ip)
}
