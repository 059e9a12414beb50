//! Authentication Extractors
//!
//! Axum extractors for authentication and request metadata.

use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{TokenClaims, UserRole};

/// Authenticated caller, taken from claims the bearer middleware stored
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    /// Build from access token claims; refresh claims carry no identity
    pub fn from_claims(claims: &TokenClaims) -> Option<Self> {
        Some(Self {
            id: claims.sub,
            email: claims.email.clone()?,
            role: claims.role?,
        })
    }

    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        roles.contains(&self.role)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TokenClaims>()
            .and_then(AuthUser::from_claims)
            .ok_or(AuthError::Unauthorized)
    }
}

/// Network origin of a request
///
/// The socket peer is authoritative. Forwarding headers are only consulted
/// when the service sits behind a proxy it trusts, and then only the entry
/// that proxy appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
}

impl ClientInfo {
    pub fn resolve(headers: &HeaderMap, extensions: &Extensions, trust_proxy_headers: bool) -> Self {
        let forwarded = if trust_proxy_headers {
            forwarded_ip(headers)
        } else {
            None
        };

        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        ClientInfo {
            ip: forwarded.or(peer),
        }
    }
}

/// Last `X-Forwarded-For` hop, then `X-Real-IP`; unparseable values are ignored
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.rsplit(',').next())
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            headers
                .get("X-Real-IP")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        })
}
