//! Fixed-window rate limiting
//!
//! Two namespaces share one counter store: a global limiter keyed by user or
//! client IP, and a stricter login limiter keyed by IP. Enforcement reads the
//! counter and then increments it in a second call, so concurrent requests
//! can overshoot the limit slightly.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::RateLimitStore;

/// Which limiter a request is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Global,
    Login,
}

/// Who a request is counted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitIdentity {
    Ip(IpAddr),
    User(Uuid),
    /// No peer address was available; all such requests share one bucket
    Unresolved,
}

impl From<Option<IpAddr>> for RateLimitIdentity {
    fn from(ip: Option<IpAddr>) -> Self {
        ip.map_or(RateLimitIdentity::Unresolved, RateLimitIdentity::Ip)
    }
}

impl fmt::Display for RateLimitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitIdentity::Ip(ip) => write!(f, "ip:{ip}"),
            RateLimitIdentity::User(id) => write!(f, "user:{id}"),
            RateLimitIdentity::Unresolved => f.write_str("ip:unknown"),
        }
    }
}

impl RateLimitScope {
    /// Counter key for an identity in this namespace
    pub fn key(&self, identity: &RateLimitIdentity) -> String {
        match self {
            RateLimitScope::Global => identity.to_string(),
            RateLimitScope::Login => format!("login:{identity}"),
        }
    }
}

/// Requests allowed per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

/// Applies the two policies against a counter store
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    global: RateLimitPolicy,
    login: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        global: RateLimitPolicy,
        login: RateLimitPolicy,
    ) -> Self {
        Self {
            store,
            global,
            login,
        }
    }

    pub fn from_config(store: Arc<dyn RateLimitStore>, config: &AuthConfig) -> Self {
        Self::new(
            store,
            RateLimitPolicy {
                limit: config.rate_limit_requests,
                window: Duration::from_secs(config.rate_limit_window),
            },
            RateLimitPolicy {
                limit: config.login_rate_limit_requests,
                window: Duration::from_secs(config.login_rate_limit_window),
            },
        )
    }

    pub fn policy(&self, scope: RateLimitScope) -> RateLimitPolicy {
        match scope {
            RateLimitScope::Global => self.global,
            RateLimitScope::Login => self.login,
        }
    }

    /// Reject with `RateLimited` when over the limit, otherwise count the hit
    ///
    /// A failed increment is logged and the request still proceeds.
    pub async fn enforce(
        &self,
        scope: RateLimitScope,
        identity: &RateLimitIdentity,
    ) -> Result<(), AuthError> {
        let policy = self.policy(scope);
        let key = scope.key(identity);

        if !self.store.check_rate_limit(&key, policy.limit).await? {
            tracing::warn!(key = %key, limit = policy.limit, "Rate limit exceeded");
            return Err(AuthError::RateLimited);
        }

        if let Err(e) = self.store.increment_counter(&key, policy.window).await {
            tracing::warn!(key = %key, error = %e, "Rate limiter increment failed");
        }

        Ok(())
    }
}
