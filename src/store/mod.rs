//! Storage capabilities used by the auth service.
//!
//! Each trait is one leaf the service talks to. Implementations must make
//! every single call atomic on its own; the service never relies on two
//! calls being atomic together.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{RefreshToken, User};

/// Durable user records, unique on email and phone
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; `AlreadyExists` on an email or phone collision
    async fn create(&self, user: &User) -> Result<(), AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<User, AuthError>;

    async fn find_by_phone(&self, phone: &str) -> Result<User, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, AuthError>;

    /// Replace every mutable field of an existing user
    async fn update(&self, user: &User) -> Result<(), AuthError>;

    async fn update_verification_status(&self, email: &str, is_verified: bool)
        -> Result<(), AuthError>;

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), AuthError>;
}

/// Issued refresh tokens
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError>;

    /// Look up a row by its token string; `InvalidToken` when unknown
    async fn find_by_token(&self, token: &str) -> Result<RefreshToken, AuthError>;

    async fn revoke(&self, token: &str) -> Result<(), AuthError>;

    /// Revoke every live token of a user, returning how many were revoked
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError>;
}

/// One live verification code per email, expiring on its own
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Overwrite any existing code and restart its TTL
    async fn store(&self, email: &str, code: &str, ttl: Duration) -> Result<(), AuthError>;

    /// `OtpNotFound` when absent or expired
    async fn get(&self, email: &str) -> Result<String, AuthError>;

    async fn delete(&self, email: &str) -> Result<(), AuthError>;

    async fn exists(&self, email: &str) -> Result<bool, AuthError>;
}

/// Fixed-window request counters
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Whether `key` is still under `limit` in its current window; never mutates
    async fn check_rate_limit(&self, key: &str, limit: u32) -> Result<bool, AuthError>;

    /// Count one hit; the first hit of a window starts a `window`-long expiry
    async fn increment_counter(&self, key: &str, window: Duration) -> Result<(), AuthError>;
}
