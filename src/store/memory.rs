//! In-process store implementations
//!
//! Every operation takes the store's lock once, which makes each call atomic
//! on its own. TTLs are measured on `tokio::time::Instant` so paused-clock
//! tests can step through expiry. Writes sweep out expired entries, so maps
//! keyed by client input stay bounded by what is live.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::{OtpStore, RateLimitStore, RefreshTokenStore, UserStore};
use crate::error::AuthError;
use crate::models::{RefreshToken, User};

// ============================================
// Users
// ============================================

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict(users: &HashMap<Uuid, User>, candidate: &User) -> Option<&'static str> {
        users
            .values()
            .filter(|existing| existing.id != candidate.id)
            .find_map(|existing| {
                if existing.email == candidate.email {
                    Some("email")
                } else if existing.phone == candidate.phone {
                    Some("phone")
                } else {
                    None
                }
            })
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: &User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.id) {
            return Err(AuthError::AlreadyExists("id"));
        }
        if let Some(field) = Self::conflict(&users, user) {
            return Err(AuthError::AlreadyExists(field));
        }

        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.phone == phone)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn update(&self, user: &User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id) {
            return Err(AuthError::UserNotFound);
        }
        if let Some(field) = Self::conflict(&users, user) {
            return Err(AuthError::AlreadyExists(field));
        }

        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        users.insert(user.id, updated);
        Ok(())
    }

    async fn update_verification_status(
        &self,
        email: &str,
        is_verified: bool,
    ) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.email == email)
            .ok_or(AuthError::UserNotFound)?;

        user.is_verified = is_verified;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(AuthError::UserNotFound)?;

        let now = Utc::now();
        user.last_login_at = Some(now);
        user.updated_at = now;
        Ok(())
    }
}

// ============================================
// Refresh tokens
// ============================================

#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;

        if tokens.contains_key(&token.token) {
            return Err(AuthError::AlreadyExists("token"));
        }

        let mut row = token.clone();
        row.is_revoked = false;
        tokens.insert(row.token.clone(), row);
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<RefreshToken, AuthError> {
        self.tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        if let Some(row) = self.tokens.write().await.get_mut(token) {
            row.is_revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let mut revoked = 0;
        for row in self.tokens.write().await.values_mut() {
            if row.user_id == user_id && !row.is_revoked {
                row.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

// ============================================
// Verification codes
// ============================================

#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    codes: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn store(&self, email: &str, code: &str, ttl: Duration) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut codes = self.codes.write().await;

        codes.retain(|_, (_, expires_at)| *expires_at > now);
        codes.insert(email.to_string(), (code.to_string(), now + ttl));
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<String, AuthError> {
        match self.codes.read().await.get(email) {
            Some((code, expires_at)) if *expires_at > Instant::now() => Ok(code.clone()),
            _ => Err(AuthError::OtpNotFound),
        }
    }

    async fn delete(&self, email: &str) -> Result<(), AuthError> {
        self.codes.write().await.remove(email);
        Ok(())
    }

    async fn exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(matches!(
            self.codes.read().await.get(email),
            Some((_, expires_at)) if *expires_at > Instant::now()
        ))
    }
}

// ============================================
// Rate limit counters
// ============================================

#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    counters: RwLock<HashMap<String, (u32, Instant)>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check_rate_limit(&self, key: &str, limit: u32) -> Result<bool, AuthError> {
        let count = match self.counters.read().await.get(key) {
            Some((count, expires_at)) if *expires_at > Instant::now() => *count,
            _ => 0,
        };
        Ok(count < limit)
    }

    async fn increment_counter(&self, key: &str, window: Duration) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut counters = self.counters.write().await;

        // Lapsed windows go away, so a returning key starts fresh
        counters.retain(|_, (_, expires_at)| *expires_at > now);

        let entry = counters.entry(key.to_string()).or_insert((0, now));
        entry.0 += 1;
        if entry.0 == 1 {
            entry.1 = now + window;
        }
        Ok(())
    }
}
