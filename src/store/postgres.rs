//! PostgreSQL store implementations
//!
//! Every trait method is a single SQL statement, so each call is atomic on
//! its own. Unique indexes on `users.email` and `users.phone` are the final
//! guard against duplicate registrations. Verification codes and rate-limit
//! counters carry an `expires_at` column that every read filters on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use super::{OtpStore, RateLimitStore, RefreshTokenStore, UserStore};
use crate::error::AuthError;
use crate::models::{RefreshToken, User};

/// Create the auth schema if it does not exist yet
pub async fn run_migrations(db: &PgPool) -> Result<(), AuthError> {
    tracing::info!("Running authentication database migrations");

    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE TYPE user_role AS ENUM ('admin', 'customer', 'finance_manager', 'manager');
        EXCEPTION
            WHEN duplicate_object THEN null;
        END $$;
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email VARCHAR(255) NOT NULL,
            phone VARCHAR(20) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            first_name VARCHAR(100) NOT NULL,
            last_name VARCHAR(100) NOT NULL,
            role user_role NOT NULL,
            is_verified BOOLEAN NOT NULL DEFAULT FALSE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_login_at TIMESTAMPTZ,
            CONSTRAINT users_email_key UNIQUE (email),
            CONSTRAINT users_phone_key UNIQUE (phone)
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_hash VARCHAR(64) NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            is_revoked BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT refresh_tokens_token_hash_key UNIQUE (token_hash)
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);")
        .execute(db)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires ON refresh_tokens(expires_at);",
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS otp_codes (
            email VARCHAR(255) PRIMARY KEY,
            code VARCHAR(16) NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_limit_counters (
            key VARCHAR(255) PRIMARY KEY,
            count INTEGER NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(db)
    .await?;

    tracing::info!("Authentication migrations completed successfully");
    Ok(())
}

/// Map a unique-index violation to `AlreadyExists`, naming the column
fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AuthError::AlreadyExists(conflicting_field(db_err.constraint()));
        }
    }
    AuthError::from(err)
}

/// Column guarded by a unique constraint, from the names `run_migrations` gives them
fn conflicting_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.contains("phone") => "phone",
        Some(name) if name.contains("token") => "token",
        _ => "email",
    }
}

// ============================================
// Users
// ============================================

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: &User) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, phone, password_hash, first_name, last_name, role,
                               is_verified, is_active, created_at, updated_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(user.is_verified)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(&self.db)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn update(&self, user: &User) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                phone = $3,
                password_hash = $4,
                first_name = $5,
                last_name = $6,
                role = $7,
                is_verified = $8,
                is_active = $9,
                last_login_at = $10,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(user.is_verified)
        .bind(user.is_active)
        .bind(user.last_login_at)
        .execute(&self.db)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn update_verification_status(
        &self,
        email: &str,
        is_verified: bool,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET is_verified = $2, updated_at = NOW() WHERE email = $1",
        )
        .bind(email)
        .bind(is_verified)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }
}

// ============================================
// Refresh tokens
// ============================================

/// Only a digest of each token is stored
fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    db: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, is_revoked, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(hash_token(&token.token))
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.db)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<RefreshToken, AuthError> {
        let row: RefreshTokenRow = sqlx::query_as(
            r#"
            SELECT id, user_id, expires_at, is_revoked, created_at
            FROM refresh_tokens WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.db)
        .await?
        .ok_or(AuthError::InvalidToken)?;

        Ok(RefreshToken {
            id: row.id,
            user_id: row.user_id,
            token: token.to_string(),
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            created_at: row.created_at,
        })
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE token_hash = $1")
            .bind(hash_token(token))
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================
// Verification codes
// ============================================

#[derive(Clone)]
pub struct PgOtpStore {
    db: PgPool,
}

impl PgOtpStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn store(&self, email: &str, code: &str, ttl: Duration) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO otp_codes (email, code, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (email) DO UPDATE SET
                code = EXCLUDED.code,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(ttl.as_secs_f64())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get(&self, email: &str) -> Result<String, AuthError> {
        let code: Option<(String,)> =
            sqlx::query_as("SELECT code FROM otp_codes WHERE email = $1 AND expires_at > NOW()")
                .bind(email)
                .fetch_optional(&self.db)
                .await?;

        code.map(|(code,)| code).ok_or(AuthError::OtpNotFound)
    }

    async fn delete(&self, email: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM otp_codes WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn exists(&self, email: &str) -> Result<bool, AuthError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM otp_codes WHERE email = $1 AND expires_at > NOW())",
        )
        .bind(email)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }
}

// ============================================
// Rate limit counters
// ============================================

#[derive(Clone)]
pub struct PgRateLimitStore {
    db: PgPool,
}

impl PgRateLimitStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn check_rate_limit(&self, key: &str, limit: u32) -> Result<bool, AuthError> {
        let count: Option<(i32,)> = sqlx::query_as(
            "SELECT count FROM rate_limit_counters WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        let count = count.map(|(count,)| count).unwrap_or(0);
        Ok(i64::from(count) < i64::from(limit))
    }

    async fn increment_counter(&self, key: &str, window: Duration) -> Result<(), AuthError> {
        // A lapsed row restarts at 1 with a new boundary; live rows keep theirs
        sqlx::query(
            r#"
            INSERT INTO rate_limit_counters (key, count, expires_at)
            VALUES ($1, 1, NOW() + make_interval(secs => $2))
            ON CONFLICT (key) DO UPDATE SET
                count = CASE
                    WHEN rate_limit_counters.expires_at <= NOW() THEN 1
                    ELSE rate_limit_counters.count + 1
                END,
                expires_at = CASE
                    WHEN rate_limit_counters.expires_at <= NOW() THEN EXCLUDED.expires_at
                    ELSE rate_limit_counters.expires_at
                END
            "#,
        )
        .bind(key)
        .bind(window.as_secs_f64())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
