//! Authentication Service
//!
//! Use-case layer for registration, OTP activation, login, token rotation
//! and OTP resend. It owns no mutable state: every collaborator is injected
//! through [`AuthDeps`] and all coordination between requests happens inside
//! the stores. Steps within one operation are sequential and not
//! transactional.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mailer::{LogMailer, OtpMailer};
use crate::models::*;
use crate::otp::generate_otp;
use crate::password::{Argon2Hasher, PasswordHasher};
use crate::phone;
use crate::rate_limit::{RateLimitIdentity, RateLimitScope, RateLimiter};
use crate::store::memory::{
    MemoryOtpStore, MemoryRateLimitStore, MemoryRefreshTokenStore, MemoryUserStore,
};
use crate::store::postgres::{PgOtpStore, PgRateLimitStore, PgRefreshTokenStore, PgUserStore};
use crate::store::{OtpStore, RateLimitStore, RefreshTokenStore, UserStore};
use crate::token::{JwtTokenIssuer, TokenIssuer};

/// Collaborators the service is built from
#[derive(Clone)]
pub struct AuthDeps {
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub otps: Arc<dyn OtpStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub mailer: Arc<dyn OtpMailer>,
}

impl AuthDeps {
    /// Postgres-backed stores sharing one pool
    pub fn postgres(db: PgPool, config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenStore::new(db.clone())),
            otps: Arc::new(PgOtpStore::new(db.clone())),
            rate_limits: Arc::new(PgRateLimitStore::new(db)),
            tokens: Arc::new(JwtTokenIssuer::from_config(config)),
            hasher: Arc::new(Argon2Hasher::from_config(config)?),
            mailer: Arc::new(LogMailer),
        })
    }

    /// Process-local stores, for tests and single-node setups
    pub fn in_memory(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self {
            users: Arc::new(MemoryUserStore::new()),
            refresh_tokens: Arc::new(MemoryRefreshTokenStore::new()),
            otps: Arc::new(MemoryOtpStore::new()),
            rate_limits: Arc::new(MemoryRateLimitStore::new()),
            tokens: Arc::new(JwtTokenIssuer::from_config(config)),
            hasher: Arc::new(Argon2Hasher::from_config(config)?),
            mailer: Arc::new(LogMailer),
        })
    }
}

/// Authentication service
pub struct AuthService {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    otps: Arc<dyn OtpStore>,
    tokens: Arc<dyn TokenIssuer>,
    hasher: Arc<dyn PasswordHasher>,
    mailer: Arc<dyn OtpMailer>,
    rate_limiter: RateLimiter,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(config: AuthConfig, deps: AuthDeps) -> Self {
        let rate_limiter = RateLimiter::from_config(deps.rate_limits, &config);

        Self {
            config,
            users: deps.users,
            refresh_tokens: deps.refresh_tokens,
            otps: deps.otps,
            tokens: deps.tokens,
            hasher: deps.hasher,
            mailer: deps.mailer,
            rate_limiter,
        }
    }

    /// Get reference to config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ============================================
    // Registration
    // ============================================

    /// Register a new, unverified account and send it a verification code
    ///
    /// If sending the code fails after the user row is written, the user
    /// stays registered without a live code; `resend_otp` recovers it.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AuthError> {
        let phone = phone::canonicalize(&req.phone).ok_or(AuthError::InvalidPhoneFormat)?;
        let role: UserRole = req.role.parse()?;

        if req.password.len() < self.config.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        // Friendlier errors only; the store's unique index is the real guard
        if found(self.users.find_by_email(&req.email).await)? {
            return Err(AuthError::AlreadyExists("email"));
        }
        if found(self.users.find_by_phone(&phone).await)? {
            return Err(AuthError::AlreadyExists("phone"));
        }

        let password_hash = self.hash_password(req.password).await?;

        let user = User::new_unverified(
            req.email,
            phone,
            password_hash,
            req.first_name,
            req.last_name,
            role,
        );
        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");

        self.issue_otp(&user.email).await?;

        Ok(user)
    }

    // ============================================
    // Login
    // ============================================

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password produce the same error after the same
    /// amount of hashing work. Verification is checked before the active flag.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = match self.users.find_by_email(&req.email).await {
            Ok(user) => user,
            Err(AuthError::UserNotFound) => {
                // Burn one hash so the miss costs what a mismatch costs
                if let Err(e) = self.hash_password(req.password).await {
                    tracing::warn!(error = %e, "Decoy hash failed");
                }
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if !self
            .verify_password(user.password_hash.clone(), req.password)
            .await?
        {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_verified {
            return Err(AuthError::UserNotVerified);
        }

        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        let response = self.issue_session(&user).await?;

        if let Err(e) = self.users.update_last_login(user.id).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to update last login");
        }

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(response)
    }

    // ============================================
    // OTP Verification
    // ============================================

    /// Activate an account with the code sent to its email
    ///
    /// A wrong code leaves the stored one untouched and reusable.
    pub async fn verify_otp(&self, req: VerifyOtpRequest) -> Result<(), AuthError> {
        let stored = self.otps.get(&req.email).await?;

        if stored != req.code {
            tracing::debug!(email = %req.email, "OTP mismatch");
            return Err(AuthError::InvalidOtp);
        }

        self.users
            .update_verification_status(&req.email, true)
            .await?;

        if let Err(e) = self.otps.delete(&req.email).await {
            tracing::warn!(email = %req.email, error = %e, "Failed to delete used OTP");
        }

        tracing::info!(email = %req.email, "Email verified");
        Ok(())
    }

    /// Send a fresh code to an unverified account
    ///
    /// Refused while a previous code is still live.
    pub async fn resend_otp(&self, email: &str) -> Result<(), AuthError> {
        let user = self.users.find_by_email(email).await?;

        if user.is_verified {
            return Err(AuthError::AlreadyVerified);
        }

        if self.otps.exists(email).await? {
            return Err(AuthError::OtpAlreadySent);
        }

        self.issue_otp(email).await
    }

    async fn issue_otp(&self, email: &str) -> Result<(), AuthError> {
        let code = generate_otp(self.config.otp_length);
        self.otps.store(email, &code, self.config.otp_ttl()).await?;
        self.mailer.send_otp(email, &code).await
    }

    // ============================================
    // Token Refresh
    // ============================================

    /// Exchange a refresh token for a new pair, revoking the old one
    ///
    /// Revocation and expiry come from the stored row, not the token claims.
    pub async fn refresh_tokens(&self, req: RefreshTokenRequest) -> Result<AuthResponse, AuthError> {
        let claims = self.tokens.validate(&req.refresh_token)?;
        if claims.typ != TokenType::Refresh {
            return Err(AuthError::InvalidToken);
        }

        let stored = self.refresh_tokens.find_by_token(&req.refresh_token).await?;

        if stored.is_revoked {
            tracing::warn!(user_id = %stored.user_id, "Revoked refresh token presented");
            return Err(AuthError::RevokedToken);
        }

        if stored.is_expired() {
            return Err(AuthError::ExpiredToken);
        }

        let user = self.users.find_by_id(claims.sub).await?;

        let access_token = self
            .tokens
            .issue_access_token(user.id, &user.email, user.role)?;
        let refresh_token = self.tokens.issue_refresh_token(user.id)?;

        self.refresh_tokens.revoke(&req.refresh_token).await?;
        self.store_refresh_token(user.id, &refresh_token).await?;

        tracing::debug!(user_id = %user.id, "Refresh token rotated");

        Ok(self.auth_response(access_token, refresh_token, user))
    }

    // ============================================
    // User Lookup
    // ============================================

    /// Get user by ID string; an unparseable ID is reported as not found
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<User, AuthError> {
        let id = Uuid::parse_str(user_id).map_err(|_| AuthError::UserNotFound)?;
        self.users.find_by_id(id).await
    }

    /// Validate a bearer token, accepting only access tokens
    pub fn validate_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.tokens.validate(token)?;
        if claims.typ != TokenType::Access {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Count a request against a limiter, failing with `RateLimited` when over
    pub async fn enforce_rate_limit(
        &self,
        scope: RateLimitScope,
        identity: &RateLimitIdentity,
    ) -> Result<(), AuthError> {
        self.rate_limiter.enforce(scope, identity).await
    }

    // ============================================
    // Helpers
    // ============================================

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing task failed");
                AuthError::Internal
            })?
    }

    async fn verify_password(&self, hash: String, password: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password verification task failed");
                AuthError::Internal
            })?
    }

    async fn issue_session(&self, user: &User) -> Result<AuthResponse, AuthError> {
        let access_token = self
            .tokens
            .issue_access_token(user.id, &user.email, user.role)?;
        let refresh_token = self.tokens.issue_refresh_token(user.id)?;

        self.store_refresh_token(user.id, &refresh_token).await?;

        Ok(self.auth_response(access_token, refresh_token, user.clone()))
    }

    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> Result<(), AuthError> {
        let expires_at = Utc::now() + self.tokens.refresh_token_ttl();
        self.refresh_tokens
            .create(&RefreshToken::new(user_id, token.to_string(), expires_at))
            .await
    }

    fn auth_response(&self, access_token: String, refresh_token: String, user: User) -> AuthResponse {
        AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_ttl().num_seconds(),
            user: UserResponse::from(user),
        }
    }
}

/// Turn a lookup into "does it exist", passing through real failures
fn found(lookup: Result<User, AuthError>) -> Result<bool, AuthError> {
    match lookup {
        Ok(_) => Ok(true),
        Err(AuthError::UserNotFound) => Ok(false),
        Err(e) => Err(e),
    }
}
