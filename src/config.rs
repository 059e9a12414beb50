//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables once, at
//! startup, and handed to the components that need them. Nothing reads the
//! environment at request time.

use crate::error::AuthError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing tokens (from JWT_SECRET env var)
    pub jwt_secret: String,

    /// JWT access token expiration in seconds (from JWT_ACCESS_EXPIRATION env var)
    pub access_token_expiration: i64,

    /// JWT refresh token expiration in seconds (from JWT_REFRESH_EXPIRATION env var)
    pub refresh_token_expiration: i64,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Number of digits in a verification code (from OTP_LENGTH env var)
    pub otp_length: usize,

    /// Verification code lifetime in seconds (from OTP_EXPIRATION env var)
    pub otp_expiration: u64,

    /// Requests allowed per window by the global limiter (from RATE_LIMIT_REQUESTS env var)
    pub rate_limit_requests: u32,

    /// Global limiter window in seconds (from RATE_LIMIT_WINDOW env var)
    pub rate_limit_window: u64,

    /// Login attempts allowed per window and IP (from LOGIN_RATE_LIMIT_REQUESTS env var)
    pub login_rate_limit_requests: u32,

    /// Login limiter window in seconds (from LOGIN_RATE_LIMIT_WINDOW env var)
    pub login_rate_limit_window: u64,

    /// Minimum password length (from MIN_PASSWORD_LENGTH env var)
    pub min_password_length: usize,

    /// Upper bound on a single request in seconds (from REQUEST_TIMEOUT env var)
    pub request_timeout: u64,

    /// Take the client address from the nearest proxy's forwarding headers
    /// instead of the socket peer (from TRUST_PROXY_HEADERS env var)
    pub trust_proxy_headers: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_expiration: 900,     // 15 minutes
            refresh_token_expiration: 604800, // 7 days
            argon2_memory_cost: 19456,        // 19 MiB
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            otp_length: 6,
            otp_expiration: 300, // 5 minutes
            rate_limit_requests: 10,
            rate_limit_window: 60,
            login_rate_limit_requests: 5,
            login_rate_limit_window: 60,
            min_password_length: 8,
            request_timeout: 10,
            trust_proxy_headers: false,
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to the defaults; `JWT_SECRET` has none.
    pub fn from_env() -> Result<Self, AuthError> {
        let defaults = Self::default();

        Ok(Self {
            jwt_secret: env::var("JWT_SECRET").map_err(|_| {
                AuthError::Config("JWT_SECRET environment variable must be set".to_string())
            })?,

            access_token_expiration: env_or("JWT_ACCESS_EXPIRATION", defaults.access_token_expiration),
            refresh_token_expiration: env_or(
                "JWT_REFRESH_EXPIRATION",
                defaults.refresh_token_expiration,
            ),

            argon2_memory_cost: env_or("ARGON2_MEMORY_COST", defaults.argon2_memory_cost),
            argon2_time_cost: env_or("ARGON2_TIME_COST", defaults.argon2_time_cost),
            argon2_parallelism: env_or("ARGON2_PARALLELISM", defaults.argon2_parallelism),

            otp_length: env_or("OTP_LENGTH", defaults.otp_length),
            otp_expiration: env_or("OTP_EXPIRATION", defaults.otp_expiration),

            rate_limit_requests: env_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            rate_limit_window: env_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window),
            login_rate_limit_requests: env_or(
                "LOGIN_RATE_LIMIT_REQUESTS",
                defaults.login_rate_limit_requests,
            ),
            login_rate_limit_window: env_or(
                "LOGIN_RATE_LIMIT_WINDOW",
                defaults.login_rate_limit_window,
            ),

            min_password_length: env_or("MIN_PASSWORD_LENGTH", defaults.min_password_length),
            request_timeout: env_or("REQUEST_TIMEOUT", defaults.request_timeout),
            trust_proxy_headers: env_or("TRUST_PROXY_HEADERS", defaults.trust_proxy_headers),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        if self.access_token_expiration <= 0 {
            return Err(AuthError::Config(
                "JWT_ACCESS_EXPIRATION must be positive".to_string(),
            ));
        }

        if self.refresh_token_expiration <= self.access_token_expiration {
            return Err(AuthError::Config(
                "JWT_REFRESH_EXPIRATION must be greater than JWT_ACCESS_EXPIRATION".to_string(),
            ));
        }

        if !(4..=10).contains(&self.otp_length) {
            return Err(AuthError::Config(
                "OTP_LENGTH must be between 4 and 10".to_string(),
            ));
        }

        if self.otp_expiration == 0 {
            return Err(AuthError::Config("OTP_EXPIRATION must be positive".to_string()));
        }

        if self.rate_limit_requests == 0
            || self.login_rate_limit_requests == 0
            || self.rate_limit_window == 0
            || self.login_rate_limit_window == 0
        {
            return Err(AuthError::Config(
                "Rate limit requests and windows must be positive".to_string(),
            ));
        }

        if self.min_password_length < 8 {
            return Err(AuthError::Config(
                "MIN_PASSWORD_LENGTH must be at least 8".to_string(),
            ));
        }

        Ok(())
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_expiration)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
