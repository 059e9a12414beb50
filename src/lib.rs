//! ERP Authentication Service
//!
//! Account lifecycle for the ERP backend:
//! - Registration with Pakistani mobile number normalization
//! - Email verification with one-time codes
//! - Login with Argon2id password hashing
//! - JWT access tokens and rotating refresh tokens
//! - Fixed-window rate limiting, globally and on login
//!
//! # Configuration
//!
//! [`AuthConfig::from_env`] reads the service settings:
//! - `JWT_SECRET` - Secret key for signing JWTs (required, min 32 chars)
//! - `JWT_ACCESS_EXPIRATION` - Access token expiration in seconds (default: 900)
//! - `JWT_REFRESH_EXPIRATION` - Refresh token expiration in seconds (default: 604800)
//! - `OTP_LENGTH` / `OTP_EXPIRATION` - Verification code digits and TTL (default: 6 / 300)
//! - `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_WINDOW` - Global limiter (default: 10 / 60)
//! - `LOGIN_RATE_LIMIT_REQUESTS` / `LOGIN_RATE_LIMIT_WINDOW` - Login limiter (default: 5 / 60)
//!
//! # Usage
//!
//! ```rust,ignore
//! use erp_auth::{create_routes, AuthConfig, AuthDeps, AuthService};
//!
//! let config = AuthConfig::from_env()?;
//! config.validate()?;
//!
//! let deps = AuthDeps::postgres(pool, &config)?;
//! let service = Arc::new(AuthService::new(config, deps));
//! let app = create_routes(service);
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod otp;
pub mod password;
pub mod phone;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use config::AuthConfig;
pub use error::AuthError;
pub use extractors::{AuthUser, ClientInfo};
pub use handlers::{create_routes, AuthState};
pub use mailer::{LogMailer, OtpMailer};
pub use models::*;
pub use password::{Argon2Hasher, PasswordHasher};
pub use rate_limit::{RateLimitIdentity, RateLimitScope};
pub use service::{AuthDeps, AuthService};
pub use store::postgres::run_migrations;
pub use token::{JwtTokenIssuer, TokenIssuer};
