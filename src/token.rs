//! Token issuing and validation
//!
//! Access and refresh tokens are HS256 JWTs signed with a secret injected
//! at construction. Validation fails closed: every rejection reason maps to
//! the same `InvalidToken` so callers never branch on why.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{TokenClaims, TokenType, UserRole};

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

/// Signer/verifier for session tokens
pub trait TokenIssuer: Send + Sync {
    /// Issue a short-lived access token carrying identity and role
    fn issue_access_token(&self, user_id: Uuid, email: &str, role: UserRole)
        -> Result<String, AuthError>;

    /// Issue a long-lived refresh token carrying only the subject
    fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, AuthError>;

    /// Verify signature, algorithm and time claims
    fn validate(&self, token: &str) -> Result<TokenClaims, AuthError>;

    fn access_token_ttl(&self) -> Duration;

    fn refresh_token_ttl(&self) -> Duration;
}

/// HMAC-SHA256 JWT issuer
pub struct JwtTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtTokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::seconds(config.access_token_expiration),
            Duration::seconds(config.refresh_token_expiration),
        )
    }

    fn sign(
        &self,
        user_id: Uuid,
        email: Option<String>,
        role: Option<UserRole>,
        typ: TokenType,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();

        let claims = TokenClaims {
            sub: user_id,
            email,
            role,
            typ,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign token: {:?}", e);
            AuthError::Internal
        })
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: UserRole,
    ) -> Result<String, AuthError> {
        self.sign(
            user_id,
            Some(email.to_string()),
            Some(role),
            TokenType::Access,
            self.access_ttl,
        )
    }

    fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.sign(user_id, None, None, TokenType::Refresh, self.refresh_ttl)
    }

    fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    fn access_token_ttl(&self) -> Duration {
        self.access_ttl
    }

    fn refresh_token_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn issuer() -> JwtTokenIssuer {
        JwtTokenIssuer::new(SECRET, Duration::minutes(15), Duration::days(7))
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let token = issuer
            .issue_access_token(user_id, "a@x.com", UserRole::FinanceManager)
            .unwrap();
        let claims = issuer.validate(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
        assert_eq!(claims.role, Some(UserRole::FinanceManager));
        assert_eq!(claims.typ, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_refresh_token_has_no_identity_claims() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let claims = issuer
            .validate(&issuer.issue_refresh_token(user_id).unwrap())
            .unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.typ, TokenType::Refresh);
        assert!(claims.email.is_none());
        assert!(claims.role.is_none());
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_tokens_minted_together_are_distinct() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let first = issuer.issue_refresh_token(user_id).unwrap();
        let second = issuer.issue_refresh_token(user_id).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let other = JwtTokenIssuer::new(
            "ffffffffffffffffffffffffffffffff",
            Duration::minutes(15),
            Duration::days(7),
        );
        let token = other
            .issue_access_token(Uuid::new_v4(), "a@x.com", UserRole::Admin)
            .unwrap();

        assert_eq!(issuer().validate(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_rejects_spliced_signature() {
        let issuer = issuer();
        let victim = issuer
            .issue_access_token(Uuid::new_v4(), "user@x.com", UserRole::Customer)
            .unwrap();
        let forged = issuer
            .issue_access_token(Uuid::new_v4(), "user@x.com", UserRole::Admin)
            .unwrap();

        let (forged_body, _) = forged.rsplit_once('.').unwrap();
        let (_, victim_sig) = victim.rsplit_once('.').unwrap();
        let spliced = format!("{forged_body}.{victim_sig}");

        assert_eq!(issuer.validate(&spliced).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_rejects_other_algorithms() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            email: None,
            role: None,
            typ: TokenType::Access,
            iat: Utc::now().timestamp(),
            nbf: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(issuer().validate(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_rejects_expired_and_malformed() {
        let expired = JwtTokenIssuer::new(SECRET, Duration::seconds(-120), Duration::days(7));
        let token = expired
            .issue_access_token(Uuid::new_v4(), "a@x.com", UserRole::Customer)
            .unwrap();

        assert_eq!(expired.validate(&token).unwrap_err(), AuthError::InvalidToken);
        assert_eq!(issuer().validate("not.a.jwt").unwrap_err(), AuthError::InvalidToken);
        assert_eq!(issuer().validate("").unwrap_err(), AuthError::InvalidToken);
    }
}
