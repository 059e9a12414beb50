//! Authentication HTTP Handlers
//!
//! REST API endpoints for authentication operations.

use crate::error::AuthError;
use crate::extractors::AuthUser;
use crate::middleware;
use crate::models::*;
use crate::service::AuthService;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use validator::Validate;

/// Shared auth service state
pub type AuthState = Arc<AuthService>;

// ============================================
// Route Builder
// ============================================

const ADMIN_ROLES: &[UserRole] = &[UserRole::Admin];
const FINANCE_ROLES: &[UserRole] = &[UserRole::Admin, UserRole::FinanceManager];
const MANAGER_ROLES: &[UserRole] = &[UserRole::Admin, UserRole::Manager];

/// Create the application router
///
/// Every `/api/v1` route is counted by the global limiter; login is also
/// counted by the login limiter. Profile and the staff areas require a bearer
/// access token, and each staff area admits only its roles.
pub fn create_routes(auth_service: Arc<AuthService>) -> Router {
    let timeout = auth_service.config().request_timeout();

    let auth_routes = Router::new()
        .route("/register", post(register))
        .route(
            "/login",
            post(login).route_layer(from_fn_with_state(
                auth_service.clone(),
                middleware::login_rate_limit,
            )),
        )
        .route("/verify-otp", post(verify_otp))
        .route("/refresh-token", post(refresh_token))
        .route("/resend-otp", post(resend_otp))
        .route(
            "/profile",
            get(get_profile).route_layer(from_fn_with_state(
                auth_service.clone(),
                middleware::require_auth,
            )),
        )
        .layer(from_fn_with_state(
            auth_service.clone(),
            middleware::global_rate_limit,
        ));

    let staff_routes = Router::new()
        .route(
            "/api/v1/admin/users",
            get(admin_users).route_layer(from_fn_with_state(ADMIN_ROLES, middleware::require_role)),
        )
        .route(
            "/api/v1/finance/reports",
            get(finance_reports)
                .route_layer(from_fn_with_state(FINANCE_ROLES, middleware::require_role)),
        )
        .route(
            "/api/v1/manager/dashboard",
            get(manager_dashboard)
                .route_layer(from_fn_with_state(MANAGER_ROLES, middleware::require_role)),
        )
        .route_layer(from_fn_with_state(
            auth_service.clone(),
            middleware::require_auth,
        ))
        .layer(from_fn_with_state(
            auth_service.clone(),
            middleware::global_rate_limit,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/auth", auth_routes)
        .merge(staff_routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(auth_service)
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME")
    }))
}

// ============================================
// Registration
// ============================================

/// POST /api/v1/auth/register
///
/// Register a new account; the verification code goes out by mail
pub async fn register(
    State(auth): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let user = auth.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Registration successful. Please verify your email with the OTP sent.",
            "user": UserResponse::from(user)
        })),
    ))
}

/// POST /api/v1/auth/verify-otp
pub async fn verify_otp(
    State(auth): State<AuthState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let expected = auth.config().otp_length;
    if req.code.len() != expected {
        return Err(AuthError::Validation(format!(
            "Code must be {expected} digits"
        )));
    }

    auth.verify_otp(req).await?;

    Ok(Json(MessageResponse::new(
        "Email verified successfully. You can now login.",
    )))
}

/// POST /api/v1/auth/resend-otp
pub async fn resend_otp(
    State(auth): State<AuthState>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    auth.resend_otp(&req.email).await?;

    Ok(Json(MessageResponse::new(
        "OTP sent successfully. Please check your email.",
    )))
}

// ============================================
// Login / Token Refresh
// ============================================

/// POST /api/v1/auth/login
///
/// Authenticate user and return access/refresh tokens
pub async fn login(
    State(auth): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let response = auth.login(req).await?;

    Ok(Json(response))
}

/// POST /api/v1/auth/refresh-token
///
/// Rotate a refresh token into a new token pair
pub async fn refresh_token(
    State(auth): State<AuthState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let response = auth.refresh_tokens(req).await?;

    Ok(Json(response))
}

// ============================================
// User Profile
// ============================================

/// GET /api/v1/auth/profile
pub async fn get_profile(
    State(auth): State<AuthState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AuthError> {
    let user = auth.get_user_by_id(&user.id.to_string()).await?;

    Ok(Json(UserResponse::from(user)))
}

// ============================================
// Staff Areas
// ============================================

/// GET /api/v1/admin/users
pub async fn admin_users(user: AuthUser) -> impl IntoResponse {
    tracing::debug!(user_id = %user.id, "Admin area accessed");
    Json(MessageResponse::new("Admin users endpoint"))
}

/// GET /api/v1/finance/reports
pub async fn finance_reports(user: AuthUser) -> impl IntoResponse {
    tracing::debug!(user_id = %user.id, "Finance area accessed");
    Json(MessageResponse::new("Finance reports endpoint"))
}

/// GET /api/v1/manager/dashboard
pub async fn manager_dashboard(user: AuthUser) -> impl IntoResponse {
    tracing::debug!(user_id = %user.id, "Manager area accessed");
    Json(MessageResponse::new("Manager dashboard endpoint"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::service::AuthDeps;
    use crate::store::{OtpStore, UserStore};
    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const PEER: &str = "198.51.100.1:40000";

    struct TestApp {
        router: Router,
        otps: Arc<dyn OtpStore>,
        users: Arc<dyn UserStore>,
    }

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "router-secret-router-secret-router".to_string(),
            argon2_memory_cost: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..AuthConfig::default()
        }
    }

    fn app_with(config: AuthConfig) -> TestApp {
        let deps = AuthDeps::in_memory(&config).unwrap();
        let otps = deps.otps.clone();
        let users = deps.users.clone();

        TestApp {
            router: create_routes(Arc::new(AuthService::new(config, deps))),
            otps,
            users,
        }
    }

    fn app() -> TestApp {
        app_with(test_config())
    }

    impl TestApp {
        /// Send a request as if it arrived on a socket from `peer`
        async fn call_from(
            &self,
            peer: &str,
            method: Method,
            uri: &str,
            body: Option<Value>,
            headers: &[(&str, &str)],
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();

            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            body: Option<Value>,
            headers: &[(&str, &str)],
        ) -> (StatusCode, Value) {
            self.call_from(PEER, method, uri, body, headers).await
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, Some(body), &[]).await
        }

        async fn get_with_token(&self, uri: &str, token: &str) -> StatusCode {
            let bearer = format!("Bearer {token}");
            self.call(Method::GET, uri, None, &[("Authorization", bearer.as_str())])
                .await
                .0
        }

        /// Register, verify and log in a user with `role`, returning its access token
        async fn access_token_for(&self, email: &str, phone: &str, role: &str) -> String {
            let mut body = registration();
            body["email"] = json!(email);
            body["phone"] = json!(phone);
            body["role"] = json!(role);
            let (status, _) = self.post("/api/v1/auth/register", body).await;
            assert_eq!(status, StatusCode::CREATED);

            self.users
                .update_verification_status(email, true)
                .await
                .unwrap();

            let (status, login) = self
                .post(
                    "/api/v1/auth/login",
                    json!({ "email": email, "password": "Password123" }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            login["access_token"].as_str().unwrap().to_string()
        }
    }

    fn registration() -> Value {
        json!({
            "email": "bilal@example.com",
            "phone": "0300-1234567",
            "password": "Password123",
            "first_name": "Bilal",
            "last_name": "Khan",
            "role": "finance_manager"
        })
    }

    fn credentials() -> Value {
        json!({ "email": "bilal@example.com", "password": "Password123" })
    }

    fn wrong_login() -> Value {
        json!({ "email": "nobody@example.com", "password": "whatever1" })
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = app.call(Method::GET, "/health", None, &[]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_full_account_lifecycle() {
        let app = app();

        let (status, body) = app.post("/api/v1/auth/register", registration()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["phone"], "+923001234567");
        assert_eq!(body["user"]["role"], "finance_manager");
        assert_eq!(body["user"]["is_verified"], false);
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = app.post("/api/v1/auth/login", credentials()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "user_not_verified");

        let code = app.otps.get("bilal@example.com").await.unwrap();
        let (status, _) = app
            .post(
                "/api/v1/auth/verify-otp",
                json!({ "email": "bilal@example.com", "code": code }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, login) = app.post("/api/v1/auth/login", credentials()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["token_type"], "Bearer");
        assert_eq!(login["expires_in"], 900);
        let access = login["access_token"].as_str().unwrap().to_string();
        let refresh = login["refresh_token"].as_str().unwrap().to_string();

        let bearer = format!("Bearer {access}");
        let (status, profile) = app
            .call(
                Method::GET,
                "/api/v1/auth/profile",
                None,
                &[("Authorization", bearer.as_str())],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["email"], "bilal@example.com");
        assert_eq!(profile["is_verified"], true);

        let (status, rotated) = app
            .post(
                "/api/v1/auth/refresh-token",
                json!({ "refresh_token": refresh }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["refresh_token"], json!(refresh));

        let (status, body) = app
            .post(
                "/api/v1/auth/refresh-token",
                json!({ "refresh_token": refresh }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "revoked_token");
    }

    #[tokio::test]
    async fn test_profile_requires_access_token() {
        let app = app();

        let (status, body) = app
            .call(Method::GET, "/api/v1/auth/profile", None, &[])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, body) = app
            .call(
                Method::GET,
                "/api/v1/auth/profile",
                None,
                &[("Authorization", "Bearer not-a-jwt")],
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_refresh_token_cannot_open_profile() {
        let app = app();
        app.post("/api/v1/auth/register", registration()).await;
        app.users
            .update_verification_status("bilal@example.com", true)
            .await
            .unwrap();

        let (_, login) = app.post("/api/v1/auth/login", credentials()).await;
        let refresh = login["refresh_token"].as_str().unwrap().to_string();

        assert_eq!(
            app.get_with_token("/api/v1/auth/profile", &refresh).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_request_validation_errors() {
        let app = app();

        let mut bad_email = registration();
        bad_email["email"] = json!("not-an-email");
        let (status, body) = app.post("/api/v1/auth/register", bad_email).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let mut bad_phone = registration();
        bad_phone["phone"] = json!("+92301234567");
        let (status, body) = app.post("/api/v1/auth/register", bad_phone).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_phone_format");

        let mut bad_role = registration();
        bad_role["role"] = json!("root");
        let (status, body) = app.post("/api/v1/auth/register", bad_role).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_role");

        // Five digits while the configured length is six
        let (status, body) = app
            .post(
                "/api/v1/auth/verify-otp",
                json!({ "email": "bilal@example.com", "code": "12345" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let app = app();
        let (status, _) = app.post("/api/v1/auth/register", registration()).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app.post("/api/v1/auth/register", registration()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_exists");
    }

    #[tokio::test]
    async fn test_resend_otp_while_code_is_live() {
        let app = app();
        app.post("/api/v1/auth/register", registration()).await;

        let (status, body) = app
            .post(
                "/api/v1/auth/resend-otp",
                json!({ "email": "bilal@example.com" }),
            )
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "otp_already_sent");
    }

    // ============================================
    // Rate limiting
    // ============================================

    #[tokio::test]
    async fn test_login_budget_is_per_peer() {
        let app = app();
        let login = "/api/v1/auth/login";

        for _ in 0..5 {
            let (status, _) = app
                .call_from("192.0.2.10:5000", Method::POST, login, Some(wrong_login()), &[])
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, body) = app
            .call_from("192.0.2.10:5001", Method::POST, login, Some(wrong_login()), &[])
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "rate_limited");

        // A different client keeps its own budget
        let (status, _) = app
            .call_from("192.0.2.11:5000", Method::POST, login, Some(wrong_login()), &[])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forwarding_headers_ignored_without_trusted_proxy() {
        let app = app();

        let mut statuses = Vec::new();
        for i in 0..6 {
            let forwarded = format!("203.0.113.{i}");
            let (status, _) = app
                .call_from(
                    "192.0.2.30:5000",
                    Method::POST,
                    "/api/v1/auth/login",
                    Some(wrong_login()),
                    &[("X-Forwarded-For", forwarded.as_str())],
                )
                .await;
            statuses.push(status);
        }

        assert_eq!(statuses[..5], [StatusCode::UNAUTHORIZED; 5]);
        assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_trusted_proxy_keys_on_forwarded_client() {
        let app = app_with(AuthConfig {
            trust_proxy_headers: true,
            ..test_config()
        });
        let proxy = "10.0.0.1:443";
        let login = "/api/v1/auth/login";

        for _ in 0..5 {
            let (status, _) = app
                .call_from(
                    proxy,
                    Method::POST,
                    login,
                    Some(wrong_login()),
                    &[("X-Forwarded-For", "203.0.113.50")],
                )
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, _) = app
            .call_from(
                proxy,
                Method::POST,
                login,
                Some(wrong_login()),
                &[("X-Forwarded-For", "203.0.113.50")],
            )
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        // Another client behind the same proxy is unaffected
        let (status, _) = app
            .call_from(
                proxy,
                Method::POST,
                login,
                Some(wrong_login()),
                &[("X-Forwarded-For", "203.0.113.51")],
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_global_limiter_blocks_eleventh_request() {
        let app = app();
        let peer = "192.0.2.20:6000";
        let body = json!({ "email": "ghost@example.com" });

        for _ in 0..10 {
            let (status, _) = app
                .call_from(peer, Method::POST, "/api/v1/auth/resend-otp", Some(body.clone()), &[])
                .await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        let (status, _) = app
            .call_from(peer, Method::POST, "/api/v1/auth/resend-otp", Some(body), &[])
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        // Health is outside the API limiter
        let (status, _) = app.call_from(peer, Method::GET, "/health", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
    }

    // ============================================
    // Role gating
    // ============================================

    #[tokio::test]
    async fn test_staff_areas_admit_only_their_roles() {
        let app = app();
        let admin = app
            .access_token_for("admin@example.com", "03001111111", "admin")
            .await;
        let finance = app
            .access_token_for("finance@example.com", "03002222222", "finance_manager")
            .await;
        let customer = app
            .access_token_for("customer@example.com", "03003333333", "customer")
            .await;

        for uri in [
            "/api/v1/admin/users",
            "/api/v1/finance/reports",
            "/api/v1/manager/dashboard",
        ] {
            assert_eq!(app.get_with_token(uri, &admin).await, StatusCode::OK, "{uri}");
            assert_eq!(
                app.get_with_token(uri, &customer).await,
                StatusCode::FORBIDDEN,
                "{uri}"
            );
        }

        assert_eq!(
            app.get_with_token("/api/v1/finance/reports", &finance).await,
            StatusCode::OK
        );
        assert_eq!(
            app.get_with_token("/api/v1/manager/dashboard", &finance).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            app.get_with_token("/api/v1/admin/users", &finance).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_staff_areas_require_authentication() {
        let app = app();

        let (status, body) = app
            .call(Method::GET, "/api/v1/admin/users", None, &[])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }
}
