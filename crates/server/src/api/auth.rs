//! Authentication API endpoints.
//!
//! Provides the auth HTTP surface:
//! - `/register` - Create a new account
//! - `/login` - Exchange credentials for an access/refresh token pair
//! - `/refresh` - Rotate a refresh secret for a fresh pair
//! - `/logout` - Revoke a refresh secret
//! - `/forgot-password` / `/reset-password` - Reset flow
//! - `/me` - Inspect the verified access credential
//!
//! `/login` and `/forgot-password` sit behind the fixed-window throttle.

use crate::AppResources;
use crate::auth::{AuthFlows, ClientContext};
use crate::error::{AuthError, ErrorBody};
use crate::throttle::{GuardedEndpoint, ThrottleGuard, client_ip};
use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const AUTH_TAG: &str = "Auth API";

/// Shared state for the auth endpoints.
#[derive(Clone)]
pub struct AuthApiState {
    pub flows: AuthFlows,
    pub throttle: ThrottleGuard,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    /// Always "Bearer"
    pub token_type: String,
    /// Signed access credential
    pub access_token: String,
    /// Raw refresh secret; store it, it is never shown again
    pub refresh_token: String,
    pub expires_in_seconds: i64,
}

impl From<crate::auth::IssuedTokens> for TokenResponse {
    fn from(tokens: crate::auth::IssuedTokens) -> Self {
        Self {
            token_type: "Bearer".to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in_seconds: tokens.expires_in_seconds,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    pub success: bool,
    /// Raw reset token. Returned directly for development setups;
    /// production deployments deliver it out-of-band instead.
    pub reset_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Subject of the verified credential (username)
    pub username: String,
    pub roles: Vec<String>,
}

/// Request context extractor: user agent plus proxy-aware client IP.
pub struct ClientMeta(pub ClientContext);

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());
        let ip = client_ip(&parts.headers, peer);
        Ok(ClientMeta(ClientContext { user_agent, ip }))
    }
}

/// Axum extractor that validates `Authorization: Bearer <jwt>` headers.
///
/// Verifies the credential against the issuer in `AppResources` and yields
/// its claims. Every failure mode is rejected as the same uniform 401.
pub struct BearerAuth(pub crate::token::AccessClaims);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!(
                    name = "api.auth.missing_resources",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "AppResources not found in extensions"
                );
                AuthError::Internal("AppResources not found in extensions".to_string())
            })?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = match auth_header {
            Some(value) if value.starts_with("Bearer ") => &value[7..],
            _ => return Err(AuthError::TokenInvalid),
        };

        let claims = resources.tokens.verify(token)?;
        Ok(BearerAuth(claims))
    }
}

/// Creates the auth API router.
#[tracing::instrument(skip_all)]
pub fn router(state: AuthApiState) -> OpenApiRouter {
    let guarded = OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(forgot_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            throttle_guard,
        ));

    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(refresh))
        .routes(routes!(logout))
        .routes(routes!(reset_password))
        .routes(routes!(me))
        .merge(guarded)
        .with_state(state)
}

/// Fixed-window throttle applied to the guarded routes.
///
/// Dispatches the window config by request path; the client key is the
/// proxy-aware IP, falling back to a shared bucket when no address is
/// derivable.
async fn throttle_guard(
    State(state): State<AuthApiState>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = if request.uri().path().ends_with("/login") {
        GuardedEndpoint::Login
    } else {
        GuardedEndpoint::ForgotPassword
    };
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let client = client_ip(request.headers(), peer).unwrap_or_else(|| "unknown".to_string());

    match state.throttle.check(endpoint, &client) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[tracing::instrument(skip(state, payload), fields(username = %payload.username))]
#[utoipa::path(
    post,
    path = "/register",
    tag = AUTH_TAG,
    operation_id = "Register",
    summary = "Register a new account",
    description = "Creates an account with the default `ROLE_USER` role. Username and email must both be \
                   unused, and the password must satisfy the strength policy (at least 8 characters with \
                   an uppercase letter, a lowercase letter and a digit).",
    request_body(content = RegisterRequest, description = "Account details"),
    responses(
        (status = 200, description = "Account created", body = ApiMessage),
        (status = 400, description = "Duplicate username/email or weak password", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
async fn register(
    State(state): State<AuthApiState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiMessage>, AuthError> {
    state
        .flows
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok(ApiMessage::ok("user created"))
}

#[tracing::instrument(skip(state, meta, payload), fields(username = %payload.username))]
#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    summary = "Exchange credentials for a token pair",
    description = "Authenticates username and password. On success returns a short-lived access credential \
                   and a raw refresh secret whose hash backs a new session. The refresh secret is shown \
                   exactly once.\n\n\
                   Failures are uniform: unknown accounts, disabled accounts and wrong passwords are \
                   indistinguishable. This endpoint is rate limited per client.",
    request_body(content = LoginRequest, description = "Account credentials"),
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded; see Retry-After", body = ErrorBody)
    )
)]
async fn login(
    State(state): State<AuthApiState>,
    meta: ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let tokens = state
        .flows
        .login(&payload.username, &payload.password, &meta.0)
        .await?;
    Ok(Json(tokens.into()))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/refresh",
    tag = AUTH_TAG,
    operation_id = "Refresh",
    summary = "Rotate a refresh secret",
    description = "Validates the presented refresh secret, revokes it and returns a fresh token pair \
                   (rotate-on-use). A secret that was already rotated, revoked or has expired is rejected; \
                   reuse of a rotated secret is the replay signal this scheme exists to stop.",
    request_body(content = RefreshRequest, description = "The raw refresh secret"),
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Unknown, revoked or expired refresh secret", body = ErrorBody)
    )
)]
async fn refresh(
    State(state): State<AuthApiState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let tokens = state.flows.refresh(&payload.refresh_token).await?;
    Ok(Json(tokens.into()))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Logout",
    summary = "Revoke a refresh secret",
    description = "Revokes the session behind the presented refresh secret. Idempotent: revoking an \
                   unknown or already-revoked secret also succeeds.",
    request_body(content = RefreshRequest, description = "The raw refresh secret"),
    responses(
        (status = 200, description = "Logged out", body = ApiMessage),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
async fn logout(
    State(state): State<AuthApiState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiMessage>, AuthError> {
    state.flows.logout(&payload.refresh_token).await?;
    Ok(ApiMessage::ok("Successfully logged out"))
}

#[tracing::instrument(skip(state, meta, payload), fields(email_len = payload.email.len()))]
#[utoipa::path(
    post,
    path = "/forgot-password",
    tag = AUTH_TAG,
    operation_id = "Forgot Password",
    summary = "Request a password reset token",
    description = "Issues a short-lived single-use reset token for the account behind the email address. \
                   Only the token's hash is stored; the raw value in the response is the only copy.\n\n\
                   This endpoint is rate limited per client.",
    request_body(content = ForgotPasswordRequest, description = "Account email"),
    responses(
        (status = 200, description = "Reset token issued", body = ForgotPasswordResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded; see Retry-After", body = ErrorBody)
    )
)]
async fn forgot_password(
    State(state): State<AuthApiState>,
    meta: ClientMeta,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, AuthError> {
    let reset_token = state.flows.forgot(&payload.email, &meta.0).await?;
    Ok(Json(ForgotPasswordResponse {
        success: true,
        reset_token,
    }))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/reset-password",
    tag = AUTH_TAG,
    operation_id = "Reset Password",
    summary = "Complete a password reset",
    description = "Consumes a reset token and stores the new password. The strength policy is checked \
                   before the token is touched, so a weak password leaves the token usable for another \
                   attempt. A consumed token never works again, even before its expiry.",
    request_body(content = ResetPasswordRequest, description = "Reset token and replacement password"),
    responses(
        (status = 200, description = "Password updated", body = ApiMessage),
        (status = 400, description = "Weak password or invalid/expired token", body = ErrorBody)
    )
)]
async fn reset_password(
    State(state): State<AuthApiState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiMessage>, AuthError> {
    state
        .flows
        .reset(&payload.token, &payload.new_password)
        .await?;
    Ok(ApiMessage::ok("Reset password successful"))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/me",
    tag = AUTH_TAG,
    operation_id = "Me",
    summary = "Inspect the verified access credential",
    description = "Returns the subject and role claims of the presented bearer credential.",
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Verified claims", body = MeResponse),
        (status = 401, description = "Missing, invalid or expired credential", body = ErrorBody)
    )
)]
async fn me(BearerAuth(claims): BearerAuth) -> Json<MeResponse> {
    Json(MeResponse {
        username: claims.sub,
        roles: claims.roles,
    })
}
