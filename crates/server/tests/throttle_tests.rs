//! Throttle guard tests over the production router.
//!
//! The guarded endpoints reject excess requests per client with 429 and a
//! Retry-After; other endpoints and other clients are unaffected.

use axum_test::TestServer;
use gatekeeper::api::{AuthApiState, app_router};
use gatekeeper::auth::AuthFlows;
use gatekeeper::config::{AppConfig, JwtConfig, RateLimitConfig, SecurityConfig, WindowConfig};
use gatekeeper::throttle::ThrottleGuard;
use gatekeeper::token::TokenIssuer;
use gatekeeper::AppResources;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::sync::Arc;

/// Create a test database with the auth tables.
async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            roles TEXT NOT NULL DEFAULT 'ROLE_USER',
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create users table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            refresh_token_hash TEXT NOT NULL UNIQUE,
            expires_at TEXT NOT NULL,
            user_agent TEXT NULL,
            ip_address TEXT NULL,
            revoked INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create sessions table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE password_reset_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            expires_at TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create password_reset_tokens table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE action_logs (
            id TEXT PRIMARY KEY,
            username TEXT NULL,
            method TEXT NOT NULL,
            path TEXT NOT NULL,
            ip TEXT NULL,
            user_agent TEXT NULL,
            status INTEGER NOT NULL,
            success INTEGER NOT NULL DEFAULT 1,
            error_message TEXT NULL,
            msg TEXT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create action_logs table");

    Arc::new(db)
}

/// Server with tight budgets: 3 logins and 2 forgot-password per minute.
async fn create_throttled_server() -> TestServer {
    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        security: SecurityConfig {
            jwt: JwtConfig {
                issuer: "gatekeeper-tests".to_string(),
                secret: "0123456789abcdef0123456789abcdef".to_string(),
                access_exp_mins: 15,
                refresh_exp_days: 7,
                reset_exp_mins: 15,
            },
            ratelimit: RateLimitConfig {
                login: WindowConfig {
                    max_requests: 3,
                    window_seconds: 60,
                },
                forgot_password: WindowConfig {
                    max_requests: 2,
                    window_seconds: 60,
                },
            },
        },
    };

    let db = create_test_db().await;
    let jwt = &config.security.jwt;
    let tokens = TokenIssuer::new(&jwt.secret, &jwt.issuer, jwt.access_exp_mins);
    let auth_state = AuthApiState {
        flows: AuthFlows::new(db.clone(), &config, tokens.clone()),
        throttle: ThrottleGuard::new(&config.security.ratelimit),
    };
    let resources = AppResources {
        db,
        config: Arc::new(config),
        tokens,
    };
    TestServer::new(app_router(auth_state, resources)).expect("create test server")
}

fn forwarded_for(value: &'static str) -> (axum::http::HeaderName, axum::http::HeaderValue) {
    (
        axum::http::HeaderName::from_static("x-forwarded-for"),
        axum::http::HeaderValue::from_static(value),
    )
}

#[tokio::test]
async fn test_login_rejects_excess_requests_with_retry_after() {
    let server = create_throttled_server().await;
    let (name, value) = forwarded_for("1.2.3.4");

    // Failed logins count against the budget too; the first three pass the
    // guard and die on credentials instead.
    for _ in 0..3 {
        let response = server
            .post("/api/auth/login")
            .add_header(name.clone(), value.clone())
            .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
            .await;
        response.assert_status_unauthorized();
    }

    let response = server
        .post("/api/auth/login")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
        .await;
    assert_eq!(response.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);

    let retry_after: i64 = response
        .headers()
        .get(axum::http::header::RETRY_AFTER)
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "too_many_requests");
    assert_eq!(body["retry_after_seconds"], serde_json::json!(retry_after));
}

#[tokio::test]
async fn test_clients_have_independent_budgets() {
    let server = create_throttled_server().await;
    let (name, first) = forwarded_for("1.2.3.4");
    let (_, second) = forwarded_for("5.6.7.8");

    for _ in 0..3 {
        server
            .post("/api/auth/login")
            .add_header(name.clone(), first.clone())
            .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
            .await
            .assert_status_unauthorized();
    }

    // First client is out of budget...
    let response = server
        .post("/api/auth/login")
        .add_header(name.clone(), first.clone())
        .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
        .await;
    assert_eq!(response.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);

    // ...while a different client sails through the guard.
    let response = server
        .post("/api/auth/login")
        .add_header(name.clone(), second.clone())
        .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_guarded_endpoints_have_independent_budgets() {
    let server = create_throttled_server().await;
    let (name, value) = forwarded_for("1.2.3.4");

    // Exhaust the login budget for this client.
    for _ in 0..3 {
        server
            .post("/api/auth/login")
            .add_header(name.clone(), value.clone())
            .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
            .await
            .assert_status_unauthorized();
    }
    let response = server
        .post("/api/auth/login")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({ "username": "nobody", "password": "Wrong999" }))
        .await;
    assert_eq!(response.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);

    // forgot-password has its own window for the same client (budget 2).
    for _ in 0..2 {
        let response = server
            .post("/api/auth/forgot-password")
            .add_header(name.clone(), value.clone())
            .json(&serde_json::json!({ "email": "nobody@x.com" }))
            .await;
        response.assert_status_unauthorized();
    }
    let response = server
        .post("/api/auth/forgot-password")
        .add_header(name.clone(), value.clone())
        .json(&serde_json::json!({ "email": "nobody@x.com" }))
        .await;
    assert_eq!(response.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unguarded_endpoints_are_never_throttled() {
    let server = create_throttled_server().await;
    let (name, value) = forwarded_for("1.2.3.4");

    // Far more requests than any window budget; register is unguarded.
    for i in 0..10 {
        let response = server
            .post("/api/auth/register")
            .add_header(name.clone(), value.clone())
            .json(&serde_json::json!({
                "username": format!("user{i}"),
                "email": format!("user{i}@x.com"),
                "password": "Abcdef12"
            }))
            .await;
        response.assert_status_ok();
    }

    for _ in 0..10 {
        server.get("/healthz").await.assert_status_ok();
    }
}
