//! Token-based authentication and session management service.
//!
//! Issues short-lived signed access credentials, manages long-lived
//! refresh sessions with rotate-on-use semantics, and throttles
//! credential-guessing traffic on the sensitive endpoints.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::token::TokenIssuer;

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod entity;
pub mod error;
pub mod hashing;
pub mod password;
pub mod reset;
pub mod session;
pub mod throttle;
pub mod token;

/// Resources shared by every request, attached as an axum Extension.
#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenIssuer,
}
