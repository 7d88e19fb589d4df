//! API module providing the HTTP surface.
//!
//! This module is organized into submodules:
//! - `auth` - Authentication endpoints (/api/auth/*)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod auth;
pub mod health;
pub mod openapi;

pub use auth::{AUTH_TAG, AuthApiState};
pub use health::MISC_TAG;

use crate::AppResources;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the full application router.
///
/// Factored out of `start_webserver` so integration tests exercise exactly
/// the routing, middleware and extension stack production runs.
pub fn app_router(auth_state: AuthApiState, app_resources: AppResources) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/auth", auth::router(auth_state))
        .routes(routes!(health::health))
        // Attach application resources, CORS and the standard TraceLayer.
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(auth_state, app_resources))]
pub async fn start_webserver(
    auth_state: AuthApiState,
    app_resources: AppResources,
) -> color_eyre::Result<()> {
    let router = app_router(auth_state, app_resources);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!(addr = "0.0.0.0:8080", "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
