use gatekeeper::AppResources;
use gatekeeper::api::{AuthApiState, start_webserver};
use gatekeeper::auth::AuthFlows;
use gatekeeper::config::load_config_or_panic;
use gatekeeper::throttle::ThrottleGuard;
use gatekeeper::token::TokenIssuer;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "gatekeeper=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");

    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Set up SeaORM database connection
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    let jwt = &config.security.jwt;
    let tokens = TokenIssuer::new(&jwt.secret, &jwt.issuer, jwt.access_exp_mins);

    let auth_state = AuthApiState {
        flows: AuthFlows::new(db.clone(), &config, tokens.clone()),
        throttle: ThrottleGuard::new(&config.security.ratelimit),
    };
    let resources = AppResources { db, config, tokens };

    tracing::info!(
        issuer = %resources.config.security.jwt.issuer,
        access_exp_mins = resources.config.security.jwt.access_exp_mins,
        refresh_exp_days = resources.config.security.jwt.refresh_exp_days,
        login_window = resources.config.security.ratelimit.login.window_seconds,
        login_limit = resources.config.security.ratelimit.login.max_requests,
        "auth configuration"
    );

    start_webserver(auth_state, resources).await?;
    Ok(())
}
