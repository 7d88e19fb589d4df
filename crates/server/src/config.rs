use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub security: SecurityConfig,
}

#[derive(Debug, Deserialize)]
pub struct SecurityConfig {
    pub jwt: JwtConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
}

#[derive(Debug, Deserialize)]
pub struct JwtConfig {
    /// Issuer identity embedded in every credential ("iss" claim)
    pub issuer: String,
    /// Symmetric HS256 signing key; must carry at least 256 bits of entropy
    pub secret: String,
    /// Access credential lifetime (minutes)
    #[serde(default = "default_access_exp_mins")]
    pub access_exp_mins: i64,
    /// Refresh session lifetime (days)
    #[serde(default = "default_refresh_exp_days")]
    pub refresh_exp_days: i64,
    /// Password reset token lifetime (minutes)
    #[serde(default = "default_reset_exp_mins")]
    pub reset_exp_mins: i64,
}

/// Fixed-window limits for the two guarded endpoints, independently tunable.
#[derive(Debug, Default, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub login: WindowConfig,
    #[serde(default)]
    pub forgot_password: WindowConfig,
}

/// One fixed rate-limit window: request budget and window length.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

fn default_access_exp_mins() -> i64 {
    15
}

fn default_refresh_exp_days() -> i64 {
    7
}

fn default_reset_exp_mins() -> i64 {
    15
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_seconds() -> u32 {
    60
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `SECURITY__JWT__SECRET`) overrides
/// the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how
/// to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    let jwt = &app.security.jwt;
    if jwt.secret.len() < 32 {
        return Err(ConfigError::Validation(
            "security.jwt.secret must be at least 32 characters".into(),
        ));
    }
    if jwt.issuer.is_empty() {
        return Err(ConfigError::Validation(
            "security.jwt.issuer must not be empty".into(),
        ));
    }
    if jwt.access_exp_mins < 1 || jwt.refresh_exp_days < 1 || jwt.reset_exp_mins < 1 {
        return Err(ConfigError::Validation(
            "security.jwt lifetimes must be >= 1".into(),
        ));
    }
    for (name, window) in [
        ("login", &app.security.ratelimit.login),
        ("forgot_password", &app.security.ratelimit.forgot_password),
    ] {
        if window.max_requests < 1 || window.window_seconds < 1 {
            return Err(ConfigError::Validation(format!(
                "security.ratelimit.{name} parameters must be >= 1"
            )));
        }
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
