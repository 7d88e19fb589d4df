//! Authentication workflow orchestration.
//!
//! Composes the password capability, credential issuer, session store and
//! reset store into the register/login/refresh/logout/forgot/reset flows,
//! emitting an audit event for each outcome. Flow-level rules live here
//! (identity uniqueness, strength policy, uniform credential errors); the
//! stores stay policy-free.

use crate::audit::{AuditEvent, AuditSink};
use crate::config::AppConfig;
use crate::entity::user::{self, Principal};
use crate::error::AuthError;
use crate::password::{self, StrengthPolicy};
use crate::reset::ResetStore;
use crate::session::SessionStore;
use crate::token::TokenIssuer;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Role granted to every newly registered account.
pub const DEFAULT_ROLE: &str = "ROLE_USER";

/// The pair of credentials handed out by login and refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    /// Raw refresh secret; the only copy that will ever exist
    pub refresh_token: String,
    pub expires_in_seconds: i64,
}

/// Client context captured from the request, carried into sessions and
/// audit events.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

#[derive(Clone)]
pub struct AuthFlows {
    db: Arc<DatabaseConnection>,
    sessions: SessionStore,
    resets: ResetStore,
    tokens: TokenIssuer,
    audit: AuditSink,
    policy: StrengthPolicy,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl AuthFlows {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig, tokens: TokenIssuer) -> Self {
        Self {
            sessions: SessionStore::new(db.clone()),
            resets: ResetStore::new(db.clone()),
            audit: AuditSink::new(db.clone()),
            db,
            tokens,
            policy: password::default_strength_policy,
            refresh_ttl: Duration::days(config.security.jwt.refresh_exp_days),
            reset_ttl: Duration::minutes(config.security.jwt.reset_exp_mins),
        }
    }

    /// Swap the password-strength predicate.
    pub fn with_strength_policy(mut self, policy: StrengthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a new account with the default role.
    ///
    /// Username and email uniqueness are checked independently so the
    /// caller learns which one collided.
    #[tracing::instrument(skip_all, fields(username = %username))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        raw_password: &str,
    ) -> Result<user::Model, AuthError> {
        if user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateIdentity("username"));
        }
        if user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateIdentity("email"));
        }
        if !(self.policy)(raw_password) {
            return Err(AuthError::WeakPassword);
        }

        let password_hash = password::hash_password(raw_password)
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
        let row = user::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            enabled: Set(true),
            roles: Set(DEFAULT_ROLE.to_string()),
            created_at: Set(OffsetDateTime::now_utc()),
        };
        let created = row.insert(self.db.as_ref()).await?;

        self.audit
            .record(
                AuditEvent::success("User registered", "/api/auth/register").actor(username),
            )
            .await;
        Ok(created)
    }

    /// Authenticate and hand out a fresh credential pair.
    ///
    /// Unknown user, disabled account and wrong password are
    /// indistinguishable to the caller; the failure is audited and the
    /// authentication error propagated unchanged.
    #[tracing::instrument(skip(self, raw_password, ctx), fields(username = %username))]
    pub async fn login(
        &self,
        username: &str,
        raw_password: &str,
        ctx: &ClientContext,
    ) -> Result<IssuedTokens, AuthError> {
        self.audit
            .record(
                AuditEvent::success("Login attempt", "/api/auth/login")
                    .actor(username)
                    .ip(ctx.ip.as_deref()),
            )
            .await;

        let result = self.authenticate(username, raw_password).await;
        let principal = match result {
            Ok(principal) => principal,
            Err(e) => {
                self.audit
                    .record(
                        AuditEvent::failure("Login failed", "/api/auth/login")
                            .actor(username)
                            .ip(ctx.ip.as_deref())
                            .user_agent(ctx.user_agent.as_deref())
                            .error(&e.to_string()),
                    )
                    .await;
                return Err(e);
            }
        };

        let access_token = self
            .tokens
            .issue(&principal.username, principal.roles_list())?;
        let refresh_token = password::generate_secret();
        self.sessions
            .create(
                &principal.id,
                &refresh_token,
                OffsetDateTime::now_utc() + self.refresh_ttl,
                ctx.user_agent.clone(),
                ctx.ip.clone(),
            )
            .await?;

        self.audit
            .record(
                AuditEvent::success("Login success", "/api/auth/login")
                    .actor(&principal.username)
                    .ip(ctx.ip.as_deref())
                    .user_agent(ctx.user_agent.as_deref()),
            )
            .await;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in_seconds: self.tokens.access_ttl_secs(),
        })
    }

    async fn authenticate(
        &self,
        username: &str,
        raw_password: &str,
    ) -> Result<user::Model, AuthError> {
        let Some(principal) = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?
        else {
            return Err(AuthError::InvalidCredentials);
        };
        verify_principal(&principal, raw_password)?;
        Ok(principal)
    }

    /// Rotate a refresh secret and mint a new access credential.
    ///
    /// Rotate-on-use: once this succeeds, the old secret validates as
    /// inactive and only the returned one works. Role claims are read
    /// fresh from the principal, not replayed from the old credential.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        let new_refresh = password::generate_secret();
        let (old_session, _) = self
            .sessions
            .rotate(
                raw_refresh_token,
                &new_refresh,
                OffsetDateTime::now_utc() + self.refresh_ttl,
            )
            .await?;

        let Some(principal) = user::Entity::find_by_id(&old_session.user_id)
            .one(self.db.as_ref())
            .await?
        else {
            return Err(AuthError::Internal(format!(
                "session {} references missing user",
                old_session.id
            )));
        };

        let access_token = self
            .tokens
            .issue(&principal.username, principal.roles_list())?;

        self.audit
            .record(
                AuditEvent::success("Token refreshed", "/api/auth/refresh")
                    .actor(&principal.username)
                    .ip(old_session.ip_address.as_deref()),
            )
            .await;

        Ok(IssuedTokens {
            access_token,
            refresh_token: new_refresh,
            expires_in_seconds: self.tokens.access_ttl_secs(),
        })
    }

    /// Revoke a refresh secret. Idempotent; always succeeds for the caller.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, raw_refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(raw_refresh_token).await?;
        self.audit
            .record(AuditEvent::success("Logged out", "/api/auth/logout"))
            .await;
        Ok(())
    }

    /// Issue a password-reset token for the account behind `email`.
    ///
    /// An unknown email is reported as the same uniform credentials error
    /// the login flow uses, so the endpoint does not confirm which
    /// addresses have accounts.
    #[tracing::instrument(skip(self, ctx), fields(email_len = email.len()))]
    pub async fn forgot(&self, email: &str, ctx: &ClientContext) -> Result<String, AuthError> {
        let Some(principal) = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?
        else {
            self.audit
                .record(
                    AuditEvent::failure("Password reset requested", "/api/auth/forgot-password")
                        .ip(ctx.ip.as_deref())
                        .error("no account for presented email"),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        };

        let raw_token = self.resets.issue(&principal.id, self.reset_ttl).await?;

        self.audit
            .record(
                AuditEvent::success("Password reset requested", "/api/auth/forgot-password")
                    .actor(&principal.username)
                    .ip(ctx.ip.as_deref()),
            )
            .await;
        Ok(raw_token)
    }

    /// Complete a password reset.
    ///
    /// The strength policy runs before the token is touched, so a weak
    /// replacement password leaves the token active for another attempt.
    #[tracing::instrument(skip_all)]
    pub async fn reset(&self, raw_token: &str, new_password: &str) -> Result<(), AuthError> {
        if !(self.policy)(new_password) {
            return Err(AuthError::WeakPassword);
        }
        let password_hash = password::hash_password(new_password)
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
        let principal = self.resets.consume(raw_token, password_hash).await?;

        self.audit
            .record(
                AuditEvent::success("Password reset", "/api/auth/reset-password")
                    .actor(&principal.username),
            )
            .await;
        Ok(())
    }
}

/// Check an authenticating principal against a presented password.
///
/// Disabled accounts and wrong passwords fail identically; the caller must
/// not be able to tell them apart.
fn verify_principal(principal: &impl Principal, raw_password: &str) -> Result<(), AuthError> {
    if !principal.is_enabled() {
        return Err(AuthError::InvalidCredentials);
    }
    if !password::verify_password(raw_password, principal.credential_hash()) {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}
