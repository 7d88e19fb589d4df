//! Refresh-session store and lifecycle.
//!
//! Sessions are looked up exclusively by the SHA-256 hash of their refresh
//! secret. State transitions are create → active → revoked; expiry is a
//! computed predicate, not a stored state. Rotation (revoke old, create
//! replacement) runs inside a single transaction so no concurrent
//! validation can observe both secrets active.

use crate::entity::session;
use crate::error::AuthError;
use crate::hashing::sha256_hex;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    SqlErr, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<DatabaseConnection>,
}

impl SessionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Persist a new active session for `user_id`.
    ///
    /// Only the hash of `raw_secret` is stored. A hash collision with an
    /// existing record trips the unique index and is surfaced as an
    /// integrity violation; with 256-bit secrets this is not a recoverable
    /// condition.
    pub async fn create(
        &self,
        user_id: &str,
        raw_secret: &str,
        expires_at: OffsetDateTime,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<session::Model, AuthError> {
        insert_session(
            self.db.as_ref(),
            user_id,
            raw_secret,
            expires_at,
            user_agent,
            ip_address,
        )
        .await
    }

    /// Validate that a raw refresh secret corresponds to an active session.
    ///
    /// Unknown, revoked and expired secrets are all rejected as
    /// `SessionInactive`; the precise reason only reaches the log.
    pub async fn validate_active(&self, raw_secret: &str) -> Result<session::Model, AuthError> {
        let hash = sha256_hex(raw_secret);
        let Some(found) = session::Entity::find()
            .filter(session::Column::RefreshTokenHash.eq(&hash))
            .one(self.db.as_ref())
            .await?
        else {
            tracing::debug!(
                name = "session.validate.not_found",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "No session matches the presented refresh secret"
            );
            return Err(AuthError::SessionInactive);
        };
        ensure_active(&found)?;
        Ok(found)
    }

    /// Revoke the session matching a raw refresh secret.
    ///
    /// Idempotent: revoking an unknown or already-revoked secret is a no-op.
    pub async fn revoke(&self, raw_secret: &str) -> Result<(), AuthError> {
        let hash = sha256_hex(raw_secret);
        if let Some(found) = session::Entity::find()
            .filter(session::Column::RefreshTokenHash.eq(&hash))
            .one(self.db.as_ref())
            .await?
        {
            if !found.revoked {
                let mut active: session::ActiveModel = found.into();
                active.revoked = Set(true);
                active.update(self.db.as_ref()).await?;
            }
        }
        Ok(())
    }

    /// Rotate a refresh secret: validate the old one as active, revoke it
    /// and create its replacement in one transaction.
    ///
    /// The replacement carries forward the old session's user-agent and IP
    /// (the context the session was issued under, not the refreshing
    /// request's). Returns the old session (pre-revocation snapshot) and
    /// the new one.
    pub async fn rotate(
        &self,
        raw_secret: &str,
        new_raw_secret: &str,
        new_expires_at: OffsetDateTime,
    ) -> Result<(session::Model, session::Model), AuthError> {
        let hash = sha256_hex(raw_secret);
        let txn = self.db.begin().await?;

        let Some(old) = session::Entity::find()
            .filter(session::Column::RefreshTokenHash.eq(&hash))
            .one(&txn)
            .await?
        else {
            tracing::debug!(
                name = "session.rotate.not_found",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "No session matches the presented refresh secret"
            );
            return Err(AuthError::SessionInactive);
        };
        ensure_active(&old)?;

        let mut revoked: session::ActiveModel = old.clone().into();
        revoked.revoked = Set(true);
        revoked.update(&txn).await?;

        let replacement = insert_session(
            &txn,
            &old.user_id,
            new_raw_secret,
            new_expires_at,
            old.user_agent.clone(),
            old.ip_address.clone(),
        )
        .await?;

        txn.commit().await?;
        Ok((old, replacement))
    }
}

fn ensure_active(found: &session::Model) -> Result<(), AuthError> {
    if found.is_active() {
        return Ok(());
    }
    // Revoked vs expired matters for diagnostics only; callers see one error.
    tracing::debug!(
        name = "session.validate.inactive",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        revoked = found.is_revoked(),
        expired = found.is_expired(),
        message = "Rejected inactive session"
    );
    Err(AuthError::SessionInactive)
}

async fn insert_session<C: sea_orm::ConnectionTrait>(
    conn: &C,
    user_id: &str,
    raw_secret: &str,
    expires_at: OffsetDateTime,
    user_agent: Option<String>,
    ip_address: Option<String>,
) -> Result<session::Model, AuthError> {
    let row = session::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        refresh_token_hash: Set(sha256_hex(raw_secret)),
        expires_at: Set(expires_at),
        user_agent: Set(user_agent),
        ip_address: Set(ip_address),
        revoked: Set(false),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    row.insert(conn).await.map_err(|e| {
        if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            AuthError::IntegrityViolation("refresh secret hash collision".to_string())
        } else {
            AuthError::Database(e)
        }
    })
}
