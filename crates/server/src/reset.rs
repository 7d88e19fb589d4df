//! Password-reset token store and lifecycle.
//!
//! Tokens are single-use, short-lived and looked up by the SHA-256 hash of
//! the raw secret. Consumption updates the owning user's credential hash
//! and flips the used flag in the same transaction, so a crash between the
//! two can never leave a reusable token behind a changed password.

use crate::entity::{password_reset_token, user};
use crate::error::AuthError;
use crate::hashing::sha256_hex;
use crate::password::generate_secret;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    SqlErr, TransactionTrait,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone)]
pub struct ResetStore {
    db: Arc<DatabaseConnection>,
}

impl ResetStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Issue a reset token for `user_id`, returning the raw secret.
    ///
    /// The raw value is returned exactly once and never persisted or
    /// logged; only its hash is stored.
    pub async fn issue(&self, user_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let raw = generate_secret();
        let row = password_reset_token::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            token_hash: Set(sha256_hex(&raw)),
            expires_at: Set(OffsetDateTime::now_utc() + ttl),
            used: Set(false),
            created_at: Set(OffsetDateTime::now_utc()),
        };
        row.insert(self.db.as_ref()).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AuthError::IntegrityViolation("reset token hash collision".to_string())
            } else {
                AuthError::Database(e)
            }
        })?;
        Ok(raw)
    }

    /// Consume a reset token, storing `new_password_hash` on its owner.
    ///
    /// Unknown, already-used and expired tokens are all rejected as
    /// `ResetTokenInactive`. The credential update and the used-flag flip
    /// commit together. Returns the updated user.
    pub async fn consume(
        &self,
        raw_token: &str,
        new_password_hash: String,
    ) -> Result<user::Model, AuthError> {
        let hash = sha256_hex(raw_token);
        let txn = self.db.begin().await?;

        let Some(token) = password_reset_token::Entity::find()
            .filter(password_reset_token::Column::TokenHash.eq(&hash))
            .one(&txn)
            .await?
        else {
            tracing::debug!(
                name = "reset.consume.not_found",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "No reset token matches the presented secret"
            );
            return Err(AuthError::ResetTokenInactive);
        };

        if !token.is_active() {
            tracing::debug!(
                name = "reset.consume.inactive",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                used = token.used,
                expired = token.is_expired(),
                message = "Rejected inactive reset token"
            );
            return Err(AuthError::ResetTokenInactive);
        }

        let Some(owner) = user::Entity::find_by_id(&token.user_id).one(&txn).await? else {
            return Err(AuthError::Internal(format!(
                "reset token {} references missing user",
                token.id
            )));
        };

        let mut updated_user: user::ActiveModel = owner.into();
        updated_user.password_hash = Set(new_password_hash);
        let owner = updated_user.update(&txn).await?;

        let mut consumed: password_reset_token::ActiveModel = token.into();
        consumed.used = Set(true);
        consumed.update(&txn).await?;

        txn.commit().await?;
        Ok(owner)
    }
}
