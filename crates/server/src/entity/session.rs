//! Session entity - one outstanding refresh capability.
//!
//! Stores only the SHA-256 hash of the refresh secret, its expiry and the
//! client context captured at creation. Records are never deleted by the
//! core; revocation flips a flag and expiry is a computed predicate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    #[sea_orm(unique)]
    pub refresh_token_hash: String,
    pub expires_at: OffsetDateTime,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub revoked: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if the session has passed its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at < OffsetDateTime::now_utc()
    }

    /// Check if this session has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// A session is active when it is neither revoked nor expired.
    pub fn is_active(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn session(revoked: bool, expires_in: Duration) -> Model {
        let now = OffsetDateTime::now_utc();
        Model {
            id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            refresh_token_hash: "hash".to_string(),
            expires_at: now + expires_in,
            user_agent: None,
            ip_address: None,
            revoked,
            created_at: now,
        }
    }

    #[test]
    fn test_active_session() {
        let s = session(false, Duration::days(7));
        assert!(s.is_active());
        assert!(!s.is_revoked());
        assert!(!s.is_expired());
    }

    #[test]
    fn test_revoked_session_is_inactive_regardless_of_expiry() {
        let s = session(true, Duration::days(7));
        assert!(!s.is_active());
        assert!(s.is_revoked());
        assert!(!s.is_expired());
    }

    #[test]
    fn test_expired_session_is_inactive() {
        let s = session(false, Duration::seconds(-1));
        assert!(!s.is_active());
        assert!(s.is_expired());
    }
}
