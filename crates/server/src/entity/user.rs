//! User entity - the authenticated principal.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub enabled: bool,
    /// Space-separated role names (e.g. "ROLE_USER ROLE_ADMIN")
    pub roles: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// The capability surface the credential-verification step needs from a
/// principal. Kept to the three facts verification actually consumes.
pub trait Principal {
    fn is_enabled(&self) -> bool;
    fn role_names(&self) -> Vec<String>;
    fn credential_hash(&self) -> &str;
}

impl Principal for Model {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn role_names(&self) -> Vec<String> {
        self.roles_list()
    }

    fn credential_hash(&self) -> &str {
        &self.password_hash
    }
}

impl Model {
    /// Parse role names from the space-separated column.
    pub fn roles_list(&self) -> Vec<String> {
        self.roles.split_whitespace().map(String::from).collect()
    }

    /// Check if the user holds a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles_list().iter().any(|r| r == role)
    }
}
