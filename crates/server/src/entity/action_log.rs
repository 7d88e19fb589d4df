//! Audit log entity - one record per security-relevant action outcome.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "action_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Acting principal, if known (null for anonymous/failed lookups)
    pub username: Option<String>,
    /// HTTP method, or "APP" for non-HTTP application events
    pub method: String,
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: i32,
    pub success: bool,
    /// Error text, masked before persistence
    pub error_message: Option<String>,
    pub msg: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
