//! Family member entity - People whose finances are tracked under one owner.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "family_members";

/// Family member database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "family_members")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Relationship to the owner, e.g. `"spouse"`, `"child"`
    pub relationship: String,
    /// Date of birth
    pub date_of_birth: Option<Date>,
    /// Contact email
    pub email: Option<String>,
    /// Contact phone number
    pub phone: Option<String>,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Family members have no modelled relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl super::Record for Model {
    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> Uuid {
        self.user_id
    }
}
