//! Document entity - Metadata for files kept in the `documents` storage bucket.
//!
//! The bytes live in platform storage under `storage_path`; the row only records
//! where they are and what they are.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "documents";

/// Storage bucket holding document contents
pub const BUCKET: &str = "documents";

/// Document database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Original file name
    pub name: String,
    /// e.g. `"insurance"`, `"tax"`, `"property"`
    pub category: String,
    /// Object path inside [`BUCKET`]
    pub storage_path: String,
    /// Content type of the stored bytes
    pub mime_type: String,
    /// Size in bytes
    pub file_size: i64,
    /// Family member the document belongs to, if any
    pub family_member_id: Option<Uuid>,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Documents have no modelled relationships
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
