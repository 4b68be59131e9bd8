//! Asset entity - Holdings valued as a whole, such as property, gold or deposits.
//!
//! `profit_loss` and `profit_loss_percentage` are derived from `investment_value`
//! and `current_value` and are recomputed by the client on every write.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "assets";

/// Asset database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name (e.g. "Flat in Pune")
    pub name: String,
    /// Free-form class, e.g. `"real_estate"`, `"gold"`, `"fixed_deposit"`
    pub asset_type: String,
    /// Amount paid in
    pub investment_value: f64,
    /// Latest valuation
    pub current_value: f64,
    /// `current_value - investment_value`
    pub profit_loss: f64,
    /// `profit_loss / investment_value * 100`
    pub profit_loss_percentage: f64,
    /// Date of purchase
    pub purchase_date: Option<Date>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Assets have no modelled relationships
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
