//! Mutual fund entity - Fund units valued at net asset value (NAV).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "mutual_funds";

/// Mutual fund database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mutual_funds")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Scheme name
    pub scheme_name: String,
    /// Managing fund house
    pub fund_house: String,
    /// e.g. `"equity"`, `"debt"`, `"hybrid"`
    pub category: Option<String>,
    /// Units held
    pub units: f64,
    /// Average NAV paid per unit
    pub average_nav: f64,
    /// Latest published NAV
    pub current_nav: f64,
    /// `units * average_nav`
    pub investment_value: f64,
    /// `units * current_nav`
    pub current_value: f64,
    /// Current value minus investment
    pub profit_loss: f64,
    /// Profit or loss relative to the investment
    pub profit_loss_percentage: f64,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Mutual funds have no modelled relationships
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
