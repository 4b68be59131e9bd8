//! Stock entity - Listed equity holdings.
//!
//! Quantity and prices are inputs; `investment_value`, `current_value`,
//! `profit_loss` and `profit_loss_percentage` are derived from them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "stocks";

/// Stock database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stocks")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Ticker symbol
    pub symbol: String,
    /// Listed company name
    pub company_name: String,
    /// Listing exchange, e.g. `"NSE"`
    pub exchange: Option<String>,
    /// Number of shares held
    pub quantity: f64,
    /// Average acquisition price per share
    pub average_price: f64,
    /// Latest market price per share
    pub current_price: f64,
    /// `quantity * average_price`
    pub investment_value: f64,
    /// `quantity * current_price`
    pub current_value: f64,
    /// `current_value - investment_value`
    pub profit_loss: f64,
    /// `profit_loss / investment_value * 100`
    pub profit_loss_percentage: f64,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Stocks have no modelled relationships
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
