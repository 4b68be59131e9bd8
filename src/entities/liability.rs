//! Liability entity - Loans and other debts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "liabilities";

/// Liability database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "liabilities")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Free-form kind, e.g. `"home_loan"`, `"credit_card"`
    pub liability_type: String,
    /// Amount originally borrowed
    pub principal_amount: f64,
    /// Amount still owed
    pub outstanding_amount: f64,
    /// Monthly instalment
    pub emi: f64,
    /// Annual rate in percent
    pub interest_rate: f64,
    /// Term length in months
    pub tenure_months: Option<i32>,
    /// First day of the term
    pub start_date: Option<Date>,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Liabilities have no modelled relationships
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
