//! Insurance policy entity - Life, health and general cover held by the family.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "insurance_policies";

/// Insurance policy database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "insurance_policies")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Name of the policy
    pub policy_name: String,
    /// Insurer
    pub provider: String,
    /// e.g. `"term"`, `"health"`, `"motor"`
    pub policy_type: String,
    /// Insurer's policy number
    pub policy_number: Option<String>,
    /// Cover amount
    pub sum_assured: f64,
    /// Premium per payment
    pub premium_amount: f64,
    /// e.g. `"monthly"`, `"yearly"`
    pub premium_frequency: String,
    /// First day of the term
    pub start_date: Option<Date>,
    /// Last day of the term
    pub end_date: Option<Date>,
    /// Beneficiary
    pub nominee: Option<String>,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Policies have no modelled relationships
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
