//! Goal entity - Savings targets such as retirement or education funds.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "goals";

/// Relative importance of a goal
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum GoalPriority {
    /// Must be funded first
    #[sea_orm(string_value = "high")]
    High,
    /// Default priority
    #[sea_orm(string_value = "medium")]
    Medium,
    /// Nice to have
    #[sea_orm(string_value = "low")]
    Low,
}

/// Goal database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "goals")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Short description (e.g. "Children's education")
    pub title: String,
    /// Amount needed by `target_year`
    pub target_amount: f64,
    /// Amount saved so far
    pub current_amount: f64,
    /// Year the goal is due
    pub target_year: i32,
    /// Funding priority
    pub priority: GoalPriority,
    /// Whether the goal has been reached
    pub is_completed: bool,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Goals have no modelled relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Saved share of the target, clamped to 0-100.
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 0.0;
        }
        (self.current_amount / self.target_amount * 100.0).clamp(0.0, 100.0)
    }
}

impl super::Record for Model {
    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> Uuid {
        self.user_id
    }
}
