//! Savings goals, listed by target year, soonest first.

use super::{Resource, SortKey};
use crate::{
    entities::{GoalModel, GoalPriority, goal},
    errors::{Error, Result},
};
use serde::Serialize;

/// The `goals` table.
pub struct Goals;

/// A new goal.
#[derive(Debug, Clone, Serialize)]
pub struct NewGoal {
    /// Short description
    pub title: String,
    /// Amount to reach
    pub target_amount: f64,
    /// Amount saved so far
    pub current_amount: f64,
    /// Year the goal is due
    pub target_year: i32,
    /// Funding priority
    pub priority: GoalPriority,
    /// Whether the goal has been reached
    pub is_completed: bool,
}

/// Fields of a goal to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoalPatch {
    /// New short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New amount to reach
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<f64>,
    /// New amount saved so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_amount: Option<f64>,
    /// New year the goal is due
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_year: Option<i32>,
    /// New funding priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<GoalPriority>,
    /// New whether the goal has been reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
}

impl Resource for Goals {
    const TABLE: &'static str = goal::TABLE;
    const SORT: SortKey = SortKey::asc("target_year");

    type Row = GoalModel;
    type New = NewGoal;
    type Patch = GoalPatch;

    fn validate(new: &NewGoal) -> Result<()> {
        if new.title.trim().is_empty() {
            return Err(Error::validation("goal title cannot be empty"));
        }
        if new.target_amount <= 0.0 {
            return Err(Error::validation("target amount must be positive"));
        }
        Ok(())
    }

    fn validate_patch(patch: &GoalPatch) -> Result<()> {
        if patch.title.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("goal title cannot be empty"));
        }
        if patch.target_amount.is_some_and(|a| a <= 0.0) {
            return Err(Error::validation("target amount must be positive"));
        }
        Ok(())
    }
}
