//! Loans, credit cards and other amounts owed.

use super::{Resource, SortKey};
use crate::{
    entities::{LiabilityModel, liability},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use serde::Serialize;

/// The `liabilities` table.
pub struct Liabilities;

/// A new liability.
#[derive(Debug, Clone, Serialize)]
pub struct NewLiability {
    /// Display name
    pub name: String,
    /// Kind of liability, e.g. `loan`
    pub liability_type: String,
    /// Amount originally borrowed
    pub principal_amount: f64,
    /// Amount still owed
    pub outstanding_amount: f64,
    /// Monthly instalment
    pub emi: f64,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    /// Term length in months
    pub tenure_months: Option<i32>,
    /// First day of the term
    pub start_date: Option<NaiveDate>,
}

/// Fields of a liability to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiabilityPatch {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New kind of liability, e.g. `loan`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liability_type: Option<String>,
    /// New amount originally borrowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_amount: Option<f64>,
    /// New amount still owed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outstanding_amount: Option<f64>,
    /// New monthly instalment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emi: Option<f64>,
    /// New annual interest rate in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    /// New term length in months
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenure_months: Option<i32>,
    /// New first day of the term
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

impl Resource for Liabilities {
    const TABLE: &'static str = liability::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;

    type Row = LiabilityModel;
    type New = NewLiability;
    type Patch = LiabilityPatch;

    fn validate(new: &NewLiability) -> Result<()> {
        if new.name.trim().is_empty() {
            return Err(Error::validation("liability name cannot be empty"));
        }
        if new.outstanding_amount < 0.0 || new.principal_amount < 0.0 {
            return Err(Error::validation("amounts cannot be negative"));
        }
        Ok(())
    }

    fn validate_patch(patch: &LiabilityPatch) -> Result<()> {
        if patch.name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("liability name cannot be empty"));
        }
        if [patch.outstanding_amount, patch.principal_amount]
            .into_iter()
            .flatten()
            .any(|a| a < 0.0)
        {
            return Err(Error::validation("amounts cannot be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::ResourceApi;
    use crate::test_utils::{new_liability, signed_in_client};

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        let api = ResourceApi::<Liabilities>::new(client);
        let loan = api.create(new_liability("Home loan", 3_000_000.0, 2_400_000.0)).await?;

        let paid = api
            .update(
                loan.id,
                LiabilityPatch {
                    outstanding_amount: Some(2_350_000.0),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(paid.outstanding_amount, 2_350_000.0);
        assert_eq!(paid.principal_amount, loan.principal_amount);
        assert_eq!(paid.emi, loan.emi);
        assert_eq!(paid.name, loan.name);
        Ok(())
    }
}
