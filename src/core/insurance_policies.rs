//! Insurance policies held by the family.

use super::{Resource, SortKey};
use crate::{
    entities::{InsurancePolicyModel, insurance_policy},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use serde::Serialize;

/// The `insurance_policies` table.
pub struct InsurancePolicies;

/// A new policy.
#[derive(Debug, Clone, Serialize)]
pub struct NewInsurancePolicy {
    /// Name of the policy
    pub policy_name: String,
    /// Insurer
    pub provider: String,
    /// Kind of cover, e.g. `term` or `health`
    pub policy_type: String,
    /// Insurer's policy number
    pub policy_number: Option<String>,
    /// Amount paid out on a claim
    pub sum_assured: f64,
    /// Premium per payment
    pub premium_amount: f64,
    /// How often the premium is due
    pub premium_frequency: String,
    /// First day of the term
    pub start_date: Option<NaiveDate>,
    /// Last day of the term
    pub end_date: Option<NaiveDate>,
    /// Beneficiary
    pub nominee: Option<String>,
}

/// Fields of a policy to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InsurancePolicyPatch {
    /// New name of the policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    /// New insurer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// New kind of cover, e.g. `term` or `health`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    /// New insurer's policy number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    /// New amount paid out on a claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum_assured: Option<f64>,
    /// New premium per payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_amount: Option<f64>,
    /// New how often the premium is due
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_frequency: Option<String>,
    /// New first day of the term
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// New last day of the term
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// New beneficiary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nominee: Option<String>,
}

impl Resource for InsurancePolicies {
    const TABLE: &'static str = insurance_policy::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;

    type Row = InsurancePolicyModel;
    type New = NewInsurancePolicy;
    type Patch = InsurancePolicyPatch;

    fn validate(new: &NewInsurancePolicy) -> Result<()> {
        if new.policy_name.trim().is_empty() {
            return Err(Error::validation("policy name cannot be empty"));
        }
        if let (Some(start), Some(end)) = (new.start_date, new.end_date) {
            if end < start {
                return Err(Error::validation("policy ends before it starts"));
            }
        }
        Ok(())
    }

    fn validate_patch(patch: &InsurancePolicyPatch) -> Result<()> {
        if patch.policy_name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("policy name cannot be empty"));
        }
        if let (Some(start), Some(end)) = (patch.start_date, patch.end_date) {
            if end < start {
                return Err(Error::validation("policy ends before it starts"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::ResourceApi;
    use crate::errors::ErrorKind;
    use crate::test_utils::{new_insurance_policy, signed_in_client};

    #[tokio::test]
    async fn test_end_before_start_is_rejected() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        let mut policy = new_insurance_policy("Term plan");
        policy.start_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        policy.end_date = NaiveDate::from_ymd_opt(2023, 6, 1);

        let err = ResourceApi::<InsurancePolicies>::new(client)
            .create(policy)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }

    #[tokio::test]
    async fn test_newest_policy_listed_first() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        let api = ResourceApi::<InsurancePolicies>::new(client);
        api.create(new_insurance_policy("Health")).await?;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        api.create(new_insurance_policy("Motor")).await?;

        let names: Vec<String> = api.list().await?.into_iter().map(|p| p.policy_name).collect();
        assert_eq!(names, vec!["Motor", "Health"]);
        Ok(())
    }
}
