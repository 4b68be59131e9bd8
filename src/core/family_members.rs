//! Family members that documents and policies can be attributed to.

use super::{Resource, SortKey};
use crate::{
    entities::{FamilyMemberModel, family_member},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use serde::Serialize;

/// The `family_members` table.
pub struct FamilyMembers;

/// A new family member.
#[derive(Debug, Clone, Serialize)]
pub struct NewFamilyMember {
    /// Display name
    pub name: String,
    /// Relationship to the account owner
    pub relationship: String,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Contact email
    pub email: Option<String>,
    /// Contact phone number
    pub phone: Option<String>,
}

/// Fields of a family member to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FamilyMemberPatch {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New relationship to the account owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    /// New date of birth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    /// New contact email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New contact phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Resource for FamilyMembers {
    const TABLE: &'static str = family_member::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;

    type Row = FamilyMemberModel;
    type New = NewFamilyMember;
    type Patch = FamilyMemberPatch;

    fn validate(new: &NewFamilyMember) -> Result<()> {
        if new.name.trim().is_empty() {
            return Err(Error::validation("name cannot be empty"));
        }
        if new.email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(Error::validation(format!("invalid email: {:?}", new.email)));
        }
        Ok(())
    }

    fn validate_patch(patch: &FamilyMemberPatch) -> Result<()> {
        if patch.name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("name cannot be empty"));
        }
        if patch.email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(Error::validation(format!("invalid email: {:?}", patch.email)));
        }
        Ok(())
    }
}
