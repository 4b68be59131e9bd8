//! Mutual fund holdings, valued from units and NAV.

use super::{Resource, SortKey, to_json, valuation::{VALUATION_FIELDS, Valuation}};
use crate::{
    entities::{MutualFundModel, mutual_fund},
    errors::{Error, Result},
};
use serde::Serialize;
use serde_json::Value;

/// The `mutual_funds` table.
pub struct MutualFunds;

/// A new fund holding.
#[derive(Debug, Clone, Serialize)]
pub struct NewMutualFund {
    /// Scheme name
    pub scheme_name: String,
    /// Managing fund house
    pub fund_house: String,
    /// Grouping shown in the UI
    pub category: Option<String>,
    /// Units held
    pub units: f64,
    /// Average NAV paid per unit
    pub average_nav: f64,
    /// Latest NAV
    pub current_nav: f64,
}

/// Fields of a fund holding to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MutualFundPatch {
    /// New scheme name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_name: Option<String>,
    /// New managing fund house
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund_house: Option<String>,
    /// New grouping shown in the UI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New units held
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<f64>,
    /// New average NAV paid per unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_nav: Option<f64>,
    /// New latest NAV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_nav: Option<f64>,
}

impl Resource for MutualFunds {
    const TABLE: &'static str = mutual_fund::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;
    const DERIVED_FIELDS: &'static [&'static str] = VALUATION_FIELDS;

    type Row = MutualFundModel;
    type New = NewMutualFund;
    type Patch = MutualFundPatch;

    fn validate(new: &NewMutualFund) -> Result<()> {
        if new.scheme_name.trim().is_empty() {
            return Err(Error::validation("scheme name cannot be empty"));
        }
        if new.units < 0.0 || new.average_nav < 0.0 || new.current_nav < 0.0 {
            return Err(Error::validation("units and NAV cannot be negative"));
        }
        Ok(())
    }

    fn validate_patch(patch: &MutualFundPatch) -> Result<()> {
        if patch.scheme_name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("scheme name cannot be empty"));
        }
        if [patch.units, patch.average_nav, patch.current_nav]
            .into_iter()
            .flatten()
            .any(|v| v < 0.0)
        {
            return Err(Error::validation("units and NAV cannot be negative"));
        }
        Ok(())
    }

    fn payload(new: &NewMutualFund) -> Result<Value> {
        let mut row = to_json(new)?;
        Valuation::of_units(new.units, new.average_nav, new.current_nav).write_into(&mut row);
        Ok(row)
    }

    fn derive(row: &mut MutualFundModel) {
        let v = Valuation::of_units(row.units, row.average_nav, row.current_nav);
        row.investment_value = v.investment_value;
        row.current_value = v.current_value;
        row.profit_loss = v.profit_loss;
        row.profit_loss_percentage = v.profit_loss_percentage;
    }
}
