//! Other assets: property, gold, deposits and the like.
//!
//! Unlike stocks and funds these have no unit price; the investment and current
//! value are entered directly and only profit/loss is derived.

use super::{Resource, SortKey, to_json, valuation::Valuation};
use crate::{
    entities::{AssetModel, asset},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// The `assets` table.
pub struct Assets;

/// A new asset.
#[derive(Debug, Clone, Serialize)]
pub struct NewAsset {
    /// Display name
    pub name: String,
    /// Asset class, e.g. `gold` or `real_estate`
    pub asset_type: String,
    /// Amount originally invested
    pub investment_value: f64,
    /// Value today
    pub current_value: f64,
    /// Date of purchase
    pub purchase_date: Option<NaiveDate>,
    /// Free-form notes
    pub notes: Option<String>,
}

/// Fields of an asset to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssetPatch {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New asset class, e.g. `gold` or `real_estate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    /// New amount originally invested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investment_value: Option<f64>,
    /// New value today
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    /// New date of purchase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    /// New free-form notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Resource for Assets {
    const TABLE: &'static str = asset::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;
    const DERIVED_FIELDS: &'static [&'static str] = &["profit_loss", "profit_loss_percentage"];

    type Row = AssetModel;
    type New = NewAsset;
    type Patch = AssetPatch;

    fn validate(new: &NewAsset) -> Result<()> {
        if new.name.trim().is_empty() {
            return Err(Error::validation("asset name cannot be empty"));
        }
        Ok(())
    }

    fn validate_patch(patch: &AssetPatch) -> Result<()> {
        if patch.name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("asset name cannot be empty"));
        }
        Ok(())
    }

    fn payload(new: &NewAsset) -> Result<Value> {
        let mut row = to_json(new)?;
        Valuation::new(new.investment_value, new.current_value).write_into(&mut row);
        Ok(row)
    }

    fn derive(row: &mut AssetModel) {
        let v = Valuation::new(row.investment_value, row.current_value);
        row.profit_loss = v.profit_loss;
        row.profit_loss_percentage = v.profit_loss_percentage;
    }
}
