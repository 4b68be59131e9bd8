//! Stock holdings.
//!
//! Quantity and prices are entered; investment and current value, profit/loss
//! and its percentage are derived and kept consistent on every update.

use super::{Resource, SortKey, to_json, valuation::{VALUATION_FIELDS, Valuation}};
use crate::{
    entities::{StockModel, stock},
    errors::{Error, Result},
};
use serde::Serialize;
use serde_json::Value;

/// The `stocks` table.
pub struct Stocks;

/// A new holding.
#[derive(Debug, Clone, Serialize)]
pub struct NewStock {
    /// Ticker symbol
    pub symbol: String,
    /// Listed company name
    pub company_name: String,
    /// Exchange of listing
    pub exchange: Option<String>,
    /// Units held
    pub quantity: f64,
    /// Average price paid per unit
    pub average_price: f64,
    /// Latest price per unit
    pub current_price: f64,
}

/// Fields of a holding to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StockPatch {
    /// New ticker symbol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// New listed company name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// New exchange of listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// New units held
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// New average price paid per unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price: Option<f64>,
    /// New latest price per unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
}

fn check_amounts(quantity: Option<f64>, average: Option<f64>, current: Option<f64>) -> Result<()> {
    if quantity.is_some_and(|q| q < 0.0) {
        return Err(Error::validation("quantity cannot be negative"));
    }
    if average.is_some_and(|p| p < 0.0) || current.is_some_and(|p| p < 0.0) {
        return Err(Error::validation("prices cannot be negative"));
    }
    Ok(())
}

impl Resource for Stocks {
    const TABLE: &'static str = stock::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;
    const DERIVED_FIELDS: &'static [&'static str] = VALUATION_FIELDS;

    type Row = StockModel;
    type New = NewStock;
    type Patch = StockPatch;

    fn validate(new: &NewStock) -> Result<()> {
        if new.symbol.trim().is_empty() {
            return Err(Error::validation("stock symbol cannot be empty"));
        }
        check_amounts(
            Some(new.quantity),
            Some(new.average_price),
            Some(new.current_price),
        )
    }

    fn validate_patch(patch: &StockPatch) -> Result<()> {
        if patch.symbol.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("stock symbol cannot be empty"));
        }
        check_amounts(patch.quantity, patch.average_price, patch.current_price)
    }

    fn payload(new: &NewStock) -> Result<Value> {
        let mut row = to_json(new)?;
        Valuation::of_units(new.quantity, new.average_price, new.current_price).write_into(&mut row);
        Ok(row)
    }

    fn derive(row: &mut StockModel) {
        let v = Valuation::of_units(row.quantity, row.average_price, row.current_price);
        row.investment_value = v.investment_value;
        row.current_value = v.current_value;
        row.profit_loss = v.profit_loss;
        row.profit_loss_percentage = v.profit_loss_percentage;
    }
}
