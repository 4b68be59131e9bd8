//! Transaction ledger.
//!
//! Entries are listed newest trade date first. When a new entry leaves
//! `total_amount` out, it is computed from quantity, unit price, fee and tax with
//! [`compute_total`].

use super::{Resource, SortKey, to_json};
use crate::{
    entities::{
        TransactionKind, TransactionModel,
        transaction::{self, compute_total},
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// The `transactions` table.
pub struct Transactions;

/// A new ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    /// What kind of transaction this is
    pub transaction_type: TransactionKind,
    /// Asset class the entry applies to, e.g. `stock`
    pub asset_type: String,
    /// Holding the transaction belongs to
    pub asset_id: Option<Uuid>,
    /// Name of the traded asset
    pub asset_name: String,
    /// Units traded
    pub quantity: f64,
    /// Price per unit
    pub price_per_unit: f64,
    /// Computed from the other amounts when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    /// Brokerage and other fees
    pub fee: f64,
    /// Taxes charged
    pub tax: f64,
    /// Trade date
    pub transaction_date: NaiveDate,
    /// Free-form notes
    pub notes: Option<String>,
}

/// Fields of a ledger entry to change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionPatch {
    /// New what kind of transaction this is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionKind>,
    /// New asset class, e.g. `gold` or `real_estate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    /// New holding the transaction belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<Uuid>,
    /// New name of the traded asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,
    /// New units traded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// New price per unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<f64>,
    /// New cash effect of the transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    /// New brokerage and other fees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    /// New taxes charged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax: Option<f64>,
    /// New trade date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<NaiveDate>,
    /// New free-form notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewTransaction {
    /// The total this entry will be stored with.
    #[must_use]
    pub fn resolved_total(&self) -> f64 {
        self.total_amount.unwrap_or_else(|| {
            compute_total(
                self.transaction_type,
                self.quantity,
                self.price_per_unit,
                self.fee,
                self.tax,
            )
        })
    }
}

impl Resource for Transactions {
    const TABLE: &'static str = transaction::TABLE;
    const SORT: SortKey = SortKey::desc("transaction_date");

    type Row = TransactionModel;
    type New = NewTransaction;
    type Patch = TransactionPatch;

    fn validate(new: &NewTransaction) -> Result<()> {
        if new.asset_name.trim().is_empty() {
            return Err(Error::validation("asset name cannot be empty"));
        }
        if new.quantity < 0.0 || new.price_per_unit < 0.0 {
            return Err(Error::validation("quantity and price cannot be negative"));
        }
        if new.fee < 0.0 || new.tax < 0.0 {
            return Err(Error::validation("fee and tax cannot be negative"));
        }
        Ok(())
    }

    fn validate_patch(patch: &TransactionPatch) -> Result<()> {
        if patch.asset_name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("asset name cannot be empty"));
        }
        if [patch.quantity, patch.price_per_unit]
            .into_iter()
            .flatten()
            .any(|v| v < 0.0)
        {
            return Err(Error::validation("quantity and price cannot be negative"));
        }
        if [patch.fee, patch.tax].into_iter().flatten().any(|v| v < 0.0) {
            return Err(Error::validation("fee and tax cannot be negative"));
        }
        Ok(())
    }

    fn payload(new: &NewTransaction) -> Result<Value> {
        let mut row = to_json(new)?;
        if let Value::Object(fields) = &mut row {
            fields.insert("total_amount".to_string(), new.resolved_total().into());
        }
        Ok(row)
    }
}
