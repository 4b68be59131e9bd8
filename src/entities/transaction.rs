//! Transaction entity - Investment ledger entries.
//!
//! Each row records a buy, sell, dividend, deposit, withdrawal or transfer against an
//! asset, with quantity, unit price, fees and taxes. `total_amount` is expected to
//! reconcile with `quantity * price_per_unit` adjusted by fee and tax; see
//! [`compute_total`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Table name on the platform
pub const TABLE: &str = "transactions";

/// Kind of ledger entry
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Units acquired; fee and tax add to the cash outlay
    #[sea_orm(string_value = "buy")]
    Buy,
    /// Units disposed; fee and tax reduce the proceeds
    #[sea_orm(string_value = "sell")]
    Sell,
    /// Income paid by a holding
    #[sea_orm(string_value = "dividend")]
    Dividend,
    /// Cash added to the portfolio
    #[sea_orm(string_value = "deposit")]
    Deposit,
    /// Cash taken out of the portfolio
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    /// Movement between holdings or accounts
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Server-assigned identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Buy, sell, dividend, ...
    pub transaction_type: TransactionKind,
    /// Asset class the entry applies to (e.g. `"stock"`, `"mutual_fund"`, `"gold"`)
    pub asset_type: String,
    /// Identifier of the holding row, when the entry is tied to one
    pub asset_id: Option<Uuid>,
    /// Display name or symbol of the asset
    pub asset_name: String,
    /// Units traded
    pub quantity: f64,
    /// Price per unit
    pub price_per_unit: f64,
    /// Cash amount of the entry after fees and taxes
    pub total_amount: f64,
    /// Brokerage and other fees
    pub fee: f64,
    /// Taxes charged
    pub tax: f64,
    /// Trade or settlement date
    pub transaction_date: Date,
    /// Free-form notes
    pub notes: Option<String>,
    /// Set by the platform on insert
    pub created_at: DateTimeUtc,
    /// Set by the platform on every write
    pub updated_at: DateTimeUtc,
}

/// Transactions have no modelled relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Expected `total_amount` for an entry.
///
/// Buys add fee and tax to the gross amount, sells subtract them, every other kind
/// is the gross amount as-is.
#[must_use]
pub fn compute_total(
    kind: TransactionKind,
    quantity: f64,
    price_per_unit: f64,
    fee: f64,
    tax: f64,
) -> f64 {
    let gross = quantity * price_per_unit;
    match kind {
        TransactionKind::Buy => gross + fee + tax,
        TransactionKind::Sell => gross - fee - tax,
        TransactionKind::Dividend
        | TransactionKind::Deposit
        | TransactionKind::Withdrawal
        | TransactionKind::Transfer => gross,
    }
}

impl Model {
    /// Total implied by quantity, price, fee and tax.
    #[must_use]
    pub fn expected_total(&self) -> f64 {
        compute_total(
            self.transaction_type,
            self.quantity,
            self.price_per_unit,
            self.fee,
            self.tax,
        )
    }

    /// Whether the stored total matches [`Self::expected_total`] within one cent.
    #[must_use]
    pub fn reconciles(&self) -> bool {
        (self.total_amount - self.expected_total()).abs() < 0.01
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
