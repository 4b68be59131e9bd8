//! Entity module - `SeaORM` definitions of every platform table.
//!
//! The `Model` structs double as the client-side row types: the REST API returns
//! rows keyed by column name, which deserialize straight into them. Every table is
//! owner-scoped through its `user_id` column.

/// `assets` table
pub mod asset;
/// `documents` table
pub mod document;
/// `family_members` table
pub mod family_member;
/// `goals` table
pub mod goal;
/// `insurance_policies` table
pub mod insurance_policy;
/// `liabilities` table
pub mod liability;
/// `mutual_funds` table
pub mod mutual_fund;
/// `stocks` table
pub mod stock;
/// `transactions` table
pub mod transaction;

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

// Re-export specific types to avoid conflicts
pub use asset::{Entity as Asset, Model as AssetModel};
pub use document::{Entity as Document, Model as DocumentModel};
pub use family_member::{Entity as FamilyMember, Model as FamilyMemberModel};
pub use goal::{Entity as Goal, GoalPriority, Model as GoalModel};
pub use insurance_policy::{Entity as InsurancePolicy, Model as InsurancePolicyModel};
pub use liability::{Entity as Liability, Model as LiabilityModel};
pub use mutual_fund::{Entity as MutualFund, Model as MutualFundModel};
pub use stock::{Entity as Stock, Model as StockModel};
pub use transaction::{Entity as Transaction, Model as TransactionModel, TransactionKind};

/// Every table name, in provisioning order
pub const TABLES: &[&str] = &[
    transaction::TABLE,
    asset::TABLE,
    stock::TABLE,
    mutual_fund::TABLE,
    liability::TABLE,
    goal::TABLE,
    insurance_policy::TABLE,
    family_member::TABLE,
    document::TABLE,
];

/// Name of the owner column shared by all tables
pub const OWNER_COLUMN: &str = "user_id";

/// A persisted, owner-scoped row.
pub trait Record:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Server-assigned identifier
    fn id(&self) -> Uuid;
    /// Identity the row is scoped to
    fn owner(&self) -> Uuid;
}
