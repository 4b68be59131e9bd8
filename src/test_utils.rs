//! Shared test utilities for the family office client.
//!
//! Tests run against an in-process [`MemoryPlatform`] with every table
//! registered, so nothing here touches the network. The `new_*` builders fill in
//! sensible defaults for everything but the fields a test usually cares about.

use crate::{
    client::{BackendClient, memory::MemoryPlatform},
    core::{
        assets::NewAsset, documents::Upload, goals::NewGoal,
        insurance_policies::NewInsurancePolicy, liabilities::NewLiability,
        mutual_funds::NewMutualFund, stocks::NewStock, transactions::NewTransaction,
    },
    entities::{GoalPriority, TransactionKind},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Email of the user [`signed_in_client`] signs in as
pub const EMAIL: &str = "owner@example.com";
/// Password shared by every test user
pub const PASSWORD: &str = "correct horse battery staple";

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A client signed in to a fresh platform.
///
/// Returns the client, the platform behind it, and the signed-in user's id.
pub async fn signed_in_client() -> Result<(Arc<BackendClient>, Arc<MemoryPlatform>, Uuid)> {
    init_tracing();
    let platform = Arc::new(MemoryPlatform::family_office());
    let owner = platform.add_user(EMAIL, PASSWORD).await;
    let client = Arc::new(BackendClient::with_platform(platform.clone()));
    client.sign_in(EMAIL, PASSWORD).await?;
    Ok((client, platform, owner))
}

/// A second user signed in to the same platform.
pub async fn second_user(platform: &Arc<MemoryPlatform>) -> Result<Arc<BackendClient>> {
    let email = "relative@example.com";
    platform.add_user(email, PASSWORD).await;
    let client = Arc::new(BackendClient::with_platform(platform.clone()));
    client.sign_in(email, PASSWORD).await?;
    Ok(client)
}

/// Creates a goal with sensible defaults.
///
/// # Defaults
/// * `target_amount`: 1,000,000
/// * `current_amount`: 0
/// * `priority`: medium
pub fn new_goal(title: &str, target_year: i32) -> NewGoal {
    NewGoal {
        title: title.to_string(),
        target_amount: 1_000_000.0,
        current_amount: 0.0,
        target_year,
        priority: GoalPriority::Medium,
        is_completed: false,
    }
}

/// Creates a stock holding listed on NSE.
pub fn new_stock(symbol: &str, quantity: f64, average_price: f64, current_price: f64) -> NewStock {
    NewStock {
        symbol: symbol.to_string(),
        company_name: format!("{symbol} Ltd"),
        exchange: Some("NSE".to_string()),
        quantity,
        average_price,
        current_price,
    }
}

/// Creates an equity fund holding.
pub fn new_mutual_fund(
    scheme_name: &str,
    units: f64,
    average_nav: f64,
    current_nav: f64,
) -> NewMutualFund {
    NewMutualFund {
        scheme_name: scheme_name.to_string(),
        fund_house: "Test AMC".to_string(),
        category: Some("equity".to_string()),
        units,
        average_nav,
        current_nav,
    }
}

/// Creates an asset with no purchase date or notes.
pub fn new_asset(
    name: &str,
    asset_type: &str,
    investment_value: f64,
    current_value: f64,
) -> NewAsset {
    NewAsset {
        name: name.to_string(),
        asset_type: asset_type.to_string(),
        investment_value,
        current_value,
        purchase_date: None,
        notes: None,
    }
}

/// Creates a loan with no EMI schedule.
pub fn new_liability(name: &str, principal_amount: f64, outstanding_amount: f64) -> NewLiability {
    NewLiability {
        name: name.to_string(),
        liability_type: "loan".to_string(),
        principal_amount,
        outstanding_amount,
        emi: 0.0,
        interest_rate: 8.5,
        tenure_months: None,
        start_date: None,
    }
}

/// Creates a stock transaction with a fee of 10 and tax of 2.5; the total is left
/// for the client to compute.
///
/// # Panics
/// When `date` is not `YYYY-MM-DD`.
#[allow(clippy::unwrap_used)]
pub fn new_transaction(
    kind: TransactionKind,
    date: &str,
    quantity: f64,
    price_per_unit: f64,
) -> NewTransaction {
    NewTransaction {
        transaction_type: kind,
        asset_type: "stock".to_string(),
        asset_id: None,
        asset_name: "TCS".to_string(),
        quantity,
        price_per_unit,
        total_amount: None,
        fee: 10.0,
        tax: 2.5,
        transaction_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        notes: None,
    }
}

/// Creates a yearly term policy without dates.
pub fn new_insurance_policy(policy_name: &str) -> NewInsurancePolicy {
    NewInsurancePolicy {
        policy_name: policy_name.to_string(),
        provider: "Test Insurance".to_string(),
        policy_type: "term".to_string(),
        policy_number: None,
        sum_assured: 10_000_000.0,
        premium_amount: 12_000.0,
        premium_frequency: "yearly".to_string(),
        start_date: None,
        end_date: None,
        nominee: None,
    }
}

/// A document upload in the `legal` category.
pub fn sample_upload(name: &str, bytes: &[u8]) -> Upload {
    Upload {
        name: name.to_string(),
        category: "legal".to_string(),
        mime_type: "application/octet-stream".to_string(),
        bytes: bytes.to_vec(),
        family_member_id: None,
    }
}
