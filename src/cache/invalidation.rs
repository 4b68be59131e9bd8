//! Which cached resources a mutation makes stale.

use crate::core::summary::{NET_WORTH, PORTFOLIO_SUMMARY};
use crate::entities::{
    asset, document, family_member, goal, insurance_policy, liability, mutual_fund, stock,
    transaction,
};

/// Mutated table and the cached resources that depend on it, itself included.
pub const INVALIDATION_EDGES: &[(&str, &[&str])] = &[
    (transaction::TABLE, &[transaction::TABLE, PORTFOLIO_SUMMARY]),
    (asset::TABLE, &[asset::TABLE, PORTFOLIO_SUMMARY, NET_WORTH]),
    (stock::TABLE, &[stock::TABLE, PORTFOLIO_SUMMARY, NET_WORTH]),
    (
        mutual_fund::TABLE,
        &[mutual_fund::TABLE, PORTFOLIO_SUMMARY, NET_WORTH],
    ),
    (liability::TABLE, &[liability::TABLE, NET_WORTH]),
    (goal::TABLE, &[goal::TABLE]),
    (insurance_policy::TABLE, &[insurance_policy::TABLE]),
    (family_member::TABLE, &[family_member::TABLE, document::TABLE]),
    (document::TABLE, &[document::TABLE]),
];

/// Aggregate query names
pub const AGGREGATES: &[&str] = &[PORTFOLIO_SUMMARY, NET_WORTH];

/// Cached resources to invalidate after `table` changes; empty for unknown tables.
#[must_use]
pub fn dependents(table: &str) -> Vec<&'static str> {
    INVALIDATION_EDGES
        .iter()
        .find(|(source, _)| *source == table)
        .map(|(_, targets)| targets.to_vec())
        .unwrap_or_default()
}

/// Aggregates computed from `table`.
#[must_use]
pub fn dependent_aggregates(table: &str) -> Vec<&'static str> {
    dependents(table)
        .into_iter()
        .filter(|resource| AGGREGATES.contains(resource))
        .collect()
}
