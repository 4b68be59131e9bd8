//! Applying change events to cached queries.
//!
//! Lists are kept in their resource's sort order and keyed by row id, so a
//! repeated event never duplicates a row. Inserts only enter lists whose filters
//! they match; updates only touch rows already cached; deletes evict the row
//! from lists and drop its detail entry. Aggregates computed from the table are
//! invalidated on every event.

use crate::cache::{EntryUpdate, QueryCache, QueryKey, Scope, invalidation};
use crate::client::platform::{EventType, RawChange, compare_rows, matches_filters};
use crate::core::SortKey;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{debug, warn};
use uuid::Uuid;

fn row_id(row: &Value) -> Option<Uuid> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn position_of(rows: &[Value], id: Uuid) -> Option<usize> {
    rows.iter().position(|row| row_id(row) == Some(id))
}

/// Inserts `row` at its sort position, replacing any row with the same id.
pub fn upsert_sorted(rows: &mut Vec<Value>, row: Value, sort: SortKey) {
    if let Some(id) = row_id(&row) {
        if let Some(index) = position_of(rows, id) {
            rows.remove(index);
        }
    }
    let order = sort.to_order();
    let index = rows
        .iter()
        .position(|existing| compare_rows(existing, &row, &order) == Ordering::Greater)
        .unwrap_or(rows.len());
    rows.insert(index, row);
}

/// Replaces the row with the same id, repositioning it; returns whether one was there.
pub fn replace_existing(rows: &mut Vec<Value>, row: Value, sort: SortKey) -> bool {
    let present = row_id(&row).and_then(|id| position_of(rows, id)).is_some();
    if present {
        upsert_sorted(rows, row, sort);
    }
    present
}

/// Removes the row with `id`; returns whether one was there.
pub fn remove_by_id(rows: &mut Vec<Value>, id: Uuid) -> bool {
    match position_of(rows, id) {
        Some(index) => {
            rows.remove(index);
            true
        }
        None => false,
    }
}

/// New contents of one cache entry after `change`.
fn apply_to_entry(key: &QueryKey, data: &Value, change: &RawChange, id: Uuid, sort: SortKey) -> EntryUpdate {
    match &key.scope {
        Scope::List(filters) => {
            let Some(cached) = data.as_array() else {
                return EntryUpdate::Keep;
            };
            let mut rows = cached.clone();
            let changed = match (change.event_type, &change.new) {
                (EventType::Insert, Some(row)) => {
                    if matches_filters(filters, row) {
                        upsert_sorted(&mut rows, row.clone(), sort);
                        true
                    } else {
                        false
                    }
                }
                (EventType::Update, Some(row)) => {
                    if matches_filters(filters, row) {
                        replace_existing(&mut rows, row.clone(), sort)
                    } else {
                        remove_by_id(&mut rows, id)
                    }
                }
                (EventType::Delete, _) => remove_by_id(&mut rows, id),
                (_, None) => false,
            };
            if changed {
                EntryUpdate::Replace(Value::Array(rows))
            } else {
                EntryUpdate::Keep
            }
        }
        Scope::Detail(detail) if *detail == id => match (change.event_type, &change.new) {
            (EventType::Delete, _) => EntryUpdate::Remove,
            (_, Some(row)) => EntryUpdate::Replace(row.clone()),
            (_, None) => EntryUpdate::Keep,
        },
        Scope::Detail(_) | Scope::Aggregate => EntryUpdate::Keep,
    }
}

/// Applies one change of `table` to `owner`'s cached queries.
pub async fn apply_change(
    cache: &QueryCache,
    table: &'static str,
    sort: SortKey,
    owner: Uuid,
    change: &RawChange,
) {
    let Some(id) = change.row_id() else {
        warn!("Ignoring {} change without row id", table);
        return;
    };
    if change.event_type != EventType::Delete && change.new.is_none() {
        warn!("Ignoring {:?} on {} without a row", change.event_type, table);
        return;
    }
    debug!("Applying {:?} of {} row {}", change.event_type, table, id);

    cache
        .update_entries(table, owner, |key, data| {
            apply_to_entry(key, data, change, id, sort)
        })
        .await;

    for aggregate in invalidation::dependent_aggregates(table) {
        cache.invalidate(aggregate, owner).await;
    }
}
