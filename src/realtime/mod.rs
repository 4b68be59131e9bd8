//! Realtime change events.
//!
//! Platform change notifications arrive as untyped [`RawChange`]s. This module
//! turns them into typed [`ChangeEvent`]s ([`ChangeStream`] for one direct
//! subscription) and, through [`RealtimeBridge`], applies them to the query cache
//! while fanning them out to any number of subscribers.

/// Applying change events to cached queries
pub mod apply;
/// Shared realtime topics
pub mod bridge;

pub use bridge::{LiveSubscription, RealtimeBridge};

use crate::client::platform::{ChangeFeed, EventType, RawChange};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::warn;
use uuid::Uuid;

/// One row change, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    /// What happened
    pub event_type: EventType,
    /// Identifier of the changed row
    pub id: Uuid,
    /// Row after the change; `None` for deletes
    pub new: Option<T>,
    /// Row before the change, when the platform sent a complete one
    pub old: Option<T>,
    /// When the platform committed the change
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    /// Decodes a raw change.
    ///
    /// A malformed new row is an error; an incomplete old row (deletes often
    /// carry only the key) is dropped.
    pub fn from_raw(raw: &RawChange) -> Result<Self> {
        let id = raw
            .row_id()
            .ok_or_else(|| Error::transport(format!("{} change without row id", raw.table)))?;
        let new = raw
            .new
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| Error::transport(format!("malformed {} change: {e}", raw.table)))?;
        let old = raw
            .old
            .clone()
            .and_then(|row| serde_json::from_value(row).ok());
        Ok(Self {
            event_type: raw.event_type,
            id,
            new,
            old,
            commit_timestamp: raw.commit_timestamp,
        })
    }
}

/// Typed change events of one table, for as long as it is held.
pub struct ChangeStream<T> {
    feed: ChangeFeed,
    row: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ChangeStream<T> {
    pub(crate) const fn new(feed: ChangeFeed) -> Self {
        Self {
            feed,
            row: PhantomData,
        }
    }

    /// Next decodable event, or `None` once the feed has stopped.
    pub async fn recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let raw = self.feed.recv().await?;
            match ChangeEvent::from_raw(&raw) {
                Ok(event) => return Some(event),
                Err(e) => warn!("Skipping change event: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: Uuid,
        title: String,
    }

    #[test]
    fn test_delete_with_key_only_old_row() -> Result<()> {
        let id = Uuid::new_v4();
        let raw = RawChange {
            event_type: EventType::Delete,
            table: "goals".to_string(),
            new: None,
            old: Some(json!({"id": id})),
            commit_timestamp: None,
        };
        let event = ChangeEvent::<Row>::from_raw(&raw)?;
        assert_eq!(event.id, id);
        assert!(event.new.is_none());
        assert!(event.old.is_none());
        Ok(())
    }

    #[test]
    fn test_malformed_new_row_is_rejected() {
        let raw = RawChange {
            event_type: EventType::Insert,
            table: "goals".to_string(),
            new: Some(json!({"id": Uuid::new_v4(), "title": 5})),
            old: None,
            commit_timestamp: None,
        };
        assert!(ChangeEvent::<Row>::from_raw(&raw).is_err());
    }
}
