//! Realtime change channel over websocket.
//!
//! The platform multiplexes Phoenix channels on one socket. Each [`ChangeFeed`]
//! opened here owns its own socket and joins a single topic configured for
//! `postgres_changes` on one table, filtered to the owner's rows. A spawned task
//! keeps the socket alive with heartbeats and forwards change frames until the
//! feed is dropped, at which point it leaves the channel and closes the socket.

use super::platform::{ChangeFeed, EventType, RawChange};
use crate::config::platform::PlatformConfig;
use crate::config::settings::RealtimeSettings;
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One Phoenix protocol frame.
#[derive(Debug, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

/// `postgres_changes` payload body.
#[derive(Debug, Deserialize)]
struct ChangeData {
    table: String,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
    #[serde(default)]
    commit_timestamp: Option<DateTime<Utc>>,
}

/// What a text frame means to the feed.
#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
    /// A row change to forward
    Change(RawChange),
    /// The join was refused; the feed cannot continue
    Rejected(String),
    /// Replies, heartbeats acks, presence and system frames
    Ignored,
}

/// Topic name for one table and owner.
pub(crate) fn channel_topic(table: &str, owner: Uuid) -> String {
    format!("realtime:{table}:{owner}")
}

pub(crate) fn join_frame(topic: &str, table: &str, owner: Uuid, access_token: &str) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": table,
                    "filter": format!("{}=eq.{owner}", crate::entities::OWNER_COLUMN),
                }],
            },
            "access_token": access_token,
        },
        "ref": "1",
    })
}

fn heartbeat_frame(reference: u64) -> Value {
    json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": reference.to_string() })
}

fn leave_frame(topic: &str, reference: u64) -> Value {
    json!({ "topic": topic, "event": "phx_leave", "payload": {}, "ref": reference.to_string() })
}

fn non_empty(row: Option<Value>) -> Option<Value> {
    row.filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
}

/// Interprets one text frame received on `topic`.
pub(crate) fn parse_frame(topic: &str, text: &str) -> Result<Incoming> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| Error::transport(format!("malformed realtime frame: {e}")))?;
    if frame.topic != topic {
        return Ok(Incoming::Ignored);
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let data: ChangeData = serde_json::from_value(frame.payload["data"].clone())
                .map_err(|e| Error::transport(format!("malformed change payload: {e}")))?;
            Ok(Incoming::Change(RawChange {
                event_type: data.event_type,
                table: data.table,
                new: non_empty(data.record),
                old: non_empty(data.old_record),
                commit_timestamp: data.commit_timestamp,
            }))
        }
        "phx_reply" if frame.payload["status"] == "error" => Ok(Incoming::Rejected(
            frame.payload["response"].to_string(),
        )),
        "phx_error" | "phx_close" => Ok(Incoming::Rejected(frame.event)),
        _ => Ok(Incoming::Ignored),
    }
}

/// Connects, joins the table topic and spawns the forwarding task.
pub(crate) async fn open_channel(
    config: &PlatformConfig,
    settings: &RealtimeSettings,
    access_token: String,
    table: &str,
    owner: Uuid,
) -> Result<ChangeFeed> {
    let url = format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        config.websocket_url(),
        config.anon_key
    );
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut sink, mut source) = stream.split();

    let topic = channel_topic(table, owner);
    sink.send(Message::Text(
        join_frame(&topic, table, owner, &access_token).to_string(),
    ))
    .await?;
    info!("Joined realtime topic {}", topic);

    let (events_tx, events_rx) = mpsc::channel(settings.channel_capacity.max(1));
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let heartbeat_every = settings.heartbeat();

    let task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Leaving realtime topic {}", topic);
                    let _ = sink.send(Message::Text(leave_frame(&topic, next_ref).to_string())).await;
                    let _ = sink.close().await;
                    break;
                }
                _ = heartbeat.tick() => {
                    let frame = heartbeat_frame(next_ref).to_string();
                    next_ref += 1;
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        error!("Realtime heartbeat failed on {}: {}", topic, e);
                        break;
                    }
                }
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => match parse_frame(&topic, &text) {
                        Ok(Incoming::Change(change)) => {
                            if events_tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Ok(Incoming::Rejected(reason)) => {
                            error!("Realtime topic {} rejected: {}", topic, reason);
                            break;
                        }
                        Ok(Incoming::Ignored) => {}
                        Err(e) => warn!("Skipping realtime frame on {}: {}", topic, e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Realtime socket for {} closed by platform", topic);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Realtime socket for {} failed: {}", topic, e);
                        break;
                    }
                },
            }
        }
    });

    Ok(ChangeFeed::new(events_rx, shutdown_tx, task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_frame_filters_by_owner() {
        let owner = Uuid::nil();
        let topic = channel_topic("stocks", owner);
        let frame = join_frame(&topic, "stocks", owner, "token");

        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["payload"]["access_token"], "token");
        let change = &frame["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "stocks");
        assert_eq!(change["filter"], format!("user_id=eq.{owner}"));
    }

    #[test]
    fn test_parse_update_frame() -> Result<()> {
        let topic = channel_topic("stocks", Uuid::nil());
        let text = json!({
            "topic": topic,
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "schema": "public",
                    "table": "stocks",
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                    "type": "UPDATE",
                    "record": {"id": "r1", "current_price": 130.75},
                    "old_record": {"id": "r1"}
                },
                "ids": [1]
            },
            "ref": null
        })
        .to_string();

        let Incoming::Change(change) = parse_frame(&topic, &text)? else {
            return Err(Error::transport("expected a change"));
        };
        assert_eq!(change.event_type, EventType::Update);
        assert_eq!(change.table, "stocks");
        assert_eq!(change.new.as_ref().map(|r| r["current_price"].clone()), Some(json!(130.75)));
        assert!(change.commit_timestamp.is_some());
        Ok(())
    }

    #[test]
    fn test_parse_delete_frame_drops_empty_record() -> Result<()> {
        let topic = channel_topic("goals", Uuid::nil());
        let text = json!({
            "topic": topic,
            "event": "postgres_changes",
            "payload": {"data": {"table": "goals", "type": "DELETE", "record": {}, "old_record": {"id": "g1"}}}
        })
        .to_string();

        let Incoming::Change(change) = parse_frame(&topic, &text)? else {
            return Err(Error::transport("expected a change"));
        };
        assert_eq!(change.event_type, EventType::Delete);
        assert!(change.new.is_none());
        assert_eq!(change.old, Some(json!({"id": "g1"})));
        Ok(())
    }

    #[test]
    fn test_parse_rejected_join_and_foreign_topics() -> Result<()> {
        let topic = channel_topic("goals", Uuid::nil());
        let rejected = json!({
            "topic": topic,
            "event": "phx_reply",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}},
            "ref": "1"
        })
        .to_string();
        assert!(matches!(parse_frame(&topic, &rejected)?, Incoming::Rejected(_)));

        let heartbeat_ack = json!({
            "topic": "phoenix", "event": "phx_reply", "payload": {"status": "ok"}, "ref": "2"
        })
        .to_string();
        assert_eq!(parse_frame(&topic, &heartbeat_ack)?, Incoming::Ignored);
        Ok(())
    }

    #[test]
    fn test_parse_malformed_frame_is_transport_error() {
        assert!(matches!(
            parse_frame("t", "not json"),
            Err(Error::Transport { .. })
        ));
    }
}
