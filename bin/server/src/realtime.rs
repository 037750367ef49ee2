//! Realtime notification fan-out over WebSocket.
//!
//! Any connected client may send `{"event":"notification","data":...}`; the
//! frame is re-broadcast to every connected client as
//! `{"event":"newNotification","data":...}`. Other frames are ignored.

use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Frames buffered per slow subscriber before it starts missing them.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    event: &'static str,
    data: &'a JsonValue,
}

/// Turns an inbound notification frame into the broadcast frame.
fn rebroadcast_frame(text: &str) -> Option<String> {
    let inbound: InboundFrame = serde_json::from_str(text).ok()?;
    if inbound.event != "notification" {
        return None;
    }
    serde_json::to_string(&OutboundFrame {
        event: "newNotification",
        data: &inbound.data,
    })
    .ok()
}

/// Broadcast channel shared by every socket.
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<String>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Sends a frame to every subscriber. Returns how many received it.
    pub fn publish(&self, frame: String) -> usize {
        self.sender.send(frame).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = state.realtime.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: RealtimeHub) {
    info!("realtime client connected");
    let (mut sink, mut stream) = socket.split();
    let mut frames = hub.subscribe();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(frame) = rebroadcast_frame(text.as_str()) {
                        let receivers = hub.publish(frame);
                        debug!(receivers, "notification broadcast");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "realtime socket error");
                    break;
                }
            },
            outbound = frames.recv() => match outbound {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "realtime client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!("realtime client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_frames_are_renamed() {
        let frame = rebroadcast_frame(r#"{"event":"notification","data":{"title":"Đơn hàng mới"}}"#)
            .expect("rebroadcast");
        let value: JsonValue = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["event"], "newNotification");
        assert_eq!(value["data"]["title"], "Đơn hàng mới");
    }

    #[test]
    fn other_frames_are_ignored() {
        assert!(rebroadcast_frame(r#"{"event":"typing","data":{}}"#).is_none());
        assert!(rebroadcast_frame("not json").is_none());
    }

    #[tokio::test]
    async fn hub_fans_out_to_every_subscriber() {
        let hub = RealtimeHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish("frame".to_string()), 2);
        assert_eq!(a.recv().await.expect("a"), "frame");
        assert_eq!(b.recv().await.expect("b"), "frame");
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        assert_eq!(RealtimeHub::new().publish("frame".to_string()), 0);
    }
}
