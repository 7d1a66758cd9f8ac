//! One upgraded extension connection: a bounded outbound queue drained by a
//! single writer task, and a reader that routes frames into the client.

use crate::browser::client::{BrowserClient, PeerLink};
use crate::error::{BridgeError, Result};
use crate::websocket::message::{Message, MessageType};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// Outbound frames queued per connection before `send` reports buffer full
pub const SEND_BUFFER: usize = 256;

/// Keep-alive deadlines for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    /// Interval between outbound pings
    pub ping_interval: Duration,
    /// Silence on the socket for this long ends the connection
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Connection {
    id: String,
    tx: mpsc::Sender<String>,
}

impl Connection {
    pub fn new(id: String, tx: mpsc::Sender<String>) -> Self {
        Self { id, tx }
    }
}

impl PeerLink for Connection {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, message: &Message) -> Result<()> {
        let text = message.to_json()?;
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::BufferFull,
            TrySendError::Closed(_) => BridgeError::ConnectionClosed,
        })
    }
}

/// Route one decoded inbound frame. Returns the frame to send back, if any.
pub fn route_frame(client: &BrowserClient, msg: Message) -> Option<Message> {
    match msg.kind {
        MessageType::Response => {
            let payload = msg.payload().cloned();
            client.handle_response(&msg.id, payload, &msg.error);
            None
        }
        MessageType::Event => {
            client.handle_event(msg.action_name(), msg.data.as_ref());
            None
        }
        MessageType::Ping => Some(Message::pong(msg.id)),
        MessageType::Connected => {
            tracing::info!("Chrome extension reported connected");
            (!msg.id.is_empty()).then(|| Message::ack(msg.id))
        }
        MessageType::Error => {
            tracing::warn!("Chrome extension error frame: {}", msg.error);
            if !msg.id.is_empty() {
                let error = if msg.error.is_empty() {
                    "unknown error".to_string()
                } else {
                    msg.error
                };
                client.handle_response(&msg.id, None, &error);
            }
            None
        }
        other => {
            tracing::warn!("Unknown message type from extension: {:?}", other);
            None
        }
    }
}

/// Serve an upgraded socket until it closes, times out, or `shutdown` fires.
pub async fn run_connection(
    socket: WebSocket,
    client: Arc<BrowserClient>,
    timings: LinkTimings,
    shutdown: CancellationToken,
) {
    let id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<String>(SEND_BUFFER);
    client.set_link(Arc::new(Connection::new(id.clone(), tx.clone())));
    tracing::info!("Chrome extension connected: {}", id);

    let (sink, stream) = socket.split();
    let closing = shutdown.child_token();

    let writer = tokio::spawn(write_pump(sink, rx, timings, closing.clone()));
    read_pump(stream, &client, &tx, timings.read_timeout, &closing).await;

    client.remove_link(&id);
    closing.cancel();
    drop(tx);
    let _ = writer.await;
    tracing::info!("Chrome extension disconnected: {}", id);
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    client: &BrowserClient,
    replies: &mpsc::Sender<String>,
    read_timeout: Duration,
    closing: &CancellationToken,
) {
    loop {
        // The deadline restarts with every frame, pongs included
        let frame = tokio::select! {
            _ = closing.cancelled() => break,
            frame = timeout(read_timeout, stream.next()) => frame,
        };

        let text = match frame {
            Err(_) => {
                tracing::warn!("Extension read timed out after {:?}", read_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!("WebSocket read error: {}", e);
                break;
            }
            Ok(Some(Ok(WsMessage::Text(text)))) => text,
            Ok(Some(Ok(WsMessage::Close(_)))) => break,
            Ok(Some(Ok(_))) => continue,
        };

        let msg = match Message::from_json(&text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Failed to parse extension frame: {}", e);
                continue;
            }
        };

        if let Some(reply) = route_frame(client, msg) {
            let queued = reply
                .to_json()
                .map_err(BridgeError::from)
                .and_then(|json| {
                    replies.try_send(json).map_err(|_| BridgeError::BufferFull)
                });
            if let Err(e) = queued {
                tracing::warn!("Failed to queue reply to extension: {}", e);
            }
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<String>,
    timings: LinkTimings,
    closing: CancellationToken,
) {
    let period = timings.ping_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    let deadline = timings.write_timeout;

    loop {
        let outcome = tokio::select! {
            _ = closing.cancelled() => {
                let _ = write_frame(&mut sink, WsMessage::Close(None), deadline).await;
                break;
            }
            frame = rx.recv() => match frame {
                Some(text) => write_frame(&mut sink, WsMessage::Text(text), deadline).await,
                None => {
                    let _ = write_frame(&mut sink, WsMessage::Close(None), deadline).await;
                    break;
                }
            },
            _ = ticker.tick() => write_frame(&mut sink, WsMessage::Ping(Vec::new()), deadline).await,
        };

        if let Err(e) = outcome {
            tracing::warn!("Failed to write to extension: {}", e);
            break;
        }
    }

    closing.cancel();
}

async fn write_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: WsMessage,
    deadline: Duration,
) -> Result<()> {
    match timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BridgeError::Io(std::io::Error::other(e))),
        Err(_) => Err(BridgeError::Timeout("write timeout".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::client::NO_ACTIVE_TAB;
    use serde_json::json;

    fn client() -> BrowserClient {
        BrowserClient::new(Duration::from_millis(100))
    }

    #[test]
    fn ping_answered_with_pong() {
        let reply = route_frame(&client(), Message::from_json(r#"{"id":"7","type":"ping"}"#).unwrap());
        assert_eq!(reply, Some(Message::pong("7")));
    }

    #[test]
    fn connected_acked_only_with_id() {
        let c = client();
        let with_id = Message::from_json(r#"{"id":"c1","type":"connected"}"#).unwrap();
        assert_eq!(route_frame(&c, with_id), Some(Message::ack("c1")));

        let without = Message::from_json(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(route_frame(&c, without), None);
    }

    #[test]
    fn unknown_frames_ignored() {
        let c = client();
        let msg = Message::from_json(r#"{"id":"x","type":"telemetry"}"#).unwrap();
        assert_eq!(route_frame(&c, msg), None);

        let stray = Message::from_json(r#"{"id":"nobody","type":"response","result":1}"#).unwrap();
        assert_eq!(route_frame(&c, stray), None);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn tab_closed_event_routed() {
        let c = client();
        let msg = Message {
            kind: MessageType::Event,
            action: "tabClosed".into(),
            data: Some(json!({"tabId": 5})),
            ..Default::default()
        };
        assert_eq!(route_frame(&c, msg), None);
        assert_eq!(c.active_tab_id(), NO_ACTIVE_TAB);
    }

    #[tokio::test]
    async fn full_queue_reports_buffer_full() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("q".into(), tx);
        conn.send(&Message::pong("1")).unwrap();
        let err = conn.send(&Message::pong("2")).unwrap_err();
        assert!(matches!(err, BridgeError::BufferFull));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn closed_queue_reports_closed() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let conn = Connection::new("q".into(), tx);
        let err = conn.send(&Message::pong("1")).unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionClosed));
    }
}
