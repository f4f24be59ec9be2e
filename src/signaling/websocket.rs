//! WebSocket control channel
//!
//! Each frame is a JSON text envelope `{"event": <name>, "data": <payload>}`
//! using the rendezvous service's event names.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::channel::{ChannelEvent, ControlChannel, ControlConnection, Outbound};
use crate::error::{Error, Result};

const EVENT_CREATE_OR_JOIN: &str = "createOrJoin";
const EVENT_CREATED: &str = "created";
const EVENT_ASK_TO_CONNECT: &str = "askToConnect";
const EVENT_MESSAGE_TO_DEVICE: &str = "messageToDevice";
const EVENT_MESSAGE_TO_BROWSER: &str = "messageToBrowser";
const EVENT_LOG: &str = "log";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Control channel over a WebSocket
pub struct WebSocketChannel {
    url: String,
    capacity: usize,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            capacity: 64,
        }
    }

    /// Set the inbound/outbound queue capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

#[async_trait]
impl ControlChannel for WebSocketChannel {
    async fn connect(&self) -> Result<ControlConnection> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Channel(format!("websocket connect failed: {}", e)))?;
        tracing::debug!(url = %self.url, "Control channel connected");

        let (mut ws_write, mut ws_read) = stream.split();
        let (event_tx, event_rx) = mpsc::channel(self.capacity);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(self.capacity);

        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let text = match encode(&outbound) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                if ws_write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = ws_read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "Control channel read failed");
                        break;
                    }
                };

                match decode(&text) {
                    Ok(Some(event)) => {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!(error = %e, "Ignoring malformed control frame"),
                }
            }
            let _ = event_tx.send(ChannelEvent::Disconnected).await;
        });

        Ok(ControlConnection {
            events: event_rx,
            outbound: outbound_tx,
        })
    }
}

/// Encode an outbound message as an envelope
fn encode(outbound: &Outbound) -> Result<String> {
    let envelope = match outbound {
        Outbound::CreateOrJoin(room) => Envelope {
            event: EVENT_CREATE_OR_JOIN.to_string(),
            data: Value::String(room.clone()),
        },
        Outbound::MessageToBrowser(message) => Envelope {
            event: EVENT_MESSAGE_TO_BROWSER.to_string(),
            data: serde_json::to_value(message)?,
        },
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode an inbound envelope; `None` for events we do not handle
fn decode(text: &str) -> Result<Option<ChannelEvent>> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let event = match envelope.event.as_str() {
        EVENT_CREATED => {
            let room = match envelope.data {
                Value::String(room) => room,
                other => other.to_string(),
            };
            ChannelEvent::RoomCreated(room)
        }
        EVENT_ASK_TO_CONNECT => ChannelEvent::AskToConnect(serde_json::from_value(envelope.data)?),
        EVENT_MESSAGE_TO_DEVICE => {
            ChannelEvent::MessageToDevice(serde_json::from_value(envelope.data)?)
        }
        EVENT_LOG => {
            let lines = match envelope.data {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                Value::Null => Vec::new(),
                other => vec![other.to_string()],
            };
            ChannelEvent::Log(lines)
        }
        other => {
            tracing::trace!(event = %other, "Unhandled control event");
            return Ok(None);
        }
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::message::{MessageType, SignalMessage};

    #[test]
    fn test_encode_create_or_join() {
        let text = encode(&Outbound::CreateOrJoin("123".into())).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["event"], "createOrJoin");
        assert_eq!(value["data"], "123");
    }

    #[test]
    fn test_encode_message_to_browser() {
        let mut message = SignalMessage::ready("abc");
        message.from = "123".into();
        let text = encode(&Outbound::MessageToBrowser(message)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["event"], "messageToBrowser");
        assert_eq!(value["data"]["type"], "ready");
        assert_eq!(value["data"]["from"], "123");
        assert_eq!(value["data"]["to"], "abc");
    }

    #[test]
    fn test_decode_events() {
        assert_eq!(
            decode(r#"{"event":"created","data":"123"}"#).unwrap(),
            Some(ChannelEvent::RoomCreated("123".into()))
        );

        let ask = decode(r#"{"event":"askToConnect","data":{"from":"abc","to":"123","msg":"pull from file"}}"#)
            .unwrap()
            .unwrap();
        match ask {
            ChannelEvent::AskToConnect(msg) => {
                assert_eq!(msg.from, "abc");
                assert_eq!(msg.action(), "pull from file");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let offer = decode(r#"{"event":"messageToDevice","data":{"from":"abc","type":"offer","sdp":"eyJ9"}}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(offer, ChannelEvent::MessageToDevice(ref m) if m.message_type == MessageType::Offer));

        assert_eq!(
            decode(r#"{"event":"log","data":["Message from client:","hi"]}"#).unwrap(),
            Some(ChannelEvent::Log(vec!["Message from client:".into(), "hi".into()]))
        );
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        assert_eq!(decode(r#"{"event":"full","data":"123"}"#).unwrap(), None);
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"event":"askToConnect","data":"oops"}"#).is_err());
    }
}
