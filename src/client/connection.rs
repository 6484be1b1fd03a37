//! WebSocket connection task for the bidirectional live session.
//!
//! The task owns the socket end to end: it opens the connection, performs the
//! setup handshake, and only then starts draining the outbound frame queue,
//! so frames captured before the session is open are deferred in order rather
//! than sent early or lost. Inbound frames are parsed into [`ServerMessage`]s
//! and forwarded to the dispatch loop. The server sends JSON in both text and
//! binary WebSocket frames, so both are parsed identically.

use super::dispatch::SessionEvent;
use crate::error::LiveError;
use crate::types::{ClientMessage, ServerMessage, SessionSetup};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

const LIVE_WS_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub(crate) fn spawn_connection_task(
    api_key: String,
    setup: SessionSetup,
    outgoing_rx: mpsc::Receiver<ClientMessage>,
    events_tx: mpsc::Sender<SessionEvent>,
) {
    tokio::spawn(async move {
        match run_connection(api_key, setup, outgoing_rx, &events_tx).await {
            Ok(()) => {
                info!("[Connection] Session closed.");
                let _ = events_tx.send(SessionEvent::Closed).await;
            }
            Err(e) => {
                warn!("[Connection] Session ended with error: {}", e);
                let _ = events_tx.send(SessionEvent::Error(e)).await;
            }
        }
    });
}

async fn run_connection(
    api_key: String,
    setup: SessionSetup,
    mut outgoing_rx: mpsc::Receiver<ClientMessage>,
    events_tx: &mpsc::Sender<SessionEvent>,
) -> Result<(), LiveError> {
    let mut url = Url::parse(LIVE_WS_ENDPOINT)
        .map_err(|e| LiveError::Internal(format!("Invalid endpoint URL: {}", e)))?;
    url.query_pairs_mut().append_pair("key", &api_key);

    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| LiveError::Connection(e.to_string()))?;
    info!("[Connection] WebSocket established.");
    let (mut write, mut read) = ws_stream.split();

    // Setup handshake: the outbound queue is not drained until the server
    // acknowledges the session configuration.
    let setup_json = serialize_client_message(&ClientMessage::Setup(setup))?;
    write
        .send(WsMessage::Text(setup_json.into()))
        .await
        .map_err(|e| LiveError::Connection(format!("Failed to send setup: {}", e)))?;

    loop {
        let frame = read
            .next()
            .await
            .ok_or_else(|| LiveError::Connection("Closed during setup handshake".to_string()))?
            .map_err(|e| LiveError::Connection(e.to_string()))?;
        match parse_server_message(&frame) {
            Some(msg) if msg.setup_complete.is_some() => break,
            Some(msg) => debug!("[Connection] Pre-setup message ignored: {:?}", msg),
            None => {}
        }
    }
    info!("[Connection] Setup acknowledged; session is open.");
    if events_tx.send(SessionEvent::Open).await.is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            maybe_outgoing = outgoing_rx.recv() => match maybe_outgoing {
                Some(message) => {
                    let json = serialize_client_message(&message)?;
                    write
                        .send(WsMessage::Text(json.into()))
                        .await
                        .map_err(|e| LiveError::Connection(e.to_string()))?;
                }
                None => {
                    // All frame producers are gone: the session was stopped.
                    debug!("[Connection] Outbound queue closed; sending close frame.");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            },
            maybe_inbound = read.next() => match maybe_inbound {
                Some(Ok(frame)) => {
                    if let WsMessage::Close(_) = frame {
                        return Ok(());
                    }
                    if let Some(msg) = parse_server_message(&frame) {
                        if events_tx.send(SessionEvent::Message(msg)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Some(Err(e)) => return Err(LiveError::Connection(e.to_string())),
                None => return Ok(()),
            },
        }
    }
}

fn serialize_client_message(message: &ClientMessage) -> Result<String, LiveError> {
    serde_json::to_string(message)
        .map_err(|e| LiveError::Internal(format!("Failed to serialize message: {}", e)))
}

/// Parses a WebSocket frame into a [`ServerMessage`]. Unparseable frames are
/// logged and skipped rather than tearing the session down.
fn parse_server_message(frame: &WsMessage) -> Option<ServerMessage> {
    let bytes: &[u8] = match frame {
        WsMessage::Text(text) => text.as_bytes(),
        WsMessage::Binary(data) => data,
        _ => return None,
    };
    match serde_json::from_slice::<ServerMessage>(bytes) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("[Connection] Skipping unparseable server frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_from_text_and_binary_frames() {
        let raw = r#"{"serverContent": {"turnComplete": true}}"#;
        let from_text = parse_server_message(&WsMessage::Text(raw.into())).unwrap();
        assert_eq!(
            from_text.server_content.unwrap().turn_complete,
            Some(true)
        );
        let from_binary =
            parse_server_message(&WsMessage::Binary(raw.as_bytes().to_vec().into())).unwrap();
        assert_eq!(
            from_binary.server_content.unwrap().turn_complete,
            Some(true)
        );
    }

    #[test]
    fn unparseable_frames_are_skipped() {
        assert!(parse_server_message(&WsMessage::Text("not json".into())).is_none());
        assert!(parse_server_message(&WsMessage::Pong(Vec::<u8>::new().into())).is_none());
    }

    #[test]
    fn setup_message_serializes_under_setup_key() {
        let setup = SessionSetup {
            model: "models/test".to_string(),
            ..Default::default()
        };
        let json = serialize_client_message(&ClientMessage::Setup(setup)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["setup"]["model"], "models/test");
    }
}
