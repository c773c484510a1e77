//! Connection handlers
//!
//! Adapts a transport to a `Session`: frames inbound lines, runs the single
//! writer task that drains the session's outbound queue, and stops the
//! session when the peer goes away.

use std::sync::Arc;

use futures_util::future;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::session::{Flow, Session};
use crate::store::Store;
use crate::types::ClientId;

/// Handle a newline-delimited TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    store: Arc<dyn Store>,
    config: Arc<Config>,
) -> Result<(), AppError> {
    let peer_addr = peer_of(&stream);
    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    let codec = LinesCodec::new_with_max_length(config.server.max_line_length);
    let (mut line_sender, line_receiver) = Framed::new(stream, codec).split::<String>();

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<String>(config.chat.outbound_buffer.max(1));

    // Write task (outbound queue -> socket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = line_sender.send(msg).await {
                debug!("Line send failed, ending write task: {}", e);
                break;
            }
        }
        let _ = line_sender.close().await;
        debug!("Write task ended for client");
    });

    let lines = line_receiver.filter_map(move |frame| {
        future::ready(match frame {
            Ok(line) => Some(line),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Client {} sent an over-long line", client_id);
                None
            }
            Err(LinesCodecError::Io(e)) => {
                warn!("Read error for {}: {}", client_id, e);
                None
            }
        })
    });

    let session = Session::new(client_id, store, msg_tx, &config.chat);
    drive_session(session, lines).await;

    // The session held the last queue sender; the writer flushes and exits.
    let _ = write_task.await;
    info!("Client {} disconnected", client_id);
    Ok(())
}

/// Handle a WebSocket connection: one text frame per line
pub async fn handle_websocket(
    stream: TcpStream,
    store: Arc<dyn Store>,
    config: Arc<Config>,
) -> Result<(), AppError> {
    let peer_addr = peer_of(&stream);
    debug!("New WebSocket TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected over WebSocket from {}", client_id, peer_addr);

    let (msg_tx, mut msg_rx) = mpsc::channel::<String>(config.chat.outbound_buffer.max(1));

    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                debug!("WebSocket send failed, ending write task");
                break;
            }
        }
        // Send close frame when done
        let _ = ws_sender.close().await;
        debug!("Write task ended for client");
    });

    let lines = ws_receiver
        .take_while(move |frame| {
            let open = match frame {
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    false
                }
                Err(e) => {
                    warn!("WebSocket error for {}: {}", client_id, e);
                    false
                }
                Ok(_) => true,
            };
            future::ready(open)
        })
        .filter_map(|frame| {
            // Pings are answered by tungstenite; binary frames are ignored
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text.to_string()),
                _ => None,
            })
        });

    let session = Session::new(client_id, store, msg_tx, &config.chat);
    drive_session(session, lines).await;

    let _ = write_task.await;
    info!("Client {} disconnected", client_id);
    Ok(())
}

/// Run a session over a stream of input lines
///
/// Returns when the peer stops sending or the pipeline closes the
/// connection. The active processor is always stopped before returning.
pub async fn drive_session<S>(mut session: Session, lines: S)
where
    S: Stream<Item = String>,
{
    tokio::pin!(lines);

    session.start().await;
    while let Some(line) = lines.next().await {
        if session.handle_line(&line).await == Flow::Close {
            debug!("Client {} pipeline closed the connection", session.id());
            break;
        }
    }
    session.shutdown().await;
}

fn peer_of(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::broker::Broker;
    use crate::config::ChatConfig;

    #[tokio::test]
    async fn test_drive_session_closes_queue_on_quit() {
        let store: Arc<dyn Store> = Arc::new(Broker::spawn(16));
        let (tx, mut rx) = mpsc::channel(64);
        let session = Session::new(ClientId::new(), store.clone(), tx, &ChatConfig::default());

        let input = stream::iter(vec![
            "alice".to_string(),
            "/quit".to_string(),
            "ignored".to_string(),
        ]);
        drive_session(session, input).await;

        let mut output = Vec::new();
        while let Some(line) = rx.recv().await {
            output.push(line);
        }
        assert_eq!(output.first().map(String::as_str), Some("Login Name?"));
        assert_eq!(output.last().map(String::as_str), Some("Closing connection"));
        assert!(!output.iter().any(|l| l.contains("ignored")));
        assert!(!store.contains("global", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_drive_session_stops_on_disconnect() {
        let store: Arc<dyn Store> = Arc::new(Broker::spawn(16));
        let (tx, _rx) = mpsc::channel(64);
        let session = Session::new(ClientId::new(), store.clone(), tx, &ChatConfig::default());

        drive_session(session, stream::iter(vec!["alice".to_string()])).await;

        assert!(store.contains("users", "alice").await.unwrap());
        assert_eq!(store.cardinality("global").await.unwrap(), 0);
    }
}
