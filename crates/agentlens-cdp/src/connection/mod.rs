//! CDP WebSocket connection management.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::CdpError;
use crate::transport::{CdpEvent, CdpMessage, CdpResponse};

pub mod discovery;

pub use discovery::{BrowserVersion, discover_websocket_url};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Default timeout for CDP commands.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for the event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 512;

/// A CDP connection to a browser.
///
/// One connection multiplexes the browser-level session and any number of
/// flat-mode target sessions. Commands are correlated by message id;
/// events fan out to every [`subscribe_events`](Self::subscribe_events)
/// receiver.
#[derive(Debug)]
pub struct CdpConnection {
    /// Write half of the WebSocket, shared by all senders.
    sink: Mutex<WsSink>,
    /// Broadcast side of the event channel.
    event_tx: broadcast::Sender<CdpEvent>,
    /// Responses awaited by in-flight commands.
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
    /// Monotonic message id counter.
    message_id: AtomicU64,
    /// Background read task.
    _read_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a CDP WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket handshake fails.
    #[instrument(level = "info", skip(ws_url))]
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(ws_url).await?;
        info!(status = %response.status(), "WebSocket connection established");

        let (write, read) = ws_stream.split();
        let (event_tx, _) = broadcast::channel::<CdpEvent>(EVENT_CHANNEL_SIZE);
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let read_handle = tokio::spawn(Self::read_loop(read, pending.clone(), event_tx.clone()));
        debug!("Spawned CDP read loop");

        Ok(Self {
            sink: Mutex::new(write),
            event_tx,
            pending,
            message_id: AtomicU64::new(1),
            _read_handle: read_handle,
        })
    }

    /// Background task that demultiplexes incoming CDP messages.
    async fn read_loop<S>(
        mut stream: S,
        pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
        event_tx: broadcast::Sender<CdpEvent>,
    ) where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    info!(?frame, "WebSocket closed by remote");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket error, ending read loop");
                    break;
                }
                Ok(_) => continue,
            };

            let cdp_msg: CdpMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    error!(error = %e, "Failed to parse CDP message");
                    continue;
                }
            };

            match cdp_msg {
                CdpMessage::Response(resp) => {
                    let id = resp.id;
                    let mut pending = pending.lock().await;
                    if let Some(sender) = pending.remove(&id) {
                        let _ = sender.send(resp);
                    } else {
                        warn!(id = id, "Response for unknown request id");
                    }
                }
                CdpMessage::Event(event) => {
                    trace!(method = %event.method, session_id = ?event.session_id, "CDP event");
                    // Nobody listening is fine.
                    let _ = event_tx.send(event);
                }
            }
        }
        // Wake up everything still waiting so callers see ConnectionLost
        // instead of hanging until their timeout.
        pending.lock().await.clear();
        debug!("CDP read loop ended");
    }

    /// Send a CDP command and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be sent, the response times
    /// out, or the browser answers with a protocol error.
    pub async fn send_command<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        session_id: Option<&str>,
    ) -> Result<R, CdpError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.send_command_with_timeout(method, params, session_id, DEFAULT_TIMEOUT)
            .await
    }

    /// Send a CDP command with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`send_command`](Self::send_command).
    #[instrument(level = "debug", skip(self, params), fields(method = %method, session_id = ?session_id))]
    pub async fn send_command_with_timeout<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        session_id: Option<&str>,
        timeout_duration: Duration,
    ) -> Result<R, CdpError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.message_id.fetch_add(1, Ordering::Relaxed);
        let params_value = params.map(serde_json::to_value).transpose()?;

        let request = crate::transport::CdpRequest {
            id,
            method: method.to_string(),
            params: params_value,
            session_id: session_id.map(ToString::to_string),
        };
        let json = serde_json::to_string(&request)?;

        let (resp_tx, resp_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, resp_tx);

        {
            let mut sink = self.sink.lock().await;
            if sink.send(Message::Text(json.into())).await.is_err() {
                self.pending.lock().await.remove(&id);
                return Err(CdpError::ConnectionLost);
            }
        }
        trace!(id = id, "CDP request sent");

        let response = match timeout(timeout_duration, resp_rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => return Err(CdpError::ConnectionLost),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(id = id, method = %method, "CDP command timed out");
                return Err(CdpError::Timeout(timeout_duration));
            }
        };

        if let Some(err) = response.error {
            warn!(id = id, method = %method, code = err.code, error_msg = %err.message, "CDP protocol error");
            return Err(CdpError::Protocol {
                code: err.code,
                message: err.message,
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(CdpError::from)
    }

    /// Subscribe to all CDP events arriving on this connection.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CdpEvent> {
        self.event_tx.subscribe()
    }
}
