//! Connection — owns the WebSocket, the single reader task, and the
//! writer lane. Decoded packets are handed to the [`Dispatcher`]; malformed
//! frames are counted and discarded without aborting the reader loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::codec;
use crate::dispatcher::{Dispatcher, Handler, Predicate};
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connection lifecycle state. `Closed -> Connecting -> Open -> Closing ->
/// Closed`. Any transport error transitions straight to `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Owns one WebSocket connection to the game server.
pub struct Connection {
    status: RwLock<ConnectionStatus>,
    dispatcher: Arc<Dispatcher>,
    writer: AsyncMutex<Option<WsSink>>,
    reader_task: AsyncMutex<Option<JoinHandle<()>>>,
    decode_errors: AtomicU64,
    disconnect_handlers: RwLock<Vec<Arc<dyn Fn() + Send + Sync>>>,
}

impl Connection {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            status: RwLock::new(ConnectionStatus::Closed),
            dispatcher,
            writer: AsyncMutex::new(None),
            reader_task: AsyncMutex::new(None),
            decode_errors: AtomicU64::new(0),
            disconnect_handlers: RwLock::new(Vec::new()),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Count of frames discarded for failing to decode. Observable, never
    /// surfaced as an error to callers.
    pub fn decode_error_count(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Register a raw tap invoked for every decoded packet, regardless of
    /// command. Thin wrapper over [`Dispatcher::subscribe_all`].
    pub fn on_packet(&self, handler: Handler) {
        self.dispatcher.subscribe_all(handler);
    }

    /// Register a callback fired once the Connection transitions to
    /// `Closed` after being `Open`.
    pub fn on_disconnect(&self, handler: Arc<dyn Fn() + Send + Sync>) {
        self.disconnect_handlers.write().push(handler);
    }

    /// Dial `url`, failing with [`ClientError::TransportError`] if the url
    /// doesn't parse, or if the handshake does not complete within
    /// `timeout`. Spawns the single reader task on success.
    pub async fn connect(self: &Arc<Self>, url: &str, timeout: Duration) -> Result<()> {
        if self.connected() {
            return Ok(());
        }
        let parsed = Url::parse(url)
            .map_err(|e| ClientError::TransportError(format!("invalid game url '{url}': {e}")))?;
        *self.status.write() = ConnectionStatus::Connecting;
        log::info!("connecting to {parsed}");

        let attempt = tokio::time::timeout(timeout, connect_async(parsed.as_str())).await;
        let (stream, _response) = match attempt {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                *self.status.write() = ConnectionStatus::Closed;
                return Err(ClientError::TransportError(format!("connect failed: {e}")));
            }
            Err(_) => {
                *self.status.write() = ConnectionStatus::Closed;
                return Err(ClientError::TransportError("connect timed out".into()));
            }
        };

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        *self.status.write() = ConnectionStatus::Open;
        log::info!("connected");

        let conn = self.clone();
        let handle = tokio::spawn(async move { conn.read_loop(source).await });
        *self.reader_task.lock().await = Some(handle);

        Ok(())
    }

    async fn read_loop(
        self: Arc<Self>,
        mut source: futures_util::stream::SplitStream<WsStream>,
    ) {
        log::debug!("reader loop started");
        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => self.process_message(&text),
                Ok(Message::Binary(bytes)) => {
                    if let Ok(text) = String::from_utf8(bytes) {
                        self.process_message(&text);
                    }
                }
                Ok(Message::Close(_)) => {
                    log::info!("server closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("read loop error: {e}");
                    break;
                }
            }
        }
        self.enter_closing().await;
    }

    fn process_message(&self, text: &str) {
        match codec::decode(text) {
            Ok(packet) => {
                log::debug!("dispatching packet command='{}'", packet.command);
                self.dispatcher.dispatch(&packet);
            }
            Err(e) => {
                self.decode_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("discarding malformed frame: {e}");
            }
        }
    }

    async fn enter_closing(&self) {
        {
            let mut status = self.status.write();
            if *status == ConnectionStatus::Closing || *status == ConnectionStatus::Closed {
                return;
            }
            *status = ConnectionStatus::Closing;
        }
        self.dispatcher.cancel_all_waiters();
        *self.writer.lock().await = None;
        *self.status.write() = ConnectionStatus::Closed;

        let handlers: Vec<_> = self.disconnect_handlers.read().clone();
        for handler in handlers {
            handler();
        }
        log::info!("disconnected");
    }

    /// Close the connection from the caller's side.
    pub async fn disconnect(self: &Arc<Self>) {
        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        self.enter_closing().await;
    }

    /// Send an already-encoded frame. Writes are serialized through the
    /// writer lane's mutex; outgoing trailing NULs are never emitted (the
    /// WebSocket transport already delimits messages).
    pub async fn send(&self, frame: String) -> Result<()> {
        if !self.connected() {
            return Err(ClientError::NotConnected);
        }
        let frame = frame.trim_end_matches('\u{0}').to_string();
        let mut guard = self.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| ClientError::TransportError(format!("send failed: {e}")))
    }

    /// Convenience pass-through to [`Dispatcher::wait_for`] that also
    /// rejects immediately when not connected, per the documented choice
    /// not to silently retain waiters across reconnects.
    pub async fn wait_for(
        &self,
        command: impl Into<String>,
        predicate: Option<Predicate>,
        timeout: Duration,
    ) -> Result<crate::codec::Packet> {
        if !self.connected() {
            return Err(ClientError::NotConnected);
        }
        self.dispatcher.wait_for(command, predicate, timeout).await
    }
}
