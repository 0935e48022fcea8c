//! WebSocket Envelope Server
//!
//! Async WebSocket server hosting the envelope handler. Every binary frame
//! is one request envelope; the response, when there is one, goes back as
//! one binary frame.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::network::envelope::{EnvelopeHandler, ResponseSink};
use crate::network::session::{Session, SessionManager};

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Reply channel for one call. Sending never waits for the socket.
pub struct FrameSink {
    tx: mpsc::Sender<Message>,
}

impl ResponseSink for FrameSink {
    fn end(self, bytes: Vec<u8>) {
        if let Err(e) = self.tx.try_send(Message::Binary(bytes)) {
            warn!("Dropping response: {}", e);
        }
    }
}

/// The envelope server.
pub struct EnvelopeServer {
    config: ServerConfig,
    handler: Arc<EnvelopeHandler>,
    sessions: Arc<SessionManager>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EnvelopeServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            handler: Arc::new(EnvelopeHandler::new(&config)),
            sessions: Arc::new(SessionManager::new()),
            config,
            shutdown_tx,
        }
    }

    /// Run the server until [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Envelope server v{} listening on {}", self.config.version, self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let session = match self.admit(addr).await {
                                Ok(session) => session,
                                Err(e) => {
                                    warn!("Rejecting {}: {}", addr, e);
                                    continue;
                                }
                            };

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, session);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reserve a session slot for `addr` before the WebSocket handshake.
    async fn admit(&self, addr: SocketAddr) -> Result<Arc<Mutex<Session>>, ServerError> {
        if self.sessions.session_count().await >= self.config.max_connections {
            return Err(ServerError::ConnectionLimitReached);
        }
        Ok(self.sessions.get_or_create(addr).await)
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, session: Arc<Mutex<Session>>) {
        let handler = self.handler.clone();
        let sessions = self.sessions.clone();
        let idle_timeout = self.config.idle_timeout;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    sessions.remove(&addr).await;
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
            });

            // Frames are handled one at a time, in arrival order.
            loop {
                tokio::select! {
                    msg = tokio::time::timeout(idle_timeout, ws_receiver.next()) => {
                        match msg {
                            Err(_) => {
                                debug!("Client {} idle, closing", addr);
                                break;
                            }
                            Ok(Some(Ok(Message::Binary(data)))) => {
                                let sink = FrameSink { tx: msg_tx.clone() };
                                let mut session = session.lock().await;

                                if let Err(e) = handler.serve(&mut session.player, &data, sink) {
                                    if e.is_fatal() {
                                        error!("Closing {}: {}", addr, e);
                                        break;
                                    }
                                    warn!("Request from {} failed: {}", addr, e);
                                }
                            }
                            Ok(Some(Ok(Message::Ping(payload)))) => {
                                let _ = msg_tx.send(Message::Pong(payload)).await;
                            }
                            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Ok(Some(Err(e))) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Ok(Some(Ok(_))) => {
                                debug!("Ignoring non-binary frame from {}", addr);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // Let queued replies flush before the socket goes away.
            drop(msg_tx);
            let _ = sender_task.await;

            sessions.remove(&addr).await;
            info!(
                "Client {} cleaned up ({} authenticated sessions remain)",
                addr,
                sessions.authenticated_count().await
            );
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.sessions.session_count().await
    }
}
