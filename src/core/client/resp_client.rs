// src/core/client/resp_client.rs

//! The default store client: RESP2 over a plain TCP connection.
//!
//! After the handshake, the framed stream is moved into a dedicated connection
//! task. Callers talk to that task through an mpsc queue and get their reply on
//! a oneshot channel, so commands from any number of clones are serialized onto
//! the single socket. While no command is outstanding the task keeps reading,
//! which is how a connection closed by the peer is noticed without waiting for
//! the next command.

use super::{ClientEvent, EventSink, StoreClient, StoreConnector};
use crate::config::ConnectOptions;
use crate::core::LinkError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

// Requests queued beyond this make callers wait for room.
const REQUEST_QUEUE_CAPACITY: usize = 1024;

type Transport = Framed<TcpStream, RespFrameCodec>;

/// Creates `RespClient`s. This is the connector `ConnectionManager::resp` uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespConnector;

impl StoreConnector for RespConnector {
    fn create(
        &self,
        options: &ConnectOptions,
        events: EventSink,
    ) -> Result<Arc<dyn StoreClient>, LinkError> {
        Ok(Arc::new(RespClient::new(options.resolve()?, events)))
    }
}

/// A command waiting for the connection task.
struct Request {
    args: Vec<Bytes>,
    reply: oneshot::Sender<Result<RespFrame, LinkError>>,
    /// Set for `QUIT`: the task exits once the reply is in.
    closes: bool,
}

/// RESP client owning at most one TCP connection.
pub struct RespClient {
    options: ConnectOptions,
    events: EventSink,
    open: Arc<AtomicBool>,
    requests: Mutex<Option<mpsc::Sender<Request>>>,
}

impl std::fmt::Debug for RespClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespClient")
            .field("address", &self.options.address())
            .field("database", &self.options.database)
            .field("open", &self.is_open())
            .finish()
    }
}

impl RespClient {
    /// `options` must already be resolved (no `url` left to fold in).
    pub fn new(options: ConnectOptions, events: EventSink) -> Self {
        Self {
            options,
            events,
            open: Arc::new(AtomicBool::new(false)),
            requests: Mutex::new(None),
        }
    }

    fn emit(&self, event: ClientEvent) {
        (self.events)(event);
    }

    /// Reports `err` through the event sink before handing it back.
    fn fail(&self, err: LinkError) -> LinkError {
        self.emit(ClientEvent::Error(err.clone()));
        err
    }

    async fn open_transport(&self) -> Result<Transport, LinkError> {
        let address = self.options.address();
        let stream =
            match tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(&address))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(LinkError::Timeout(format!("connecting to {address}"))),
            };
        stream.set_nodelay(true)?;
        Ok(Framed::new(stream, RespFrameCodec))
    }

    /// Commands sent before the connection is handed to the connection task.
    fn handshake_commands(&self) -> Vec<(&'static str, Vec<Bytes>)> {
        let mut commands = Vec::new();
        if let Some(password) = &self.options.password {
            let mut args = vec![Bytes::from_static(b"AUTH")];
            if let Some(username) = &self.options.username {
                args.push(Bytes::from(username.clone()));
            }
            args.push(Bytes::from(password.clone()));
            commands.push(("AUTH", args));
        }
        if self.options.database != 0 {
            commands.push((
                "SELECT",
                vec![
                    Bytes::from_static(b"SELECT"),
                    Bytes::from(self.options.database.to_string()),
                ],
            ));
        }
        if let Some(name) = &self.options.client_name {
            commands.push((
                "CLIENT SETNAME",
                vec![
                    Bytes::from_static(b"CLIENT"),
                    Bytes::from_static(b"SETNAME"),
                    Bytes::from(name.clone()),
                ],
            ));
        }
        commands
    }

    fn sender(&self) -> Result<mpsc::Sender<Request>, LinkError> {
        if !self.is_open() {
            return Err(LinkError::ClientClosed);
        }
        self.requests.lock().clone().ok_or(LinkError::ClientClosed)
    }

    async fn submit(&self, args: Vec<Bytes>, closes: bool) -> Result<RespFrame, LinkError> {
        let sender = self.sender()?;
        let (reply, response) = oneshot::channel();
        sender
            .send(Request {
                args,
                reply,
                closes,
            })
            .await
            .map_err(|_| LinkError::ClientClosed)?;
        // The task drops the reply sender without answering only when it dies.
        response.await.map_err(|_| LinkError::ConnectionClosed)?
    }
}

#[async_trait]
impl StoreClient for RespClient {
    async fn connect(&self) -> Result<(), LinkError> {
        if self.requests.lock().is_some() {
            return Err(LinkError::Protocol(
                "connect called on a client that already connected".to_string(),
            ));
        }

        debug!(
            "spinel-link {} connecting to {}",
            crate::VERSION,
            self.options.address()
        );
        let mut transport = self.open_transport().await.map_err(|e| self.fail(e))?;
        self.emit(ClientEvent::Connect);

        for (name, args) in self.handshake_commands() {
            match round_trip(&mut transport, args, Some(self.options.connect_timeout)).await {
                Ok(RespFrame::SimpleString(_)) => {}
                Ok(RespFrame::Error(msg)) => {
                    return Err(self.fail(LinkError::Server(format!("{name} rejected: {msg}"))));
                }
                Ok(other) => return Err(self.fail(super::unexpected(name, &other))),
                Err(e) => return Err(self.fail(e)),
            }
        }

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        *self.requests.lock() = Some(tx);
        self.open.store(true, Ordering::SeqCst);
        tokio::spawn(run_connection(
            transport,
            rx,
            self.open.clone(),
            self.events.clone(),
            self.options.command_timeout,
        ));

        self.emit(ClientEvent::Ready);
        Ok(())
    }

    async fn quit(&self) -> Result<(), LinkError> {
        let reply = self.submit(vec![Bytes::from_static(b"QUIT")], true).await;
        // Whatever QUIT answered, this client will not be reused.
        self.requests.lock().take();
        match reply? {
            RespFrame::SimpleString(_) => Ok(()),
            RespFrame::Error(msg) => Err(LinkError::Server(msg)),
            other => Err(super::unexpected("QUIT", &other)),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn execute(&self, args: Vec<Bytes>) -> Result<RespFrame, LinkError> {
        if args.is_empty() {
            return Err(LinkError::Protocol("empty command".to_string()));
        }
        self.submit(args, false).await
    }
}

/// Writes one command and waits for its reply.
async fn round_trip(
    transport: &mut Transport,
    args: Vec<Bytes>,
    deadline: Option<Duration>,
) -> Result<RespFrame, LinkError> {
    transport.send(RespFrame::command(args)).await?;
    let next = transport.next();
    let reply = match deadline {
        Some(limit) => tokio::time::timeout(limit, next)
            .await
            .map_err(|_| LinkError::Timeout("waiting for a reply".to_string()))?,
        None => next.await,
    };
    reply.unwrap_or(Err(LinkError::ConnectionClosed))
}

/// Owns the socket until the peer goes away, a transport error occurs, `QUIT`
/// completes, or every client handle is dropped. Always emits `End` on exit.
async fn run_connection(
    mut transport: Transport,
    mut requests: mpsc::Receiver<Request>,
    open: Arc<AtomicBool>,
    events: EventSink,
    command_timeout: Option<Duration>,
) {
    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    debug!("All client handles dropped; closing store connection.");
                    break;
                };
                match round_trip(&mut transport, request.args, command_timeout).await {
                    Ok(frame) if request.closes => {
                        open.store(false, Ordering::SeqCst);
                        events(ClientEvent::End);
                        let _ = request.reply.send(Ok(frame));
                        return;
                    }
                    Ok(frame) => {
                        let _ = request.reply.send(Ok(frame));
                    }
                    Err(e) => {
                        warn!("Store connection failed: {e}");
                        open.store(false, Ordering::SeqCst);
                        events(ClientEvent::Error(e.clone()));
                        let _ = request.reply.send(Err(e));
                        break;
                    }
                }
            }
            frame = transport.next() => match frame {
                None => {
                    debug!("Store closed the connection.");
                    break;
                }
                Some(Ok(frame)) => {
                    warn!("Discarding unsolicited {} frame from store.", frame.kind());
                }
                Some(Err(e)) => {
                    warn!("Store connection failed: {e}");
                    open.store(false, Ordering::SeqCst);
                    events(ClientEvent::Error(e));
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    events(ClientEvent::End);
}
