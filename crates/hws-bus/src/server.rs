//! WebSocket transport for the [`EventBus`].
//!
//! One UTF-8 text frame is one message. Binary frames are ignored. Each
//! connection gets a UUID session id, a reader loop that forwards frames to
//! the bus handler, and a writer task that drains the session's outbound
//! channel.
//!
//! [`BusServer`] owns a dedicated multi-thread tokio runtime (worker threads
//! named `hws-bus`) so the two application threads never run async code.

use crate::bus::EventBus;
use crate::error::BusError;
use crate::session::SessionId;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

/// Worker thread name of the transport runtime.
pub const BUS_THREAD_NAME: &str = "hws-bus";

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long `shutdown` lets in-flight connection tasks finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Accepts connections on `listener` until `shutdown` flips or its sender drops.
pub async fn serve(listener: TcpListener, bus: Arc<EventBus>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, Arc::clone(&bus), shutdown.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Bus listener closed");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bus: Arc<EventBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = bus.open_session(tx);
    debug!(session = %id, %peer, "Peer connected");

    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                trace!(session = %writer_id, error = %e, "Write failed; peer gone");
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => bus.deliver(&id, &text),
                Some(Ok(Message::Binary(data))) => {
                    trace!(session = %id, len = data.len(), "Binary frame ignored");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %id, error = %e, "Read failed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    close(&bus, &id);
    let _ = writer.await;
}

/// Removing the session drops the only outbound sender, which ends the writer.
fn close(bus: &EventBus, id: &SessionId) {
    if bus.close_session(id) {
        debug!(session = %id, "Peer disconnected");
    }
}

/// Running WebSocket server.
///
/// Must be created and dropped outside any tokio runtime.
pub struct BusServer {
    bus: Arc<EventBus>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    runtime: Option<Runtime>,
}

impl BusServer {
    /// Binds `addr` and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Runtime`] if the runtime cannot be built and
    /// [`BusError::Bind`] if the address cannot be bound.
    pub fn start(bus: Arc<EventBus>, addr: SocketAddr) -> Result<Self, BusError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name(BUS_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(BusError::Runtime)?;

        let listener = runtime
            .block_on(TcpListener::bind(addr))
            .map_err(|e| BusError::bind(addr, e))?;
        let local_addr = listener.local_addr().map_err(|e| BusError::bind(addr, e))?;

        let (shutdown, rx) = watch::channel(false);
        runtime.spawn(serve(listener, Arc::clone(&bus), rx));
        info!(addr = %local_addr, "Event bus listening");

        Ok(Self {
            bus,
            local_addr,
            shutdown,
            runtime: Some(runtime),
        })
    }

    /// Address actually bound (resolves port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Stops accepting, disconnects every peer and tears down the runtime.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
        let dropped = self.bus.close_all();
        info!(addr = %self.local_addr, dropped, "Event bus stopped");
    }
}

impl Drop for BusServer {
    fn drop(&mut self) {
        self.stop();
    }
}
