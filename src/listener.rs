//! Listener + Dispatcher (spec.md §4.2/§4.3). Accepts connections
//! concurrently — one `tokio::spawn`ed handler per connection, so the
//! listener never blocks on any one client's parse/reply/close cycle, even
//! while this node is itself ELECTING. Grounded in
//! `CloudP2P::Server::{start_listener,handle_connection}`'s accept loop.

use crate::engine::Engine;
use crate::error::NodeError;
use crate::feigned::FailureFlag;
use crate::message::{read_frame, write_frame, InboundMessage, Reply};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| NodeError::Bind { addr, source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs forever, handing each accepted connection to its own task. A
    /// single failed `accept()` is logged and does not stop the loop.
    pub async fn serve(self, engine: Arc<Engine>, feigned: Arc<FailureFlag>) -> ! {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let engine = Arc::clone(&engine);
                    let feigned = Arc::clone(&feigned);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, engine, feigned).await;
                    });
                }
                Err(e) => error!(error = %e, "accept() failed; continuing to serve"),
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<Engine>,
    feigned: Arc<FailureFlag>,
) {
    if feigned.is_failed() {
        // A feigned-failure node must look, to peers, exactly like a
        // crashed process: drop the connection without replying.
        debug!(%peer, "feigning failure; dropping inbound connection");
        return;
    }

    let message: InboundMessage = match read_frame(&mut stream).await {
        Ok(m) => m,
        Err(e) => {
            warn!(%peer, error = %e, "dropping connection after decode error");
            return;
        }
    };

    match message {
        InboundMessage::Howdy { .. } => {
            // This node is not a GCD; HOWDY inbound is unexpected. Ignore.
            debug!(%peer, "ignoring unexpected inbound HOWDY");
        }
        InboundMessage::Elect { members } => {
            // Reply must be written before any engine work that could
            // block, so the caller's non-blocking-send expectation holds.
            if write_frame(&mut stream, &Reply::got_it()).await.is_err() {
                warn!(%peer, "failed to write GOT_IT reply to ELECT");
                return;
            }
            engine.on_elect_received(members).await;
        }
        InboundMessage::IAmLeader { identity } => {
            engine.on_leader_announced(identity).await;
        }
        InboundMessage::Probe => {
            if write_frame(&mut stream, &Reply::got_it()).await.is_err() {
                warn!(%peer, "failed to write GOT_IT reply to PROBE");
            }
        }
    }
}
