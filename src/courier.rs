//! Outbound Courier Pool: one async task per outbound send, so a single
//! slow or dead peer never stalls any other exchange. Grounded in
//! `PeerImage-Services::ElectionManager::declare_leader`'s per-peer
//! `tokio::spawn(async move { ... })` fire-and-forget announce, generalized
//! here to cover ELECT and PROBE (which await a `"GOT_IT"` reply under a
//! deadline) as well as I_AM_LEADER (which does not).

use crate::identity::Identity;
use crate::message::{read_frame, write_frame, InboundMessage, MembershipPayload, Reply};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Result of one outbound exchange, as spec.md §4.5 describes: success
/// (`GotIt`) or any connect/write/read/timeout failure (`Failed`), the
/// latter folded into a single variant since the engine treats all of them
/// identically ("no GOT_IT").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourierOutcome {
    GotIt,
    Failed,
}

/// Send `ELECT(members)` to `peer` and wait up to `reply_timeout` for the
/// `"GOT_IT"` reply.
pub async fn send_elect(
    peer: SocketAddr,
    members: MembershipPayload,
    connect_timeout: Duration,
    reply_timeout: Duration,
) -> CourierOutcome {
    send_and_await_got_it(
        peer,
        InboundMessage::Elect { members },
        connect_timeout,
        reply_timeout,
    )
    .await
}

/// Send `PROBE()` to `peer` and wait up to `reply_timeout` for `"GOT_IT"`.
pub async fn send_probe(
    peer: SocketAddr,
    connect_timeout: Duration,
    reply_timeout: Duration,
) -> CourierOutcome {
    send_and_await_got_it(peer, InboundMessage::Probe, connect_timeout, reply_timeout).await
}

/// Send `I_AM_LEADER(identity)` to `peer`. No reply is expected; the
/// outcome only reflects whether the connect+write succeeded.
pub async fn send_i_am_leader(
    peer: SocketAddr,
    identity: Identity,
    connect_timeout: Duration,
) -> CourierOutcome {
    let result = timeout(connect_timeout, async {
        let mut stream = TcpStream::connect(peer)
            .await
            .map_err(|source| crate::error::NodeError::Transport { peer, source })?;
        write_frame(&mut stream, &InboundMessage::IAmLeader { identity }).await?;
        Ok::<(), crate::error::NodeError>(())
    })
    .await;

    match result {
        Ok(Ok(())) => CourierOutcome::GotIt,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "I_AM_LEADER send failed");
            CourierOutcome::Failed
        }
        Err(_) => {
            debug!(%peer, "I_AM_LEADER send timed out connecting");
            CourierOutcome::Failed
        }
    }
}

async fn send_and_await_got_it(
    peer: SocketAddr,
    message: InboundMessage,
    connect_timeout: Duration,
    reply_timeout: Duration,
) -> CourierOutcome {
    let connect_result = timeout(connect_timeout, TcpStream::connect(peer)).await;
    let mut stream = match connect_result {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "connect failed");
            return CourierOutcome::Failed;
        }
        Err(_) => {
            debug!(%peer, "connect timed out");
            return CourierOutcome::Failed;
        }
    };

    if let Err(e) = write_frame(&mut stream, &message).await {
        debug!(%peer, error = %e, "write failed");
        return CourierOutcome::Failed;
    }

    let reply = timeout(reply_timeout, read_frame::<_, Reply>(&mut stream)).await;
    match reply {
        Ok(Ok(reply)) if reply.is_got_it() => CourierOutcome::GotIt,
        Ok(Ok(_)) => {
            debug!(%peer, "reply was not GOT_IT");
            CourierOutcome::Failed
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "failed reading reply");
            CourierOutcome::Failed
        }
        Err(_) => {
            debug!(%peer, "timed out awaiting GOT_IT");
            CourierOutcome::Failed
        }
    }
}
