//! Error kinds (spec.md §7).

use std::net::SocketAddr;
use thiserror::Error;

/// The four error kinds spec.md distinguishes. Transport and decode errors
/// are swallowed at the boundary where they occur; GCD-unreachable and bind
/// errors are fatal at startup and tolerated afterward.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error talking to {peer}: {source}")]
    Transport {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed inbound message from {peer}: {reason}")]
    Decode { peer: SocketAddr, reason: String },

    #[error("GCD at {gcd} unreachable: {source}")]
    GcdUnreachable {
        gcd: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, NodeError>;
