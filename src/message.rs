//! Wire format: a length-prefixed frame carrying a `(name, payload)` pair,
//! or the bare string `"GOT_IT"` as a reply. Grounded in
//! `CloudP2P::Connection::{read_message,write_message}` (4-byte big-endian
//! length prefix + serialized body), generalized from that example's single
//! `Message` enum to the four-tag union spec.md §6 describes plus the
//! untagged bare-string reply.

use crate::error::NodeError;
use crate::identity::{Identity, ListenAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Cap on a single frame's declared length, guarding against a peer that
/// sends a bogus length prefix and stalls us reading garbage forever.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub type MembershipPayload = HashMap<ListenAddress, Identity>;

/// Tagged union of everything a peer (or the GCD) can send us.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum InboundMessage {
    #[serde(rename = "HOWDY")]
    Howdy {
        identity: Identity,
        listen_addr: ListenAddress,
    },
    #[serde(rename = "ELECT")]
    Elect { members: MembershipPayload },
    #[serde(rename = "I_AM_LEADER")]
    IAmLeader { identity: Identity },
    #[serde(rename = "PROBE")]
    Probe,
}

/// The two shapes a reply can take: the bare `"GOT_IT"` string, or (HOWDY
/// only) a membership mapping. Never a tagged `(name, payload)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    GotIt(String),
    Membership(MembershipPayload),
}

impl Reply {
    pub fn got_it() -> Self {
        Reply::GotIt("GOT_IT".to_string())
    }

    pub fn is_got_it(&self) -> bool {
        matches!(self, Reply::GotIt(s) if s == "GOT_IT")
    }
}

/// Read one length-prefixed JSON frame and decode it as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, NodeError>
where
    R: AsyncReadExt + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let peer = unknown_peer();
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|source| NodeError::Transport { peer, source })?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(NodeError::Decode {
            peer,
            reason: format!("frame of {len} bytes exceeds {MAX_FRAME_BYTES} byte cap"),
        });
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|source| NodeError::Transport { peer, source })?;

    serde_json::from_slice(&body).map_err(|e| NodeError::Decode {
        peer,
        reason: e.to_string(),
    })
}

/// Encode `value` and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), NodeError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let peer = unknown_peer();
    let body = serde_json::to_vec(value).expect("wire types always serialize");
    let len = body.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|source| NodeError::Transport { peer, source })?;
    writer
        .write_all(&body)
        .await
        .map_err(|source| NodeError::Transport { peer, source })?;
    writer
        .flush()
        .await
        .map_err(|source| NodeError::Transport { peer, source })
}

/// Transport errors here are reported without a concrete peer address
/// (the framing layer doesn't track the socket's remote address); callers
/// that do know the peer (couriers, the GCD client) attach it themselves
/// when converting io errors directly instead of going through this path.
fn unknown_peer() -> SocketAddr {
    "0.0.0.0:0".parse().unwrap()
}
