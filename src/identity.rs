//! Identity and address types, and the Bully ordering rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// `(days_to_birthday, student_id)`, ordered lexicographically. The higher
/// pair wins an election; "higher" always means "closer to a birthday
/// further out" first, ID second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub days_to_birthday: u32,
    pub student_id: u64,
}

impl Identity {
    pub fn new(days_to_birthday: u32, student_id: u64) -> Self {
        Self {
            days_to_birthday,
            student_id,
        }
    }
}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.days_to_birthday
            .cmp(&other.days_to_birthday)
            .then(self.student_id.cmp(&other.student_id))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.days_to_birthday, self.student_id)
    }
}

/// `(host, port)`, the stable key for a peer. Identities can collide across
/// runs; addresses cannot within one.
///
/// Serializes as its `host:port` string form rather than a nested struct so
/// it can be used as a JSON object key in the HOWDY/ELECT membership
/// mapping (`serde_json` requires map keys to serialize as plain strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenAddress {
    pub addr: SocketAddr,
}

impl ListenAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

impl Serialize for ListenAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.addr)
    }
}

impl<'de> Deserialize<'de> for ListenAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let addr: SocketAddr = s.parse().map_err(serde::de::Error::custom)?;
        Ok(ListenAddress { addr })
    }
}

impl From<SocketAddr> for ListenAddress {
    fn from(addr: SocketAddr) -> Self {
        Self { addr }
    }
}
