use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PeerAddrError {
    #[error("peer address is empty")]
    Empty,
    #[error("peer address must be a multiaddr starting with '/': {0}")]
    NotMultiaddr(String),
}

/// A cluster peer's multiaddr, e.g.
/// `/dns4/node.example.net/tcp/4001/p2p/12D3KooW...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddr(String);

impl PeerAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The peer id component (`/p2p/<id>` or the older `/ipfs/<id>`), if present.
    pub fn peer_id(&self) -> Option<&str> {
        let mut parts = self.0.split('/');
        while let Some(part) = parts.next() {
            if part == "p2p" || part == "ipfs" {
                return parts.next().filter(|id| !id.is_empty());
            }
        }
        None
    }
}

impl FromStr for PeerAddr {
    type Err = PeerAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PeerAddrError::Empty);
        }
        if !s.starts_with('/') {
            return Err(PeerAddrError::NotMultiaddr(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for PeerAddr {
    type Error = PeerAddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddr> for String {
    fn from(addr: PeerAddr) -> Self {
        addr.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
