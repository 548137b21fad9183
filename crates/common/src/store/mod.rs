//! Narrow interfaces over the content-addressed storage layer.
//!
//! The migration only ever needs to get and put blocks, and to keep the
//! local storage node linked to the account's cluster peers. Both sides are
//! traits so tests can run against [`MemoryStore`] and a scripted transport
//! while the binary talks to a real node through [`RpcStore`].

mod memory;
mod peer_addr;
mod rpc;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::linked_data::{BlockEncoded, Cid, CodecError, LinkMap};

pub use memory::MemoryStore;
pub use peer_addr::{PeerAddr, PeerAddrError};
pub use rpc::RpcStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("block not found: {0}")]
    NotFound(Cid),
    #[error("block {0} failed hash verification")]
    Corrupt(Cid),
    #[error("block {0} has no link named {1:?}")]
    MissingLink(Cid, String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("unsupported codec: {0:#x}")]
    UnsupportedCodec(u64),
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(reqwest::StatusCode, String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("peer {0} unreachable: {1}")]
    Unreachable(PeerAddr, String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A successful liveness probe round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub time: Duration,
}

/// Get and put content-addressed blocks.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn get(&self, cid: &Cid) -> Result<Bytes, StoreError>;

    /// Store `data` under `codec`, returning its CID.
    async fn put(&self, codec: u64, data: Vec<u8>) -> Result<Cid, StoreError>;
}

/// Peer connection management on the storage node.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn connect(&self, peer: &PeerAddr, timeout: Duration) -> Result<(), StoreError>;

    async fn disconnect(&self, peer: &PeerAddr) -> Result<(), StoreError>;

    /// Open a stream of ping results against `peer`.
    async fn ping(
        &self,
        peer: &PeerAddr,
    ) -> Result<BoxStream<'static, Result<Ping, StoreError>>, StoreError>;
}

/// Follow the link `name` out of the link map stored at `root`.
pub async fn resolve_link<S>(store: &S, root: &Cid, name: &str) -> Result<Cid, StoreError>
where
    S: BlockStore + ?Sized,
{
    let links = LinkMap::decode(&store.get(root).await?)?;
    links
        .get(name)
        .copied()
        .ok_or_else(|| StoreError::MissingLink(*root, name.to_string()))
}

/// Fetch the block linked as `name` from the link map stored at `root`.
pub async fn cat_link<S>(store: &S, root: &Cid, name: &str) -> Result<Bytes, StoreError>
where
    S: BlockStore + ?Sized,
{
    let target = resolve_link(store, root, name).await?;
    store.get(&target).await
}
