use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use super::{BlockStore, PeerAddr, PeerTransport, Ping, StoreError};
use crate::linked_data::{cid_for, Cid};

/// An in-process block store and loopback transport.
///
/// Every peer is reachable and answers pings instantly. Blocks can be dropped
/// with [`MemoryStore::remove`] to simulate missing data.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    blocks: Arc<RwLock<HashMap<Cid, Bytes>>>,
    connected: Arc<RwLock<HashSet<PeerAddr>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.blocks.read().contains_key(cid)
    }

    pub fn remove(&self, cid: &Cid) -> Option<Bytes> {
        self.blocks.write().remove(cid)
    }

    /// Overwrite the bytes behind `cid` without touching its address.
    pub fn corrupt(&self, cid: &Cid, data: impl Into<Bytes>) {
        self.blocks.write().insert(*cid, data.into());
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    pub fn is_connected(&self, peer: &PeerAddr) -> bool {
        self.connected.read().contains(peer)
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn get(&self, cid: &Cid) -> Result<Bytes, StoreError> {
        self.blocks
            .read()
            .get(cid)
            .cloned()
            .ok_or(StoreError::NotFound(*cid))
    }

    async fn put(&self, codec: u64, data: Vec<u8>) -> Result<Cid, StoreError> {
        let cid = cid_for(codec, &data);
        self.blocks.write().insert(cid, Bytes::from(data));
        Ok(cid)
    }
}

#[async_trait]
impl PeerTransport for MemoryStore {
    async fn connect(&self, peer: &PeerAddr, _timeout: Duration) -> Result<(), StoreError> {
        self.connected.write().insert(peer.clone());
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerAddr) -> Result<(), StoreError> {
        self.connected.write().remove(peer);
        Ok(())
    }

    async fn ping(
        &self,
        peer: &PeerAddr,
    ) -> Result<BoxStream<'static, Result<Ping, StoreError>>, StoreError> {
        if !self.is_connected(peer) {
            return Err(StoreError::Unreachable(
                peer.clone(),
                "not connected".to_string(),
            ));
        }
        Ok(stream::once(async {
            Ok(Ping {
                time: Duration::from_millis(1),
            })
        })
        .boxed())
    }
}
