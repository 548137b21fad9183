use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use super::{BlockStore, PeerAddr, PeerTransport, Ping, StoreError};
use crate::linked_data::{codec_name, verify_block, Cid};

/// Client for an IPFS-compatible node's HTTP RPC (`/api/v0/...`).
#[derive(Debug, Clone)]
pub struct RpcStore {
    remote: Url,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockPutResponse {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PingLine {
    success: bool,
    #[serde(default)]
    time: u64,
    #[serde(default)]
    text: String,
}

impl RpcStore {
    pub fn new(remote: &Url) -> Result<Self, StoreError> {
        let mut remote = remote.clone();
        if !remote.path().ends_with('/') {
            let path = format!("{}/", remote.path());
            remote.set_path(&path);
        }
        let client = Client::builder().build()?;
        Ok(Self { remote, client })
    }

    pub fn remote(&self) -> &Url {
        &self.remote
    }

    fn endpoint(&self, command: &str) -> Result<Url, StoreError> {
        Ok(self.remote.join(&format!("api/v0/{}", command))?)
    }

    async fn checked(response: Response) -> Result<Response, StoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(StoreError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }
}

#[async_trait]
impl BlockStore for RpcStore {
    async fn get(&self, cid: &Cid) -> Result<Bytes, StoreError> {
        tracing::debug!("RpcStore::get: {}", cid);
        let response = self
            .client
            .post(self.endpoint("block/get")?)
            .query(&[("arg", cid.to_string())])
            .send()
            .await?;
        let data = Self::checked(response).await?.bytes().await?;
        if !verify_block(cid, &data) {
            return Err(StoreError::Corrupt(*cid));
        }
        Ok(data)
    }

    async fn put(&self, codec: u64, data: Vec<u8>) -> Result<Cid, StoreError> {
        let codec_name = codec_name(codec).ok_or(StoreError::UnsupportedCodec(codec))?;
        let form = Form::new().part("file", Part::bytes(data));
        let response = self
            .client
            .post(self.endpoint("block/put")?)
            .query(&[
                ("cid-codec", codec_name),
                ("mhtype", "sha2-256"),
                ("pin", "true"),
            ])
            .multipart(form)
            .send()
            .await?;
        let body: BlockPutResponse = Self::checked(response).await?.json().await?;
        let cid = Cid::try_from(body.key.as_str())
            .map_err(|e| StoreError::UnexpectedResponse(format!("bad block key: {}", e)))?;
        tracing::debug!("RpcStore::put: stored {}", cid);
        Ok(cid)
    }
}

#[async_trait]
impl PeerTransport for RpcStore {
    async fn connect(&self, peer: &PeerAddr, timeout: Duration) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.endpoint("swarm/connect")?)
            .query(&[("arg", peer.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout(timeout)
                } else {
                    StoreError::Reqwest(e)
                }
            })?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unreachable(peer.clone(), body));
        }
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerAddr) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.endpoint("swarm/disconnect")?)
            .query(&[("arg", peer.as_str())])
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn ping(
        &self,
        peer: &PeerAddr,
    ) -> Result<BoxStream<'static, Result<Ping, StoreError>>, StoreError> {
        let target = peer.peer_id().unwrap_or(peer.as_str());
        let response = self
            .client
            .post(self.endpoint("ping")?)
            .query(&[("arg", target), ("count", "1")])
            .send()
            .await?;
        let response = Self::checked(response).await?;

        let peer = peer.clone();
        let pings = ndjson_lines(response).filter_map(move |line| {
            let parsed = match line {
                Ok(line) => parse_ping_line(&peer, &line),
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(parsed)
        });
        Ok(pings.boxed())
    }
}

/// Split a streaming response body into newline delimited records.
fn ndjson_lines(response: Response) -> impl futures::Stream<Item = Result<Vec<u8>, StoreError>> {
    let body = Box::pin(response.bytes_stream());
    stream::unfold(Some((body, Vec::new())), |state| async move {
        let (mut body, mut buf) = state?;
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                return Some((Ok(line), Some((body, buf))));
            }
            match body.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Some((Err(StoreError::from(e)), None)),
                None if buf.is_empty() => return None,
                None => return Some((Ok(std::mem::take(&mut buf)), Some((body, buf)))),
            }
        }
    })
}

/// A ping record is only a pong if it succeeded with a non-zero round trip;
/// the node interleaves informational records with `Time: 0`.
fn parse_ping_line(peer: &PeerAddr, line: &[u8]) -> Option<Result<Ping, StoreError>> {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }
    let record: PingLine = match serde_json::from_slice(line) {
        Ok(record) => record,
        Err(e) => return Some(Err(StoreError::UnexpectedResponse(e.to_string()))),
    };
    if !record.success {
        return Some(Err(StoreError::Unreachable(peer.clone(), record.text)));
    }
    if record.time == 0 {
        return None;
    }
    Some(Ok(Ping {
        time: Duration::from_nanos(record.time),
    }))
}
