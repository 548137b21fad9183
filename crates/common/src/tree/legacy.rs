//! The `1.0.0` layout.
//!
//! Directory nodes list entries with an `isFile` flag and an optional
//! per-entry key. File blocks are self-describing DAG-CBOR: either an inline
//! value or a handle to externally chunked data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::{ContentError, FileContent};
use super::format::{EncodedContent, FormatError, TraversalOrder, TreeFormat};
use super::node::{FileMeta, Node, NodeLink};
use crate::crypto::Secret;
use crate::linked_data::{BlockEncoded, Cid, DagCborCodec, Ipld, LD_CBOR_CODEC};

pub struct LegacyFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LegacyNode {
    pub entries: BTreeMap<String, LegacyLink>,
}

impl BlockEncoded<DagCborCodec> for LegacyNode {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyLink {
    pub cid: Cid,
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegacyFile {
    Inline(Ipld),
    /// Content split across separately stored chunks. Only a handle; the
    ///  chunks themselves are not followed.
    Chunked { size: u64, chunks: Vec<Cid> },
}

impl BlockEncoded<DagCborCodec> for LegacyFile {}

impl TreeFormat for LegacyFormat {
    const VERSION: &'static str = "1.0.0";
    const ORDER: TraversalOrder = TraversalOrder::ChildrenOnly;

    fn decode_node(bytes: &[u8]) -> Result<Node, FormatError> {
        let node = LegacyNode::decode(bytes)?;
        Ok(node
            .entries
            .into_iter()
            .map(|(name, link)| {
                let node_link = if link.is_file {
                    NodeLink::File {
                        cid: link.cid,
                        secret: link.key,
                        meta: FileMeta::default(),
                    }
                } else {
                    NodeLink::Dir {
                        cid: link.cid,
                        secret: link.key,
                    }
                };
                (name, node_link)
            })
            .collect())
    }

    fn encode_node(node: &Node) -> Result<(u64, Vec<u8>), FormatError> {
        let entries = node
            .get_links()
            .iter()
            .map(|(name, link)| {
                let legacy = LegacyLink {
                    cid: *link.cid(),
                    is_file: !link.is_dir(),
                    key: link.secret().cloned(),
                };
                (name.clone(), legacy)
            })
            .collect();
        Ok((LD_CBOR_CODEC, LegacyNode { entries }.encode()?))
    }

    fn decode_content(bytes: &[u8], _meta: &FileMeta) -> Result<FileContent, FormatError> {
        match LegacyFile::decode(bytes)? {
            LegacyFile::Inline(value) => Ok(FileContent::from_ipld(value)?),
            LegacyFile::Chunked { size, chunks } => Err(ContentError::Unrepresentable(format!(
                "chunked blob of {} bytes in {} chunks",
                size,
                chunks.len()
            ))
            .into()),
        }
    }

    fn encode_content(content: &FileContent, _name: &str) -> Result<EncodedContent, FormatError> {
        let file = LegacyFile::Inline(content.to_ipld()?);
        Ok(EncodedContent {
            codec: LD_CBOR_CODEC,
            data: file.encode()?,
            meta: FileMeta::default(),
        })
    }
}
