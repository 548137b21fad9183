//! The `2.0.0` layout.
//!
//! Links carry what kind of content a file holds and its MIME type, so file
//! bytes and text are stored as plain raw blocks. Numbers, booleans and
//! records are stored as DAG-CBOR values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::{ContentError, ContentKind, FileContent};
use super::format::{EncodedContent, FormatError, TraversalOrder, TreeFormat};
use super::node::{FileMeta, Node, NodeLink};
use crate::crypto::Secret;
use crate::linked_data::{BlockEncoded, Cid, Codec, DagCborCodec, Ipld, LD_CBOR_CODEC, LD_RAW_CODEC};

pub struct CurrentFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireData {
    kind: ContentKind,
    mime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum WireLink {
    Dir(Cid, Option<Secret>),
    Data(Cid, Option<Secret>, WireData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct WireNode {
    links: BTreeMap<String, WireLink>,
}

impl BlockEncoded<DagCborCodec> for WireNode {}

impl TreeFormat for CurrentFormat {
    const VERSION: &'static str = "2.0.0";
    const ORDER: TraversalOrder = TraversalOrder::SelfThenChildren;

    fn decode_node(bytes: &[u8]) -> Result<Node, FormatError> {
        let node = WireNode::decode(bytes)?;
        Ok(node
            .links
            .into_iter()
            .map(|(name, link)| {
                let node_link = match link {
                    WireLink::Dir(cid, secret) => NodeLink::Dir { cid, secret },
                    WireLink::Data(cid, secret, data) => NodeLink::File {
                        cid,
                        secret,
                        meta: FileMeta {
                            kind: Some(data.kind),
                            mime: data.mime,
                        },
                    },
                };
                (name, node_link)
            })
            .collect())
    }

    fn encode_node(node: &Node) -> Result<(u64, Vec<u8>), FormatError> {
        let links = node
            .get_links()
            .iter()
            .map(|(name, link)| {
                let wire = match link {
                    NodeLink::Dir { cid, secret } => WireLink::Dir(*cid, secret.clone()),
                    NodeLink::File { cid, secret, meta } => WireLink::Data(
                        *cid,
                        secret.clone(),
                        WireData {
                            kind: meta.kind.unwrap_or(ContentKind::Bytes),
                            mime: meta.mime.clone(),
                        },
                    ),
                };
                (name.clone(), wire)
            })
            .collect();
        Ok((LD_CBOR_CODEC, WireNode { links }.encode()?))
    }

    fn decode_content(bytes: &[u8], meta: &FileMeta) -> Result<FileContent, FormatError> {
        let kind = meta.kind.unwrap_or(ContentKind::Bytes);
        match kind {
            ContentKind::Bytes => Ok(FileContent::Bytes(bytes.to_vec())),
            ContentKind::Text => Ok(FileContent::Text(String::from_utf8(bytes.to_vec())?)),
            ContentKind::Number | ContentKind::Boolean | ContentKind::Record => {
                let value: Ipld = DagCborCodec::decode(bytes)?;
                let content = FileContent::from_ipld(value)?;
                if content.kind() != kind {
                    return Err(ContentError::Unrepresentable(format!(
                        "link says {:?} but block holds {:?}",
                        kind,
                        content.kind()
                    ))
                    .into());
                }
                Ok(content)
            }
        }
    }

    fn encode_content(content: &FileContent, name: &str) -> Result<EncodedContent, FormatError> {
        let meta = FileMeta::new(content.kind());
        Ok(match content {
            FileContent::Bytes(bytes) => EncodedContent {
                codec: LD_RAW_CODEC,
                data: bytes.clone(),
                meta: meta.with_mime_from_name(name),
            },
            FileContent::Text(text) => EncodedContent {
                codec: LD_RAW_CODEC,
                data: text.as_bytes().to_vec(),
                meta: meta.with_mime_from_name(name),
            },
            other => EncodedContent {
                codec: LD_CBOR_CODEC,
                data: DagCborCodec::encode(&other.to_ipld()?)?,
                meta,
            },
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::linked_data::cid_for;

    #[test]
    fn test_text_is_stored_raw_with_mime() {
        let encoded = CurrentFormat::encode_content(&FileContent::from("hi"), "notes.txt").unwrap();
        assert_eq!(encoded.codec, LD_RAW_CODEC);
        assert_eq!(encoded.data, b"hi");
        assert_eq!(encoded.meta.kind, Some(ContentKind::Text));
        assert_eq!(encoded.meta.mime.as_deref(), Some("text/plain"));

        let decoded = CurrentFormat::decode_content(&encoded.data, &encoded.meta).unwrap();
        assert_eq!(decoded, FileContent::from("hi"));
    }

    #[test]
    fn test_structured_content_uses_cbor() {
        let encoded = CurrentFormat::encode_content(&FileContent::Boolean(true), "flag").unwrap();
        assert_eq!(encoded.codec, LD_CBOR_CODEC);
        assert_eq!(
            CurrentFormat::decode_content(&encoded.data, &encoded.meta).unwrap(),
            FileContent::Boolean(true)
        );

        let lying = FileMeta::new(ContentKind::Number);
        assert!(CurrentFormat::decode_content(&encoded.data, &lying).is_err());
    }

    #[test]
    fn test_non_finite_numbers_fail_to_encode() {
        assert!(matches!(
            CurrentFormat::encode_content(&FileContent::Number(f64::NAN), "n"),
            Err(FormatError::Content(ContentError::NonFinite(_)))
        ));
    }

    #[test]
    fn test_node_layout_keeps_file_meta() {
        let secret = Secret::generate();
        let node: Node = [
            (
                "sub".to_string(),
                NodeLink::Dir {
                    cid: cid_for(LD_RAW_CODEC, b"sub"),
                    secret: Some(secret.clone()),
                },
            ),
            (
                "photo.png".to_string(),
                NodeLink::File {
                    cid: cid_for(LD_RAW_CODEC, b"png"),
                    secret: None,
                    meta: FileMeta::new(ContentKind::Bytes).with_mime_from_name("photo.png"),
                },
            ),
        ]
        .into_iter()
        .collect();

        let (_, bytes) = CurrentFormat::encode_node(&node).unwrap();
        assert_eq!(CurrentFormat::decode_node(&bytes).unwrap(), node);
    }
}
