use super::entry::{ContentError, FileContent};
use super::node::{FileMeta, Node};
use crate::linked_data::CodecError;

/// How a reader walks directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Partition roots are not emitted. Every other directory is emitted
    /// while listing its parent, before its own contents.
    ChildrenOnly,
    /// Every directory, partition roots included, is emitted before its
    /// contents.
    SelfThenChildren,
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("text content is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A file's content block, ready to be stored.
#[derive(Debug, Clone)]
pub struct EncodedContent {
    pub codec: u64,
    pub data: Vec<u8>,
    pub meta: FileMeta,
}

/// The on-store layout of one tree version.
///
/// Both directions are synchronous and pure; fetching, sealing and storing
/// blocks is the reader's and writer's business.
pub trait TreeFormat: Send + Sync + 'static {
    /// Contents of the tree's `version` marker block.
    const VERSION: &'static str;
    /// The order readers of this format use unless told otherwise.
    const ORDER: TraversalOrder;

    fn decode_node(bytes: &[u8]) -> Result<Node, FormatError>;

    /// Returns the codec the node block is stored under and its bytes.
    fn encode_node(node: &Node) -> Result<(u64, Vec<u8>), FormatError>;

    fn decode_content(bytes: &[u8], meta: &FileMeta) -> Result<FileContent, FormatError>;

    /// `name` is the file's own name, used for metadata such as MIME types.
    fn encode_content(content: &FileContent, name: &str) -> Result<EncodedContent, FormatError>;
}
