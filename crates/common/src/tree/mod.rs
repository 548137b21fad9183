//! Versioned trees and the pipeline that moves entries between them.
//!
//! A tree is a root block linking a version marker and two partitions of
//! directory nodes. [`TreeReader`] walks a tree in some [`TreeFormat`] and
//! yields [`Entry`] values; [`TreeWriter`] consumes entries and builds a
//! tree in another format.

mod current;
mod entry;
mod format;
pub mod legacy;
mod node;
mod reader;
mod root;
mod writer;

pub use current::CurrentFormat;
pub use entry::{ContentError, ContentKind, Entry, EntryPath, FileContent, Partition, PathError};
pub use format::{EncodedContent, FormatError, TraversalOrder, TreeFormat};
pub use legacy::LegacyFormat;
pub use node::{FileMeta, Node, NodeLink};
pub use reader::{TreeError, TreeReader};
pub use root::{read_version, RootBlock, RootError, PRIVATE_LINK, PUBLIC_LINK, VERSION_LINK};
pub use writer::{TreeWriter, WriteError, WriteFailure, WriteSummary};
