use std::collections::BTreeMap;

use mime::Mime;

use super::entry::ContentKind;
use crate::crypto::Secret;
use crate::linked_data::Cid;

/**
 * Nodes
 * =====
 * A directory, as every tree format sees it once its block is decoded:
 *  a map of child names to links. Links point either at another
 *  directory node or at a file's content block.
 * Links inside the private partition carry the secret their target
 *  block is sealed with; public links carry none.
 * Each format decides how a node is laid out on the wire
 *  (see `TreeFormat`), this is the shared in-memory shape.
 */

/// What a directory link knows about the file it points at.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileMeta {
    /// How the content block is encoded. Formats that keep this inside the
    ///  block itself leave it unset.
    pub kind: Option<ContentKind>,
    pub mime: Option<String>,
}

impl FileMeta {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind: Some(kind),
            mime: None,
        }
    }

    /// Attach a MIME type guessed from a file name.
    pub fn with_mime_from_name(mut self, name: &str) -> Self {
        self.mime = mime_guess::from_path(name)
            .first()
            .map(|mime| mime.essence_str().to_string());
        self
    }

    pub fn mime(&self) -> Option<Mime> {
        self.mime.as_deref().and_then(|m| m.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeLink {
    Dir {
        cid: Cid,
        secret: Option<Secret>,
    },
    File {
        cid: Cid,
        secret: Option<Secret>,
        meta: FileMeta,
    },
}

impl NodeLink {
    pub fn cid(&self) -> &Cid {
        match self {
            NodeLink::Dir { cid, .. } => cid,
            NodeLink::File { cid, .. } => cid,
        }
    }

    pub fn secret(&self) -> Option<&Secret> {
        match self {
            NodeLink::Dir { secret, .. } => secret.as_ref(),
            NodeLink::File { secret, .. } => secret.as_ref(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeLink::Dir { .. })
    }
}

/// A directory: child names to links, kept in lexicographic order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    links: BTreeMap<String, NodeLink>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_link(&self, name: &str) -> Option<&NodeLink> {
        self.links.get(name)
    }

    pub fn insert(&mut self, name: String, link: NodeLink) -> Option<NodeLink> {
        self.links.insert(name, link)
    }

    pub fn get_links(&self) -> &BTreeMap<String, NodeLink> {
        &self.links
    }

    pub fn into_links(self) -> BTreeMap<String, NodeLink> {
        self.links
    }
}

impl FromIterator<(String, NodeLink)> for Node {
    fn from_iter<T: IntoIterator<Item = (String, NodeLink)>>(iter: T) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}
