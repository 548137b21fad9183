use std::marker::PhantomData;

use futures::Stream;

use super::entry::{Entry, EntryPath, Partition};
use super::format::{FormatError, TraversalOrder, TreeFormat};
use super::node::{FileMeta, Node, NodeLink};
use super::root::{RootBlock, RootError};
use crate::crypto::{ReadKey, Secret, SecretError};
use crate::linked_data::Cid;
use crate::store::{BlockStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("failed to load tree root {0}: {1}")]
    Root(Cid, RootError),
}

/// Why one block could not be turned into entries. Never escapes the reader;
///  it is logged and the affected entry or subtree is skipped.
#[derive(Debug, thiserror::Error)]
enum BlockError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to decrypt: {0}")]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Pending traversal work, kept on an explicit stack.
enum Frame {
    /// Start walking a partition from its root node.
    Partition(Partition),
    /// Emit a directory entry.
    Announce(EntryPath),
    /// Fetch a directory node and schedule its children.
    Expand {
        path: EntryPath,
        cid: Cid,
        secret: Option<Secret>,
    },
    /// Fetch and decode a file.
    Read {
        path: EntryPath,
        cid: Cid,
        secret: Option<Secret>,
        meta: FileMeta,
    },
}

/// A lazy, single pass walk over a versioned tree.
///
/// The public partition is walked to completion before the private one, each
///  depth first with children in name order. Nothing is fetched until
///  [`TreeReader::next`] is polled, and each call fetches only as much as it
///  needs to produce one entry.
///
/// Failures below the root are isolated: a file that cannot be fetched or
///  decoded is dropped, a directory that cannot be expanded is dropped along
///  with everything under it, and the walk carries on with the next sibling.
pub struct TreeReader<S, F> {
    store: S,
    root: RootBlock,
    read_key: ReadKey,
    order: TraversalOrder,
    stack: Vec<Frame>,
    _format: PhantomData<F>,
}

impl<S, F> TreeReader<S, F>
where
    S: BlockStore,
    F: TreeFormat,
{
    /// Load the root block at `root`. This is the only fatal failure point.
    pub async fn open(store: S, root: Cid, read_key: ReadKey) -> Result<Self, TreeError> {
        let root_block = RootBlock::load(&store, &root)
            .await
            .map_err(|e| TreeError::Root(root, e))?;
        tracing::debug!(
            "TreeReader::open: root {} (format {}), public {}, private {}",
            root,
            F::VERSION,
            root_block.public,
            root_block.private
        );

        let stack = Partition::ALL
            .iter()
            .rev()
            .map(|partition| Frame::Partition(*partition))
            .collect();

        Ok(Self {
            store,
            root: root_block,
            read_key,
            order: F::ORDER,
            stack,
            _format: PhantomData,
        })
    }

    /// Override the format's default traversal order.
    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> TraversalOrder {
        self.order
    }

    /// Produce the next entry, or `None` once the tree is exhausted.
    pub async fn next(&mut self) -> Option<Entry> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Partition(partition) => self.open_partition(partition),
                Frame::Announce(path) => return Some(Entry::Directory { path }),
                Frame::Expand { path, cid, secret } => {
                    match self.fetch_node(&cid, secret.as_ref()).await {
                        Ok(node) => self.schedule_children(&path, node),
                        Err(e) => {
                            tracing::warn!("skipping directory {} ({}): {}", path, cid, e);
                        }
                    }
                }
                Frame::Read {
                    path,
                    cid,
                    secret,
                    meta,
                } => match self.fetch_content(&cid, secret.as_ref(), &meta).await {
                    Ok(content) => return Some(Entry::File { path, content }),
                    Err(e) => {
                        tracing::warn!("skipping file {} ({}): {}", path, cid, e);
                    }
                },
            }
        }
        None
    }

    /// Adapt the reader into a `Stream` of entries.
    pub fn into_stream(self) -> impl Stream<Item = Entry> + Send
    where
        S: 'static,
    {
        futures::stream::unfold(self, |mut reader| async move {
            let entry = reader.next().await?;
            Some((entry, reader))
        })
    }

    fn open_partition(&mut self, partition: Partition) {
        let path = EntryPath::partition_root(partition);
        // the private root is sealed with the account read key,
        //  the public root is stored in the clear
        let (cid, secret) = match partition {
            Partition::Public => (self.root.public, None),
            Partition::Private => (self.root.private, Some(self.read_key.clone())),
        };
        self.stack.push(Frame::Expand {
            path: path.clone(),
            cid,
            secret,
        });
        if self.order == TraversalOrder::SelfThenChildren {
            self.stack.push(Frame::Announce(path));
        }
    }

    fn schedule_children(&mut self, parent: &EntryPath, node: Node) {
        // pushed in reverse so the smallest name is popped first
        for (name, link) in node.into_links().into_iter().rev() {
            if name.is_empty() {
                tracing::warn!("skipping unnamed entry under {}", parent);
                continue;
            }
            let path = parent.join(&name);
            match link {
                NodeLink::Dir { cid, secret } => {
                    self.stack.push(Frame::Expand {
                        path: path.clone(),
                        cid,
                        secret,
                    });
                    self.stack.push(Frame::Announce(path));
                }
                NodeLink::File { cid, secret, meta } => {
                    self.stack.push(Frame::Read {
                        path,
                        cid,
                        secret,
                        meta,
                    });
                }
            }
        }
    }

    async fn fetch_block(&self, cid: &Cid, secret: Option<&Secret>) -> Result<Vec<u8>, BlockError> {
        let bytes = self.store.get(cid).await?;
        Ok(match secret {
            Some(secret) => secret.decrypt(&bytes)?,
            None => bytes.to_vec(),
        })
    }

    async fn fetch_node(&self, cid: &Cid, secret: Option<&Secret>) -> Result<Node, BlockError> {
        let bytes = self.fetch_block(cid, secret).await?;
        Ok(F::decode_node(&bytes)?)
    }

    async fn fetch_content(
        &self,
        cid: &Cid,
        secret: Option<&Secret>,
        meta: &FileMeta,
    ) -> Result<super::entry::FileContent, BlockError> {
        let bytes = self.fetch_block(cid, secret).await?;
        Ok(F::decode_content(&bytes, meta)?)
    }
}
