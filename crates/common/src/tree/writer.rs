use std::collections::BTreeMap;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};

use super::entry::{Entry, EntryPath, FileContent, Partition};
use super::format::{FormatError, TreeFormat};
use super::node::{Node, NodeLink};
use super::root::{RootBlock, RootError};
use crate::crypto::{ReadKey, Secret, SecretError};
use crate::linked_data::{Cid, LD_RAW_CODEC};
use crate::store::{BlockStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("{0} is not under a known partition")]
    UnknownPartition(EntryPath),
    #[error("cannot write file content at partition root {0}")]
    PartitionRoot(EntryPath),
    #[error("cannot create {path}: {at} is a file")]
    NotADirectory { path: EntryPath, at: EntryPath },
    #[error("cannot write file {0}: a directory exists there")]
    IsADirectory(EntryPath),
    #[error("failed to encode {0}: {1}")]
    Format(EntryPath, FormatError),
    #[error("failed to seal block: {0}")]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode directory node: {0}")]
    Node(#[from] FormatError),
    #[error(transparent)]
    Root(#[from] RootError),
}

/// An entry the writer gave up on.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    pub path: EntryPath,
    pub reason: String,
}

/// Outcome of a finished write.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Root of the new tree. Addressable in the store, but not published.
    pub root: Cid,
    pub written: usize,
    pub failures: Vec<WriteFailure>,
}

enum Pending {
    Dir(PendingDir),
    File(NodeLink),
}

#[derive(Default)]
struct PendingDir {
    children: BTreeMap<String, Pending>,
}

impl PendingDir {
    /// Walk `segments` down from this directory, creating what is missing.
    fn ensure_dir(&mut self, path: &EntryPath, segments: &[String]) -> Result<&mut PendingDir, WriteError> {
        let mut dir = self;
        for (depth, name) in segments.iter().enumerate() {
            let child = dir
                .children
                .entry(name.clone())
                .or_insert_with(|| Pending::Dir(PendingDir::default()));
            dir = match child {
                Pending::Dir(sub) => sub,
                Pending::File(_) => {
                    return Err(WriteError::NotADirectory {
                        path: path.clone(),
                        // partition segment plus everything up to this one
                        at: path.truncated(depth + 2),
                    })
                }
            };
        }
        Ok(dir)
    }
}

/// Builds a tree in format `F` from a sequence of entries.
///
/// Entries are applied in the order they arrive. File content is encoded and
///  stored immediately; directory nodes are held in memory and only stored by
///  [`TreeWriter::finish`], deepest first.
pub struct TreeWriter<S, F> {
    store: S,
    read_key: ReadKey,
    public: PendingDir,
    private: PendingDir,
    written: usize,
    failures: Vec<WriteFailure>,
    _format: PhantomData<F>,
}

impl<S, F> TreeWriter<S, F>
where
    S: BlockStore,
    F: TreeFormat,
{
    pub fn new(store: S, read_key: ReadKey) -> Self {
        Self {
            store,
            read_key,
            public: PendingDir::default(),
            private: PendingDir::default(),
            written: 0,
            failures: Vec::new(),
            _format: PhantomData,
        }
    }

    /// Apply one entry.
    ///
    /// Creating a directory that already exists is a no-op; writing a file
    ///  replaces any earlier file at the same path. Missing ancestors are
    ///  created in both cases.
    pub async fn write(&mut self, entry: Entry) -> Result<(), WriteError> {
        match entry {
            Entry::Directory { path } => {
                let partition = path
                    .partition()
                    .ok_or_else(|| WriteError::UnknownPartition(path.clone()))?;
                self.partition_mut(partition)
                    .ensure_dir(&path, path.relative())?;
                tracing::debug!("TreeWriter::write: directory {}", path);
            }
            Entry::File { path, content } => {
                let partition = path
                    .partition()
                    .ok_or_else(|| WriteError::UnknownPartition(path.clone()))?;
                if path.is_partition_root() {
                    return Err(WriteError::PartitionRoot(path));
                }
                let link = self.store_content(partition, &path, &content).await?;

                let relative = path.relative();
                let (name, parents) = relative
                    .split_last()
                    .ok_or_else(|| WriteError::PartitionRoot(path.clone()))?;
                let parent = self.partition_mut(partition).ensure_dir(&path, parents)?;
                if let Some(Pending::Dir(_)) = parent.children.get(name) {
                    return Err(WriteError::IsADirectory(path));
                }
                parent.children.insert(name.clone(), Pending::File(link));
                tracing::debug!("TreeWriter::write: file {}", path);
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Apply one entry, recording instead of returning a failure.
    pub async fn consume(&mut self, entry: Entry) {
        let path = entry.path().clone();
        if let Err(e) = self.write(entry).await {
            tracing::warn!("skipping {}: {}", path, e);
            self.failures.push(WriteFailure {
                path,
                reason: e.to_string(),
            });
        }
    }

    /// Consume a whole entry stream, one entry at a time.
    pub async fn write_all<St>(&mut self, entries: St)
    where
        St: Stream<Item = Entry>,
    {
        let mut entries = std::pin::pin!(entries);
        while let Some(entry) = entries.next().await {
            self.consume(entry).await;
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failures(&self) -> &[WriteFailure] {
        &self.failures
    }

    /// Store every directory node and the root, returning the new root.
    pub async fn finish(self) -> Result<WriteSummary, WriteError> {
        let Self {
            store,
            read_key,
            public,
            private,
            written,
            failures,
            ..
        } = self;

        let public = Self::persist_dir(&store, public, None).await?;
        let private = Self::persist_dir(&store, private, Some(read_key)).await?;
        let root = RootBlock::store(&store, F::VERSION, public, private).await?;

        tracing::info!(
            "finished {} tree {}: {} entries written, {} failed",
            F::VERSION,
            root,
            written,
            failures.len()
        );
        Ok(WriteSummary {
            root,
            written,
            failures,
        })
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut PendingDir {
        match partition {
            Partition::Public => &mut self.public,
            Partition::Private => &mut self.private,
        }
    }

    async fn store_content(
        &self,
        partition: Partition,
        path: &EntryPath,
        content: &FileContent,
    ) -> Result<NodeLink, WriteError> {
        let encoded =
            F::encode_content(content, path.name()).map_err(|e| WriteError::Format(path.clone(), e))?;
        let (codec, data, secret) = match partition {
            Partition::Public => (encoded.codec, encoded.data, None),
            Partition::Private => {
                let secret = Secret::generate();
                let sealed = secret.encrypt(&encoded.data)?;
                (LD_RAW_CODEC, sealed, Some(secret))
            }
        };
        let cid = self.store.put(codec, data).await?;
        Ok(NodeLink::File {
            cid,
            secret,
            meta: encoded.meta,
        })
    }

    /// Store `dir` and everything under it. A sealed directory (the private
    ///  partition) seals each child directory with a fresh secret of its own.
    fn persist_dir<'a>(
        store: &'a S,
        dir: PendingDir,
        seal: Option<Secret>,
    ) -> BoxFuture<'a, Result<Cid, WriteError>> {
        async move {
            let mut node = Node::new();
            for (name, child) in dir.children {
                let link = match child {
                    Pending::File(link) => link,
                    Pending::Dir(sub) => {
                        let secret = seal.as_ref().map(|_| Secret::generate());
                        let cid = Self::persist_dir(store, sub, secret.clone()).await?;
                        NodeLink::Dir { cid, secret }
                    }
                };
                node.insert(name, link);
            }

            let (codec, bytes) = F::encode_node(&node)?;
            let cid = match seal {
                Some(secret) => store.put(LD_RAW_CODEC, secret.encrypt(&bytes)?).await?,
                None => store.put(codec, bytes).await?,
            };
            Ok(cid)
        }
        .boxed()
    }
}
