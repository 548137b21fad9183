//! Moving a tree from the legacy format to the current one.

use std::marker::PhantomData;

use crate::crypto::ReadKey;
use crate::linked_data::Cid;
use crate::store::BlockStore;
use crate::tree::{
    read_version, CurrentFormat, Entry, LegacyFormat, RootError, TreeError, TreeFormat, TreeReader,
    TreeWriter, WriteError, WriteFailure,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionMismatch {
    #[error("filesystem is already at version {found}; this account has already been migrated")]
    AlreadyMigrated { found: String },
    #[error(
        "expected filesystem version {expected}, found {found}; a newer release of this tool may be needed"
    )]
    Unknown { expected: String, found: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error(transparent)]
    Version(#[from] VersionMismatch),
    #[error("failed to read filesystem version: {0}")]
    Root(#[from] RootError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("failed to finish migrated tree: {0}")]
    Write(#[from] WriteError),
    #[error("cancelled by user")]
    Cancelled,
}

/// Outcome of a migration run. The migrated root is stored but not published.
#[derive(Debug, Clone)]
pub struct MigrationSummary {
    pub source_root: Cid,
    pub migrated_root: Cid,
    pub written: usize,
    pub failures: Vec<WriteFailure>,
}

/// Rewrites or drops an entry on its way to the new tree.
pub type Transform = Box<dyn FnMut(Entry) -> Option<Entry> + Send + Sync>;

/// Require the tree at `root` to be in `Src`'s format, returning its version.
pub async fn check_version<Src, Dst, S>(store: &S, root: &Cid) -> Result<String, MigrateError>
where
    Src: TreeFormat,
    Dst: TreeFormat,
    S: BlockStore + ?Sized,
{
    let found = read_version(store, root).await?;
    if found == Src::VERSION {
        Ok(found)
    } else if found == Dst::VERSION {
        Err(VersionMismatch::AlreadyMigrated { found }.into())
    } else {
        Err(VersionMismatch::Unknown {
            expected: Src::VERSION.to_string(),
            found,
        }
        .into())
    }
}

/// Reads a tree in format `Src` and rebuilds it, entry by entry, in `Dst`.
pub struct Migration<S, Src = LegacyFormat, Dst = CurrentFormat> {
    store: S,
    read_key: ReadKey,
    transform: Option<Transform>,
    _formats: PhantomData<(Src, Dst)>,
}

impl<S> Migration<S> {
    pub fn new(store: S, read_key: ReadKey) -> Self {
        Self {
            store,
            read_key,
            transform: None,
            _formats: PhantomData,
        }
    }
}

impl<S, Src, Dst> Migration<S, Src, Dst>
where
    S: BlockStore + Clone,
    Src: TreeFormat,
    Dst: TreeFormat,
{
    pub fn with_transform<T>(mut self, transform: T) -> Self
    where
        T: FnMut(Entry) -> Option<Entry> + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub async fn check(&self, root: &Cid) -> Result<String, MigrateError> {
        check_version::<Src, Dst, _>(&self.store, root).await
    }

    /// Migrate the tree at `source_root`.
    ///
    /// Entries flow one at a time from reader to writer. Entries the reader
    ///  cannot load are skipped by the reader, entries the writer rejects are
    ///  listed in the summary; only the version check, the source root and
    ///  the final root write can fail the run.
    pub async fn run(&mut self, source_root: Cid) -> Result<MigrationSummary, MigrateError> {
        let version = check_version::<Src, Dst, _>(&self.store, &source_root).await?;
        tracing::info!(
            "migrating {} from version {} to {}",
            source_root,
            version,
            Dst::VERSION
        );

        let mut reader =
            TreeReader::<_, Src>::open(self.store.clone(), source_root, self.read_key.clone())
                .await?;
        let mut writer = TreeWriter::<_, Dst>::new(self.store.clone(), self.read_key.clone());

        while let Some(entry) = reader.next().await {
            tracing::info!("Processing {}", entry.path());
            let entry = match self.transform.as_mut() {
                Some(transform) => match transform(entry) {
                    Some(entry) => entry,
                    None => continue,
                },
                None => entry,
            };
            writer.consume(entry).await;
        }
        tracing::info!(
            "source tree exhausted: {} entries written, {} rejected; storing directories",
            writer.written(),
            writer.failures().len()
        );

        let summary = writer.finish().await?;
        tracing::info!("finished migration: {}", summary.root);
        Ok(MigrationSummary {
            source_root,
            migrated_root: summary.root,
            written: summary.written,
            failures: summary.failures,
        })
    }
}
