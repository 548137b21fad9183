use std::fmt;
use std::io::Write;

use clap::Args;

use common::commit::{AccountClient, AccountError, CommitError, ConfirmedRoot, RootCommitter};
use common::linked_data::Cid;
use common::migration::{MigrateError, Migration, MigrationSummary};
use common::peering::{Cluster, ConnectError, LogReporter};
use common::store::{BlockStore, RpcStore, StoreError};

use crate::process::graceful_shutdown_blocker;
use crate::state::ConfigError;

#[derive(Args, Debug, Clone)]
pub struct Migrate {
    /// Publish the migrated tree without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateOpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage node: {0}")]
    Store(#[from] StoreError),
    #[error("account service: {0}")]
    Account(#[from] AccountError),
    #[error(
        "account {0} either doesn't exist or has no filesystem attached. \
         Link a browser-based account first."
    )]
    NoFilesystem(String),
    #[error("couldn't connect to the storage cluster: {0}")]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("interrupted; the published data root was left unchanged")]
    Interrupted,
}

#[derive(Debug)]
pub struct MigrateOutput {
    pub summary: MigrationSummary,
}

impl fmt::Display for MigrateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration done!")?;
        writeln!(f, "  previous root: {}", self.summary.source_root)?;
        writeln!(f, "  new root:      {}", self.summary.migrated_root)?;
        write!(f, "  entries:       {} written", self.summary.written)?;
        if !self.summary.failures.is_empty() {
            write!(f, ", {} skipped:", self.summary.failures.len())?;
            for failure in &self.summary.failures {
                write!(f, "\n    {}: {}", failure.path, failure.reason)?;
            }
        }
        Ok(())
    }
}

/// Final say on whether a migrated tree replaces the published one.
#[async_trait::async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, summary: &MigrationSummary) -> Result<bool, std::io::Error>;
}

/// Asks on the terminal. Anything but yes is a no.
pub struct Prompt;

#[async_trait::async_trait]
impl Confirm for Prompt {
    async fn confirm(&self, summary: &MigrationSummary) -> Result<bool, std::io::Error> {
        let question = format!(
            "Are you sure you want to overwrite your filesystem with the migrated version {}?",
            summary.migrated_root
        );
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            write!(stdout, "{} [y/N] ", question)?;
            stdout.flush()?;

            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer)?;
            Ok(is_yes(&answer))
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

/// Accepts without asking.
pub struct AssumeYes;

#[async_trait::async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _summary: &MigrationSummary) -> Result<bool, std::io::Error> {
        Ok(true)
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Migrate {
    type Error = MigrateOpError;
    type Output = MigrateOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let account = ctx.account()?;
        let store = RpcStore::new(&ctx.store_api(&account))?;
        let client = AccountClient::new(&ctx.remote, &ctx.settings.account_service.api_version)?;

        let username = &account.config.username;
        tracing::info!("Looking up data root for {}", username);
        let source_root = client
            .data_root(username)
            .await?
            .ok_or_else(|| MigrateOpError::NoFilesystem(username.clone()))?;
        tracing::info!("Data root is {}", source_root);

        let (signal_waiter, shutdown_tx, shutdown_rx) = graceful_shutdown_blocker()?;
        let cluster = match Cluster::connect(
            store.clone(),
            account.config.peers.clone(),
            ctx.settings.peering.link_config(),
            LogReporter,
            shutdown_rx.clone(),
        )
        .await
        {
            Ok(cluster) => cluster,
            Err(e) => {
                signal_waiter.abort();
                return Err(match e {
                    ConnectError::Cancelled => MigrateOpError::Interrupted,
                    e => e.into(),
                });
            }
        };

        let migration = Migration::new(store.clone(), account.read_key.clone());
        let committer = RootCommitter::new(
            store,
            client,
            account.write_key.clone(),
            account.config.server_did.clone(),
        )
        .with_root_proof(account.root_proof);
        let confirm: Box<dyn Confirm> = if self.yes {
            Box::new(AssumeYes)
        } else {
            Box::new(Prompt)
        };

        let mut interrupted = shutdown_rx;
        let result = tokio::select! {
            result = migrate_and_publish(migration, source_root, &committer, confirm.as_ref()) => result,
            _ = interrupted.changed() => Err(MigrateOpError::Interrupted),
        };

        tracing::info!("Shutting down peer links...");
        let _ = shutdown_tx.send(());
        cluster.join().await;
        signal_waiter.abort();

        result
    }
}

/// Migrate `source_root` and, once `confirm` agrees, publish the result.
///
/// Nothing reaches the account service before confirmation; a declined or
///  failed migration leaves the published root as it was.
async fn migrate_and_publish<S, C>(
    mut migration: Migration<S>,
    source_root: Cid,
    committer: &RootCommitter<S>,
    confirm: &C,
) -> Result<MigrateOutput, MigrateOpError>
where
    S: BlockStore + Clone,
    C: Confirm + ?Sized,
{
    let summary = migration.run(source_root).await?;
    for failure in &summary.failures {
        tracing::warn!("not migrated: {}: {}", failure.path, failure.reason);
    }

    if !confirm.confirm(&summary).await? {
        return Err(MigrateError::Cancelled.into());
    }

    committer
        .publish(ConfirmedRoot::confirmed(summary.migrated_root))
        .await?;

    Ok(MigrateOutput { summary })
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::put;
    use axum::Router;
    use parking_lot::Mutex;

    use common::crypto::{Secret, WriteKey};
    use common::migration::VersionMismatch;
    use common::store::MemoryStore;
    use common::tree::{CurrentFormat, Entry, LegacyFormat, TreeFormat, TreeWriter};

    use super::*;

    /// Data root updates received by the stub account service.
    type Puts = Arc<Mutex<Vec<String>>>;

    async fn update(State(puts): State<Puts>, Path(cid): Path<String>) -> StatusCode {
        puts.lock().push(cid);
        StatusCode::NO_CONTENT
    }

    async fn account_service(puts: &Puts) -> AccountClient {
        let app = Router::new()
            .route("/v2/api/user/data/:cid", put(update))
            .with_state(puts.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url: url::Url = format!("http://{}", addr).parse().unwrap();
        AccountClient::new(&url, "v2").unwrap()
    }

    /// Answers with `accept`, noting how many updates the service had seen
    ///  at the moment it was asked.
    struct Answer {
        accept: bool,
        puts: Puts,
        asked: Mutex<Vec<usize>>,
    }

    impl Answer {
        fn new(accept: bool, puts: &Puts) -> Self {
            Self {
                accept,
                puts: puts.clone(),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Confirm for Answer {
        async fn confirm(&self, _summary: &MigrationSummary) -> Result<bool, std::io::Error> {
            self.asked.lock().push(self.puts.lock().len());
            Ok(self.accept)
        }
    }

    async fn tree<F: TreeFormat>(store: &MemoryStore, read_key: &Secret) -> Cid {
        let mut writer = TreeWriter::<_, F>::new(store.clone(), read_key.clone());
        for (path, content) in [("/public/a.txt", "hello"), ("/private/b/c.txt", "secret")] {
            writer
                .consume(Entry::File {
                    path: path.parse().unwrap(),
                    content: content.into(),
                })
                .await;
        }
        writer.finish().await.unwrap().root
    }

    struct Harness {
        store: MemoryStore,
        read_key: Secret,
        puts: Puts,
        committer: RootCommitter<MemoryStore>,
    }

    impl Harness {
        async fn new() -> Self {
            let store = MemoryStore::new();
            let puts = Puts::default();
            let committer = RootCommitter::new(
                store.clone(),
                account_service(&puts).await,
                WriteKey::generate(),
                "did:key:z6MkServer",
            );
            Self {
                store,
                read_key: Secret::generate(),
                puts,
                committer,
            }
        }

        async fn migrate(&self, source: Cid, answer: &Answer) -> Result<MigrateOutput, MigrateOpError> {
            let migration = Migration::new(self.store.clone(), self.read_key.clone());
            migrate_and_publish(migration, source, &self.committer, answer).await
        }
    }

    #[tokio::test]
    async fn test_publishes_once_after_confirmation() {
        let harness = Harness::new().await;
        let source = tree::<LegacyFormat>(&harness.store, &harness.read_key).await;
        let answer = Answer::new(true, &harness.puts);

        let output = harness.migrate(source, &answer).await.unwrap();

        // asked before anything was sent
        assert_eq!(*answer.asked.lock(), [0]);
        assert_eq!(
            *harness.puts.lock(),
            [output.summary.migrated_root.to_string()]
        );
    }

    #[tokio::test]
    async fn test_declined_migration_is_not_published() {
        let harness = Harness::new().await;
        let source = tree::<LegacyFormat>(&harness.store, &harness.read_key).await;
        let answer = Answer::new(false, &harness.puts);

        let result = harness.migrate(source, &answer).await;

        assert!(matches!(
            result,
            Err(MigrateOpError::Migrate(MigrateError::Cancelled))
        ));
        assert_eq!(answer.asked.lock().len(), 1);
        assert!(harness.puts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_migrated_account_is_neither_asked_nor_published() {
        let harness = Harness::new().await;
        let source = tree::<CurrentFormat>(&harness.store, &harness.read_key).await;
        let answer = Answer::new(true, &harness.puts);

        let result = harness.migrate(source, &answer).await;

        assert!(matches!(
            result,
            Err(MigrateOpError::Migrate(MigrateError::Version(
                VersionMismatch::AlreadyMigrated { .. }
            )))
        ));
        assert!(answer.asked.lock().is_empty());
        assert!(harness.puts.lock().is_empty());
    }

    #[test]
    fn test_only_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" Yes \n"));
        assert!(!is_yes("\n"));
        assert!(!is_yes("n\n"));
        assert!(!is_yes("yep\n"));
    }
}
