use std::fmt;

use clap::Args;

use common::commit::{AccountClient, AccountError};
use common::linked_data::Cid;
use common::migration::{check_version, MigrateError, VersionMismatch};
use common::peering::{connect_cluster, ConnectError};
use common::store::{RpcStore, StoreError};
use common::tree::{CurrentFormat, LegacyFormat};

use crate::state::ConfigError;

#[derive(Args, Debug, Clone)]
pub struct Status;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage node: {0}")]
    Store(#[from] StoreError),
    #[error("account service: {0}")]
    Account(#[from] AccountError),
    #[error("couldn't connect to the storage cluster: {0}")]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

#[derive(Debug)]
pub struct StatusOutput {
    pub username: String,
    pub data_root: Option<Cid>,
    pub version: Option<String>,
    pub verdict: String,
}

impl fmt::Display for StatusOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "account:   {}", self.username)?;
        match &self.data_root {
            Some(root) => writeln!(f, "data root: {}", root)?,
            None => writeln!(f, "data root: none")?,
        }
        if let Some(version) = &self.version {
            writeln!(f, "version:   {}", version)?;
        }
        write!(f, "{}", self.verdict)
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Status {
    type Error = StatusError;
    type Output = StatusOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let account = ctx.account()?;
        let store = RpcStore::new(&ctx.store_api(&account))?;
        let client = AccountClient::new(&ctx.remote, &ctx.settings.account_service.api_version)?;
        let username = account.config.username.clone();

        let Some(root) = client.data_root(&username).await? else {
            return Ok(StatusOutput {
                username,
                data_root: None,
                version: None,
                verdict: "no filesystem attached to this account".to_string(),
            });
        };

        let config = ctx.settings.peering.link_config();
        connect_cluster(&store, &account.config.peers, &config).await?;

        let (version, verdict) =
            match check_version::<LegacyFormat, CurrentFormat, _>(&store, &root).await {
                Ok(version) => (version, "ready to migrate".to_string()),
                Err(MigrateError::Version(mismatch)) => {
                    let found = match &mismatch {
                        VersionMismatch::AlreadyMigrated { found } => found.clone(),
                        VersionMismatch::Unknown { found, .. } => found.clone(),
                    };
                    (found, mismatch.to_string())
                }
                Err(e) => return Err(e.into()),
            };

        Ok(StatusOutput {
            username,
            data_root: Some(root),
            version: Some(version),
            verdict,
        })
    }
}
