use std::error::Error;
use std::path::PathBuf;

use url::Url;

use crate::settings::{Settings, SettingsError};
use crate::state::{AccountContext, ConfigError};

#[derive(Clone)]
pub struct OpContext {
    /// Account service base URL
    pub remote: Url,
    /// Custom account config directory (defaults to ~/.config/fission)
    pub config_dir: Option<PathBuf>,
    /// Storage node RPC override
    pub store_api: Option<Url>,
    pub settings: Settings,
}

impl OpContext {
    pub fn new(
        remote: Url,
        config_dir: Option<PathBuf>,
        store_api: Option<Url>,
        settings_path: Option<PathBuf>,
    ) -> Result<Self, SettingsError> {
        Ok(Self {
            remote,
            config_dir,
            store_api,
            settings: Settings::load(settings_path.as_deref())?,
        })
    }

    /// Load and validate the account's configuration.
    pub fn account(&self) -> Result<AccountContext, ConfigError> {
        let dir = AccountContext::config_dir(self.config_dir.clone())?;
        AccountContext::load(&dir)
    }

    /// The storage node RPC endpoint: the override if given, else the node's.
    pub fn store_api(&self, account: &AccountContext) -> Url {
        self.store_api
            .clone()
            .unwrap_or_else(|| account.store_api.clone())
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
