pub use clap::Parser;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

pub const PRODUCTION_REMOTE: &str = "https://runfission.com";
pub const STAGING_REMOTE: &str = "https://runfission.net";

/// Which account service to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remote {
    Production,
    Staging,
    Custom(Url),
}

impl Remote {
    pub fn url(&self) -> Url {
        match self {
            Remote::Production => Url::parse(PRODUCTION_REMOTE).expect("hardcoded URL must parse"),
            Remote::Staging => Url::parse(STAGING_REMOTE).expect("hardcoded URL must parse"),
            Remote::Custom(url) => url.clone(),
        }
    }
}

impl FromStr for Remote {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Remote::Production),
            "staging" => Ok(Remote::Staging),
            other => Ok(Remote::Custom(Url::parse(other)?)),
        }
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remote::Production => f.write_str("production"),
            Remote::Staging => f.write_str("staging"),
            Remote::Custom(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "treeshift")]
#[command(about = "Migrate an account's encrypted file tree from format 1.0.0 to 2.0.0")]
pub struct Args {
    /// Account service: `production`, `staging` or a URL
    #[arg(short = 'R', long, global = true, default_value = "production")]
    pub remote: Remote,

    /// Path to the account config directory (defaults to ~/.config/fission)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Storage node RPC endpoint, instead of the one in the node's config
    #[arg(long, global = true)]
    pub store_api: Option<Url>,

    /// Tool settings file (TOML)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Default log level; RUST_LOG overrides it
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    /// Also write daily rolling logs into this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_presets() {
        assert_eq!("production".parse::<Remote>().unwrap(), Remote::Production);
        assert_eq!(
            "staging".parse::<Remote>().unwrap().url().as_str(),
            "https://runfission.net/"
        );
        let custom: Remote = "http://localhost:1337".parse().unwrap();
        assert_eq!(custom.url().port(), Some(1337));
        assert!("not a url".parse::<Remote>().is_err());
    }
}
