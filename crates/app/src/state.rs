use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use common::crypto::{KeyError, ReadKey, Secret, SecretError, WriteKey, PRIVATE_KEY_SIZE};
use common::linked_data::Cid;
use common::store::PeerAddr;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const KEY_STORE_PATH: &str = "wnfs/store.json";
pub const NODE_CONFIG_PATH: &str = "ipfs/config";
/// Key of the root read key inside a key store entry.
const ROOT_KEY_ENTRY: &str = "/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("couldn't open the account config directory {0}. Link an account first.")]
    NotFound(PathBuf),

    #[error("missing {what} at {path}")]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("IO error reading {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("couldn't load a valid config from {0}: {1}")]
    Yaml(PathBuf, serde_yaml::Error),

    #[error("couldn't parse {0}: {1}")]
    Json(PathBuf, serde_json::Error),

    #[error("couldn't find the root read key in {0}")]
    NoReadKey(PathBuf),

    #[error("invalid root read key in {0}: {1}")]
    ReadKey(PathBuf, SecretError),

    #[error("couldn't load signing key at {path}: expected a 32-byte ed25519 key, got {len} bytes")]
    SigningKeySize { path: PathBuf, len: usize },

    #[error("invalid signing key at {0}: {1}")]
    SigningKey(PathBuf, KeyError),

    #[error("couldn't parse root_proof in the account config as a CID: {0}")]
    RootProof(String),

    #[error("missing Addresses.API in the storage node config at {0}")]
    NoApiAddress(PathBuf),

    #[error("unsupported storage node API address {0}")]
    ApiAddress(String),
}

/// The account config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Carried for compatibility; the migration does not use it.
    #[serde(default)]
    pub ignore: Vec<String>,
    pub username: String,
    #[serde(default)]
    pub root_proof: Option<String>,
    pub server_did: String,
    pub peers: Vec<PeerAddr>,
    /// Carried for compatibility; the migration does not use it.
    #[serde(default)]
    pub update_checked: Option<serde_yaml::Value>,
    pub signing_key_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct NodeConfig {
    #[serde(rename = "Addresses", default)]
    addresses: NodeAddresses,
}

#[derive(Debug, Default, Deserialize)]
struct NodeAddresses {
    #[serde(rename = "API", default)]
    api: Option<String>,
}

/// Everything the tool needs from an account's config directory, validated.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub config_dir: PathBuf,
    pub config: AccountConfig,
    pub root_proof: Option<Cid>,
    pub read_key: ReadKey,
    pub write_key: WriteKey,
    /// RPC endpoint of the local storage node
    pub store_api: Url,
}

impl AccountContext {
    /// The account config directory (custom or default ~/.config/fission)
    pub fn config_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home.join(".config").join("fission"))
    }

    /// Load and validate everything at once, before any network activity.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        if !config_dir.is_dir() {
            return Err(ConfigError::NotFound(config_dir.to_path_buf()));
        }

        let config_path = required(config_dir, CONFIG_FILE_NAME, "account config file")?;
        let key_store_path = required(config_dir, KEY_STORE_PATH, "filesystem keys")?;
        let node_config_path = required(config_dir, NODE_CONFIG_PATH, "storage node config")?;

        let config: AccountConfig = serde_yaml::from_str(&read(&config_path)?)
            .map_err(|e| ConfigError::Yaml(config_path.clone(), e))?;

        let root_proof = config
            .root_proof
            .as_deref()
            .map(|proof| Cid::try_from(proof).map_err(|_| ConfigError::RootProof(proof.to_string())))
            .transpose()?;

        let read_key = load_read_key(&key_store_path)?;
        let write_key = load_write_key(&resolve(config_dir, &config.signing_key_path))?;
        let store_api = load_store_api(&node_config_path)?;

        tracing::debug!(
            "loaded account {} from {} (store api {})",
            config.username,
            config_dir.display(),
            store_api
        );

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            config,
            root_proof,
            read_key,
            write_key,
            store_api,
        })
    }
}

fn required(dir: &Path, relative: &str, what: &'static str) -> Result<PathBuf, ConfigError> {
    let path = dir.join(relative);
    if path.exists() {
        Ok(path)
    } else {
        Err(ConfigError::MissingFile { what, path })
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
}

/// Relative key paths are taken relative to the config directory.
fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

/// The root read key of the first store in the key store file.
fn load_read_key(path: &Path) -> Result<ReadKey, ConfigError> {
    let stores: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&read(path)?).map_err(|e| ConfigError::Json(path.to_path_buf(), e))?;
    let encoded = stores
        .values()
        .next()
        .and_then(|store| store.get(ROOT_KEY_ENTRY))
        .and_then(|key| key.as_str())
        .ok_or_else(|| ConfigError::NoReadKey(path.to_path_buf()))?;
    Secret::from_base64(encoded).map_err(|e| ConfigError::ReadKey(path.to_path_buf(), e))
}

fn load_write_key(path: &Path) -> Result<WriteKey, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            what: "signing key",
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    if bytes.len() != PRIVATE_KEY_SIZE {
        return Err(ConfigError::SigningKeySize {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }
    WriteKey::from_slice(&bytes).map_err(|e| ConfigError::SigningKey(path.to_path_buf(), e))
}

fn load_store_api(path: &Path) -> Result<Url, ConfigError> {
    let config: NodeConfig =
        serde_json::from_str(&read(path)?).map_err(|e| ConfigError::Json(path.to_path_buf(), e))?;
    let api = config
        .addresses
        .api
        .ok_or_else(|| ConfigError::NoApiAddress(path.to_path_buf()))?;
    api_url(&api)
}

/// Turn a storage node API multiaddr such as `/ip4/127.0.0.1/tcp/5001` into
/// an HTTP URL.
pub fn api_url(multiaddr: &str) -> Result<Url, ConfigError> {
    let unsupported = || ConfigError::ApiAddress(multiaddr.to_string());
    let segments: Vec<&str> = multiaddr.trim_start_matches('/').split('/').collect();

    let (host, rest) = match segments.as_slice() {
        ["ip4" | "dns" | "dns4" | "dns6", host, rest @ ..] => (host.to_string(), rest),
        ["ip6", host, rest @ ..] => (format!("[{}]", host), rest),
        _ => return Err(unsupported()),
    };
    let (port, scheme) = match rest {
        ["tcp", port] | ["tcp", port, "http"] => (*port, "http"),
        ["tcp", port, "https"] => (*port, "https"),
        _ => return Err(unsupported()),
    };
    let port: u16 = port.parse().map_err(|_| unsupported())?;

    Url::parse(&format!("{}://{}:{}/", scheme, host, port)).map_err(|_| unsupported())
}
