use std::fmt;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use crate::linked_data::multibase::{self, Base};

/// Size of Ed25519 private key seed in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Prefix of every `did:key` identifier
pub const DID_KEY_PREFIX: &str = "did:key:";
/// Multicodec varint for an Ed25519 public key (0xed)
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("invalid signature: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),
}

/// Public half of the account's signing identity
///
/// Rendered as a `did:key` identifier, which is how the account service
/// addresses issuers and audiences of capability tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, KeyError> {
        Ok(Self(VerifyingKey::from_bytes(bytes)?))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// `did:key:z...` of this key: base58btc multibase over the Ed25519
    /// multicodec prefix followed by the raw key bytes.
    pub fn to_did(&self) -> String {
        let mut prefixed = Vec::with_capacity(ED25519_MULTICODEC.len() + PUBLIC_KEY_SIZE);
        prefixed.extend_from_slice(&ED25519_MULTICODEC);
        prefixed.extend_from_slice(&self.to_bytes());
        format!(
            "{}{}",
            DID_KEY_PREFIX,
            multibase::encode(Base::Base58Btc, prefixed)
        )
    }

    /// Parse an Ed25519 `did:key` identifier.
    pub fn from_did(did: &str) -> Result<Self, KeyError> {
        let encoded = did
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| anyhow::anyhow!("not a did:key identifier: {}", did))?;
        let (base, bytes) = multibase::decode(encoded)
            .map_err(|e| anyhow::anyhow!("invalid multibase in {}: {}", did, e))?;
        if base != Base::Base58Btc {
            return Err(anyhow::anyhow!("did:key must be base58btc encoded").into());
        }
        let key = bytes
            .strip_prefix(&ED25519_MULTICODEC[..])
            .ok_or_else(|| anyhow::anyhow!("did:key is not an ed25519 key"))?;
        let key: [u8; PUBLIC_KEY_SIZE] = key.try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                key.len()
            )
        })?;
        Self::from_bytes(&key)
    }

    pub fn verify(&self, msg: &[u8], signature: &ed25519_dalek::Signature) -> Result<(), KeyError> {
        self.0.verify_strict(msg, signature)?;
        Ok(())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_did())
    }
}

/// The account's write key, a raw 32-byte Ed25519 seed
///
/// Loaded once from the account's key file and passed explicitly to whatever
/// needs to sign. Never serialized.
#[derive(Clone)]
pub struct WriteKey(SigningKey);

impl fmt::Debug for WriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteKey").field(&self.public().to_did()).finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for WriteKey {
    fn from(seed: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }
}

impl WriteKey {
    /// Build a key from the exact bytes of a key file.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; PRIVATE_KEY_SIZE] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid private key size, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            )
        })?;
        Ok(Self::from(seed))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        Self::from(bytes)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn did(&self) -> String {
        self.public().to_did()
    }

    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}
