//! Cryptographic primitives for treeshift
//!
//! - **Content encryption**: ChaCha20-Poly1305 `Secret`s. The private partition
//!   root is sealed with the account's read key, every other private block
//!   carries its own per-item secret in the parent link.
//! - **Account identity**: an Ed25519 `WriteKey` whose public half is rendered
//!   as a `did:key` identifier and signs capability tokens.

mod keys;
mod secret;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, WriteKey, DID_KEY_PREFIX, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{ReadKey, Secret, SecretError, BLAKE3_HASH_SIZE, SECRET_SIZE};
