use serde::{de::DeserializeOwned, Serialize};

use super::{Cid, LD_CBOR_CODEC};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode block: {0}")]
    Encode(String),
    #[error("failed to decode block: {0}")]
    Decode(String),
}

/// A block encoding
pub trait Codec {
    const CODE: u64;

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError>;
}

pub struct DagCborCodec;

impl Codec for DagCborCodec {
    const CODE: u64 = LD_CBOR_CODEC;

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        serde_ipld_dagcbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Types that are stored as a single block in codec `C`.
pub trait BlockEncoded<C: Codec>: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        C::encode(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        C::decode(bytes)
    }

    fn codec() -> u64 {
        C::CODE
    }

    /// The CID this value would be stored under, unencrypted.
    fn cid(&self) -> Result<Cid, CodecError> {
        Ok(super::cid_for(C::CODE, &self.encode()?))
    }
}
