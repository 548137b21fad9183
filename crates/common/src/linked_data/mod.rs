//! Content addressing helpers.
//!
//! Everything in a tree is a block identified by a CIDv1 over a sha2-256
//! multihash. Structured blocks are DAG-CBOR, opaque blocks (sealed private
//! data, version markers, raw file bytes) use the raw codec.

mod codec;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

pub use cid::multibase;
pub use cid::Cid;
pub use cid::Error as CidError;
pub use codec::{BlockEncoded, Codec, CodecError, DagCborCodec};
pub use ipld_core::ipld::Ipld;

/// A DAG-CBOR block that only names other blocks.
pub type LinkMap = BTreeMap<String, Cid>;

impl BlockEncoded<DagCborCodec> for LinkMap {}

/// Multicodec code for raw binary blocks
pub const LD_RAW_CODEC: u64 = 0x55;
/// Multicodec code for DAG-CBOR blocks
pub const LD_CBOR_CODEC: u64 = 0x71;
/// Multihash code for sha2-256
pub const SHA2_256: u64 = 0x12;

/// Compute the CIDv1 a block of `data` stored under `codec` is addressed by.
pub fn cid_for(codec: u64, data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    // a 32 byte digest always fits a 64 byte multihash
    let hash = multihash::Multihash::<64>::wrap(SHA2_256, &digest)
        .expect("sha2-256 digest fits in multihash");
    Cid::new_v1(codec, hash)
}

/// Check that `data` is the block `cid` names.
///
/// Only sha2-256 addressed blocks can be checked; anything else is accepted
/// as-is.
pub fn verify_block(cid: &Cid, data: &[u8]) -> bool {
    if cid.hash().code() != SHA2_256 {
        return true;
    }
    cid_for(cid.codec(), data).hash() == cid.hash()
}

/// Name for a codec as the storage RPC expects it.
pub fn codec_name(codec: u64) -> Option<&'static str> {
    match codec {
        LD_RAW_CODEC => Some("raw"),
        LD_CBOR_CODEC => Some("dag-cbor"),
        _ => None,
    }
}
