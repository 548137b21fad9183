/**
 * Encryption and identity.
 *  - Per-item content secrets and the account read key
 *  - The account write key and its did:key identity
 */
pub mod crypto;
/**
 * CIDs, block codecs and the link maps
 *  that hold trees together.
 */
pub mod linked_data;
/**
 * The content-addressed store: block get/put
 *  and peer connection management.
 */
pub mod store;
/**
 * Versioned trees: formats, the reader
 *  that walks them and the writer that builds them.
 */
pub mod tree;
/**
 * Keeping the store linked to the account's cluster.
 */
pub mod peering;
/**
 * Reading a legacy tree and rebuilding it in the current format.
 */
pub mod migration;
/**
 * Authorizing and publishing a new data root.
 */
pub mod commit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::build_info;
    pub use crate::commit::{AccountClient, ConfirmedRoot, RootCommitter};
    pub use crate::crypto::{ReadKey, Secret, WriteKey};
    pub use crate::linked_data::{multibase, Cid, CidError};
    pub use crate::migration::{MigrateError, Migration, MigrationSummary};
    pub use crate::peering::{Cluster, PeerLinkConfig};
    pub use crate::store::{BlockStore, PeerAddr, PeerTransport, RpcStore};
    pub use crate::tree::{CurrentFormat, Entry, LegacyFormat};
    pub use crate::version::BuildInfo;
}
