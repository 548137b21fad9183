//! Keeping the storage node linked to the account's cluster peers.
//!
//! The migration reads and writes blocks through the local node, which in
//! turn needs live connections to the cluster that holds the account's data.
//! [`Cluster`] makes the initial connection and then supervises one
//! [`PeerLink`] per peer until shutdown.

mod backoff;
mod cluster;
mod link;

pub use backoff::Backoff;
pub use cluster::{connect_cluster, Cluster, ConnectError, PeerFailure, LINK_SHUTDOWN_TIMEOUT};
pub use link::{LogReporter, PeerLink, PeerLinkConfig, PeerStatus, StatusReporter};
