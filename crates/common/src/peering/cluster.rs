use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::backoff::Backoff;
use super::link::{PeerLink, PeerLinkConfig, StatusReporter};
use crate::store::{PeerAddr, PeerTransport, StoreError};

/// How long [`Cluster::join`] waits for links to wind down.
pub const LINK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Last error seen dialling one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailure {
    pub peer: PeerAddr,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no cluster peers configured")]
    NoPeers,
    #[error("could not reach any cluster peer after {attempts} attempts:{}", FailureList(.failures))]
    Exhausted {
        attempts: u32,
        failures: Vec<PeerFailure>,
    },
    #[error("cluster bootstrap interrupted by shutdown")]
    Cancelled,
}

struct FailureList<'a>(&'a [PeerFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in self.0 {
            write!(f, "\n  {}: {}", failure.peer, failure.error)?;
        }
        Ok(())
    }
}

/// Dial every peer concurrently; the first one to answer wins.
///
/// A round in which every dial fails is retried after the next backoff
///  interval, up to `config.connect_attempts` rounds.
pub async fn connect_cluster<T>(
    transport: &T,
    peers: &[PeerAddr],
    config: &PeerLinkConfig,
) -> Result<PeerAddr, ConnectError>
where
    T: PeerTransport,
{
    if peers.is_empty() {
        return Err(ConnectError::NoPeers);
    }

    let attempts = config.connect_attempts.max(1);
    let mut backoff = Backoff::new(config.initial_backoff);
    let mut failures = Vec::new();

    for attempt in 1..=attempts {
        tracing::debug!(
            "connect_cluster: attempt {}/{} over {} peers",
            attempt,
            attempts,
            peers.len()
        );
        let mut dials: FuturesUnordered<_> = peers
            .iter()
            .map(|peer| async move { (peer, dial(transport, peer, config.connect_timeout).await) })
            .collect();

        failures.clear();
        while let Some((peer, result)) = dials.next().await {
            match result {
                Ok(()) => {
                    tracing::info!("connected to cluster peer {}", peer);
                    return Ok(peer.clone());
                }
                Err(e) => {
                    tracing::debug!("dial of {} failed: {}", peer, e);
                    failures.push(PeerFailure {
                        peer: peer.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if attempt < attempts {
            let wait = backoff.interval(config.max_backoff);
            tracing::warn!(
                "no cluster peer reachable (attempt {}/{}), retrying in {:?}",
                attempt,
                attempts,
                wait
            );
            sleep(wait).await;
            backoff.advance(config.max_backoff);
        }
    }

    // report failures in configuration order
    failures.sort_by_key(|failure| peers.iter().position(|p| *p == failure.peer));
    Err(ConnectError::Exhausted { attempts, failures })
}

async fn dial<T: PeerTransport>(
    transport: &T,
    peer: &PeerAddr,
    connect_timeout: Duration,
) -> Result<(), StoreError> {
    timeout(connect_timeout, transport.connect(peer, connect_timeout))
        .await
        .map_err(|_| StoreError::Timeout(connect_timeout))?
}

/// The background links to every cluster peer.
pub struct Cluster {
    peers: Vec<PeerAddr>,
    handles: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Bootstrap the cluster connection, then start one [`PeerLink`] per
    ///  peer. Every link watches `shutdown` and stops when it fires; firing
    ///  it during bootstrap drops the in-flight dials.
    pub async fn connect<T, R>(
        transport: T,
        peers: Vec<PeerAddr>,
        config: PeerLinkConfig,
        reporter: R,
        shutdown: watch::Receiver<()>,
    ) -> Result<Self, ConnectError>
    where
        T: PeerTransport + Clone + 'static,
        R: StatusReporter + Clone,
    {
        let mut cancel = shutdown.clone();
        tokio::select! {
            biased;
            _ = cancel.changed() => {
                tracing::info!("cluster bootstrap cancelled");
                return Err(ConnectError::Cancelled);
            }
            result = connect_cluster(&transport, &peers, &config) => {
                result?;
            }
        }
        Ok(Self::spawn(transport, peers, config, reporter, shutdown))
    }

    /// Start one [`PeerLink`] per peer without the bootstrap round.
    pub fn spawn<T, R>(
        transport: T,
        peers: Vec<PeerAddr>,
        config: PeerLinkConfig,
        reporter: R,
        shutdown: watch::Receiver<()>,
    ) -> Self
    where
        T: PeerTransport + Clone + 'static,
        R: StatusReporter + Clone,
    {
        let handles = peers
            .iter()
            .map(|peer| {
                let link = PeerLink::new(
                    peer.clone(),
                    transport.clone(),
                    reporter.clone(),
                    config.clone(),
                );
                tokio::spawn(link.run(shutdown.clone()))
            })
            .collect();
        Self { peers, handles }
    }

    pub fn peers(&self) -> &[PeerAddr] {
        &self.peers
    }

    /// Wait for every link to stop. Call after the shutdown signal was sent.
    pub async fn join(self) {
        if timeout(LINK_SHUTDOWN_TIMEOUT, join_all(self.handles))
            .await
            .is_err()
        {
            tracing::error!(
                "peer links failed to shut down within {} seconds",
                LINK_SHUTDOWN_TIMEOUT.as_secs()
            );
        }
    }
}
