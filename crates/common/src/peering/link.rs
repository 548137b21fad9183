use std::time::Duration;

use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

use super::backoff::Backoff;
use crate::store::{PeerAddr, PeerTransport, StoreError};

/// Tuning for a [`PeerLink`] and for cluster bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLinkConfig {
    /// How long a confirmed link is trusted before it is probed again.
    pub keep_alive: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on waiting for a single pong.
    pub probe_timeout: Duration,
    /// Upper bound on a single dial.
    pub connect_timeout: Duration,
    /// Rounds of dialling the whole cluster before giving up.
    pub connect_attempts: u32,
}

impl Default for PeerLinkConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(20),
            connect_attempts: 3,
        }
    }
}

/// Observable state of one peer link.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeerStatus {
    pub connected: bool,
    pub last_connected_at: Option<OffsetDateTime>,
    pub latency: Option<Duration>,
}

/// Receives every status change of every link it is handed to.
pub trait StatusReporter: Send + Sync + 'static {
    fn report(&self, peer: &PeerAddr, status: &PeerStatus);
}

/// Logs status changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, peer: &PeerAddr, status: &PeerStatus) {
        match status.latency {
            Some(latency) if status.connected => {
                tracing::info!(%peer, ?latency, "peer connected")
            }
            _ if status.connected => tracing::info!(%peer, "peer connected"),
            _ => tracing::warn!(
                %peer,
                last_connected_at = ?status.last_connected_at,
                "peer unreachable, reconnecting"
            ),
        }
    }
}

/// Forwards status changes over a channel. A full or closed channel drops the
///  report; links never wait on their observers.
impl StatusReporter for flume::Sender<(PeerAddr, PeerStatus)> {
    fn report(&self, peer: &PeerAddr, status: &PeerStatus) {
        if let Err(e) = self.try_send((peer.clone(), status.clone())) {
            tracing::debug!("dropping status report for {}: {}", peer, e);
        }
    }
}

enum Race {
    Probe(Duration),
    Timer,
}

/// Keeps the storage node's link to one cluster peer alive.
///
/// Each round races a liveness probe against a reconnect timer. A pong before
///  the timer marks the peer connected and parks the link for the keep-alive
///  interval; the timer firing first marks it disconnected and redials, with
///  the timer growing along a [`Backoff`] until a probe succeeds again.
///
/// Runs until the shutdown signal fires. Links for different peers share
///  nothing but the transport and the shutdown signal.
pub struct PeerLink<T, R> {
    peer: PeerAddr,
    transport: T,
    reporter: R,
    config: PeerLinkConfig,
    status: PeerStatus,
    backoff: Backoff,
}

impl<T, R> PeerLink<T, R>
where
    T: PeerTransport,
    R: StatusReporter,
{
    pub fn new(peer: PeerAddr, transport: T, reporter: R, config: PeerLinkConfig) -> Self {
        let backoff = Backoff::new(config.initial_backoff);
        Self {
            peer,
            transport,
            reporter,
            config,
            status: PeerStatus::default(),
            backoff,
        }
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    pub fn status(&self) -> &PeerStatus {
        &self.status
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        tracing::debug!("PeerLink::run: starting link to {}", self.peer);
        loop {
            let wait = self.backoff.interval(self.config.max_backoff);
            let race = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(latency) = self.probe() => Race::Probe(latency),
                _ = sleep(wait) => Race::Timer,
            };

            match race {
                Race::Probe(latency) => {
                    self.status.connected = true;
                    self.status.last_connected_at = Some(OffsetDateTime::now_utc());
                    self.status.latency = Some(latency);
                    self.reporter.report(&self.peer, &self.status);

                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = sleep(self.config.keep_alive) => {}
                    }
                    self.backoff.reset();
                }
                Race::Timer => {
                    self.status.connected = false;
                    self.status.latency = None;
                    self.reporter.report(&self.peer, &self.status);

                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = self.reconnect() => {}
                    }
                    self.backoff.advance(self.config.max_backoff);
                }
            }
        }
        tracing::debug!("PeerLink::run: link to {} shut down", self.peer);
    }

    /// Wait for one pong. `None` means this round's probe failed; the caller
    ///  keeps waiting on its timer and a fresh probe is opened next round.
    async fn probe(&self) -> Option<Duration> {
        let started = Instant::now();
        match timeout(self.config.probe_timeout, self.first_pong()).await {
            Ok(Ok(latency)) => Some(latency),
            Ok(Err(e)) => {
                tracing::debug!("probe of {} failed: {}", self.peer, e);
                None
            }
            Err(_) => {
                tracing::debug!(
                    "probe of {} timed out after {:?}",
                    self.peer,
                    started.elapsed()
                );
                None
            }
        }
    }

    async fn first_pong(&self) -> Result<Duration, StoreError> {
        let mut pings = self.transport.ping(&self.peer).await?;
        match pings.next().await {
            Some(result) => Ok(result?.time),
            None => Err(anyhow::anyhow!("ping stream ended without a reply").into()),
        }
    }

    /// Best-effort redial; failures are only logged since the next round
    ///  probes again either way.
    async fn reconnect(&self) {
        if let Err(e) = self.transport.disconnect(&self.peer).await {
            tracing::debug!("disconnect from {} failed: {}", self.peer, e);
        }
        let dial = timeout(
            self.config.connect_timeout,
            self.transport.connect(&self.peer, self.config.connect_timeout),
        );
        match dial.await {
            Ok(Ok(())) => tracing::debug!("redialled {}", self.peer),
            Ok(Err(e)) => tracing::debug!("redial of {} failed: {}", self.peer, e),
            Err(_) => tracing::debug!("redial of {} timed out", self.peer),
        }
    }
}
