//! Peer link and cluster bootstrap behaviour, on a paused clock

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use common::peering::{
    connect_cluster, Cluster, ConnectError, PeerLink, PeerLinkConfig, PeerStatus, StatusReporter,
};
use common::store::{MemoryStore, PeerAddr, PeerTransport, Ping, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Answer,
    Refuse,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Connect(String),
    Disconnect(String),
    Report { at: u128, connected: bool },
}

struct Script {
    started: Instant,
    ping: Reply,
    connect: Reply,
    /// Connects to refuse before `connect` applies.
    refuse_connects: usize,
    unreachable: HashSet<PeerAddr>,
    events: Vec<Event>,
}

#[derive(Clone)]
struct ScriptedTransport(Arc<Mutex<Script>>);

impl ScriptedTransport {
    fn new(ping: Reply, connect: Reply) -> Self {
        Self(Arc::new(Mutex::new(Script {
            started: Instant::now(),
            ping,
            connect,
            refuse_connects: 0,
            unreachable: HashSet::new(),
            events: Vec::new(),
        })))
    }

    fn set_ping(&self, reply: Reply) {
        self.0.lock().ping = reply;
    }

    fn refuse_connects(&self, n: usize) {
        self.0.lock().refuse_connects = n;
    }

    fn block(&self, peer: PeerAddr) {
        self.0.lock().unreachable.insert(peer);
    }

    fn events(&self) -> Vec<Event> {
        self.0.lock().events.clone()
    }

    fn reports(&self) -> Vec<(u128, bool)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Report { at, connected } => Some((at, connected)),
                _ => None,
            })
            .collect()
    }

    fn dials(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Connect(_)))
            .count()
    }
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn connect(&self, peer: &PeerAddr, _timeout: Duration) -> Result<(), StoreError> {
        let reply = {
            let mut script = self.0.lock();
            script.events.push(Event::Connect(peer.to_string()));
            if script.unreachable.contains(peer) {
                Reply::Refuse
            } else if script.refuse_connects > 0 {
                script.refuse_connects -= 1;
                Reply::Refuse
            } else {
                script.connect
            }
        };
        match reply {
            Reply::Answer => Ok(()),
            Reply::Refuse => Err(StoreError::Unreachable(peer.clone(), "refused".into())),
            Reply::Hang => futures::future::pending().await,
        }
    }

    async fn disconnect(&self, peer: &PeerAddr) -> Result<(), StoreError> {
        self.0.lock().events.push(Event::Disconnect(peer.to_string()));
        Ok(())
    }

    async fn ping(
        &self,
        peer: &PeerAddr,
    ) -> Result<BoxStream<'static, Result<Ping, StoreError>>, StoreError> {
        let reply = self.0.lock().ping;
        match reply {
            Reply::Answer => Ok(stream::once(async {
                Ok(Ping {
                    time: Duration::from_millis(5),
                })
            })
            .boxed()),
            Reply::Refuse => Err(StoreError::Unreachable(peer.clone(), "no route".into())),
            Reply::Hang => Ok(stream::pending().boxed()),
        }
    }
}

/// Records reports into the transport's event log so they interleave with
///  dials in the order they happened.
#[derive(Clone)]
struct Recorder(ScriptedTransport);

impl StatusReporter for Recorder {
    fn report(&self, _peer: &PeerAddr, status: &PeerStatus) {
        let mut script = self.0 .0.lock();
        let at = script.started.elapsed().as_millis();
        script.events.push(Event::Report {
            at,
            connected: status.connected,
        });
    }
}

fn peer(n: u8) -> PeerAddr {
    format!("/ip4/10.0.0.{}/tcp/4001/p2p/QmPeer{}", n, n)
        .parse()
        .unwrap()
}

fn spawn_link(
    transport: &ScriptedTransport,
    config: PeerLinkConfig,
) -> (tokio::task::JoinHandle<()>, watch::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let link = PeerLink::new(
        peer(1),
        transport.clone(),
        Recorder(transport.clone()),
        config,
    );
    (tokio::spawn(link.run(shutdown_rx)), shutdown_tx)
}

async fn unreachable_schedule(reply: Reply) {
    let transport = ScriptedTransport::new(reply, Reply::Answer);
    let (handle, shutdown) = spawn_link(&transport, PeerLinkConfig::default());

    tokio::time::sleep(Duration::from_millis(12_500)).await;
    shutdown.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(
        transport.reports(),
        [
            (1_000, false),
            (2_000, false),
            (4_000, false),
            (7_000, false),
            (12_000, false)
        ]
    );

    // every disconnected report is followed by exactly one redial
    let expected: Vec<Event> = transport
        .reports()
        .into_iter()
        .flat_map(|(at, connected)| {
            [
                Event::Report { at, connected },
                Event::Disconnect(peer(1).to_string()),
                Event::Connect(peer(1).to_string()),
            ]
        })
        .collect();
    assert_eq!(transport.events(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_refused_probe_backs_off() {
    unreachable_schedule(Reply::Refuse).await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_probe_backs_off() {
    unreachable_schedule(Reply::Hang).await;
}

#[tokio::test(start_paused = true)]
async fn test_reachable_peer_is_left_alone_for_keep_alive() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Answer);
    let (handle, shutdown) = spawn_link(&transport, PeerLinkConfig::default());

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(transport.reports(), [(0, true), (60_000, true)]);
    assert_eq!(transport.dials(), 0);

    // the peer drops off between probes
    transport.set_ping(Reply::Refuse);
    tokio::time::sleep(Duration::from_millis(31_500)).await;
    shutdown.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(
        transport.reports(),
        [(0, true), (60_000, true), (121_000, false)]
    );
    assert_eq!(transport.dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_resets_after_recovery() {
    let transport = ScriptedTransport::new(Reply::Refuse, Reply::Answer);
    let config = PeerLinkConfig {
        keep_alive: Duration::from_secs(10),
        ..Default::default()
    };
    let (handle, shutdown) = spawn_link(&transport, config);

    // disconnected at 1s, 2s and 4s
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    transport.set_ping(Reply::Answer);
    // the probe opened at 4s already failed, so that round still ends on its
    //  3s timer and the peer recovers at 7s
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    transport.set_ping(Reply::Refuse);
    tokio::time::sleep(Duration::from_secs(20)).await;
    shutdown.send(()).unwrap();
    handle.await.unwrap();

    let reports = transport.reports();
    let recovered = reports
        .iter()
        .position(|(_, connected)| *connected)
        .expect("link recovered");
    let (recovered_at, _) = reports[recovered];
    let (next_drop, connected) = reports[recovered + 1];
    assert!(!connected);
    // keep-alive, then a fresh one second timer
    assert_eq!(next_drop, recovered_at + 10_000 + 1_000);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_keep_alive() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Answer);
    let (handle, shutdown) = spawn_link(&transport, PeerLinkConfig::default());

    tokio::time::sleep(Duration::from_secs(10)).await;
    shutdown.send(()).unwrap();

    tokio::time::timeout(Duration::from_millis(1), handle)
        .await
        .expect("link stops without waiting out keep-alive")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_cluster_without_peers() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Answer);
    let result = connect_cluster(&transport, &[], &PeerLinkConfig::default()).await;
    assert!(matches!(result, Err(ConnectError::NoPeers)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_cluster_first_reachable_wins() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Answer);
    transport.block(peer(1));
    let started = Instant::now();

    let connected = connect_cluster(&transport, &[peer(1), peer(2)], &PeerLinkConfig::default())
        .await
        .unwrap();

    assert_eq!(connected, peer(2));
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_connect_cluster_retries_with_backoff() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Answer);
    // both peers refuse the first round
    transport.refuse_connects(2);
    let started = Instant::now();

    let connected = connect_cluster(&transport, &[peer(1), peer(2)], &PeerLinkConfig::default())
        .await
        .unwrap();

    assert!(connected == peer(1) || connected == peer(2));
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_connect_cluster_gives_up() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Refuse);
    let started = Instant::now();

    let err = connect_cluster(&transport, &[peer(1), peer(2)], &PeerLinkConfig::default())
        .await
        .unwrap_err();

    // waits of 1s and 1s between three rounds, none after the last
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(transport.dials(), 6);
    match &err {
        ConnectError::Exhausted { attempts, failures } => {
            assert_eq!(*attempts, 3);
            let peers: Vec<_> = failures.iter().map(|f| f.peer.clone()).collect();
            assert_eq!(peers, [peer(1), peer(2)]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains(&peer(1).to_string()));
    assert!(message.contains(&peer(2).to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_connect_cluster_dial_timeout() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Hang);
    let config = PeerLinkConfig {
        connect_timeout: Duration::from_secs(5),
        connect_attempts: 1,
        ..Default::default()
    };
    let started = Instant::now();

    let err = connect_cluster(&transport, &[peer(1)], &config)
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_cluster_links_every_peer() {
    let store = MemoryStore::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (status_tx, status_rx) = flume::unbounded();

    let cluster = Cluster::connect(
        store.clone(),
        vec![peer(1), peer(2)],
        PeerLinkConfig::default(),
        status_tx,
        shutdown_rx,
    )
    .await
    .unwrap();
    assert_eq!(cluster.peers(), [peer(1), peer(2)]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown_tx.send(()).unwrap();
    cluster.join().await;

    let connected: HashSet<PeerAddr> = status_rx
        .drain()
        .filter(|(_, status)| status.connected)
        .map(|(peer, _)| peer)
        .collect();
    assert_eq!(connected, HashSet::from([peer(1), peer(2)]));
    assert!(store.is_connected(&peer(1)));
    assert!(store.is_connected(&peer(2)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_cluster_bootstrap() {
    let transport = ScriptedTransport::new(Reply::Answer, Reply::Hang);
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let bootstrap = tokio::spawn(Cluster::connect(
        transport.clone(),
        vec![peer(1), peer(2)],
        PeerLinkConfig::default(),
        Recorder(transport.clone()),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.dials(), 2);
    shutdown_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_millis(1), bootstrap)
        .await
        .expect("bootstrap stops without waiting out its dials")
        .unwrap();
    assert!(matches!(result, Err(ConnectError::Cancelled)));

    // no links were started and nothing dials afterwards
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.dials(), 2);
    assert!(transport.reports().is_empty());
}
