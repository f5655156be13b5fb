//! Dev command - Run an in-process tether network
//!
//! Starts one attester and `--hosters` encoder/hoster pairs on an in-memory
//! transport and ledger, then walks a demo feed through hosting setup, a
//! storage challenge and a performance challenge. Hoster storage uses the
//! configured backend; redb databases land under `<datadir>/dev/`.

use crate::{
    cli::DevArgs,
    config::{BackendKind, NodeConfig, StorageConfig},
    dirs::DataDirs,
};
use alloy_signer_local::PrivateKeySigner;
use eyre::{Result, WrapErr, bail, eyre};
use futures::future::join_all;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tether_ledger::{
    Amendment, Contract, EventPayload, LedgerClient, PerformanceChallenge, Providers,
    StorageChallenge,
};
use tether_net_transport::{MemoryNetwork, MemoryTransport};
use tether_primitives::{
    AmendmentId, ChallengeId, ChunkIndex, ChunkRange, ContractId, FeedId, PeerKey, PlanId,
    SessionId, UserId,
};
use tether_roles::{LocalIdentity, Node, NodeEvent, RoleConfig, RoleContext};
use tether_storer::StorageRegistry;
use tether_test_utils::{EncoderSim, FeedFixture, MockLedger};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{error, info, warn};

const DEV_FEED: FeedId = FeedId(1);
const DEV_CONTRACT: ContractId = ContractId(1);
const DEV_AMENDMENT: AmendmentId = AmendmentId(1);
const DEV_STORAGE_CHALLENGE: ChallengeId = ChallengeId(1);
const DEV_PERFORMANCE_CHALLENGE: ChallengeId = ChallengeId(2);

/// Run the dev command
pub async fn run(args: DevArgs) -> Result<()> {
    if args.chunks == 0 {
        bail!("--chunks must be at least 1");
    }
    if args.hosters == 0 {
        bail!("--hosters must be at least 1");
    }

    let dirs = DataDirs::new(&args.datadir)?;
    info!("Data directory: {}", dirs.root.display());

    let mut config = NodeConfig::load_or_create(dirs.config_file())?;
    if let Some(ms) = args.session_timeout_ms {
        config.session.timeout_ms = ms;
    }
    let roles = config.role_config();
    info!(
        timeout = ?roles.session_timeout,
        policy = %roles.storage_failure_policy,
        selection = %roles.index_selection,
        backend = ?config.storage.backend,
        "Development network configuration"
    );

    let net = DevNetwork::new(&dirs.root, &config.storage, roles, &args).await?;
    let outcome = net.walk(&args).await;
    net.shutdown().await;
    outcome
}

/// A registered ledger user with its own transport.
struct DevPeer {
    user: UserId,
    key: PeerKey,
    signer: PrivateKeySigner,
    transport: Arc<MemoryTransport>,
}

struct DevNetwork {
    ledger: Arc<MockLedger>,
    fixture: FeedFixture,
    encoders: Vec<DevPeer>,
    hosters: Vec<(DevPeer, Arc<Node>)>,
    attester: (DevPeer, Arc<Node>),
    stop: watch::Sender<bool>,
    runs: Vec<JoinHandle<()>>,
    wait: Duration,
}

impl DevNetwork {
    async fn new(
        root: &Path,
        storage: &StorageConfig,
        roles: RoleConfig,
        args: &DevArgs,
    ) -> Result<Self> {
        let network = MemoryNetwork::new();
        let ledger = Arc::new(MockLedger::new());
        let pairs = args.hosters as u64;

        let peer = |user: u64| {
            let key = PeerKey::new(user_key(user));
            let signer = PrivateKeySigner::random();
            ledger.register(UserId(user), key, signer.address());
            DevPeer { user: UserId(user), key, signer, transport: Arc::new(network.transport(key)) }
        };
        let encoders: Vec<DevPeer> = (1..=pairs).map(peer).collect();
        let hoster_peers: Vec<DevPeer> = (pairs + 1..=2 * pairs).map(peer).collect();
        let attester_peer = peer(2 * pairs + 1);

        let fixture =
            FeedFixture::new(DEV_FEED, args.chunks).wrap_err("failed to build demo feed")?;
        ledger.insert_contract(Contract {
            id: DEV_CONTRACT,
            plan: PlanId(1),
            feed: fixture.id,
            ranges: vec![ChunkRange::new(0, args.chunks - 1)?],
            amendments: Vec::new(),
        });
        ledger.insert_feed(fixture.feed(vec![DEV_CONTRACT]));
        ledger.insert_amendment(Amendment {
            id: DEV_AMENDMENT,
            contract: DEV_CONTRACT,
            providers: Providers {
                encoders: encoders.iter().map(|p| p.user).collect(),
                hosters: hoster_peers.iter().map(|p| p.user).collect(),
                attesters: vec![attester_peer.user],
            },
        });
        info!(
            feed = %fixture.id,
            key = %fixture.key.short(),
            chunks = args.chunks,
            pairs,
            "Published demo feed"
        );

        let (stop, stopped) = watch::channel(false);
        let mut runs = Vec::new();
        let mut hosters = Vec::with_capacity(hoster_peers.len());
        for (n, peer) in hoster_peers.into_iter().enumerate() {
            let backend = hoster_storage(root, storage, n)?
                .open(root)
                .wrap_err_with(|| format!("failed to open storage for hoster {n}"))?;
            let registry = Arc::new(StorageRegistry::new(backend));
            let node = start_node(&ledger, &peer, roles, registry).await?;
            runs.push(spawn_run(&node, &ledger, stopped.clone()));
            hosters.push((peer, node));
        }
        let attester_storage = StorageConfig { backend: BackendKind::Memory, path: None };
        let registry = Arc::new(StorageRegistry::new(attester_storage.open(root)?));
        let attester_node = start_node(&ledger, &attester_peer, roles, registry).await?;
        runs.push(spawn_run(&attester_node, &ledger, stopped));

        Ok(Self {
            ledger,
            fixture,
            encoders,
            hosters,
            attester: (attester_peer, attester_node),
            stop,
            runs,
            wait: roles.session_timeout * 2,
        })
    }

    /// Runs the three protocols in order. Each phase waits for the attester's
    /// outcome before the next starts.
    async fn walk(&self, args: &DevArgs) -> Result<()> {
        let expected: Vec<ChunkIndex> = (0..args.chunks).collect();

        let mut outcomes = self.attester.1.subscribe();
        self.ledger.publish(EventPayload::NewAmendment { amendment: DEV_AMENDMENT });
        let serving = self.encoders.iter().enumerate().map(|(position, peer)| {
            let mut sim = EncoderSim::new(peer.transport.clone(), peer.signer.clone());
            if position == 0
                && let Some(index) = args.corrupt
            {
                warn!(encoder = %peer.user, index, "encoder will send a corrupt bundle");
                sim = sim.corrupt(index);
            }
            let (attester, fixture, expected) = (self.attester.0.key, &self.fixture, &expected);
            async move {
                if let Err(e) = sim.serve(attester, fixture, DEV_AMENDMENT, position, expected).await {
                    error!(encoder = %peer.user, error = %e, "encoder failed");
                }
            }
        });
        join_all(serving).await;
        self.outcome(&mut outcomes, SessionId::hosting_setup(DEV_AMENDMENT)).await?;
        if let Some(submission) = self.ledger.amendment_reports().first() {
            let report = &submission.report;
            info!(
                hosted = report.signatures.len(),
                failed = report.failed.len(),
                "Hosting setup report"
            );
        }

        // Challenge the last hoster; the corrupt encoder only affects the first pair.
        let (target, _) = self.hosters.last().ok_or_else(|| eyre!("no hosters"))?;
        let checked = args.chunks / 2;
        self.ledger.insert_storage_challenge(StorageChallenge {
            id: DEV_STORAGE_CHALLENGE,
            hoster: target.user,
            attester: self.attester.0.user,
            checks: BTreeMap::from([(DEV_CONTRACT, checked)]),
        });
        self.ledger.publish(EventPayload::NewStorageChallenge { challenge: DEV_STORAGE_CHALLENGE });
        self.outcome(&mut outcomes, SessionId::storage_challenge(DEV_STORAGE_CHALLENGE)).await?;
        for submission in self.ledger.storage_responses() {
            info!(
                hoster = %target.user,
                index = checked,
                verified = submission.report.reports.len(),
                failed = submission.report.failed.len(),
                "Storage challenge response"
            );
        }

        self.ledger.insert_performance_challenge(PerformanceChallenge {
            id: DEV_PERFORMANCE_CHALLENGE,
            feed: self.fixture.id,
            hosters: self.hosters.iter().map(|(peer, _)| peer.user).collect(),
            attesters: vec![self.attester.0.user],
        });
        self.ledger
            .publish(EventPayload::NewPerformanceChallenge { challenge: DEV_PERFORMANCE_CHALLENGE });
        self.outcome(&mut outcomes, SessionId::performance_challenge(DEV_PERFORMANCE_CHALLENGE))
            .await?;
        for submission in self.ledger.performance_reports() {
            for (hoster, performance) in &submission.report.reports {
                info!(
                    %hoster,
                    served = performance.stats.served,
                    missed = performance.stats.missed,
                    latency = ?performance.stats.latency,
                    "Performance challenge result"
                );
            }
        }

        info!(submissions = self.ledger.submissions(), "Development walk complete");
        Ok(())
    }

    /// Waits for the attester to submit or fail `session`.
    async fn outcome(
        &self,
        events: &mut broadcast::Receiver<NodeEvent>,
        session: SessionId,
    ) -> Result<()> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(NodeEvent::ReportSubmitted { session: done }) if done == session => {
                        info!(%session, "report submitted");
                        return Ok(());
                    }
                    Ok(NodeEvent::SessionFailed { session: done, reason }) if done == session => {
                        warn!(%session, %reason, "session failed");
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(eyre!("attester event stream closed"));
                    }
                }
            }
        };
        match timeout(self.wait, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%session, "no outcome before deadline");
                Ok(())
            }
        }
    }

    async fn shutdown(self) {
        let _ = self.stop.send(true);
        for run in self.runs {
            if let Err(e) = run.await {
                error!(error = %e, "node task panicked");
            }
        }
        info!(
            attester_sessions = self.attester.1.context().sessions().live(),
            hosters = self.hosters.len(),
            "Development network shutdown complete"
        );
    }
}

fn user_key(user: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[24..].copy_from_slice(&user.to_be_bytes());
    key[0] = 0x7e;
    key
}

/// Each hoster gets its own redb file under `dev/`.
fn hoster_storage(root: &Path, storage: &StorageConfig, n: usize) -> Result<StorageConfig> {
    Ok(match storage.backend {
        BackendKind::Memory => storage.clone(),
        BackendKind::Redb => {
            let dir = PathBuf::from("dev");
            fs::create_dir_all(root.join(&dir))?;
            StorageConfig {
                backend: BackendKind::Redb,
                path: Some(dir.join(format!("hoster-{n}.redb"))),
            }
        }
    })
}

async fn start_node(
    ledger: &Arc<MockLedger>,
    peer: &DevPeer,
    roles: RoleConfig,
    registry: Arc<StorageRegistry>,
) -> Result<Arc<Node>> {
    let identity = LocalIdentity::new(peer.key, Arc::new(peer.signer.clone()));
    let ctx = RoleContext::new(ledger.clone(), peer.transport.clone(), identity, roles);
    let node = Arc::new(Node::new(ctx, registry));
    node.start().await?;
    Ok(node)
}

fn spawn_run(
    node: &Arc<Node>,
    ledger: &Arc<MockLedger>,
    mut stopped: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let events = ledger.subscribe();
    tokio::spawn(node.clone().run(events, async move {
        let _ = stopped.wait_for(|stop| *stop).await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DataDirArgs;

    fn dev_args(root: &Path, corrupt: Option<u64>) -> DevArgs {
        DevArgs {
            datadir: DataDirArgs { datadir: Some(root.to_path_buf()) },
            chunks: 4,
            hosters: 2,
            corrupt,
            session_timeout_ms: Some(500),
        }
    }

    #[test]
    fn test_user_keys_are_distinct_and_nonzero() {
        assert_ne!(user_key(1), user_key(2));
        assert!(!PeerKey::new(user_key(0)).is_zero());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dev_walk_submits_every_report() {
        let tmp = tempfile::tempdir().unwrap();
        let args = dev_args(tmp.path(), None);
        let storage = StorageConfig { backend: BackendKind::Memory, path: None };
        let roles = RoleConfig { session_timeout: Duration::from_secs(2), ..Default::default() };

        let net = DevNetwork::new(tmp.path(), &storage, roles, &args).await.unwrap();
        net.walk(&args).await.unwrap();
        let ledger = net.ledger.clone();
        net.shutdown().await;

        assert_eq!(ledger.amendment_reports().len(), 1);
        assert_eq!(ledger.amendment_reports()[0].report.signatures.len(), 2);
        assert_eq!(ledger.storage_responses().len(), 1);
        assert_eq!(ledger.performance_reports().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dev_run_with_redb_backend() {
        let tmp = tempfile::tempdir().unwrap();
        run(dev_args(tmp.path(), None)).await.unwrap();
        assert!(tmp.path().join("config.toml").exists());
        assert!(tmp.path().join("dev").join("hoster-0.redb").exists());
    }

    #[tokio::test]
    async fn test_zero_chunks_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut args = dev_args(tmp.path(), None);
        args.chunks = 0;
        assert!(run(args).await.is_err());
    }
}
