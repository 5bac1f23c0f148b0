//! End-to-end tests of the peering engine through its service surface.
//!
//! Storage failures are injected with [`FlakyStore`], a wrapper around the
//! in-memory store that fails link commits for chosen pairs and can take
//! snapshots offline.

use async_trait::async_trait;
use ixp_peeringd::model::AutonomousSystem;
use ixp_peeringd::policy::{PolicyDraft, PolicyRef, Revision};
use ixp_peeringd::{
    InMemoryStore, LinkPreferences, LinkState, LinkWrite, PairOutcome, PeeringConfig,
    PeeringError, PeeringLink, PeeringPolicy, PeeringResult, PeeringService, PeeringStore,
    PolicyId, Scope, Selector, SelectorSet, Snapshot,
};
use ixp_types::{AsPair, Asn, BandwidthRange, BandwidthTier, GroupId, LinkType};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

fn asn(n: u32) -> Asn {
    Asn::new(n).unwrap()
}

fn pair(a: u32, b: u32) -> AsPair {
    AsPair::new(asn(a), asn(b)).unwrap()
}

fn accept(peers: &[u32]) -> SelectorSet {
    peers.iter().map(|n| Selector::AcceptAs(asn(*n))).collect()
}

fn tier(t: BandwidthTier) -> LinkPreferences {
    LinkPreferences::new(BandwidthRange::exactly(t))
}

fn fast_config() -> PeeringConfig {
    let mut config = PeeringConfig::default();
    config.reconciler.initial_backoff_ms = 1;
    config.reconciler.max_backoff_ms = 4;
    config
}

struct Harness {
    store: Arc<InMemoryStore>,
    service: PeeringService,
}

impl Harness {
    async fn new(systems: &[u32]) -> Self {
        Self::with_config(systems, fast_config()).await
    }

    async fn with_config(systems: &[u32], config: PeeringConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let service = PeeringService::new(store.clone(), &config);
        register(&service, systems).await;
        Self { store, service }
    }

    async fn submit(&self, owner: u32, peers: &[u32], t: BandwidthTier) -> PolicyId {
        self.service
            .submit_policy(asn(owner), accept(peers), tier(t))
            .await
            .unwrap()
    }

    async fn live_pairs(&self) -> Vec<AsPair> {
        self.store
            .snapshot()
            .await
            .unwrap()
            .links
            .keys()
            .copied()
            .collect()
    }
}

async fn register(service: &PeeringService, systems: &[u32]) {
    for n in systems {
        service
            .register_system(AutonomousSystem::new(asn(*n), format!("acct-{}", n), GroupId::new(1)))
            .await
            .unwrap();
    }
}

/// Wraps the in-memory store and fails `commit_link` for selected pairs.
struct FlakyStore {
    inner: InMemoryStore,
    /// Remaining injected failures per pair (`u32::MAX` = never recovers)
    failures: Mutex<HashMap<AsPair, u32>>,
    commit_attempts: AtomicU32,
    snapshot_down: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures: Mutex::new(HashMap::new()),
            commit_attempts: AtomicU32::new(0),
            snapshot_down: AtomicBool::new(false),
        }
    }

    fn fail_pair(&self, pair: AsPair, times: u32) {
        self.failures.lock().insert(pair, times);
    }
}

#[async_trait]
impl PeeringStore for FlakyStore {
    async fn register_system(&self, system: AutonomousSystem) -> PeeringResult<()> {
        self.inner.register_system(system).await
    }

    async fn autonomous_system(&self, asn: Asn) -> PeeringResult<Option<AutonomousSystem>> {
        self.inner.autonomous_system(asn).await
    }

    async fn policy(&self, id: PolicyId) -> PeeringResult<Option<PeeringPolicy>> {
        self.inner.policy(id).await
    }

    async fn policies_for(&self, asn: Asn) -> PeeringResult<Vec<PeeringPolicy>> {
        self.inner.policies_for(asn).await
    }

    async fn active_policy(&self, asn: Asn) -> PeeringResult<Option<PeeringPolicy>> {
        self.inner.active_policy(asn).await
    }

    async fn insert_superseding(
        &self,
        draft: PolicyDraft,
        expected_active: Option<PolicyId>,
    ) -> PeeringResult<PeeringPolicy> {
        self.inner.insert_superseding(draft, expected_active).await
    }

    async fn withdraw_policy(
        &self,
        id: PolicyId,
        expected_revision: Revision,
    ) -> PeeringResult<PeeringPolicy> {
        self.inner.withdraw_policy(id, expected_revision).await
    }

    async fn snapshot(&self) -> PeeringResult<Snapshot> {
        if self.snapshot_down.load(Ordering::SeqCst) {
            return Err(PeeringError::storage("snapshot", "store", "connection reset"));
        }
        self.inner.snapshot().await
    }

    async fn current_link(&self, pair: AsPair) -> PeeringResult<Option<PeeringLink>> {
        self.inner.current_link(pair).await
    }

    async fn links_for(&self, asn: Asn) -> PeeringResult<Vec<PeeringLink>> {
        self.inner.links_for(asn).await
    }

    async fn commit_link(&self, write: LinkWrite) -> PeeringResult<PeeringLink> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        let pair = write.pair();
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&pair) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(PeeringError::storage("commit_link", pair, "connection reset"));
                }
            }
        }
        self.inner.commit_link(write).await
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_mutual_policies_create_single_link() {
    let h = Harness::new(&[1, 2, 3]).await;
    h.submit(1, &[2, 3], BandwidthTier::G10).await;
    h.submit(2, &[1], BandwidthTier::G10).await;

    let report = h.service.reconcile(&Scope::All).await.unwrap();
    assert_eq!(
        report.labels(),
        BTreeMap::from([(pair(1, 2), "created".to_string())])
    );

    let links = h.service.list_links(asn(1)).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].pair, pair(1, 2));
    assert_eq!(links[0].state, LinkState::Active);
    assert_eq!(links[0].attributes.bandwidth, BandwidthTier::G10);
    assert_eq!(links[0].revision, 0);

    // AS3 has no policy: no link {1,3}
    assert!(h.service.list_links(asn(3)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_withdraw_removes_link() {
    let h = Harness::new(&[1, 2]).await;
    let p1 = h.submit(1, &[2], BandwidthTier::G10).await;
    h.submit(2, &[1], BandwidthTier::G10).await;
    h.service.reconcile(&Scope::All).await.unwrap();

    h.service.withdraw_policy(p1).await.unwrap();
    let report = h.service.reconcile(&Scope::single(asn(1))).await.unwrap();
    assert_eq!(report.labels()[&pair(1, 2)], "removed");

    assert!(h.service.list_links(asn(1)).await.unwrap().is_empty());
    assert!(h.service.list_links(asn(2)).await.unwrap().is_empty());

    let history = h.store.link_history(pair(1, 2));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, LinkState::Removed);
}

#[tokio::test]
async fn test_incompatible_bandwidth_removes_link() {
    let h = Harness::new(&[1, 2]).await;
    h.submit(1, &[2], BandwidthTier::G10).await;
    h.submit(2, &[1], BandwidthTier::G10).await;
    h.service.reconcile(&Scope::All).await.unwrap();

    // AS2 drops to exactly 1G: no overlap with AS1's 10G
    h.submit(2, &[1], BandwidthTier::G1).await;
    let report = h.service.reconcile(&Scope::All).await.unwrap();
    assert!(matches!(
        report.outcome(&pair(1, 2)),
        Some(PairOutcome::Removed { .. })
    ));
    assert!(h.live_pairs().await.is_empty());
}

#[tokio::test]
async fn test_attribute_change_replaces_link_identity() {
    let h = Harness::new(&[1, 2]).await;
    h.service
        .submit_policy(
            asn(1),
            accept(&[2]),
            LinkPreferences::new(BandwidthRange::new(BandwidthTier::G1, BandwidthTier::G10).unwrap()),
        )
        .await
        .unwrap();
    h.submit(2, &[1], BandwidthTier::G10).await;
    h.service.reconcile(&Scope::All).await.unwrap();
    let original = h.store.current_link(pair(1, 2)).await.unwrap().unwrap();

    // Still overlapping, but the chosen tier drops to 1G
    h.service
        .submit_policy(
            asn(2),
            accept(&[1]),
            LinkPreferences::new(BandwidthRange::new(BandwidthTier::G1, BandwidthTier::G1).unwrap())
                .with_link_type(LinkType::Private),
        )
        .await
        .unwrap();
    let report = h.service.reconcile(&Scope::All).await.unwrap();

    let Some(PairOutcome::Created { link, replaced }) = report.outcome(&pair(1, 2)) else {
        panic!("expected a replacement, got {:?}", report.outcome(&pair(1, 2)));
    };
    assert_eq!(*replaced, Some(original.id));
    assert_ne!(link.id, original.id);
    assert_eq!(link.attributes.bandwidth, BandwidthTier::G1);
    assert_eq!(link.attributes.link_type, LinkType::Private);

    let history = h.store.link_history(pair(1, 2));
    let states: Vec<LinkState> = history.iter().map(|l| l.state).collect();
    assert_eq!(states, vec![LinkState::Removed, LinkState::Active]);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let h = Harness::new(&[1, 2, 3, 4]).await;
    h.submit(1, &[2, 3, 4], BandwidthTier::G10).await;
    h.submit(2, &[1, 3], BandwidthTier::G10).await;
    h.submit(3, &[1, 2], BandwidthTier::G10).await;
    h.submit(4, &[1], BandwidthTier::G100).await;

    // {1,4} never matches: 10G and 100G do not overlap
    let first = h.service.reconcile(&Scope::All).await.unwrap();
    assert_eq!(first.summary().created, 3);

    assert!(h.service.plan(&Scope::All).await.unwrap().is_empty());
    let second = h.service.reconcile(&Scope::All).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_delta_is_independent_of_submission_order() {
    let policies: [(u32, &[u32], BandwidthTier); 4] = [
        (1, &[2, 3, 4], BandwidthTier::G10),
        (2, &[1, 3], BandwidthTier::G10),
        (3, &[1, 2], BandwidthTier::G1),
        (4, &[1], BandwidthTier::G100),
    ];

    let forward = Harness::new(&[1, 2, 3, 4]).await;
    for (owner, peers, t) in policies.iter() {
        forward.submit(*owner, peers, *t).await;
    }
    let backward = Harness::new(&[4, 3, 2, 1]).await;
    for (owner, peers, t) in policies.iter().rev() {
        backward.submit(*owner, peers, *t).await;
    }

    let decisions = |delta: ixp_peeringd::Delta| {
        delta
            .to_create
            .into_iter()
            .map(|planned| planned.decision)
            .collect::<Vec<_>>()
    };

    let a = decisions(forward.service.plan(&Scope::All).await.unwrap());
    let b = decisions(backward.service.plan(&Scope::All).await.unwrap());
    assert_eq!(a, b);
    assert_eq!(
        decisions(forward.service.plan(&Scope::All).await.unwrap()),
        a
    );
}

#[tokio::test]
async fn test_at_most_one_live_link_per_pair() {
    let h = Harness::new(&[1, 2, 3]).await;
    let tiers = [BandwidthTier::G1, BandwidthTier::G10, BandwidthTier::G100];

    for round in 0..6usize {
        for owner in 1..=3u32 {
            let peers: Vec<u32> = (1..=3).filter(|p| *p != owner).collect();
            let id = h.submit(owner, &peers, tiers[(round + owner as usize) % 3]).await;
            if round % 3 == 2 && owner == 2 {
                h.service.withdraw_policy(id).await.unwrap();
            }
        }
        h.service.reconcile(&Scope::All).await.unwrap();

        for p in [pair(1, 2), pair(1, 3), pair(2, 3)] {
            let live = h
                .store
                .link_history(p)
                .iter()
                .filter(|link| link.is_live())
                .count();
            assert!(live <= 1, "{p} has {live} live links in round {round}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_passes_serialize_per_pair() {
    let h = Arc::new(Harness::new(&[1, 2, 3]).await);
    h.submit(1, &[2, 3], BandwidthTier::G10).await;
    h.submit(2, &[1, 3], BandwidthTier::G10).await;
    h.submit(3, &[1, 2], BandwidthTier::G10).await;

    let passes: Vec<_> = (0..4)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.service.reconcile(&Scope::All).await.unwrap() })
        })
        .collect();

    let mut created = 0;
    for pass in passes {
        created += pass.await.unwrap().summary().created;
    }

    assert_eq!(created, 3);
    for p in [pair(1, 2), pair(1, 3), pair(2, 3)] {
        assert_eq!(h.store.link_history(p).len(), 1);
    }
}

// ============================================================================
// Stale-write protection
// ============================================================================

#[tokio::test]
async fn test_task_planned_before_withdraw_is_discarded() {
    let h = Harness::new(&[1, 2]).await;
    let p1 = h.submit(1, &[2], BandwidthTier::G10).await;
    h.submit(2, &[1], BandwidthTier::G10).await;

    let delta = h.service.plan(&Scope::All).await.unwrap();
    h.service.withdraw_policy(p1).await.unwrap();

    let report = h.service.apply(delta).await;
    assert_eq!(report.labels()[&pair(1, 2)], "skipped:stale");
    assert!(h.live_pairs().await.is_empty());
}

#[tokio::test]
async fn test_task_planned_before_resubmit_is_discarded() {
    let h = Harness::new(&[1, 2]).await;
    h.submit(1, &[2], BandwidthTier::G10).await;
    h.submit(2, &[1], BandwidthTier::G10).await;
    h.service.reconcile(&Scope::All).await.unwrap();

    // Planned removal goes stale when AS2 re-accepts before it commits
    let withdrawn = h.service.list_policies(asn(2)).await.unwrap()[0].id;
    h.service.withdraw_policy(withdrawn).await.unwrap();
    let delta = h.service.plan(&Scope::All).await.unwrap();
    h.submit(2, &[1], BandwidthTier::G10).await;

    let report = h.service.apply(delta).await;
    assert_eq!(report.outcome(&pair(1, 2)), Some(&PairOutcome::SkippedStale));
    assert_eq!(h.live_pairs().await, vec![pair(1, 2)]);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_transient_storage_failure_is_retried() {
    let store = Arc::new(FlakyStore::new());
    let service = PeeringService::new(store.clone(), &fast_config());
    register(&service, &[1, 2]).await;
    service.submit_policy(asn(1), accept(&[2]), tier(BandwidthTier::G1)).await.unwrap();
    service.submit_policy(asn(2), accept(&[1]), tier(BandwidthTier::G1)).await.unwrap();

    store.fail_pair(pair(1, 2), 2);
    let report = service.reconcile(&Scope::All).await.unwrap();

    assert_eq!(report.labels()[&pair(1, 2)], "created");
    assert_eq!(store.commit_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_pair_does_not_block_others() {
    let store = Arc::new(FlakyStore::new());
    let service = PeeringService::new(store.clone(), &fast_config());
    register(&service, &[1, 2, 3]).await;
    service.submit_policy(asn(1), accept(&[2, 3]), tier(BandwidthTier::G1)).await.unwrap();
    service.submit_policy(asn(2), accept(&[1]), tier(BandwidthTier::G1)).await.unwrap();
    service.submit_policy(asn(3), accept(&[1]), tier(BandwidthTier::G1)).await.unwrap();

    store.fail_pair(pair(1, 3), u32::MAX);
    let report = service.reconcile(&Scope::All).await.unwrap();

    assert_eq!(report.labels()[&pair(1, 2)], "created");
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, pair(1, 3));
    assert!(failures[0].1.contains("AS1-AS3"), "{}", failures[0].1);

    // 1 attempt for {1,2}, 1 + 3 retries for {1,3}
    assert_eq!(store.commit_attempts.load(Ordering::SeqCst), 5);

    // Once storage recovers the next pass converges
    store.fail_pair(pair(1, 3), 0);
    let retry = service.reconcile(&Scope::single(asn(3))).await.unwrap();
    assert_eq!(retry.labels()[&pair(1, 3)], "created");
}

#[tokio::test]
async fn test_triggers_survive_failed_snapshot() {
    let store = Arc::new(FlakyStore::new());
    let service = PeeringService::new(store.clone(), &fast_config());
    register(&service, &[1, 2]).await;
    service.submit_policy(asn(1), accept(&[2]), tier(BandwidthTier::G1)).await.unwrap();
    service.submit_policy(asn(2), accept(&[1]), tier(BandwidthTier::G1)).await.unwrap();
    assert_eq!(service.trigger().pending_count(), 2);

    store.snapshot_down.store(true, Ordering::SeqCst);
    let err = service.flush_triggers().await.unwrap_err();
    assert!(matches!(err, PeeringError::Storage { .. }));
    assert_eq!(service.trigger().pending_count(), 2);
    assert!(service.list_links(asn(1)).await.unwrap().is_empty());

    store.snapshot_down.store(false, Ordering::SeqCst);
    let report = service.flush_triggers().await.unwrap().unwrap();
    assert_eq!(report.labels()[&pair(1, 2)], "created");
    assert!(!service.trigger().has_pending());
    assert_eq!(service.list_links(asn(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_errors_name_the_offending_object() {
    let h = Harness::new(&[1, 2]).await;

    let err = h.service.withdraw_policy(PolicyId::new(77)).await.unwrap_err();
    assert_eq!(err.to_string(), "policy not found: policy#77");

    let err = h
        .service
        .submit_policy(asn(1), SelectorSet::new(), LinkPreferences::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PeeringError::Validation { .. }));
    assert!(err.to_string().contains("AS1"));

    let err = h.service.confirm_link(pair(1, 2)).await.unwrap_err();
    assert!(err.to_string().contains("AS1-AS2"));
}

// ============================================================================
// Two-phase provisioning
// ============================================================================

#[tokio::test]
async fn test_two_phase_links_wait_for_confirmation() {
    let mut config = fast_config();
    config.links.two_phase = true;
    let h = Harness::with_config(&[1, 2], config).await;
    h.submit(1, &[2], BandwidthTier::G10).await;
    h.submit(2, &[1], BandwidthTier::G10).await;

    h.service.reconcile(&Scope::All).await.unwrap();
    let links = h.service.list_links(asn(1)).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].state, LinkState::Proposed);

    // A proposed link already occupies the pair
    assert!(h.service.plan(&Scope::All).await.unwrap().is_empty());

    let confirmed = h.service.confirm_link(pair(1, 2)).await.unwrap();
    assert_eq!(confirmed.state, LinkState::Active);
    assert_eq!(confirmed.revision, links[0].revision + 1);
}

// ============================================================================
// Change trigger
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_collapses_into_one_pass() {
    let h = Harness::new(&[1, 2]).await;
    for t in [BandwidthTier::G1, BandwidthTier::G10, BandwidthTier::G100] {
        h.submit(1, &[2], t).await;
    }
    h.submit(2, &[1], BandwidthTier::G100).await;

    assert_eq!(h.service.trigger().pending_count(), 2);
    assert!(h.service.process_ready_triggers().await.unwrap().is_none());

    tokio::time::advance(h.service.trigger().debounce() + Duration::from_millis(1)).await;
    let report = h.service.process_ready_triggers().await.unwrap().unwrap();
    assert_eq!(report.summary().created, 1);
    assert_eq!(
        h.store.current_link(pair(1, 2)).await.unwrap().unwrap().attributes.bandwidth,
        BandwidthTier::G100
    );
    assert!(!h.service.trigger().has_pending());
}

#[tokio::test]
async fn test_justification_tracks_policy_revisions() {
    let h = Harness::new(&[1, 2]).await;
    let p1 = h.submit(1, &[2], BandwidthTier::G10).await;
    let p2 = h.submit(2, &[1], BandwidthTier::G10).await;
    h.service.flush_triggers().await.unwrap();

    let link = h.store.current_link(pair(1, 2)).await.unwrap().unwrap();
    assert_eq!(
        link.justification.low,
        PolicyRef {
            policy_id: p1,
            revision: 1
        }
    );
    assert_eq!(link.justification.high.policy_id, p2);
}
