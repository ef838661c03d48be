//! Health Scheduler
//!
//! Periodic control loop that re-probes known nodes.
//!
//! ## Cycle
//!
//! 1. Walk the records in last-check order, oldest first
//! 2. Pass over records still inside their backoff window until a full
//!    batch of due records is found or the store runs out
//! 3. Probe the due records through a bounded worker pool
//! 4. Feed each outcome back as a confirmed or failed check
//!
//! At most one cycle runs at a time. A cycle that overruns the interval is
//! followed immediately by the next one, never by a burst.
//!
//! ## Shutdown
//!
//! The shutdown flag is checked before every dispatch. Probes already in
//! flight finish (or time out) and record their outcome before the cycle
//! returns, so no record is left half-updated.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::error::ProbeError;
use crate::metrics::Metrics;
use crate::prober::Prober;
use crate::registry::{BackoffPolicy, NodeRegistry};
use crate::types::{ConfirmOutcome, NodeRecord, PeerNode};

/// Scheduler tuning
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Wall-clock period between cycle starts
    pub interval: Duration,

    /// Records pulled per cycle
    pub batch_size: usize,

    /// Worker pool size
    pub max_concurrent_probes: usize,

    /// Per-probe timeout
    pub probe_timeout: Duration,

    /// Re-probe backoff
    pub backoff: BackoffPolicy,
}

impl SchedulerConfig {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            interval: config.check_interval(),
            batch_size: config.batch_size,
            max_concurrent_probes: config.max_concurrent_probes,
            probe_timeout: config.probe_timeout(),
            backoff: BackoffPolicy::from_config(config),
        }
    }
}

/// Outcome counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records examined, due and deferred
    pub selected: usize,

    /// Records skipped because of backoff
    pub deferred: usize,

    /// Probes started
    pub dispatched: usize,

    /// Successful probes (known and new nodes)
    pub confirmed: usize,

    /// Successful probes that created a record
    pub discovered: usize,

    /// Failed probes
    pub failed: usize,

    /// Store operations that failed
    pub store_errors: usize,

    /// Probes not started because of shutdown
    pub cancelled: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Confirmed(ConfirmOutcome::Discovered) => {
                self.confirmed += 1;
                self.discovered += 1;
            }
            ProbeOutcome::Confirmed(ConfirmOutcome::Known) => self.confirmed += 1,
            ProbeOutcome::Failed => self.failed += 1,
            ProbeOutcome::StoreError => self.store_errors += 1,
        }
    }
}

/// Result of one probe task
#[derive(Debug, Clone, Copy)]
enum ProbeOutcome {
    Confirmed(ConfirmOutcome),
    Failed,
    StoreError,
}

/// Periodic node re-probing
pub struct HealthScheduler {
    registry: Arc<NodeRegistry>,
    prober: Arc<dyn Prober>,
    config: SchedulerConfig,
    metrics: Arc<Metrics>,
}

impl HealthScheduler {
    pub fn new(
        registry: Arc<NodeRegistry>,
        prober: Arc<dyn Prober>,
        config: SchedulerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            prober,
            config,
            metrics,
        }
    }

    /// Run cycles until `shutdown` flips to true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "🩺 Health scheduler started (every {:?}, batch {}, {} workers)",
            self.config.interval, self.config.batch_size, self.config.max_concurrent_probes
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let report = self.run_cycle(&shutdown).await;
            let elapsed = started.elapsed();

            self.metrics.inc_cycles();
            if elapsed > self.config.interval {
                self.metrics.inc_cycles_overrun();
                warn!(
                    "Health cycle took {:?}, longer than the {:?} interval",
                    elapsed, self.config.interval
                );
            }

            self.log_cycle(&report, elapsed).await;
        }

        info!("🛑 Health scheduler stopped");
    }

    /// Execute a single cycle
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport::default();
        let now = Utc::now();

        let batch_size = self.config.batch_size;

        // Backed-off records sit at the front of the check order, so widen
        // the window until it yields a full batch of due records or covers
        // the whole store.
        let mut window = batch_size;
        let (due, deferred) = loop {
            let batch = match self.registry.update_batch(window).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Failed to load update batch: {}", e);
                    self.metrics.inc_store_errors();
                    report.store_errors += 1;
                    return report;
                }
            };
            let exhausted = batch.len() < window;
            let (due, deferred) = self.split_due(batch, now);

            if due.len() >= batch_size || exhausted {
                break (due, deferred);
            }
            window = window.saturating_mul(2);
        };

        report.selected = due.len() + deferred;
        report.deferred = deferred;

        self.dispatch(due, shutdown, &mut report).await;
        report
    }

    /// Due records in check order, up to the batch size, and the number of
    /// backed-off records passed over before the batch filled
    fn split_due(&self, batch: Vec<NodeRecord>, now: DateTime<Utc>) -> (Vec<PeerNode>, usize) {
        let mut due = Vec::with_capacity(self.config.batch_size.min(batch.len()));
        let mut deferred = 0;

        for record in batch {
            if due.len() >= self.config.batch_size {
                break;
            }
            if self.config.backoff.is_due(&record, now) {
                due.push(record.peer());
            } else {
                deferred += 1;
            }
        }

        (due, deferred)
    }

    /// Probe arbitrary nodes once, e.g. configured seeds
    ///
    /// Reachable unknown nodes are created; unreachable unknown nodes are
    /// not stored.
    pub async fn probe_nodes(
        &self,
        nodes: Vec<PeerNode>,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleReport {
        let mut report = CycleReport {
            selected: nodes.len(),
            ..Default::default()
        };
        self.dispatch(nodes, shutdown, &mut report).await;
        report
    }

    async fn dispatch(
        &self,
        nodes: Vec<PeerNode>,
        shutdown: &watch::Receiver<bool>,
        report: &mut CycleReport,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes));
        let mut in_flight = JoinSet::new();
        let total = nodes.len();

        for (index, node) in nodes.into_iter().enumerate() {
            // Waits for a free worker; bounded by the probe timeout
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            if *shutdown.borrow() {
                report.cancelled = total - index;
                info!("Shutdown requested, {} probes not dispatched", report.cancelled);
                break;
            }

            let registry = self.registry.clone();
            let prober = self.prober.clone();
            let metrics = self.metrics.clone();
            let timeout = self.config.probe_timeout;

            report.dispatched += 1;
            self.metrics.inc_probes_dispatched();

            in_flight.spawn(async move {
                let _permit = permit;
                probe_and_record(&registry, prober.as_ref(), &metrics, node, timeout).await
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => error!("Probe task aborted: {}", e),
            }
        }
    }

    async fn log_cycle(&self, report: &CycleReport, elapsed: Duration) {
        info!(
            "📊 Cycle: {} selected, {} deferred, {} confirmed ({} new), {} failed, {} store errors in {:?}",
            report.selected,
            report.deferred,
            report.confirmed,
            report.discovered,
            report.failed,
            report.store_errors,
            elapsed
        );

        match self.registry.stats().await {
            Ok(stats) => debug!(
                "Registry: {} nodes, {} healthy, {} dead, best score {:?}",
                stats.total, stats.healthy, stats.dead, stats.best_score
            ),
            Err(e) => debug!("Registry stats unavailable: {}", e),
        }

        debug!("Metrics: {}", self.metrics.to_json());
    }
}

/// Probe one node and record the outcome
async fn probe_and_record(
    registry: &NodeRegistry,
    prober: &dyn Prober,
    metrics: &Metrics,
    node: PeerNode,
    timeout: Duration,
) -> ProbeOutcome {
    // Enforced here as well in case the prober ignores its timeout
    let result = match tokio::time::timeout(timeout, prober.check(&node.endpoint, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };

    let now = Utc::now();

    match result {
        Ok(()) => {
            metrics.inc_probes_succeeded();
            match registry.confirm_check(&node, now).await {
                Ok(outcome) => {
                    if outcome == ConfirmOutcome::Discovered {
                        metrics.inc_nodes_discovered();
                    }
                    ProbeOutcome::Confirmed(outcome)
                }
                Err(e) => {
                    warn!("Failed to confirm node {}: {}", node.id.short(), e);
                    metrics.inc_store_errors();
                    ProbeOutcome::StoreError
                }
            }
        }
        Err(probe_error) => {
            metrics.inc_probes_failed();
            debug!("Probe of {} at {} failed: {}", node.id.short(), node.endpoint, probe_error);
            match registry.fail_check(&node.id, now).await {
                Ok(()) => ProbeOutcome::Failed,
                Err(e) => {
                    warn!("Failed to record failed check for {}: {}", node.id.short(), e);
                    metrics.inc_store_errors();
                    ProbeOutcome::StoreError
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::registry::ScoringPolicy;
    use crate::store::test_support::*;
    use crate::store::{MemoryNodeStore, NodeStore};
    use crate::types::{Endpoint, NodeId, NodeRecord};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prober answering from a fixed set of live IPs
    #[derive(Default)]
    struct ScriptedProber {
        live: HashSet<IpAddr>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn live(nodes: &[PeerNode]) -> Self {
            Self {
                live: nodes.iter().map(|n| n.endpoint.ip).collect(),
                ..Default::default()
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn check(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.live.contains(&endpoint.ip) {
                Ok(())
            } else {
                Err(ProbeError::Refused("scripted".into()))
            }
        }
    }

    /// Memory store that refuses writes for one id
    struct FlakyStore {
        inner: MemoryNodeStore,
        broken: NodeId,
    }

    #[async_trait]
    impl NodeStore for FlakyStore {
        async fn lookup(&self, id: &NodeId) -> Result<NodeRecord, StoreError> {
            self.inner.lookup(id).await
        }
        async fn exists(&self, id: &NodeId) -> Result<bool, StoreError> {
            self.inner.exists(id).await
        }
        async fn upsert(&self, record: &NodeRecord) -> Result<(), StoreError> {
            if record.id == self.broken {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.upsert(record).await
        }
        async fn update_batch(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError> {
            self.inner.update_batch(limit).await
        }
        async fn bootstrap_set(&self, limit: usize, t: u32) -> Result<Vec<PeerNode>, StoreError> {
            self.inner.bootstrap_set(limit, t).await
        }
        async fn all(&self) -> Result<Vec<NodeRecord>, StoreError> {
            self.inner.all().await
        }
    }

    fn config(batch_size: usize, workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(20),
            batch_size,
            max_concurrent_probes: workers,
            probe_timeout: Duration::from_millis(200),
            backoff: BackoffPolicy::new(Duration::from_secs(60), 6),
        }
    }

    fn scheduler(
        store: Arc<dyn NodeStore>,
        prober: Arc<dyn Prober>,
        config: SchedulerConfig,
    ) -> (Arc<NodeRegistry>, HealthScheduler) {
        let registry = Arc::new(NodeRegistry::new(store, ScoringPolicy::default()));
        let scheduler = HealthScheduler::new(registry.clone(), prober, config, Arc::new(Metrics::new()));
        (registry, scheduler)
    }

    async fn seed(registry: &NodeRegistry, count: u8) {
        for n in 1..=count {
            registry.confirm_check(&node(n), at(i64::from(n))).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cycle_routes_outcomes() {
        let prober = Arc::new(ScriptedProber::live(&[node(1), node(2)]));
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober, config(10, 4));
        seed(&registry, 3).await;

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.selected, 3);
        assert_eq!(report.dispatched, 3);
        assert_eq!(report.confirmed, 2);
        assert_eq!(report.discovered, 0);
        assert_eq!(report.failed, 1);

        assert_eq!(registry.lookup(&node(1).id).await.unwrap().score, 2);
        let down = registry.lookup(&node(3).id).await.unwrap();
        assert_eq!(down.check_failure_count, 1);
        assert_eq!(down.score, 0);
    }

    #[tokio::test]
    async fn test_recently_checked_nodes_are_deferred() {
        let prober = Arc::new(ScriptedProber::live(&[node(1), node(2)]));
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober.clone(), config(10, 4));
        registry.confirm_check(&node(1), at(0)).await.unwrap();
        registry.confirm_check(&node(2), Utc::now()).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.selected, 2);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_size_limits_cycle() {
        let prober = Arc::new(ScriptedProber::default());
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober, config(2, 4));
        seed(&registry, 5).await;

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;
        assert_eq!(report.dispatched, 2);

        // The two oldest were the ones probed
        assert_eq!(registry.lookup(&node(1).id).await.unwrap().check_failure_count, 1);
        assert_eq!(registry.lookup(&node(2).id).await.unwrap().check_failure_count, 1);
        assert_eq!(registry.lookup(&node(3).id).await.unwrap().check_failure_count, 0);
    }

    #[tokio::test]
    async fn test_backed_off_nodes_do_not_starve_due_nodes() {
        let store = Arc::new(MemoryNodeStore::new());
        let now = Utc::now();

        // Two failing nodes, checked long ago but still inside their backoff
        for (n, ago) in [(1u8, 120i64), (2, 110)] {
            let mut failing = record(n, -20, 6, None);
            failing.last_check = Some(now - chrono::Duration::seconds(ago));
            store.upsert(&failing).await.unwrap();
        }
        let mut healthy = record(3, 1, 0, None);
        healthy.last_check = Some(now - chrono::Duration::seconds(100));
        store.upsert(&healthy).await.unwrap();

        let prober = Arc::new(ScriptedProber::live(&[node(3)]));
        let (registry, scheduler) = scheduler(store, prober.clone(), config(2, 2));

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.deferred, 2);
        assert_eq!(report.selected, 3);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.confirmed, 1);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.lookup(&node(3).id).await.unwrap().score, 2);
    }

    #[tokio::test]
    async fn test_cycle_with_only_backed_off_nodes_probes_nothing() {
        let store = Arc::new(MemoryNodeStore::new());
        let now = Utc::now();
        for n in 1..=5 {
            let mut failing = record(n, -20, 6, None);
            failing.last_check = Some(now);
            store.upsert(&failing).await.unwrap();
        }

        let prober = Arc::new(ScriptedProber::default());
        let (_, scheduler) = scheduler(store, prober.clone(), config(2, 2));

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.selected, 5);
        assert_eq!(report.deferred, 5);
        assert_eq!(report.dispatched, 0);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let nodes: Vec<PeerNode> = (1..=20).map(node).collect();
        let prober = Arc::new(ScriptedProber::live(&nodes).with_delay(Duration::from_millis(20)));
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober.clone(), config(50, 3));
        seed(&registry, 20).await;

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.confirmed, 20);
        assert!(prober.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_slow_probe_counts_as_failure() {
        let prober = Arc::new(ScriptedProber::live(&[node(1)]).with_delay(Duration::from_secs(5)));
        let mut cfg = config(10, 2);
        cfg.probe_timeout = Duration::from_millis(30);
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober, cfg);
        seed(&registry, 1).await;

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.failed, 1);
        assert_eq!(registry.lookup(&node(1).id).await.unwrap().check_failure_count, 1);
    }

    #[tokio::test]
    async fn test_store_error_does_not_abort_cycle() {
        let store = Arc::new(FlakyStore {
            inner: MemoryNodeStore::new(),
            broken: node(2).id,
        });
        for n in 1..=3 {
            store.inner.upsert(&record(n, 1, 0, Some(i64::from(n)))).await.unwrap();
        }

        let prober = Arc::new(ScriptedProber::live(&[node(1), node(2), node(3)]));
        let (_, scheduler) = scheduler(store, prober, config(10, 2));

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.confirmed, 2);
        assert_eq!(report.store_errors, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_dispatch() {
        let prober = Arc::new(ScriptedProber::default());
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober.clone(), config(10, 2));
        seed(&registry, 4).await;

        let (_tx, rx) = watch::channel(true);
        let report = scheduler.run_cycle(&rx).await;

        assert_eq!(report.dispatched, 0);
        assert_eq!(report.cancelled, 4);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_mid_cycle_lets_in_flight_probe_finish() {
        let nodes: Vec<PeerNode> = (1..=3).map(node).collect();
        let prober = Arc::new(ScriptedProber::live(&nodes).with_delay(Duration::from_millis(80)));
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober.clone(), config(10, 1));
        seed(&registry, 3).await;

        let (tx, rx) = watch::channel(false);
        let (report, _) = tokio::join!(scheduler.run_cycle(&rx), async {
            // The single worker is busy with node 1 by now
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.cancelled, 2);
        assert_eq!(report.confirmed, 1);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);

        let probed = registry.lookup(&node(1).id).await.unwrap();
        assert!(probed.last_check > Some(at(1)));
        assert_eq!(probed.score, 2);

        let skipped = registry.lookup(&node(2).id).await.unwrap();
        assert_eq!(skipped.last_check, Some(at(2)));
    }

    #[tokio::test]
    async fn test_probe_nodes_discovers_reachable_seeds() {
        let prober = Arc::new(ScriptedProber::live(&[node(1)]));
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober, config(10, 2));

        let (_tx, rx) = watch::channel(false);
        let report = scheduler.probe_nodes(vec![node(1), node(2)], &rx).await;

        assert_eq!(report.discovered, 1);
        assert_eq!(report.failed, 1);
        assert!(registry.is_known(&node(1).id).await);
        assert!(!registry.is_known(&node(2).id).await);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let prober = Arc::new(ScriptedProber::live(&[node(1)]));
        let (registry, scheduler) = scheduler(Arc::new(MemoryNodeStore::new()), prober.clone(), config(10, 2));
        seed(&registry, 1).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(prober.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(registry.lookup(&node(1).id).await.unwrap().score, 2);
    }

    #[tokio::test]
    async fn test_overrunning_cycles_run_back_to_back() {
        let prober = Arc::new(ScriptedProber::live(&[node(1)]).with_delay(Duration::from_millis(60)));
        let registry = Arc::new(NodeRegistry::new(Arc::new(MemoryNodeStore::new()), ScoringPolicy::default()));
        seed(&registry, 1).await;

        // 20ms interval, 60ms cycles, node due on every cycle
        let mut cfg = config(10, 1);
        cfg.backoff = BackoffPolicy::new(Duration::ZERO, 0);
        let metrics = Arc::new(Metrics::new());
        let scheduler = HealthScheduler::new(registry.clone(), prober.clone(), cfg, metrics.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        tokio::time::sleep(Duration::from_millis(250)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let cycles = metrics.cycles.load(Ordering::Relaxed);
        let overruns = metrics.cycles_overrun.load(Ordering::Relaxed);

        // One node per cycle: overlapping cycles would probe it twice at once
        assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(cycles >= 2);
        assert!(overruns >= 1);
        // Each cycle takes at least 60ms, so no more than 5 fit in 250ms
        assert!(cycles <= 5);
    }
}
