//! The sync engine
//!
//! Drains the ledger's intent queue into the remote store, maintains the
//! durable pending backlog for the time spent offline, reconciles full
//! snapshots on reconnect, applies the remote change feed, and seeds a
//! brand new account with the default ledger.
//!
//! Pushes use capped exponential backoff; an intent that exhausts its
//! attempts (or arrives while offline) is parked in the pending backlog,
//! which is persisted through the cache so a crash cannot lose an
//! unsynced edit.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};

use lifeledger_cache::CacheRef;
use lifeledger_config::SyncConfig;
use lifeledger_core::{
    merge_snapshots, FinancialCategory, Ledger, LedgerEvent, LedgerRecord, PaymentMethod,
    SyncIntent, PENDING_INTENTS_KEY,
};

use crate::error::SyncError;
use crate::remote::{RemoteChange, RemoteRef};

pub struct SyncEngine {
    ledger: Arc<Ledger>,
    remote: RemoteRef,
    cache: CacheRef,
    connectivity: watch::Receiver<bool>,
    user_id: String,
    config: SyncConfig,
    pending: Mutex<VecDeque<SyncIntent>>,
}

impl SyncEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        remote: RemoteRef,
        cache: CacheRef,
        connectivity: watch::Receiver<bool>,
        user_id: String,
        config: SyncConfig,
    ) -> Self {
        Self {
            ledger,
            remote,
            cache,
            connectivity,
            user_id,
            config,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    // ==================== Pending Backlog ====================

    /// Restore the pending backlog persisted by an earlier session
    pub async fn load_pending(&self) -> Result<(), SyncError> {
        let value = self
            .cache
            .load(PENDING_INTENTS_KEY)
            .await
            .map_err(|e| SyncError::Persistence {
                message: e.to_string(),
            })?;
        let Some(value) = value else {
            return Ok(());
        };

        let intents: Vec<SyncIntent> = serde_json::from_value(value)?;
        if !intents.is_empty() {
            log::info!("Restored {} pending sync intents", intents.len());
            self.ledger.emit_event(LedgerEvent::PendingChanged(true));
        }
        *self.pending.lock().await = intents.into();
        Ok(())
    }

    async fn persist_pending(&self, pending: &VecDeque<SyncIntent>) {
        let value = match serde_json::to_value(pending.iter().collect::<Vec<_>>()) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Could not serialize pending intents: {}", e);
                return;
            }
        };
        if let Err(e) = self.cache.save(PENDING_INTENTS_KEY, &value).await {
            log::warn!("Could not persist pending intents: {}", e);
        }
    }

    async fn park(&self, intent: SyncIntent) {
        let mut pending = self.pending.lock().await;
        let was_empty = pending.is_empty();
        // A newer intent for the same entity supersedes the parked one;
        // this keeps the backlog one entry per entity and replay-safe.
        pending.retain(|queued| {
            queued.kind() != intent.kind() || queued.entity_id() != intent.entity_id()
        });
        pending.push_back(intent);
        self.persist_pending(&pending).await;
        if was_empty {
            self.ledger.emit_event(LedgerEvent::PendingChanged(true));
        }
    }

    // ==================== Pushing ====================

    /// Push one intent, parking it as pending when it cannot be delivered
    pub async fn handle_intent(&self, intent: SyncIntent) {
        if !self.is_online() {
            log::debug!(
                "Offline, parking {} for {}",
                intent_verb(&intent),
                intent.entity_id()
            );
            self.park(intent).await;
            return;
        }

        match self.push_with_retry(&intent).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                log::warn!(
                    "Push of {} {} failed after {} attempts, parked as pending: {}",
                    intent_verb(&intent),
                    intent.entity_id(),
                    self.config.max_push_attempts,
                    e
                );
                self.park(intent).await;
            }
            Err(e) => {
                // Permanent rejection: retrying would loop forever, so the
                // intent is dropped and the divergence left to the next
                // reconcile pass.
                log::error!(
                    "Remote permanently rejected {} of {}: {}",
                    intent_verb(&intent),
                    intent.entity_id(),
                    e
                );
            }
        }
    }

    async fn push_once(&self, intent: &SyncIntent) -> Result<(), SyncError> {
        match intent {
            SyncIntent::Upsert { record } => self.remote.put(&self.user_id, record).await,
            SyncIntent::Delete { kind, id } => self.remote.delete(&self.user_id, *kind, id).await,
        }
    }

    async fn push_with_retry(&self, intent: &SyncIntent) -> Result<(), SyncError> {
        let attempts = self.config.max_push_attempts.max(1);
        let mut last_error = SyncError::Offline;

        for attempt in 0..attempts {
            if attempt > 0 {
                if !self.is_online() {
                    // Connectivity dropped mid-retry; park immediately
                    // instead of burning the remaining attempts.
                    return Err(SyncError::Offline);
                }
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
            match self.push_once(intent).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => last_error = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(exp.min(self.config.backoff_cap_ms))
    }

    /// Drain the pending backlog in arrival order
    ///
    /// Stops at the first transient failure so ordering is preserved;
    /// whatever was delivered stays delivered, which is safe because
    /// every intent is idempotent.
    pub async fn flush_pending(&self) {
        loop {
            let intent = {
                let pending = self.pending.lock().await;
                match pending.front() {
                    Some(intent) => intent.clone(),
                    None => return,
                }
            };

            match self.push_with_retry(&intent).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    let remaining = self.pending.lock().await.len();
                    log::info!("Flush interrupted, {} still pending: {}", remaining, e);
                    return;
                }
                Err(e) => {
                    log::error!(
                        "Dropping permanently rejected pending {} of {}: {}",
                        intent_verb(&intent),
                        intent.entity_id(),
                        e
                    );
                }
            }

            let mut pending = self.pending.lock().await;
            // A concurrent park may have superseded the entry just
            // delivered with a newer intent for the same entity; only
            // drop the exact intent that was pushed.
            if pending.front() == Some(&intent) {
                pending.pop_front();
                self.persist_pending(&pending).await;
                if pending.is_empty() {
                    self.ledger.emit_event(LedgerEvent::PendingChanged(false));
                }
            }
        }
    }

    // ==================== Reconciliation ====================

    /// Full snapshot reconciliation against the remote store
    ///
    /// Runs after every reconnect: fetch the remote snapshot, merge it
    /// with the local one, adopt the converged ledger, and push the
    /// records the remote was missing or held stale copies of.
    pub async fn reconcile(&self) -> Result<(), SyncError> {
        let remote_data = self.remote.fetch_all(&self.user_id).await?;
        let local_data = self.ledger.snapshot();

        let outcome = merge_snapshots(&local_data, &remote_data);
        let to_push = outcome.push_to_remote.len();
        self.ledger.adopt_merged(outcome.data).await?;

        for record in outcome.push_to_remote {
            self.handle_intent(SyncIntent::Upsert { record }).await;
        }

        log::info!(
            "Reconciled with remote: {} records pushed back",
            to_push
        );
        Ok(())
    }

    /// Seed a brand new account with the default ledger
    ///
    /// Only when both sides are empty. The defaults use fixed ids, so a
    /// seeding pass that raced another device collapses into the same
    /// records instead of duplicating them.
    pub async fn bootstrap_if_empty(&self) -> Result<(), SyncError> {
        let remote_data = self.remote.fetch_all(&self.user_id).await?;
        if !remote_data.is_empty() || !self.ledger.snapshot().is_empty() {
            return Ok(());
        }

        log::info!("Empty account, seeding default payment methods and categories");
        let mut seeds: Vec<LedgerRecord> = PaymentMethod::seed_defaults()
            .into_iter()
            .map(LedgerRecord::PaymentMethod)
            .collect();
        seeds.extend(
            FinancialCategory::seed_defaults()
                .into_iter()
                .map(LedgerRecord::Category),
        );

        for record in seeds {
            self.remote.put(&self.user_id, &record).await?;
            self.ledger.apply_remote_upsert(record).await?;
        }
        Ok(())
    }

    // ==================== Change Feed ====================

    /// Apply one change from the remote feed to the local ledger
    ///
    /// Echoes of this device's own pushes re-apply identical content, so
    /// no origin tracking is needed.
    pub async fn apply_change(&self, change: RemoteChange) {
        let result = match change {
            RemoteChange::Upserted(record) => self.ledger.apply_remote_upsert(record).await,
            RemoteChange::Deleted { kind, id } => self.ledger.apply_remote_delete(kind, &id).await,
        };
        if let Err(e) = result {
            log::error!("Could not apply remote change: {}", e);
        }
    }

    // ==================== Run Loop ====================

    /// Run the engine until the ledger's intent channel closes
    ///
    /// Owns the intent receiver, the connectivity subscription, and the
    /// remote change feed. On startup (and on every reconnect) the
    /// pending backlog is flushed first, then a full reconcile runs, so
    /// offline edits reach the remote before its snapshot is merged back.
    pub async fn run(self: Arc<Self>, mut intents: mpsc::UnboundedReceiver<SyncIntent>) {
        let mut connectivity = self.connectivity.clone();
        let mut feed = self.remote.subscribe(&self.user_id);

        if let Err(e) = self.load_pending().await {
            log::warn!("Could not restore pending intents: {}", e);
        }

        if self.is_online() {
            self.on_reconnect().await;
        }

        loop {
            tokio::select! {
                intent = intents.recv() => {
                    match intent {
                        Some(intent) => self.handle_intent(intent).await,
                        None => {
                            log::info!("Ledger closed, sync engine stopping");
                            return;
                        }
                    }
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        log::info!("Connectivity monitor dropped, sync engine stopping");
                        return;
                    }
                    if *connectivity.borrow() {
                        self.on_reconnect().await;
                    }
                }
                change = feed.recv() => {
                    match change {
                        Ok(change) => self.apply_change(change).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            log::warn!(
                                "Remote feed lagged by {} changes, reconciling",
                                missed
                            );
                            if self.is_online() {
                                if let Err(e) = self.reconcile().await {
                                    log::warn!("Reconcile after lag failed: {}", e);
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            log::info!("Remote feed closed, sync engine stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn on_reconnect(&self) {
        if let Err(e) = self.bootstrap_if_empty().await {
            log::warn!("Bootstrap failed: {}", e);
        }
        self.flush_pending().await;
        if let Err(e) = self.reconcile().await {
            log::warn!("Reconcile failed: {}", e);
        }
    }
}

/// Drain intents when no remote store is configured
///
/// Local-only sessions still write through to the cache; the intents
/// merely have nowhere to go and are discarded as they arrive.
pub async fn run_local_only(mut intents: mpsc::UnboundedReceiver<SyncIntent>) {
    while let Some(intent) = intents.recv().await {
        log::debug!(
            "Local-only session, discarding {} for {}",
            intent_verb(&intent),
            intent.entity_id()
        );
    }
}

fn intent_verb(intent: &SyncIntent) -> &'static str {
    match intent {
        SyncIntent::Upsert { .. } => "upsert",
        SyncIntent::Delete { .. } => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use crate::memory::MemoryRemoteStore;
    use crate::remote::RemoteStore;
    use lifeledger_cache::MemoryCache;
    use lifeledger_core::{EntityKind, FlowKind};
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;

    struct Device {
        ledger: Arc<Ledger>,
        engine: Arc<SyncEngine>,
        monitor: ConnectivityMonitor,
        intents: StdMutex<Option<mpsc::UnboundedReceiver<SyncIntent>>>,
    }

    fn fast_config() -> SyncConfig {
        SyncConfig {
            max_push_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
        }
    }

    fn device(remote: &Arc<MemoryRemoteStore>, user: &str, online: bool) -> Device {
        let cache = Arc::new(MemoryCache::new());
        device_with_cache(remote, user, online, cache)
    }

    fn device_with_cache(
        remote: &Arc<MemoryRemoteStore>,
        user: &str,
        online: bool,
        cache: Arc<MemoryCache>,
    ) -> Device {
        let ledger = Arc::new(Ledger::new(cache.clone()));
        let monitor = ConnectivityMonitor::new(online);
        let engine = Arc::new(SyncEngine::new(
            ledger.clone(),
            remote.clone() as RemoteRef,
            cache.clone(),
            monitor.subscribe(),
            user.to_string(),
            fast_config(),
        ));
        let intents = StdMutex::new(ledger.intent_receiver());
        Device {
            ledger,
            engine,
            monitor,
            intents,
        }
    }

    fn cash_method(id: &str, initial: i64) -> LedgerRecord {
        let mut m = PaymentMethod::new("Cash", Decimal::from(initial));
        m.id = id.to_string();
        LedgerRecord::PaymentMethod(m)
    }

    async fn drain_intents(device: &Device) {
        let mut batch = Vec::new();
        {
            let mut guard = device.intents.lock().unwrap();
            let rx = guard.as_mut().unwrap();
            while let Ok(intent) = rx.try_recv() {
                batch.push(intent);
            }
        }
        for intent in batch {
            device.engine.handle_intent(intent).await;
        }
    }

    #[tokio::test]
    async fn test_online_mutation_reaches_remote() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);

        dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
        drain_intents(&dev).await;

        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
        assert_eq!(dev.engine.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_offline_mutation_parks_then_flushes() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", false);

        dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
        drain_intents(&dev).await;

        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 0);
        assert_eq!(dev.engine.pending_count().await, 1);

        dev.monitor.set_online(true);
        dev.engine.flush_pending().await;

        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
        assert_eq!(dev.engine.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_parks_intent() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);
        // the monitor says online but the backend is down
        remote.set_available(false);

        dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
        drain_intents(&dev).await;

        assert_eq!(dev.engine.pending_count().await, 1);

        remote.set_available(true);
        dev.engine.flush_pending().await;
        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
    }

    #[tokio::test]
    async fn test_pending_collapses_per_entity() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", false);

        dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
        drain_intents(&dev).await;
        // three edits to the same record while offline
        dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
        dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
        drain_intents(&dev).await;

        assert_eq!(dev.engine.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_pending_survives_restart() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let cache = Arc::new(MemoryCache::new());

        {
            let dev = device_with_cache(&remote, "alice", false, cache.clone());
            dev.ledger.upsert(cash_method("pm-1", 100)).await.unwrap();
            drain_intents(&dev).await;
            assert_eq!(dev.engine.pending_count().await, 1);
        }

        // same cache, fresh process
        let dev = device_with_cache(&remote, "alice", true, cache);
        dev.ledger.load_from_cache().await.unwrap();
        dev.engine.load_pending().await.unwrap();
        assert_eq!(dev.engine.pending_count().await, 1);

        dev.engine.flush_pending().await;
        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
    }

    #[tokio::test]
    async fn test_two_devices_converge_through_reconcile() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let a = device(&remote, "alice", true);
        let b = device(&remote, "alice", true);

        // device A creates a method and a transaction
        a.ledger.upsert(cash_method("pm-1", 1000)).await.unwrap();
        a.ledger
            .upsert(LedgerRecord::Transaction(lifeledger_core::Transaction {
                id: "t-1".to_string(),
                amount: Decimal::from(100),
                date: chrono::Utc::now(),
                description: String::new(),
                category_id: "cat-food".to_string(),
                payment_method_id: "pm-1".to_string(),
                kind: FlowKind::Expense,
                updated_at: None,
            }))
            .await
            .unwrap();
        drain_intents(&a).await;

        // device B reconciles and sees the same ledger, balances included
        b.engine.reconcile().await.unwrap();
        let b_data = b.ledger.snapshot();
        assert_eq!(b_data.transactions.len(), 1);
        assert_eq!(
            b_data.payment_methods["pm-1"].current_balance,
            Decimal::from(900)
        );

        // device B deletes the transaction; the deletion reaches A
        // through the remote change feed
        let mut a_feed = remote.subscribe("alice");
        b.ledger
            .delete(EntityKind::Transaction, "t-1")
            .await
            .unwrap();
        drain_intents(&b).await;
        while let Ok(change) = a_feed.try_recv() {
            a.engine.apply_change(change).await;
        }

        let a_data = a.ledger.snapshot();
        assert!(a_data.transactions.is_empty());
        assert_eq!(
            a_data.payment_methods["pm-1"].current_balance,
            Decimal::from(1000)
        );
    }

    #[tokio::test]
    async fn test_reconcile_pushes_local_only_records() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);

        // created while the engine was not attached
        dev.ledger.upsert(cash_method("pm-1", 50)).await.unwrap();
        dev.engine.reconcile().await.unwrap();

        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_empty_account_once() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);

        dev.engine.bootstrap_if_empty().await.unwrap();
        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 2);
        assert_eq!(remote.record_count("alice", EntityKind::Category), 6);
        assert_eq!(dev.ledger.list(EntityKind::Category).len(), 6);

        // a second pass (or a second device) must not duplicate anything
        dev.engine.bootstrap_if_empty().await.unwrap();
        let other = device(&remote, "alice", true);
        other.engine.bootstrap_if_empty().await.unwrap();
        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 2);
        assert_eq!(remote.record_count("alice", EntityKind::Category), 6);
    }

    #[tokio::test]
    async fn test_bootstrap_skips_nonempty_remote() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote
            .put("alice", &cash_method("pm-existing", 10))
            .await
            .unwrap();

        let dev = device(&remote, "alice", true);
        dev.engine.bootstrap_if_empty().await.unwrap();
        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
        assert_eq!(remote.record_count("alice", EntityKind::Category), 0);
    }

    #[tokio::test]
    async fn test_remote_change_feed_applies_to_ledger() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);
        let mut feed = remote.subscribe("alice");

        remote.put("alice", &cash_method("pm-1", 30)).await.unwrap();
        let change = feed.try_recv().unwrap();
        dev.engine.apply_change(change).await;

        assert!(dev
            .ledger
            .get(EntityKind::PaymentMethod, "pm-1")
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_push_replay_is_idempotent() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);

        let record = cash_method("pm-1", 100);
        let intent = SyncIntent::Upsert {
            record: record.clone(),
        };
        dev.engine.handle_intent(intent.clone()).await;
        dev.engine.handle_intent(intent).await;

        assert_eq!(remote.record_count("alice", EntityKind::PaymentMethod), 1);
    }

    /// Remote store that parks one superseding intent while a push for
    /// the same entity is being delivered
    struct SupersedingStore {
        inner: MemoryRemoteStore,
        engine: StdMutex<Option<Arc<SyncEngine>>>,
        replacement: StdMutex<Option<SyncIntent>>,
    }

    #[async_trait::async_trait]
    impl RemoteStore for SupersedingStore {
        async fn fetch_all(
            &self,
            user_id: &str,
        ) -> Result<lifeledger_core::LedgerData, crate::error::SyncError> {
            self.inner.fetch_all(user_id).await
        }

        async fn put(
            &self,
            user_id: &str,
            record: &LedgerRecord,
        ) -> Result<(), crate::error::SyncError> {
            let replacement = self.replacement.lock().unwrap().take();
            if let Some(intent) = replacement {
                let engine = self.engine.lock().unwrap().clone();
                if let Some(engine) = engine {
                    engine.park(intent).await;
                }
            }
            self.inner.put(user_id, record).await
        }

        async fn delete(
            &self,
            user_id: &str,
            kind: EntityKind,
            id: &str,
        ) -> Result<(), crate::error::SyncError> {
            self.inner.delete(user_id, kind, id).await
        }

        fn subscribe(&self, user_id: &str) -> tokio::sync::broadcast::Receiver<RemoteChange> {
            self.inner.subscribe(user_id)
        }
    }

    #[tokio::test]
    async fn test_flush_keeps_intent_superseded_during_delivery() {
        let store = Arc::new(SupersedingStore {
            inner: MemoryRemoteStore::new(),
            engine: StdMutex::new(None),
            replacement: StdMutex::new(None),
        });
        let cache = Arc::new(MemoryCache::new());
        let ledger = Arc::new(Ledger::new(cache.clone()));
        let monitor = ConnectivityMonitor::new(true);
        let engine = Arc::new(SyncEngine::new(
            ledger,
            store.clone() as RemoteRef,
            cache,
            monitor.subscribe(),
            "alice".to_string(),
            fast_config(),
        ));
        *store.engine.lock().unwrap() = Some(engine.clone());

        let mut first = PaymentMethod::new("First", Decimal::from(1));
        first.id = "pm-1".to_string();
        let mut second = first.clone();
        second.name = "Second".to_string();

        engine
            .park(SyncIntent::Upsert {
                record: LedgerRecord::PaymentMethod(first),
            })
            .await;
        *store.replacement.lock().unwrap() = Some(SyncIntent::Upsert {
            record: LedgerRecord::PaymentMethod(second),
        });

        // while "First" is in flight, the store parks "Second" for the
        // same entity; the flush must still deliver it
        engine.flush_pending().await;

        assert_eq!(engine.pending_count().await, 0);
        let snapshot = store.inner.fetch_all("alice").await.unwrap();
        match snapshot.get(EntityKind::PaymentMethod, "pm-1") {
            Some(LedgerRecord::PaymentMethod(m)) => assert_eq!(m.name, "Second"),
            other => panic!("expected pm-1 in remote, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_only_drain_discards_intents() {
        let cache = Arc::new(MemoryCache::new());
        let ledger = Arc::new(Ledger::new(cache));
        let rx = ledger.intent_receiver().unwrap();
        let drain = tokio::spawn(run_local_only(rx));

        ledger.upsert(cash_method("pm-1", 10)).await.unwrap();
        drop(ledger);

        // the drain task ends when the ledger (and its sender) is dropped
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);

        assert_eq!(dev.engine.backoff_delay(1), Duration::from_millis(2));
        assert_eq!(dev.engine.backoff_delay(2), Duration::from_millis(4));
        // cap from fast_config
        assert_eq!(dev.engine.backoff_delay(10), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_engine_run_loop_end_to_end() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let dev = device(&remote, "alice", true);

        let intents = dev.intents.lock().unwrap().take().unwrap();
        let engine = dev.engine.clone();
        let task = tokio::spawn(engine.run(intents));

        // give startup bootstrap a moment, then mutate; the loop must
        // still be serving intents while the monitor is alive
        tokio::time::sleep(Duration::from_millis(20)).await;
        dev.ledger.upsert(cash_method("pm-x", 5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = remote.fetch_all("alice").await.unwrap();
        assert!(snapshot
            .get(EntityKind::PaymentMethod, "pm-x")
            .is_some());

        // dropping the monitor ends the connectivity subscription, which
        // stops the run loop
        drop(dev.monitor);
        task.await.unwrap();
    }
}
