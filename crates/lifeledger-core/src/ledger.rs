//! The ledger store
//!
//! In-memory authoritative snapshot of one user's payment methods,
//! transactions, debt/loans, and categories, with write-through to the
//! device-local cache and an intent queue drained by the sync layer.
//!
//! Every mutating operation applies synchronously and optimistically to
//! the snapshot, re-derives the affected balances, writes through to the
//! cache, then enqueues a sync intent. A cache write failure is returned
//! as a warning on the outcome; the in-memory mutation stands so the
//! user's edit survives for the rest of the session. Mutations are
//! serialized through one async operation lock.

use lifeledger_cache::{CacheError, CacheRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex as StdMutex, RwLock};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::backup::{self, BackupDocument, ImportReport};
use crate::balance;
use crate::error::CoreError;
use crate::model::{
    records_to_document, DebtLoan, EntityKind, FinancialCategory, LedgerRecord, PaymentMethod,
    SyncIntent, Transaction,
};

/// Cache key holding pending sync intents across restarts
pub const PENDING_INTENTS_KEY: &str = "pendingIntents";

// ==================== Snapshot ====================

/// In-memory ledger data, keyed by entity id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerData {
    pub payment_methods: HashMap<String, PaymentMethod>,
    pub categories: HashMap<String, FinancialCategory>,
    pub transactions: HashMap<String, Transaction>,
    pub debt_loans: HashMap<String, DebtLoan>,
}

impl LedgerData {
    /// Insert or replace a record, returning the previous one
    pub fn insert(&mut self, record: LedgerRecord) -> Option<LedgerRecord> {
        match record {
            LedgerRecord::PaymentMethod(m) => self
                .payment_methods
                .insert(m.id.clone(), m)
                .map(LedgerRecord::PaymentMethod),
            LedgerRecord::Category(c) => self
                .categories
                .insert(c.id.clone(), c)
                .map(LedgerRecord::Category),
            LedgerRecord::Transaction(t) => self
                .transactions
                .insert(t.id.clone(), t)
                .map(LedgerRecord::Transaction),
            LedgerRecord::DebtLoan(d) => self
                .debt_loans
                .insert(d.id.clone(), d)
                .map(LedgerRecord::DebtLoan),
        }
    }

    /// Remove a record by kind and id, returning it if present
    pub fn remove(&mut self, kind: EntityKind, id: &str) -> Option<LedgerRecord> {
        match kind {
            EntityKind::PaymentMethod => self
                .payment_methods
                .remove(id)
                .map(LedgerRecord::PaymentMethod),
            EntityKind::Category => self.categories.remove(id).map(LedgerRecord::Category),
            EntityKind::Transaction => self.transactions.remove(id).map(LedgerRecord::Transaction),
            EntityKind::DebtLoan => self.debt_loans.remove(id).map(LedgerRecord::DebtLoan),
        }
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<LedgerRecord> {
        match kind {
            EntityKind::PaymentMethod => self
                .payment_methods
                .get(id)
                .cloned()
                .map(LedgerRecord::PaymentMethod),
            EntityKind::Category => self.categories.get(id).cloned().map(LedgerRecord::Category),
            EntityKind::Transaction => self
                .transactions
                .get(id)
                .cloned()
                .map(LedgerRecord::Transaction),
            EntityKind::DebtLoan => self.debt_loans.get(id).cloned().map(LedgerRecord::DebtLoan),
        }
    }

    /// All records of one kind, sorted by id for deterministic output
    pub fn records(&self, kind: EntityKind) -> Vec<LedgerRecord> {
        let mut records: Vec<LedgerRecord> = match kind {
            EntityKind::PaymentMethod => self
                .payment_methods
                .values()
                .cloned()
                .map(LedgerRecord::PaymentMethod)
                .collect(),
            EntityKind::Category => self
                .categories
                .values()
                .cloned()
                .map(LedgerRecord::Category)
                .collect(),
            EntityKind::Transaction => self
                .transactions
                .values()
                .cloned()
                .map(LedgerRecord::Transaction)
                .collect(),
            EntityKind::DebtLoan => self
                .debt_loans
                .values()
                .cloned()
                .map(LedgerRecord::DebtLoan)
                .collect(),
        };
        records.sort_by(|a, b| a.id().cmp(b.id()));
        records
    }

    pub fn ids(&self, kind: EntityKind) -> Vec<String> {
        match kind {
            EntityKind::PaymentMethod => self.payment_methods.keys().cloned().collect(),
            EntityKind::Category => self.categories.keys().cloned().collect(),
            EntityKind::Transaction => self.transactions.keys().cloned().collect(),
            EntityKind::DebtLoan => self.debt_loans.keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.payment_methods.len()
            + self.categories.len()
            + self.transactions.len()
            + self.debt_loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-derive one payment method's running balance from scratch
    pub fn recompute_method(&mut self, method_id: &str) {
        let recomputed = match self.payment_methods.get(method_id) {
            Some(method) => balance::method_balance(method, self.transactions.values()),
            None => return,
        };
        if let Some(method) = self.payment_methods.get_mut(method_id) {
            method.current_balance = recomputed;
        }
    }

    /// Repair path: reset every balance and replay all transactions
    ///
    /// Convergent regardless of replay order, so always safe to re-run.
    pub fn recompute_all(&mut self) {
        let ids: Vec<String> = self.payment_methods.keys().cloned().collect();
        for id in ids {
            self.recompute_method(&id);
        }
    }

    /// Aggregate total per the global invariant
    pub fn total_balance(&self) -> Decimal {
        balance::total_balance(self.payment_methods.values(), self.debt_loans.values())
    }
}

// ==================== Events ====================

/// Typed ledger notifications for downstream consumers
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// An entity was created or updated
    Mutated { kind: EntityKind, id: String },
    /// An entity was removed
    Deleted { kind: EntityKind, id: String },
    /// A merge outcome replaced the snapshot
    MergeApplied { total: usize },
    /// Unsynced local mutations exist (or no longer exist)
    PendingChanged(bool),
    /// Balance drift was detected and repaired
    Repaired { drifted: usize },
    /// A backup import replaced the snapshot
    Imported { imported: usize, skipped: usize },
}

/// Outcome of one mutating operation
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    /// Whether the snapshot actually changed
    pub changed: bool,
    /// Non-fatal persistence warning (e.g. cache quota exceeded)
    pub warning: Option<String>,
}

/// Ledger summary
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub payment_methods: usize,
    pub categories: usize,
    pub transactions: usize,
    pub debt_loans: usize,
    pub total_balance: Decimal,
}

/// One detected balance drift
#[derive(Debug, Clone)]
pub struct BalanceDrift {
    pub method_id: String,
    pub stored: Decimal,
    pub recomputed: Decimal,
}

/// Result of a verify-and-repair pass
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub drifted: Vec<BalanceDrift>,
}

// ==================== Ledger Store ====================

/// The ledger service for one user session
///
/// Constructed once per session and passed by handle to all consumers;
/// there is no ambient global state.
pub struct Ledger {
    cache: CacheRef,
    data: RwLock<LedgerData>,
    /// Serializes mutations so an optimistic local write and an in-flight
    /// remote apply can never interleave on the same entity
    op_lock: Mutex<()>,
    intent_tx: mpsc::UnboundedSender<SyncIntent>,
    intent_rx: StdMutex<Option<mpsc::UnboundedReceiver<SyncIntent>>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl Ledger {
    /// Create an empty ledger backed by the given cache
    pub fn new(cache: CacheRef) -> Self {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        Self {
            cache,
            data: RwLock::new(LedgerData::default()),
            op_lock: Mutex::new(()),
            intent_tx,
            intent_rx: StdMutex::new(Some(intent_rx)),
            events,
        }
    }

    /// Take the sync intent receiver; yields `None` after the first call
    pub fn intent_receiver(&self) -> Option<mpsc::UnboundedReceiver<SyncIntent>> {
        self.intent_rx.lock().unwrap().take()
    }

    /// Subscribe to ledger events
    pub fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Emit an event; lagging or absent receivers are not an error
    pub fn emit_event(&self, event: LedgerEvent) {
        let _ = self.events.send(event);
    }

    // ==================== Startup ====================

    /// Populate the snapshot from the local cache
    ///
    /// Missing keys yield empty collections. Corrupt content is logged
    /// and treated as empty rather than failing the store; individual
    /// malformed records are skipped with a warning.
    pub async fn load_from_cache(&self) -> Result<(), CoreError> {
        let _guard = self.op_lock.lock().await;
        let mut data = LedgerData::default();

        for kind in EntityKind::ALL {
            let key = kind.collection_name();
            let value = match self.cache.load(key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) if e.is_corrupt() => {
                    log::error!("Corrupt cache for '{}', treating as empty: {}", key, e);
                    continue;
                }
                Err(e) => {
                    return Err(CoreError::CacheError {
                        message: e.to_string(),
                    })
                }
            };

            let items = match value {
                serde_json::Value::Array(items) => items,
                other => {
                    log::error!(
                        "Cache key '{}' holds {} instead of an array, treating as empty",
                        key,
                        json_type_name(&other)
                    );
                    continue;
                }
            };

            for item in items {
                match LedgerRecord::from_entity_value(kind, item) {
                    Ok(record) => {
                        data.insert(record);
                    }
                    Err(e) => log::warn!("Skipping malformed cached {} record: {}", kind, e),
                }
            }
        }

        data.recompute_all();
        *self.data.write().unwrap() = data;
        Ok(())
    }

    // ==================== Reads ====================

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<LedgerRecord> {
        self.data.read().unwrap().get(kind, id)
    }

    pub fn list(&self, kind: EntityKind) -> Vec<LedgerRecord> {
        self.data.read().unwrap().records(kind)
    }

    /// Filtered listing over one collection
    pub fn query<F>(&self, kind: EntityKind, predicate: F) -> Vec<LedgerRecord>
    where
        F: Fn(&LedgerRecord) -> bool,
    {
        self.data
            .read()
            .unwrap()
            .records(kind)
            .into_iter()
            .filter(|r| predicate(r))
            .collect()
    }

    /// Clone of the full snapshot
    pub fn snapshot(&self) -> LedgerData {
        self.data.read().unwrap().clone()
    }

    pub fn total_balance(&self) -> Decimal {
        self.data.read().unwrap().total_balance()
    }

    pub fn summary(&self) -> LedgerSummary {
        let data = self.data.read().unwrap();
        LedgerSummary {
            payment_methods: data.payment_methods.len(),
            categories: data.categories.len(),
            transactions: data.transactions.len(),
            debt_loans: data.debt_loans.len(),
            total_balance: data.total_balance(),
        }
    }

    /// Resolve a category name, degrading dangling references
    pub fn category_name_or_unknown(&self, category_id: &str) -> String {
        self.data
            .read()
            .unwrap()
            .categories
            .get(category_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Resolve a payment method name, degrading dangling references
    pub fn method_name_or_unknown(&self, method_id: &str) -> String {
        self.data
            .read()
            .unwrap()
            .payment_methods
            .get(method_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    // ==================== Mutations ====================

    /// Create or update an entity
    ///
    /// The record is stamped with a fresh last-modified timestamp,
    /// affected balances are re-derived, the collection is written
    /// through to the cache, and an upsert intent is enqueued.
    pub async fn upsert(&self, mut record: LedgerRecord) -> Result<MutationOutcome, CoreError> {
        let _guard = self.op_lock.lock().await;
        record.touch();

        let affected_kinds = {
            let mut data = self.data.write().unwrap();
            validate_record(&data, &record)?;

            let kind = record.kind();
            let old = data.insert(record.clone());

            let mut kinds = vec![kind];
            match (&record, &old) {
                (LedgerRecord::Transaction(tx), old) => {
                    if let Some(LedgerRecord::Transaction(old_tx)) = old {
                        if old_tx.payment_method_id != tx.payment_method_id {
                            data.recompute_method(&old_tx.payment_method_id);
                        }
                    }
                    data.recompute_method(&tx.payment_method_id);
                    kinds.push(EntityKind::PaymentMethod);
                }
                (LedgerRecord::PaymentMethod(m), _) => {
                    data.recompute_method(&m.id);
                }
                _ => {}
            }
            kinds
        };

        let warning = self.write_through(&affected_kinds).await;
        self.enqueue(SyncIntent::Upsert {
            record: record.clone(),
        });
        self.emit_event(LedgerEvent::Mutated {
            kind: record.kind(),
            id: record.id().to_string(),
        });

        Ok(MutationOutcome {
            changed: true,
            warning,
        })
    }

    /// Delete an entity by id; deleting a missing entity is a no-op
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<MutationOutcome, CoreError> {
        let _guard = self.op_lock.lock().await;

        let removed = {
            let mut data = self.data.write().unwrap();
            let removed = data.remove(kind, id);
            if let Some(LedgerRecord::Transaction(tx)) = &removed {
                data.recompute_method(&tx.payment_method_id);
            }
            removed
        };

        if removed.is_none() {
            return Ok(MutationOutcome::default());
        }

        let affected = match kind {
            EntityKind::Transaction => vec![kind, EntityKind::PaymentMethod],
            _ => vec![kind],
        };
        let warning = self.write_through(&affected).await;
        self.enqueue(SyncIntent::Delete {
            kind,
            id: id.to_string(),
        });
        self.emit_event(LedgerEvent::Deleted {
            kind,
            id: id.to_string(),
        });

        Ok(MutationOutcome {
            changed: true,
            warning,
        })
    }

    // ==================== Remote Applies ====================

    /// Apply a change received from the remote change feed
    ///
    /// Remote records are authoritative: no validation, no new intent,
    /// no timestamp stamping. Applying the echo of our own push is
    /// harmless because the record content is identical.
    pub async fn apply_remote_upsert(&self, record: LedgerRecord) -> Result<(), CoreError> {
        let _guard = self.op_lock.lock().await;
        let kinds = {
            let mut data = self.data.write().unwrap();
            let kind = record.kind();
            data.insert(record.clone());
            let mut kinds = vec![kind];
            if let LedgerRecord::Transaction(tx) = &record {
                data.recompute_method(&tx.payment_method_id);
                kinds.push(EntityKind::PaymentMethod);
            } else if let LedgerRecord::PaymentMethod(m) = &record {
                data.recompute_method(&m.id);
            }
            kinds
        };
        if let Some(warning) = self.write_through(&kinds).await {
            log::warn!("Cache write after remote apply failed: {}", warning);
        }
        self.emit_event(LedgerEvent::Mutated {
            kind: record.kind(),
            id: record.id().to_string(),
        });
        Ok(())
    }

    /// Apply a remote deletion; idempotent
    pub async fn apply_remote_delete(&self, kind: EntityKind, id: &str) -> Result<(), CoreError> {
        let _guard = self.op_lock.lock().await;
        let removed = {
            let mut data = self.data.write().unwrap();
            let removed = data.remove(kind, id);
            if let Some(LedgerRecord::Transaction(tx)) = &removed {
                data.recompute_method(&tx.payment_method_id);
            }
            removed
        };
        if removed.is_some() {
            let affected = match kind {
                EntityKind::Transaction => vec![kind, EntityKind::PaymentMethod],
                _ => vec![kind],
            };
            if let Some(warning) = self.write_through(&affected).await {
                log::warn!("Cache write after remote delete failed: {}", warning);
            }
            self.emit_event(LedgerEvent::Deleted {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the snapshot with a merge outcome and write it back
    pub async fn adopt_merged(&self, mut data: LedgerData) -> Result<(), CoreError> {
        let _guard = self.op_lock.lock().await;
        data.recompute_all();
        let total = data.len();
        *self.data.write().unwrap() = data;
        if let Some(warning) = self.write_through(&EntityKind::ALL).await {
            log::warn!("Cache write after merge failed: {}", warning);
        }
        self.emit_event(LedgerEvent::MergeApplied { total });
        Ok(())
    }

    // ==================== Repair ====================

    /// Compare incremental balances against a from-scratch recomputation
    /// and repair any drift
    pub async fn verify_and_repair(&self) -> RepairReport {
        let _guard = self.op_lock.lock().await;
        let mut report = RepairReport::default();

        {
            let mut data = self.data.write().unwrap();
            let drifted: Vec<BalanceDrift> = data
                .payment_methods
                .values()
                .filter_map(|method| {
                    let recomputed = balance::method_balance(method, data.transactions.values());
                    if recomputed != method.current_balance {
                        Some(BalanceDrift {
                            method_id: method.id.clone(),
                            stored: method.current_balance,
                            recomputed,
                        })
                    } else {
                        None
                    }
                })
                .collect();

            for drift in &drifted {
                log::warn!(
                    "Balance drift on method {}: stored {} != recomputed {}, repairing",
                    drift.method_id,
                    drift.stored,
                    drift.recomputed
                );
            }
            if !drifted.is_empty() {
                data.recompute_all();
            }
            report.drifted = drifted;
        }

        if !report.drifted.is_empty() {
            if let Some(warning) = self.write_through(&[EntityKind::PaymentMethod]).await {
                log::warn!("Cache write after repair failed: {}", warning);
            }
            self.emit_event(LedgerEvent::Repaired {
                drifted: report.drifted.len(),
            });
        }
        report
    }

    // ==================== Backup ====================

    /// Export the full ledger as one versioned backup document
    pub fn export_backup(&self) -> BackupDocument {
        backup::export_backup(&self.data.read().unwrap())
    }

    /// Destructive import: validate fully, then swap the staged set in
    ///
    /// Validation failures reject the whole import before anything is
    /// deleted; individually unparsable records are skipped and reported.
    pub async fn import_backup(
        &self,
        document: &serde_json::Value,
    ) -> Result<ImportReport, CoreError> {
        let staged = backup::stage_import(document)?;

        let _guard = self.op_lock.lock().await;
        let old_ids: Vec<(EntityKind, String)> = {
            let data = self.data.read().unwrap();
            EntityKind::ALL
                .into_iter()
                .flat_map(|kind| data.ids(kind).into_iter().map(move |id| (kind, id)))
                .collect()
        };

        let imported = staged.data.len();
        *self.data.write().unwrap() = staged.data;

        if let Some(warning) = self.write_through(&EntityKind::ALL).await {
            log::warn!("Cache write after import failed: {}", warning);
        }

        // Converge the remote store on the imported set: deletions first
        // for records that no longer exist, then upserts for the new set.
        {
            let data = self.data.read().unwrap();
            for (kind, id) in old_ids {
                if data.get(kind, &id).is_none() {
                    self.enqueue(SyncIntent::Delete { kind, id });
                }
            }
            for kind in EntityKind::ALL {
                for record in data.records(kind) {
                    self.enqueue(SyncIntent::Upsert { record });
                }
            }
        }

        self.emit_event(LedgerEvent::Imported {
            imported,
            skipped: staged.skipped.len(),
        });

        Ok(ImportReport {
            imported,
            skipped: staged.skipped,
        })
    }

    // ==================== Internals ====================

    async fn write_through(&self, kinds: &[EntityKind]) -> Option<String> {
        let mut warning: Option<String> = None;
        for kind in kinds {
            let document = {
                let data = self.data.read().unwrap();
                records_to_document(&data.records(*kind))
            };
            if let Err(e) = self.cache.save(kind.collection_name(), &document).await {
                report_cache_warning(&e, kind, &mut warning);
            }
        }
        warning
    }

    fn enqueue(&self, intent: SyncIntent) {
        // A closed receiver means no sync engine is attached; intents are
        // then only as durable as the cache write-through, which is the
        // local-only contract anyway.
        let _ = self.intent_tx.send(intent);
    }
}

fn report_cache_warning(e: &CacheError, kind: &EntityKind, warning: &mut Option<String>) {
    let message = format!("cache write for '{}' failed: {}", kind, e);
    log::warn!("{}", message);
    if warning.is_none() {
        *warning = Some(message);
    }
}

fn validate_record(data: &LedgerData, record: &LedgerRecord) -> Result<(), CoreError> {
    match record {
        LedgerRecord::Transaction(tx) => {
            if tx.amount <= Decimal::ZERO {
                return Err(CoreError::ValidationError {
                    message: "transaction amount must be positive".to_string(),
                });
            }
            if tx.payment_method_id.is_empty() {
                return Err(CoreError::ValidationError {
                    message: "transaction requires a payment method reference".to_string(),
                });
            }
            // The category may dangle; only an existing category of the
            // wrong flow kind is a hard error.
            if let Some(category) = data.categories.get(&tx.category_id) {
                if category.kind != tx.kind {
                    return Err(CoreError::ValidationError {
                        message: format!(
                            "category '{}' is {} but transaction is {}",
                            category.name, category.kind, tx.kind
                        ),
                    });
                }
            }
        }
        LedgerRecord::DebtLoan(dl) => {
            if dl.amount <= Decimal::ZERO {
                return Err(CoreError::ValidationError {
                    message: "debt/loan amount must be positive".to_string(),
                });
            }
        }
        LedgerRecord::PaymentMethod(m) => {
            if let Some(existing) = data.payment_methods.get(&m.id) {
                if existing.initial_balance != m.initial_balance {
                    return Err(CoreError::ValidationError {
                        message: "initial balance is set once at creation".to_string(),
                    });
                }
            }
        }
        LedgerRecord::Category(_) => {}
    }
    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
