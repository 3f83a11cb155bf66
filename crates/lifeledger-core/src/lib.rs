//! Core ledger engine
//!
//! The authoritative in-memory ledger for one user session: entity
//! types, the balance recalculation engine, the mutation pipeline with
//! cache write-through and sync intents, the merge resolver, and the
//! backup codec. Everything remote-facing lives in `lifeledger-sync`;
//! this crate only produces intents and consumes merge outcomes.

pub mod backup;
pub mod balance;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod model;

pub use backup::{BackupDocument, ImportReport, SkippedRecord, BACKUP_VERSION};
pub use error::{CoreError, ErrorCode, ErrorSeverity};
pub use ledger::{
    BalanceDrift, Ledger, LedgerData, LedgerEvent, LedgerSummary, MutationOutcome, RepairReport,
    PENDING_INTENTS_KEY,
};
pub use merge::{merge_snapshots, MergeOutcome};
pub use model::{
    new_entity_id, DebtLoan, EntityKind, FinancialCategory, FlowKind, LedgerRecord, PaymentMethod,
    SyncIntent, Transaction,
};
