//! Backup export and import codec
//!
//! One versioned JSON document holds the entire ledger. Import is
//! destructive by contract, so the whole document is validated and
//! staged before the existing data is touched; a structurally invalid
//! document rejects the import with the current ledger intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ledger::LedgerData;
use crate::model::{DebtLoan, EntityKind, FinancialCategory, LedgerRecord, PaymentMethod, Transaction};

/// Current backup document version
pub const BACKUP_VERSION: &str = "1";

/// The on-disk backup document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub payment_methods: Vec<PaymentMethod>,
    pub categories: Vec<FinancialCategory>,
    pub transactions: Vec<Transaction>,
    pub debt_loans: Vec<DebtLoan>,
}

/// A record rejected during import
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    pub kind: EntityKind,
    pub index: usize,
    pub reason: String,
}

/// Validated data ready to replace the ledger
#[derive(Debug, Default)]
pub struct StagedImport {
    pub data: LedgerData,
    pub skipped: Vec<SkippedRecord>,
}

/// Outcome of a completed import
#[derive(Debug)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Serialize a snapshot into a backup document
///
/// Collections are sorted by id so the same ledger always exports the
/// same document.
pub fn export_backup(data: &LedgerData) -> BackupDocument {
    let mut payment_methods: Vec<PaymentMethod> = data.payment_methods.values().cloned().collect();
    let mut categories: Vec<FinancialCategory> = data.categories.values().cloned().collect();
    let mut transactions: Vec<Transaction> = data.transactions.values().cloned().collect();
    let mut debt_loans: Vec<DebtLoan> = data.debt_loans.values().cloned().collect();
    payment_methods.sort_by(|a, b| a.id.cmp(&b.id));
    categories.sort_by(|a, b| a.id.cmp(&b.id));
    transactions.sort_by(|a, b| a.id.cmp(&b.id));
    debt_loans.sort_by(|a, b| a.id.cmp(&b.id));

    BackupDocument {
        version: BACKUP_VERSION.to_string(),
        export_date: Utc::now(),
        payment_methods,
        categories,
        transactions,
        debt_loans,
    }
}

/// Validate a backup document and stage its contents
///
/// Structural problems (wrong shape, unsupported version, a missing
/// collection) fail the whole import. Individual records that do not
/// parse are skipped and reported rather than aborting, so one corrupt
/// row cannot hold the rest of a backup hostage. Balances of the staged
/// data are re-derived from scratch; whatever the document claimed for
/// `currentBalance` is ignored.
pub fn stage_import(document: &serde_json::Value) -> Result<StagedImport, CoreError> {
    let object = document.as_object().ok_or_else(|| CoreError::InvalidBackup {
        message: "backup must be a JSON object".to_string(),
    })?;

    // Older exporters wrote the version as a bare number.
    let version = match object.get("version") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => {
            return Err(CoreError::InvalidBackup {
                message: "missing 'version' field".to_string(),
            })
        }
    };
    if version != BACKUP_VERSION {
        return Err(CoreError::InvalidBackup {
            message: format!("unsupported backup version {}", version),
        });
    }

    let mut staged = StagedImport::default();

    for kind in EntityKind::ALL {
        let field = kind.collection_name();
        let items = object
            .get(field)
            .ok_or_else(|| CoreError::InvalidBackup {
                message: format!("missing '{}' collection", field),
            })?
            .as_array()
            .ok_or_else(|| CoreError::InvalidBackup {
                message: format!("'{}' must be an array", field),
            })?;

        for (index, item) in items.iter().enumerate() {
            match LedgerRecord::from_entity_value(kind, item.clone()) {
                Ok(record) => {
                    staged.data.insert(record);
                }
                Err(e) => staged.skipped.push(SkippedRecord {
                    kind,
                    index,
                    reason: e.to_string(),
                }),
            }
        }
    }

    staged.data.recompute_all();
    Ok(staged)
}
