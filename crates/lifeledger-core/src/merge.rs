//! Merge and conflict resolution
//!
//! Reconciles a local snapshot against the remote one after a period
//! offline. Resolution is per record: records only one side knows about
//! are kept, and when both sides hold the same id the later last-modified
//! timestamp wins. A record with no timestamp on either side falls back
//! to the remote copy, which keeps two devices that both lack timestamps
//! from ping-ponging writes at each other.
//!
//! The merge is deterministic and idempotent; running it twice against
//! the same remote snapshot converges to the same ledger and pushes
//! nothing new.

use std::collections::HashMap;

use crate::ledger::LedgerData;
use crate::model::{EntityKind, LedgerRecord};

/// Result of merging the two snapshots
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// The converged ledger, balances already re-derived
    pub data: LedgerData,
    /// Records the remote store is missing or holds stale copies of,
    /// sorted by id for deterministic push order
    pub push_to_remote: Vec<LedgerRecord>,
}

/// Merge a local snapshot with the remote one
pub fn merge_snapshots(local: &LedgerData, remote: &LedgerData) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for kind in EntityKind::ALL {
        merge_kind(
            local.records(kind),
            remote.records(kind),
            &mut outcome.data,
            &mut outcome.push_to_remote,
        );
    }

    outcome.data.recompute_all();
    outcome
        .push_to_remote
        .sort_by(|a, b| {
            (a.kind().collection_name(), a.id()).cmp(&(b.kind().collection_name(), b.id()))
        });
    outcome
}

fn merge_kind(
    local: Vec<LedgerRecord>,
    remote: Vec<LedgerRecord>,
    converged: &mut LedgerData,
    push_to_remote: &mut Vec<LedgerRecord>,
) {
    let mut remote_by_id: HashMap<String, LedgerRecord> = remote
        .into_iter()
        .map(|r| (r.id().to_string(), r))
        .collect();

    for local_record in local {
        match remote_by_id.remove(local_record.id()) {
            None => {
                // Created offline on this device; the remote never saw it.
                push_to_remote.push(local_record.clone());
                converged.insert(local_record);
            }
            Some(remote_record) => {
                let winner = resolve_conflict(local_record, remote_record);
                if let Winner::Local(record) = &winner {
                    push_to_remote.push(record.clone());
                }
                converged.insert(winner.into_record());
            }
        }
    }

    // Remote-only records: another device created them, keep them.
    for (_, remote_record) in remote_by_id {
        converged.insert(remote_record);
    }
}

enum Winner {
    Local(LedgerRecord),
    Remote(LedgerRecord),
}

impl Winner {
    fn into_record(self) -> LedgerRecord {
        match self {
            Winner::Local(r) | Winner::Remote(r) => r,
        }
    }
}

fn resolve_conflict(local: LedgerRecord, remote: LedgerRecord) -> Winner {
    match (local.updated_at(), remote.updated_at()) {
        (Some(l), Some(r)) if l > r => Winner::Local(local),
        (Some(_), None) => Winner::Local(local),
        // Equal timestamps, a newer remote, or no timestamps at all:
        // the remote copy stands.
        _ => Winner::Remote(remote),
    }
}
