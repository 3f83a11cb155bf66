//! Offline-first synchronization
//!
//! Connectivity monitoring, the remote store port with an in-memory
//! reference implementation, and the sync engine that keeps the local
//! ledger and the remote store converged: intents are pushed with capped
//! backoff while online, parked durably while offline, and a full
//! merge-based reconcile runs on every reconnect.

pub mod connectivity;
pub mod engine;
pub mod error;
pub mod memory;
pub mod remote;

pub use connectivity::ConnectivityMonitor;
pub use engine::{run_local_only, SyncEngine};
pub use error::SyncError;
pub use memory::MemoryRemoteStore;
pub use remote::{RemoteChange, RemoteRef, RemoteStore};
