//! Transaction manager.

use super::gate::{GatePermit, TransactionGate};
use crate::error::CoreResult;
use crate::store::DocumentStore;
use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Coordinates write layers across every component store.
///
/// ## Top-level vs nested
///
/// A top-level transaction waits for the [`TransactionGate`], so top-level
/// calls never overlap. A nested transaction (a call made from inside a
/// running function) skips the gate and just pushes a write layer; nested
/// calls issued concurrently from one action interleave without isolation.
///
/// Every begin, commit and rollback applies to all stores, keeping their
/// layer depth in step even when a call touched only one component.
#[derive(Debug)]
pub struct TransactionManager {
    gate: Arc<TransactionGate>,
    next_txid: AtomicU64,
    open: Arc<AtomicUsize>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// Creates a new transaction manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gate: Arc::new(TransactionGate::new()),
            next_txid: AtomicU64::new(1),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Opens a write layer on every store, waiting for the gate unless nested.
    pub async fn begin(&self, stores: Vec<Arc<DocumentStore>>, nested: bool) -> TransactionScope {
        let permit = if nested {
            None
        } else {
            Some(self.gate.acquire().await)
        };
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        for store in &stores {
            store.begin();
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        debug!(txn = %id, nested, "transaction started");

        TransactionScope {
            id,
            stores,
            finished: false,
            open: Arc::clone(&self.open),
            permit,
        }
    }

    /// Returns true while any transaction is open or queued on the gate.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.open.load(Ordering::SeqCst) > 0 || self.gate.is_held()
    }

    /// Number of open transactions, nested ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// An open transaction.
///
/// Dropping a scope without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls it back. The gate permit, if any, is
/// released after the layers are closed.
#[derive(Debug)]
pub struct TransactionScope {
    id: TransactionId,
    stores: Vec<Arc<DocumentStore>>,
    finished: bool,
    open: Arc<AtomicUsize>,
    permit: Option<GatePermit>,
}

impl TransactionScope {
    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns true for top-level transactions.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.permit.is_some()
    }

    /// Merges the innermost layer of every store upward.
    pub fn commit(mut self) -> CoreResult<()> {
        self.finished = true;
        let result = close_all(&self.stores, DocumentStore::commit);
        debug!(txn = %self.id, "transaction committed");
        result
    }

    /// Discards the innermost layer of every store.
    pub fn rollback(mut self) -> CoreResult<()> {
        self.finished = true;
        let result = close_all(&self.stores, DocumentStore::rollback);
        debug!(txn = %self.id, "transaction rolled back");
        result
    }
}

/// Applies `close` to every store, reporting the first failure.
fn close_all(
    stores: &[Arc<DocumentStore>],
    close: impl Fn(&DocumentStore) -> CoreResult<()>,
) -> CoreResult<()> {
    let mut result = Ok(());
    for store in stores {
        if let Err(e) = close(store) {
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.finished {
            let _ = close_all(&self.stores, DocumentStore::rollback);
            debug!(txn = %self.id, "abandoned transaction rolled back");
        }
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
