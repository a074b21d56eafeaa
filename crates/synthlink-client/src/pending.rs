//! Table of in-flight requests awaiting a reply.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::trace;

use synthlink_protocol::RequestId;

use crate::error::{ClientError, ClientResult};

/// Sending half handed to the table for one request.
pub(crate) type Completion = oneshot::Sender<ClientResult<Value>>;

/// Receiving half kept by the caller.
pub(crate) type CompletionRx = oneshot::Receiver<ClientResult<Value>>;

/// Maps each outstanding correlation id to its single-shot completion.
///
/// Every exit path (reply, timeout, abandonment, connection loss) removes
/// the entry, so an id resolves at most once.
#[derive(Debug)]
pub(crate) struct PendingTable {
    entries: HashMap<RequestId, Completion>,
    limit: usize,
}

impl PendingTable {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            limit,
        }
    }

    /// Registers a completion for `id`.
    ///
    /// Fails with [`ClientError::TooManyPending`] once `limit` entries are
    /// outstanding.
    pub(crate) fn insert(&mut self, id: RequestId) -> ClientResult<CompletionRx> {
        if self.entries.len() >= self.limit {
            return Err(ClientError::TooManyPending { limit: self.limit });
        }
        debug_assert!(!self.entries.contains_key(&id), "id {id} reused");

        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        Ok(rx)
    }

    /// Completes `id` with a reply payload.
    ///
    /// Returns false if nothing was pending under `id`.
    pub(crate) fn resolve(&mut self, id: RequestId, payload: Value) -> bool {
        match self.entries.remove(&id) {
            Some(tx) => {
                if tx.send(Ok(payload)).is_err() {
                    trace!(id, "caller went away before the reply arrived");
                }
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `id` without completing it.
    pub(crate) fn remove(&mut self, id: RequestId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Fails every entry and empties the table. Returns how many failed.
    pub(crate) fn fail_all(&mut self, error: impl Fn() -> ClientError) -> usize {
        let count = self.entries.len();
        for (_, tx) in self.entries.drain() {
            let _ = tx.send(Err(error()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Outstanding ids in ascending order.
    pub(crate) fn ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_delivers_payload_once() {
        let mut table = PendingTable::new(8);
        let mut rx = table.insert(0).unwrap();

        assert!(table.resolve(0, json!("pong")));
        assert!(!table.contains(0));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!("pong"));

        // Duplicate reply finds no entry.
        assert!(!table.resolve(0, json!("again")));
    }

    #[test]
    fn resolve_unknown_id_changes_nothing() {
        let mut table = PendingTable::new(8);
        let mut rx = table.insert(1).unwrap();

        assert!(!table.resolve(42, json!(null)));
        assert_eq!(table.ids(), vec![1]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn capacity_limit() {
        let mut table = PendingTable::new(2);
        let _a = table.insert(0).unwrap();
        let _b = table.insert(1).unwrap();

        let err = table.insert(2).unwrap_err();
        assert!(matches!(err, ClientError::TooManyPending { limit: 2 }));

        assert!(table.remove(0));
        assert!(table.insert(2).is_ok());
    }

    #[test]
    fn fail_all_empties_table() {
        let mut table = PendingTable::new(8);
        let mut receivers: Vec<_> = (0..3).map(|id| table.insert(id).unwrap()).collect();

        let failed = table.fail_all(|| ClientError::connection_lost("reset"));
        assert_eq!(failed, 3);
        assert_eq!(table.len(), 0);

        for rx in &mut receivers {
            let err = rx.try_recv().unwrap().unwrap_err();
            assert!(err.is_connection_lost());
        }
    }

    #[test]
    fn resolve_after_caller_dropped_still_clears_entry() {
        let mut table = PendingTable::new(8);
        drop(table.insert(5).unwrap());

        assert!(table.resolve(5, json!(1)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn ids_are_sorted() {
        let mut table = PendingTable::new(8);
        let _rx: Vec<_> = [9, 2, 5].iter().map(|&id| table.insert(id).unwrap()).collect();
        assert_eq!(table.ids(), vec![2, 5, 9]);
    }
}
