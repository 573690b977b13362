//! Request id issuance and the pending-call table.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::message::RequestId;
use crate::error::CallError;

pub type CallResult = Result<Value, CallError>;

struct Table {
    last_id: u64,
    accepting: bool,
    entries: HashMap<u64, oneshot::Sender<CallResult>>,
}

/// Outstanding calls awaiting a response.
///
/// Insert, resolve and [`fail_all`](Self::fail_all) all run under one mutex,
/// so a response can never race the disconnect sweep and every registered id
/// is resolved exactly once. The id counter survives [`open`](Self::open).
pub struct PendingCalls {
    table: Mutex<Table>,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    /// A closed table; call [`open`](Self::open) once a connection attempt
    /// starts.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                last_id: 0,
                accepting: false,
                entries: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next id: strictly greater than every id issued before.
    pub fn next_id(&self) -> u64 {
        let mut table = self.lock();
        table.last_id += 1;
        table.last_id
    }

    /// Accept registrations again.
    pub fn open(&self) {
        self.lock().accepting = true;
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn register(&self, id: u64) -> Result<oneshot::Receiver<CallResult>, CallError> {
        let mut table = self.lock();
        if !table.accepting {
            return Err(CallError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        table.entries.insert(id, tx);
        Ok(rx)
    }

    /// Complete the call registered under `id`. Returns `false` when no such
    /// call is pending (unknown, already resolved, or swept).
    pub fn resolve(&self, id: &RequestId, result: CallResult) -> bool {
        let Some(numeric) = id.as_u64() else {
            debug!(%id, "Response id is not one of ours");
            return false;
        };
        let sender = self.lock().entries.remove(&numeric);
        match sender {
            Some(sender) => {
                // The caller may have stopped waiting.
                let _ = sender.send(result);
                true
            }
            None => {
                debug!(id = numeric, "No pending call for response");
                false
            }
        }
    }

    /// Fail one call, e.g. when its request could not be written.
    pub fn fail(&self, id: u64, error: CallError) -> bool {
        self.resolve(&RequestId::from(id), Err(error))
    }

    /// Fail every pending call with [`CallError::Disconnected`] and refuse
    /// new registrations until [`open`](Self::open). Returns how many calls
    /// were failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut table = self.lock();
            table.accepting = false;
            table.entries.drain().collect()
        };
        let count = drained.len();
        for (_, sender) in drained {
            let _ = sender.send(Err(CallError::Disconnected));
        }
        if count > 0 {
            debug!(count, "Failed pending calls on disconnect");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_ids_increase_from_one() {
        let pending = PendingCalls::new();
        assert_eq!(pending.next_id(), 1);
        assert_eq!(pending.next_id(), 2);
        pending.open();
        pending.fail_all();
        pending.open();
        assert_eq!(pending.next_id(), 3);
    }

    #[test]
    fn test_concurrent_ids_are_distinct() {
        let pending = Arc::new(PendingCalls::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pending = pending.clone();
                std::thread::spawn(move || (0..100).map(|_| pending.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = Vec::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
    }

    #[test]
    fn test_register_requires_open_table() {
        let pending = PendingCalls::new();
        assert!(matches!(pending.register(1), Err(CallError::Disconnected)));
        pending.open();
        assert!(pending.register(1).is_ok());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_once() {
        let pending = PendingCalls::new();
        pending.open();
        let rx = pending.register(5).unwrap();
        assert!(pending.resolve(&RequestId::Text("5".into()), Ok(json!({"ok": true}))));
        assert!(!pending.resolve(&RequestId::Number(5), Ok(Value::Null)));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_with_rpc_error() {
        let pending = PendingCalls::new();
        pending.open();
        let rx = pending.register(1).unwrap();
        pending.resolve(
            &RequestId::Number(1),
            Err(CallError::Rpc(RpcError::new(-32000, "nope"))),
        );
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.rpc().map(|e| e.code), Some(-32000));
    }

    #[tokio::test]
    async fn test_fail_all_fails_every_call() {
        let pending = PendingCalls::new();
        pending.open();
        let receivers: Vec<_> = (0..5)
            .map(|_| pending.register(pending.next_id()).unwrap())
            .collect();
        assert_eq!(pending.fail_all(), 5);
        assert!(pending.is_empty());
        assert!(!pending.is_accepting());
        for rx in receivers {
            assert!(matches!(rx.await.unwrap(), Err(CallError::Disconnected)));
        }
        assert!(matches!(pending.register(99), Err(CallError::Disconnected)));
    }

    #[test]
    fn test_resolve_after_receiver_dropped() {
        let pending = PendingCalls::new();
        pending.open();
        drop(pending.register(1).unwrap());
        assert!(pending.resolve(&RequestId::Number(1), Ok(Value::Null)));
    }
}
