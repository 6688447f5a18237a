//! Single-flight gate keyed by conversation id.
//!
//! At most one guard per conversation id is alive at a time; other callers for
//! the same id wait in FIFO order. Distinct ids never contend. Entries are
//! dropped from the map once their last holder or waiter goes away, so the map
//! only holds conversations with a turn in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type EntryMap = Arc<StdMutex<HashMap<String, Arc<GateEntry>>>>;

#[derive(Clone, Default)]
pub struct ConversationGate {
    inner: EntryMap,
}

#[derive(Default)]
struct GateEntry {
    lock: Arc<Mutex<()>>,
    permits: AtomicUsize,
}

/// Held for the duration of a turn. Dropping it releases the conversation.
pub struct ConversationGuard {
    _lock_guard: OwnedMutexGuard<()>,
    _permit: GatePermit,
}

struct GatePermit {
    conversation_id: String,
    inner: EntryMap,
    entry: Arc<GateEntry>,
}

impl ConversationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, conversation_id: &str) -> ConversationGuard {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = map
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(GateEntry::default()))
                .clone();
            entry.permits.fetch_add(1, Ordering::AcqRel);
            entry
        };

        // Built before waiting so a cancelled acquire still gives its permit back.
        let permit = GatePermit {
            conversation_id: conversation_id.to_string(),
            inner: Arc::clone(&self.inner),
            entry: Arc::clone(&entry),
        };
        let lock_guard = entry.lock.clone().lock_owned().await;

        ConversationGuard { _lock_guard: lock_guard, _permit: permit }
    }

    /// Conversations with a turn running or waiting.
    pub fn active_conversations(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.entry.permits.fetch_sub(1, Ordering::AcqRel);
        if previous != 1 {
            return;
        }

        let is_current =
            map.get(&self.conversation_id).is_some_and(|current| Arc::ptr_eq(current, &self.entry));
        if is_current {
            map.remove(&self.conversation_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::ConversationGate;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let gate = ConversationGate::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = gate.acquire("conv-1").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(gate.active_conversations(), 0);
    }

    #[tokio::test]
    async fn distinct_conversations_do_not_contend() {
        let gate = ConversationGate::new();

        let _first = gate.acquire("conv-a").await;
        let second = tokio::time::timeout(Duration::from_millis(200), gate.acquire("conv-b")).await;

        assert!(second.is_ok(), "other conversation must not wait");
        assert_eq!(gate.active_conversations(), 2);
    }

    #[tokio::test]
    async fn dropping_the_guard_releases_and_cleans_up() {
        let gate = ConversationGate::new();

        let guard = gate.acquire("conv-1").await;
        assert_eq!(gate.active_conversations(), 1);
        drop(guard);

        assert_eq!(gate.active_conversations(), 0);
        let reacquired = tokio::time::timeout(Duration::from_millis(200), gate.acquire("conv-1")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_an_entry() {
        let gate = ConversationGate::new();
        let guard = gate.acquire("conv-1").await;

        let waited = tokio::time::timeout(Duration::from_millis(20), gate.acquire("conv-1")).await;
        assert!(waited.is_err(), "second acquire must block while the first is held");

        drop(guard);
        assert_eq!(gate.active_conversations(), 0);
    }
}
