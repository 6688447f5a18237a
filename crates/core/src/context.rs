//! Process-local conversation state.
//!
//! One [`ConversationState`] per conversation id, held in memory only. Records
//! idle for longer than the configured TTL are logically dead: they are never
//! returned, and they are physically dropped by the sweep that runs on every
//! [`ContextStore::get_or_create`]. The sweep walks an index ordered by
//! `updated_at`, so it costs time proportional to the number of expired
//! records rather than the number of live ones.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::domain::conversation::{ConversationId, ConversationState, ConversationUpdate};
use crate::domain::slot::SlotMap;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to drive TTL behaviour in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextSettings {
    pub ttl: Duration,
    pub max_history_turns: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self { ttl: Duration::seconds(30 * 60), max_history_turns: 20 }
    }
}

pub struct ContextStore {
    settings: ContextSettings,
    clock: Arc<dyn Clock>,
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<ConversationId, ConversationState>,
    expiry: BTreeSet<(DateTime<Utc>, ConversationId)>,
}

impl StoreInner {
    fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        let live = self.expiry.split_off(&(cutoff, ConversationId(String::new())));
        let expired = std::mem::replace(&mut self.expiry, live);
        for (_, id) in &expired {
            self.records.remove(id);
        }
        expired.len()
    }

    fn get_or_insert(&mut self, id: &ConversationId, now: DateTime<Utc>) -> &mut ConversationState {
        if !self.records.contains_key(id) {
            self.expiry.insert((now, id.clone()));
        }
        self.records
            .entry(id.clone())
            .or_insert_with(|| ConversationState::new(id.clone(), now))
    }

    fn touch(&mut self, id: &ConversationId, previous: DateTime<Utc>, now: DateTime<Utc>) {
        self.expiry.remove(&(previous, id.clone()));
        self.expiry.insert((now, id.clone()));
    }
}

impl ContextStore {
    pub fn new(settings: ContextSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: ContextSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock, inner: RwLock::new(StoreInner::default()) }
    }

    /// Oldest `updated_at` still considered live at `now`.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.settings.ttl).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Return the live record for `id`, creating an empty one if there is none.
    ///
    /// Expired records are swept before the lookup, so an expired conversation
    /// comes back as a fresh record rather than its stale state.
    pub async fn get_or_create(&self, id: &ConversationId) -> ConversationState {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        inner.sweep(self.cutoff(now));
        inner.get_or_insert(id, now).clone()
    }

    /// Apply `update` to the record for `id` (creating it if needed) and return
    /// the post-update state. `updated_at` is refreshed even for an empty update.
    pub async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
    ) -> ConversationState {
        let now = self.clock.now();
        let max_history = self.settings.max_history_turns;
        let mut inner = self.inner.write().await;
        inner.sweep(self.cutoff(now));

        let state = inner.get_or_insert(id, now);
        let previous = state.updated_at;

        if let Some(intent) = update.intent {
            state.intent = intent;
        }
        if let Some(slots) = update.slots {
            state.slots.extend(slots);
        }
        if !update.new_messages.is_empty() {
            state.history.extend(update.new_messages);
            let overflow = state.history.len().saturating_sub(max_history);
            state.history.drain(..overflow);
        }
        state.updated_at = now;

        let snapshot = state.clone();
        inner.touch(id, previous, now);
        snapshot
    }

    /// Deterministic digest of the conversation's intent and slots.
    pub async fn summary(&self, id: &ConversationId) -> String {
        let state = self.get_or_create(id).await;
        render_summary(&state.intent, &state.slots)
    }

    /// Live record for `id` without creating or sweeping anything.
    pub async fn peek(&self, id: &ConversationId) -> Option<ConversationState> {
        let cutoff = self.cutoff(self.clock.now());
        let inner = self.inner.read().await;
        inner.records.get(id).filter(|state| state.updated_at >= cutoff).cloned()
    }

    /// Number of records currently held, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Render `intent` and `slots` as `Intent=<intent>, Slots={k=v, ...}`.
pub fn render_summary(intent: &str, slots: &SlotMap) -> String {
    let rendered = slots
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Intent={intent}, Slots={{{rendered}}}")
}
