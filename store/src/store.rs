//! The canonical in-memory snapshot and its change-notification bus.
//!
//! Every change goes through [`Store::mutate`] or [`Store::replace`]: the new
//! snapshot is swapped in whole, persisted once, and subscribers are notified
//! once. A failed write is logged and does not roll back memory, so memory and
//! the durable medium can diverge until the next successful write.

use crate::clock::Clock;
use crate::model::{
    normalize_default_profile, Attempt, QuestionBankItem, ScoringProfile, Snapshot, Test,
};
use crate::persistence::{PersistenceAdapter, PersistenceError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Handle returned by [`Store::subscribe`].
pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&Snapshot) + Send + Sync>;

pub struct Store {
    adapter: PersistenceAdapter,
    state: RwLock<Arc<Snapshot>>,
    /// Serialises writers so two mutations never start from the same base.
    write_gate: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl Store {
    /// Load the snapshot through the adapter and wrap it.
    pub fn open(adapter: PersistenceAdapter) -> Self {
        let snapshot = adapter.load();
        tracing::info!(
            tests = snapshot.tests.len(),
            attempts = snapshot.attempts.len(),
            question_bank = snapshot.question_bank.len(),
            scoring_profiles = snapshot.scoring_profiles.len(),
            "Store opened"
        );
        Self {
            adapter,
            state: RwLock::new(Arc::new(snapshot)),
            write_gate: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn adapter(&self) -> &PersistenceAdapter {
        &self.adapter
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.adapter.clock()
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn tests(&self) -> Vec<Test> {
        self.snapshot().tests.iter().map(|t| (**t).clone()).collect()
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.snapshot().attempts.clone()
    }

    pub fn question_bank(&self) -> Vec<QuestionBankItem> {
        self.snapshot().question_bank.clone()
    }

    pub fn scoring_profiles(&self) -> Vec<ScoringProfile> {
        self.snapshot().scoring_profiles.clone()
    }

    /// Apply `f` to a draft of the current snapshot.
    ///
    /// When `f` returns `Some`, the draft becomes current, is persisted and
    /// subscribers are notified, each exactly once. When it returns `None`
    /// the draft is dropped and nothing is written or notified.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Snapshot) -> Option<R>) -> Option<R> {
        let gate = self.write_gate.lock().unwrap_or_else(|e| e.into_inner());

        let mut draft = (*self.snapshot()).clone();
        let result = f(&mut draft)?;
        let next = Arc::new(draft);
        self.swap_and_persist(next.clone());

        drop(gate);
        self.notify(&next);
        Some(result)
    }

    /// Replace the whole snapshot (restore, import), persist and notify.
    pub fn replace(&self, mut snapshot: Snapshot) {
        let gate = self.write_gate.lock().unwrap_or_else(|e| e.into_inner());

        normalize_default_profile(&mut snapshot.scoring_profiles, &self.clock().now_iso());
        let next = Arc::new(snapshot);
        self.swap_and_persist(next.clone());

        drop(gate);
        self.notify(&next);
    }

    /// Write the current snapshot again without changing it.
    pub fn persist(&self) -> Result<(), PersistenceError> {
        let _gate = self.write_gate.lock().unwrap_or_else(|e| e.into_inner());
        self.adapter.save(&self.snapshot())
    }

    fn swap_and_persist(&self, next: Arc<Snapshot>) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = next.clone();
        if let Err(e) = self.adapter.save(&next) {
            tracing::error!("Failed to persist snapshot, memory and storage now differ: {}", e);
        }
    }

    /// Register a callback run synchronously after every committed change.
    pub fn subscribe(&self, callback: impl Fn(&Snapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns false when the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn notify(&self, snapshot: &Snapshot) {
        // Callbacks run outside the lock so they may (un)subscribe.
        let callbacks: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }
}
