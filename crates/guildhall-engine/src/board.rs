//! The quest board - the reactive snapshot consumers render from.
//!
//! The board owns a deduplicated quest collection for one family scope.
//! Change events are applied idempotently (an echo of something already
//! applied is harmless); full reloads replace the snapshot wholesale.
//! Observers register with [`QuestBoard::subscribe`] and are notified
//! synchronously after every state mutation - the explicit replacement
//! for effect-driven refetching.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};

use guildhall_core::change::{ChangeAction, ChangeEvent};
use guildhall_core::error::Result;
use guildhall_core::ids::{FamilyId, MemberId, QuestId};
use guildhall_core::quest::QuestInstance;
use guildhall_core::views;

use crate::retry::{with_backoff, RetryPolicy};
use crate::single_flight::{Admission, FetchGuard, Generation};
use crate::store::QuestStore;

/// Observer callback; invoked after every board mutation.
pub type BoardListener = Arc<dyn Fn() + Send + Sync>;

/// Handle for detaching a board observer. Detaching twice is a no-op.
pub struct BoardSubscription {
    listeners: Arc<Mutex<Vec<(u64, BoardListener)>>>,
    id: u64,
}

impl BoardSubscription {
    pub fn unsubscribe(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != self.id);
    }
}

/// Outcome of a reload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// This call fetched and applied a fresh snapshot.
    Reloaded,
    /// Another reload was already in flight; its result stands.
    Coalesced,
    /// The fetch finished under a stale generation; its result was
    /// discarded.
    Superseded,
}

/// The reactive quest collection for one family scope.
pub struct QuestBoard {
    family_id: FamilyId,
    quests: RwLock<Vec<QuestInstance>>,
    listeners: Arc<Mutex<Vec<(u64, BoardListener)>>>,
    next_listener_id: AtomicU64,
    guard: FetchGuard,
    generation: Generation,
}

impl QuestBoard {
    pub fn new(family_id: FamilyId) -> Self {
        Self {
            family_id,
            quests: RwLock::new(Vec::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
            guard: FetchGuard::default(),
            generation: Generation::default(),
        }
    }

    pub fn family_id(&self) -> &FamilyId {
        &self.family_id
    }

    /// Register an observer, notified after every board mutation.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> BoardSubscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        BoardSubscription {
            listeners: Arc::clone(&self.listeners),
            id,
        }
    }

    fn notify(&self) {
        let snapshot: Vec<BoardListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }

    // ------------------------------------------------------------
    // Snapshot access and derived views
    // ------------------------------------------------------------

    pub fn snapshot(&self) -> Vec<QuestInstance> {
        self.read().clone()
    }

    pub fn get(&self, id: &QuestId) -> Option<QuestInstance> {
        self.read().iter().find(|q| &q.id == id).cloned()
    }

    pub fn pending_approval(&self) -> Vec<QuestInstance> {
        cloned(views::pending_approval(&self.read()))
    }

    pub fn unassigned_active(&self) -> Vec<QuestInstance> {
        cloned(views::unassigned_active(&self.read()))
    }

    pub fn in_progress(&self) -> Vec<QuestInstance> {
        cloned(views::in_progress(&self.read()))
    }

    pub fn claimable_family(&self) -> Vec<QuestInstance> {
        cloned(views::claimable_family(&self.read()))
    }

    pub fn by_assignee(&self, member: &MemberId) -> Vec<QuestInstance> {
        cloned(views::by_assignee(&self.read(), member))
    }

    pub fn historical(&self) -> Vec<QuestInstance> {
        cloned(views::historical(&self.read(), Utc::now()))
    }

    // ------------------------------------------------------------
    // State mutation
    // ------------------------------------------------------------

    /// Replace the whole snapshot, deduplicating by id.
    pub fn replace_all(&self, quests: Vec<QuestInstance>) {
        *self.write() = views::dedup_by_id(quests);
        self.notify();
    }

    /// Apply one change event idempotently.
    ///
    /// Rows from other families and undecodable rows are ignored; removing
    /// an id that is already gone is a no-op. Observers are notified only
    /// when the snapshot actually changed.
    pub fn apply_change(&self, event: &ChangeEvent) {
        let changed = match event.action {
            ChangeAction::Insert | ChangeAction::Update => match event.decode::<QuestInstance>() {
                Ok(quest) if quest.family_id == self.family_id => self.upsert(quest),
                Ok(_) => false,
                Err(err) => {
                    warn!("ignoring undecodable quest row: {err}");
                    false
                }
            },
            ChangeAction::Delete => match event.old_record_id() {
                Some(id) => self.remove(&QuestId::from(id)),
                // The bus already drops these; stay harmless regardless.
                None => false,
            },
        };
        if changed {
            self.notify();
        }
    }

    fn upsert(&self, quest: QuestInstance) -> bool {
        let mut quests = self.write();
        match quests.iter_mut().find(|q| q.id == quest.id) {
            Some(existing) => {
                if *existing == quest {
                    return false;
                }
                *existing = quest;
            }
            None => quests.push(quest),
        }
        true
    }

    fn remove(&self, id: &QuestId) -> bool {
        let mut quests = self.write();
        let before = quests.len();
        quests.retain(|q| &q.id != id);
        quests.len() != before
    }

    // ------------------------------------------------------------
    // Reload
    // ------------------------------------------------------------

    /// Fetch a fresh snapshot from the store, single-flight.
    ///
    /// Concurrent callers coalesce onto the in-flight fetch. A result that
    /// lands after [`invalidate`](Self::invalidate) bumped the generation
    /// is discarded instead of overwriting newer state. If this future is
    /// dropped mid-fetch the guard stays held until the force-clear
    /// threshold reclaims it.
    pub async fn reload(&self, store: &dyn QuestStore, policy: RetryPolicy) -> Result<ReloadOutcome> {
        match self.guard.admit(Instant::now()) {
            Admission::Coalesced => return Ok(ReloadOutcome::Coalesced),
            Admission::Started => {}
        }

        let generation = self.generation.next();
        let result = with_backoff(policy, || store.fetch_quests(&self.family_id)).await;
        self.guard.finish();

        match result {
            Ok(quests) => {
                if !self.generation.is_current(generation) {
                    debug!("discarding superseded reload result");
                    return Ok(ReloadOutcome::Superseded);
                }
                self.replace_all(quests);
                Ok(ReloadOutcome::Reloaded)
            }
            Err(err) => Err(err),
        }
    }

    /// Invalidate any in-flight reload; its result will be discarded.
    /// Called at scope teardown.
    pub fn invalidate(&self) {
        self.generation.next();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<QuestInstance>> {
        self.quests.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<QuestInstance>> {
        self.quests.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cloned(quests: Vec<&QuestInstance>) -> Vec<QuestInstance> {
    quests.into_iter().cloned().collect()
}
