//! Owned per-family scope lifecycle.
//!
//! A session wires the readiness gate, the initial load, the change-feed
//! bus, and the reactive board for one family. It is constructed on scope
//! activation and torn down on family switch or auth loss; switching
//! families means tearing one session down and building a fresh one -
//! nothing is buffered or carried across.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use guildhall_core::change::{ChangeAction, ChangeEvent, SourceTable};
use guildhall_core::error::{GuildError, Result};
use guildhall_core::ids::{FamilyId, MemberId, QuestId};
use guildhall_core::member::{Actor, Character, MemberProfile};
use guildhall_core::views::{self, AssignmentOption};
use guildhall_realtime::{EventBus, ListenerHandle, ReadinessGate, ScopeLookup, TransportProfile};

use crate::board::QuestBoard;
use crate::coordinator::QuestCoordinator;
use crate::retry::{with_backoff, RetryPolicy};
use crate::store::QuestStore;

/// Membership lookup backed by the session's live member roster.
struct RosterLookup {
    members: Arc<RwLock<Vec<MemberProfile>>>,
}

#[async_trait]
impl ScopeLookup for RosterLookup {
    async fn member_in_family(&self, family: &FamilyId, member: &MemberId) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|m| &m.family_id == family && &m.id == member)
    }
}

/// One activated family scope: gate, board, bus, rosters, coordinator.
pub struct FamilySession {
    family_id: FamilyId,
    store: Arc<dyn QuestStore>,
    gate: Arc<ReadinessGate>,
    bus: Arc<EventBus>,
    board: Arc<QuestBoard>,
    coordinator: QuestCoordinator,
    members: Arc<RwLock<Vec<MemberProfile>>>,
    characters: Arc<RwLock<Vec<Character>>>,
    listeners: Mutex<Vec<ListenerHandle>>,
    retry: RetryPolicy,
    active: AtomicBool,
}

impl FamilySession {
    /// Build the session's object graph. Nothing touches the network
    /// until [`activate`](Self::activate).
    pub fn new(
        family_id: FamilyId,
        actor: Actor,
        store: Arc<dyn QuestStore>,
        profile: TransportProfile,
    ) -> Self {
        let members = Arc::new(RwLock::new(Vec::new()));
        let lookup = Arc::new(RosterLookup {
            members: Arc::clone(&members),
        });
        let board = Arc::new(QuestBoard::new(family_id.clone()));
        let coordinator =
            QuestCoordinator::new(Arc::clone(&store), Arc::clone(&board), actor);
        Self {
            family_id: family_id.clone(),
            store,
            gate: Arc::new(ReadinessGate::new(profile)),
            bus: EventBus::new(family_id, lookup),
            board,
            coordinator,
            members,
            characters: Arc::new(RwLock::new(Vec::new())),
            listeners: Mutex::new(Vec::new()),
            retry: RetryPolicy::default(),
            active: AtomicBool::new(false),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bring the scope online: wait for network readiness, load the
    /// initial snapshot and rosters, then attach the change feed.
    pub async fn activate(&self) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(GuildError::AlreadyActive);
        }

        self.gate.wait_ready().await;

        self.board.reload(&*self.store, self.retry).await?;
        let members =
            with_backoff(self.retry, || self.store.fetch_members(&self.family_id)).await?;
        *write(&self.members) = members;
        let characters =
            with_backoff(self.retry, || self.store.fetch_characters(&self.family_id)).await?;
        *write(&self.characters) = characters;

        let stream = self.store.subscribe_changes(&self.family_id).await?;
        self.bus.attach(stream);

        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        {
            let board = Arc::clone(&self.board);
            listeners.push(self.bus.subscribe(SourceTable::QuestInstances, move |event| {
                board.apply_change(event);
            }));
        }
        {
            let characters = Arc::clone(&self.characters);
            listeners.push(self.bus.subscribe(SourceTable::Characters, move |event| {
                apply_roster_change(&characters, event, |c: &Character| c.id.clone());
            }));
        }
        {
            let members = Arc::clone(&self.members);
            listeners.push(self.bus.subscribe(SourceTable::MemberProfiles, move |event| {
                apply_roster_change(&members, event, |m: &MemberProfile| m.id.clone());
            }));
        }

        debug!(family = %self.family_id, "family session activated");
        Ok(())
    }

    /// Tear the scope down. Safe to call twice; the second call is a
    /// no-op.
    pub fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        for listener in self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            listener.unsubscribe();
        }
        self.bus.shutdown();
        self.board.invalidate();
        debug!(family = %self.family_id, "family session torn down");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn family_id(&self) -> &FamilyId {
        &self.family_id
    }

    /// The readiness gate; the host signals load-complete through it.
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn board(&self) -> &Arc<QuestBoard> {
        &self.board
    }

    pub fn coordinator(&self) -> &QuestCoordinator {
        &self.coordinator
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn members(&self) -> Vec<MemberProfile> {
        read(&self.members).clone()
    }

    pub fn characters(&self) -> Vec<Character> {
        read(&self.characters).clone()
    }

    /// Assignment candidates for a quest on this board.
    pub fn assignment_options(&self, quest: &QuestId) -> Result<Vec<AssignmentOption>> {
        let target = self
            .board
            .get(quest)
            .ok_or_else(|| GuildError::QuestNotFound { id: quest.clone() })?;
        Ok(views::assignment_options(
            &target,
            &read(&self.characters),
            &read(&self.members),
            &self.board.snapshot(),
        ))
    }
}

impl Drop for FamilySession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Idempotent roster application: upsert on insert/update, remove on
/// delete, ignore rows that fail to decode.
fn apply_roster_change<T, K>(roster: &RwLock<Vec<T>>, event: &ChangeEvent, key_of: impl Fn(&T) -> K)
where
    T: serde::de::DeserializeOwned + Clone,
    K: PartialEq + for<'a> From<&'a str>,
{
    match event.action {
        ChangeAction::Insert | ChangeAction::Update => match event.decode::<T>() {
            Ok(row) => {
                let mut roster = roster.write().unwrap_or_else(PoisonError::into_inner);
                let key = key_of(&row);
                match roster.iter_mut().find(|existing| key_of(existing) == key) {
                    Some(existing) => *existing = row,
                    None => roster.push(row),
                }
            }
            Err(err) => warn!("ignoring undecodable roster row: {err}"),
        },
        ChangeAction::Delete => {
            if let Some(id) = event.old_record_id() {
                let key = K::from(id);
                roster
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|existing| key_of(existing) != key);
            }
        }
    }
}

fn read<T>(lock: &RwLock<Vec<T>>) -> std::sync::RwLockReadGuard<'_, Vec<T>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<Vec<T>>) -> std::sync::RwLockWriteGuard<'_, Vec<T>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
