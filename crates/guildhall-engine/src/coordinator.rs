//! Role-validated quest mutations with reload-on-settle reconciliation.
//!
//! The realtime echo of a mutation may arrive before, during, or after
//! the mutation's own response, so the coordinator never splices a
//! mutation payload into the board. It validates locally, issues exactly
//! one remote call under a per-quest in-flight lock, and reconciles by
//! reloading the board once the call settles - on success and on failure
//! alike, since a failure may be stale.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use guildhall_core::error::{GuildError, Result};
use guildhall_core::ids::{MemberId, QuestId, TemplateId};
use guildhall_core::lifecycle::{self, QuestAction, Transition};
use guildhall_core::member::Actor;
use guildhall_core::quest::QuestInstance;
use guildhall_core::template::QuestTemplate;

use crate::board::QuestBoard;
use crate::retry::RetryPolicy;
use crate::store::QuestStore;

/// Executes quest actions for one actor against one family's board.
pub struct QuestCoordinator {
    store: Arc<dyn QuestStore>,
    board: Arc<QuestBoard>,
    actor: Actor,
    in_flight: DashMap<QuestId, ()>,
    retry: RetryPolicy,
}

impl QuestCoordinator {
    pub fn new(store: Arc<dyn QuestStore>, board: Arc<QuestBoard>, actor: Actor) -> Self {
        Self {
            store,
            board,
            actor,
            in_flight: DashMap::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Hero volunteers for an AVAILABLE family quest.
    pub async fn pickup(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Pickup).await
    }

    /// Guild Master assigns (or forcibly reassigns) a quest.
    pub async fn assign(&self, quest: &QuestId, to: MemberId) -> Result<()> {
        self.execute(quest, QuestAction::Assign { to }).await
    }

    pub async fn start(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Start).await
    }

    pub async fn complete(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Complete).await
    }

    pub async fn approve(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Approve).await
    }

    pub async fn deny(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Deny).await
    }

    pub async fn cancel(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Cancel).await
    }

    /// Hand a family quest back to the pool.
    pub async fn release(&self, quest: &QuestId) -> Result<()> {
        self.execute(quest, QuestAction::Release).await
    }

    /// Create a quest directly (a Guild Master action).
    pub async fn create_quest(&self, quest: QuestInstance) -> Result<QuestInstance> {
        if !self.actor.is_gm() {
            return Err(GuildError::PermissionDenied {
                action: "create".to_string(),
                reason: "only the Guild Master creates quests".to_string(),
            });
        }
        let created = self.store.insert_quest(&quest).await;
        self.reload_after_settle().await;
        created
    }

    /// Toggle a template's pause flag. A paused template stops
    /// materializing instances; nothing else about it changes.
    pub async fn set_template_paused(
        &self,
        template: &TemplateId,
        paused: bool,
    ) -> Result<QuestTemplate> {
        if !self.actor.is_gm() {
            return Err(GuildError::PermissionDenied {
                action: "pause template".to_string(),
                reason: "only the Guild Master manages templates".to_string(),
            });
        }
        self.store.set_template_paused(template, paused).await
    }

    async fn execute(&self, quest_id: &QuestId, action: QuestAction) -> Result<()> {
        let quest = self
            .board
            .get(quest_id)
            .ok_or_else(|| GuildError::QuestNotFound {
                id: quest_id.clone(),
            })?;

        // Validate before any network traffic.
        let transition = lifecycle::apply(&quest, action, &self.actor, Utc::now())?;

        let _lock = InFlightLock::acquire(&self.in_flight, quest_id)?;

        let outcome = match transition {
            Transition::Update(next) => self.store.update_quest(&next).await.map(drop),
            Transition::Remove => self.store.delete_quest(quest_id).await,
        };

        self.reload_after_settle().await;
        outcome
    }

    async fn reload_after_settle(&self) {
        if let Err(err) = self.board.reload(&*self.store, self.retry).await {
            warn!("reload after mutation settle failed: {err}");
        }
    }
}

/// Per-quest in-flight marker. Reentrant calls for the same id are
/// rejected, not queued; the marker clears when the guard drops, on every
/// exit path.
struct InFlightLock<'a> {
    map: &'a DashMap<QuestId, ()>,
    id: QuestId,
}

impl<'a> InFlightLock<'a> {
    fn acquire(map: &'a DashMap<QuestId, ()>, id: &QuestId) -> Result<Self> {
        use dashmap::mapref::entry::Entry;
        match map.entry(id.clone()) {
            Entry::Occupied(_) => Err(GuildError::ActionInProgress { quest: id.clone() }),
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(Self {
                    map,
                    id: id.clone(),
                })
            }
        }
    }
}

impl Drop for InFlightLock<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}
