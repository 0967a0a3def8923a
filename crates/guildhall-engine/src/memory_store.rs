//! In-memory store for tests and demos.
//!
//! Behaves like the real backing store from the engine's perspective:
//! CRUD by id, fetch by family scope, and a change feed that echoes every
//! mutation to all subscribers. Quest and template feed rows are filtered
//! by family server-side; character and member-profile rows are not,
//! mirroring the transports where those tables cannot be scoped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;

use guildhall_core::change::{ChangeEvent, SourceTable};
use guildhall_core::error::{GuildError, Result};
use guildhall_core::ids::{CharacterId, FamilyId, MemberId, QuestId, TemplateId};
use guildhall_core::member::{Character, MemberProfile};
use guildhall_core::quest::QuestInstance;
use guildhall_core::template::QuestTemplate;

use crate::store::{ChangeStream, QuestStore};

/// In-memory [`QuestStore`] with failure and latency injection.
pub struct MemoryStore {
    quests: RwLock<HashMap<QuestId, QuestInstance>>,
    templates: RwLock<HashMap<TemplateId, QuestTemplate>>,
    members: RwLock<HashMap<MemberId, MemberProfile>>,
    characters: RwLock<HashMap<CharacterId, Character>>,
    feed: broadcast::Sender<ChangeEvent>,
    fail_fetches: AtomicUsize,
    latency: RwLock<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(256);
        Self {
            quests: RwLock::new(HashMap::new()),
            templates: RwLock::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
            characters: RwLock::new(HashMap::new()),
            feed,
            fail_fetches: AtomicUsize::new(0),
            latency: RwLock::new(Duration::ZERO),
        }
    }

    /// Make the next `count` quest fetches fail with a transient error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.fail_fetches.store(count, Ordering::SeqCst);
    }

    /// Artificial per-operation latency, for in-flight overlap tests.
    pub fn set_latency(&self, latency: Duration) {
        *write(&self.latency) = latency;
    }

    // Fixture seeding; no feed echo, these represent pre-existing rows.

    pub fn seed_quest(&self, quest: QuestInstance) {
        write(&self.quests).insert(quest.id.clone(), quest);
    }

    pub fn seed_template(&self, template: QuestTemplate) {
        write(&self.templates).insert(template.id.clone(), template);
    }

    pub fn seed_member(&self, member: MemberProfile) {
        write(&self.members).insert(member.id.clone(), member);
    }

    pub fn seed_character(&self, character: Character) {
        write(&self.characters).insert(character.id.clone(), character);
    }

    /// Push a raw event into the feed, as a misbehaving transport would.
    pub fn emit_raw(&self, event: ChangeEvent) {
        let _ = self.feed.send(event);
    }

    async fn simulate_latency(&self) {
        let latency = *read(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn emit(&self, event: ChangeEvent) {
        let _ = self.feed.send(event);
    }

    fn row(value: &impl serde::Serialize) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }
}

#[async_trait]
impl QuestStore for MemoryStore {
    async fn fetch_quests(&self, family: &FamilyId) -> Result<Vec<QuestInstance>> {
        self.simulate_latency().await;
        if self
            .fail_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GuildError::transient("injected fetch failure"));
        }
        Ok(read(&self.quests)
            .values()
            .filter(|q| &q.family_id == family)
            .cloned()
            .collect())
    }

    async fn fetch_templates(&self, family: &FamilyId) -> Result<Vec<QuestTemplate>> {
        self.simulate_latency().await;
        Ok(read(&self.templates)
            .values()
            .filter(|t| &t.family_id == family)
            .cloned()
            .collect())
    }

    async fn fetch_members(&self, family: &FamilyId) -> Result<Vec<MemberProfile>> {
        self.simulate_latency().await;
        Ok(read(&self.members)
            .values()
            .filter(|m| &m.family_id == family)
            .cloned()
            .collect())
    }

    async fn fetch_characters(&self, family: &FamilyId) -> Result<Vec<Character>> {
        self.simulate_latency().await;
        Ok(read(&self.characters)
            .values()
            .filter(|c| &c.family_id == family)
            .cloned()
            .collect())
    }

    async fn insert_quest(&self, quest: &QuestInstance) -> Result<QuestInstance> {
        self.simulate_latency().await;
        write(&self.quests).insert(quest.id.clone(), quest.clone());
        self.emit(ChangeEvent::insert(
            SourceTable::QuestInstances,
            Self::row(quest)?,
        ));
        Ok(quest.clone())
    }

    async fn update_quest(&self, quest: &QuestInstance) -> Result<QuestInstance> {
        self.simulate_latency().await;
        let old = {
            let mut quests = write(&self.quests);
            let old = quests
                .get(&quest.id)
                .cloned()
                .ok_or_else(|| GuildError::QuestNotFound {
                    id: quest.id.clone(),
                })?;
            quests.insert(quest.id.clone(), quest.clone());
            old
        };
        self.emit(ChangeEvent::update(
            SourceTable::QuestInstances,
            Self::row(quest)?,
            Some(Self::row(&old)?),
        ));
        Ok(quest.clone())
    }

    async fn delete_quest(&self, id: &QuestId) -> Result<()> {
        self.simulate_latency().await;
        let old = write(&self.quests).remove(id);
        // Deleting an already-deleted id is a no-op, not an error.
        if let Some(old) = old {
            self.emit(ChangeEvent::delete(
                SourceTable::QuestInstances,
                Self::row(&old)?,
            ));
        }
        Ok(())
    }

    async fn set_template_paused(&self, id: &TemplateId, paused: bool) -> Result<QuestTemplate> {
        self.simulate_latency().await;
        let updated = {
            let mut templates = write(&self.templates);
            let template = templates
                .get_mut(id)
                .ok_or_else(|| GuildError::TemplateNotFound { id: id.clone() })?;
            template.paused = paused;
            template.clone()
        };
        self.emit(ChangeEvent::update(
            SourceTable::QuestTemplates,
            Self::row(&updated)?,
            None,
        ));
        Ok(updated)
    }

    async fn subscribe_changes(&self, family: &FamilyId) -> Result<ChangeStream> {
        let family = family.clone();
        let stream = guildhall_realtime::broadcast_to_stream(self.feed.subscribe()).filter(
            move |event: &ChangeEvent| {
                futures::future::ready(server_side_scope_allows(event, &family))
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Server-side family filtering, where the table supports it. Character
/// and member-profile rows pass through unfiltered; the bus applies its
/// secondary membership lookup to those.
fn server_side_scope_allows(event: &ChangeEvent, family: &FamilyId) -> bool {
    match event.source_table() {
        Some(table) if table.needs_scope_lookup() => true,
        _ => {
            let family_of = |image: &Value| {
                image
                    .get("family_id")
                    .and_then(Value::as_str)
                    .map(|f| f == family.as_str())
            };
            family_of(&event.record)
                .or_else(|| event.old_record.as_ref().and_then(family_of))
                .unwrap_or(false)
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_core::member::Actor;
    use guildhall_core::quest::QuestType;

    fn family() -> FamilyId {
        FamilyId::from("fam-1")
    }

    fn quest(title: &str) -> QuestInstance {
        QuestInstance::new(family(), title, Actor::guild_master("gm-1").id, QuestType::Family)
    }

    #[tokio::test]
    async fn test_crud_round_trip_echoes_changes() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_changes(&family()).await.unwrap();

        let created = store.insert_quest(&quest("Walk the dog")).await.unwrap();
        let mut updated = created.clone();
        updated.title = "Walk the dragon".to_string();
        store.update_quest(&updated).await.unwrap();
        store.delete_quest(&created.id).await.unwrap();
        // Idempotent delete: no error, no echo.
        store.delete_quest(&created.id).await.unwrap();

        let first = feed.next().await.unwrap();
        assert_eq!(first.action, guildhall_core::ChangeAction::Insert);
        let second = feed.next().await.unwrap();
        assert_eq!(second.record["title"], "Walk the dragon");
        let third = feed.next().await.unwrap();
        assert_eq!(third.action, guildhall_core::ChangeAction::Delete);
        assert_eq!(third.old_record_id(), Some(created.id.as_str()));
    }

    #[tokio::test]
    async fn test_feed_is_family_filtered_for_quests() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_changes(&family()).await.unwrap();

        let mut foreign = quest("Other family");
        foreign.family_id = FamilyId::from("fam-2");
        store.insert_quest(&foreign).await.unwrap();
        store.insert_quest(&quest("Ours")).await.unwrap();

        let event = feed.next().await.unwrap();
        assert_eq!(event.record["title"], "Ours");
    }

    #[tokio::test]
    async fn test_injected_fetch_failures_are_transient() {
        let store = MemoryStore::new();
        store.seed_quest(quest("Persist"));
        store.fail_next_fetches(1);

        let err = store.fetch_quests(&family()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.fetch_quests(&family()).await.unwrap().len(), 1);
    }
}
