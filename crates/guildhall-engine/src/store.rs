//! Remote store abstraction.
//!
//! The persistent store is an external collaborator: an opaque CRUD
//! provider plus a change feed, reached only through [`QuestStore`]. All
//! mutations are idempotent by id and return either the updated record or
//! a structured error.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use guildhall_core::change::ChangeEvent;
use guildhall_core::error::Result;
use guildhall_core::ids::{FamilyId, QuestId, TemplateId};
use guildhall_core::member::{Character, MemberProfile};
use guildhall_core::quest::QuestInstance;
use guildhall_core::template::QuestTemplate;

/// A server-pushed stream of change notifications for one family scope.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// The CRUD + change-feed surface the engine consumes.
#[async_trait]
pub trait QuestStore: Send + Sync {
    /// All quest instances for a family, used for full reloads.
    async fn fetch_quests(&self, family: &FamilyId) -> Result<Vec<QuestInstance>>;

    async fn fetch_templates(&self, family: &FamilyId) -> Result<Vec<QuestTemplate>>;

    async fn fetch_members(&self, family: &FamilyId) -> Result<Vec<MemberProfile>>;

    async fn fetch_characters(&self, family: &FamilyId) -> Result<Vec<Character>>;

    async fn insert_quest(&self, quest: &QuestInstance) -> Result<QuestInstance>;

    async fn update_quest(&self, quest: &QuestInstance) -> Result<QuestInstance>;

    async fn delete_quest(&self, id: &QuestId) -> Result<()>;

    /// Toggle a template's pause flag; the one template mutation this
    /// engine performs.
    async fn set_template_paused(&self, id: &TemplateId, paused: bool) -> Result<QuestTemplate>;

    /// Open the change feed for a family scope. Each call is a fresh
    /// subscription; nothing is replayed from before it was opened.
    async fn subscribe_changes(&self, family: &FamilyId) -> Result<ChangeStream>;
}
