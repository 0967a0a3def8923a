//! Recurring quest templates.
//!
//! Templates are owned by the family and expanded into quest instances by
//! an external scheduler on their recurrence cadence. From this engine's
//! perspective they are read-only except for pause/resume toggling - a
//! boolean flag mutation with no further state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FamilyId, MemberId, TemplateId};
use crate::quest::{Difficulty, QuestCategory, QuestType};

/// A recurring generator configuration for quest instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestTemplate {
    pub id: TemplateId,
    pub family_id: FamilyId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: QuestCategory,
    #[serde(default)]
    pub xp_reward: u32,
    #[serde(default)]
    pub coin_reward: u32,
    pub quest_type: QuestType,
    /// Recurrence pattern in the scheduler's syntax; opaque to this engine.
    pub recurrence: String,
    /// Fixed assignee for INDIVIDUAL templates.
    #[serde(default)]
    pub assigned_to: Option<MemberId>,
    /// A paused template stops materializing new instances.
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
