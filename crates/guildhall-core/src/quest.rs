//! Quest instances - the units of assignable work.
//!
//! A quest is created by the Guild Master (or materialized from a template
//! by the external scheduler), moves through the lifecycle in
//! [`crate::lifecycle`], and pays out coins and experience once approved.
//!
//! Wire rows can be partial or carry unrecognized status values; decoding
//! is deliberately lenient so a single odd row never poisons a whole feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FamilyId, MemberId, QuestId, TemplateId};

/// Lifecycle status of a quest instance.
///
/// `Pending` and `Claimed` are both "assigned, not yet started": `Claimed`
/// marks a hero-initiated volunteer pickup (which carries the volunteer
/// bonus), `Pending` a supervisor-initiated assignment or a denied quest
/// returned to its hero. `Expired` and `Missed` are terminal and produced
/// by external time-based processes, never by user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestStatus {
    Available,
    Pending,
    Claimed,
    InProgress,
    Completed,
    Approved,
    Expired,
    Missed,
}

impl QuestStatus {
    /// All statuses, for exhaustive table-driven tests.
    pub const ALL: [QuestStatus; 8] = [
        QuestStatus::Available,
        QuestStatus::Pending,
        QuestStatus::Claimed,
        QuestStatus::InProgress,
        QuestStatus::Completed,
        QuestStatus::Approved,
        QuestStatus::Expired,
        QuestStatus::Missed,
    ];

    /// Whether this status is one of the settled, history-facing states.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            QuestStatus::Completed
                | QuestStatus::Approved
                | QuestStatus::Expired
                | QuestStatus::Missed
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            QuestStatus::Available => "Available",
            QuestStatus::Pending => "Pending",
            QuestStatus::Claimed => "Claimed",
            QuestStatus::InProgress => "In progress",
            QuestStatus::Completed => "Completed",
            QuestStatus::Approved => "Approved",
            QuestStatus::Expired => "Expired",
            QuestStatus::Missed => "Missed",
        }
    }
}

/// How demanding a quest is; drives reward presets in the UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Cadence category of a quest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestCategory {
    #[default]
    Daily,
    Weekly,
    BossBattle,
}

/// Whether a quest is claimable by any hero or bound to a fixed assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestType {
    /// Template-bound assignment to a fixed hero; cannot be abandoned.
    Individual,
    /// Volunteer-claimable by any eligible hero; at most one active per
    /// character.
    Family,
}

/// Lenient status decoding: null, missing, and unrecognized values all map
/// to `None` instead of failing the row.
pub(crate) mod lenient_status {
    use super::QuestStatus;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<QuestStatus>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub(crate) fn parse(raw: &str) -> Option<QuestStatus> {
        match raw {
            "AVAILABLE" => Some(QuestStatus::Available),
            "PENDING" => Some(QuestStatus::Pending),
            "CLAIMED" => Some(QuestStatus::Claimed),
            "IN_PROGRESS" => Some(QuestStatus::InProgress),
            "COMPLETED" => Some(QuestStatus::Completed),
            "APPROVED" => Some(QuestStatus::Approved),
            "EXPIRED" => Some(QuestStatus::Expired),
            "MISSED" => Some(QuestStatus::Missed),
            _ => None,
        }
    }
}

/// A single assignable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestInstance {
    pub id: QuestId,
    pub family_id: FamilyId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: QuestCategory,
    /// Experience paid out on approval.
    #[serde(default)]
    pub xp_reward: u32,
    /// Coins paid out on approval.
    #[serde(default)]
    pub coin_reward: u32,
    /// Fractional reward multiplier for a volunteer pickup. Cleared when
    /// the Guild Master assigns the quest instead.
    #[serde(default)]
    pub volunteer_bonus: Option<f32>,
    /// Flat bonus added while the assignee holds a streak.
    #[serde(default)]
    pub streak_bonus: Option<u32>,
    #[serde(default)]
    pub streak_count: u32,
    /// `None` means the row carried no canonical status (null, missing, or
    /// an unrecognized value). Such a quest is shown but not actionable.
    #[serde(default, deserialize_with = "lenient_status::deserialize")]
    pub status: Option<QuestStatus>,
    pub quest_type: QuestType,
    #[serde(default)]
    pub assigned_to: Option<MemberId>,
    pub created_by: MemberId,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuestInstance {
    /// Create a new AVAILABLE quest in the given family.
    pub fn new(
        family_id: FamilyId,
        title: impl Into<String>,
        created_by: MemberId,
        quest_type: QuestType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: QuestId::generate(),
            family_id,
            title: title.into(),
            description: String::new(),
            difficulty: Difficulty::default(),
            category: QuestCategory::default(),
            xp_reward: 0,
            coin_reward: 0,
            volunteer_bonus: None,
            streak_bonus: None,
            streak_count: 0,
            status: Some(QuestStatus::Available),
            quest_type,
            assigned_to: None,
            created_by,
            template_id: None,
            due_date: None,
            completed_at: None,
            approved_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_category(mut self, category: QuestCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_rewards(mut self, xp: u32, coins: u32) -> Self {
        self.xp_reward = xp;
        self.coin_reward = coins;
        self
    }

    pub fn with_volunteer_bonus(mut self, bonus: f32) -> Self {
        self.volunteer_bonus = Some(bonus);
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Status to render when the row carried none: shown as Pending, but
    /// no action is eligible until a canonical status is observed.
    pub fn display_status(&self) -> QuestStatus {
        self.status.unwrap_or(QuestStatus::Pending)
    }

    pub fn is_assigned_to(&self, member: &MemberId) -> bool {
        self.assigned_to.as_ref() == Some(member)
    }

    /// Timestamp used for history ordering: completion, else last update,
    /// else creation, else the caller's `now`.
    pub fn effective_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.completed_at
            .or(self.updated_at)
            .or(self.created_at)
            .unwrap_or(now)
    }

    /// Rewards this quest pays out, with the volunteer multiplier and the
    /// streak bonus applied.
    pub fn earned_rewards(&self) -> Earned {
        let multiplier = 1.0 + self.volunteer_bonus.unwrap_or(0.0).max(0.0);
        let streak = if self.streak_count > 0 {
            self.streak_bonus.unwrap_or(0)
        } else {
            0
        };
        Earned {
            xp: (self.xp_reward as f32 * multiplier).round() as u32 + streak,
            coins: (self.coin_reward as f32 * multiplier).round() as u32 + streak,
        }
    }
}

/// Reward totals after bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Earned {
    pub xp: u32,
    pub coins: u32,
}
