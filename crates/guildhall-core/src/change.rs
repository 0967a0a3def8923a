//! Change-feed records from the backing store.
//!
//! The store pushes row-level change notifications for each table a family
//! client cares about. Records are transient: constructed by the feed
//! adapter, consumed synchronously by listeners, and not retained beyond
//! dispatch (the bus keeps a single last-event slot for diagnostics).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Row-level action reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// Source tables the feed reports on, one per fan-out channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTable {
    QuestInstances,
    QuestTemplates,
    Characters,
    Rewards,
    RewardRedemptions,
    MemberProfiles,
}

impl SourceTable {
    pub const ALL: [SourceTable; 6] = [
        SourceTable::QuestInstances,
        SourceTable::QuestTemplates,
        SourceTable::Characters,
        SourceTable::Rewards,
        SourceTable::RewardRedemptions,
        SourceTable::MemberProfiles,
    ];

    /// The wire name of the table backing this channel.
    pub fn table_name(&self) -> &'static str {
        match self {
            SourceTable::QuestInstances => "quest_instances",
            SourceTable::QuestTemplates => "quest_templates",
            SourceTable::Characters => "characters",
            SourceTable::Rewards => "rewards",
            SourceTable::RewardRedemptions => "reward_redemptions",
            SourceTable::MemberProfiles => "member_profiles",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        SourceTable::ALL
            .into_iter()
            .find(|table| table.table_name() == name)
    }

    /// Tables that are not family-scoped at the transport level and need a
    /// secondary membership lookup before fan-out.
    pub fn needs_scope_lookup(&self) -> bool {
        matches!(self, SourceTable::Characters | SourceTable::MemberProfiles)
    }
}

/// A single change notification, as delivered by the feed adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub table: String,
    /// New row image. Some transports deliver an empty object on DELETE.
    #[serde(default)]
    pub record: Value,
    /// Previous row image; may be partial or absent.
    #[serde(default)]
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: SourceTable, record: Value) -> Self {
        Self {
            action: ChangeAction::Insert,
            table: table.table_name().to_string(),
            record,
            old_record: None,
        }
    }

    pub fn update(table: SourceTable, record: Value, old_record: Option<Value>) -> Self {
        Self {
            action: ChangeAction::Update,
            table: table.table_name().to_string(),
            record,
            old_record,
        }
    }

    pub fn delete(table: SourceTable, old_record: Value) -> Self {
        Self {
            action: ChangeAction::Delete,
            table: table.table_name().to_string(),
            record: Value::Object(Default::default()),
            old_record: Some(old_record),
        }
    }

    /// The channel this event belongs to, if its table is known.
    pub fn source_table(&self) -> Option<SourceTable> {
        SourceTable::from_table_name(&self.table)
    }

    /// Identity of the affected row, preferring the new image.
    pub fn record_id(&self) -> Option<&str> {
        self.record
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| self.old_record_id())
    }

    /// Identity carried by the previous row image. DELETE events with no
    /// old-record id must be dropped, never applied.
    pub fn old_record_id(&self) -> Option<&str> {
        self.old_record
            .as_ref()
            .and_then(|old| old.get("id"))
            .and_then(Value::as_str)
    }

    /// Member identity owning the affected row, for scope lookups.
    /// Character rows reference their member through `member_id`; profile
    /// rows are keyed by the member id itself. `None` for other tables or
    /// partial images.
    pub fn owning_member_id(&self) -> Option<&str> {
        let key = match self.source_table()? {
            SourceTable::Characters => "member_id",
            SourceTable::MemberProfiles => "id",
            _ => return None,
        };
        self.record
            .get(key)
            .and_then(Value::as_str)
            .or_else(|| {
                self.old_record
                    .as_ref()
                    .and_then(|old| old.get(key))
                    .and_then(Value::as_str)
            })
    }

    /// Decode the new row image into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.record.clone())?)
    }
}
