//! Family members, roles, and playable characters.

use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, FamilyId, MemberId};

/// Role of a family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The supervising role; sole authority to assign, approve, deny, or
    /// cancel quests.
    GuildMaster,
    /// A quest-performing family member.
    Hero,
}

/// A family member's profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: MemberId,
    pub family_id: FamilyId,
    pub display_name: String,
    pub role: Role,
}

/// A member's playable character. Economy balances live here; the quest
/// engine only reads them for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub member_id: MemberId,
    pub family_id: FamilyId,
    pub name: String,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub coins: u64,
}

/// The authenticated caller driving an action.
///
/// Produced by the (external) session layer; the engine never derives
/// authority from anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: MemberId,
    pub role: Role,
}

impl Actor {
    pub fn guild_master(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            role: Role::GuildMaster,
        }
    }

    pub fn hero(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Hero,
        }
    }

    pub fn is_gm(&self) -> bool {
        self.role == Role::GuildMaster
    }
}
