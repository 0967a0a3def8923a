//! # Guildhall Core
//!
//! Domain model and pure rules for the Guildhall family quest board: the
//! quest lifecycle state machine and the derived-view filter engine.
//!
//! Everything here is synchronous and side-effect free. The realtime
//! fan-out lives in `guildhall-realtime`; store access, reconciliation,
//! and the reactive board live in `guildhall-engine`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use guildhall_core::prelude::*;
//!
//! let gm = Actor::guild_master("gm-1");
//! let hero = Actor::hero("hero-a");
//!
//! let quest = QuestInstance::new(
//!     FamilyId::from("fam-1"),
//!     "Slay the laundry pile",
//!     gm.id.clone(),
//!     QuestType::Family,
//! )
//! .with_rewards(100, 25)
//! .with_volunteer_bonus(0.5);
//!
//! // What may the hero do right now?
//! let eligibility = Eligibility::for_actor(&quest, &hero);
//! assert!(eligibility.can_pickup);
//!
//! // Apply the pickup, producing the record to persist.
//! let Transition::Update(claimed) =
//!     lifecycle::apply(&quest, QuestAction::Pickup, &hero, chrono::Utc::now())?
//! else { unreachable!() };
//! assert_eq!(claimed.status, Some(QuestStatus::Claimed));
//! # Ok::<(), guildhall_core::error::GuildError>(())
//! ```
//!
//! ## Core Concepts
//!
//! ### QuestInstance
//!
//! One assignable unit of work, decoded leniently from store rows: a null
//! or unrecognized status becomes `None`, which is shown but grants no
//! actions until a canonical status arrives.
//!
//! ### Lifecycle
//!
//! The single place permission and transition legality are decided. The
//! view layer renders the [`lifecycle::Eligibility`] set it is handed and
//! never checks roles itself.
//!
//! ### Views
//!
//! Order-preserving partitions of a flat quest collection (pending
//! approval, unassigned, in progress, claimable, historical) plus
//! assignment-option derivation.

pub mod change;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod member;
pub mod quest;
pub mod template;
pub mod views;

pub use change::{ChangeAction, ChangeEvent, SourceTable};
pub use error::{GuildError, Result};
pub use ids::{CharacterId, FamilyId, MemberId, QuestId, RedemptionId, RewardId, TemplateId};
pub use lifecycle::{Eligibility, QuestAction, Transition};
pub use member::{Actor, Character, MemberProfile, Role};
pub use quest::{Difficulty, Earned, QuestCategory, QuestInstance, QuestStatus, QuestType};
pub use template::QuestTemplate;

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::change::{ChangeAction, ChangeEvent, SourceTable};
    pub use crate::error::{GuildError, Result};
    pub use crate::ids::{CharacterId, FamilyId, MemberId, QuestId, TemplateId};
    pub use crate::lifecycle::{self, Eligibility, QuestAction, Transition};
    pub use crate::member::{Actor, Character, MemberProfile, Role};
    pub use crate::quest::{Difficulty, QuestCategory, QuestInstance, QuestStatus, QuestType};
    pub use crate::template::QuestTemplate;
    pub use crate::views;
}
