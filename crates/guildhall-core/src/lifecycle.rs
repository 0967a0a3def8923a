//! Quest lifecycle rules.
//!
//! Every permission decision in the application flows through this module:
//! the view layer renders whatever eligibility set it is handed and never
//! decides authority on its own.
//!
//! All predicates are total over `Option<QuestStatus>`. A quest whose row
//! carried no canonical status is displayed (see
//! [`QuestInstance::display_status`]) but yields an empty eligibility set
//! until a canonical status is observed.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::{GuildError, Result};
use crate::ids::MemberId;
use crate::member::{Actor, Role};
use crate::quest::{QuestInstance, QuestStatus, QuestType};

/// A state-changing action a caller can request on a quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestAction {
    /// Hero volunteers for an AVAILABLE family quest.
    Pickup,
    /// Guild Master assigns (or forcibly reassigns) the quest.
    Assign { to: MemberId },
    /// Assignee begins work.
    Start,
    /// Assignee marks the work done, pending approval.
    Complete,
    /// Guild Master accepts the completion.
    Approve,
    /// Guild Master rejects the completion; the quest returns to the hero.
    Deny,
    /// Guild Master removes the quest entirely.
    Cancel,
    /// Assignee (or Guild Master) hands a family quest back to the pool.
    Release,
}

impl QuestAction {
    /// The verb used in error messages.
    pub fn verb(&self) -> &'static str {
        match self {
            QuestAction::Pickup => "pick up",
            QuestAction::Assign { .. } => "assign",
            QuestAction::Start => "start",
            QuestAction::Complete => "complete",
            QuestAction::Approve => "approve",
            QuestAction::Deny => "deny",
            QuestAction::Cancel => "cancel",
            QuestAction::Release => "release",
        }
    }
}

impl fmt::Display for QuestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Action eligibility for one actor against one quest.
///
/// Computed in one place so every surface (buttons, menus, the
/// coordinator) agrees on what the caller may do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub can_pickup: bool,
    pub can_assign: bool,
    pub can_start: bool,
    pub can_complete: bool,
    pub can_approve: bool,
    pub can_deny: bool,
    pub can_cancel: bool,
    pub can_release: bool,
}

impl Eligibility {
    /// Compute the eligibility set for `actor` against `quest`.
    ///
    /// A quest without a canonical status grants nothing (fail-closed).
    pub fn for_actor(quest: &QuestInstance, actor: &Actor) -> Self {
        let Some(status) = quest.status else {
            return Self::default();
        };

        let is_gm = actor.role == Role::GuildMaster;
        let is_assignee = quest.is_assigned_to(&actor.id);
        let is_family = quest.quest_type == QuestType::Family;

        use QuestStatus::*;
        Self {
            can_pickup: !is_gm
                && is_family
                && status == Available
                && quest.assigned_to.is_none(),
            can_assign: is_gm && matches!(status, Available | Pending | Claimed | InProgress),
            can_start: is_assignee && matches!(status, Pending | Claimed),
            can_complete: is_assignee && status == InProgress,
            can_approve: is_gm && status == Completed,
            can_deny: is_gm && status == Completed,
            can_cancel: is_gm && matches!(status, Available | Pending | Claimed | InProgress),
            can_release: is_family
                && (is_assignee || (is_gm && quest.assigned_to.is_some()))
                && matches!(status, Pending | Claimed | InProgress),
        }
    }

    /// Whether the given action is in this eligibility set.
    pub fn allows(&self, action: &QuestAction) -> bool {
        match action {
            QuestAction::Pickup => self.can_pickup,
            QuestAction::Assign { .. } => self.can_assign,
            QuestAction::Start => self.can_start,
            QuestAction::Complete => self.can_complete,
            QuestAction::Approve => self.can_approve,
            QuestAction::Deny => self.can_deny,
            QuestAction::Cancel => self.can_cancel,
            QuestAction::Release => self.can_release,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Role and assignment authority for an action, independent of status.
fn permitted(quest: &QuestInstance, action: &QuestAction, actor: &Actor) -> bool {
    match action {
        QuestAction::Assign { .. }
        | QuestAction::Approve
        | QuestAction::Deny
        | QuestAction::Cancel => actor.is_gm(),
        QuestAction::Pickup => !actor.is_gm(),
        QuestAction::Start | QuestAction::Complete => quest.is_assigned_to(&actor.id),
        QuestAction::Release => actor.is_gm() || quest.is_assigned_to(&actor.id),
    }
}

fn status_label(status: Option<QuestStatus>) -> String {
    status.map_or_else(|| "unknown".to_string(), |s| s.display_name().to_string())
}

/// Validate `action` against the quest's current state.
///
/// Authority is the outer gate: an actor without the role or assignment
/// gets `PermissionDenied` even when the status would also be wrong.
pub fn check(quest: &QuestInstance, action: &QuestAction, actor: &Actor) -> Result<()> {
    if !permitted(quest, action, actor) {
        let reason = match action {
            QuestAction::Assign { .. }
            | QuestAction::Approve
            | QuestAction::Deny
            | QuestAction::Cancel => "only the Guild Master may do this",
            QuestAction::Pickup => "the Guild Master does not pick up quests",
            QuestAction::Start | QuestAction::Complete => "the quest is not assigned to you",
            QuestAction::Release => "the quest is not yours to release",
        };
        return Err(GuildError::PermissionDenied {
            action: action.verb().to_string(),
            reason: reason.to_string(),
        });
    }

    if !Eligibility::for_actor(quest, actor).allows(action) {
        return Err(GuildError::InvalidTransition {
            action: action.verb().to_string(),
            status: status_label(quest.status),
        });
    }

    Ok(())
}

/// Outcome of applying an action to a quest record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The record's next state, to be written to the store.
    Update(QuestInstance),
    /// The record is removed (cancellation).
    Remove,
}

/// Validate and apply `action`, producing the record state to persist.
///
/// Timestamps are stamped from the injected `now` so callers control the
/// clock. The input record is never mutated.
pub fn apply(
    quest: &QuestInstance,
    action: QuestAction,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Transition> {
    check(quest, &action, actor)?;

    let mut next = quest.clone();
    next.updated_at = Some(now);

    match action {
        QuestAction::Pickup => {
            next.status = Some(QuestStatus::Claimed);
            next.assigned_to = Some(actor.id.clone());
        }
        QuestAction::Assign { to } => {
            next.status = Some(QuestStatus::Pending);
            next.assigned_to = Some(to);
            // A supervisor assignment forfeits the volunteer bonus.
            next.volunteer_bonus = None;
        }
        QuestAction::Start => {
            next.status = Some(QuestStatus::InProgress);
        }
        QuestAction::Complete => {
            next.status = Some(QuestStatus::Completed);
            next.completed_at = Some(now);
        }
        QuestAction::Approve => {
            next.status = Some(QuestStatus::Approved);
            next.approved_at = Some(now);
        }
        QuestAction::Deny => {
            // Back to the hero; the stale completion stamp must not leak
            // into history ordering if the quest later expires.
            next.status = Some(QuestStatus::Pending);
            next.completed_at = None;
        }
        QuestAction::Cancel => return Ok(Transition::Remove),
        QuestAction::Release => {
            next.status = Some(QuestStatus::Available);
            next.assigned_to = None;
        }
    }

    Ok(Transition::Update(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FamilyId;

    fn family_id() -> FamilyId {
        FamilyId::from("fam-1")
    }

    fn gm() -> Actor {
        Actor::guild_master("gm-1")
    }

    fn hero_a() -> Actor {
        Actor::hero("hero-a")
    }

    fn hero_b() -> Actor {
        Actor::hero("hero-b")
    }

    fn quest(status: Option<QuestStatus>, quest_type: QuestType, assigned: Option<&Actor>) -> QuestInstance {
        let mut quest = QuestInstance::new(family_id(), "Test quest", gm().id, quest_type);
        quest.status = status;
        quest.assigned_to = assigned.map(|a| a.id.clone());
        quest
    }

    #[test]
    fn test_eligibility_matches_transition_table() {
        use QuestStatus::*;

        // For every (status, role, quest_type) triple the eligibility set
        // must match the transition table exactly.
        for status in QuestStatus::ALL {
            for quest_type in [QuestType::Family, QuestType::Individual] {
                let assignee = hero_a();
                let assigned = quest(Some(status), quest_type, Some(&assignee));
                let unassigned = quest(Some(status), quest_type, None);
                let is_family = quest_type == QuestType::Family;

                // Hero against an unassigned quest: pickup is the only move.
                let e = Eligibility::for_actor(&unassigned, &assignee);
                assert_eq!(e.can_pickup, is_family && status == Available);
                assert!(!e.can_start && !e.can_complete && !e.can_release);
                assert!(!e.can_assign && !e.can_approve && !e.can_deny && !e.can_cancel);

                // Assignee driving their own quest.
                let e = Eligibility::for_actor(&assigned, &assignee);
                assert_eq!(e.can_start, matches!(status, Pending | Claimed));
                assert_eq!(e.can_complete, status == InProgress);
                assert_eq!(
                    e.can_release,
                    is_family && matches!(status, Pending | Claimed | InProgress)
                );
                assert!(!e.can_assign && !e.can_approve && !e.can_deny && !e.can_cancel);

                // A different hero gets nothing on an assigned quest.
                let e = Eligibility::for_actor(&assigned, &hero_b());
                assert!(e.is_empty());

                // Guild Master authority.
                let e = Eligibility::for_actor(&assigned, &gm());
                assert_eq!(e.can_assign, matches!(status, Available | Pending | Claimed | InProgress));
                assert_eq!(e.can_approve, status == Completed);
                assert_eq!(e.can_deny, status == Completed);
                assert_eq!(e.can_cancel, matches!(status, Available | Pending | Claimed | InProgress));
                assert_eq!(
                    e.can_release,
                    is_family && matches!(status, Pending | Claimed | InProgress)
                );
                assert!(!e.can_pickup);
            }
        }
    }

    #[test]
    fn test_missing_status_is_fail_closed() {
        let assignee = hero_a();
        for quest_type in [QuestType::Family, QuestType::Individual] {
            let q = quest(None, quest_type, Some(&assignee));
            assert!(Eligibility::for_actor(&q, &assignee).is_empty());
            assert!(Eligibility::for_actor(&q, &gm()).is_empty());
        }

        let q = quest(None, QuestType::Family, None);
        let err = apply(&q, QuestAction::Pickup, &hero_a(), Utc::now()).unwrap_err();
        assert!(matches!(err, GuildError::InvalidTransition { .. }));
    }

    #[test]
    fn test_individual_quests_cannot_be_released() {
        // An INDIVIDUAL quest assigned to a hero never grants release,
        // while an otherwise-identical FAMILY quest does.
        let assignee = hero_a();
        for status in [QuestStatus::Pending, QuestStatus::Claimed, QuestStatus::InProgress] {
            let individual = quest(Some(status), QuestType::Individual, Some(&assignee));
            let family = quest(Some(status), QuestType::Family, Some(&assignee));
            assert!(!Eligibility::for_actor(&individual, &assignee).can_release);
            assert!(Eligibility::for_actor(&family, &assignee).can_release);
        }
        for status in QuestStatus::ALL {
            let individual = quest(Some(status), QuestType::Individual, Some(&assignee));
            assert!(!Eligibility::for_actor(&individual, &assignee).can_release);
        }
    }

    #[test]
    fn test_permission_reported_before_legality() {
        // Hero B touching hero A's COMPLETED quest: both the authority and
        // the transition are wrong; authority wins.
        let assignee = hero_a();
        let q = quest(Some(QuestStatus::Completed), QuestType::Family, Some(&assignee));
        let err = check(&q, &QuestAction::Start, &hero_b()).unwrap_err();
        assert!(matches!(err, GuildError::PermissionDenied { .. }));

        // Hero approving anything is a permission error, not a transition one.
        let err = check(&q, &QuestAction::Approve, &assignee).unwrap_err();
        assert!(matches!(err, GuildError::PermissionDenied { .. }));
    }

    #[test]
    fn test_pickup_claims_and_assigns() {
        let q = quest(Some(QuestStatus::Available), QuestType::Family, None);
        let now = Utc::now();
        let Transition::Update(next) = apply(&q, QuestAction::Pickup, &hero_a(), now).unwrap() else {
            panic!("pickup is an update");
        };
        assert_eq!(next.status, Some(QuestStatus::Claimed));
        assert_eq!(next.assigned_to, Some(hero_a().id));
        assert_eq!(next.updated_at, Some(now));
    }

    #[test]
    fn test_assign_forfeits_volunteer_bonus() {
        let mut q = quest(Some(QuestStatus::Available), QuestType::Family, None);
        q.volunteer_bonus = Some(0.25);
        let action = QuestAction::Assign { to: hero_b().id };
        let Transition::Update(next) = apply(&q, action, &gm(), Utc::now()).unwrap() else {
            panic!("assign is an update");
        };
        assert_eq!(next.status, Some(QuestStatus::Pending));
        assert_eq!(next.assigned_to, Some(hero_b().id));
        assert_eq!(next.volunteer_bonus, None);
    }

    #[test]
    fn test_forcible_reassign_from_in_progress() {
        let assignee = hero_a();
        let q = quest(Some(QuestStatus::InProgress), QuestType::Individual, Some(&assignee));
        let action = QuestAction::Assign { to: hero_b().id };
        let Transition::Update(next) = apply(&q, action, &gm(), Utc::now()).unwrap() else {
            panic!("assign is an update");
        };
        assert_eq!(next.status, Some(QuestStatus::Pending));
        assert_eq!(next.assigned_to, Some(hero_b().id));

        // But never away from a settled quest.
        let q = quest(Some(QuestStatus::Approved), QuestType::Individual, Some(&assignee));
        let err = apply(&q, QuestAction::Assign { to: hero_b().id }, &gm(), Utc::now()).unwrap_err();
        assert!(matches!(err, GuildError::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_and_approve_stamp_timestamps() {
        let assignee = hero_a();
        let q = quest(Some(QuestStatus::InProgress), QuestType::Family, Some(&assignee));
        let completed_at = Utc::now();
        let Transition::Update(completed) =
            apply(&q, QuestAction::Complete, &assignee, completed_at).unwrap()
        else {
            panic!("complete is an update");
        };
        assert_eq!(completed.status, Some(QuestStatus::Completed));
        assert_eq!(completed.completed_at, Some(completed_at));

        let approved_at = completed_at + chrono::Duration::minutes(5);
        let Transition::Update(approved) =
            apply(&completed, QuestAction::Approve, &gm(), approved_at).unwrap()
        else {
            panic!("approve is an update");
        };
        assert_eq!(approved.status, Some(QuestStatus::Approved));
        assert_eq!(approved.approved_at, Some(approved_at));
        assert_eq!(approved.completed_at, Some(completed_at));
    }

    #[test]
    fn test_deny_keeps_assignment_and_clears_completion() {
        let assignee = hero_a();
        let mut q = quest(Some(QuestStatus::Completed), QuestType::Family, Some(&assignee));
        q.completed_at = Some(Utc::now());
        let Transition::Update(next) = apply(&q, QuestAction::Deny, &gm(), Utc::now()).unwrap() else {
            panic!("deny is an update");
        };
        assert_eq!(next.status, Some(QuestStatus::Pending));
        assert_eq!(next.assigned_to, Some(assignee.id));
        assert_eq!(next.completed_at, None);
    }

    #[test]
    fn test_cancel_removes() {
        let q = quest(Some(QuestStatus::Pending), QuestType::Family, Some(&hero_a()));
        assert_eq!(apply(&q, QuestAction::Cancel, &gm(), Utc::now()).unwrap(), Transition::Remove);

        // Settled quests cannot be cancelled.
        let q = quest(Some(QuestStatus::Completed), QuestType::Family, Some(&hero_a()));
        let err = apply(&q, QuestAction::Cancel, &gm(), Utc::now()).unwrap_err();
        assert!(matches!(err, GuildError::InvalidTransition { .. }));
    }

    #[test]
    fn test_release_returns_to_pool() {
        let assignee = hero_a();
        let q = quest(Some(QuestStatus::InProgress), QuestType::Family, Some(&assignee));
        let Transition::Update(next) = apply(&q, QuestAction::Release, &assignee, Utc::now()).unwrap()
        else {
            panic!("release is an update");
        };
        assert_eq!(next.status, Some(QuestStatus::Available));
        assert_eq!(next.assigned_to, None);
    }
}
