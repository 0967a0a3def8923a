//! Derived views over a flat quest collection.
//!
//! Pure, order-preserving partitioning: the board hands these functions
//! its snapshot and renders whatever comes back. History ordering is
//! computed here on every call, never received from the feed.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::ids::MemberId;
use crate::member::{Character, MemberProfile, Role};
use crate::quest::{QuestInstance, QuestStatus, QuestType};

/// Quests waiting on a Guild Master verdict.
pub fn pending_approval(quests: &[QuestInstance]) -> Vec<&QuestInstance> {
    quests
        .iter()
        .filter(|q| q.status == Some(QuestStatus::Completed))
        .collect()
}

/// Active quests nobody holds yet.
pub fn unassigned_active(quests: &[QuestInstance]) -> Vec<&QuestInstance> {
    quests
        .iter()
        .filter(|q| {
            q.assigned_to.is_none()
                && matches!(
                    q.status,
                    Some(
                        QuestStatus::Pending
                            | QuestStatus::InProgress
                            | QuestStatus::Claimed
                            | QuestStatus::Available
                    )
                )
        })
        .collect()
}

/// Assigned quests still being worked.
///
/// PENDING is included: a denied quest returns to PENDING while staying
/// assigned and must keep surfacing here, not in the unassigned bucket.
pub fn in_progress(quests: &[QuestInstance]) -> Vec<&QuestInstance> {
    quests
        .iter()
        .filter(|q| {
            q.assigned_to.is_some()
                && matches!(
                    q.status,
                    Some(QuestStatus::Pending | QuestStatus::Claimed | QuestStatus::InProgress)
                )
        })
        .collect()
}

/// Family quests any eligible hero may volunteer for.
pub fn claimable_family(quests: &[QuestInstance]) -> Vec<&QuestInstance> {
    quests
        .iter()
        .filter(|q| q.quest_type == QuestType::Family && q.status == Some(QuestStatus::Available))
        .collect()
}

/// Quests held by one member.
pub fn by_assignee<'a>(quests: &'a [QuestInstance], member: &MemberId) -> Vec<&'a QuestInstance> {
    quests.iter().filter(|q| q.is_assigned_to(member)).collect()
}

/// Whether a quest still counts as "in play".
///
/// Fail-open for a missing status - the mirror image of the action
/// gating: an ambiguous record is shown, but nothing can be done to it.
pub fn is_active(quest: &QuestInstance) -> bool {
    matches!(
        quest.status,
        None | Some(QuestStatus::Pending | QuestStatus::InProgress | QuestStatus::Claimed)
    )
}

/// Settled quests, newest first.
///
/// Ordered descending by `completed_at`, falling back to `updated_at`,
/// then `created_at`, then the caller's `now`. The sort is stable, so
/// quests with equal timestamps keep their snapshot order.
pub fn historical(quests: &[QuestInstance], now: DateTime<Utc>) -> Vec<&QuestInstance> {
    let mut settled: Vec<&QuestInstance> = quests
        .iter()
        .filter(|q| q.status.is_some_and(|s| s.is_settled()))
        .collect();
    settled.sort_by(|a, b| b.effective_timestamp(now).cmp(&a.effective_timestamp(now)));
    settled
}

/// Drop duplicate ids, keeping the first occurrence in snapshot order.
pub fn dedup_by_id(quests: Vec<QuestInstance>) -> Vec<QuestInstance> {
    let mut seen = HashSet::new();
    quests
        .into_iter()
        .filter(|q| seen.insert(q.id.clone()))
        .collect()
}

/// A candidate assignee, ready for a picker widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOption {
    pub id: String,
    pub label: String,
    pub disabled: bool,
}

/// Candidates for assigning `quest`.
///
/// FAMILY quests draw from the family's playable characters; a character
/// is disabled while it already holds an active family quest other than
/// this one (one active family quest per character). INDIVIDUAL quests
/// draw from the member roster, excluding the Guild Master.
pub fn assignment_options(
    quest: &QuestInstance,
    characters: &[Character],
    members: &[MemberProfile],
    all_quests: &[QuestInstance],
) -> Vec<AssignmentOption> {
    match quest.quest_type {
        QuestType::Family => characters
            .iter()
            .map(|character| {
                let busy = all_quests.iter().any(|q| {
                    q.id != quest.id
                        && q.quest_type == QuestType::Family
                        && is_active(q)
                        && q.is_assigned_to(&character.member_id)
                });
                AssignmentOption {
                    id: character.id.to_string(),
                    label: character.name.clone(),
                    disabled: busy,
                }
            })
            .collect(),
        QuestType::Individual => members
            .iter()
            .filter(|member| member.role != Role::GuildMaster)
            .map(|member| AssignmentOption {
                id: member.id.to_string(),
                label: member.display_name.clone(),
                disabled: false,
            })
            .collect(),
    }
}
