//! Two-step confirmation for destructive actions
//!
//! A player arms a target, then has to confirm the same target before the
//! window closes. The loop schedules a sweep at the deadline; the sweep only
//! marks the entry expired so a confirm that loses the race still reports
//! `Expired` rather than `NoPendingAction`.

use crate::core_guild::errors::{FailureKind, UserFacing};
use crate::core_guild::types::{GuildId, PlayerId, RelationId};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    DisbandGuild(GuildId),
    KickMember(PlayerId),
    LeaveGuild(GuildId),
    RevokeRelation(RelationId),
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::DisbandGuild(_) => write!(f, "disband your guild"),
            ActionTarget::KickMember(p) => write!(f, "kick {}", p),
            ActionTarget::LeaveGuild(_) => write!(f, "leave your guild"),
            ActionTarget::RevokeRelation(_) => write!(f, "revoke the relation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfirmError {
    #[error("Nothing is waiting for confirmation")]
    NoPendingAction,

    #[error("The confirmation window has passed")]
    Expired,
}

impl UserFacing for ConfirmError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Validation
    }

    fn describe(&self) -> String {
        match self {
            ConfirmError::NoPendingAction => "There is nothing to confirm.".to_string(),
            ConfirmError::Expired => "That confirmation expired. Start again.".to_string(),
        }
    }
}

/// Result of arming a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armed {
    /// Live target that this one replaced
    pub previous: Option<ActionTarget>,
    pub deadline: Instant,
    pub seq: u64,
}

#[derive(Debug)]
struct Entry {
    target: ActionTarget,
    deadline: Instant,
    seq: u64,
    expired: bool,
}

impl Entry {
    fn lapsed(&self, now: Instant) -> bool {
        self.expired || now >= self.deadline
    }
}

/// At most one pending target per player
#[derive(Debug)]
pub struct PendingActions {
    entries: HashMap<PlayerId, Entry>,
    timeout: Duration,
    next_seq: u64,
}

impl PendingActions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            next_seq: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm `target`, replacing whatever the player had pending
    pub fn arm(&mut self, player: PlayerId, target: ActionTarget, now: Instant) -> Armed {
        self.next_seq += 1;
        let seq = self.next_seq;
        let deadline = now + self.timeout;

        let previous = self
            .entries
            .insert(
                player,
                Entry {
                    target,
                    deadline,
                    seq,
                    expired: false,
                },
            )
            .filter(|old| !old.lapsed(now))
            .map(|old| old.target);

        Armed {
            previous,
            deadline,
            seq,
        }
    }

    /// Consume the pending entry if it matches `target` and is still live
    pub fn confirm(
        &mut self,
        player: &PlayerId,
        target: &ActionTarget,
        now: Instant,
    ) -> Result<ActionTarget, ConfirmError> {
        match self.entries.get(player) {
            Some(entry) if entry.target == *target => {}
            _ => return Err(ConfirmError::NoPendingAction),
        }

        let entry = self
            .entries
            .remove(player)
            .ok_or(ConfirmError::NoPendingAction)?;
        if entry.lapsed(now) {
            return Err(ConfirmError::Expired);
        }
        Ok(entry.target)
    }

    pub fn cancel(&mut self, player: &PlayerId) -> Option<ActionTarget> {
        self.entries.remove(player).map(|e| e.target)
    }

    /// Sweep for the entry armed with `seq`.
    ///
    /// Returns the target when this call expired it; a re-armed or already
    /// resolved entry is left alone.
    pub fn expire(&mut self, player: &PlayerId, seq: u64, now: Instant) -> Option<ActionTarget> {
        let entry = self.entries.get_mut(player)?;
        if entry.seq != seq || entry.expired || now < entry.deadline {
            return None;
        }
        entry.expired = true;
        Some(entry.target.clone())
    }

    /// Live pending target, if any
    pub fn pending(&self, player: &PlayerId, now: Instant) -> Option<&ActionTarget> {
        self.entries
            .get(player)
            .filter(|e| !e.lapsed(now))
            .map(|e| &e.target)
    }

    pub fn forget(&mut self, player: &PlayerId) {
        self.entries.remove(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (PendingActions, PlayerId, ActionTarget) {
        (
            PendingActions::new(Duration::from_secs(10)),
            PlayerId::new("alice"),
            ActionTarget::DisbandGuild(GuildId::new("g1")),
        )
    }

    #[test]
    fn test_confirm_within_window() {
        let (mut pending, alice, target) = registry();
        let t0 = Instant::now();
        pending.arm(alice.clone(), target.clone(), t0);

        let got = pending.confirm(&alice, &target, t0 + Duration::from_secs(5));
        assert_eq!(got, Ok(target.clone()));
        assert_eq!(
            pending.confirm(&alice, &target, t0 + Duration::from_secs(6)),
            Err(ConfirmError::NoPendingAction)
        );
    }

    #[test]
    fn test_confirm_after_window() {
        let (mut pending, alice, target) = registry();
        let t0 = Instant::now();
        pending.arm(alice.clone(), target.clone(), t0);

        assert_eq!(
            pending.confirm(&alice, &target, t0 + Duration::from_secs(11)),
            Err(ConfirmError::Expired)
        );
    }

    #[test]
    fn test_sweep_leaves_tombstone() {
        let (mut pending, alice, target) = registry();
        let t0 = Instant::now();
        let armed = pending.arm(alice.clone(), target.clone(), t0);

        let at_deadline = armed.deadline;
        assert_eq!(pending.expire(&alice, armed.seq, at_deadline), Some(target.clone()));
        assert_eq!(pending.expire(&alice, armed.seq, at_deadline), None);
        assert!(pending.pending(&alice, at_deadline).is_none());
        assert_eq!(
            pending.confirm(&alice, &target, at_deadline),
            Err(ConfirmError::Expired)
        );
    }

    #[test]
    fn test_rearm_replaces_and_ignores_old_sweep() {
        let (mut pending, alice, target) = registry();
        let t0 = Instant::now();
        let first = pending.arm(alice.clone(), target.clone(), t0);

        let kick = ActionTarget::KickMember(PlayerId::new("bob"));
        let second = pending.arm(alice.clone(), kick.clone(), t0 + Duration::from_secs(8));
        assert_eq!(second.previous, Some(target.clone()));

        // the first sweep fires for a superseded entry
        assert_eq!(pending.expire(&alice, first.seq, first.deadline), None);
        assert_eq!(
            pending.confirm(&alice, &target, t0 + Duration::from_secs(12)),
            Err(ConfirmError::NoPendingAction)
        );
        assert_eq!(
            pending.confirm(&alice, &kick, t0 + Duration::from_secs(12)),
            Ok(kick)
        );
    }

    #[test]
    fn test_mismatched_target_keeps_entry() {
        let (mut pending, alice, target) = registry();
        let t0 = Instant::now();
        pending.arm(alice.clone(), target.clone(), t0);

        let other = ActionTarget::LeaveGuild(GuildId::new("g1"));
        assert_eq!(
            pending.confirm(&alice, &other, t0),
            Err(ConfirmError::NoPendingAction)
        );
        assert_eq!(pending.pending(&alice, t0), Some(&target));
        assert_eq!(pending.cancel(&alice), Some(target));
    }
}
