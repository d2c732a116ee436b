//! Join applications and invitations

use super::types::{ApplicationId, GuildId, InvitationId, PlayerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unsolicited join request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub guild_id: GuildId,
    pub applicant: PlayerId,
    pub message: String,
    pub status: ApplicationStatus,
    pub created_at: Timestamp,
}

impl Application {
    pub fn new(guild_id: GuildId, applicant: PlayerId, message: String) -> Self {
        Application {
            id: ApplicationId::generate(),
            guild_id,
            applicant,
            message,
            status: ApplicationStatus::Pending,
            created_at: Timestamp::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ApplicationStatus::Pending),
            "APPROVED" => Some(ApplicationStatus::Approved),
            "REJECTED" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

/// Solicited join offer with a fixed time-to-live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub guild_id: GuildId,
    pub inviter: PlayerId,
    pub target: PlayerId,
    pub status: InvitationStatus,
    pub invited_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Invitation {
    pub fn new(guild_id: GuildId, inviter: PlayerId, target: PlayerId, ttl: Duration) -> Self {
        let now = Timestamp::now();
        Invitation {
            id: InvitationId::generate(),
            guild_id,
            inviter,
            target,
            status: InvitationStatus::Pending,
            invited_at: now,
            expires_at: now.plus(ttl),
        }
    }

    /// Status as seen at `now`: a PENDING invitation past its TTL reads as EXPIRED
    pub fn effective_status(&self, now: Timestamp) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && now >= self.expires_at {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Declined => "DECLINED",
            InvitationStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(InvitationStatus::Pending),
            "ACCEPTED" => Some(InvitationStatus::Accepted),
            "DECLINED" => Some(InvitationStatus::Declined),
            "EXPIRED" => Some(InvitationStatus::Expired),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_expires_after_ttl() {
        let invitation = Invitation::new(
            GuildId::new("g1"),
            PlayerId::new("alice"),
            PlayerId::new("bob"),
            Duration::from_secs(30 * 60),
        );

        let just_before = invitation.expires_at.minus(Duration::from_millis(1));
        assert_eq!(invitation.effective_status(just_before), InvitationStatus::Pending);
        assert_eq!(
            invitation.effective_status(invitation.expires_at),
            InvitationStatus::Expired
        );
    }

    #[test]
    fn test_decided_invitation_keeps_status() {
        let mut invitation = Invitation::new(
            GuildId::new("g1"),
            PlayerId::new("alice"),
            PlayerId::new("bob"),
            Duration::from_secs(1),
        );
        invitation.status = InvitationStatus::Declined;
        let later = invitation.expires_at.plus(Duration::from_secs(60));
        assert_eq!(invitation.effective_status(later), InvitationStatus::Declined);
    }

    #[test]
    fn test_new_application_is_pending() {
        let app = Application::new(GuildId::new("g1"), PlayerId::new("carol"), "hi".into());
        assert_eq!(app.status, ApplicationStatus::Pending);
    }
}
