//! Invitations (guild asks a player) and applications (player asks a guild)

use super::errors::RecruitmentError;
use super::guild::{Guild, GuildRole, Member};
use super::recruit::{Application, ApplicationStatus, Invitation, InvitationStatus};
use super::types::{ApplicationId, GuildId, InvitationId, PlayerId, Timestamp};
use crate::config::RecruitmentConfig;
use crate::core_store::{GuildStore, StoreError};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RecruitmentManager {
    store: Arc<dyn GuildStore>,
    config: RecruitmentConfig,
}

impl RecruitmentManager {
    pub fn new(store: Arc<dyn GuildStore>, config: RecruitmentConfig) -> Self {
        Self { store, config }
    }

    /// Membership of `actor` if they may recruit for their guild
    async fn recruiter(&self, actor: &PlayerId) -> Result<(Guild, Member), RecruitmentError> {
        let member = self
            .store
            .member(actor)
            .await?
            .ok_or(RecruitmentError::NotInGuild)?;
        if !member.role.can_recruit() {
            return Err(RecruitmentError::NotAuthorized);
        }
        let guild = self
            .store
            .guild(&member.guild_id)
            .await?
            .ok_or(RecruitmentError::GuildNotFound)?;
        Ok((guild, member))
    }

    async fn joinable_guild(&self, id: &GuildId) -> Result<Guild, RecruitmentError> {
        let guild = self
            .store
            .guild(id)
            .await?
            .ok_or(RecruitmentError::GuildNotFound)?;
        if guild.frozen {
            return Err(RecruitmentError::GuildFrozen);
        }
        Ok(guild)
    }

    async fn join(&self, guild: &GuildId, player: &PlayerId) -> Result<Member, RecruitmentError> {
        let member = Member::new(guild.clone(), player.clone(), GuildRole::Member);
        match self.store.add_member(&member).await {
            Ok(()) => Ok(member),
            Err(StoreError::CapacityReached) => Err(RecruitmentError::GuildFull),
            Err(StoreError::Conflict(_)) => Err(RecruitmentError::AlreadyInGuild),
            Err(StoreError::NotFound(_)) => Err(RecruitmentError::GuildNotFound),
            Err(e) => Err(e.into()),
        }
    }

    // ===== Invitations =====

    pub async fn invite(
        &self,
        inviter: &PlayerId,
        target: &PlayerId,
    ) -> Result<Invitation, RecruitmentError> {
        let (guild, _) = self.recruiter(inviter).await?;
        if guild.frozen {
            return Err(RecruitmentError::GuildFrozen);
        }
        if self.store.member(target).await?.is_some() {
            return Err(RecruitmentError::AlreadyInGuild);
        }

        let now = Timestamp::now();
        let already = self
            .store
            .invitations_from(&guild.id)
            .await?
            .iter()
            .any(|i| &i.target == target && i.effective_status(now) == InvitationStatus::Pending);
        if already {
            return Err(RecruitmentError::AlreadyInvited);
        }
        if self.store.count_members(&guild.id).await? >= guild.capacity as usize {
            return Err(RecruitmentError::GuildFull);
        }

        let invitation = Invitation::new(
            guild.id.clone(),
            inviter.clone(),
            target.clone(),
            self.config.invitation_ttl,
        );
        self.store.create_invitation(&invitation).await?;

        info!(guild = %guild.id, target = %target, by = %inviter, "Invitation sent");
        Ok(invitation)
    }

    /// Invitations addressed to `player`; lapsed ones are stored as EXPIRED on the way out
    pub async fn invitations_for(
        &self,
        player: &PlayerId,
    ) -> Result<Vec<Invitation>, RecruitmentError> {
        let now = Timestamp::now();
        let mut invitations = self.store.invitations_for(player).await?;
        for invitation in invitations.iter_mut() {
            let effective = invitation.effective_status(now);
            if effective != invitation.status {
                invitation.status = effective;
                self.store.update_invitation(invitation).await?;
                debug!(invitation = %invitation.id, "Invitation expired");
            }
        }
        Ok(invitations)
    }

    async fn pending_invitation(
        &self,
        player: &PlayerId,
        id: &InvitationId,
    ) -> Result<Invitation, RecruitmentError> {
        let mut invitation = self
            .store
            .invitation(id)
            .await?
            .filter(|i| &i.target == player)
            .ok_or(RecruitmentError::InvitationNotFound)?;

        match invitation.effective_status(Timestamp::now()) {
            InvitationStatus::Pending => Ok(invitation),
            InvitationStatus::Expired => {
                if invitation.status != InvitationStatus::Expired {
                    invitation.status = InvitationStatus::Expired;
                    self.store.update_invitation(&invitation).await?;
                }
                Err(RecruitmentError::InvitationExpired)
            }
            _ => Err(RecruitmentError::NotPending),
        }
    }

    pub async fn accept_invitation(
        &self,
        player: &PlayerId,
        id: &InvitationId,
    ) -> Result<Member, RecruitmentError> {
        let mut invitation = self.pending_invitation(player, id).await?;
        if self.store.member(player).await?.is_some() {
            return Err(RecruitmentError::AlreadyInGuild);
        }
        self.joinable_guild(&invitation.guild_id).await?;

        let member = self.join(&invitation.guild_id, player).await?;
        invitation.status = InvitationStatus::Accepted;
        self.store.update_invitation(&invitation).await?;

        info!(guild = %invitation.guild_id, player = %player, "Invitation accepted");
        Ok(member)
    }

    pub async fn decline_invitation(
        &self,
        player: &PlayerId,
        id: &InvitationId,
    ) -> Result<Invitation, RecruitmentError> {
        let mut invitation = self.pending_invitation(player, id).await?;
        invitation.status = InvitationStatus::Declined;
        self.store.update_invitation(&invitation).await?;
        Ok(invitation)
    }

    // ===== Applications =====

    pub async fn apply(
        &self,
        player: &PlayerId,
        guild: &GuildId,
        message: &str,
    ) -> Result<Application, RecruitmentError> {
        let message = message.trim();
        if message.chars().count() > self.config.application_message_max_len {
            return Err(RecruitmentError::MessageTooLong(
                self.config.application_message_max_len,
            ));
        }
        if self.store.member(player).await?.is_some() {
            return Err(RecruitmentError::AlreadyInGuild);
        }
        self.joinable_guild(guild).await?;

        let duplicate = self
            .store
            .applications_by(player)
            .await?
            .iter()
            .any(|a| &a.guild_id == guild && a.status == ApplicationStatus::Pending);
        if duplicate {
            return Err(RecruitmentError::AlreadyApplied);
        }

        let application = Application::new(guild.clone(), player.clone(), message.to_string());
        self.store.create_application(&application).await?;

        info!(guild = %guild, applicant = %player, "Application submitted");
        Ok(application)
    }

    /// Pending applications to `guild`, oldest first
    pub async fn applications_for(
        &self,
        guild: &GuildId,
    ) -> Result<Vec<Application>, RecruitmentError> {
        Ok(self
            .store
            .applications_for(guild)
            .await?
            .into_iter()
            .filter(|a| a.status == ApplicationStatus::Pending)
            .collect())
    }

    async fn reviewable(
        &self,
        actor: &PlayerId,
        id: &ApplicationId,
    ) -> Result<(Guild, Application), RecruitmentError> {
        let (guild, _) = self.recruiter(actor).await?;
        let application = self
            .store
            .application(id)
            .await?
            .filter(|a| a.guild_id == guild.id)
            .ok_or(RecruitmentError::ApplicationNotFound)?;
        if application.status != ApplicationStatus::Pending {
            return Err(RecruitmentError::NotPending);
        }
        Ok((guild, application))
    }

    pub async fn approve_application(
        &self,
        actor: &PlayerId,
        id: &ApplicationId,
    ) -> Result<Member, RecruitmentError> {
        let (guild, mut application) = self.reviewable(actor, id).await?;
        if guild.frozen {
            return Err(RecruitmentError::GuildFrozen);
        }

        let member = self.join(&guild.id, &application.applicant).await?;
        application.status = ApplicationStatus::Approved;
        self.store.update_application(&application).await?;

        info!(guild = %guild.id, applicant = %application.applicant, by = %actor, "Application approved");
        Ok(member)
    }

    pub async fn reject_application(
        &self,
        actor: &PlayerId,
        id: &ApplicationId,
    ) -> Result<Application, RecruitmentError> {
        let (_, mut application) = self.reviewable(actor, id).await?;
        application.status = ApplicationStatus::Rejected;
        self.store.update_application(&application).await?;
        Ok(application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::MemoryGuildStore;
    use std::time::Duration;

    async fn setup(capacity: u32) -> (RecruitmentManager, Arc<MemoryGuildStore>, Guild) {
        let store = Arc::new(MemoryGuildStore::new());
        let guild = Guild::new("Wardens".into(), None, PlayerId::new("lead"), capacity);
        store
            .create_guild(&guild, &Member::new(guild.id.clone(), PlayerId::new("lead"), GuildRole::Leader))
            .await
            .unwrap();
        let manager = RecruitmentManager::new(store.clone(), RecruitmentConfig::default());
        (manager, store, guild)
    }

    #[tokio::test]
    async fn test_invite_and_accept() {
        let (manager, store, guild) = setup(5).await;
        let bob = PlayerId::new("bob");

        let invitation = manager.invite(&PlayerId::new("lead"), &bob).await.unwrap();
        assert_eq!(
            manager.invite(&PlayerId::new("lead"), &bob).await,
            Err(RecruitmentError::AlreadyInvited)
        );

        let member = manager.accept_invitation(&bob, &invitation.id).await.unwrap();
        assert_eq!(member.guild_id, guild.id);
        assert_eq!(member.role, GuildRole::Member);

        let stored = store.invitation(&invitation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
    }

    #[tokio::test]
    async fn test_members_cannot_invite() {
        let (manager, store, guild) = setup(5).await;
        store
            .add_member(&Member::new(guild.id.clone(), PlayerId::new("mem"), GuildRole::Member))
            .await
            .unwrap();
        assert_eq!(
            manager.invite(&PlayerId::new("mem"), &PlayerId::new("bob")).await,
            Err(RecruitmentError::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn test_expired_invitation_cannot_be_accepted() {
        let (manager, store, guild) = setup(5).await;
        let bob = PlayerId::new("bob");
        let mut invitation = Invitation::new(
            guild.id.clone(),
            PlayerId::new("lead"),
            bob.clone(),
            Duration::from_secs(1800),
        );
        invitation.expires_at = Timestamp::from_millis(1);
        store.create_invitation(&invitation).await.unwrap();

        assert_eq!(
            manager.accept_invitation(&bob, &invitation.id).await,
            Err(RecruitmentError::InvitationExpired)
        );
        let listed = manager.invitations_for(&bob).await.unwrap();
        assert_eq!(listed[0].status, InvitationStatus::Expired);
        assert_eq!(
            store.invitation(&invitation.id).await.unwrap().unwrap().status,
            InvitationStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_application_flow() {
        let (manager, _, guild) = setup(5).await;
        let carol = PlayerId::new("carol");

        let app = manager.apply(&carol, &guild.id, "let me in").await.unwrap();
        assert_eq!(
            manager.apply(&carol, &guild.id, "again").await,
            Err(RecruitmentError::AlreadyApplied)
        );
        assert_eq!(manager.applications_for(&guild.id).await.unwrap().len(), 1);

        manager
            .approve_application(&PlayerId::new("lead"), &app.id)
            .await
            .unwrap();
        assert!(manager.applications_for(&guild.id).await.unwrap().is_empty());
        assert_eq!(
            manager.reject_application(&PlayerId::new("lead"), &app.id).await,
            Err(RecruitmentError::NotPending)
        );
    }

    #[tokio::test]
    async fn test_full_guild_rejects_approval() {
        let (manager, _, guild) = setup(1).await;
        let app = manager
            .apply(&PlayerId::new("carol"), &guild.id, "")
            .await
            .unwrap();
        assert_eq!(
            manager.approve_application(&PlayerId::new("lead"), &app.id).await,
            Err(RecruitmentError::GuildFull)
        );
    }

    #[tokio::test]
    async fn test_long_message_rejected() {
        let (manager, _, guild) = setup(5).await;
        let message = "x".repeat(101);
        assert_eq!(
            manager.apply(&PlayerId::new("carol"), &guild.id, &message).await,
            Err(RecruitmentError::MessageTooLong(100))
        );
    }
}
