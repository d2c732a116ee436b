//! Membership role engine
//!
//! Role changes go through `GuildStore::update_members`, which refuses any
//! write that would leave a guild without exactly one LEADER. Checks here
//! give the precise reason; the store is what keeps concurrent writers
//! from breaking the single-leader rule.

use super::errors::MembershipError;
use super::guild::{Guild, GuildRole, Member};
use super::types::{GuildId, PlayerId};
use crate::core_store::{GuildStore, StoreError};
use std::sync::Arc;
use tracing::info;

/// Who left the guild and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    Left(Member),
    Kicked(Member),
}

pub struct MembershipEngine {
    store: Arc<dyn GuildStore>,
}

fn map_write_error(e: StoreError) -> MembershipError {
    match e {
        StoreError::Conflict(_) | StoreError::NotFound(_) => MembershipError::ConcurrentModification,
        other => MembershipError::Store(other),
    }
}

impl MembershipEngine {
    pub fn new(store: Arc<dyn GuildStore>) -> Self {
        Self { store }
    }

    /// The player's membership, or `NotMember`
    pub async fn member(&self, player: &PlayerId) -> Result<Member, MembershipError> {
        self.store
            .member(player)
            .await?
            .ok_or(MembershipError::NotMember)
    }

    /// Membership of `actor`, provided they hold at least `min_role`
    pub async fn require_role(
        &self,
        actor: &PlayerId,
        min_role: GuildRole,
    ) -> Result<Member, MembershipError> {
        let member = self.member(actor).await?;
        if member.role < min_role {
            return Err(MembershipError::NotAuthorized);
        }
        Ok(member)
    }

    /// Roster sorted leader first
    pub async fn roster(&self, guild: &GuildId) -> Result<Vec<Member>, MembershipError> {
        Ok(self.store.members_of(guild).await?)
    }

    /// Load actor and target, checking both belong to the same live guild
    async fn pair(
        &self,
        actor: &PlayerId,
        target: &PlayerId,
    ) -> Result<(Guild, Member, Member), MembershipError> {
        let actor_member = self.member(actor).await?;
        let target_member = self.member(target).await?;
        if actor_member.guild_id != target_member.guild_id {
            return Err(MembershipError::NotMember);
        }

        let guild = self
            .store
            .guild(&actor_member.guild_id)
            .await?
            .ok_or(MembershipError::NotMember)?;
        if guild.frozen {
            return Err(MembershipError::GuildFrozen);
        }
        Ok((guild, actor_member, target_member))
    }

    /// MEMBER to OFFICER. LEADER is only reachable through a transfer.
    pub async fn promote(
        &self,
        actor: &PlayerId,
        target: &PlayerId,
    ) -> Result<Member, MembershipError> {
        let (guild, actor_member, target_member) = self.pair(actor, target).await?;
        if actor_member.role != GuildRole::Leader {
            return Err(MembershipError::NotAuthorized);
        }
        if target_member.role >= GuildRole::Officer {
            return Err(MembershipError::AlreadyHighest);
        }

        let promoted = target_member.with_role(GuildRole::Officer);
        self.store
            .update_members(&guild.id, std::slice::from_ref(&promoted))
            .await
            .map_err(map_write_error)?;

        info!(guild = %guild.id, player = %target, "Member promoted to officer");
        Ok(promoted)
    }

    /// OFFICER to MEMBER
    pub async fn demote(
        &self,
        actor: &PlayerId,
        target: &PlayerId,
    ) -> Result<Member, MembershipError> {
        let (guild, actor_member, target_member) = self.pair(actor, target).await?;
        if actor_member.role != GuildRole::Leader {
            return Err(MembershipError::NotAuthorized);
        }
        match target_member.role {
            GuildRole::Leader => return Err(MembershipError::CannotDemoteLeader),
            GuildRole::Member => return Err(MembershipError::AlreadyLowest),
            GuildRole::Officer => {}
        }

        let demoted = target_member.with_role(GuildRole::Member);
        self.store
            .update_members(&guild.id, std::slice::from_ref(&demoted))
            .await
            .map_err(map_write_error)?;

        info!(guild = %guild.id, player = %target, "Officer demoted to member");
        Ok(demoted)
    }

    /// Kick `target`, or leave when `actor == target`.
    ///
    /// Officers may kick plain members; the leader may kick anyone but
    /// themselves.
    pub async fn remove(
        &self,
        actor: &PlayerId,
        target: &PlayerId,
    ) -> Result<Departure, MembershipError> {
        let (guild, actor_member, target_member) = self.pair(actor, target).await?;
        if target_member.role == GuildRole::Leader {
            return Err(MembershipError::CannotRemoveLeader);
        }

        let leaving = actor == target;
        if !leaving && (actor_member.role < GuildRole::Officer || actor_member.role <= target_member.role) {
            return Err(MembershipError::NotAuthorized);
        }

        match self.store.remove_member(&guild.id, target).await {
            Ok(()) => {}
            // Became leader in the meantime
            Err(StoreError::Conflict(_)) => return Err(MembershipError::CannotRemoveLeader),
            Err(StoreError::NotFound(_)) => return Err(MembershipError::NotMember),
            Err(e) => return Err(e.into()),
        }

        if leaving {
            info!(guild = %guild.id, player = %target, "Member left guild");
            Ok(Departure::Left(target_member))
        } else {
            info!(guild = %guild.id, player = %target, by = %actor, "Member kicked");
            Ok(Departure::Kicked(target_member))
        }
    }

    /// Make `new_leader` LEADER and the current leader OFFICER in one write
    pub async fn transfer_leadership(
        &self,
        guild: &GuildId,
        new_leader: &PlayerId,
    ) -> Result<Member, MembershipError> {
        let stored = self
            .store
            .guild(guild)
            .await?
            .ok_or(MembershipError::NotMember)?;
        if stored.frozen {
            return Err(MembershipError::GuildFrozen);
        }

        let roster = self.store.members_of(guild).await?;
        let incoming = roster
            .iter()
            .find(|m| &m.player == new_leader)
            .ok_or(MembershipError::NotMember)?;
        if incoming.role == GuildRole::Leader {
            return Err(MembershipError::AlreadyHighest);
        }

        let mut changes: Vec<Member> = roster
            .iter()
            .filter(|m| m.role == GuildRole::Leader)
            .map(|m| m.with_role(GuildRole::Officer))
            .collect();
        let promoted = incoming.with_role(GuildRole::Leader);
        changes.push(promoted.clone());

        self.store
            .update_members(guild, &changes)
            .await
            .map_err(map_write_error)?;

        info!(guild = %guild, leader = %new_leader, "Leadership transferred");
        Ok(promoted)
    }

    /// Leader-initiated transfer to another member of the same guild
    pub async fn hand_over(
        &self,
        actor: &PlayerId,
        target: &PlayerId,
    ) -> Result<Member, MembershipError> {
        let (guild, actor_member, _) = self.pair(actor, target).await?;
        if actor_member.role != GuildRole::Leader {
            return Err(MembershipError::NotAuthorized);
        }
        self.transfer_leadership(&guild.id, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::MemoryGuildStore;

    struct Fixture {
        engine: MembershipEngine,
        store: Arc<MemoryGuildStore>,
        guild: Guild,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryGuildStore::new());
        let guild = Guild::new("Wardens".into(), None, PlayerId::new("lead"), 10);
        store
            .create_guild(&guild, &Member::new(guild.id.clone(), PlayerId::new("lead"), GuildRole::Leader))
            .await
            .unwrap();
        for (name, role) in [("off", GuildRole::Officer), ("mem", GuildRole::Member), ("mem2", GuildRole::Member)] {
            store
                .add_member(&Member::new(guild.id.clone(), PlayerId::new(name), role))
                .await
                .unwrap();
        }
        Fixture {
            engine: MembershipEngine::new(store.clone()),
            store,
            guild,
        }
    }

    fn p(name: &str) -> PlayerId {
        PlayerId::new(name)
    }

    async fn role_of(f: &Fixture, name: &str) -> Option<GuildRole> {
        f.store.member(&p(name)).await.unwrap().map(|m| m.role)
    }

    #[tokio::test]
    async fn test_promotion_ceiling() {
        let f = fixture().await;
        let promoted = f.engine.promote(&p("lead"), &p("mem")).await.unwrap();
        assert_eq!(promoted.role, GuildRole::Officer);

        assert_eq!(
            f.engine.promote(&p("lead"), &p("mem")).await,
            Err(MembershipError::AlreadyHighest)
        );
        assert_eq!(role_of(&f, "mem").await, Some(GuildRole::Officer));
    }

    #[tokio::test]
    async fn test_only_leader_promotes() {
        let f = fixture().await;
        assert_eq!(
            f.engine.promote(&p("off"), &p("mem")).await,
            Err(MembershipError::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn test_demote_rules() {
        let f = fixture().await;
        assert_eq!(
            f.engine.demote(&p("lead"), &p("lead")).await,
            Err(MembershipError::CannotDemoteLeader)
        );
        assert_eq!(
            f.engine.demote(&p("lead"), &p("mem")).await,
            Err(MembershipError::AlreadyLowest)
        );
        let demoted = f.engine.demote(&p("lead"), &p("off")).await.unwrap();
        assert_eq!(demoted.role, GuildRole::Member);
    }

    #[tokio::test]
    async fn test_cross_guild_edit_is_not_member() {
        let f = fixture().await;
        let other = Guild::new("Rangers".into(), None, p("boss"), 5);
        f.store
            .create_guild(&other, &Member::new(other.id.clone(), p("boss"), GuildRole::Leader))
            .await
            .unwrap();

        assert_eq!(
            f.engine.promote(&p("boss"), &p("mem")).await,
            Err(MembershipError::NotMember)
        );
        assert_eq!(
            f.engine.remove(&p("lead"), &p("stranger")).await,
            Err(MembershipError::NotMember)
        );
    }

    #[tokio::test]
    async fn test_remove_rules() {
        let f = fixture().await;
        assert_eq!(
            f.engine.remove(&p("lead"), &p("lead")).await,
            Err(MembershipError::CannotRemoveLeader)
        );
        assert_eq!(
            f.engine.remove(&p("mem"), &p("mem2")).await,
            Err(MembershipError::NotAuthorized)
        );

        let kicked = f.engine.remove(&p("off"), &p("mem")).await.unwrap();
        assert!(matches!(kicked, Departure::Kicked(_)));
        let left = f.engine.remove(&p("mem2"), &p("mem2")).await.unwrap();
        assert!(matches!(left, Departure::Left(_)));
        assert_eq!(role_of(&f, "mem2").await, None);
    }

    #[tokio::test]
    async fn test_transfer_leadership() {
        let f = fixture().await;
        let new_leader = f
            .engine
            .transfer_leadership(&f.guild.id, &p("off"))
            .await
            .unwrap();
        assert_eq!(new_leader.role, GuildRole::Leader);
        assert_eq!(role_of(&f, "lead").await, Some(GuildRole::Officer));

        let leaders = f
            .store
            .members_of(&f.guild.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.role == GuildRole::Leader)
            .count();
        assert_eq!(leaders, 1);
        assert_eq!(f.store.guild(&f.guild.id).await.unwrap().unwrap().leader, p("off"));
    }

    #[tokio::test]
    async fn test_concurrent_transfers_keep_one_leader() {
        let f = fixture().await;
        let (officer, member) = (p("off"), p("mem"));
        let (a, b) = tokio::join!(
            f.engine.transfer_leadership(&f.guild.id, &officer),
            f.engine.transfer_leadership(&f.guild.id, &member)
        );
        assert!(a.is_ok() || b.is_ok());

        let leaders = f
            .store
            .members_of(&f.guild.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.role == GuildRole::Leader)
            .count();
        assert_eq!(leaders, 1);
    }

    #[tokio::test]
    async fn test_frozen_guild_rejects_changes() {
        let f = fixture().await;
        let mut frozen = f.guild.clone();
        frozen.frozen = true;
        f.store.update_guild(&frozen).await.unwrap();

        assert_eq!(
            f.engine.promote(&p("lead"), &p("mem")).await,
            Err(MembershipError::GuildFrozen)
        );
    }
}
