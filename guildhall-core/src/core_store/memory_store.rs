//! In-memory `GuildStore`
//!
//! All tables sit behind one `RwLock`, so every call (including the
//! multi-record writes) is atomic with respect to every other call.

use super::{GuildStore, StoreError, StoreResult};
use crate::core_guild::guild::{Guild, GuildRole, Member};
use crate::core_guild::recruit::{Application, Invitation};
use crate::core_guild::relation::{Relation, RelationStatus};
use crate::core_guild::types::{
    ApplicationId, GuildId, InvitationId, PlayerId, RelationId, Timestamp,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    guilds: HashMap<GuildId, Guild>,
    members: HashMap<PlayerId, Member>,
    relations: HashMap<RelationId, Relation>,
    applications: HashMap<ApplicationId, Application>,
    invitations: HashMap<InvitationId, Invitation>,
}

impl Tables {
    fn name_taken(&self, name: &str, except: Option<&GuildId>) -> bool {
        self.guilds
            .values()
            .any(|g| Some(&g.id) != except && g.name.eq_ignore_ascii_case(name))
    }

    fn tag_taken(&self, tag: &str, except: Option<&GuildId>) -> bool {
        self.guilds.values().any(|g| {
            Some(&g.id) != except
                && g.tag.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(tag))
        })
    }

    fn member_count(&self, guild: &GuildId) -> usize {
        self.members.values().filter(|m| &m.guild_id == guild).count()
    }
}

/// Lock-guarded in-memory tables
#[derive(Default)]
pub struct MemoryGuildStore {
    tables: RwLock<Tables>,
    failing_counts: RwLock<HashSet<GuildId>>,
}

impl MemoryGuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `count_members` call for `guild` fail with
    /// `Unavailable`, to exercise degraded list rendering.
    pub async fn fail_member_counts_for(&self, guild: GuildId) {
        self.failing_counts.write().await.insert(guild);
    }

    /// Stop failing member counts for `guild`
    pub async fn restore_member_counts_for(&self, guild: &GuildId) {
        self.failing_counts.write().await.remove(guild);
    }
}

#[async_trait]
impl GuildStore for MemoryGuildStore {
    // ===== Guilds =====

    async fn guild(&self, id: &GuildId) -> StoreResult<Option<Guild>> {
        Ok(self.tables.read().await.guilds.get(id).cloned())
    }

    async fn guild_by_name(&self, name: &str) -> StoreResult<Option<Guild>> {
        let tables = self.tables.read().await;
        Ok(tables
            .guilds
            .values()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn guild_by_tag(&self, tag: &str) -> StoreResult<Option<Guild>> {
        let tables = self.tables.read().await;
        Ok(tables
            .guilds
            .values()
            .find(|g| g.tag.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .cloned())
    }

    async fn list_guilds(&self, offset: usize, limit: usize) -> StoreResult<Vec<Guild>> {
        let tables = self.tables.read().await;
        let mut guilds: Vec<Guild> = tables.guilds.values().cloned().collect();
        guilds.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(guilds.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_guilds(&self) -> StoreResult<usize> {
        Ok(self.tables.read().await.guilds.len())
    }

    async fn create_guild(&self, guild: &Guild, leader: &Member) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if tables.guilds.contains_key(&guild.id) {
            return Err(StoreError::Conflict(format!("guild {} exists", guild.id)));
        }
        if tables.name_taken(&guild.name, None) {
            return Err(StoreError::Conflict(format!("name '{}' taken", guild.name)));
        }
        if let Some(tag) = &guild.tag {
            if tables.tag_taken(tag, None) {
                return Err(StoreError::Conflict(format!("tag '{}' taken", tag)));
            }
        }
        if tables.members.contains_key(&leader.player) {
            return Err(StoreError::Conflict(format!(
                "player {} already in a guild",
                leader.player
            )));
        }

        tables.guilds.insert(guild.id.clone(), guild.clone());
        tables.members.insert(leader.player.clone(), leader.clone());
        Ok(())
    }

    async fn update_guild(&self, guild: &Guild) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if !tables.guilds.contains_key(&guild.id) {
            return Err(StoreError::NotFound(format!("guild {}", guild.id)));
        }
        if tables.name_taken(&guild.name, Some(&guild.id)) {
            return Err(StoreError::Conflict(format!("name '{}' taken", guild.name)));
        }
        if let Some(tag) = &guild.tag {
            if tables.tag_taken(tag, Some(&guild.id)) {
                return Err(StoreError::Conflict(format!("tag '{}' taken", tag)));
            }
        }

        if let Some(stored) = tables.guilds.get_mut(&guild.id) {
            let leader = stored.leader.clone();
            *stored = Guild {
                leader,
                ..guild.clone()
            };
        }
        Ok(())
    }

    async fn delete_guild(&self, id: &GuildId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if tables.guilds.remove(id).is_none() {
            return Err(StoreError::NotFound(format!("guild {}", id)));
        }

        tables.members.retain(|_, m| &m.guild_id != id);
        tables.applications.retain(|_, a| &a.guild_id != id);
        tables.invitations.retain(|_, i| &i.guild_id != id);

        let now = Timestamp::now();
        for relation in tables.relations.values_mut() {
            if relation.involves(id) && relation.status.is_live() {
                relation.status = RelationStatus::Cancelled;
                relation.updated_at = now;
            }
        }
        Ok(())
    }

    // ===== Members =====

    async fn member(&self, player: &PlayerId) -> StoreResult<Option<Member>> {
        Ok(self.tables.read().await.members.get(player).cloned())
    }

    async fn members_of(&self, guild: &GuildId) -> StoreResult<Vec<Member>> {
        let tables = self.tables.read().await;
        let mut members: Vec<Member> = tables
            .members
            .values()
            .filter(|m| &m.guild_id == guild)
            .cloned()
            .collect();
        members.sort_by(|a, b| b.role.cmp(&a.role).then_with(|| a.joined_at.cmp(&b.joined_at)));
        Ok(members)
    }

    async fn count_members(&self, guild: &GuildId) -> StoreResult<usize> {
        if self.failing_counts.read().await.contains(guild) {
            return Err(StoreError::Unavailable(format!("member count for {}", guild)));
        }
        Ok(self.tables.read().await.member_count(guild))
    }

    async fn add_member(&self, member: &Member) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let capacity = tables
            .guilds
            .get(&member.guild_id)
            .map(|g| g.capacity as usize)
            .ok_or_else(|| StoreError::NotFound(format!("guild {}", member.guild_id)))?;

        if tables.members.contains_key(&member.player) {
            return Err(StoreError::Conflict(format!(
                "player {} already in a guild",
                member.player
            )));
        }
        if tables.member_count(&member.guild_id) >= capacity {
            return Err(StoreError::CapacityReached);
        }

        tables.members.insert(member.player.clone(), member.clone());
        Ok(())
    }

    async fn update_members(&self, guild: &GuildId, members: &[Member]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if !tables.guilds.contains_key(guild) {
            return Err(StoreError::NotFound(format!("guild {}", guild)));
        }

        let mut roster: HashMap<PlayerId, GuildRole> = tables
            .members
            .values()
            .filter(|m| &m.guild_id == guild)
            .map(|m| (m.player.clone(), m.role))
            .collect();

        for member in members {
            match roster.get_mut(&member.player) {
                Some(role) if &member.guild_id == guild => *role = member.role,
                _ => {
                    return Err(StoreError::Conflict(format!(
                        "player {} is not a member of {}",
                        member.player, guild
                    )))
                }
            }
        }

        let leaders: Vec<&PlayerId> = roster
            .iter()
            .filter(|(_, role)| **role == GuildRole::Leader)
            .map(|(player, _)| player)
            .collect();
        if leaders.len() != 1 {
            return Err(StoreError::Conflict(format!(
                "guild {} would have {} leaders",
                guild,
                leaders.len()
            )));
        }
        let leader = leaders[0].clone();

        for member in members {
            if let Some(stored) = tables.members.get_mut(&member.player) {
                stored.role = member.role;
            }
        }
        if let Some(stored) = tables.guilds.get_mut(guild) {
            stored.leader = leader;
            stored.updated_at = Timestamp::now();
        }
        Ok(())
    }

    async fn remove_member(&self, guild: &GuildId, player: &PlayerId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.members.get(player) {
            Some(m) if &m.guild_id == guild && m.role == GuildRole::Leader => Err(
                StoreError::Conflict(format!("player {} leads {}", player, guild)),
            ),
            Some(m) if &m.guild_id == guild => {
                tables.members.remove(player);
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("member {} of {}", player, guild))),
        }
    }

    // ===== Relations =====

    async fn relation(&self, id: &RelationId) -> StoreResult<Option<Relation>> {
        Ok(self.tables.read().await.relations.get(id).cloned())
    }

    async fn relations_of(&self, guild: &GuildId) -> StoreResult<Vec<Relation>> {
        let tables = self.tables.read().await;
        let mut relations: Vec<Relation> = tables
            .relations
            .values()
            .filter(|r| r.involves(guild))
            .cloned()
            .collect();
        relations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(relations)
    }

    async fn relations_between(&self, x: &GuildId, y: &GuildId) -> StoreResult<Vec<Relation>> {
        let tables = self.tables.read().await;
        let mut relations: Vec<Relation> = tables
            .relations
            .values()
            .filter(|r| r.connects(x, y))
            .cloned()
            .collect();
        relations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(relations)
    }

    async fn create_relation(&self, relation: &Relation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let key = relation.pair_key();
        let live_exists = tables
            .relations
            .values()
            .any(|r| r.status.is_live() && r.pair_key() == key);
        if live_exists {
            return Err(StoreError::Conflict(format!(
                "live relation exists between {} and {}",
                relation.guild_a, relation.guild_b
            )));
        }

        tables.relations.insert(relation.id.clone(), relation.clone());
        Ok(())
    }

    async fn update_relation(
        &self,
        relation: &Relation,
        expected: RelationStatus,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .relations
            .get_mut(&relation.id)
            .ok_or_else(|| StoreError::NotFound(format!("relation {}", relation.id)))?;

        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "relation {} is {}, expected {}",
                relation.id,
                stored.status.as_str(),
                expected.as_str()
            )));
        }

        *stored = relation.clone();
        Ok(())
    }

    async fn delete_relation(&self, id: &RelationId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .relations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("relation {}", id)))
    }

    // ===== Applications =====

    async fn application(&self, id: &ApplicationId) -> StoreResult<Option<Application>> {
        Ok(self.tables.read().await.applications.get(id).cloned())
    }

    async fn applications_for(&self, guild: &GuildId) -> StoreResult<Vec<Application>> {
        let tables = self.tables.read().await;
        let mut apps: Vec<Application> = tables
            .applications
            .values()
            .filter(|a| &a.guild_id == guild)
            .cloned()
            .collect();
        apps.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apps)
    }

    async fn applications_by(&self, player: &PlayerId) -> StoreResult<Vec<Application>> {
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .values()
            .filter(|a| &a.applicant == player)
            .cloned()
            .collect())
    }

    async fn create_application(&self, application: &Application) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.guilds.contains_key(&application.guild_id) {
            return Err(StoreError::NotFound(format!("guild {}", application.guild_id)));
        }
        tables
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(())
    }

    async fn update_application(&self, application: &Application) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.applications.get_mut(&application.id) {
            Some(stored) => {
                *stored = application.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("application {}", application.id))),
        }
    }

    async fn delete_application(&self, id: &ApplicationId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .applications
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("application {}", id)))
    }

    // ===== Invitations =====

    async fn invitation(&self, id: &InvitationId) -> StoreResult<Option<Invitation>> {
        Ok(self.tables.read().await.invitations.get(id).cloned())
    }

    async fn invitations_for(&self, player: &PlayerId) -> StoreResult<Vec<Invitation>> {
        let tables = self.tables.read().await;
        let mut invitations: Vec<Invitation> = tables
            .invitations
            .values()
            .filter(|i| &i.target == player)
            .cloned()
            .collect();
        invitations.sort_by(|a, b| a.invited_at.cmp(&b.invited_at));
        Ok(invitations)
    }

    async fn invitations_from(&self, guild: &GuildId) -> StoreResult<Vec<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .filter(|i| &i.guild_id == guild)
            .cloned()
            .collect())
    }

    async fn create_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.guilds.contains_key(&invitation.guild_id) {
            return Err(StoreError::NotFound(format!("guild {}", invitation.guild_id)));
        }
        tables
            .invitations
            .insert(invitation.id.clone(), invitation.clone());
        Ok(())
    }

    async fn update_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.invitations.get_mut(&invitation.id) {
            Some(stored) => {
                *stored = invitation.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("invitation {}", invitation.id))),
        }
    }

    async fn delete_invitation(&self, id: &InvitationId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .invitations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("invitation {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_guild::relation::RelationType;

    async fn seeded() -> (MemoryGuildStore, Guild) {
        let store = MemoryGuildStore::new();
        let leader = PlayerId::new("alice");
        let guild = Guild::new("Wardens".into(), Some("WRD".into()), leader.clone(), 3);
        let member = Member::new(guild.id.clone(), leader, GuildRole::Leader);
        store.create_guild(&guild, &member).await.unwrap();
        (store, guild)
    }

    #[tokio::test]
    async fn test_duplicate_name_is_case_insensitive() {
        let (store, _) = seeded().await;
        let other = Guild::new("WARDENS".into(), None, PlayerId::new("bob"), 3);
        let leader = Member::new(other.id.clone(), PlayerId::new("bob"), GuildRole::Leader);

        let result = store.create_guild(&other, &leader).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let (store, guild) = seeded().await;
        for name in ["bob", "carol"] {
            let m = Member::new(guild.id.clone(), PlayerId::new(name), GuildRole::Member);
            store.add_member(&m).await.unwrap();
        }

        let extra = Member::new(guild.id.clone(), PlayerId::new("dave"), GuildRole::Member);
        assert_eq!(store.add_member(&extra).await, Err(StoreError::CapacityReached));
    }

    #[tokio::test]
    async fn test_update_members_rejects_two_leaders() {
        let (store, guild) = seeded().await;
        let bob = Member::new(guild.id.clone(), PlayerId::new("bob"), GuildRole::Member);
        store.add_member(&bob).await.unwrap();

        let result = store
            .update_members(&guild.id, &[bob.with_role(GuildRole::Leader)])
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let stored = store.member(&bob.player).await.unwrap().unwrap();
        assert_eq!(stored.role, GuildRole::Member);
    }

    #[tokio::test]
    async fn test_update_members_moves_leader_field() {
        let (store, guild) = seeded().await;
        let alice = store.member(&PlayerId::new("alice")).await.unwrap().unwrap();
        let bob = Member::new(guild.id.clone(), PlayerId::new("bob"), GuildRole::Officer);
        store.add_member(&bob).await.unwrap();

        store
            .update_members(
                &guild.id,
                &[bob.with_role(GuildRole::Leader), alice.with_role(GuildRole::Officer)],
            )
            .await
            .unwrap();

        let stored = store.guild(&guild.id).await.unwrap().unwrap();
        assert_eq!(stored.leader, bob.player);
    }

    #[tokio::test]
    async fn test_leader_cannot_be_removed() {
        let (store, guild) = seeded().await;
        let result = store.remove_member(&guild.id, &PlayerId::new("alice")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.count_members(&guild.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_live_relation_pair_is_unique() {
        let store = MemoryGuildStore::new();
        let (g1, g2) = (GuildId::new("g1"), GuildId::new("g2"));
        let first = Relation::proposed(g1.clone(), g2.clone(), RelationType::Ally, PlayerId::new("a"), None);
        store.create_relation(&first).await.unwrap();

        let reversed = Relation::proposed(g2, g1, RelationType::Enemy, PlayerId::new("b"), None);
        assert!(matches!(
            store.create_relation(&reversed).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_relation_compare_and_set() {
        let store = MemoryGuildStore::new();
        let relation = Relation::proposed(
            GuildId::new("g1"),
            GuildId::new("g2"),
            RelationType::Ally,
            PlayerId::new("a"),
            None,
        );
        store.create_relation(&relation).await.unwrap();

        let mut active = relation.clone();
        active.status = RelationStatus::Active;
        store
            .update_relation(&active, RelationStatus::Pending)
            .await
            .unwrap();

        let mut cancelled = relation.clone();
        cancelled.status = RelationStatus::Cancelled;
        let stale = store.update_relation(&cancelled, RelationStatus::Pending).await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_guild_cascades() {
        let (store, guild) = seeded().await;
        let relation = Relation::proposed(
            guild.id.clone(),
            GuildId::new("other"),
            RelationType::War,
            PlayerId::new("alice"),
            None,
        );
        store.create_relation(&relation).await.unwrap();

        store.delete_guild(&guild.id).await.unwrap();

        assert!(store.member(&PlayerId::new("alice")).await.unwrap().is_none());
        let stored = store.relation(&relation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RelationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_injected_count_failure() {
        let (store, guild) = seeded().await;
        store.fail_member_counts_for(guild.id.clone()).await;
        assert!(matches!(
            store.count_members(&guild.id).await,
            Err(StoreError::Unavailable(_))
        ));

        store.restore_member_counts_for(&guild.id).await;
        assert_eq!(store.count_members(&guild.id).await.unwrap(), 1);
    }
}
