//! Relation consistency engine
//!
//! Keeps at most one live (PENDING or ACTIVE) relation per unordered guild
//! pair. The pre-check in [`RelationEngine::propose`] reads the store, and
//! the store enforces the same rule at write time; a write-time rejection is
//! reported exactly like a failed pre-check.

use super::errors::RelationError;
use super::relation::{Relation, RelationStatus, RelationType};
use super::types::{GuildId, PlayerId, RelationId, Timestamp};
use crate::config::RelationConfig;
use crate::core_store::{GuildStore, StoreError};
use crate::metrics::{self, RELATIONS_DUPLICATE, RELATIONS_PROPOSED, RELATIONS_RESOLVED, RELATIONS_REVOKED};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome applied to a PENDING relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Active,
    Cancelled,
}

impl Resolution {
    fn status(self) -> RelationStatus {
        match self {
            Resolution::Active => RelationStatus::Active,
            Resolution::Cancelled => RelationStatus::Cancelled,
        }
    }
}

/// Result of a revoke; "already gone" is not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revocation {
    Revoked(Relation),
    AlreadyGone,
}

pub struct RelationEngine {
    store: Arc<dyn GuildStore>,
    config: RelationConfig,
}

impl RelationEngine {
    pub fn new(store: Arc<dyn GuildStore>, config: RelationConfig) -> Self {
        Self { store, config }
    }

    /// Create a PENDING relation between `guild_a` (proposing side) and `guild_b`
    pub async fn propose(
        &self,
        guild_a: &GuildId,
        guild_b: &GuildId,
        relation_type: RelationType,
        initiator: &PlayerId,
    ) -> Result<Relation, RelationError> {
        if guild_a == guild_b {
            return Err(RelationError::SelfRelation);
        }

        let now = Timestamp::now();
        for existing in self.store.relations_between(guild_a, guild_b).await? {
            if !existing.status.is_live() {
                continue;
            }
            if existing.is_live_at(now) {
                metrics::record_counter(RELATIONS_DUPLICATE, 1);
                return Err(RelationError::DuplicateRelation);
            }
            // Lapsed but still stored as live: settle it so the store's
            // uniqueness check agrees with what readers see.
            self.persist_expired(existing, now).await?;
        }

        let relation = Relation::proposed(
            guild_a.clone(),
            guild_b.clone(),
            relation_type,
            initiator.clone(),
            Some(now.plus(self.config.proposal_ttl)),
        );

        match self.store.create_relation(&relation).await {
            Ok(()) => {
                metrics::record_counter(RELATIONS_PROPOSED, 1);
                info!(
                    relation = %relation.id,
                    guild_a = %guild_a,
                    guild_b = %guild_b,
                    kind = relation_type.as_str(),
                    "Relation proposed"
                );
                Ok(relation)
            }
            Err(StoreError::Conflict(reason)) => {
                debug!(%reason, "Relation write rejected as duplicate");
                metrics::record_counter(RELATIONS_DUPLICATE, 1);
                Err(RelationError::DuplicateRelation)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move a PENDING relation to ACTIVE or CANCELLED
    pub async fn resolve(
        &self,
        id: &RelationId,
        outcome: Resolution,
    ) -> Result<Relation, RelationError> {
        let relation = self
            .store
            .relation(id)
            .await?
            .ok_or(RelationError::NotFound)?;

        let now = Timestamp::now();
        if relation.effective_status(now) != RelationStatus::Pending {
            if relation.status == RelationStatus::Pending {
                self.persist_expired(relation, now).await?;
            }
            return Err(RelationError::NotPending);
        }

        let mut updated = relation.clone();
        updated.status = outcome.status();
        updated.updated_at = now;
        updated.expires_at = match (outcome, relation.relation_type) {
            (Resolution::Active, RelationType::Truce) => {
                Some(now.plus(self.config.truce_duration))
            }
            (Resolution::Active, _) => None,
            (Resolution::Cancelled, _) => relation.expires_at,
        };

        match self
            .store
            .update_relation(&updated, RelationStatus::Pending)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(RelationError::NotPending),
            Err(StoreError::NotFound(_)) => return Err(RelationError::NotFound),
            Err(e) => return Err(e.into()),
        }

        metrics::record_counter(RELATIONS_RESOLVED, 1);
        info!(relation = %id, status = updated.status.as_str(), "Relation resolved");
        Ok(updated)
    }

    /// Resolve on behalf of one side. Only the receiving guild may accept;
    /// either side may cancel a proposal.
    pub async fn answer(
        &self,
        guild: &GuildId,
        id: &RelationId,
        outcome: Resolution,
    ) -> Result<Relation, RelationError> {
        let relation = self
            .store
            .relation(id)
            .await?
            .filter(|r| r.involves(guild))
            .ok_or(RelationError::NotFound)?;

        if outcome == Resolution::Active && &relation.guild_a == guild {
            return Err(RelationError::NotAuthorized);
        }
        self.resolve(id, outcome).await
    }

    /// Cancel a PENDING or ACTIVE relation
    pub async fn revoke(&self, id: &RelationId) -> Result<Revocation, RelationError> {
        // Statuses only move forward, so a conflicting write can happen at
        // most twice (PENDING -> ACTIVE -> terminal).
        for _ in 0..3 {
            let relation = match self.store.relation(id).await? {
                Some(r) => r,
                None => return Ok(Revocation::AlreadyGone),
            };

            let now = Timestamp::now();
            if !relation.is_live_at(now) {
                if relation.status.is_live() {
                    self.persist_expired(relation, now).await?;
                }
                return Ok(Revocation::AlreadyGone);
            }

            let expected = relation.status;
            let mut cancelled = relation;
            cancelled.status = RelationStatus::Cancelled;
            cancelled.updated_at = now;

            match self.store.update_relation(&cancelled, expected).await {
                Ok(()) => {
                    metrics::record_counter(RELATIONS_REVOKED, 1);
                    info!(relation = %id, "Relation revoked");
                    return Ok(Revocation::Revoked(cancelled));
                }
                Err(StoreError::Conflict(_)) => continue,
                Err(StoreError::NotFound(_)) => return Ok(Revocation::AlreadyGone),
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict(format!("relation {} kept changing", id)).into())
    }

    /// Propose, then activate immediately when the type needs no consent
    pub async fn declare(
        &self,
        guild_a: &GuildId,
        guild_b: &GuildId,
        relation_type: RelationType,
        initiator: &PlayerId,
    ) -> Result<Relation, RelationError> {
        let relation = self
            .propose(guild_a, guild_b, relation_type, initiator)
            .await?;
        if relation_type.requires_consent() {
            return Ok(relation);
        }
        self.resolve(&relation.id, Resolution::Active).await
    }

    /// Replace a live relation with one of a new type.
    ///
    /// The old relation is revoked before the new one is proposed, so the
    /// pair never has two live relations. The initiator must belong to one
    /// of the two guilds; theirs becomes the proposing side.
    pub async fn transition(
        &self,
        id: &RelationId,
        new_type: RelationType,
        initiator: &PlayerId,
    ) -> Result<Relation, RelationError> {
        let old = self
            .store
            .relation(id)
            .await?
            .filter(|r| r.is_live_at(Timestamp::now()))
            .ok_or(RelationError::NotFound)?;

        let mine = self
            .store
            .member(initiator)
            .await?
            .map(|m| m.guild_id)
            .filter(|g| old.involves(g))
            .ok_or(RelationError::NotAuthorized)?;
        let other = if old.guild_a == mine {
            old.guild_b.clone()
        } else {
            old.guild_a.clone()
        };

        // Someone else ended it between the read and the revoke
        if let Revocation::AlreadyGone = self.revoke(id).await? {
            return Err(RelationError::NotFound);
        }
        self.declare(&mine, &other, new_type, initiator).await
    }

    /// The live relation between two guilds, looked up in either order
    pub async fn relation_for(
        &self,
        x: &GuildId,
        y: &GuildId,
    ) -> Result<Option<Relation>, RelationError> {
        let now = Timestamp::now();
        Ok(self
            .store
            .relations_between(x, y)
            .await?
            .into_iter()
            .find(|r| r.is_live_at(now)))
    }

    /// Live relations of `guild`, with lapsed ones filtered out
    pub async fn relations_of(&self, guild: &GuildId) -> Result<Vec<Relation>, RelationError> {
        let now = Timestamp::now();
        Ok(self
            .store
            .relations_of(guild)
            .await?
            .into_iter()
            .filter(|r| r.is_live_at(now))
            .collect())
    }

    async fn persist_expired(&self, relation: Relation, now: Timestamp) -> Result<(), RelationError> {
        let expected = relation.status;
        let mut expired = relation;
        expired.status = RelationStatus::Expired;
        expired.updated_at = now;

        match self.store.update_relation(&expired, expected).await {
            // Someone else already moved it on
            Ok(()) | Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {
                debug!(relation = %expired.id, "Lapsed relation marked expired");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_guild::guild::{Guild, Member};
    use crate::core_guild::recruit::{Application, Invitation};
    use crate::core_guild::types::{ApplicationId, InvitationId};
    use crate::core_store::{MemoryGuildStore, StoreResult};
    use crate::test_utils::TestGuildBuilder;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Pair lookups read a snapshot taken before another writer landed;
    /// every other call, writes included, hits the real tables.
    struct StaleReads(Arc<MemoryGuildStore>);

    #[async_trait]
    impl GuildStore for StaleReads {
        async fn guild(&self, id: &GuildId) -> StoreResult<Option<Guild>> {
            self.0.guild(id).await
        }
        async fn guild_by_name(&self, name: &str) -> StoreResult<Option<Guild>> {
            self.0.guild_by_name(name).await
        }
        async fn guild_by_tag(&self, tag: &str) -> StoreResult<Option<Guild>> {
            self.0.guild_by_tag(tag).await
        }
        async fn list_guilds(&self, offset: usize, limit: usize) -> StoreResult<Vec<Guild>> {
            self.0.list_guilds(offset, limit).await
        }
        async fn count_guilds(&self) -> StoreResult<usize> {
            self.0.count_guilds().await
        }
        async fn create_guild(&self, guild: &Guild, leader: &Member) -> StoreResult<()> {
            self.0.create_guild(guild, leader).await
        }
        async fn update_guild(&self, guild: &Guild) -> StoreResult<()> {
            self.0.update_guild(guild).await
        }
        async fn delete_guild(&self, id: &GuildId) -> StoreResult<()> {
            self.0.delete_guild(id).await
        }
        async fn member(&self, player: &PlayerId) -> StoreResult<Option<Member>> {
            self.0.member(player).await
        }
        async fn members_of(&self, guild: &GuildId) -> StoreResult<Vec<Member>> {
            self.0.members_of(guild).await
        }
        async fn count_members(&self, guild: &GuildId) -> StoreResult<usize> {
            self.0.count_members(guild).await
        }
        async fn add_member(&self, member: &Member) -> StoreResult<()> {
            self.0.add_member(member).await
        }
        async fn update_members(&self, guild: &GuildId, members: &[Member]) -> StoreResult<()> {
            self.0.update_members(guild, members).await
        }
        async fn remove_member(&self, guild: &GuildId, player: &PlayerId) -> StoreResult<()> {
            self.0.remove_member(guild, player).await
        }
        async fn relation(&self, id: &RelationId) -> StoreResult<Option<Relation>> {
            self.0.relation(id).await
        }
        async fn relations_of(&self, guild: &GuildId) -> StoreResult<Vec<Relation>> {
            self.0.relations_of(guild).await
        }
        async fn relations_between(&self, _x: &GuildId, _y: &GuildId) -> StoreResult<Vec<Relation>> {
            Ok(Vec::new())
        }
        async fn create_relation(&self, relation: &Relation) -> StoreResult<()> {
            self.0.create_relation(relation).await
        }
        async fn update_relation(&self, relation: &Relation, expected: RelationStatus) -> StoreResult<()> {
            self.0.update_relation(relation, expected).await
        }
        async fn delete_relation(&self, id: &RelationId) -> StoreResult<()> {
            self.0.delete_relation(id).await
        }
        async fn application(&self, id: &ApplicationId) -> StoreResult<Option<Application>> {
            self.0.application(id).await
        }
        async fn applications_for(&self, guild: &GuildId) -> StoreResult<Vec<Application>> {
            self.0.applications_for(guild).await
        }
        async fn applications_by(&self, player: &PlayerId) -> StoreResult<Vec<Application>> {
            self.0.applications_by(player).await
        }
        async fn create_application(&self, application: &Application) -> StoreResult<()> {
            self.0.create_application(application).await
        }
        async fn update_application(&self, application: &Application) -> StoreResult<()> {
            self.0.update_application(application).await
        }
        async fn delete_application(&self, id: &ApplicationId) -> StoreResult<()> {
            self.0.delete_application(id).await
        }
        async fn invitation(&self, id: &InvitationId) -> StoreResult<Option<Invitation>> {
            self.0.invitation(id).await
        }
        async fn invitations_for(&self, player: &PlayerId) -> StoreResult<Vec<Invitation>> {
            self.0.invitations_for(player).await
        }
        async fn invitations_from(&self, guild: &GuildId) -> StoreResult<Vec<Invitation>> {
            self.0.invitations_from(guild).await
        }
        async fn create_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
            self.0.create_invitation(invitation).await
        }
        async fn update_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
            self.0.update_invitation(invitation).await
        }
        async fn delete_invitation(&self, id: &InvitationId) -> StoreResult<()> {
            self.0.delete_invitation(id).await
        }
    }

    fn engine() -> (RelationEngine, Arc<MemoryGuildStore>) {
        let store = Arc::new(MemoryGuildStore::new());
        let engine = RelationEngine::new(store.clone(), RelationConfig::default());
        (engine, store)
    }

    fn ids() -> (GuildId, GuildId, PlayerId) {
        (GuildId::new("g1"), GuildId::new("g2"), PlayerId::new("x"))
    }

    #[tokio::test]
    async fn test_self_relation_rejected() {
        let (engine, _) = engine();
        let (g1, _, x) = ids();
        assert_eq!(
            engine.propose(&g1, &g1, RelationType::Ally, &x).await,
            Err(RelationError::SelfRelation)
        );
    }

    #[tokio::test]
    async fn test_write_time_conflict_reported_as_duplicate() {
        let (fresh, store) = engine();
        let (g1, g2, x) = ids();
        let first = fresh.propose(&g1, &g2, RelationType::Ally, &x).await.unwrap();

        // The pre-check misses the live relation; the store's own rule catches it
        let racing = RelationEngine::new(Arc::new(StaleReads(store.clone())), RelationConfig::default());
        assert_eq!(
            racing.propose(&g2, &g1, RelationType::Enemy, &x).await,
            Err(RelationError::DuplicateRelation)
        );

        let between = store.relations_between(&g1, &g2).await.unwrap();
        assert_eq!(between, vec![first]);
    }

    #[tokio::test]
    async fn test_duplicate_in_either_order() {
        let (engine, _) = engine();
        let (g1, g2, x) = ids();

        let first = engine.propose(&g1, &g2, RelationType::Ally, &x).await.unwrap();
        assert_eq!(first.status, RelationStatus::Pending);
        assert!(first.expires_at.is_some());

        let second = engine
            .propose(&g2, &g1, RelationType::Enemy, &PlayerId::new("y"))
            .await;
        assert_eq!(second, Err(RelationError::DuplicateRelation));
    }

    #[tokio::test]
    async fn test_resolve_only_pending() {
        let (engine, _) = engine();
        let (g1, g2, x) = ids();
        let relation = engine.propose(&g1, &g2, RelationType::Ally, &x).await.unwrap();

        let active = engine.resolve(&relation.id, Resolution::Active).await.unwrap();
        assert_eq!(active.status, RelationStatus::Active);
        assert_eq!(active.expires_at, None);

        assert_eq!(
            engine.resolve(&relation.id, Resolution::Cancelled).await,
            Err(RelationError::NotPending)
        );
    }

    #[tokio::test]
    async fn test_accepted_truce_gets_duration() {
        let (engine, _) = engine();
        let (g1, g2, x) = ids();
        let relation = engine.propose(&g1, &g2, RelationType::Truce, &x).await.unwrap();

        let before = Timestamp::now();
        let active = engine.resolve(&relation.id, Resolution::Active).await.unwrap();
        let expires_at = active.expires_at.unwrap();
        assert!(expires_at >= before.plus(Duration::from_secs(72 * 3600)));
    }

    #[tokio::test]
    async fn test_only_receiving_side_accepts() {
        let (engine, _) = engine();
        let (g1, g2, x) = ids();
        let relation = engine.propose(&g1, &g2, RelationType::Ally, &x).await.unwrap();

        assert_eq!(
            engine.answer(&g1, &relation.id, Resolution::Active).await,
            Err(RelationError::NotAuthorized)
        );
        assert_eq!(
            engine.answer(&GuildId::new("g3"), &relation.id, Resolution::Cancelled).await,
            Err(RelationError::NotFound)
        );
        let accepted = engine.answer(&g2, &relation.id, Resolution::Active).await.unwrap();
        assert_eq!(accepted.status, RelationStatus::Active);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (engine, _) = engine();
        let (g1, g2, x) = ids();
        let relation = engine.declare(&g1, &g2, RelationType::War, &x).await.unwrap();
        assert_eq!(relation.status, RelationStatus::Active);

        let first = engine.revoke(&relation.id).await.unwrap();
        assert!(matches!(first, Revocation::Revoked(ref r) if r.status == RelationStatus::Cancelled));
        assert_eq!(engine.revoke(&relation.id).await.unwrap(), Revocation::AlreadyGone);
        assert_eq!(
            engine.revoke(&RelationId::new("missing")).await.unwrap(),
            Revocation::AlreadyGone
        );
    }

    /// Three real guilds, so transitions can resolve the initiator's side
    async fn guilds(store: &MemoryGuildStore) -> Vec<Guild> {
        let mut out = Vec::new();
        for name in ["North", "South", "East"] {
            out.push(TestGuildBuilder::new(name).create(store).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_transition_replaces_relation() {
        let (engine, store) = engine();
        let g = guilds(&store).await;
        let war = engine
            .declare(&g[0].id, &g[1].id, RelationType::War, &g[0].leader)
            .await
            .unwrap();

        // Initiated from the receiving side, which becomes guild_a
        let truce = engine
            .transition(&war.id, RelationType::Truce, &g[1].leader)
            .await
            .unwrap();
        assert_eq!(truce.status, RelationStatus::Pending);
        assert_eq!(truce.relation_type, RelationType::Truce);
        assert_eq!(truce.guild_a, g[1].id);
        assert_eq!(truce.initiator, g[1].leader);

        let live = engine.relations_of(&g[0].id).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, truce.id);
    }

    #[tokio::test]
    async fn test_transition_of_ended_relation_fails() {
        let (engine, store) = engine();
        let g = guilds(&store).await;
        let war = engine
            .declare(&g[0].id, &g[1].id, RelationType::War, &g[0].leader)
            .await
            .unwrap();
        engine.revoke(&war.id).await.unwrap();

        assert_eq!(
            engine.transition(&war.id, RelationType::Truce, &g[0].leader).await,
            Err(RelationError::NotFound)
        );
        assert!(engine.relation_for(&g[0].id, &g[1].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_by_outside_guild_rejected() {
        let (engine, store) = engine();
        let g = guilds(&store).await;
        let enemy = engine
            .declare(&g[0].id, &g[1].id, RelationType::Enemy, &g[0].leader)
            .await
            .unwrap();

        assert_eq!(
            engine.transition(&enemy.id, RelationType::War, &g[2].leader).await,
            Err(RelationError::NotAuthorized)
        );
        assert_eq!(
            engine.transition(&enemy.id, RelationType::War, &PlayerId::new("drifter")).await,
            Err(RelationError::NotAuthorized)
        );
        let still = engine.relation_for(&g[0].id, &g[1].id).await.unwrap().unwrap();
        assert_eq!(still.id, enemy.id);
        assert_eq!(still.relation_type, RelationType::Enemy);
    }

    #[tokio::test]
    async fn test_symmetric_lookup() {
        let (engine, _) = engine();
        let (g1, g2, x) = ids();
        engine.propose(&g1, &g2, RelationType::Ally, &x).await.unwrap();

        let forward = engine.relation_for(&g1, &g2).await.unwrap();
        let backward = engine.relation_for(&g2, &g1).await.unwrap();
        assert!(forward.is_some());
        assert_eq!(forward, backward);
    }

    #[tokio::test]
    async fn test_lapsed_relation_does_not_block_new_proposal() {
        let (engine, store) = engine();
        let (g1, g2, x) = ids();

        let stale = Relation::proposed(
            g1.clone(),
            g2.clone(),
            RelationType::Ally,
            x.clone(),
            Some(Timestamp::from_millis(1)),
        );
        store.create_relation(&stale).await.unwrap();
        assert!(engine.relation_for(&g1, &g2).await.unwrap().is_none());

        let fresh = engine.propose(&g2, &g1, RelationType::Enemy, &x).await.unwrap();
        assert_eq!(fresh.status, RelationStatus::Pending);

        let settled = store.relation(&stale.id).await.unwrap().unwrap();
        assert_eq!(settled.status, RelationStatus::Expired);
    }

    #[tokio::test]
    async fn test_resolving_lapsed_proposal_fails() {
        let (engine, store) = engine();
        let (g1, g2, x) = ids();
        let stale = Relation::proposed(g1, g2, RelationType::Ally, x, Some(Timestamp::from_millis(1)));
        store.create_relation(&stale).await.unwrap();

        assert_eq!(
            engine.resolve(&stale.id, Resolution::Active).await,
            Err(RelationError::NotPending)
        );
    }
}
