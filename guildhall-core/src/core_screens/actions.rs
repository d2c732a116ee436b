//! Multi-engine operations shared by screens and the command surface

use crate::core_guild::errors::{
    FailureKind, GuildError, MembershipError, RecruitmentError, RelationError, UserFacing,
};
use crate::core_guild::guild::GuildRole;
use crate::core_guild::membership::Departure;
use crate::core_guild::relation::{Relation, RelationStatus, RelationType};
use crate::core_guild::relations::{Resolution, Revocation};
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::{GuildId, PlayerId, RelationId};
use crate::core_session::pending::{ActionTarget, ConfirmError};
use crate::core_store::StoreError;
use thiserror::Error;
use tracing::info;

/// Any failure an action can end with
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Guild(#[from] GuildError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Recruitment(#[from] RecruitmentError),

    #[error(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    Confirm(#[from] ConfirmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFacing for ActionError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            ActionError::Guild(e) => e.failure_kind(),
            ActionError::Membership(e) => e.failure_kind(),
            ActionError::Recruitment(e) => e.failure_kind(),
            ActionError::Relation(e) => e.failure_kind(),
            ActionError::Confirm(e) => e.failure_kind(),
            ActionError::Store(e) => e.failure_kind(),
        }
    }

    fn describe(&self) -> String {
        match self {
            ActionError::Guild(e) => e.describe(),
            ActionError::Membership(e) => e.describe(),
            ActionError::Recruitment(e) => e.describe(),
            ActionError::Relation(e) => e.describe(),
            ActionError::Confirm(e) => e.describe(),
            ActionError::Store(e) => e.describe(),
        }
    }
}

/// Carry out a destructive action the player has just confirmed.
/// Returns the message to show them.
pub async fn perform(
    services: &GuildServices,
    actor: &PlayerId,
    target: &ActionTarget,
) -> Result<String, ActionError> {
    match target {
        ActionTarget::DisbandGuild(guild_id) => {
            match services.guilds.guild_of(actor).await? {
                Some(guild) if &guild.id == guild_id => {}
                _ => return Err(GuildError::NotInGuild.into()),
            }
            let guild = services.guilds.disband(actor).await?;
            Ok(format!("{} has been disbanded.", guild.name))
        }
        ActionTarget::KickMember(player) => match services.membership.remove(actor, player).await? {
            Departure::Kicked(member) => Ok(format!("{} was removed from the guild.", member.player)),
            Departure::Left(_) => Ok("You left the guild.".to_string()),
        },
        ActionTarget::LeaveGuild(guild_id) => {
            let member = services.membership.member(actor).await?;
            if &member.guild_id != guild_id {
                return Err(MembershipError::NotMember.into());
            }
            services.membership.remove(actor, actor).await?;
            Ok("You left the guild.".to_string())
        }
        ActionTarget::RevokeRelation(id) => {
            let member = services
                .membership
                .require_role(actor, GuildRole::Officer)
                .await?;
            ensure_involved(services, &member.guild_id, id).await?;
            match services.relations.revoke(id).await? {
                Revocation::Revoked(relation) => Ok(format!(
                    "The {} relation has ended.",
                    relation.relation_type.as_str().to_lowercase()
                )),
                Revocation::AlreadyGone => Ok("That relation had already ended.".to_string()),
            }
        }
    }
}

/// Move the actor's guild towards `relation_type` with the guild named `other`.
///
/// Accepts a matching incoming proposal, replaces a relation of another type,
/// or declares/proposes a new one depending on whether the type needs consent.
pub async fn set_relation(
    services: &GuildServices,
    actor: &PlayerId,
    other: &str,
    relation_type: RelationType,
) -> Result<Relation, ActionError> {
    let member = services
        .membership
        .require_role(actor, GuildRole::Officer)
        .await?;
    let mine = member.guild_id;
    let target = services.guilds.find(other).await?;
    let relations = &services.relations;

    let relation = match relations.relation_for(&mine, &target.id).await? {
        Some(existing)
            if existing.status == RelationStatus::Pending
                && existing.guild_b == mine
                && existing.relation_type == relation_type =>
        {
            relations
                .answer(&mine, &existing.id, Resolution::Active)
                .await?
        }
        Some(existing) if existing.relation_type == relation_type => {
            return Err(RelationError::DuplicateRelation.into());
        }
        Some(existing) => relations.transition(&existing.id, relation_type, actor).await?,
        None if relation_type == RelationType::Neutral => {
            return Err(RelationError::NotFound.into());
        }
        None => relations.declare(&mine, &target.id, relation_type, actor).await?,
    };

    info!(
        actor = %actor,
        other = %target.name,
        relation_type = relation_type.as_str(),
        status = relation.status.as_str(),
        "Relation changed"
    );
    Ok(relation)
}

/// Accept or turn down a proposal on behalf of the actor's guild
pub async fn answer_relation(
    services: &GuildServices,
    actor: &PlayerId,
    id: &RelationId,
    outcome: Resolution,
) -> Result<Relation, ActionError> {
    let member = services
        .membership
        .require_role(actor, GuildRole::Officer)
        .await?;
    Ok(services.relations.answer(&member.guild_id, id, outcome).await?)
}

/// Replace a relation of the actor's guild with one of `new_type`
pub async fn shift_relation(
    services: &GuildServices,
    actor: &PlayerId,
    id: &RelationId,
    new_type: RelationType,
) -> Result<Relation, ActionError> {
    let member = services
        .membership
        .require_role(actor, GuildRole::Officer)
        .await?;
    ensure_involved(services, &member.guild_id, id).await?;
    Ok(services.relations.transition(id, new_type, actor).await?)
}

async fn ensure_involved(
    services: &GuildServices,
    guild: &GuildId,
    id: &RelationId,
) -> Result<(), ActionError> {
    let involved = services
        .store
        .relation(id)
        .await?
        .map(|r| r.involves(guild))
        .unwrap_or(false);
    if !involved {
        return Err(RelationError::NotFound.into());
    }
    Ok(())
}

/// Player-facing summary of a relation change
pub fn describe_relation(relation: &Relation, other_name: &str) -> String {
    let kind = relation.relation_type.as_str().to_lowercase();
    match relation.status {
        RelationStatus::Pending => format!("Proposed {} to {}.", kind, other_name),
        RelationStatus::Active => format!("Your guild is now {} with {}.", kind, other_name),
        _ => format!("The {} relation with {} is over.", kind, other_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{seeded_services, Seeded};

    #[tokio::test]
    async fn test_perform_disband_checks_guild() {
        let Seeded { services, alpha, .. } = seeded_services().await;
        let other = ActionTarget::DisbandGuild(GuildId::new("elsewhere"));

        let err = perform(&services, &alpha.leader, &other).await.unwrap_err();
        assert_eq!(err, ActionError::Guild(GuildError::NotInGuild));

        let msg = perform(&services, &alpha.leader, &ActionTarget::DisbandGuild(alpha.guild.id.clone()))
            .await
            .unwrap();
        assert!(msg.contains("disbanded"));
        assert!(services.guilds.guild_of(&alpha.leader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_relation_accepts_incoming_proposal() {
        let Seeded {
            services,
            alpha,
            beta,
            ..
        } = seeded_services().await;

        let proposed = set_relation(&services, &alpha.leader, &beta.guild.name, RelationType::Ally)
            .await
            .unwrap();
        assert_eq!(proposed.status, RelationStatus::Pending);

        let accepted = set_relation(&services, &beta.leader, &alpha.guild.name, RelationType::Ally)
            .await
            .unwrap();
        assert_eq!(accepted.id, proposed.id);
        assert_eq!(accepted.status, RelationStatus::Active);

        let again = set_relation(&services, &alpha.leader, &beta.guild.name, RelationType::Ally).await;
        assert_eq!(
            again.unwrap_err(),
            ActionError::Relation(RelationError::DuplicateRelation)
        );
    }

    #[tokio::test]
    async fn test_set_relation_war_then_truce() {
        let Seeded {
            services,
            alpha,
            beta,
            ..
        } = seeded_services().await;

        let war = set_relation(&services, &alpha.leader, &beta.guild.name, RelationType::War)
            .await
            .unwrap();
        assert_eq!(war.status, RelationStatus::Active);

        let truce = set_relation(&services, &beta.leader, &alpha.guild.name, RelationType::Truce)
            .await
            .unwrap();
        assert_eq!(truce.status, RelationStatus::Pending);
        assert_eq!(truce.guild_a, beta.guild.id);

        let live = services
            .relations
            .relations_of(&alpha.guild.id)
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].relation_type, RelationType::Truce);
    }

    #[tokio::test]
    async fn test_members_cannot_change_relations() {
        let Seeded {
            services,
            alpha,
            beta,
            ..
        } = seeded_services().await;

        let err = set_relation(&services, &alpha.member, &beta.guild.name, RelationType::Enemy)
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Invariant);
        assert_eq!(
            err,
            ActionError::Membership(MembershipError::NotAuthorized)
        );
    }
}
