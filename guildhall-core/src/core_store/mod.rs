//! Data access facade
//!
//! The system of record for guilds, members, relations, applications and
//! invitations. Everything above this layer talks to a `GuildStore` through
//! async calls and treats it as the only source of truth.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryGuildStore`]: lock-guarded tables, used by tests and the console
//! - [`SqlGuildStore`]: SQLite through an r2d2 pool, every call on a blocking worker
//!
//! Both enforce the same write-time rules so the engines can treat a
//! `StoreError::Conflict` identically regardless of backend.

use crate::core_guild::guild::{Guild, Member};
use crate::core_guild::recruit::{Application, Invitation};
use crate::core_guild::relation::{Relation, RelationStatus};
use crate::core_guild::types::{ApplicationId, GuildId, InvitationId, PlayerId, RelationId};
use async_trait::async_trait;

pub mod memory_store;
pub mod migrations;
pub mod sql_store;

pub use memory_store::MemoryGuildStore;
pub use sql_store::SqlGuildStore;

/// Facade failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Guild is at capacity")]
    CapacityReached,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Async CRUD contract for every entity family.
///
/// Implementations must make each individual call atomic. The multi-record
/// writes (`create_guild`, `update_members`, `delete_guild`) are atomic as a
/// whole: no concurrent reader may observe a partially applied call.
#[async_trait]
pub trait GuildStore: Send + Sync {
    // ===== Guilds =====

    async fn guild(&self, id: &GuildId) -> StoreResult<Option<Guild>>;

    /// Case-insensitive lookup by display name
    async fn guild_by_name(&self, name: &str) -> StoreResult<Option<Guild>>;

    /// Case-insensitive lookup by tag
    async fn guild_by_tag(&self, tag: &str) -> StoreResult<Option<Guild>>;

    /// Guilds ordered by name, one page at a time
    async fn list_guilds(&self, offset: usize, limit: usize) -> StoreResult<Vec<Guild>>;

    async fn count_guilds(&self) -> StoreResult<usize>;

    /// Insert a guild together with its founding leader.
    ///
    /// Fails with `Conflict` on a duplicate name or tag, or if the leader
    /// already belongs to a guild.
    async fn create_guild(&self, guild: &Guild, leader: &Member) -> StoreResult<()>;

    /// Update guild metadata. The leader field is owned by `update_members`.
    async fn update_guild(&self, guild: &Guild) -> StoreResult<()>;

    /// Remove a guild with its members, applications and invitations, and
    /// cancel its live relations.
    async fn delete_guild(&self, id: &GuildId) -> StoreResult<()>;

    // ===== Members =====

    /// The membership of `player`, if any; a player belongs to at most one guild
    async fn member(&self, player: &PlayerId) -> StoreResult<Option<Member>>;

    async fn members_of(&self, guild: &GuildId) -> StoreResult<Vec<Member>>;

    async fn count_members(&self, guild: &GuildId) -> StoreResult<usize>;

    /// Fails with `Conflict` if the player already has a guild and with
    /// `CapacityReached` if the guild is full.
    async fn add_member(&self, member: &Member) -> StoreResult<()>;

    /// Apply several role changes as one step.
    ///
    /// The guild's leader field follows whichever member ends up LEADER. Fails
    /// with `Conflict` if the guild would not have exactly one LEADER afterwards,
    /// or if any member no longer belongs to `guild`.
    async fn update_members(&self, guild: &GuildId, members: &[Member]) -> StoreResult<()>;

    /// Fails with `Conflict` if `player` currently holds LEADER
    async fn remove_member(&self, guild: &GuildId, player: &PlayerId) -> StoreResult<()>;

    // ===== Relations =====

    async fn relation(&self, id: &RelationId) -> StoreResult<Option<Relation>>;

    /// Every relation, in any status, that involves `guild`
    async fn relations_of(&self, guild: &GuildId) -> StoreResult<Vec<Relation>>;

    /// Every relation, in any status, between `x` and `y` in either order
    async fn relations_between(&self, x: &GuildId, y: &GuildId) -> StoreResult<Vec<Relation>>;

    /// Fails with `Conflict` if the unordered pair already has a stored
    /// PENDING or ACTIVE relation.
    async fn create_relation(&self, relation: &Relation) -> StoreResult<()>;

    /// Compare-and-set: writes `relation` only if the stored status is still
    /// `expected`, otherwise fails with `Conflict`.
    async fn update_relation(&self, relation: &Relation, expected: RelationStatus)
        -> StoreResult<()>;

    async fn delete_relation(&self, id: &RelationId) -> StoreResult<()>;

    // ===== Applications =====

    async fn application(&self, id: &ApplicationId) -> StoreResult<Option<Application>>;

    async fn applications_for(&self, guild: &GuildId) -> StoreResult<Vec<Application>>;

    async fn applications_by(&self, player: &PlayerId) -> StoreResult<Vec<Application>>;

    async fn create_application(&self, application: &Application) -> StoreResult<()>;

    async fn update_application(&self, application: &Application) -> StoreResult<()>;

    async fn delete_application(&self, id: &ApplicationId) -> StoreResult<()>;

    // ===== Invitations =====

    async fn invitation(&self, id: &InvitationId) -> StoreResult<Option<Invitation>>;

    async fn invitations_for(&self, player: &PlayerId) -> StoreResult<Vec<Invitation>>;

    async fn invitations_from(&self, guild: &GuildId) -> StoreResult<Vec<Invitation>>;

    async fn create_invitation(&self, invitation: &Invitation) -> StoreResult<()>;

    async fn update_invitation(&self, invitation: &Invitation) -> StoreResult<()>;

    async fn delete_invitation(&self, id: &InvitationId) -> StoreResult<()>;
}
