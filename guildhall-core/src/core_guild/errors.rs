//! Domain errors and their user-facing rendering
//!
//! Engines never panic across the async boundary: every operation resolves
//! to `Ok` or one of these typed reasons, and the presentation side decides
//! what the player sees through [`UserFacing`].

use crate::core_store::StoreError;
use thiserror::Error;

/// Message shown for every facade failure
pub const RETRY_MESSAGE: &str = "Something went wrong, please try again.";

/// Broad error category, which decides how a failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad input shape, rejected before any state change
    Validation,
    /// A domain rule refused the operation
    Invariant,
    /// The data access layer failed; logged, player told to retry
    Facade,
}

/// Errors that can be shown to the acting player
pub trait UserFacing {
    fn failure_kind(&self) -> FailureKind;

    /// Specific message for the player
    fn describe(&self) -> String;

    /// What the player actually sees
    fn user_message(&self) -> String {
        match self.failure_kind() {
            FailureKind::Facade => RETRY_MESSAGE.to_string(),
            _ => self.describe(),
        }
    }
}

impl UserFacing for StoreError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Facade
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Guild lifecycle errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuildError {
    #[error("Invalid guild name: {0}")]
    InvalidName(String),

    #[error("Invalid guild tag: {0}")]
    InvalidTag(String),

    #[error("Invalid description: {0}")]
    InvalidDescription(String),

    #[error("A guild named '{0}' already exists")]
    NameTaken(String),

    #[error("The tag '{0}' is already in use")]
    TagTaken(String),

    #[error("You are already in a guild")]
    AlreadyInGuild,

    #[error("You are not in a guild")]
    NotInGuild,

    #[error("You do not have permission to do that")]
    NotAuthorized,

    #[error("Guild not found")]
    GuildNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFacing for GuildError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            GuildError::InvalidName(_)
            | GuildError::InvalidTag(_)
            | GuildError::InvalidDescription(_) => FailureKind::Validation,
            GuildError::Store(_) => FailureKind::Facade,
            _ => FailureKind::Invariant,
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Role state machine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MembershipError {
    #[error("That player is not a member of your guild")]
    NotMember,

    #[error("You do not have permission to do that")]
    NotAuthorized,

    #[error("That player already holds the highest promotable rank")]
    AlreadyHighest,

    #[error("That player already holds the lowest rank")]
    AlreadyLowest,

    #[error("The guild leader cannot be demoted")]
    CannotDemoteLeader,

    #[error("The guild leader cannot leave or be removed; transfer leadership or disband")]
    CannotRemoveLeader,

    #[error("The guild is frozen")]
    GuildFrozen,

    #[error("The guild changed while you were editing it; please retry")]
    ConcurrentModification,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFacing for MembershipError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            MembershipError::Store(_) => FailureKind::Facade,
            _ => FailureKind::Invariant,
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Invitation and application errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecruitmentError {
    #[error("Message is too long (max {0} characters)")]
    MessageTooLong(usize),

    #[error("You are not in a guild")]
    NotInGuild,

    #[error("You do not have permission to recruit")]
    NotAuthorized,

    #[error("That player is already in a guild")]
    AlreadyInGuild,

    #[error("That player already has a pending invitation from this guild")]
    AlreadyInvited,

    #[error("You already have a pending application to this guild")]
    AlreadyApplied,

    #[error("Invitation not found")]
    InvitationNotFound,

    #[error("That invitation has expired")]
    InvitationExpired,

    #[error("Application not found")]
    ApplicationNotFound,

    #[error("That request has already been decided")]
    NotPending,

    #[error("The guild is full")]
    GuildFull,

    #[error("The guild is frozen")]
    GuildFrozen,

    #[error("Guild not found")]
    GuildNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFacing for RecruitmentError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            RecruitmentError::MessageTooLong(_) => FailureKind::Validation,
            RecruitmentError::Store(_) => FailureKind::Facade,
            _ => FailureKind::Invariant,
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Relation engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationError {
    #[error("A guild cannot have a relation with itself")]
    SelfRelation,

    #[error("These guilds already have an open relation")]
    DuplicateRelation,

    #[error("That relation is no longer pending")]
    NotPending,

    #[error("Relation not found")]
    NotFound,

    #[error("Only the other guild can accept this proposal")]
    NotAuthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFacing for RelationError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            RelationError::Store(_) => FailureKind::Facade,
            _ => FailureKind::Invariant,
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}
