//! Guild domain
//!
//! Entities (guilds, members, relations, applications, invitations) and the
//! engines that enforce their rules on top of a `GuildStore`:
//!
//! - [`GuildManager`]: creation, metadata, freeze, disband
//! - [`MembershipEngine`]: role state machine and the single-leader rule
//! - [`RecruitmentManager`]: invitations and applications
//! - [`RelationEngine`]: one live relation per guild pair

pub mod directory;
pub mod errors;
pub mod guild;
pub mod manager;
pub mod membership;
pub mod recruit;
pub mod recruitment;
pub mod relation;
pub mod relations;
pub mod services;
pub mod types;

pub use directory::{guild_summaries, GuildSummary};
pub use errors::{
    FailureKind, GuildError, MembershipError, RecruitmentError, RelationError, UserFacing,
};
pub use guild::{Guild, GuildRole, Member};
pub use manager::GuildManager;
pub use membership::{Departure, MembershipEngine};
pub use recruit::{Application, ApplicationStatus, Invitation, InvitationStatus};
pub use recruitment::RecruitmentManager;
pub use relation::{Relation, RelationStatus, RelationType};
pub use relations::{RelationEngine, Resolution, Revocation};
pub use services::GuildServices;
pub use types::{ApplicationId, GuildId, InvitationId, PlayerId, RelationId, Timestamp};
