//! Diplomatic relations between pairs of guilds

use super::types::{GuildId, PlayerId, RelationId, Timestamp};
use serde::{Deserialize, Serialize};

/// Kind of diplomatic link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Ally,
    Enemy,
    War,
    Truce,
    Neutral,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Ally => "ALLY",
            RelationType::Enemy => "ENEMY",
            RelationType::War => "WAR",
            RelationType::Truce => "TRUCE",
            RelationType::Neutral => "NEUTRAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALLY" => Some(RelationType::Ally),
            "ENEMY" => Some(RelationType::Enemy),
            "WAR" => Some(RelationType::War),
            "TRUCE" => Some(RelationType::Truce),
            "NEUTRAL" => Some(RelationType::Neutral),
            _ => None,
        }
    }

    /// Alliances and truces need the other guild to accept
    pub fn requires_consent(&self) -> bool {
        matches!(self, RelationType::Ally | RelationType::Truce)
    }
}

/// Lifecycle state of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

impl RelationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationStatus::Pending => "PENDING",
            RelationStatus::Active => "ACTIVE",
            RelationStatus::Expired => "EXPIRED",
            RelationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RelationStatus::Pending),
            "ACTIVE" => Some(RelationStatus::Active),
            "EXPIRED" => Some(RelationStatus::Expired),
            "CANCELLED" => Some(RelationStatus::Cancelled),
            _ => None,
        }
    }

    /// PENDING and ACTIVE relations count against pair uniqueness
    pub fn is_live(&self) -> bool {
        matches!(self, RelationStatus::Pending | RelationStatus::Active)
    }
}

/// A typed, stateful link between exactly two guilds.
///
/// Stored as an ordered pair but looked up symmetrically: `guild_a` is the
/// proposing side, which carries no meaning once the relation is ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub guild_a: GuildId,
    pub guild_b: GuildId,
    pub relation_type: RelationType,
    pub status: RelationStatus,
    pub initiator: PlayerId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl Relation {
    /// A fresh PENDING relation proposed by `guild_a`
    pub fn proposed(
        guild_a: GuildId,
        guild_b: GuildId,
        relation_type: RelationType,
        initiator: PlayerId,
        expires_at: Option<Timestamp>,
    ) -> Self {
        let now = Timestamp::now();
        Relation {
            id: RelationId::generate(),
            guild_a,
            guild_b,
            relation_type,
            status: RelationStatus::Pending,
            initiator,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    /// Whether this relation links `x` and `y`, in either order
    pub fn connects(&self, x: &GuildId, y: &GuildId) -> bool {
        (&self.guild_a == x && &self.guild_b == y) || (&self.guild_a == y && &self.guild_b == x)
    }

    /// Whether `guild` is one side of this relation
    pub fn involves(&self, guild: &GuildId) -> bool {
        &self.guild_a == guild || &self.guild_b == guild
    }

    /// The guild on the other side, relative to `mine`
    pub fn other_guild(&self, mine: &GuildId) -> Option<&GuildId> {
        if &self.guild_a == mine {
            Some(&self.guild_b)
        } else if &self.guild_b == mine {
            Some(&self.guild_a)
        } else {
            None
        }
    }

    /// Canonical unordered key for the pair
    pub fn pair_key(&self) -> (GuildId, GuildId) {
        pair_key(&self.guild_a, &self.guild_b)
    }

    /// Status as seen at `now`: a live relation past `expires_at` reads as EXPIRED
    pub fn effective_status(&self, now: Timestamp) -> RelationStatus {
        match self.expires_at {
            Some(expires_at) if self.status.is_live() && now >= expires_at => {
                RelationStatus::Expired
            }
            _ => self.status,
        }
    }

    /// Whether the relation is PENDING or ACTIVE at `now`
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        self.effective_status(now).is_live()
    }
}

/// Canonical ordering of an unordered guild pair
pub fn pair_key(x: &GuildId, y: &GuildId) -> (GuildId, GuildId) {
    if x <= y {
        (x.clone(), y.clone())
    } else {
        (y.clone(), x.clone())
    }
}
