//! Guild and member data structures

use super::types::{GuildId, PlayerId, Timestamp};
use serde::{Deserialize, Serialize};

/// A named player group with roles and a member capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    /// Unique identifier
    pub id: GuildId,

    /// Display name, unique case-insensitively
    pub name: String,

    /// Optional short tag, unique case-insensitively
    pub tag: Option<String>,

    /// Optional description
    pub description: Option<String>,

    /// Player currently holding the LEADER role
    pub leader: PlayerId,

    /// Guild level
    pub level: u32,

    /// Maximum number of members
    pub capacity: u32,

    /// Frozen guilds reject membership and role changes
    pub frozen: bool,

    /// Optional banner/emblem payload, opaque to this crate
    pub banner: Option<String>,

    /// When the guild was created
    pub created_at: Timestamp,

    /// Last time guild metadata was updated
    pub updated_at: Timestamp,
}

impl Guild {
    /// Create a new level-1 guild led by `leader`
    pub fn new(name: String, tag: Option<String>, leader: PlayerId, capacity: u32) -> Self {
        let now = Timestamp::now();
        Guild {
            id: GuildId::generate(),
            name,
            tag,
            description: None,
            leader,
            level: 1,
            capacity,
            frozen: false,
            banner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `[TAG] Name` when a tag is set, otherwise just the name
    pub fn display_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("[{}] {}", tag, self.name),
            None => self.name.clone(),
        }
    }
}

/// Guild roles, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GuildRole {
    /// Default role
    Member,
    /// Can recruit and kick members
    Officer,
    /// Full control; exactly one per guild
    Leader,
}

impl GuildRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuildRole::Member => "MEMBER",
            GuildRole::Officer => "OFFICER",
            GuildRole::Leader => "LEADER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MEMBER" => Some(GuildRole::Member),
            "OFFICER" => Some(GuildRole::Officer),
            "LEADER" => Some(GuildRole::Leader),
            _ => None,
        }
    }

    /// Officers and leaders may manage recruitment
    pub fn can_recruit(&self) -> bool {
        *self >= GuildRole::Officer
    }
}

/// A player's membership in a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Guild the player belongs to
    pub guild_id: GuildId,

    /// The player
    pub player: PlayerId,

    /// Role in the guild
    pub role: GuildRole,

    /// When the player joined
    pub joined_at: Timestamp,
}

impl Member {
    pub fn new(guild_id: GuildId, player: PlayerId, role: GuildRole) -> Self {
        Member {
            guild_id,
            player,
            role,
            joined_at: Timestamp::now(),
        }
    }

    /// Copy of this membership with a different role
    pub fn with_role(&self, role: GuildRole) -> Self {
        Member {
            role,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_guild() {
        let leader = PlayerId::new("alice");
        let guild = Guild::new("Wardens".to_string(), Some("WRD".to_string()), leader.clone(), 20);

        assert_eq!(guild.leader, leader);
        assert_eq!(guild.level, 1);
        assert!(!guild.frozen);
        assert_eq!(guild.display_name(), "[WRD] Wardens");
    }

    #[test]
    fn test_role_ordering() {
        assert!(GuildRole::Member < GuildRole::Officer);
        assert!(GuildRole::Officer < GuildRole::Leader);
        assert!(!GuildRole::Member.can_recruit());
        assert!(GuildRole::Officer.can_recruit());
    }

    #[test]
    fn test_role_parse() {
        for role in [GuildRole::Member, GuildRole::Officer, GuildRole::Leader] {
            assert_eq!(GuildRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(GuildRole::parse("owner"), None);
    }
}
