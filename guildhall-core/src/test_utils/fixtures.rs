//! Test fixtures for guild data
//!
//! Builders write straight to a store so tests start from a known state
//! without going through the engines they are testing.

use crate::config::GuildhallConfig;
use crate::core_guild::guild::{Guild, GuildRole, Member};
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use crate::core_store::{GuildStore, MemoryGuildStore, StoreResult};
use std::sync::Arc;

/// Services over a fresh in-memory store with default rules
pub fn test_services() -> (Arc<GuildServices>, Arc<MemoryGuildStore>) {
    test_services_with_config(GuildhallConfig::default())
}

pub fn test_services_with_config(
    config: GuildhallConfig,
) -> (Arc<GuildServices>, Arc<MemoryGuildStore>) {
    let store = Arc::new(MemoryGuildStore::new());
    let services = GuildServices::new(store.clone(), config);
    (services, store)
}

/// Builder for a guild with a leader and optional extra members
pub struct TestGuildBuilder {
    name: String,
    tag: Option<String>,
    leader: PlayerId,
    capacity: u32,
    others: Vec<(PlayerId, GuildRole)>,
}

impl TestGuildBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: None,
            leader: PlayerId::new(format!("{}-leader", name.to_lowercase())),
            capacity: 20,
            others: Vec::new(),
        }
    }

    pub fn with_leader(mut self, player: &str) -> Self {
        self.leader = PlayerId::new(player);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_officer(mut self, player: &str) -> Self {
        self.others.push((PlayerId::new(player), GuildRole::Officer));
        self
    }

    pub fn with_member(mut self, player: &str) -> Self {
        self.others.push((PlayerId::new(player), GuildRole::Member));
        self
    }

    pub async fn create(self, store: &dyn GuildStore) -> StoreResult<Guild> {
        let guild = Guild::new(self.name, self.tag, self.leader.clone(), self.capacity);
        let leader = Member::new(guild.id.clone(), self.leader, GuildRole::Leader);
        store.create_guild(&guild, &leader).await?;
        for (player, role) in self.others {
            store
                .add_member(&Member::new(guild.id.clone(), player, role))
                .await?;
        }
        Ok(guild)
    }
}

/// A guild created with one player in each role
#[derive(Debug, Clone)]
pub struct SeededGuild {
    pub guild: Guild,
    pub leader: PlayerId,
    pub officer: PlayerId,
    pub member: PlayerId,
}

impl SeededGuild {
    pub async fn create(store: &dyn GuildStore, name: &str) -> StoreResult<Self> {
        let prefix = name.to_lowercase();
        let officer = format!("{}-officer", prefix);
        let member = format!("{}-member", prefix);
        let guild = TestGuildBuilder::new(name)
            .with_officer(&officer)
            .with_member(&member)
            .create(store)
            .await?;
        Ok(Self {
            leader: guild.leader.clone(),
            officer: PlayerId::new(officer),
            member: PlayerId::new(member),
            guild,
        })
    }
}

/// Two seeded guilds, "Alpha" and "Beta", over a memory store
pub struct Seeded {
    pub services: Arc<GuildServices>,
    pub store: Arc<MemoryGuildStore>,
    pub alpha: SeededGuild,
    pub beta: SeededGuild,
}

pub async fn seeded_services() -> Seeded {
    let (services, store) = test_services();
    let alpha = SeededGuild::create(store.as_ref(), "Alpha")
        .await
        .expect("seed Alpha");
    let beta = SeededGuild::create(store.as_ref(), "Beta")
        .await
        .expect("seed Beta");
    Seeded {
        services,
        store,
        alpha,
        beta,
    }
}
