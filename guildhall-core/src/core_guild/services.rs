//! Shared bundle of the store and the engines built on it

use super::manager::GuildManager;
use super::membership::MembershipEngine;
use super::recruitment::RecruitmentManager;
use super::relations::RelationEngine;
use crate::config::{GuildhallConfig, StoreBackend};
use crate::core_store::{GuildStore, MemoryGuildStore, SqlGuildStore, StoreError};
use std::sync::Arc;

/// Everything screens and commands need to talk to the guild domain
pub struct GuildServices {
    pub store: Arc<dyn GuildStore>,
    pub guilds: GuildManager,
    pub membership: MembershipEngine,
    pub recruitment: RecruitmentManager,
    pub relations: RelationEngine,
    pub config: GuildhallConfig,
}

impl GuildServices {
    pub fn new(store: Arc<dyn GuildStore>, config: GuildhallConfig) -> Arc<Self> {
        Arc::new(Self {
            guilds: GuildManager::new(store.clone(), config.guilds.clone()),
            membership: MembershipEngine::new(store.clone()),
            recruitment: RecruitmentManager::new(store.clone(), config.recruitment.clone()),
            relations: RelationEngine::new(store.clone(), config.relations.clone()),
            store,
            config,
        })
    }

    /// Open the configured store backend and wire the engines to it
    pub fn from_config(config: GuildhallConfig) -> Result<Arc<Self>, StoreError> {
        let store: Arc<dyn GuildStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryGuildStore::new()),
            StoreBackend::Sqlite => {
                let path = config.store.sqlite_path.clone().ok_or_else(|| {
                    StoreError::Unavailable("sqlite backend requires a path".to_string())
                })?;
                Arc::new(SqlGuildStore::open(path, config.store.pool_size)?)
            }
        };
        Ok(Self::new(store, config))
    }
}
