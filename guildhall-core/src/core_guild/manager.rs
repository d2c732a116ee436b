//! Guild lifecycle: creation, metadata, freezing and disbanding

use super::errors::GuildError;
use super::guild::{Guild, GuildRole, Member};
use super::types::{GuildId, PlayerId, Timestamp};
use crate::config::GuildRulesConfig;
use crate::core_store::{GuildStore, StoreError};
use std::sync::Arc;
use tracing::info;

pub struct GuildManager {
    store: Arc<dyn GuildStore>,
    rules: GuildRulesConfig,
}

impl GuildManager {
    pub fn new(store: Arc<dyn GuildStore>, rules: GuildRulesConfig) -> Self {
        Self { store, rules }
    }

    pub fn rules(&self) -> &GuildRulesConfig {
        &self.rules
    }

    // ===== Validation =====

    /// Trimmed name, if its length and characters are acceptable
    pub fn validate_name(&self, raw: &str) -> Result<String, GuildError> {
        let name = raw.trim();
        let len = name.chars().count();
        if len < self.rules.name_min_len || len > self.rules.name_max_len {
            return Err(GuildError::InvalidName(format!(
                "must be {}-{} characters",
                self.rules.name_min_len, self.rules.name_max_len
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-')
        {
            return Err(GuildError::InvalidName(
                "only letters, digits, spaces, '_' and '-' are allowed".to_string(),
            ));
        }
        Ok(name.to_string())
    }

    pub fn validate_tag(&self, raw: &str) -> Result<String, GuildError> {
        let tag = raw.trim();
        let len = tag.chars().count();
        if len < self.rules.tag_min_len || len > self.rules.tag_max_len {
            return Err(GuildError::InvalidTag(format!(
                "must be {}-{} characters",
                self.rules.tag_min_len, self.rules.tag_max_len
            )));
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GuildError::InvalidTag("only letters and digits are allowed".to_string()));
        }
        Ok(tag.to_string())
    }

    pub fn validate_description(&self, raw: &str) -> Result<String, GuildError> {
        let text = raw.trim();
        if text.chars().count() > self.rules.description_max_len {
            return Err(GuildError::InvalidDescription(format!(
                "at most {} characters",
                self.rules.description_max_len
            )));
        }
        Ok(text.to_string())
    }

    // ===== Queries =====

    pub async fn guild(&self, id: &GuildId) -> Result<Guild, GuildError> {
        self.store.guild(id).await?.ok_or(GuildError::GuildNotFound)
    }

    /// The guild `player` belongs to, if any
    pub async fn guild_of(&self, player: &PlayerId) -> Result<Option<Guild>, GuildError> {
        match self.store.member(player).await? {
            Some(member) => Ok(self.store.guild(&member.guild_id).await?),
            None => Ok(None),
        }
    }

    /// Look a guild up by name, falling back to its tag
    pub async fn find(&self, name_or_tag: &str) -> Result<Guild, GuildError> {
        if let Some(guild) = self.store.guild_by_name(name_or_tag).await? {
            return Ok(guild);
        }
        self.store
            .guild_by_tag(name_or_tag)
            .await?
            .ok_or(GuildError::GuildNotFound)
    }

    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Guild>, GuildError> {
        Ok(self.store.list_guilds(offset, limit).await?)
    }

    pub async fn count(&self) -> Result<usize, GuildError> {
        Ok(self.store.count_guilds().await?)
    }

    // ===== Mutations =====

    /// Found a guild with `leader` as its LEADER
    pub async fn create_guild(
        &self,
        leader: &PlayerId,
        name: &str,
        tag: Option<&str>,
    ) -> Result<Guild, GuildError> {
        let name = self.validate_name(name)?;
        let tag = tag.map(|t| self.validate_tag(t)).transpose()?;

        if self.store.member(leader).await?.is_some() {
            return Err(GuildError::AlreadyInGuild);
        }
        if self.store.guild_by_name(&name).await?.is_some() {
            return Err(GuildError::NameTaken(name));
        }
        if let Some(tag) = &tag {
            if self.store.guild_by_tag(tag).await?.is_some() {
                return Err(GuildError::TagTaken(tag.clone()));
            }
        }

        let guild = Guild::new(name, tag, leader.clone(), self.rules.default_capacity);
        let founder = Member::new(guild.id.clone(), leader.clone(), GuildRole::Leader);

        match self.store.create_guild(&guild, &founder).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(self.explain_create_conflict(&guild).await),
            Err(e) => return Err(e.into()),
        }

        info!(guild = %guild.id, name = %guild.name, leader = %leader, "Guild created");
        Ok(guild)
    }

    /// Another writer won the race; work out which rule it tripped
    async fn explain_create_conflict(&self, guild: &Guild) -> GuildError {
        if let Ok(Some(_)) = self.store.member(&guild.leader).await {
            return GuildError::AlreadyInGuild;
        }
        if let Ok(Some(_)) = self.store.guild_by_name(&guild.name).await {
            return GuildError::NameTaken(guild.name.clone());
        }
        match &guild.tag {
            Some(tag) => GuildError::TagTaken(tag.clone()),
            None => GuildError::NameTaken(guild.name.clone()),
        }
    }

    /// Delete the actor's guild. Leader only.
    pub async fn disband(&self, actor: &PlayerId) -> Result<Guild, GuildError> {
        let (guild, member) = self.acting_guild(actor).await?;
        if member.role != GuildRole::Leader {
            return Err(GuildError::NotAuthorized);
        }

        match self.store.delete_guild(&guild.id).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(GuildError::GuildNotFound),
            Err(e) => return Err(e.into()),
        }

        info!(guild = %guild.id, name = %guild.name, by = %actor, "Guild disbanded");
        Ok(guild)
    }

    pub async fn set_description(
        &self,
        actor: &PlayerId,
        text: &str,
    ) -> Result<Guild, GuildError> {
        let text = self.validate_description(text)?;
        let (mut guild, member) = self.acting_guild(actor).await?;
        if member.role < GuildRole::Officer {
            return Err(GuildError::NotAuthorized);
        }

        guild.description = if text.is_empty() { None } else { Some(text) };
        guild.updated_at = Timestamp::now();
        self.store.update_guild(&guild).await?;
        Ok(guild)
    }

    pub async fn set_tag(&self, actor: &PlayerId, tag: &str) -> Result<Guild, GuildError> {
        let tag = self.validate_tag(tag)?;
        let (mut guild, member) = self.acting_guild(actor).await?;
        if member.role < GuildRole::Officer {
            return Err(GuildError::NotAuthorized);
        }

        if let Some(other) = self.store.guild_by_tag(&tag).await? {
            if other.id != guild.id {
                return Err(GuildError::TagTaken(tag));
            }
        }

        guild.tag = Some(tag.clone());
        guild.updated_at = Timestamp::now();
        match self.store.update_guild(&guild).await {
            Ok(()) => Ok(guild),
            Err(StoreError::Conflict(_)) => Err(GuildError::TagTaken(tag)),
            Err(e) => Err(e.into()),
        }
    }

    /// Administrative freeze; frozen guilds reject membership and role changes
    pub async fn set_frozen(&self, guild: &GuildId, frozen: bool) -> Result<Guild, GuildError> {
        let mut stored = self.guild(guild).await?;
        stored.frozen = frozen;
        stored.updated_at = Timestamp::now();
        self.store.update_guild(&stored).await?;
        info!(guild = %guild, frozen, "Guild freeze toggled");
        Ok(stored)
    }

    async fn acting_guild(&self, actor: &PlayerId) -> Result<(Guild, Member), GuildError> {
        let member = self
            .store
            .member(actor)
            .await?
            .ok_or(GuildError::NotInGuild)?;
        let guild = self.guild(&member.guild_id).await?;
        Ok((guild, member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::MemoryGuildStore;

    fn manager() -> (GuildManager, Arc<MemoryGuildStore>) {
        let store = Arc::new(MemoryGuildStore::new());
        (GuildManager::new(store.clone(), GuildRulesConfig::default()), store)
    }

    #[test]
    fn test_name_validation() {
        let (manager, _) = manager();
        assert!(manager.validate_name("ab").is_err());
        assert!(manager.validate_name("a name far too long for us").is_err());
        assert!(manager.validate_name("Bad!Name").is_err());
        assert_eq!(manager.validate_name("  Iron Wolves ").unwrap(), "Iron Wolves");
        assert!(manager.validate_tag("W-1").is_err());
        assert!(manager.validate_tag("W").is_err());
        assert_eq!(manager.validate_tag("IW").unwrap(), "IW");
    }

    #[tokio::test]
    async fn test_create_guild() {
        let (manager, store) = manager();
        let guild = manager
            .create_guild(&PlayerId::new("alice"), "Iron Wolves", Some("IW"))
            .await
            .unwrap();

        assert_eq!(guild.capacity, 20);
        let founder = store.member(&PlayerId::new("alice")).await.unwrap().unwrap();
        assert_eq!(founder.role, GuildRole::Leader);
        assert_eq!(manager.find("iw").await.unwrap().id, guild.id);
    }

    #[tokio::test]
    async fn test_create_guild_conflicts() {
        let (manager, _) = manager();
        manager
            .create_guild(&PlayerId::new("alice"), "Iron Wolves", Some("IW"))
            .await
            .unwrap();

        assert_eq!(
            manager.create_guild(&PlayerId::new("alice"), "Other", None).await,
            Err(GuildError::AlreadyInGuild)
        );
        assert_eq!(
            manager.create_guild(&PlayerId::new("bob"), "iron wolves", None).await,
            Err(GuildError::NameTaken("iron wolves".into()))
        );
        assert_eq!(
            manager.create_guild(&PlayerId::new("bob"), "Sea Dogs", Some("iw")).await,
            Err(GuildError::TagTaken("iw".into()))
        );
    }

    #[tokio::test]
    async fn test_disband_requires_leader() {
        let (manager, store) = manager();
        let guild = manager
            .create_guild(&PlayerId::new("alice"), "Iron Wolves", None)
            .await
            .unwrap();
        store
            .add_member(&Member::new(guild.id.clone(), PlayerId::new("bob"), GuildRole::Officer))
            .await
            .unwrap();

        assert_eq!(
            manager.disband(&PlayerId::new("bob")).await,
            Err(GuildError::NotAuthorized)
        );
        manager.disband(&PlayerId::new("alice")).await.unwrap();
        assert!(store.guild(&guild.id).await.unwrap().is_none());
        assert!(store.member(&PlayerId::new("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settings() {
        let (manager, _) = manager();
        manager
            .create_guild(&PlayerId::new("alice"), "Iron Wolves", None)
            .await
            .unwrap();

        let updated = manager
            .set_description(&PlayerId::new("alice"), "We hunt at dawn")
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("We hunt at dawn"));

        let long = "x".repeat(200);
        assert!(matches!(
            manager.set_description(&PlayerId::new("alice"), &long).await,
            Err(GuildError::InvalidDescription(_))
        ));

        let tagged = manager.set_tag(&PlayerId::new("alice"), "WOLF").await.unwrap();
        assert_eq!(tagged.display_name(), "[WOLF] Iron Wolves");
    }
}
