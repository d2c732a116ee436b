//! Guild directory rows with concurrently fetched member counts

use super::guild::Guild;
use crate::core_store::{GuildStore, StoreResult};
use crate::metrics::{self, FANOUT_PARTIAL_FAILURES};
use futures::future::join_all;
use tracing::warn;

/// One directory row; `member_count` is `None` when its fetch failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSummary {
    pub guild: Guild,
    pub member_count: Option<usize>,
}

impl GuildSummary {
    /// "12/20", or "?/20" when the count is unknown
    pub fn occupancy(&self) -> String {
        match self.member_count {
            Some(count) => format!("{}/{}", count, self.guild.capacity),
            None => format!("?/{}", self.guild.capacity),
        }
    }
}

/// Attach member counts to `guilds`, fetching every count at once.
///
/// A failed count never fails the whole list; it is logged and left empty.
pub async fn guild_summaries(store: &dyn GuildStore, guilds: Vec<Guild>) -> Vec<GuildSummary> {
    let counts = join_all(guilds.iter().map(|g| store.count_members(&g.id))).await;

    guilds
        .into_iter()
        .zip(counts)
        .map(|(guild, count)| {
            let member_count = match count {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(guild = %guild.id, error = %e, "Member count unavailable");
                    metrics::record_counter(FANOUT_PARTIAL_FAILURES, 1);
                    None
                }
            };
            GuildSummary {
                guild,
                member_count,
            }
        })
        .collect()
}

/// A page of the directory plus the total guild count
pub async fn directory_page(
    store: &dyn GuildStore,
    offset: usize,
    limit: usize,
) -> StoreResult<(Vec<GuildSummary>, usize)> {
    let total = store.count_guilds().await?;
    let guilds = store.list_guilds(offset, limit).await?;
    Ok((guild_summaries(store, guilds).await, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_guild::guild::{GuildRole, Member};
    use crate::core_guild::types::PlayerId;
    use crate::core_store::MemoryGuildStore;

    #[tokio::test]
    async fn test_failed_count_yields_none() {
        let store = MemoryGuildStore::new();
        let mut guilds = Vec::new();
        for i in 0..3 {
            let leader = PlayerId::new(format!("leader{}", i));
            let guild = Guild::new(format!("Guild {}", i), None, leader.clone(), 10);
            store
                .create_guild(&guild, &Member::new(guild.id.clone(), leader, GuildRole::Leader))
                .await
                .unwrap();
            guilds.push(guild);
        }
        store.fail_member_counts_for(guilds[1].id.clone()).await;

        let summaries = guild_summaries(&store, guilds).await;
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].member_count, Some(1));
        assert_eq!(summaries[1].member_count, None);
        assert_eq!(summaries[1].occupancy(), "?/10");
        assert_eq!(summaries[2].occupancy(), "1/10");
    }
}
