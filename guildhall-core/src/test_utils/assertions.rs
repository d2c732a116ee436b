//! Assertions over store state

use crate::core_guild::guild::GuildRole;
use crate::core_guild::relation::pair_key;
use crate::core_guild::types::{GuildId, Timestamp};
use crate::core_store::GuildStore;
use std::collections::HashMap;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Exactly one LEADER, and `Guild.leader` names them
pub async fn assert_single_leader(store: &dyn GuildStore, guild: &GuildId) {
    let members = assert_ok(store.members_of(guild).await);
    let leaders: Vec<_> = members
        .iter()
        .filter(|m| m.role == GuildRole::Leader)
        .collect();
    assert_eq!(leaders.len(), 1, "guild {} leaders: {:?}", guild, leaders);

    let record = assert_ok(store.guild(guild).await).expect("guild exists");
    assert_eq!(record.leader, leaders[0].player);
}

/// At most one live relation per unordered pair among `guilds`
pub async fn assert_pairs_unique(store: &dyn GuildStore, guilds: &[GuildId]) {
    let now = Timestamp::now();
    let mut live = HashMap::new();
    for guild in guilds {
        for relation in assert_ok(store.relations_of(guild).await) {
            if relation.is_live_at(now) {
                live.insert(relation.id.clone(), pair_key(&relation.guild_a, &relation.guild_b));
            }
        }
    }

    let mut per_pair: HashMap<_, usize> = HashMap::new();
    for key in live.into_values() {
        *per_pair.entry(key).or_default() += 1;
    }
    for (pair, count) in per_pair {
        assert!(count <= 1, "pair {:?} has {} live relations", pair, count);
    }
}
