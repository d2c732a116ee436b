/*
    SQLite-backed lifecycle

    Runs the engines over SqlGuildStore with a database file:
    - create, recruit and promote
    - relation changes keep pair uniqueness under SQL constraints
    - data survives reopening the file
    - disband removes everything the guild owned
*/

use guildhall_core::config::{GuildhallConfig, StoreBackend};
use guildhall_core::core_guild::errors::RelationError;
use guildhall_core::core_guild::{GuildRole, GuildServices, PlayerId, RelationStatus, RelationType};
use guildhall_core::core_screens::{set_relation, ActionError};
use guildhall_core::test_utils::{assert_err, assert_ok, assert_pairs_unique, assert_single_leader};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn sqlite_services(path: &Path) -> Arc<GuildServices> {
    let mut config = GuildhallConfig::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.sqlite_path = Some(path.to_path_buf());
    config.store.pool_size = 2;
    assert_ok(config.validate());
    assert_ok(GuildServices::from_config(config))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guild_lifecycle_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("guilds.db");
    let services = sqlite_services(&path);

    let ada = PlayerId::new("ada");
    let bo = PlayerId::new("bo");
    let cy = PlayerId::new("cy");

    let forge = assert_ok(services.guilds.create_guild(&ada, "Forge", Some("FRG")).await);
    let _anvil = assert_ok(services.guilds.create_guild(&cy, "Anvil", None).await);

    let invitation = assert_ok(services.recruitment.invite(&ada, &bo).await);
    let joined = assert_ok(services.recruitment.accept_invitation(&bo, &invitation.id).await);
    assert_eq!(joined.role, GuildRole::Member);

    let promoted = assert_ok(services.membership.promote(&ada, &bo).await);
    assert_eq!(promoted.role, GuildRole::Officer);
    assert_single_leader(services.store.as_ref(), &forge.id).await;

    let war = assert_ok(set_relation(&services, &bo, "Anvil", RelationType::War).await);
    assert_eq!(war.status, RelationStatus::Active);
    let again = assert_err(set_relation(&services, &cy, "forge", RelationType::War).await);
    assert_eq!(again, ActionError::Relation(RelationError::DuplicateRelation));

    let truce = assert_ok(set_relation(&services, &cy, "Forge", RelationType::Truce).await);
    assert_eq!(truce.status, RelationStatus::Pending);
    let accepted = assert_ok(set_relation(&services, &ada, "Anvil", RelationType::Truce).await);
    assert_eq!(accepted.status, RelationStatus::Active);
    assert!(accepted.expires_at.is_some());

    let anvil_id = assert_ok(services.guilds.find("Anvil").await).id;
    assert_pairs_unique(services.store.as_ref(), &[forge.id.clone(), anvil_id.clone()]).await;
    drop(services);

    let reopened = sqlite_services(&path);
    let roster = assert_ok(reopened.membership.roster(&forge.id).await);
    assert_eq!(roster.len(), 2);
    let live = assert_ok(reopened.relations.relations_of(&forge.id).await);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].relation_type, RelationType::Truce);

    let disbanded = assert_ok(reopened.guilds.disband(&ada).await);
    assert_eq!(disbanded.id, forge.id);
    assert!(assert_ok(reopened.store.member(&bo).await).is_none());
    assert!(assert_ok(reopened.relations.relations_of(&anvil_id).await).is_empty());
}
