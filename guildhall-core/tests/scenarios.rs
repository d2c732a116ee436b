/*
    Guild scenarios

    End-to-end checks of the documented behaviours:
    - promotion stops at OFFICER
    - a pair cannot hold two open relations
    - leadership transfer keeps exactly one leader
    - a directory page renders even when some member counts fail
*/

use guildhall_core::config::GuildhallConfig;
use guildhall_core::core_guild::errors::{MembershipError, RelationError};
use guildhall_core::core_guild::{GuildRole, RelationStatus, RelationType};
use guildhall_core::core_screens::DirectoryScreen;
use guildhall_core::core_session::{CellPayload, SessionEvent, SessionHandle};
use guildhall_core::test_utils::{
    assert_err, assert_ok, assert_pairs_unique, assert_single_leader, next_matching,
    seeded_services, test_services, Seeded, TestGuildBuilder, EVENT_TIMEOUT,
};
use guildhall_core::PlayerId;

#[tokio::test]
async fn test_promotion_ceiling() {
    let Seeded {
        services, alpha, ..
    } = seeded_services().await;

    let promoted = assert_ok(services.membership.promote(&alpha.leader, &alpha.member).await);
    assert_eq!(promoted.role, GuildRole::Officer);

    let err = assert_err(services.membership.promote(&alpha.leader, &alpha.member).await);
    assert_eq!(err, MembershipError::AlreadyHighest);

    let still = assert_ok(services.membership.member(&alpha.member).await);
    assert_eq!(still.role, GuildRole::Officer);
    assert_single_leader(services.store.as_ref(), &alpha.guild.id).await;
}

#[tokio::test]
async fn test_duplicate_relation_rejected_in_either_order() {
    let Seeded {
        services,
        alpha,
        beta,
        ..
    } = seeded_services().await;

    let proposal = assert_ok(
        services
            .relations
            .propose(&alpha.guild.id, &beta.guild.id, RelationType::Ally, &alpha.leader)
            .await,
    );
    assert_eq!(proposal.status, RelationStatus::Pending);

    let err = assert_err(
        services
            .relations
            .propose(&beta.guild.id, &alpha.guild.id, RelationType::Enemy, &beta.leader)
            .await,
    );
    assert_eq!(err, RelationError::DuplicateRelation);

    let forward = assert_ok(services.relations.relation_for(&alpha.guild.id, &beta.guild.id).await);
    let backward = assert_ok(services.relations.relation_for(&beta.guild.id, &alpha.guild.id).await);
    assert_eq!(forward, backward);
    assert_eq!(forward.map(|r| r.id), Some(proposal.id));

    assert_pairs_unique(
        services.store.as_ref(),
        &[alpha.guild.id.clone(), beta.guild.id.clone()],
    )
    .await;
}

#[tokio::test]
async fn test_leadership_transfer() {
    let Seeded {
        services, alpha, ..
    } = seeded_services().await;

    let new_leader = assert_ok(
        services
            .membership
            .transfer_leadership(&alpha.guild.id, &alpha.officer)
            .await,
    );
    assert_eq!(new_leader.role, GuildRole::Leader);

    let former = assert_ok(services.membership.member(&alpha.leader).await);
    assert_eq!(former.role, GuildRole::Officer);

    let guild = assert_ok(services.guilds.guild(&alpha.guild.id).await);
    assert_eq!(guild.leader, alpha.officer);
    assert_single_leader(services.store.as_ref(), &alpha.guild.id).await;
}

#[tokio::test]
async fn test_directory_renders_with_one_failed_count() {
    let (services, store) = test_services();
    let mut guilds = Vec::new();
    for i in 0..10 {
        let guild = assert_ok(
            TestGuildBuilder::new(&format!("Guild {:02}", i))
                .with_member(&format!("recruit{}", i))
                .create(store.as_ref())
                .await,
        );
        guilds.push(guild);
    }
    store.fail_member_counts_for(guilds[4].id.clone()).await;

    let config = GuildhallConfig::default();
    let (handle, _task) = SessionHandle::new(services, config.sessions.clone());
    let viewer = PlayerId::new("wanderer");
    assert_ok(handle.open(&viewer, DirectoryScreen::new(&config.sessions)).await);

    let event = assert_ok(
        next_matching(&handle, EVENT_TIMEOUT, |e| match e {
            SessionEvent::ScreenShown { view, .. } => view
                .grid
                .occupied()
                .any(|(_, c)| matches!(c.payload, Some(CellPayload::Guild(_)))),
            _ => false,
        })
        .await,
    );
    let SessionEvent::ScreenShown { view, .. } = event else {
        panic!("expected a rendered screen");
    };

    let entries: Vec<_> = view
        .grid
        .occupied()
        .filter(|(_, c)| matches!(c.payload, Some(CellPayload::Guild(_))))
        .map(|(_, c)| c.clone())
        .collect();
    assert_eq!(entries.len(), 10);

    let counted = entries
        .iter()
        .filter(|c| c.lore.iter().any(|l| l == "Members: 2/20"))
        .count();
    let fallback: Vec<_> = entries
        .iter()
        .filter(|c| c.lore.iter().any(|l| l == "Members: ?/20"))
        .collect();
    assert_eq!(counted, 9);
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].label, "Guild 04");

    let snapshot = assert_ok(handle.snapshot(&viewer).await);
    assert!(snapshot.title.is_some());
    assert_ok(handle.shutdown().await);
}
