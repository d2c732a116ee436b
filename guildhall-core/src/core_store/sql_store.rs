//! SQLite-backed `GuildStore`
//!
//! Every call checks a connection out of the r2d2 pool on a blocking worker
//! thread, so completions arrive off whatever task issued them. Write-time
//! rules are enforced by schema constraints (see `migrations`) and by
//! IMMEDIATE transactions for the multi-step writes.

use super::migrations;
use super::{GuildStore, StoreError, StoreResult};
use crate::core_guild::guild::{Guild, GuildRole, Member};
use crate::core_guild::recruit::{Application, ApplicationStatus, Invitation, InvitationStatus};
use crate::core_guild::relation::{pair_key, Relation, RelationStatus, RelationType};
use crate::core_guild::types::{
    ApplicationId, GuildId, InvitationId, PlayerId, RelationId, Timestamp,
};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;

const GUILD_COLUMNS: &str =
    "id, name, tag, description, leader_id, level, capacity, frozen, banner, created_at, updated_at";
const MEMBER_COLUMNS: &str = "guild_id, player_id, role, joined_at";
const RELATION_COLUMNS: &str =
    "id, guild_a, guild_b, relation_type, status, initiator, created_at, updated_at, expires_at";
const APPLICATION_COLUMNS: &str = "id, guild_id, applicant, message, status, created_at";
const INVITATION_COLUMNS: &str = "id, guild_id, inviter, target, status, invited_at, expires_at";

/// SQL-based storage for guilds and everything hanging off them
#[derive(Clone)]
pub struct SqlGuildStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlGuildStore {
    /// Create a store over an existing pool, running pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        let mut conn = pool
            .get()
            .map_err(|e| StoreError::Unavailable(format!("Failed to get connection: {}", e)))?;
        migrations::migrate(&mut conn).map_err(backend)?;
        Ok(Self { pool })
    }

    /// Open (or create) a database file with a pool of `pool_size` connections
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create pool: {}", e)))?;
        Self::new(pool)
    }

    /// Single-connection in-memory database
    pub fn memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create pool: {}", e)))?;
        Self::new(pool)
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(format!("Failed to get connection: {}", e)))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Blocking task failed: {}", e)))?
    }
}

// ===== Error and row mapping =====

fn backend(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(e.to_string())
        }
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

fn ts(value: i64) -> Timestamp {
    Timestamp::from_millis(value.max(0) as u64)
}

fn db_ts(value: Timestamp) -> i64 {
    value.as_millis() as i64
}

fn parse_column<T>(idx: usize, raw: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(StoreError::Backend(format!("unexpected value '{}'", raw))),
        )
    })
}

fn guild_from_row(row: &Row<'_>) -> rusqlite::Result<Guild> {
    Ok(Guild {
        id: GuildId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        tag: row.get(2)?,
        description: row.get(3)?,
        leader: PlayerId::new(row.get::<_, String>(4)?),
        level: row.get(5)?,
        capacity: row.get(6)?,
        frozen: row.get(7)?,
        banner: row.get(8)?,
        created_at: ts(row.get(9)?),
        updated_at: ts(row.get(10)?),
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        guild_id: GuildId::new(row.get::<_, String>(0)?),
        player: PlayerId::new(row.get::<_, String>(1)?),
        role: parse_column(2, row.get(2)?, GuildRole::parse)?,
        joined_at: ts(row.get(3)?),
    })
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Relation> {
    Ok(Relation {
        id: RelationId::new(row.get::<_, String>(0)?),
        guild_a: GuildId::new(row.get::<_, String>(1)?),
        guild_b: GuildId::new(row.get::<_, String>(2)?),
        relation_type: parse_column(3, row.get(3)?, RelationType::parse)?,
        status: parse_column(4, row.get(4)?, RelationStatus::parse)?,
        initiator: PlayerId::new(row.get::<_, String>(5)?),
        created_at: ts(row.get(6)?),
        updated_at: ts(row.get(7)?),
        expires_at: row.get::<_, Option<i64>>(8)?.map(ts),
    })
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: ApplicationId::new(row.get::<_, String>(0)?),
        guild_id: GuildId::new(row.get::<_, String>(1)?),
        applicant: PlayerId::new(row.get::<_, String>(2)?),
        message: row.get(3)?,
        status: parse_column(4, row.get(4)?, ApplicationStatus::parse)?,
        created_at: ts(row.get(5)?),
    })
}

fn invitation_from_row(row: &Row<'_>) -> rusqlite::Result<Invitation> {
    Ok(Invitation {
        id: InvitationId::new(row.get::<_, String>(0)?),
        guild_id: GuildId::new(row.get::<_, String>(1)?),
        inviter: PlayerId::new(row.get::<_, String>(2)?),
        target: PlayerId::new(row.get::<_, String>(3)?),
        status: parse_column(4, row.get(4)?, InvitationStatus::parse)?,
        invited_at: ts(row.get(5)?),
        expires_at: ts(row.get(6)?),
    })
}

fn query_list<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(backend)?;
    let rows = stmt
        .query_map(params, map)
        .map_err(backend)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend)?;
    Ok(rows)
}

fn query_one<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> StoreResult<Option<T>> {
    conn.query_row(sql, params, map).optional().map_err(backend)
}

fn expect_changed(changed: usize, what: String) -> StoreResult<()> {
    if changed == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

#[async_trait]
impl GuildStore for SqlGuildStore {
    // ===== Guilds =====

    async fn guild(&self, id: &GuildId) -> StoreResult<Option<Guild>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guilds WHERE id = ?", GUILD_COLUMNS),
                params![id.as_str()],
                guild_from_row,
            )
        })
        .await
    }

    async fn guild_by_name(&self, name: &str) -> StoreResult<Option<Guild>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guilds WHERE name = ? COLLATE NOCASE", GUILD_COLUMNS),
                params![name],
                guild_from_row,
            )
        })
        .await
    }

    async fn guild_by_tag(&self, tag: &str) -> StoreResult<Option<Guild>> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guilds WHERE tag = ? COLLATE NOCASE", GUILD_COLUMNS),
                params![tag],
                guild_from_row,
            )
        })
        .await
    }

    async fn list_guilds(&self, offset: usize, limit: usize) -> StoreResult<Vec<Guild>> {
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guilds ORDER BY name COLLATE NOCASE, id LIMIT ? OFFSET ?",
                    GUILD_COLUMNS
                ),
                params![limit as i64, offset as i64],
                guild_from_row,
            )
        })
        .await
    }

    async fn count_guilds(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM guilds", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(backend)
        })
        .await
    }

    async fn create_guild(&self, guild: &Guild, leader: &Member) -> StoreResult<()> {
        let guild = guild.clone();
        let leader = leader.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            tx.execute(
                &format!(
                    "INSERT INTO guilds ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    GUILD_COLUMNS
                ),
                params![
                    guild.id.as_str(),
                    &guild.name,
                    &guild.tag,
                    &guild.description,
                    guild.leader.as_str(),
                    guild.level,
                    guild.capacity,
                    guild.frozen,
                    &guild.banner,
                    db_ts(guild.created_at),
                    db_ts(guild.updated_at),
                ],
            )
            .map_err(backend)?;

            tx.execute(
                &format!("INSERT INTO guild_members ({}) VALUES (?, ?, ?, ?)", MEMBER_COLUMNS),
                params![
                    leader.guild_id.as_str(),
                    leader.player.as_str(),
                    leader.role.as_str(),
                    db_ts(leader.joined_at),
                ],
            )
            .map_err(backend)?;

            tx.commit().map_err(backend)
        })
        .await
    }

    async fn update_guild(&self, guild: &Guild) -> StoreResult<()> {
        let guild = guild.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE guilds SET name = ?, tag = ?, description = ?, level = ?, capacity = ?,
                         frozen = ?, banner = ?, updated_at = ?
                     WHERE id = ?",
                    params![
                        &guild.name,
                        &guild.tag,
                        &guild.description,
                        guild.level,
                        guild.capacity,
                        guild.frozen,
                        &guild.banner,
                        db_ts(guild.updated_at),
                        guild.id.as_str(),
                    ],
                )
                .map_err(backend)?;
            expect_changed(changed, format!("guild {}", guild.id))
        })
        .await
    }

    async fn delete_guild(&self, id: &GuildId) -> StoreResult<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            for table in ["guild_members", "guild_applications", "guild_invitations"] {
                tx.execute(
                    &format!("DELETE FROM {} WHERE guild_id = ?", table),
                    params![id.as_str()],
                )
                .map_err(backend)?;
            }

            tx.execute(
                "UPDATE guild_relations SET status = 'CANCELLED', updated_at = ?2
                 WHERE (guild_a = ?1 OR guild_b = ?1) AND status IN ('PENDING', 'ACTIVE')",
                params![id.as_str(), db_ts(Timestamp::now())],
            )
            .map_err(backend)?;

            let changed = tx
                .execute("DELETE FROM guilds WHERE id = ?", params![id.as_str()])
                .map_err(backend)?;
            expect_changed(changed, format!("guild {}", id))?;

            tx.commit().map_err(backend)
        })
        .await
    }

    // ===== Members =====

    async fn member(&self, player: &PlayerId) -> StoreResult<Option<Member>> {
        let player = player.clone();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guild_members WHERE player_id = ?", MEMBER_COLUMNS),
                params![player.as_str()],
                member_from_row,
            )
        })
        .await
    }

    async fn members_of(&self, guild: &GuildId) -> StoreResult<Vec<Member>> {
        let guild = guild.clone();
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_members WHERE guild_id = ?
                     ORDER BY CASE role WHEN 'LEADER' THEN 0 WHEN 'OFFICER' THEN 1 ELSE 2 END,
                              joined_at",
                    MEMBER_COLUMNS
                ),
                params![guild.as_str()],
                member_from_row,
            )
        })
        .await
    }

    async fn count_members(&self, guild: &GuildId) -> StoreResult<usize> {
        let guild = guild.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM guild_members WHERE guild_id = ?",
                params![guild.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
            .map_err(backend)
        })
        .await
    }

    async fn add_member(&self, member: &Member) -> StoreResult<()> {
        let member = member.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let capacity: Option<i64> = tx
                .query_row(
                    "SELECT capacity FROM guilds WHERE id = ?",
                    params![member.guild_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            let capacity =
                capacity.ok_or_else(|| StoreError::NotFound(format!("guild {}", member.guild_id)))?;

            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM guild_members WHERE guild_id = ?",
                    params![member.guild_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(backend)?;
            if count >= capacity {
                return Err(StoreError::CapacityReached);
            }

            tx.execute(
                &format!("INSERT INTO guild_members ({}) VALUES (?, ?, ?, ?)", MEMBER_COLUMNS),
                params![
                    member.guild_id.as_str(),
                    member.player.as_str(),
                    member.role.as_str(),
                    db_ts(member.joined_at),
                ],
            )
            .map_err(backend)?;

            tx.commit().map_err(backend)
        })
        .await
    }

    async fn update_members(&self, guild: &GuildId, members: &[Member]) -> StoreResult<()> {
        let guild = guild.clone();
        let members = members.to_vec();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let exists: Option<String> = tx
                .query_row("SELECT id FROM guilds WHERE id = ?", params![guild.as_str()], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(backend)?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!("guild {}", guild)));
            }

            for member in &members {
                let changed = tx
                    .execute(
                        "UPDATE guild_members SET role = ? WHERE player_id = ? AND guild_id = ?",
                        params![member.role.as_str(), member.player.as_str(), guild.as_str()],
                    )
                    .map_err(backend)?;
                if changed == 0 || member.guild_id != guild {
                    return Err(StoreError::Conflict(format!(
                        "player {} is not a member of {}",
                        member.player, guild
                    )));
                }
            }

            let leaders: Vec<String> = {
                let mut stmt = tx
                    .prepare("SELECT player_id FROM guild_members WHERE guild_id = ? AND role = 'LEADER'")
                    .map_err(backend)?;
                let rows = stmt
                    .query_map(params![guild.as_str()], |row| row.get(0))
                    .map_err(backend)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(backend)?;
                rows
            };
            if leaders.len() != 1 {
                return Err(StoreError::Conflict(format!(
                    "guild {} would have {} leaders",
                    guild,
                    leaders.len()
                )));
            }

            tx.execute(
                "UPDATE guilds SET leader_id = ?, updated_at = ? WHERE id = ?",
                params![&leaders[0], db_ts(Timestamp::now()), guild.as_str()],
            )
            .map_err(backend)?;

            tx.commit().map_err(backend)
        })
        .await
    }

    async fn remove_member(&self, guild: &GuildId, player: &PlayerId) -> StoreResult<()> {
        let guild = guild.clone();
        let player = player.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let role: Option<String> = tx
                .query_row(
                    "SELECT role FROM guild_members WHERE guild_id = ? AND player_id = ?",
                    params![guild.as_str(), player.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            match role.as_deref() {
                None => return Err(StoreError::NotFound(format!("member {} of {}", player, guild))),
                Some("LEADER") => {
                    return Err(StoreError::Conflict(format!("player {} leads {}", player, guild)))
                }
                Some(_) => {}
            }

            tx.execute(
                "DELETE FROM guild_members WHERE guild_id = ? AND player_id = ?",
                params![guild.as_str(), player.as_str()],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)
        })
        .await
    }

    // ===== Relations =====

    async fn relation(&self, id: &RelationId) -> StoreResult<Option<Relation>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guild_relations WHERE id = ?", RELATION_COLUMNS),
                params![id.as_str()],
                relation_from_row,
            )
        })
        .await
    }

    async fn relations_of(&self, guild: &GuildId) -> StoreResult<Vec<Relation>> {
        let guild = guild.clone();
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_relations WHERE guild_a = ?1 OR guild_b = ?1
                     ORDER BY created_at",
                    RELATION_COLUMNS
                ),
                params![guild.as_str()],
                relation_from_row,
            )
        })
        .await
    }

    async fn relations_between(&self, x: &GuildId, y: &GuildId) -> StoreResult<Vec<Relation>> {
        let (lo, hi) = pair_key(x, y);
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_relations WHERE pair_lo = ? AND pair_hi = ?
                     ORDER BY created_at",
                    RELATION_COLUMNS
                ),
                params![lo.as_str(), hi.as_str()],
                relation_from_row,
            )
        })
        .await
    }

    async fn create_relation(&self, relation: &Relation) -> StoreResult<()> {
        let relation = relation.clone();
        self.with_conn(move |conn| {
            let (lo, hi) = relation.pair_key();
            conn.execute(
                "INSERT INTO guild_relations
                    (id, guild_a, guild_b, pair_lo, pair_hi, relation_type, status, initiator,
                     created_at, updated_at, expires_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    relation.id.as_str(),
                    relation.guild_a.as_str(),
                    relation.guild_b.as_str(),
                    lo.as_str(),
                    hi.as_str(),
                    relation.relation_type.as_str(),
                    relation.status.as_str(),
                    relation.initiator.as_str(),
                    db_ts(relation.created_at),
                    db_ts(relation.updated_at),
                    relation.expires_at.map(db_ts),
                ],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn update_relation(
        &self,
        relation: &Relation,
        expected: RelationStatus,
    ) -> StoreResult<()> {
        let relation = relation.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let changed = tx
                .execute(
                    "UPDATE guild_relations SET relation_type = ?, status = ?, initiator = ?,
                         updated_at = ?, expires_at = ?
                     WHERE id = ? AND status = ?",
                    params![
                        relation.relation_type.as_str(),
                        relation.status.as_str(),
                        relation.initiator.as_str(),
                        db_ts(relation.updated_at),
                        relation.expires_at.map(db_ts),
                        relation.id.as_str(),
                        expected.as_str(),
                    ],
                )
                .map_err(backend)?;

            if changed == 0 {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM guild_relations WHERE id = ?",
                        params![relation.id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(backend)?;
                return Err(match current {
                    None => StoreError::NotFound(format!("relation {}", relation.id)),
                    Some(status) => StoreError::Conflict(format!(
                        "relation {} is {}, expected {}",
                        relation.id,
                        status,
                        expected.as_str()
                    )),
                });
            }

            tx.commit().map_err(backend)
        })
        .await
    }

    async fn delete_relation(&self, id: &RelationId) -> StoreResult<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM guild_relations WHERE id = ?", params![id.as_str()])
                .map_err(backend)?;
            expect_changed(changed, format!("relation {}", id))
        })
        .await
    }

    // ===== Applications =====

    async fn application(&self, id: &ApplicationId) -> StoreResult<Option<Application>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guild_applications WHERE id = ?", APPLICATION_COLUMNS),
                params![id.as_str()],
                application_from_row,
            )
        })
        .await
    }

    async fn applications_for(&self, guild: &GuildId) -> StoreResult<Vec<Application>> {
        let guild = guild.clone();
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_applications WHERE guild_id = ? ORDER BY created_at",
                    APPLICATION_COLUMNS
                ),
                params![guild.as_str()],
                application_from_row,
            )
        })
        .await
    }

    async fn applications_by(&self, player: &PlayerId) -> StoreResult<Vec<Application>> {
        let player = player.clone();
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_applications WHERE applicant = ? ORDER BY created_at",
                    APPLICATION_COLUMNS
                ),
                params![player.as_str()],
                application_from_row,
            )
        })
        .await
    }

    async fn create_application(&self, application: &Application) -> StoreResult<()> {
        let app = application.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO guild_applications ({}) VALUES (?, ?, ?, ?, ?, ?)",
                    APPLICATION_COLUMNS
                ),
                params![
                    app.id.as_str(),
                    app.guild_id.as_str(),
                    app.applicant.as_str(),
                    &app.message,
                    app.status.as_str(),
                    db_ts(app.created_at),
                ],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn update_application(&self, application: &Application) -> StoreResult<()> {
        let app = application.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE guild_applications SET message = ?, status = ? WHERE id = ?",
                    params![&app.message, app.status.as_str(), app.id.as_str()],
                )
                .map_err(backend)?;
            expect_changed(changed, format!("application {}", app.id))
        })
        .await
    }

    async fn delete_application(&self, id: &ApplicationId) -> StoreResult<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM guild_applications WHERE id = ?", params![id.as_str()])
                .map_err(backend)?;
            expect_changed(changed, format!("application {}", id))
        })
        .await
    }

    // ===== Invitations =====

    async fn invitation(&self, id: &InvitationId) -> StoreResult<Option<Invitation>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM guild_invitations WHERE id = ?", INVITATION_COLUMNS),
                params![id.as_str()],
                invitation_from_row,
            )
        })
        .await
    }

    async fn invitations_for(&self, player: &PlayerId) -> StoreResult<Vec<Invitation>> {
        let player = player.clone();
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_invitations WHERE target = ? ORDER BY invited_at",
                    INVITATION_COLUMNS
                ),
                params![player.as_str()],
                invitation_from_row,
            )
        })
        .await
    }

    async fn invitations_from(&self, guild: &GuildId) -> StoreResult<Vec<Invitation>> {
        let guild = guild.clone();
        self.with_conn(move |conn| {
            query_list(
                conn,
                &format!(
                    "SELECT {} FROM guild_invitations WHERE guild_id = ? ORDER BY invited_at",
                    INVITATION_COLUMNS
                ),
                params![guild.as_str()],
                invitation_from_row,
            )
        })
        .await
    }

    async fn create_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        let inv = invitation.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO guild_invitations ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    INVITATION_COLUMNS
                ),
                params![
                    inv.id.as_str(),
                    inv.guild_id.as_str(),
                    inv.inviter.as_str(),
                    inv.target.as_str(),
                    inv.status.as_str(),
                    db_ts(inv.invited_at),
                    db_ts(inv.expires_at),
                ],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn update_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        let inv = invitation.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE guild_invitations SET status = ?, expires_at = ? WHERE id = ?",
                    params![inv.status.as_str(), db_ts(inv.expires_at), inv.id.as_str()],
                )
                .map_err(backend)?;
            expect_changed(changed, format!("invitation {}", inv.id))
        })
        .await
    }

    async fn delete_invitation(&self, id: &InvitationId) -> StoreResult<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM guild_invitations WHERE id = ?", params![id.as_str()])
                .map_err(backend)?;
            expect_changed(changed, format!("invitation {}", id))
        })
        .await
    }
}
