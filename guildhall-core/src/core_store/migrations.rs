//! Database migrations for the guild store
//!
//! Each migration is applied atomically and tracked in the
//! `guild_schema_version` table.

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::info;

use crate::core_guild::types::Timestamp;

/// Current schema version
pub const CURRENT_GUILD_SCHEMA_VERSION: i32 = 1;

/// One schema step, applied inside its own transaction
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// Every schema step, oldest first
pub fn all() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial guild schema",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS guilds (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL COLLATE NOCASE UNIQUE,
                tag TEXT COLLATE NOCASE UNIQUE,
                description TEXT,
                leader_id TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                capacity INTEGER NOT NULL,
                frozen INTEGER NOT NULL DEFAULT 0,
                banner TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- player_id as primary key: a player belongs to at most one guild
            CREATE TABLE IF NOT EXISTS guild_members (
                player_id TEXT PRIMARY KEY,
                guild_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('LEADER', 'OFFICER', 'MEMBER')),
                joined_at INTEGER NOT NULL,
                FOREIGN KEY (guild_id) REFERENCES guilds(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_guild_members_guild ON guild_members(guild_id);

            -- pair_lo/pair_hi hold the unordered pair in canonical order
            CREATE TABLE IF NOT EXISTS guild_relations (
                id TEXT PRIMARY KEY,
                guild_a TEXT NOT NULL,
                guild_b TEXT NOT NULL,
                pair_lo TEXT NOT NULL,
                pair_hi TEXT NOT NULL,
                relation_type TEXT NOT NULL
                    CHECK(relation_type IN ('ALLY', 'ENEMY', 'WAR', 'TRUCE', 'NEUTRAL')),
                status TEXT NOT NULL
                    CHECK(status IN ('PENDING', 'ACTIVE', 'EXPIRED', 'CANCELLED')),
                initiator TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_relations_live_pair
                ON guild_relations(pair_lo, pair_hi)
                WHERE status IN ('PENDING', 'ACTIVE');
            CREATE INDEX IF NOT EXISTS idx_relations_a ON guild_relations(guild_a);
            CREATE INDEX IF NOT EXISTS idx_relations_b ON guild_relations(guild_b);

            CREATE TABLE IF NOT EXISTS guild_applications (
                id TEXT PRIMARY KEY,
                guild_id TEXT NOT NULL,
                applicant TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('PENDING', 'APPROVED', 'REJECTED')),
                created_at INTEGER NOT NULL,
                FOREIGN KEY (guild_id) REFERENCES guilds(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_applications_guild ON guild_applications(guild_id);
            CREATE INDEX IF NOT EXISTS idx_applications_applicant ON guild_applications(applicant);

            CREATE TABLE IF NOT EXISTS guild_invitations (
                id TEXT PRIMARY KEY,
                guild_id TEXT NOT NULL,
                inviter TEXT NOT NULL,
                target TEXT NOT NULL,
                status TEXT NOT NULL
                    CHECK(status IN ('PENDING', 'ACCEPTED', 'DECLINED', 'EXPIRED')),
                invited_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (guild_id) REFERENCES guilds(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_invitations_target ON guild_invitations(target);
            CREATE INDEX IF NOT EXISTS idx_invitations_guild ON guild_invitations(guild_id);
        "#,
    }]
}

/// Highest applied version, 0 for a fresh database
pub fn schema_version(conn: &Connection) -> Result<i32, rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS guild_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;
    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM guild_schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

/// Bring the schema up to [`CURRENT_GUILD_SCHEMA_VERSION`]
pub fn migrate(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    let from = schema_version(conn)?;
    for step in all().into_iter().filter(|m| m.version > from) {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(step.up_sql)?;
        tx.execute(
            "INSERT INTO guild_schema_version (version, applied_at) VALUES (?1, ?2)",
            params![step.version, Timestamp::now().as_millis() as i64],
        )?;
        tx.commit()?;
        info!(
            version = step.version,
            description = step.description,
            "Guild schema migrated"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .unwrap();
        let names = stmt.query_map([], |row| row.get(0)).unwrap();
        names.map(|n| n.unwrap()).collect()
    }

    #[test]
    fn test_fresh_database_gets_every_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);
        migrate(&mut conn).unwrap();

        let tables = table_names(&conn);
        for table in [
            "guilds",
            "guild_members",
            "guild_relations",
            "guild_applications",
            "guild_invitations",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_GUILD_SCHEMA_VERSION);
    }

    #[test]
    fn test_rerun_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM guild_schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, all().len() as i64);
    }

    #[test]
    fn test_live_pair_index_rejects_second_live_relation() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let insert = "INSERT INTO guild_relations
            (id, guild_a, guild_b, pair_lo, pair_hi, relation_type, status, initiator, created_at, updated_at)
            VALUES (?, 'a', 'b', 'a', 'b', 'ALLY', ?, 'p', 0, 0)";

        conn.execute(insert, params!["r1", "CANCELLED"]).unwrap();
        conn.execute(insert, params!["r2", "PENDING"]).unwrap();
        assert!(conn.execute(insert, params!["r3", "ACTIVE"]).is_err());
    }
}
