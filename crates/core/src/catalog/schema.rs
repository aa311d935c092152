use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

/// Schema version this build of the code writes and understands.
pub const SCHEMA_VERSION: u32 = 3;

/// Create the base (version 1) layout. Safe to run against any existing catalog.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS folders (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS images (
            id          TEXT PRIMARY KEY,
            folder_id   TEXT NOT NULL,
            name        TEXT NOT NULL,
            payload     TEXT NOT NULL,
            embedding   BLOB NOT NULL,
            created_at  INTEGER NOT NULL,
            width       INTEGER NOT NULL,
            height      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_images_folder ON images(folder_id);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Bring the catalog up to [`SCHEMA_VERSION`].
///
/// A catalog without a recorded version is treated as version 1. Each step runs in
/// its own transaction together with the version bump, so a crash between steps
/// leaves a consistent catalog that resumes from the last completed step.
pub fn migrate(conn: &Connection) -> Result<()> {
    let mut version = current_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(Error::SchemaTooNew {
            db: version,
            code: SCHEMA_VERSION,
        });
    }

    if current_version_recorded(conn)?.is_none() {
        set_version(conn, version)?;
    }

    while version < SCHEMA_VERSION {
        let next = version + 1;
        let tx = conn.unchecked_transaction()?;
        match next {
            2 => migrate_v2(&tx)?,
            3 => migrate_v3(&tx)?,
            _ => unreachable!("no migration defined for schema version {next}"),
        }
        set_version(&tx, next)?;
        tx.commit()?;
        info!(from = version, to = next, "migrated catalog schema");
        version = next;
    }
    Ok(())
}

/// v2: composite index backing newest-first pagination within a folder.
/// `id` is the trailing key so equal timestamps have a fixed order.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_images_folder_created
             ON images(folder_id, created_at, id);",
    )?;
    Ok(())
}

/// v3: face-region embeddings stored alongside the image embedding.
fn migrate_v3(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "images", "faces")? {
        conn.execute_batch("ALTER TABLE images ADD COLUMN faces BLOB;")?;
    }
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(current_version_recorded(conn)?.unwrap_or(1))
}

fn current_version_recorded(conn: &Connection) -> Result<Option<u32>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match value {
        None => Ok(None),
        Some(v) => v.trim().parse::<u32>().map(Some).map_err(|_| Error::CorruptRecord {
            id: "config.schema_version".to_string(),
            reason: format!("not a version number: {v:?}"),
        }),
    }
}

fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO config (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![version.to_string()],
    )?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
