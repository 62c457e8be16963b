use std::path::Path;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS fetch_cache (
            url          TEXT PRIMARY KEY,
            status       INTEGER NOT NULL,
            content_type TEXT,
            body         BLOB NOT NULL,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

pub fn get_cached(conn: &Connection, url: &str) -> Result<Option<CachedResponse>> {
    let row = conn
        .query_row(
            "SELECT status, content_type, body FROM fetch_cache WHERE url = ?1",
            [url],
            |r| {
                Ok(CachedResponse {
                    status: r.get(0)?,
                    content_type: r.get(1)?,
                    body: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Append-only: an existing entry for `url` is never replaced.
pub fn store(conn: &Connection, url: &str, response: &CachedResponse) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO fetch_cache (url, status, content_type, body) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![url, response.status, response.content_type, response.body],
    )?;
    Ok(inserted > 0)
}

pub struct Stats {
    pub entries: usize,
    pub json: usize,
    pub bytes: u64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let entries: usize = conn.query_row("SELECT COUNT(*) FROM fetch_cache", [], |r| r.get(0))?;
    let json: usize = conn.query_row(
        "SELECT COUNT(*) FROM fetch_cache WHERE url LIKE '%.json'",
        [],
        |r| r.get(0),
    )?;
    let bytes: u64 = conn.query_row(
        "SELECT COALESCE(SUM(LENGTH(body)), 0) FROM fetch_cache",
        [],
        |r| r.get(0),
    )?;
    let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(fetched_at), MAX(fetched_at) FROM fetch_cache",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(Stats {
        entries,
        json,
        bytes,
        oldest,
        newest,
    })
}

// ── Tests ──
