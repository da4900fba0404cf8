//! Schema DDL and connection setup for the quiz database.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

use super::StoreError;

/// Schema version stored in `PRAGMA user_version`.
/// Increment when the DDL changes and add a migration step to `init_schema`.
pub(crate) const SCHEMA_VERSION: i64 = 1;

const DDL_V1: &str = "
    CREATE TABLE IF NOT EXISTS player_profile (
        player_id       TEXT PRIMARY KEY,
        external_ref    TEXT NOT NULL UNIQUE,
        preferred_name  TEXT NOT NULL,
        country         TEXT NOT NULL DEFAULT 'PT',
        created_at      TEXT NOT NULL,
        stats           TEXT
    );

    CREATE TABLE IF NOT EXISTS quiz (
        quiz_id             TEXT PRIMARY KEY,
        title               TEXT NOT NULL,
        description         TEXT,
        time_per_question   INTEGER NOT NULL,
        allow_powerups      INTEGER NOT NULL DEFAULT 0,
        is_published        INTEGER NOT NULL DEFAULT 1,
        version             INTEGER NOT NULL DEFAULT 1,
        created_at          TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS question (
        question_id     TEXT PRIMARY KEY,
        quiz_id         TEXT NOT NULL REFERENCES quiz(quiz_id),
        text            TEXT NOT NULL,
        type            TEXT NOT NULL,
        order_index     INTEGER NOT NULL,
        points_base     INTEGER NOT NULL,
        created_at      TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_question_quiz ON question(quiz_id, order_index);

    CREATE TABLE IF NOT EXISTS question_option (
        option_id       TEXT PRIMARY KEY,
        question_id     TEXT NOT NULL REFERENCES question(question_id),
        text            TEXT NOT NULL,
        is_correct      INTEGER NOT NULL,
        option_index    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_option_question ON question_option(question_id);

    CREATE TABLE IF NOT EXISTS room (
        room_id         TEXT PRIMARY KEY,
        quiz_id         TEXT NOT NULL REFERENCES quiz(quiz_id),
        pin_code        TEXT NOT NULL UNIQUE,
        status          TEXT NOT NULL,
        max_players     INTEGER NOT NULL,
        created_at      TEXT NOT NULL,
        started_at      TEXT,
        finished_at     TEXT
    );

    CREATE TABLE IF NOT EXISTS room_player (
        room_player_id          TEXT PRIMARY KEY,
        room_id                 TEXT NOT NULL REFERENCES room(room_id),
        player_id               TEXT REFERENCES player_profile(player_id),
        nickname                TEXT NOT NULL,
        current_question_index  INTEGER NOT NULL DEFAULT 0,
        total_points            INTEGER NOT NULL DEFAULT 0,
        joined_at               TEXT NOT NULL,
        UNIQUE (room_id, nickname)
    );

    CREATE TABLE IF NOT EXISTS answer (
        answer_id           TEXT PRIMARY KEY,
        room_player_id      TEXT NOT NULL REFERENCES room_player(room_player_id),
        question_id         TEXT NOT NULL REFERENCES question(question_id),
        selected_option_id  TEXT,
        answer_text         TEXT,
        points_awarded      INTEGER NOT NULL,
        is_correct          INTEGER NOT NULL,
        answered_at         TEXT NOT NULL,
        UNIQUE (room_player_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS leaderboard_entry (
        entry_id        TEXT PRIMARY KEY,
        room_id         TEXT NOT NULL REFERENCES room(room_id),
        room_player_id  TEXT NOT NULL REFERENCES room_player(room_player_id),
        nickname        TEXT NOT NULL,
        rank            INTEGER NOT NULL,
        total_points    INTEGER NOT NULL,
        recorded_at     TEXT NOT NULL
    );
";

/// Open a SQLite connection and apply the pragmas every store connection needs.
///
/// `:memory:` is passed straight through; WAL is skipped for it since
/// in-memory databases cannot use it.
pub(crate) fn open_conn(db_path: &Path) -> Result<Connection, StoreError> {
    let in_memory = db_path.as_os_str() == ":memory:";
    let conn = if in_memory {
        Connection::open_in_memory()?
    } else {
        Connection::open(db_path)?
    };

    if !in_memory {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(conn)
}

/// Create every table if needed. Re-running on an up-to-date file is a no-op.
pub(crate) fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    if version < SCHEMA_VERSION {
        conn.execute_batch(DDL_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Current UTC time as RFC 3339 with second precision, e.g. `"2026-04-01T12:00:00Z"`.
pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
