//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

// Timestamps are fixed-width RFC 3339 UTC strings (nanosecond precision), so
// text comparison in SQL matches chronological order.
const SCHEMA_SQL: &str = r#"
-- Goals (habit definitions)
CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    -- NULL for guest-mode goals
    owner_id TEXT,
    name TEXT NOT NULL,
    color TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    archived_at TEXT,
    -- Sync tombstone
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_goals_owner ON goals(owner_id);
CREATE INDEX IF NOT EXISTS idx_goals_owner_updated ON goals(owner_id, updated_at);

-- Daily completions; id is always '<goal_id>-<YYYY-MM-DD>'
CREATE TABLE IF NOT EXISTS completions (
    id TEXT PRIMARY KEY,
    goal_id TEXT NOT NULL REFERENCES goals(id),
    date TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,

    UNIQUE(goal_id, date)
);

CREATE INDEX IF NOT EXISTS idx_completions_goal ON completions(goal_id);
CREATE INDEX IF NOT EXISTS idx_completions_updated ON completions(updated_at);
"#;
