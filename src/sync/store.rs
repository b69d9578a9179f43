//! Sync state persistence
//!
//! The storage contract the sync service relies on, and its SQLite
//! implementation. Writes are conditional: a record only lands if it is newer
//! than what is stored, enforced atomically by the database so concurrent
//! sync calls for the same user cannot regress a record.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{Completion, Goal};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Key-indexed record store consumed by the sync service
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Look up a goal by id regardless of owner or tombstone
    async fn goal_by_id(&self, id: &str) -> Result<Option<Goal>>;

    /// Look up the completion for a goal and day, including tombstoned rows
    async fn completion_by_goal_and_date(
        &self,
        goal_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Completion>>;

    /// Insert or update a goal if it is newer than the stored one.
    ///
    /// Returns `false` when the stored row was kept. Owner and creation time
    /// of an existing row are never changed.
    async fn upsert_goal(&self, goal: &Goal) -> Result<bool>;

    /// Insert or update a completion if it supersedes the stored one.
    ///
    /// Returns `false` when the stored row was kept.
    async fn upsert_completion(&self, completion: &Completion) -> Result<bool>;

    /// Goals of `owner` (guest goals for `None`) updated after `since`,
    /// oldest first. Tombstoned goals are included.
    async fn goal_changes_since(
        &self,
        owner: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Goal>>;

    /// Completions whose parent goal belongs to `owner`, updated after
    /// `since`, oldest first. Tombstoned completions are included.
    async fn completion_changes_since(
        &self,
        owner: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Completion>>;
}

/// SQLite-backed [`SyncStore`]
#[derive(Clone)]
pub struct SqliteSyncStore {
    pool: SqlitePool,
}

impl SqliteSyncStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn goal_by_id(&self, id: &str) -> Result<Option<Goal>> {
        let row = sqlx::query_as::<_, GoalRow>(
            r#"
            SELECT id, owner_id, name, color, position,
                   created_at, updated_at, archived_at, deleted_at
            FROM goals
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GoalRow::into_goal).transpose()
    }

    async fn completion_by_goal_and_date(
        &self,
        goal_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Completion>> {
        let row = sqlx::query_as::<_, CompletionRow>(
            r#"
            SELECT id, goal_id, date, created_at, updated_at, deleted_at
            FROM completions
            WHERE goal_id = ? AND date = ?
            "#,
        )
        .bind(goal_id)
        .bind(encode_date(date))
        .fetch_optional(&self.pool)
        .await?;

        row.map(CompletionRow::into_completion).transpose()
    }

    async fn upsert_goal(&self, goal: &Goal) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO goals (
                id, owner_id, name, color, position,
                created_at, updated_at, archived_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                color = excluded.color,
                position = excluded.position,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at
            WHERE excluded.updated_at > goals.updated_at
            "#,
        )
        .bind(&goal.id)
        .bind(&goal.owner)
        .bind(&goal.name)
        .bind(&goal.color)
        .bind(goal.position)
        .bind(encode_ts(&goal.created_at))
        .bind(encode_ts(&goal.updated_at))
        .bind(goal.archived_at.as_ref().map(encode_ts))
        .bind(goal.deleted_at.as_ref().map(encode_ts))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_completion(&self, completion: &Completion) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO completions (id, goal_id, date, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at
            WHERE excluded.updated_at > completions.updated_at
               OR (excluded.updated_at = completions.updated_at
                   AND excluded.deleted_at IS NULL
                   AND completions.deleted_at IS NOT NULL)
            "#,
        )
        .bind(&completion.id)
        .bind(&completion.goal_id)
        .bind(encode_date(completion.date))
        .bind(encode_ts(&completion.created_at))
        .bind(encode_ts(&completion.updated_at))
        .bind(completion.deleted_at.as_ref().map(encode_ts))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn goal_changes_since(
        &self,
        owner: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Goal>> {
        let since = since.as_ref().map(encode_ts);

        let rows = sqlx::query_as::<_, GoalRow>(
            r#"
            SELECT id, owner_id, name, color, position,
                   created_at, updated_at, archived_at, deleted_at
            FROM goals
            WHERE owner_id IS ? AND (? IS NULL OR updated_at > ?)
            ORDER BY updated_at ASC, id ASC
            "#,
        )
        .bind(owner)
        .bind(&since)
        .bind(&since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GoalRow::into_goal).collect()
    }

    async fn completion_changes_since(
        &self,
        owner: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Completion>> {
        let since = since.as_ref().map(encode_ts);

        let rows = sqlx::query_as::<_, CompletionRow>(
            r#"
            SELECT c.id, c.goal_id, c.date, c.created_at, c.updated_at, c.deleted_at
            FROM completions c
            JOIN goals g ON g.id = c.goal_id
            WHERE g.owner_id IS ? AND (? IS NULL OR c.updated_at > ?)
            ORDER BY c.updated_at ASC, c.id ASC
            "#,
        )
        .bind(owner)
        .bind(&since)
        .bind(&since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CompletionRow::into_completion).collect()
    }
}

fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn decode_optional_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_ts).transpose()
}

fn encode_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[derive(sqlx::FromRow)]
struct GoalRow {
    id: String,
    owner_id: Option<String>,
    name: String,
    color: String,
    position: i32,
    created_at: String,
    updated_at: String,
    archived_at: Option<String>,
    deleted_at: Option<String>,
}

impl GoalRow {
    fn into_goal(self) -> Result<Goal> {
        Ok(Goal {
            id: self.id,
            name: self.name,
            color: self.color,
            position: self.position,
            owner: self.owner_id,
            created_at: decode_ts(&self.created_at)?,
            updated_at: decode_ts(&self.updated_at)?,
            archived_at: decode_optional_ts(self.archived_at)?,
            deleted_at: decode_optional_ts(self.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CompletionRow {
    id: String,
    goal_id: String,
    date: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl CompletionRow {
    fn into_completion(self) -> Result<Completion> {
        Ok(Completion {
            id: self.id,
            goal_id: self.goal_id,
            date: NaiveDate::parse_from_str(&self.date, DATE_FORMAT)?,
            created_at: decode_ts(&self.created_at)?,
            updated_at: decode_ts(&self.updated_at)?,
            deleted_at: decode_optional_ts(self.deleted_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::db::memory_pool;
    use crate::models::completion_id;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn goal(id: &str, owner: Option<&str>, updated_at: DateTime<Utc>) -> Goal {
        Goal {
            id: id.to_string(),
            name: format!("Goal {}", id),
            color: "#123456".to_string(),
            position: 0,
            owner: owner.map(str::to_string),
            created_at: at(0),
            updated_at,
            archived_at: None,
            deleted_at: None,
        }
    }

    fn completion(goal_id: &str, date: NaiveDate, updated_at: DateTime<Utc>) -> Completion {
        Completion {
            id: completion_id(goal_id, date),
            goal_id: goal_id.to_string(),
            date,
            created_at: at(0),
            updated_at,
            deleted_at: None,
        }
    }

    async fn setup_store() -> SqliteSyncStore {
        SqliteSyncStore::new(memory_pool().await)
    }

    #[tokio::test]
    async fn test_goal_roundtrip() {
        let store = setup_store().await;
        assert!(store.goal_by_id("g1").await.unwrap().is_none());

        let mut g = goal("g1", Some("alice"), at(100) + Duration::nanoseconds(123));
        g.archived_at = Some(at(50));
        g.deleted_at = Some(at(100));
        assert!(store.upsert_goal(&g).await.unwrap());

        assert_eq!(store.goal_by_id("g1").await.unwrap(), Some(g));
    }

    #[tokio::test]
    async fn test_goal_upsert_only_when_newer() {
        let store = setup_store().await;
        store.upsert_goal(&goal("g1", Some("alice"), at(100))).await.unwrap();

        let mut same_time = goal("g1", Some("alice"), at(100));
        same_time.name = "Renamed".to_string();
        assert!(!store.upsert_goal(&same_time).await.unwrap());

        let mut older = same_time.clone();
        older.updated_at = at(99);
        assert!(!store.upsert_goal(&older).await.unwrap());
        assert_eq!(store.goal_by_id("g1").await.unwrap().unwrap().name, "Goal g1");

        let mut newer = same_time.clone();
        newer.updated_at = at(101);
        newer.owner = Some("mallory".to_string());
        newer.created_at = at(90);
        assert!(store.upsert_goal(&newer).await.unwrap());

        let stored = store.goal_by_id("g1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.updated_at, at(101));
        // Owner and creation time stay with the first writer
        assert_eq!(stored.owner.as_deref(), Some("alice"));
        assert_eq!(stored.created_at, at(0));
    }

    #[tokio::test]
    async fn test_sub_second_ordering_is_preserved() {
        let store = setup_store().await;
        let base = at(100);
        store.upsert_goal(&goal("g1", Some("alice"), base + Duration::milliseconds(900))).await.unwrap();

        // Fractional seconds across a second boundary
        let newer = goal("g1", Some("alice"), base + Duration::milliseconds(1_100));
        assert!(store.upsert_goal(&newer).await.unwrap());
    }

    #[tokio::test]
    async fn test_completion_lookup_includes_tombstones() {
        let store = setup_store().await;
        store.upsert_goal(&goal("g1", Some("alice"), at(1))).await.unwrap();

        let mut c = completion("g1", day(5), at(100));
        c.deleted_at = Some(at(100));
        store.upsert_completion(&c).await.unwrap();

        let found = store
            .completion_by_goal_and_date("g1", day(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, c);
        assert!(store
            .completion_by_goal_and_date("g1", day(6))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_completion_upsert_gate() {
        let store = setup_store().await;
        store.upsert_goal(&goal("g1", Some("alice"), at(1))).await.unwrap();

        let mut tombstoned = completion("g1", day(5), at(100));
        tombstoned.deleted_at = Some(at(100));
        assert!(store.upsert_completion(&tombstoned).await.unwrap());

        // Equal-timestamp tombstone over tombstone: kept
        assert!(!store.upsert_completion(&tombstoned).await.unwrap());

        // Equal-timestamp revive: written
        let revived = completion("g1", day(5), at(100));
        assert!(store.upsert_completion(&revived).await.unwrap());

        // Equal-timestamp removal of an active mark: kept
        assert!(!store.upsert_completion(&tombstoned).await.unwrap());
        assert!(store
            .completion_by_goal_and_date("g1", day(5))
            .await
            .unwrap()
            .unwrap()
            .is_active());

        let mut later = tombstoned.clone();
        later.updated_at = at(120);
        later.deleted_at = Some(at(120));
        assert!(store.upsert_completion(&later).await.unwrap());
    }

    #[tokio::test]
    async fn test_changes_since_filters_by_owner_and_time() {
        let store = setup_store().await;
        store.upsert_goal(&goal("a1", Some("alice"), at(100))).await.unwrap();
        store.upsert_goal(&goal("a2", Some("alice"), at(200))).await.unwrap();
        store.upsert_goal(&goal("b1", Some("bob"), at(300))).await.unwrap();
        store.upsert_goal(&goal("guest", None, at(300))).await.unwrap();

        store.upsert_completion(&completion("a1", day(1), at(150))).await.unwrap();
        let mut removed = completion("a2", day(2), at(250));
        removed.deleted_at = Some(at(250));
        store.upsert_completion(&removed).await.unwrap();
        store.upsert_completion(&completion("b1", day(3), at(350))).await.unwrap();

        let all: Vec<String> = store
            .goal_changes_since(Some("alice"), None)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(all, vec!["a1", "a2"]);

        let recent = store.goal_changes_since(Some("alice"), Some(at(100))).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "a2");

        let guest = store.goal_changes_since(None, None).await.unwrap();
        assert_eq!(guest.len(), 1);
        assert_eq!(guest[0].id, "guest");

        let completions = store
            .completion_changes_since(Some("alice"), Some(at(150)))
            .await
            .unwrap();
        assert_eq!(completions, vec![removed]);

        let bob = store.completion_changes_since(Some("bob"), None).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].goal_id, "b1");
    }

    #[tokio::test]
    async fn test_completion_requires_existing_goal() {
        let store = setup_store().await;
        let orphan = completion("missing", day(1), at(1));
        assert!(store.upsert_completion(&orphan).await.is_err());
    }
}
