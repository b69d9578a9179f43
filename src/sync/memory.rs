//! In-memory sync store
//!
//! Same contract as the SQLite store with a single mutex standing in for the
//! database's atomic conditional write. Used by tests and embedded setups.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

use super::merge::{completion_supersedes, goal_supersedes};
use super::store::SyncStore;
use crate::error::Result;
use crate::models::{completion_id, Completion, Goal};

#[derive(Default)]
struct Tables {
    goals: HashMap<String, Goal>,
    completions: HashMap<String, Completion>,
}

/// Mutex-guarded [`SyncStore`]
#[derive(Default)]
pub struct MemorySyncStore {
    tables: Mutex<Tables>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored goal, ordered by id
    pub fn goals(&self) -> Vec<Goal> {
        let mut goals: Vec<Goal> = self.tables.lock().goals.values().cloned().collect();
        goals.sort_by(|a, b| a.id.cmp(&b.id));
        goals
    }

    /// Snapshot of every stored completion, ordered by id
    pub fn completions(&self) -> Vec<Completion> {
        let mut completions: Vec<Completion> =
            self.tables.lock().completions.values().cloned().collect();
        completions.sort_by(|a, b| a.id.cmp(&b.id));
        completions
    }
}

fn is_after(updated_at: DateTime<Utc>, since: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |since| updated_at > since)
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn goal_by_id(&self, id: &str) -> Result<Option<Goal>> {
        Ok(self.tables.lock().goals.get(id).cloned())
    }

    async fn completion_by_goal_and_date(
        &self,
        goal_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Completion>> {
        let id = completion_id(goal_id, date);
        Ok(self.tables.lock().completions.get(&id).cloned())
    }

    async fn upsert_goal(&self, goal: &Goal) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.goals.entry(goal.id.clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                if !goal_supersedes(goal, stored) {
                    return Ok(false);
                }
                stored.name = goal.name.clone();
                stored.color = goal.color.clone();
                stored.position = goal.position;
                stored.updated_at = goal.updated_at;
                stored.deleted_at = goal.deleted_at;
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(goal.clone());
                Ok(true)
            }
        }
    }

    async fn upsert_completion(&self, completion: &Completion) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.completions.entry(completion.id.clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                if !completion_supersedes(completion, stored) {
                    return Ok(false);
                }
                stored.updated_at = completion.updated_at;
                stored.deleted_at = completion.deleted_at;
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(completion.clone());
                Ok(true)
            }
        }
    }

    async fn goal_changes_since(
        &self,
        owner: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Goal>> {
        let tables = self.tables.lock();
        let mut goals: Vec<Goal> = tables
            .goals
            .values()
            .filter(|g| g.owner.as_deref() == owner && is_after(g.updated_at, since))
            .cloned()
            .collect();
        goals.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
        Ok(goals)
    }

    async fn completion_changes_since(
        &self,
        owner: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Completion>> {
        let tables = self.tables.lock();
        let mut completions: Vec<Completion> = tables
            .completions
            .values()
            .filter(|c| {
                tables
                    .goals
                    .get(&c.goal_id)
                    .is_some_and(|g| g.owner.as_deref() == owner)
                    && is_after(c.updated_at, since)
            })
            .cloned()
            .collect();
        completions.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
        Ok(completions)
    }
}
