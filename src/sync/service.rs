//! Sync orchestration
//!
//! Drives one sync round: authorizes each client change, runs the merge
//! rules, persists accepted records and assembles the authoritative response.
//!
//! A batch is not atomic. Each record is written independently, so a storage
//! failure part-way leaves earlier writes in place. Retrying the whole batch
//! is safe because every merge is idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use super::merge::{merge_completion, merge_goal, MergeOutcome};
use super::store::SyncStore;
use super::types::{CompletionChange, GoalChange, SyncRequest, SyncResponse};
use crate::error::Result;

/// Per-round counters, logged once the round completes
#[derive(Debug, Default)]
struct RoundStats {
    applied: usize,
    overridden: usize,
    skipped: usize,
    lost_races: usize,
}

/// Multi-device sync service
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn SyncStore>,
}

impl SyncService {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    /// Merge a client's change batch and return what the client must apply
    /// locally: the server versions that beat its changes, followed by
    /// everything changed since its last checkpoint.
    pub async fn apply_changes(&self, user_id: &str, request: &SyncRequest) -> Result<SyncResponse> {
        let server_time = Utc::now();
        let mut stats = RoundStats::default();

        let mut goal_overrides = Vec::new();
        for change in &request.goals {
            if let Some(server) = self.apply_goal(user_id, change, server_time, &mut stats).await? {
                goal_overrides.push(server);
            }
        }

        let mut completion_overrides = Vec::new();
        for change in &request.completions {
            if let Some(server) = self
                .apply_completion(user_id, change, server_time, &mut stats)
                .await?
            {
                completion_overrides.push(server);
            }
        }

        stats.overridden = goal_overrides.len() + completion_overrides.len();

        if let Some(since) = request.last_synced_at {
            let feed = self.changes_since(user_id, Some(since)).await?;
            append_catch_up(&mut goal_overrides, &mut completion_overrides, feed);
        }

        tracing::info!(
            user_id,
            goals = request.goals.len(),
            completions = request.completions.len(),
            applied = stats.applied,
            overridden = stats.overridden,
            skipped = stats.skipped,
            lost_races = stats.lost_races,
            returned = goal_overrides.len() + completion_overrides.len(),
            "sync round complete"
        );

        Ok(SyncResponse {
            server_time,
            goals: goal_overrides,
            completions: completion_overrides,
        })
    }

    /// Every goal and completion of `user_id` updated after `since`,
    /// tombstones included. Without `since` this is the full dataset.
    pub async fn changes_since(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<SyncResponse> {
        let goals = self.store.goal_changes_since(Some(user_id), since).await?;
        let completions = self
            .store
            .completion_changes_since(Some(user_id), since)
            .await?;

        Ok(SyncResponse {
            server_time: Utc::now(),
            goals: goals.iter().map(GoalChange::from).collect(),
            completions: completions.iter().map(CompletionChange::from).collect(),
        })
    }

    /// Returns the server state to report back when the server wins.
    async fn apply_goal(
        &self,
        user_id: &str,
        change: &GoalChange,
        now: DateTime<Utc>,
        stats: &mut RoundStats,
    ) -> Result<Option<GoalChange>> {
        let server = self.store.goal_by_id(&change.id).await?;

        if let Some(existing) = &server {
            if !existing.is_owned_by(user_id) {
                tracing::debug!(user_id, goal_id = %change.id, "skipping change to foreign goal");
                stats.skipped += 1;
                return Ok(None);
            }
        }

        match merge_goal(change, server.as_ref(), now) {
            MergeOutcome::Apply(mut goal) => {
                if server.is_none() {
                    goal.owner = Some(user_id.to_string());
                }
                if self.store.upsert_goal(&goal).await? {
                    stats.applied += 1;
                    return Ok(None);
                }

                // A concurrent sync stored a newer version first
                tracing::debug!(goal_id = %goal.id, "goal write rejected by store");
                stats.lost_races += 1;
                let winner = self.store.goal_by_id(&goal.id).await?;
                Ok(winner.as_ref().map(GoalChange::from))
            }
            MergeOutcome::Keep => Ok(server.as_ref().map(GoalChange::from)),
        }
    }

    async fn apply_completion(
        &self,
        user_id: &str,
        change: &CompletionChange,
        now: DateTime<Utc>,
        stats: &mut RoundStats,
    ) -> Result<Option<CompletionChange>> {
        let owned = self
            .store
            .goal_by_id(&change.goal_id)
            .await?
            .is_some_and(|goal| goal.is_owned_by(user_id));
        if !owned {
            tracing::debug!(
                user_id,
                goal_id = %change.goal_id,
                date = %change.date,
                "skipping completion for missing or foreign goal"
            );
            stats.skipped += 1;
            return Ok(None);
        }

        let server = self
            .store
            .completion_by_goal_and_date(&change.goal_id, change.date)
            .await?;

        match merge_completion(change, server.as_ref(), now) {
            MergeOutcome::Apply(completion) => {
                if self.store.upsert_completion(&completion).await? {
                    stats.applied += 1;
                    return Ok(None);
                }

                tracing::debug!(completion_id = %completion.id, "completion write rejected by store");
                stats.lost_races += 1;
                let winner = self
                    .store
                    .completion_by_goal_and_date(&completion.goal_id, completion.date)
                    .await?;
                Ok(winner.as_ref().map(CompletionChange::from))
            }
            MergeOutcome::Keep => Ok(server.as_ref().map(CompletionChange::from)),
        }
    }
}

/// Append the catch-up feed to the override lists without reporting any
/// entity twice.
fn append_catch_up(
    goals: &mut Vec<GoalChange>,
    completions: &mut Vec<CompletionChange>,
    feed: SyncResponse,
) {
    let mut seen_goals: HashSet<String> = goals.iter().map(|g| g.id.clone()).collect();
    for change in feed.goals {
        if seen_goals.insert(change.id.clone()) {
            goals.push(change);
        }
    }

    let mut seen_slots: HashSet<(String, NaiveDate)> = completions
        .iter()
        .map(|c| (c.goal_id.clone(), c.date))
        .collect();
    for change in feed.completions {
        if seen_slots.insert((change.goal_id.clone(), change.date)) {
            completions.push(change);
        }
    }
}
