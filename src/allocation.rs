//! Picks the next batch from outstanding work and the curriculum.
//!
//! Outstanding work always goes first: unsolved sent items, oldest first,
//! then the pending queue. New curriculum items only fill the remaining
//! slots of the daily quota.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::backlog::WorkItem;
use crate::store::{ProgressState, SentItem, SettingsSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Slugs to send this run, in send order.
    pub batch: Vec<String>,
    /// Batch slugs carried over from earlier runs.
    pub unfinished: Vec<String>,
    /// Batch slugs pulled from the curriculum this run.
    pub fresh: Vec<String>,
    pub new_position: u64,
    pub new_pending_queue: Vec<String>,
    pub plan_complete: bool,
    pub backlog_exhausted: bool,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Folds this allocation into `state` as the record of a send on `today`.
    ///
    /// Solved records stay. Unsolved records in the batch stay untouched;
    /// unsolved records pushed back to the queue are dropped from
    /// `sent_items`. Batch slugs without an outstanding record get a new
    /// one stamped `now`.
    pub fn apply_to(
        &self,
        state: &mut ProgressState,
        today: NaiveDate,
        now: DateTime<Utc>,
        snapshot: SettingsSnapshot,
    ) {
        let deferred: HashSet<&str> = self.new_pending_queue.iter().map(String::as_str).collect();
        state
            .sent_items
            .retain(|item| item.solved || !deferred.contains(item.slug.as_str()));

        let outstanding: HashSet<String> = state.unsolved().map(|item| item.slug.clone()).collect();
        for slug in &self.batch {
            if !outstanding.contains(slug) {
                state.sent_items.push(SentItem::fresh(slug, now));
            }
        }

        state.backlog_position = self.new_position;
        state.pending_queue = self.new_pending_queue.clone();
        state.last_sent_date = Some(today);
        state.settings_snapshot = Some(snapshot);
    }
}

/// Computes the next batch. Pure: same inputs, same allocation.
pub fn compute(state: &ProgressState, quota: u32, backlog: &[WorkItem]) -> Allocation {
    let quota = quota as usize;

    let mut unsolved: Vec<&SentItem> = state.unsolved().collect();
    unsolved.sort_by_key(|item| item.sent_date);

    let mut seen = HashSet::new();
    let mut pending: Vec<String> = Vec::new();
    for slug in unsolved
        .iter()
        .map(|item| item.slug.as_str())
        .chain(state.pending_queue.iter().map(String::as_str))
    {
        if seen.insert(slug) {
            pending.push(slug.to_string());
        }
    }

    let start = usize::try_from(state.backlog_position)
        .unwrap_or(usize::MAX)
        .min(backlog.len());

    let (batch, new_pending_queue, pulled) = if pending.len() >= quota {
        let rest = pending.split_off(quota);
        (pending, rest, 0)
    } else {
        let wanted = quota - pending.len();
        let mut batch = pending;
        let mut pulled = 0;
        let mut added = 0;
        for item in &backlog[start..] {
            if added == wanted {
                break;
            }
            // Duplicates are consumed without taking a slot.
            pulled += 1;
            if seen.insert(item.slug.as_str()) {
                batch.push(item.slug.clone());
                added += 1;
            }
        }
        (batch, Vec::new(), pulled)
    };

    let carried = seen_before(state);
    let (unfinished, fresh): (Vec<String>, Vec<String>) = batch
        .iter()
        .cloned()
        .partition(|slug| carried.contains(slug.as_str()));

    let new_position = state.backlog_position + pulled as u64;
    let backlog_exhausted = start + pulled >= backlog.len();

    Allocation {
        plan_complete: batch.is_empty() && backlog_exhausted,
        batch,
        unfinished,
        fresh,
        new_position,
        new_pending_queue,
        backlog_exhausted,
    }
}

fn seen_before(state: &ProgressState) -> HashSet<&str> {
    state
        .unsolved()
        .map(|item| item.slug.as_str())
        .chain(state.pending_queue.iter().map(String::as_str))
        .collect()
}
