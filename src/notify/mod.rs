//! Delivery of the daily batch.
//!
//! Delivery is at-least-once: a run that fails after notifying rolls back
//! and the next run sends the same batch again.

pub mod console;
pub mod webhook;

use crate::allocation::Allocation;
use crate::backlog::{self, WorkItem};
use crate::error::DrillError;

pub use console::ConsoleNotifier;
pub use webhook::WebhookNotifier;

/// Batch items split by where they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Categorized {
    pub unfinished: Vec<WorkItem>,
    pub fresh: Vec<WorkItem>,
}

impl Categorized {
    pub fn from_allocation(allocation: &Allocation, backlog: &[WorkItem]) -> Self {
        Self {
            unfinished: backlog::resolve(backlog, &allocation.unfinished),
            fresh: backlog::resolve(backlog, &allocation.fresh),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, batch: &[WorkItem], categorized: &Categorized) -> Result<(), DrillError>;
}

/// Notifier chosen at startup from configuration.
pub enum AnyNotifier {
    Webhook(WebhookNotifier),
    Console(ConsoleNotifier),
}

impl Notifier for AnyNotifier {
    async fn send(&self, batch: &[WorkItem], categorized: &Categorized) -> Result<(), DrillError> {
        match self {
            AnyNotifier::Webhook(n) => n.send(batch, categorized).await,
            AnyNotifier::Console(n) => n.send(batch, categorized).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::Difficulty;

    #[test]
    fn categorized_resolves_display_names() {
        let backlog = vec![WorkItem {
            slug: "two-sum".into(),
            display_name: "Two Sum".into(),
            difficulty: Difficulty::Easy,
            group_id: "arrays".into(),
        }];
        let allocation = Allocation {
            batch: vec!["retired".into(), "two-sum".into()],
            unfinished: vec!["retired".into()],
            fresh: vec!["two-sum".into()],
            new_position: 1,
            new_pending_queue: vec![],
            plan_complete: false,
            backlog_exhausted: true,
        };
        let categorized = Categorized::from_allocation(&allocation, &backlog);
        assert_eq!(categorized.fresh[0].display_name, "Two Sum");
        assert_eq!(categorized.unfinished[0], WorkItem::unknown("retired"));
    }
}
