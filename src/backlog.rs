//! Curriculum backlog: the ordered list of problems to work through.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DrillError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

/// One problem in the curriculum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub slug: String,
    pub display_name: String,
    pub difficulty: Difficulty,
    pub group_id: String,
}

impl WorkItem {
    /// Placeholder for a slug no longer present in the curriculum.
    pub fn unknown(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            display_name: slug.to_string(),
            difficulty: Difficulty::Medium,
            group_id: String::new(),
        }
    }
}

/// Supplies the curriculum in a stable order for the duration of a run.
pub trait BacklogProvider {
    fn ordered_backlog(&self) -> Result<Vec<WorkItem>, DrillError>;
}

impl BacklogProvider for Vec<WorkItem> {
    fn ordered_backlog(&self) -> Result<Vec<WorkItem>, DrillError> {
        Ok(self.clone())
    }
}

/// Curriculum read once from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct FileBacklog {
    items: Vec<WorkItem>,
}

impl FileBacklog {
    /// Loads the curriculum. A missing file yields an empty backlog.
    pub fn load(path: &Path) -> Result<Self, DrillError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "backlog file not found, using an empty curriculum");
            return Ok(Self { items: Vec::new() });
        }
        let contents = std::fs::read_to_string(path)?;
        let items: Vec<WorkItem> = serde_json::from_str(&contents)?;
        tracing::debug!(path = %path.display(), items = items.len(), "backlog loaded");
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl BacklogProvider for FileBacklog {
    fn ordered_backlog(&self) -> Result<Vec<WorkItem>, DrillError> {
        Ok(self.items.clone())
    }
}

/// Looks each slug up in the backlog, keeping the slug order.
pub fn resolve(backlog: &[WorkItem], slugs: &[String]) -> Vec<WorkItem> {
    slugs
        .iter()
        .map(|slug| {
            backlog
                .iter()
                .find(|item| &item.slug == slug)
                .cloned()
                .unwrap_or_else(|| WorkItem::unknown(slug))
        })
        .collect()
}
