//! Versioned state documents with atomic updates and checkpoint/rollback.
//!
//! Two documents are managed: `progress` ([`ProgressState`]) and
//! `settings` ([`Settings`]). A third, `checkpoint`, holds the recovery
//! record of an in-flight run.

pub mod checkpoint;
pub mod document;
pub mod model;
pub mod schema;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use checkpoint::Checkpoint;
#[cfg(test)]
pub use document::MemoryDocumentStore;
pub use document::{DocumentStore, FileDocumentStore, stored_version};
pub use model::{ProgressState, SentItem, Settings, SettingsSnapshot, StateDocument};

use crate::error::DrillError;
use crate::resilience::RetryPolicyEngine;
use crate::resilience::strategy::NORMAL;

pub const CHECKPOINT_DOC: &str = "checkpoint";

/// Stored fields overlaid on defaults, then validated and decoded.
fn decode<D: StateDocument>(raw: Option<Value>) -> Result<D, String> {
    let Some(stored) = raw else {
        return Ok(D::default());
    };
    let defaults = serde_json::to_value(D::default()).map_err(|e| e.to_string())?;
    let merged = schema::merge_defaults(defaults, stored);
    D::validate_value(&merged)?;
    serde_json::from_value(merged).map_err(|e| e.to_string())
}

pub struct StateStore<S> {
    documents: S,
    engine: RetryPolicyEngine,
}

impl<S: DocumentStore> StateStore<S> {
    pub fn new(documents: S, engine: RetryPolicyEngine) -> Self {
        Self { documents, engine }
    }

    pub fn engine(&self) -> &RetryPolicyEngine {
        &self.engine
    }

    pub fn documents(&self) -> &S {
        &self.documents
    }

    /// Reads a document. Store failures propagate; a corrupt or invalid
    /// document degrades to defaults.
    pub async fn read<D: StateDocument>(&self) -> Result<D, DrillError> {
        let documents = &self.documents;
        let raw = match self
            .engine
            .execute(NORMAL, move || documents.get(D::DOC_ID))
            .await
        {
            Ok(raw) => raw,
            Err(DrillError::Json(e)) => {
                warn!(document = D::DOC_ID, error = %e, "stored document is not JSON, using defaults");
                return Ok(D::default());
            }
            Err(e) => return Err(e),
        };
        Ok(decode(raw).unwrap_or_else(|reason| {
            warn!(document = D::DOC_ID, %reason, "stored document failed validation, using defaults");
            D::default()
        }))
    }

    /// Like [`read`](Self::read) but never fails; errors are logged.
    pub async fn load<D: StateDocument>(&self) -> D {
        match self.read().await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(document = D::DOC_ID, error = %e, "document store unavailable, using defaults");
                D::default()
            }
        }
    }

    /// Read-modify-write under the `normal` strategy.
    ///
    /// The result is validated before anything is written, stamped with
    /// `version + 1`, and only stored if the version read is still current.
    /// A lost race surfaces as a transient conflict and is retried.
    pub async fn atomic_update<D, F>(&self, update: F) -> Result<D, DrillError>
    where
        D: StateDocument,
        F: Fn(&mut D) -> Result<(), DrillError>,
    {
        let update = &update;
        self.engine
            .execute(NORMAL, move || self.try_update(update))
            .await
    }

    async fn try_update<D, F>(&self, update: &F) -> Result<D, DrillError>
    where
        D: StateDocument,
        F: Fn(&mut D) -> Result<(), DrillError>,
    {
        let raw = self.documents.get(D::DOC_ID).await?;
        let expected = raw.as_ref().map(|d| stored_version(d).unwrap_or(0));
        let mut doc: D = decode(raw).unwrap_or_else(|reason| {
            warn!(document = D::DOC_ID, %reason, "overwriting invalid document");
            D::default()
        });
        let next_version = expected.unwrap_or(0).max(doc.version()) + 1;

        update(&mut doc)?;
        doc.set_version(next_version);
        doc.set_last_modified(Utc::now());

        let value = serde_json::to_value(&doc)?;
        D::validate_value(&value).map_err(|reason| DrillError::validation(D::DOC_ID, reason))?;
        self.documents
            .compare_and_set(D::DOC_ID, expected, value)
            .await?;
        debug!(document = D::DOC_ID, version = next_version, "document updated");
        Ok(doc)
    }

    /// Snapshots both documents and persists the snapshot as a recovery record.
    pub async fn checkpoint(&self) -> Result<Checkpoint, DrillError> {
        let progress: ProgressState = self.read().await?;
        let settings: Settings = self.read().await?;
        let checkpoint = Checkpoint::new(progress, settings);

        let record = serde_json::to_value(&checkpoint)?;
        let documents = &self.documents;
        self.engine
            .execute(NORMAL, move || documents.set(CHECKPOINT_DOC, record.clone()))
            .await?;
        info!(
            checkpoint = %checkpoint.id(),
            progress_version = checkpoint.progress().version,
            settings_version = checkpoint.settings().version,
            "checkpoint taken"
        );
        Ok(checkpoint)
    }

    /// Restores both documents from `checkpoint`.
    ///
    /// Restored documents get `version = max(current, snapshot) + 1` and
    /// `restoredFrom = checkpoint.createdAt`; everything else equals the
    /// snapshot. Safe to retry: every attempt writes the same content.
    pub async fn rollback(&self, checkpoint: Checkpoint) -> Result<(), DrillError> {
        let snapshot = &checkpoint;
        self.engine
            .execute(NORMAL, move || self.try_rollback(snapshot))
            .await?;
        info!(checkpoint = %checkpoint.id(), "state restored from checkpoint");

        if let Err(e) = self.discard_checkpoint(checkpoint.id()).await {
            warn!(checkpoint = %checkpoint.id(), error = %e, "restored, but the recovery record could not be removed");
        }
        Ok(())
    }

    async fn try_rollback(&self, checkpoint: &Checkpoint) -> Result<(), DrillError> {
        let from = checkpoint.created_at();
        let progress = self.restored(checkpoint.progress(), from).await?;
        let settings = self.restored(checkpoint.settings(), from).await?;
        self.documents
            .set_many(vec![
                (ProgressState::DOC_ID.to_string(), progress),
                (Settings::DOC_ID.to_string(), settings),
            ])
            .await
    }

    async fn restored<D: StateDocument>(
        &self,
        snapshot: &D,
        from: DateTime<Utc>,
    ) -> Result<Value, DrillError> {
        let current = match self.documents.get(D::DOC_ID).await {
            Ok(raw) => raw.as_ref().and_then(stored_version).unwrap_or(0),
            Err(DrillError::Json(_)) => 0,
            Err(e) => return Err(e),
        };
        let mut doc = snapshot.clone();
        doc.set_version(current.max(snapshot.version()) + 1);
        doc.set_restored_from(Some(from));
        Ok(serde_json::to_value(&doc)?)
    }

    /// Applies the leftover recovery record, if any, and returns its id.
    ///
    /// A failed restore is a [`DrillError::RollbackFailure`]; the record
    /// stays in place for the next attempt.
    pub async fn restore_pending(&self) -> Result<Option<Uuid>, DrillError> {
        let Some(checkpoint) = self.pending_checkpoint().await? else {
            return Ok(None);
        };
        let id = checkpoint.id();
        match self.rollback(checkpoint).await {
            Ok(()) => Ok(Some(id)),
            Err(e) => Err(DrillError::RollbackFailure {
                checkpoint: id,
                cause: Box::new(DrillError::RestorePending { checkpoint: id }),
                rollback: Box::new(e),
            }),
        }
    }

    /// Recovery record left behind by a run that never finished cleanly.
    pub async fn pending_checkpoint(&self) -> Result<Option<Checkpoint>, DrillError> {
        let documents = &self.documents;
        let raw = self
            .engine
            .execute(NORMAL, move || documents.get(CHECKPOINT_DOC))
            .await?;
        raw.map(serde_json::from_value).transpose().map_err(DrillError::from)
    }

    /// Removes the recovery record if it still belongs to checkpoint `id`.
    pub async fn discard_checkpoint(&self, id: Uuid) -> Result<(), DrillError> {
        let Some(current) = self.pending_checkpoint().await? else {
            return Ok(());
        };
        if current.id() != id {
            debug!(checkpoint = %id, current = %current.id(), "recovery record belongs to another run");
            return Ok(());
        }
        let documents = &self.documents;
        self.engine
            .execute(NORMAL, move || documents.delete(CHECKPOINT_DOC))
            .await
    }
}
