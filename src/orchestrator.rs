use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::allocation::{self, Allocation};
use crate::api::{Profile, SubmissionApi, SubmissionPage};
use crate::backlog::{self, BacklogProvider, WorkItem};
use crate::error::DrillError;
use crate::notify::{Categorized, Notifier};
use crate::resilience::strategy::{COLD_START, FAST, NORMAL};
use crate::resilience::{BreakerState, RetryPolicyEngine};
use crate::state_machine::{RunOutcome, RunRecord, RunState, StateMachine};
use crate::store::{DocumentStore, ProgressState, Settings, StateDocument, StateStore};

/// A collaborator paired with the engine that guards calls to it.
pub struct Guarded<T> {
    inner: T,
    engine: RetryPolicyEngine,
}

impl<T> Guarded<T> {
    pub fn new(inner: T, engine: RetryPolicyEngine) -> Self {
        Self { inner, engine }
    }

    pub fn engine(&self) -> &RetryPolicyEngine {
        &self.engine
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub username: String,
    pub submission_limit: u32,
    /// Strategy for notifier calls; `None` sends exactly once.
    pub notify_strategy: Option<String>,
}

/// Drives one check-allocate-notify-commit cycle per call to [`run`](Self::run).
pub struct Orchestrator<A, N, S, B> {
    api: Guarded<A>,
    notifier: Guarded<N>,
    store: StateStore<S>,
    backlog: B,
    options: RunOptions,
}

impl<A, N, S, B> Orchestrator<A, N, S, B>
where
    A: SubmissionApi,
    N: Notifier,
    S: DocumentStore,
    B: BacklogProvider,
{
    pub fn new(
        api: Guarded<A>,
        notifier: Guarded<N>,
        store: StateStore<S>,
        backlog: B,
        options: RunOptions,
    ) -> Self {
        Self {
            api,
            notifier,
            store,
            backlog,
            options,
        }
    }

    pub fn api(&self) -> &Guarded<A> {
        &self.api
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub async fn run(&self) -> Result<RunRecord, DrillError> {
        self.run_at(Utc::now()).await
    }

    /// Runs the cycle as if the clock read `now`.
    ///
    /// Once the checkpoint is taken every failure rolls back. The caller
    /// gets [`DrillError::RolledBack`] wrapping the cause, or
    /// [`DrillError::RollbackFailure`] when the restore failed too. A
    /// recovery record still pending from such a failure stops the run
    /// with [`DrillError::RestorePending`].
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunRecord, DrillError> {
        let today = now.date_naive();
        let mut record = RunRecord::new();

        // IDLE: a leftover recovery record means the last rollback never
        // landed; taking a new checkpoint would overwrite it.
        if let Some(pending) = self.store.pending_checkpoint().await? {
            error!(
                run = %record.id,
                checkpoint = %pending.id(),
                taken_at = %pending.created_at(),
                "CRITICAL: unrestored checkpoint found, refusing to run"
            );
            return Err(DrillError::RestorePending {
                checkpoint: pending.id(),
            });
        }

        // same-day guard, no checkpoint and no calls
        let progress: ProgressState = self.store.load().await;
        if progress.last_sent_date == Some(today) {
            info!(run = %record.id, %today, "batch already sent today");
            record.finish(RunOutcome::AlreadySent);
            return Ok(record);
        }

        // HEALTH_CHECK
        StateMachine::advance(&mut record, RunState::HealthCheck)?;
        if let Err(e) = self.health_check().await {
            if self.api.engine.breaker_state() == BreakerState::Open {
                warn!(run = %record.id, error = %e, "API unhealthy and breaker open, deferring run");
                record.finish(RunOutcome::Deferred {
                    reason: e.to_string(),
                });
                return Ok(record);
            }
            return Err(e);
        }

        // CHECKPOINTED
        let checkpoint = self.store.checkpoint().await?;
        StateMachine::advance(&mut record, RunState::Checkpointed)?;
        record.checkpoint = Some(checkpoint.id());

        match self.run_steps(&mut record, today, now).await {
            Ok(outcome) => {
                self.discard(checkpoint.id()).await;
                record.finish(outcome);
                Ok(record)
            }
            Err(DrillError::ConcurrentRun) => {
                // Another runner committed today's batch; restoring our
                // checkpoint would erase its commit.
                warn!(run = %record.id, "another run committed first, keeping its state");
                self.discard(checkpoint.id()).await;
                record.finish(RunOutcome::AlreadySent);
                Ok(record)
            }
            Err(cause) => {
                let id = checkpoint.id();
                error!(run = %record.id, state = %record.state, checkpoint = %id, error = %cause, "run failed, rolling back");
                match self.store.rollback(checkpoint).await {
                    Ok(()) => {
                        if let Err(e) = StateMachine::advance(&mut record, RunState::RolledBack) {
                            warn!(run = %record.id, error = %e, "rollback not recorded");
                        }
                        Err(DrillError::RolledBack {
                            checkpoint: id,
                            source: Box::new(cause),
                        })
                    }
                    Err(rollback) => {
                        error!(
                            run = %record.id,
                            checkpoint = %id,
                            error = %rollback,
                            "CRITICAL: rollback failed, state consistency unknown"
                        );
                        Err(DrillError::RollbackFailure {
                            checkpoint: id,
                            cause: Box::new(cause),
                            rollback: Box::new(rollback),
                        })
                    }
                }
            }
        }
    }

    async fn run_steps(
        &self,
        record: &mut RunRecord,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, DrillError> {
        // SOLVED_STATUS_REFRESHED
        let progress = self.refresh_solved().await?;
        StateMachine::advance(record, RunState::SolvedStatusRefreshed)?;

        // ALLOCATED
        let settings: Settings = self.store.read().await?;
        let curriculum = self.backlog.ordered_backlog()?;
        let allocation = allocation::compute(&progress, settings.daily_quota, &curriculum);
        StateMachine::advance(record, RunState::Allocated)?;
        if allocation.is_empty() {
            info!(
                run = %record.id,
                position = allocation.new_position,
                plan_complete = allocation.plan_complete,
                "nothing left to send"
            );
            return Ok(RunOutcome::PlanComplete);
        }

        // NOTIFIED
        let notified = settings.notifications_enabled;
        if notified {
            self.notify(&allocation, &curriculum).await?;
        } else {
            info!(run = %record.id, "notifications disabled, skipping delivery");
        }
        StateMachine::advance(record, RunState::Notified)?;

        // COMMITTED
        let committed = self
            .commit(&allocation, progress.version, &settings, today, now)
            .await?;
        StateMachine::advance(record, RunState::Committed)?;
        info!(
            run = %record.id,
            version = committed.version,
            batch = allocation.batch.len(),
            unfinished = allocation.unfinished.len(),
            fresh = allocation.fresh.len(),
            position = committed.backlog_position,
            backlog_exhausted = allocation.backlog_exhausted,
            "batch committed"
        );

        Ok(RunOutcome::Sent {
            batch: allocation.batch,
            unfinished: allocation.unfinished.len(),
            fresh: allocation.fresh.len(),
            notified,
        })
    }

    /// Quick probe first; if that fails while the breaker is still closed,
    /// one patient wake-up probe.
    async fn health_check(&self) -> Result<(), DrillError> {
        let api = &self.api.inner;
        let engine = &self.api.engine;
        let probe = move || async move { api.probe().await.map_err(DrillError::from) };

        match engine.execute(FAST, probe).await {
            Ok(()) => return Ok(()),
            Err(e) if engine.breaker_state() == BreakerState::Open => return Err(e),
            Err(e) => warn!(error = %e, "quick probe failed, waking the API"),
        }
        engine.execute(COLD_START, probe).await
    }

    async fn recent_submissions(&self) -> Result<SubmissionPage, DrillError> {
        let api = &self.api.inner;
        let user = self.options.username.as_str();
        let limit = self.options.submission_limit;
        self.api
            .engine
            .execute(NORMAL, move || async move {
                api.recent_submissions(user, limit)
                    .await
                    .map_err(DrillError::from)
            })
            .await
    }

    /// Marks outstanding items solved; writes only if something changed.
    async fn refresh_solved(&self) -> Result<ProgressState, DrillError> {
        let progress: ProgressState = self.store.read().await?;
        if progress.unsolved().next().is_none() {
            return Ok(progress);
        }

        let page = self.recent_submissions().await?;
        let mut preview = progress.clone();
        let solved = preview.mark_solved(&page.items);
        if solved == 0 {
            return Ok(progress);
        }

        let submissions = &page.items;
        let updated = self
            .store
            .atomic_update(|state: &mut ProgressState| {
                state.mark_solved(submissions);
                Ok(())
            })
            .await?;
        info!(solved, version = updated.version, "outstanding items marked solved");
        Ok(updated)
    }

    async fn notify(&self, allocation: &Allocation, curriculum: &[WorkItem]) -> Result<(), DrillError> {
        let batch = backlog::resolve(curriculum, &allocation.batch);
        let categorized = Categorized::from_allocation(allocation, curriculum);
        let notifier = &self.notifier.inner;
        let (batch, categorized) = (batch.as_slice(), &categorized);

        match self.options.notify_strategy.as_deref() {
            Some(strategy) => {
                self.notifier
                    .engine
                    .execute(strategy, move || notifier.send(batch, categorized))
                    .await
            }
            None => notifier.send(batch, categorized).await,
        }
    }

    /// Persists the allocation on top of the progress version it was
    /// computed from.
    async fn commit(
        &self,
        allocation: &Allocation,
        based_on: u64,
        settings: &Settings,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ProgressState, DrillError> {
        let snapshot = settings.snapshot();
        self.store
            .atomic_update(|state: &mut ProgressState| {
                if state.last_sent_date == Some(today) {
                    return Err(DrillError::ConcurrentRun);
                }
                if state.version != based_on {
                    return Err(DrillError::StaleState {
                        document: ProgressState::DOC_ID.to_string(),
                        expected: based_on,
                        found: state.version,
                    });
                }
                allocation.apply_to(state, today, now, snapshot);
                Ok(())
            })
            .await
    }

    async fn discard(&self, id: uuid::Uuid) {
        if let Err(e) = self.store.discard_checkpoint(id).await {
            warn!(checkpoint = %id, error = %e, "recovery record left behind");
        }
    }

    /// Fetches the configured user's profile through the API engine.
    pub async fn profile(&self) -> Result<Profile, DrillError> {
        let api = &self.api.inner;
        let user = self.options.username.as_str();
        self.api
            .engine
            .execute(NORMAL, move || async move {
                api.profile(user).await.map_err(DrillError::from)
            })
            .await
    }
}
