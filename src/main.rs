mod allocation;
mod api;
mod backlog;
mod cli;
mod config;
mod error;
mod notify;
mod orchestrator;
mod resilience;
mod state_machine;
mod store;
mod ui;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use api::SubmissionClient;
use backlog::FileBacklog;
use cli::{Cli, Command, SettingsAction};
use config::DrillConfig;
use error::{DrillError, ErrorKind};
use notify::{AnyNotifier, ConsoleNotifier, WebhookNotifier};
use orchestrator::{Guarded, Orchestrator, RunOptions};
use resilience::{BreakerConfig, RetryMetrics, RetryPolicyEngine, StrategySet};
use store::{FileDocumentStore, ProgressState, Settings, StateStore};

type App = Orchestrator<SubmissionClient, AnyNotifier, FileDocumentStore, FileBacklog>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", console::style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only the status output.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "drillbot=debug" } else { "drillbot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Builds engines that share one strategy set and one metrics handle.
struct Engines {
    strategies: Arc<StrategySet>,
    breaker: BreakerConfig,
    metrics: Arc<RetryMetrics>,
}

impl Engines {
    fn new(config: &DrillConfig) -> Result<Self> {
        Ok(Self {
            strategies: Arc::new(config.strategies()?),
            breaker: config.breaker.clone(),
            metrics: Arc::new(RetryMetrics::default()),
        })
    }

    fn engine(&self, name: &str) -> RetryPolicyEngine {
        RetryPolicyEngine::new(
            name,
            self.strategies.clone(),
            self.breaker.clone(),
            self.metrics.clone(),
        )
    }
}

fn open_store(config: &DrillConfig, engines: &Engines) -> Result<StateStore<FileDocumentStore>> {
    let store = StateStore::new(FileDocumentStore::open(&config.store_dir)?, engines.engine("store"));
    debug!(dir = %store.documents().dir().display(), "state directory opened");
    Ok(store)
}

fn build_app(config: &DrillConfig, engines: &Engines) -> Result<App> {
    let username = config.require_username()?.to_string();

    let client = SubmissionClient::new(
        config.api.base_url.clone(),
        config.api.connect_timeout(),
        config.api.request_timeout(),
    )?;
    let notifier = match &config.notifier.webhook_url {
        Some(url) => AnyNotifier::Webhook(WebhookNotifier::new(
            url.clone(),
            Duration::from_millis(config.notifier.request_timeout_ms),
        )?),
        None => AnyNotifier::Console(ConsoleNotifier::default()),
    };

    let backlog = FileBacklog::load(&config.backlog_path)?;
    if backlog.is_empty() {
        warn!(path = %config.backlog_path.display(), "curriculum is empty, runs will only carry over outstanding items");
    } else {
        debug!(items = backlog.len(), "curriculum ready");
    }

    Ok(Orchestrator::new(
        Guarded::new(client, engines.engine("api")),
        Guarded::new(notifier, engines.engine("notifier")),
        open_store(config, engines)?,
        backlog,
        RunOptions {
            username,
            submission_limit: config.api.submission_limit,
            notify_strategy: config.notifier.retry_strategy().map(str::to_string),
        },
    ))
}

/// 2 when state may be inconsistent and needs `drillbot restore`, else 1.
fn exit_status(err: &DrillError) -> u8 {
    match err.kind() {
        ErrorKind::RollbackFailure => 2,
        _ => 1,
    }
}

fn exit_code(err: &DrillError) -> ExitCode {
    ExitCode::from(exit_status(err))
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = DrillConfig::load(cli.config.as_deref())?;
    let engines = Engines::new(&config)?;

    match cli.command {
        Command::Check { json } => {
            let app = build_app(&config, &engines)?;
            let started = Instant::now();
            let progress = ui::RunProgress::start(&format!("checking {}", config.api.username));
            let result = app.run().await;
            let took = started.elapsed();
            debug!(
                breaker = %app.api().engine().breaker_state(),
                store_breaker = %app.store().engine().breaker_state(),
                metrics = ?engines.metrics.snapshot(),
                "retry metrics"
            );

            match result {
                Ok(record) => {
                    progress.complete(&record, took);
                    info!(run = %record.id, duration_ms = record.duration_ms(), "run finished");
                    if json {
                        ui::print_record(&record);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    progress.fail(&e, took);
                    error!(kind = ?e.kind(), cause = %e.root_cause(), error = %e, "check failed");
                    Ok(exit_code(&e))
                }
            }
        }

        Command::Status => {
            let store = open_store(&config, &engines)?;
            let progress: ProgressState = store.read().await?;
            let settings: Settings = store.read().await?;
            let pending = store.pending_checkpoint().await?;
            ui::print_status(&progress, &settings, pending.as_ref());
            Ok(ExitCode::SUCCESS)
        }

        Command::Settings { action } => {
            let store = open_store(&config, &engines)?;
            let settings = match action {
                SettingsAction::Get => store.read::<Settings>().await?,
                SettingsAction::Set { daily_quota } => {
                    let quota = Settings::clamp_quota(daily_quota);
                    if i64::from(quota) != daily_quota {
                        warn!(requested = daily_quota, applied = quota, "daily quota clamped");
                    }
                    store
                        .atomic_update(|s: &mut Settings| {
                            s.daily_quota = quota;
                            Ok(())
                        })
                        .await?
                }
                SettingsAction::Notify { state } => {
                    store
                        .atomic_update(|s: &mut Settings| {
                            s.notifications_enabled = state.enabled();
                            Ok(())
                        })
                        .await?
                }
            };
            ui::print_settings(&settings);
            Ok(ExitCode::SUCCESS)
        }

        Command::Restore => {
            let store = open_store(&config, &engines)?;
            let started = Instant::now();
            match store.restore_pending().await {
                Ok(Some(id)) => {
                    println!("restored checkpoint {id} ({})", ui::elapsed(started.elapsed()));
                    Ok(ExitCode::SUCCESS)
                }
                Ok(None) => {
                    println!("no checkpoint to restore");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    ui::print_failure(&e, started.elapsed());
                    error!(kind = ?e.kind(), error = %e, "restore failed");
                    Ok(exit_code(&e))
                }
            }
        }

        Command::Profile => {
            let app = build_app(&config, &engines)?;
            let started = Instant::now();
            match app.profile().await {
                Ok(profile) => {
                    ui::print_profile(&profile);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    ui::print_failure(&e, started.elapsed());
                    error!(error = %e, "profile lookup failed");
                    Ok(exit_code(&e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn failed_restores_exit_with_two() {
        let id = Uuid::new_v4();
        let failed_restore = DrillError::RollbackFailure {
            checkpoint: id,
            cause: Box::new(DrillError::RestorePending { checkpoint: id }),
            rollback: Box::new(DrillError::Io(std::io::Error::other("read-only volume"))),
        };
        assert_eq!(exit_status(&failed_restore), 2);
        assert_eq!(exit_status(&DrillError::RestorePending { checkpoint: id }), 2);
        assert_eq!(exit_status(&DrillError::ConcurrentRun), 1);
    }
}
