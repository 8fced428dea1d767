//! Interface de terminal do drillbot: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner durante o `check` e `console` para
//! estilização. A saída principal é um token curto de status mais o tempo
//! decorrido; os detalhes ficam no log (stderr).

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::Profile;
use crate::error::DrillError;
use crate::state_machine::{RunOutcome, RunRecord};
use crate::store::{Checkpoint, ProgressState, Settings};

/// Formata a duração como `1.2s`.
pub fn elapsed(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

/// Indicador visual de uma execução do `check`.
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Inicia o spinner com a mensagem fornecida.
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o token do resultado.
    pub fn complete(&self, record: &RunRecord, took: Duration) {
        self.pb.finish_and_clear();
        let Some(outcome) = &record.outcome else {
            return;
        };
        let style = match outcome {
            RunOutcome::Sent { .. } | RunOutcome::PlanComplete => &self.green,
            RunOutcome::AlreadySent | RunOutcome::Deferred { .. } => &self.yellow,
        };
        println!(
            "{} {}",
            style.apply_to(outcome.token()),
            console::style(format!("({})", elapsed(took))).dim()
        );
        match outcome {
            RunOutcome::Sent {
                batch,
                unfinished,
                fresh,
                notified,
            } => {
                let via = if *notified { "" } else { ", notifications off" };
                println!("  {} problems: {unfinished} carried, {fresh} new{via}", batch.len());
            }
            RunOutcome::Deferred { reason } => println!("  {reason}"),
            RunOutcome::AlreadySent | RunOutcome::PlanComplete => {}
        }
    }

    /// Finaliza o spinner e exibe o token do erro em vermelho.
    pub fn fail(&self, err: &DrillError, took: Duration) {
        self.pb.finish_and_clear();
        print_error(&self.red, err, took);
    }
}

/// Token de erro para comandos que não usam spinner.
pub fn print_failure(err: &DrillError, took: Duration) {
    print_error(&Style::new().red().bold(), err, took);
}

fn print_error(style: &Style, err: &DrillError, took: Duration) {
    println!(
        "{} {}",
        style.apply_to(err.status_token()),
        console::style(format!("({})", elapsed(took))).dim()
    );
}

/// Imprime o registro da execução em JSON.
pub fn print_record(record: &RunRecord) {
    println!("{}", serde_json::to_string_pretty(record).unwrap_or_default());
}

pub fn print_settings(settings: &Settings) {
    let label = Style::new().bold();
    println!("{} {}", label.apply_to("daily quota:   "), settings.daily_quota);
    println!(
        "{} {}",
        label.apply_to("notifications: "),
        if settings.notifications_enabled { "on" } else { "off" }
    );
    println!("{} {}", label.apply_to("version:       "), settings.version);
}

/// Resumo somente leitura do estado gravado.
pub fn print_status(progress: &ProgressState, settings: &Settings, pending: Option<&Checkpoint>) {
    let heading = Style::new().cyan().bold();
    let label = Style::new().bold();

    println!("{}", heading.apply_to("─── Progress ───"));
    let last = progress
        .last_sent_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("{} {last}", label.apply_to("last sent:       "));
    println!("{} {}", label.apply_to("backlog position:"), progress.backlog_position);
    println!("{} {}", label.apply_to("version:         "), progress.version);

    let outstanding: Vec<&str> = progress.unsolved().map(|i| i.slug.as_str()).collect();
    let solved = progress.sent_items.len() - outstanding.len();
    println!("{} {solved}", label.apply_to("solved:          "));
    println!(
        "{} {}",
        label.apply_to("outstanding:     "),
        if outstanding.is_empty() { "-".to_string() } else { outstanding.join(", ") }
    );
    if !progress.pending_queue.is_empty() {
        println!("{} {}", label.apply_to("queued:          "), progress.pending_queue.join(", "));
    }
    if let Some(from) = progress.restored_from {
        println!("{} {from}", label.apply_to("restored from:   "));
    }

    println!("{}", heading.apply_to("─── Settings ───"));
    print_settings(settings);

    if let Some(checkpoint) = pending {
        println!();
        println!(
            "{} checkpoint {} from {} was left by an unfinished run; `drillbot restore` applies it",
            Style::new().yellow().bold().apply_to("!"),
            checkpoint.id(),
            checkpoint.created_at()
        );
    }
}

pub fn print_profile(profile: &Profile) {
    let ranking = profile
        .ranking
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unranked".to_string());
    println!("{} (ranking {ranking})", Style::new().bold().apply_to(&profile.username));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_has_one_decimal() {
        assert_eq!(elapsed(Duration::from_millis(1234)), "1.2s");
        assert_eq!(elapsed(Duration::ZERO), "0.0s");
    }
}
