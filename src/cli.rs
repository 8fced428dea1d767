//! Interface de linha de comando do drillbot baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (check, status,
//! settings, restore, profile) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// drillbot: envia os problemas de prática do dia e acompanha o progresso.
#[derive(Debug, Parser)]
#[command(name = "drillbot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./drillbot.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa um ciclo: verifica resolvidos, escolhe o lote, notifica e grava.
    Check {
        /// Imprime o registro da execução em JSON.
        #[arg(long)]
        json: bool,
    },

    /// Mostra o progresso e as configurações gravadas (somente leitura).
    Status,

    /// Lê ou altera as configurações.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Restaura o checkpoint deixado por uma execução interrompida.
    Restore,

    /// Consulta o perfil do usuário na API.
    Profile,
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Mostra as configurações atuais.
    Get,

    /// Define a cota diária (ajustada para o intervalo 1..=10).
    Set {
        #[arg(allow_negative_numbers = true)]
        daily_quota: i64,
    },

    /// Liga ou desliga as notificações.
    Notify { state: Toggle },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_check_subcommand() {
        let cli = Cli::parse_from(["drillbot", "check", "--json"]);
        assert!(matches!(cli.command, Command::Check { json: true }));
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["drillbot", "status", "--config", "alt.toml", "--verbose"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn cli_parses_settings_actions() {
        let cli = Cli::parse_from(["drillbot", "settings", "set", "-3"]);
        match cli.command {
            Command::Settings {
                action: SettingsAction::Set { daily_quota },
            } => assert_eq!(daily_quota, -3),
            other => panic!("expected settings set, got {other:?}"),
        }

        let cli = Cli::parse_from(["drillbot", "settings", "notify", "off"]);
        match cli.command {
            Command::Settings {
                action: SettingsAction::Notify { state },
            } => assert!(!state.enabled()),
            other => panic!("expected settings notify, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_toggle() {
        assert!(Cli::try_parse_from(["drillbot", "settings", "notify", "maybe"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
