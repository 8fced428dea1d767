//! Configuração do drillbot carregada a partir de `drillbot.toml`.
//!
//! A struct [`DrillConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `DRILLBOT_USERNAME`, `DRILLBOT_API_URL` e
//! `DRILLBOT_WEBHOOK_URL` têm precedência sobre o arquivo.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::api::client::DEFAULT_API_URL;
use crate::resilience::strategy::NORMAL;
use crate::resilience::{BreakerConfig, StrategyOverride, StrategySet};

pub const DEFAULT_CONFIG_FILE: &str = "drillbot.toml";

/// Configuração de nível superior carregada de `drillbot.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DrillConfig {
    #[serde(default)]
    pub api: ApiConfig,

    /// Diretório dos documentos de estado (`progress.json`, `settings.json`).
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Arquivo JSON com o currículo ordenado.
    #[serde(default = "default_backlog_path")]
    pub backlog_path: PathBuf,

    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Ajustes por estratégia, ex. `[retry.cold_start]`.
    #[serde(default)]
    pub retry: HashMap<String, StrategyOverride>,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Parâmetros do cliente da API de submissões.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Usuário cujas submissões são consultadas.
    #[serde(default)]
    pub username: String,

    #[serde(default = "default_submission_limit")]
    pub submission_limit: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Para onde o lote diário é enviado.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Sem URL, o lote é impresso no terminal.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Estratégia de retentativa do envio; `"none"` envia uma única vez.
    #[serde(default = "default_notifier_strategy")]
    pub strategy: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".drillbot")
}

fn default_backlog_path() -> PathBuf {
    PathBuf::from("backlog.json")
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

// Últimas 20 submissões aceitas bastam para um dia de problemas.
fn default_submission_limit() -> u32 {
    20
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_notifier_strategy() -> String {
    NORMAL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            submission_limit: default_submission_limit(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            strategy: default_notifier_strategy(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl NotifierConfig {
    /// Estratégia efetiva; `None` quando o envio não deve ser repetido.
    pub fn retry_strategy(&self) -> Option<&str> {
        match self.strategy.as_str() {
            "" | "none" => None,
            name => Some(name),
        }
    }
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            store_dir: default_store_dir(),
            backlog_path: default_backlog_path(),
            breaker: BreakerConfig::default(),
            retry: HashMap::new(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl DrillConfig {
    /// Carrega a configuração de `path`, ou de `drillbot.toml` no diretório
    /// atual. Usa valores padrão se o arquivo padrão não existir; um caminho
    /// explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<DrillConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else if explicit {
            bail!("config file {} not found", path.display());
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.strategies()?;
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(username) = non_empty("DRILLBOT_USERNAME") {
            self.api.username = username;
        }
        if let Some(url) = non_empty("DRILLBOT_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = non_empty("DRILLBOT_WEBHOOK_URL") {
            self.notifier.webhook_url = Some(url);
        }
    }

    /// Estratégias embutidas com os ajustes de `[retry.*]` aplicados.
    pub fn strategies(&self) -> Result<StrategySet> {
        let set = StrategySet::with_overrides(&self.retry)?;
        if let Some(name) = self.notifier.retry_strategy() {
            set.get(name)
                .with_context(|| format!("notifier.strategy = {name:?}"))?;
        }
        Ok(set)
    }

    pub fn require_username(&self) -> Result<&str> {
        if self.api.username.trim().is_empty() {
            bail!("no username configured: set api.username in {DEFAULT_CONFIG_FILE} or DRILLBOT_USERNAME");
        }
        Ok(&self.api.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = DrillConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.api.submission_limit, 20);
        assert_eq!(config.store_dir, PathBuf::from(".drillbot"));
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.notifier.retry_strategy(), Some("normal"));
        assert!(config.require_username().is_err());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            store_dir = "/var/lib/drillbot"

            [api]
            username = "alice"

            [breaker]
            failure_threshold = 3

            [retry.cold_start]
            max_attempts = 8
            total_time_budget_ms = 0

            [notifier]
            strategy = "none"
        "#;
        let config: DrillConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.require_username().unwrap(), "alice");
        assert_eq!(config.store_dir, PathBuf::from("/var/lib/drillbot"));
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.recovery_timeout_ms, 60_000);
        assert_eq!(config.api.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.notifier.retry_strategy(), None);

        let strategies = config.strategies().unwrap();
        let cold = strategies.get("cold_start").unwrap();
        assert_eq!(cold.max_attempts, 8);
        assert_eq!(cold.total_time_budget, None);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: DrillConfig = toml::from_str("[api]\nusername = \"file-user\"").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DRILLBOT_USERNAME", "env-user"),
            ("DRILLBOT_WEBHOOK_URL", "https://hooks.example/drill"),
            ("DRILLBOT_API_URL", "  "),
        ]);
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.username, "env-user");
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(
            config.notifier.webhook_url.as_deref(),
            Some("https://hooks.example/drill")
        );
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backlog_path = \"plan.json\"\n[api]\nsubmission_limit = 50").unwrap();
        let config = DrillConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.backlog_path, PathBuf::from("plan.json"));
        assert_eq!(config.api.submission_limit, 50);
    }

    #[test]
    fn load_rejects_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DrillConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn unknown_notifier_strategy_is_rejected() {
        let config: DrillConfig = toml::from_str("[notifier]\nstrategy = \"eventually\"").unwrap();
        assert!(config.strategies().is_err());

        let config: DrillConfig =
            toml::from_str("[notifier]\nstrategy = \"eventually\"\n[retry.eventually]\nmax_attempts = 2")
                .unwrap();
        assert_eq!(config.strategies().unwrap().get("eventually").unwrap().max_attempts, 2);
    }
}
