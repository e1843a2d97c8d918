use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub payments: PaymentsConfig,
    pub insurer: InsurerConfig,
    pub research: ResearchConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub base_url: String,
    pub status_url: String,
}

#[derive(Clone, Debug)]
pub struct InsurerConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub default_market: String,
    pub default_language: String,
    pub default_channel: String,
}

#[derive(Clone, Debug)]
pub struct ResearchConfig {
    pub taxonomy_path: PathBuf,
    pub claims_data_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://aurora.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.groq.com/openai/v1".to_string(),
                model: "llama-3.1-70b-versatile".to_string(),
                temperature: 0.2,
                max_tokens: 900,
                timeout_secs: 60,
            },
            payments: PaymentsConfig {
                base_url: "http://localhost:8086".to_string(),
                status_url: "http://localhost:8086/payments".to_string(),
            },
            insurer: InsurerConfig {
                api_key: None,
                base_url: "https://dev.api.ancileo.com/v1/travel/front".to_string(),
                default_market: "SG".to_string(),
                default_language: "en".to_string(),
                default_channel: "white-label".to_string(),
            },
            research: ResearchConfig {
                taxonomy_path: PathBuf::from("data/taxonomy.json"),
                claims_data_path: PathBuf::from("data/claims_stats.json"),
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("aurora.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            apply(&mut self.database.url, database.url);
            apply(&mut self.database.max_connections, database.max_connections);
            apply(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            apply(&mut self.llm.base_url, llm.base_url);
            apply(&mut self.llm.model, llm.model);
            apply(&mut self.llm.temperature, llm.temperature);
            apply(&mut self.llm.max_tokens, llm.max_tokens);
            apply(&mut self.llm.timeout_secs, llm.timeout_secs);
        }
        if let Some(payments) = patch.payments {
            apply(&mut self.payments.base_url, payments.base_url);
            apply(&mut self.payments.status_url, payments.status_url);
        }
        if let Some(insurer) = patch.insurer {
            if let Some(api_key) = insurer.api_key {
                self.insurer.api_key = Some(api_key.into());
            }
            apply(&mut self.insurer.base_url, insurer.base_url);
            apply(&mut self.insurer.default_market, insurer.default_market);
            apply(&mut self.insurer.default_language, insurer.default_language);
            apply(&mut self.insurer.default_channel, insurer.default_channel);
        }
        if let Some(research) = patch.research {
            apply(&mut self.research.taxonomy_path, research.taxonomy_path);
            apply(&mut self.research.claims_data_path, research.claims_data_path);
        }
        if let Some(server) = patch.server {
            apply(&mut self.server.bind_address, server.bind_address);
            apply(&mut self.server.port, server.port);
        }
        if let Some(logging) = patch.logging {
            apply(&mut self.logging.level, logging.level);
            apply(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AURORA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AURORA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("AURORA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AURORA_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("AURORA_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("AURORA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("AURORA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("AURORA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AURORA_PAYMENTS_BASE_URL") {
            self.payments.base_url = value;
        }
        if let Some(value) = read_env("AURORA_PAYMENTS_STATUS_URL") {
            self.payments.status_url = value;
        }
        if let Some(value) = read_env("AURORA_INSURER_API_KEY") {
            self.insurer.api_key = Some(value.into());
        }
        if let Some(value) = read_env("AURORA_INSURER_BASE_URL") {
            self.insurer.base_url = value;
        }
        if let Some(value) = read_env("AURORA_TAXONOMY_PATH") {
            self.research.taxonomy_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("AURORA_CLAIMS_DATA_PATH") {
            self.research.claims_data_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("AURORA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AURORA_SERVER_PORT") {
            self.server.port = parse_env("AURORA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AURORA_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("AURORA_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 || self.llm.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be in range 1..=300".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
        }
        let key_blank = self
            .llm
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if key_blank {
            return Err(ConfigError::Validation(
                "llm.api_key is required (set AURORA_LLM_API_KEY or [llm] api_key)".to_string(),
            ));
        }

        for (name, value) in [
            ("payments.base_url", &self.payments.base_url),
            ("payments.status_url", &self.payments.status_url),
            ("insurer.base_url", &self.insurer.base_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{name} must start with http:// or https://"
                )));
            }
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be greater than zero".to_string(),
            ));
        }

        match self.logging.level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            )),
        }
    }
}

fn apply<T>(slot: &mut T, patch: Option<T>) {
    if let Some(value) = patch {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }
    [PathBuf::from("aurora.toml"), PathBuf::from("config/aurora.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    payments: Option<PaymentsPatch>,
    insurer: Option<InsurerPatch>,
    research: Option<ResearchPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    base_url: Option<String>,
    status_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InsurerPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    default_market: Option<String>,
    default_language: Option<String>,
    default_channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResearchPatch {
    taxonomy_path: Option<PathBuf>,
    claims_data_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_fail_validation_without_api_key() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["AURORA_LLM_API_KEY"]);

        let error = AppConfig::load(LoadOptions::default()).expect_err("missing api key");
        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("llm.api_key")
        ));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("AURORA_LLM_API_KEY", "gsk-from-env");
        env::set_var("AURORA_LLM_MODEL", "llama-3.3-70b-versatile");

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("aurora.toml");
        fs::write(
            &path,
            r#"
[llm]
api_key = "gsk-from-file"
model = "llama-3.1-8b-instant"

[logging]
level = "warn"
format = "json"
"#,
        )
        .expect("write config file");

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .expect("config loads");

        clear_vars(&["AURORA_LLM_API_KEY", "AURORA_LLM_MODEL"]);

        assert_eq!(
            config.llm.api_key.as_ref().expect("api key").expose_secret(),
            "gsk-from-env"
        );
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let _guard = env_lock().lock().expect("env lock");
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist/aurora.toml".into()),
            require_file: true,
        })
        .expect_err("required file missing");
        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn non_sqlite_database_url_is_rejected() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("AURORA_LLM_API_KEY", "gsk-test");
        env::set_var("AURORA_DATABASE_URL", "postgres://nope");

        let error = AppConfig::load(LoadOptions::default()).expect_err("bad database url");
        clear_vars(&["AURORA_LLM_API_KEY", "AURORA_DATABASE_URL"]);

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("database.url")
        ));
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("AURORA_LLM_API_KEY", "gsk-super-secret");

        let config = AppConfig::load(LoadOptions::default()).expect("config loads");
        clear_vars(&["AURORA_LLM_API_KEY"]);

        let debug = format!("{config:?}");
        assert!(!debug.contains("gsk-super-secret"));
    }
}
