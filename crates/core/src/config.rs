use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ContextSettings;

/// Longest idle window a conversation may be configured to survive.
pub const MAX_CONVERSATION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const INTERPOLATION_PATTERN: &str = r"\$\{([^}]*)\}";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app: AppInfoConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AppInfoConfig {
    pub name: String,
    pub environment: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub json_temperature: f64,
    pub text_temperature: f64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub ttl_secs: u64,
    pub max_history_turns: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Programmatic overrides; these win over file and environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub conversation_ttl_secs: Option<u64>,
    pub max_history_turns: Option<usize>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppInfoConfig {
                name: "Concierge Orchestration Service".to_string(),
                environment: "development".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://concierge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: Some("https://api.openai.com/v1".to_string()),
                model: "gpt-4.1-mini".to_string(),
                timeout_secs: 30,
                json_temperature: 0.1,
                text_temperature: 0.3,
            },
            conversation: ConversationConfig { ttl_secs: 30 * 60, max_history_turns: 20 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
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

impl ConversationConfig {
    pub fn context_settings(&self) -> ContextSettings {
        let ttl_secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        ContextSettings {
            ttl: chrono::Duration::try_seconds(ttl_secs).unwrap_or(chrono::Duration::MAX),
            max_history_turns: self.max_history_turns,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(app) = patch.app {
            assign(&mut self.app.name, app.name);
            assign(&mut self.app.environment, app.environment);
        }

        if let Some(database) = patch.database {
            assign(&mut self.database.url, database.url);
            assign(&mut self.database.max_connections, database.max_connections);
            assign(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            assign(&mut self.llm.provider, llm.provider);
            assign(&mut self.llm.api_key, llm.api_key.map(|key| Some(key.into())));
            assign(&mut self.llm.base_url, llm.base_url.map(Some));
            assign(&mut self.llm.model, llm.model);
            assign(&mut self.llm.timeout_secs, llm.timeout_secs);
            assign(&mut self.llm.json_temperature, llm.json_temperature);
            assign(&mut self.llm.text_temperature, llm.text_temperature);
        }

        if let Some(conversation) = patch.conversation {
            assign(&mut self.conversation.ttl_secs, conversation.ttl_secs);
            assign(&mut self.conversation.max_history_turns, conversation.max_history_turns);
        }

        if let Some(server) = patch.server {
            assign(&mut self.server.bind_address, server.bind_address);
            assign(&mut self.server.port, server.port);
            assign(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            assign(&mut self.logging.level, logging.level);
            assign(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        assign(&mut self.app.environment, env_value("CONCIERGE_ENV")?);

        assign(&mut self.database.url, env_value("CONCIERGE_DATABASE_URL")?);
        assign(
            &mut self.database.max_connections,
            env_value("CONCIERGE_DATABASE_MAX_CONNECTIONS")?,
        );
        assign(&mut self.database.timeout_secs, env_value("CONCIERGE_DATABASE_TIMEOUT_SECS")?);

        assign(&mut self.llm.provider, env_value("CONCIERGE_LLM_PROVIDER")?);
        let api_key = env_value::<String>("CONCIERGE_LLM_API_KEY")?;
        assign(&mut self.llm.api_key, api_key.map(|key| Some(key.into())));
        assign(&mut self.llm.base_url, env_value("CONCIERGE_LLM_BASE_URL")?.map(Some));
        assign(&mut self.llm.model, env_value("CONCIERGE_LLM_MODEL")?);
        assign(&mut self.llm.timeout_secs, env_value("CONCIERGE_LLM_TIMEOUT_SECS")?);

        assign(&mut self.conversation.ttl_secs, env_value("CONCIERGE_CONVERSATION_TTL_SECS")?);
        assign(
            &mut self.conversation.max_history_turns,
            env_value("CONCIERGE_CONVERSATION_MAX_HISTORY_TURNS")?,
        );

        assign(&mut self.server.bind_address, env_value("CONCIERGE_SERVER_BIND_ADDRESS")?);
        assign(&mut self.server.port, env_value("CONCIERGE_SERVER_PORT")?);
        assign(
            &mut self.server.graceful_shutdown_secs,
            env_value("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        let level = env_value("CONCIERGE_LOGGING_LEVEL")?;
        assign(&mut self.logging.level, level.or(env_value("CONCIERGE_LOG_LEVEL")?));
        let format = match env_value("CONCIERGE_LOGGING_FORMAT")? {
            Some(format) => Some(format),
            None => env_value("CONCIERGE_LOG_FORMAT")?,
        };
        assign(&mut self.logging.format, format);

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        assign(&mut self.database.url, overrides.database_url);
        assign(&mut self.logging.level, overrides.log_level);
        assign(&mut self.llm.provider, overrides.llm_provider);
        assign(&mut self.llm.model, overrides.llm_model);
        assign(&mut self.llm.api_key, overrides.llm_api_key.map(|key| Some(key.into())));
        assign(&mut self.llm.base_url, overrides.llm_base_url.map(Some));
        assign(&mut self.conversation.ttl_secs, overrides.conversation_ttl_secs);
        assign(&mut self.conversation.max_history_turns, overrides.max_history_turns);
        assign(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn assign<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("concierge.toml"), PathBuf::from("config/concierge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(INTERPOLATION_PATTERN).ok()).as_ref()
}

/// Replace every `${VAR}` with the value of `VAR` from the environment.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut consumed = 0;

    if let Some(pattern) = interpolation_pattern() {
        for captures in pattern.captures_iter(input) {
            let (Some(whole), Some(var)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let value = env::var(var.as_str()).map_err(|_| {
                ConfigError::MissingEnvInterpolation { var: var.as_str().to_string() }
            })?;
            output.push_str(&input[consumed..whole.start()]);
            output.push_str(&value);
            consumed = whole.end();
        }
    }

    let rest = &input[consumed..];
    if rest.contains("${") {
        return Err(ConfigError::UnterminatedInterpolation);
    }
    output.push_str(rest);
    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let temperatures = [
        ("llm.json_temperature", llm.json_temperature),
        ("llm.text_temperature", llm.text_temperature),
    ];
    for (key, value) in temperatures {
        if !(0.0..=2.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range 0.0..=2.0")));
        }
    }

    let blank = |value: Option<&str>| value.map_or(true, |value| value.trim().is_empty());
    match llm.provider {
        LlmProvider::OpenAi if blank(llm.api_key.as_ref().map(|key| key.expose_secret())) => {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider (set CONCIERGE_LLM_API_KEY)"
                    .to_string(),
            ));
        }
        LlmProvider::Ollama if blank(llm.base_url.as_deref()) => {
            return Err(ConfigError::Validation(
                "llm.base_url is required for ollama provider".to_string(),
            ));
        }
        _ => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.ttl_secs == 0 || conversation.ttl_secs > MAX_CONVERSATION_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "conversation.ttl_secs must be in range 1..={MAX_CONVERSATION_TTL_SECS} \
             (set CONCIERGE_CONVERSATION_TTL_SECS to at most seven days)"
        )));
    }

    if conversation.max_history_turns == 0 {
        return Err(ConfigError::Validation(
            "conversation.max_history_turns must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

/// Non-blank environment value for `key`, parsed as `T`.
fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Some(raw) = env::var(key).ok().filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: raw })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    app: Option<AppInfoPatch>,
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AppInfoPatch {
    name: Option<String>,
    environment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    json_temperature: Option<f64>,
    text_temperature: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    ttl_secs: Option<u64>,
    max_history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
