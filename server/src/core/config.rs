use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_FLOAT_PRECISION, DEFAULT_HISTORY_MAX_LIMIT,
    DEFAULT_HOST, DEFAULT_MQTT_HOST, DEFAULT_MQTT_KEEP_ALIVE_SECS, DEFAULT_MQTT_MAX_PACKET_BYTES,
    DEFAULT_MQTT_PORT, DEFAULT_MQTT_RECONNECT_DELAY_SECS, DEFAULT_MQTT_TOPIC, DEFAULT_PORT,
    DEFAULT_SCHEMA_CACHE_TTL_SECS, MAX_FLOAT_PRECISION, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS, POSTGRES_DEFAULT_MAX_CONNECTIONS,
    POSTGRES_DEFAULT_MAX_LIFETIME_SECS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

// =============================================================================
// File Config Structs (JSON, every field optional)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Extra origins allowed by CORS
    pub cors_origins: Option<Vec<String>>,
}

/// PostgreSQL configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PostgresFileConfig {
    /// Connection URL (or use MQTTAP_DATABASE_URL env var)
    pub url: Option<String>,
    /// URL used to create the database when missing (default: same server, `postgres` db)
    pub admin_url: Option<String>,
    /// Create the target database on startup if absent (default: true)
    pub create_database: Option<bool>,
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: Option<u32>,
    /// Minimum number of connections to keep warm (default: 1)
    pub min_connections: Option<u32>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Idle connection timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Max connection lifetime in seconds (default: 1800)
    pub max_lifetime_secs: Option<u64>,
    /// Statement timeout in seconds, 0 to disable (default: 60)
    pub statement_timeout_secs: Option<u64>,
}

/// Database configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub postgres: Option<PostgresFileConfig>,
}

/// Topic filters, as a list or a comma-separated string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TopicFilters {
    List(Vec<String>),
    Csv(String),
}

impl TopicFilters {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(list) => clean_filters(list),
            Self::Csv(csv) => split_filters(&csv),
        }
    }
}

/// MQTT configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MqttFileConfig {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub topics: Option<TopicFilters>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
    pub max_packet_bytes: Option<usize>,
}

/// Ingestion configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IngestFileConfig {
    pub float_precision: Option<u32>,
    pub schema_cache_ttl_secs: Option<u64>,
}

/// History query configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HistoryFileConfig {
    pub max_limit: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub mqtt: Option<MqttFileConfig>,
    pub ingest: Option<IngestFileConfig>,
    pub history: Option<HistoryFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Replace `target` when the overlay provides a value
fn overlay<T: std::fmt::Debug>(target: &mut Option<T>, value: Option<T>, key: &str) {
    if value.is_some() {
        tracing::trace!(key, value = ?value, "Merging config value");
        *target = value;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            overlay(&mut current.host, server.host, "server.host");
            overlay(&mut current.port, server.port, "server.port");
            overlay(
                &mut current.cors_origins,
                server.cors_origins,
                "server.cors_origins",
            );
        }

        if let Some(database) = other.database
            && let Some(postgres) = database.postgres
        {
            let current = self
                .database
                .get_or_insert_with(DatabaseFileConfig::default)
                .postgres
                .get_or_insert_with(PostgresFileConfig::default);
            overlay(&mut current.url, postgres.url, "database.postgres.url");
            overlay(
                &mut current.admin_url,
                postgres.admin_url,
                "database.postgres.admin_url",
            );
            overlay(
                &mut current.create_database,
                postgres.create_database,
                "database.postgres.create_database",
            );
            overlay(
                &mut current.max_connections,
                postgres.max_connections,
                "database.postgres.max_connections",
            );
            overlay(
                &mut current.min_connections,
                postgres.min_connections,
                "database.postgres.min_connections",
            );
            overlay(
                &mut current.acquire_timeout_secs,
                postgres.acquire_timeout_secs,
                "database.postgres.acquire_timeout_secs",
            );
            overlay(
                &mut current.idle_timeout_secs,
                postgres.idle_timeout_secs,
                "database.postgres.idle_timeout_secs",
            );
            overlay(
                &mut current.max_lifetime_secs,
                postgres.max_lifetime_secs,
                "database.postgres.max_lifetime_secs",
            );
            overlay(
                &mut current.statement_timeout_secs,
                postgres.statement_timeout_secs,
                "database.postgres.statement_timeout_secs",
            );
        }

        if let Some(mqtt) = other.mqtt {
            let current = self.mqtt.get_or_insert_with(MqttFileConfig::default);
            overlay(&mut current.enabled, mqtt.enabled, "mqtt.enabled");
            overlay(&mut current.host, mqtt.host, "mqtt.host");
            overlay(&mut current.port, mqtt.port, "mqtt.port");
            overlay(&mut current.topics, mqtt.topics, "mqtt.topics");
            overlay(&mut current.username, mqtt.username, "mqtt.username");
            // Never trace the password itself
            if mqtt.password.is_some() {
                current.password = mqtt.password;
            }
            overlay(&mut current.client_id, mqtt.client_id, "mqtt.client_id");
            overlay(
                &mut current.keep_alive_secs,
                mqtt.keep_alive_secs,
                "mqtt.keep_alive_secs",
            );
            overlay(
                &mut current.reconnect_delay_secs,
                mqtt.reconnect_delay_secs,
                "mqtt.reconnect_delay_secs",
            );
            overlay(
                &mut current.max_packet_bytes,
                mqtt.max_packet_bytes,
                "mqtt.max_packet_bytes",
            );
        }

        if let Some(ingest) = other.ingest {
            let current = self.ingest.get_or_insert_with(IngestFileConfig::default);
            overlay(
                &mut current.float_precision,
                ingest.float_precision,
                "ingest.float_precision",
            );
            overlay(
                &mut current.schema_cache_ttl_secs,
                ingest.schema_cache_ttl_secs,
                "ingest.schema_cache_ttl_secs",
            );
        }

        if let Some(history) = other.history {
            let current = self.history.get_or_insert_with(HistoryFileConfig::default);
            overlay(&mut current.max_limit, history.max_limit, "history.max_limit");
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// PostgreSQL configuration (final/runtime)
#[derive(Debug, Clone, Default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maintenance connection URL used to create the database
    pub admin_url: Option<String>,
    /// Create the target database when it does not exist
    pub create_database: bool,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to keep warm
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,
    /// Max connection lifetime in seconds
    pub max_lifetime_secs: u64,
    /// Statement timeout in seconds (0 = disabled)
    pub statement_timeout_secs: u64,
}

/// MQTT subscription configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub topics: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Random `mqttap-<uuid>` id when unset
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_packet_bytes: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_MQTT_HOST.to_string(),
            port: DEFAULT_MQTT_PORT,
            topics: vec![DEFAULT_MQTT_TOPIC.to_string()],
            username: None,
            password: None,
            client_id: None,
            keep_alive_secs: DEFAULT_MQTT_KEEP_ALIVE_SECS,
            reconnect_delay_secs: DEFAULT_MQTT_RECONNECT_DELAY_SECS,
            max_packet_bytes: DEFAULT_MQTT_MAX_PACKET_BYTES,
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Decimal places kept for float values
    pub float_precision: u32,
    pub schema_cache_ttl_secs: u64,
}

/// History query configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Upper bound and default for the raw-query row limit
    pub max_limit: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub mqtt: MqttConfig,
    pub ingest: IngestConfig,
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.mqttap/mqttap.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Profile dir - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_home(path);
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_postgres = file_config
            .database
            .unwrap_or_default()
            .postgres
            .unwrap_or_default();
        let file_mqtt = file_config.mqtt.unwrap_or_default();
        let file_ingest = file_config.ingest.unwrap_or_default();
        let file_history = file_config.history.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
            cors_origins: file_server.cors_origins.unwrap_or_default(),
        };

        let postgres = PostgresConfig {
            url: cli
                .database_url
                .clone()
                .or(file_postgres.url)
                .unwrap_or_default(),
            admin_url: file_postgres.admin_url,
            create_database: file_postgres.create_database.unwrap_or(true),
            max_connections: file_postgres
                .max_connections
                .unwrap_or(POSTGRES_DEFAULT_MAX_CONNECTIONS),
            min_connections: file_postgres
                .min_connections
                .unwrap_or(POSTGRES_DEFAULT_MIN_CONNECTIONS),
            acquire_timeout_secs: file_postgres
                .acquire_timeout_secs
                .unwrap_or(POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout_secs: file_postgres
                .idle_timeout_secs
                .unwrap_or(POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime_secs: file_postgres
                .max_lifetime_secs
                .unwrap_or(POSTGRES_DEFAULT_MAX_LIFETIME_SECS),
            statement_timeout_secs: file_postgres
                .statement_timeout_secs
                .unwrap_or(POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS),
        };

        let defaults = MqttConfig::default();
        let mqtt = MqttConfig {
            enabled: cli.mqtt_enabled.or(file_mqtt.enabled).unwrap_or(defaults.enabled),
            host: cli
                .mqtt_host
                .clone()
                .or(file_mqtt.host)
                .unwrap_or(defaults.host),
            port: cli.mqtt_port.or(file_mqtt.port).unwrap_or(defaults.port),
            topics: cli
                .mqtt_topics
                .as_deref()
                .map(split_filters)
                .or_else(|| file_mqtt.topics.map(TopicFilters::into_vec))
                .unwrap_or(defaults.topics),
            username: cli.mqtt_username.clone().or(file_mqtt.username),
            password: cli.mqtt_password.clone().or(file_mqtt.password),
            client_id: cli.mqtt_client_id.clone().or(file_mqtt.client_id),
            keep_alive_secs: file_mqtt.keep_alive_secs.unwrap_or(defaults.keep_alive_secs),
            reconnect_delay_secs: file_mqtt
                .reconnect_delay_secs
                .unwrap_or(defaults.reconnect_delay_secs),
            max_packet_bytes: file_mqtt
                .max_packet_bytes
                .unwrap_or(defaults.max_packet_bytes),
        };

        let ingest = IngestConfig {
            float_precision: cli
                .float_precision
                .or(file_ingest.float_precision)
                .unwrap_or(DEFAULT_FLOAT_PRECISION),
            schema_cache_ttl_secs: file_ingest
                .schema_cache_ttl_secs
                .unwrap_or(DEFAULT_SCHEMA_CACHE_TTL_SECS),
        };

        let history = HistoryConfig {
            max_limit: file_history.max_limit.unwrap_or(DEFAULT_HISTORY_MAX_LIMIT),
        };

        Self {
            server,
            postgres,
            mqtt,
            ingest,
            history,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.postgres.url.trim().is_empty() {
            anyhow::bail!(
                "Configuration error: database.postgres.url is required (or set MQTTAP_DATABASE_URL)"
            );
        }
        if self.mqtt.enabled {
            if self.mqtt.host.is_empty() {
                anyhow::bail!("Configuration error: mqtt.host must not be empty");
            }
            if self.mqtt.port == 0 {
                anyhow::bail!("Configuration error: mqtt.port must be greater than 0");
            }
            if self.mqtt.topics.is_empty() {
                anyhow::bail!("Configuration error: mqtt.topics needs at least one topic filter");
            }
        }
        if self.ingest.float_precision > MAX_FLOAT_PRECISION {
            anyhow::bail!(
                "Configuration error: ingest.float_precision must be at most {}",
                MAX_FLOAT_PRECISION
            );
        }
        if self.history.max_limit == 0 {
            anyhow::bail!("Configuration error: history.max_limit must be greater than 0");
        }
        Ok(())
    }
}

/// Split comma-separated topic filters, dropping blanks
pub fn split_filters(raw: &str) -> Vec<String> {
    clean_filters(raw.split(',').map(str::to_string).collect())
}

fn clean_filters(filters: Vec<String>) -> Vec<String> {
    filters
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Get the profile config path (~/.mqttap/mqttap.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
