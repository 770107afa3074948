use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_CONFIG, ENV_DATABASE_URL, ENV_FLOAT_PRECISION, ENV_HOST, ENV_LOG_JSON, ENV_MQTT_CLIENT_ID,
    ENV_MQTT_ENABLED, ENV_MQTT_HOST, ENV_MQTT_PASSWORD, ENV_MQTT_PORT, ENV_MQTT_TOPICS,
    ENV_MQTT_USERNAME, ENV_PORT,
};

#[derive(Parser)]
#[command(name = "mqttap")]
#[command(
    version,
    about = "Store MQTT sensor messages in PostgreSQL and serve their history",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = ENV_LOG_JSON)]
    pub log_json: bool,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    // MQTT options
    /// Enable or disable MQTT ingestion
    #[arg(long, global = true, env = ENV_MQTT_ENABLED)]
    pub mqtt_enabled: Option<bool>,

    /// MQTT broker host
    #[arg(long, global = true, env = ENV_MQTT_HOST)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, global = true, env = ENV_MQTT_PORT)]
    pub mqtt_port: Option<u16>,

    /// Topic filters to subscribe to (comma-separated, wildcards allowed)
    #[arg(long, global = true, env = ENV_MQTT_TOPICS)]
    pub mqtt_topics: Option<String>,

    /// MQTT username
    #[arg(long, global = true, env = ENV_MQTT_USERNAME)]
    pub mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, global = true, env = ENV_MQTT_PASSWORD, hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// MQTT client id (random when unset)
    #[arg(long, global = true, env = ENV_MQTT_CLIENT_ID)]
    pub mqtt_client_id: Option<String>,

    /// Decimal places kept for float values
    #[arg(long, global = true, env = ENV_FLOAT_PRECISION)]
    pub float_precision: Option<u32>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start ingestion and the history API (default command)
    Start,
    /// List registered topics with their tables and fields
    Topics,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub mqtt_enabled: Option<bool>,
    pub mqtt_host: Option<String>,
    pub mqtt_port: Option<u16>,
    pub mqtt_topics: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: Option<String>,
    pub float_precision: Option<u32>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            config: cli.config,
            log_json: cli.log_json,
            database_url: cli.database_url,
            mqtt_enabled: cli.mqtt_enabled,
            mqtt_host: cli.mqtt_host,
            mqtt_port: cli.mqtt_port,
            mqtt_topics: cli.mqtt_topics,
            mqtt_username: cli.mqtt_username,
            mqtt_password: cli.mqtt_password,
            mqtt_client_id: cli.mqtt_client_id,
            float_precision: cli.float_precision,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let mut cli = Cli::parse();
    let command = cli.command.take();
    (cli.into(), command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "mqttap",
            "--port",
            "9001",
            "--mqtt-topics",
            "a/#,b/+",
            "--mqtt-enabled",
            "false",
            "--float-precision",
            "2",
            "topics",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Topics)));
        let config = CliConfig::from(cli);
        assert_eq!(config.port, Some(9001));
        assert_eq!(config.mqtt_topics.as_deref(), Some("a/#,b/+"));
        assert_eq!(config.mqtt_enabled, Some(false));
        assert_eq!(config.float_precision, Some(2));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["mqttap", "--mqtt-port", "70000"]).is_err());
    }
}
