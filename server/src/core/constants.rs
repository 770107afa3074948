// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "mqttap";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".mqttap";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "mqttap.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "MQTTAP_CONFIG";

// =============================================================================
// Logging
// =============================================================================

/// Environment variable for log level/filter (takes precedence over RUST_LOG)
pub const ENV_LOG: &str = "MQTTAP_LOG";

/// Environment variable for JSON log output
pub const ENV_LOG_JSON: &str = "MQTTAP_LOG_JSON";

/// Filter used when neither MQTTAP_LOG nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "info,mqttap=info,mqttap_server=info";

// =============================================================================
// Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "MQTTAP_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "MQTTAP_PORT";

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 8000;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// PostgreSQL Database
// =============================================================================

/// Environment variable for PostgreSQL connection URL
pub const ENV_DATABASE_URL: &str = "MQTTAP_DATABASE_URL";

/// Database used to create the target database when it is missing
pub const POSTGRES_ADMIN_DATABASE: &str = "postgres";

/// PostgreSQL default max connections
pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL default min connections (keep warm for low latency)
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 1;

/// PostgreSQL default connection acquire timeout in seconds
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL idle connection timeout in seconds (release unused connections)
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// PostgreSQL max connection lifetime in seconds
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// PostgreSQL statement timeout in seconds (0 = disabled)
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

/// Interval between pool health probes
pub const POSTGRES_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

// =============================================================================
// MQTT
// =============================================================================

/// Environment variable to enable/disable ingestion
pub const ENV_MQTT_ENABLED: &str = "MQTTAP_MQTT_ENABLED";

/// Environment variable for broker host
pub const ENV_MQTT_HOST: &str = "MQTTAP_MQTT_HOST";

/// Environment variable for broker port
pub const ENV_MQTT_PORT: &str = "MQTTAP_MQTT_PORT";

/// Environment variable for topic filters (comma-separated)
pub const ENV_MQTT_TOPICS: &str = "MQTTAP_MQTT_TOPICS";

/// Environment variable for broker username
pub const ENV_MQTT_USERNAME: &str = "MQTTAP_MQTT_USERNAME";

/// Environment variable for broker password
pub const ENV_MQTT_PASSWORD: &str = "MQTTAP_MQTT_PASSWORD";

/// Environment variable for the MQTT client id
pub const ENV_MQTT_CLIENT_ID: &str = "MQTTAP_MQTT_CLIENT_ID";

/// Default broker host
pub const DEFAULT_MQTT_HOST: &str = "localhost";

/// Default broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default topic filter
pub const DEFAULT_MQTT_TOPIC: &str = "sensor/#";

/// Default keep-alive interval in seconds
pub const DEFAULT_MQTT_KEEP_ALIVE_SECS: u64 = 30;

/// Delay before reconnecting after a transport error
pub const DEFAULT_MQTT_RECONNECT_DELAY_SECS: u64 = 1;

/// Largest MQTT packet accepted or sent
pub const DEFAULT_MQTT_MAX_PACKET_BYTES: usize = 1024 * 1024;

/// Capacity of the client's outgoing request queue
pub const MQTT_REQUEST_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Ingestion
// =============================================================================

/// Environment variable for float rounding precision
pub const ENV_FLOAT_PRECISION: &str = "MQTTAP_FLOAT_PRECISION";

/// Decimal places kept for float payload values
pub const DEFAULT_FLOAT_PRECISION: u32 = 3;

/// Largest precision that still round-trips through f64 formatting
pub const MAX_FLOAT_PRECISION: u32 = 15;

/// Lifetime of cached registry rows and table layouts
pub const DEFAULT_SCHEMA_CACHE_TTL_SECS: u64 = 300;

// =============================================================================
// History Queries
// =============================================================================

/// Row cap for raw history queries (also the default limit)
pub const DEFAULT_HISTORY_MAX_LIMIT: u32 = 5000;
