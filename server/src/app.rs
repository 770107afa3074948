//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::{ApiServer, UnrestrictedAccess};
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{DEFAULT_LOG_FILTER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::dynamic::SchemaCache;
use crate::data::{PostgresService, TopicStore};
use crate::domain::history::TopicSummary;
use crate::domain::{AccessControl, HistoryService, IngestionPipeline, MessageIngestor, MqttSource};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub database: Arc<PostgresService>,
    pub store: Arc<dyn TopicStore>,
    /// Shared by the ingestion pipeline and the history service
    pub cache: SchemaCache,
    pub history: Arc<HistoryService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.log_json);

        tracing::debug!("Application starting");
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config).await?;
        match command {
            Some(Commands::Topics) => app.print_topics().await,
            Some(Commands::Start) | None => Self::start_server(app).await,
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let database = Arc::new(
            PostgresService::init(&config.postgres)
                .await
                .context("Failed to initialize PostgreSQL")?,
        );
        let store: Arc<dyn TopicStore> = Arc::new(Arc::clone(&database));
        let cache = SchemaCache::new(Duration::from_secs(config.ingest.schema_cache_ttl_secs));
        let history = Arc::new(HistoryService::new(
            Arc::clone(&store),
            cache.clone(),
            config.history.max_limit,
        ));
        let shutdown = ShutdownService::new(Some(Arc::clone(&database)));

        Ok(Self {
            shutdown,
            config,
            database,
            store,
            cache,
            history,
        })
    }

    fn init_logging(json: bool) {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_env_filter(filter);

        if json {
            builder.json().init();
        } else {
            builder.with_ansi(true).compact().init();
        }
    }

    /// Print every registered topic with its fields and exit
    async fn print_topics(self) -> Result<()> {
        let topics = self
            .history
            .list_topics(&AccessControl::unrestricted())
            .await
            .context("Failed to list topics")?;
        self.database.close().await;

        if topics.is_empty() {
            println!("No topics registered yet.");
            return Ok(());
        }
        for line in format_topics(&topics) {
            println!("{}", line);
        }
        Ok(())
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        let shutdown = app.shutdown.clone();
        match ApiServer::new(app, Arc::new(UnrestrictedAccess)).start().await {
            Ok(app) => {
                app.shutdown.shutdown().await;
                Ok(())
            }
            Err(e) => {
                shutdown.shutdown().await;
                Err(e)
            }
        }
    }

    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(
                self.database
                    .start_health_check_task(self.shutdown.subscribe()),
            )
            .await;

        if self.config.mqtt.enabled {
            let ingestor = MessageIngestor::new(
                Arc::clone(&self.store),
                self.cache.clone(),
                self.config.ingest.float_precision,
            );
            let pipeline = IngestionPipeline::new(
                MqttSource::new(self.config.mqtt.clone()),
                ingestor,
                Duration::from_secs(self.config.mqtt.reconnect_delay_secs),
            );
            self.shutdown
                .register(pipeline.start(self.shutdown.subscribe()))
                .await;
            tracing::info!(
                broker = %format!("{}:{}", self.config.mqtt.host, self.config.mqtt.port),
                topics = ?self.config.mqtt.topics,
                "MQTT ingestion started"
            );
        } else {
            tracing::info!("MQTT ingestion disabled");
        }

        tracing::debug!("Background tasks started");
    }
}

/// One line per topic: name, table, shape and `field:type` pairs
fn format_topics(topics: &[TopicSummary]) -> Vec<String> {
    let topic_width = topics.iter().map(|t| t.topic.len()).max().unwrap_or(0);
    let table_width = topics.iter().map(|t| t.table.len()).max().unwrap_or(0);
    topics
        .iter()
        .map(|t| {
            let fields = t
                .fields
                .iter()
                .map(|f| match t.types.get(f) {
                    Some(ty) => format!("{}:{}", f, ty),
                    None => f.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{:<topic_width$}  {:<table_width$}  {:<6}  {}",
                t.topic,
                t.table,
                if t.is_json { "object" } else { "scalar" },
                fields,
            )
        })
        .collect()
}
