use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use orchestrator::config::ConfigManager;
use orchestrator::http::HttpPatchExecutor;
use orchestrator::metrics::SyntheticMetrics;
use orchestrator::notify::WebhookNotifier;
use orchestrator::registry::SqliteRegistry;
use orchestrator::scheduler::{CycleRunner, OrchestratorScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("orchestrator=info".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Patch Orchestrator");

    // Load configuration
    let config_manager = ConfigManager::new("config/orchestrator.toml").await?;
    let config = config_manager.get_current_config();

    // Initialize the server registry
    let registry = Arc::new(SqliteRegistry::new(&config.registry_path).await?);
    info!("Server registry initialized at {}", config.registry_path);

    // Initialize the escalation notifier
    let notifier = Arc::new(WebhookNotifier::new(config.webhook_url.clone()));
    if notifier.is_enabled() {
        info!("Notifier enabled with webhook: {}", notifier.webhook_url());

        // Test webhook connectivity on startup
        match notifier.test_webhook().await {
            Ok(()) => info!("Notification webhook test successful"),
            Err(e) => {
                error!("Notification webhook test failed: {}", e);
                warn!("Escalations may not be delivered. Check your webhook URL and network connectivity.");
            }
        }
    } else {
        warn!("Notifier disabled: no webhook URL configured");
        warn!("Set 'webhook_url = \"your-webhook-url\"' in config/orchestrator.toml to enable escalations");
    }

    // Load metrics source and patch agent client
    let metrics = Arc::new(SyntheticMetrics::new(config.prediction.retention_days));
    let executor = Arc::new(HttpPatchExecutor::new(config.agent_port));
    info!("Patch agent client initialized on port {}", config.agent_port);

    // Wire the engines together and start the cron-driven cycles
    let runner = Arc::new(CycleRunner::new(
        config.clone(),
        registry,
        notifier,
        metrics,
        executor,
    )?);

    let scheduler = OrchestratorScheduler::new(runner).await?;
    scheduler.start().await?;
    info!(
        "Scheduler started: pipeline poll '{}', auto-approval sweep '{}'",
        config.pipeline_poll_schedule, config.auto_approval_schedule
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");

    Ok(())
}
