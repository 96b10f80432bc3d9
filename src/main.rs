use std::sync::Arc;
use std::time::Duration;

use jobflow_core::config::Config;
use jobflow_core::db;
use jobflow_core::services::llm::HttpLlmClient;
use jobflow_core::services::TieredScheduler;
use jobflow_core::utils::ScheduledExecutor;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("jobflow.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry.with(tracing_subscriber::fmt::layer().with_writer(non_blocking)).with(tracing_subscriber::fmt::layer()).init();
        // Leaked deliberately: the writer guard must outlive every tracing
        // call for the remainder of the process.
        std::mem::forget(guard);
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config);
    tracing::info!("jobflow starting up");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("database pool created");

    let llm_api_base = std::env::var("LLM_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    let llm_api_key = std::env::var("LLM_API_KEY").unwrap_or_default();
    if llm_api_key.is_empty() {
        tracing::warn!("LLM_API_KEY is not set; tiered analysis calls will be rejected by the provider");
    }

    let client = Arc::new(HttpLlmClient::new(llm_api_base, llm_api_key));
    let scheduler = TieredScheduler::new(pool.clone(), client, config.llm.clone(), config.batching.clone(), &config.security);

    let poll_interval = Duration::from_secs(config.llm.poll_backoff_min_secs.max(1));
    tracing::info!(?poll_interval, "starting tiered analysis scheduler");
    ScheduledExecutor::new("tiered-scheduler", poll_interval).start(scheduler).await;

    Ok(())
}
