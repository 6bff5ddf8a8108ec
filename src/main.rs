use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use answerd::backend::CandleLoader;
use answerd::prompting::GenerationConfig;
use answerd::{AppConfig, LifecycleManager, QueryService};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        base_model = %config.model.base_model,
        adapter = %config.model.adapter_path.display(),
        debug = config.server.debug,
        "answerd starting"
    );

    let lifecycle = LifecycleManager::new(CandleLoader::new(config.model.clone()));
    let generation = GenerationConfig::answer_defaults().with_seed(config.model.seed);
    let service = Arc::new(QueryService::new(lifecycle, generation));
    tracing::debug!(generation = ?service.generation_config(), "decoding parameters");

    // Startup load is best effort; requests retry it lazily.
    answerd::server::warm_up(service.clone()).await;

    answerd::server::start(service, &config.server).await
}
