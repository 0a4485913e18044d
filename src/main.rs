use std::sync::Arc;

use anyhow::Result;

use recoengine::bandit::{self, BanditState};
use recoengine::catalog::CatalogStore;
use recoengine::config;
use recoengine::http;
use recoengine::logging;
use recoengine::pipeline::FeedbackStore;
use recoengine::retrieval::llm::PostgresLlmSource;
use recoengine::retrieval::vector::PostgresVectorSearch;
use recoengine::retrieval::{LlmSource, VectorSearch};
use recoengine::store::PostgresStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::load()?;
    logging::init_logging(&config);
    tracing::info!("recoengine starting");

    let store = PostgresStore::new(&config.database_url, true).await?;
    let catalog = CatalogStore::load(&store).await?;
    let bandit = BanditState::load_from_store(
        &store,
        config.ts_init_strength,
        config.ts_max_total,
        None,
    )
    .await?;

    let pool = store.pool();
    let vector = PostgresVectorSearch::new(pool.clone());
    let llm = PostgresLlmSource::new(pool);
    let store = Arc::new(store);

    let state = Arc::new(http::AppState {
        catalog: Arc::new(catalog),
        vector: Arc::new(vector) as Arc<dyn VectorSearch>,
        llm: Arc::new(llm) as Arc<dyn LlmSource>,
        bandit: Arc::new(bandit),
        feedback_store: store.clone() as Arc<dyn FeedbackStore>,
        arm_store: store.clone() as Arc<dyn bandit::ArmStore>,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!(addr = "0.0.0.0:8080", "listening");
    axum::serve(listener, http::router(state)).await?;

    Ok(())
}
