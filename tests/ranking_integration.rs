use std::collections::HashMap;

use async_trait::async_trait;

use recoengine::bandit::BanditState;
use recoengine::catalog::{CatalogStore, Product, ProductLoader, ProductRole};
use recoengine::config::Config;
use recoengine::errors::RecoError;
use recoengine::pipeline::RankingPipeline;
use recoengine::retrieval::llm::InMemoryLlmSource;
use recoengine::retrieval::vector::InMemoryVectorSearch;

fn product(id: i64, role: ProductRole, price: f64, embedding: Vec<f32>) -> Product {
    Product {
        id,
        name: format!("product-{id}"),
        role,
        price: Some(price),
        category_name: "tools".to_string(),
        category_id: None,
        product_type: None,
        vendor: None,
        url: "https://example.test".to_string(),
        picture_url: None,
        description: None,
        parent_id: "p".to_string(),
        parent_name: "p".to_string(),
        weight_kg: None,
        shipping_weight_kg: None,
        volume_l: None,
        length_mm: None,
        key_params: serde_json::json!({}),
        embedding: Some(pgvector::Vector::from(embedding)),
    }
}

struct FixedLoader(Vec<Product>);

#[async_trait]
impl ProductLoader for FixedLoader {
    async fn load_products(&self) -> Result<Vec<Product>, RecoError> {
        Ok(self.0.clone())
    }
}

async fn catalog_with(products: Vec<Product>) -> CatalogStore {
    CatalogStore::load(&FixedLoader(products)).await.unwrap()
}

/// Repeated positive feedback on one accessory should push its selection
/// probability toward the top over many independent rankings, while an
/// accessory that only ever receives negative feedback should drift down.
#[tokio::test]
async fn positive_feedback_shifts_ranking_over_many_draws() {
    let main_id = 1;
    let winner_id = 2;
    let loser_id = 3;

    let products = vec![
        product(main_id, ProductRole::Main, 100.0, vec![1.0, 0.0, 0.0]),
        product(winner_id, ProductRole::Accessory, 50.0, vec![0.9, 0.1, 0.0]),
        product(loser_id, ProductRole::Accessory, 50.0, vec![0.9, 0.0, 0.1]),
    ];
    let catalog = catalog_with(products.clone()).await;
    let vector = InMemoryVectorSearch::new(products);
    let llm = InMemoryLlmSource::empty();
    let mut config = Config::default();
    config.mmr_enabled = false;
    config.demo_mode = true;

    let bandit = BanditState::new(config.ts_init_strength, config.ts_max_total, Some(42));
    for _ in 0..30 {
        bandit.update((main_id, winner_id), true, config.ts_update_strength_demo);
        bandit.update((main_id, loser_id), false, config.ts_update_strength_demo);
    }

    let pipeline = RankingPipeline::new(&catalog, &vector, &llm, &bandit, &config);

    let mut winner_first = 0;
    for _ in 0..200 {
        let items = pipeline.recommend(main_id).await.unwrap();
        if items.first().map(|i| i.product.id) == Some(winner_id) {
            winner_first += 1;
        }
    }

    assert!(
        winner_first > 150,
        "expected the reinforced accessory to lead most rankings, got {winner_first}/200"
    );
}

/// When both retrieval channels come back empty, the pipeline falls back to
/// the full accessory pool and still returns exactly `mmr_return_size` items
/// (padding order is deterministic, not random, so repeated calls agree).
#[tokio::test]
async fn degraded_retrieval_falls_back_to_full_accessory_pool() {
    let main_id = 1;
    let mut products = vec![product(main_id, ProductRole::Main, 100.0, vec![1.0, 0.0])];
    for id in 2..10 {
        products.push(product(id, ProductRole::Accessory, 40.0, vec![0.0, 1.0]));
    }
    let catalog = catalog_with(products).await;

    // Empty vector/llm channels simulate both retrieval dependencies degrading.
    let vector = InMemoryVectorSearch::new(vec![]);
    let llm = InMemoryLlmSource::empty();
    let mut config = Config::default();
    config.mmr_return_size = 5;
    config.mmr_enabled = false;

    let bandit = BanditState::new(config.ts_init_strength, config.ts_max_total, Some(1));
    let pipeline = RankingPipeline::new(&catalog, &vector, &llm, &bandit, &config);

    let first = pipeline.recommend(main_id).await.unwrap();
    let second = pipeline.recommend(main_id).await.unwrap();

    assert_eq!(first.len(), config.mmr_return_size);
    let first_ids: Vec<i64> = first.iter().map(|i| i.product.id).collect();
    let second_ids: Vec<i64> = second.iter().map(|i| i.product.id).collect();
    assert_eq!(first_ids, second_ids, "padding order must be deterministic across calls");
}

/// LLM candidates referencing a product id no longer in the catalog snapshot
/// must never surface in a response.
#[tokio::test]
async fn stale_llm_ids_never_reach_the_response() {
    use recoengine::retrieval::LlmHit;

    let main_id = 1;
    let products = vec![
        product(main_id, ProductRole::Main, 100.0, vec![1.0, 0.0]),
        product(2, ProductRole::Accessory, 40.0, vec![0.0, 1.0]),
    ];
    let catalog = catalog_with(products).await;
    let vector = InMemoryVectorSearch::new(vec![]);

    let mut by_main = HashMap::new();
    by_main.insert(
        main_id,
        vec![
            LlmHit { product_id: 2, rec_rank: 1, resolved_rank: 1, match_score: Some(0.8) },
            LlmHit { product_id: 404, rec_rank: 2, resolved_rank: 1, match_score: Some(0.7) },
        ],
    );
    let llm = InMemoryLlmSource::new(by_main);
    let config = Config::default();
    let bandit = BanditState::new(config.ts_init_strength, config.ts_max_total, Some(1));

    let pipeline = RankingPipeline::new(&catalog, &vector, &llm, &bandit, &config);
    let items = pipeline.recommend(main_id).await.unwrap();

    assert!(items.iter().all(|i| i.product.id != 404));
}
