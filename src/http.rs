/// HTTP surface: recommendations, feedback, main-product listing. Handlers
/// only deserialize, call the pipeline, and serialize the response or map a
/// `RecoError` to a status code; no business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::bandit::{ArmStore, BanditState};
use crate::catalog::{CatalogStore, Product};
use crate::config::Config;
use crate::errors::RecoError;
use crate::pipeline::{FeedbackPipeline, FeedbackStore, RankingPipeline};
use crate::retrieval::{LlmSource, VectorSearch};

pub struct AppState {
    pub catalog: Arc<CatalogStore>,
    pub vector: Arc<dyn VectorSearch>,
    pub llm: Arc<dyn LlmSource>,
    pub bandit: Arc<BanditState>,
    pub feedback_store: Arc<dyn FeedbackStore>,
    pub arm_store: Arc<dyn ArmStore>,
    pub config: Arc<Config>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/recommendations/:product_id", get(get_recommendations))
        .route("/feedback", post(post_feedback))
        .route("/main-products", get(get_main_products))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for RecoError {
    fn into_response(self) -> Response {
        let status = match &self {
            RecoError::NotFound { .. } => StatusCode::NOT_FOUND,
            RecoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            RecoError::DependencyDegraded(_) => StatusCode::OK,
            RecoError::PersistencePartialFailure(_) => StatusCode::OK,
            RecoError::Storage(_) | RecoError::Config(_) | RecoError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ProductResponse {
    id: i64,
    name: String,
    price: Option<f64>,
    category_id: Option<String>,
    category_name: String,
    vendor: Option<String>,
    picture_url: Option<String>,
    #[serde(rename = "type")]
    product_type: Option<String>,
    url: String,
    description: Option<String>,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        ProductResponse {
            id: p.id,
            name: p.name.clone(),
            price: p.price,
            category_id: p.category_id.clone(),
            category_name: p.category_name.clone(),
            vendor: p.vendor.clone(),
            picture_url: p.picture_url.clone(),
            product_type: p.product_type.clone(),
            url: p.url.clone(),
            description: p.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RecommendationResponse {
    id: i64,
    similarity_score: f64,
    created_at: DateTime<Utc>,
    recommended_product: ProductResponse,
}

async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Result<Json<Vec<RecommendationResponse>>, RecoError> {
    let pipeline = RankingPipeline::new(
        state.catalog.as_ref(),
        state.vector.as_ref(),
        state.llm.as_ref(),
        state.bandit.as_ref(),
        state.config.as_ref(),
    );
    let items = pipeline.recommend(product_id).await?;
    let response = items
        .into_iter()
        .map(|item| RecommendationResponse {
            id: item.rank_id,
            similarity_score: item.similarity_score,
            created_at: item.created_at,
            recommended_product: ProductResponse::from(item.product.as_ref()),
        })
        .collect();
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    product_id: i64,
    recommended_product_id: i64,
    is_relevant: bool,
}

#[derive(Debug, Serialize)]
struct FeedbackResponse {
    id: i64,
    product_id: i64,
    recommended_product_id: i64,
    is_relevant: bool,
}

async fn post_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, RecoError> {
    let pipeline = FeedbackPipeline::new(
        state.feedback_store.as_ref(),
        state.arm_store.as_ref(),
        state.bandit.as_ref(),
        state.config.ts_update_strength(),
    );
    let record = pipeline
        .record(payload.product_id, payload.recommended_product_id, payload.is_relevant)
        .await?;
    Ok(Json(FeedbackResponse {
        id: record.id,
        product_id: record.main_id,
        recommended_product_id: record.rec_id,
        is_relevant: record.is_relevant,
    }))
}

async fn get_main_products(State(state): State<Arc<AppState>>) -> Json<Vec<ProductResponse>> {
    let products = state.catalog.mains();
    Json(products.iter().map(|p| ProductResponse::from(p.as_ref())).collect())
}
