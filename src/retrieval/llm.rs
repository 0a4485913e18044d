use async_trait::async_trait;
use sqlx::{postgres::PgPool, Row};

use crate::retrieval::{LlmHit, LlmSource};

/// Reads the offline-populated `llm_recommendations` table.
pub struct PostgresLlmSource {
    pool: PgPool,
}

impl PostgresLlmSource {
    pub fn new(pool: PgPool) -> Self {
        PostgresLlmSource { pool }
    }
}

#[async_trait]
impl LlmSource for PostgresLlmSource {
    async fn recommendations(&self, main_id: i64) -> Vec<LlmHit> {
        let result = sqlx::query(
            r#"
            SELECT matched_product_id, rec_rank, resolved_rank, match_score
            FROM llm_recommendations
            WHERE main_product_id = $1 AND matched_product_id IS NOT NULL
            ORDER BY rec_rank, resolved_rank
            "#,
        )
        .bind(main_id)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows
                .into_iter()
                .map(|row| LlmHit {
                    product_id: row.get("matched_product_id"),
                    rec_rank: row.get("rec_rank"),
                    resolved_rank: row.get("resolved_rank"),
                    match_score: row.get("match_score"),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(main_id, error = %e, "llm candidate source degraded, reporting empty");
                Vec::new()
            }
        }
    }
}

/// Fixed in-memory LLM source for tests.
pub struct InMemoryLlmSource {
    by_main: std::collections::HashMap<i64, Vec<LlmHit>>,
}

impl InMemoryLlmSource {
    pub fn new(by_main: std::collections::HashMap<i64, Vec<LlmHit>>) -> Self {
        InMemoryLlmSource { by_main }
    }

    pub fn empty() -> Self {
        InMemoryLlmSource { by_main: std::collections::HashMap::new() }
    }
}

#[async_trait]
impl LlmSource for InMemoryLlmSource {
    async fn recommendations(&self, main_id: i64) -> Vec<LlmHit> {
        self.by_main.get(&main_id).cloned().unwrap_or_default()
    }
}
