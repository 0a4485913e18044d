use async_trait::async_trait;
use sqlx::{postgres::PgPool, Row};

use crate::catalog::Product;
use crate::retrieval::{VectorHit, VectorSearch};

/// Cosine similarity between two embeddings, normalized to `[0,1]` the same
/// way the pgvector-backed query does: `1 - cosine_distance/2`.
///
/// Returns 0.0 for zero-length vectors or mismatched dimensions (degenerate
/// input, not expected in practice since embeddings share a fixed dimension).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    let cosine_distance = 1.0 - cosine;
    (1.0 - cosine_distance / 2.0).clamp(0.0, 1.0)
}

/// pgvector-backed vector search, using the `<=>` cosine-distance operator
/// server-side.
pub struct PostgresVectorSearch {
    pool: PgPool,
}

impl PostgresVectorSearch {
    pub fn new(pool: PgPool) -> Self {
        PostgresVectorSearch { pool }
    }
}

#[async_trait]
impl VectorSearch for PostgresVectorSearch {
    async fn similar(&self, main: &Product, limit: usize) -> Vec<VectorHit> {
        if main.embedding.is_none() {
            return Vec::new();
        }

        let result = sqlx::query(
            r#"
            SELECT p2.id,
                   (1.0 - (p1.embedding <=> p2.embedding) / 2.0) AS similarity
            FROM products p1, products p2
            WHERE p1.id = $1
              AND p2.id != $1
              AND p1.embedding IS NOT NULL
              AND p2.embedding IS NOT NULL
              AND p2.product_role = 'сопутка'
            ORDER BY p1.embedding <=> p2.embedding
            LIMIT $2
            "#,
        )
        .bind(main.id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows
                .into_iter()
                .map(|row| VectorHit {
                    product_id: row.get("id"),
                    similarity: row.get::<f64, _>("similarity"),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(main_id = main.id, error = %e, "vector search degraded, reporting empty");
                Vec::new()
            }
        }
    }
}

/// Brute-force in-memory vector search, used by tests and by the in-memory
/// pipeline fixture. Mirrors `PostgresVectorSearch`'s ordering and dropout
/// rules exactly so pipeline tests exercise the real fusion/scoring code.
pub struct InMemoryVectorSearch {
    products: Vec<crate::catalog::Product>,
}

impl InMemoryVectorSearch {
    pub fn new(products: Vec<crate::catalog::Product>) -> Self {
        InMemoryVectorSearch { products }
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorSearch {
    async fn similar(&self, main: &Product, limit: usize) -> Vec<VectorHit> {
        let Some(main_embedding) = &main.embedding else {
            return Vec::new();
        };

        let mut hits: Vec<VectorHit> = self
            .products
            .iter()
            .filter(|p| p.id != main.id)
            .filter(|p| matches!(p.role, crate::catalog::ProductRole::Accessory))
            .filter_map(|p| {
                p.embedding.as_ref().map(|e| VectorHit {
                    product_id: p.id,
                    similarity: cosine_similarity(main_embedding.as_slice(), e.as_slice()),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_half() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mismatched_dimensions_return_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
