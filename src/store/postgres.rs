/// PostgreSQL-backed persistence: catalog loading, arm state, and feedback
/// writes, all sharing one connection pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::bandit::{Arm, ArmKey, ArmStore};
use crate::catalog::{Product, ProductLoader, ProductRole};
use crate::errors::RecoError;
use crate::pipeline::{FeedbackRecord, FeedbackStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str, run_migrations: bool) -> Result<Self, RecoError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| RecoError::Storage(format!("failed to connect to database: {e}")))?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| RecoError::Storage(format!("migration failed: {e}")))?;
        }

        Ok(PostgresStore { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

#[async_trait]
impl ProductLoader for PostgresStore {
    async fn load_products(&self) -> Result<Vec<Product>, RecoError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, product_role, price, category_name, category_id, type,
                   vendor, url, picture_url, description, parent_id, parent_name,
                   weight_kg, shipping_weight_kg, volume_l, length_mm, key_params, embedding
            FROM products
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let role_raw: String = row.try_get("product_role").map_err(RecoError::from)?;
                Ok(Product {
                    id: row.try_get("id").map_err(RecoError::from)?,
                    name: row.try_get("name").map_err(RecoError::from)?,
                    role: ProductRole::from_db(&role_raw)?,
                    price: row.try_get("price").map_err(RecoError::from)?,
                    category_name: row.try_get("category_name").map_err(RecoError::from)?,
                    category_id: row.try_get("category_id").map_err(RecoError::from)?,
                    product_type: row.try_get("type").map_err(RecoError::from)?,
                    vendor: row.try_get("vendor").map_err(RecoError::from)?,
                    url: row.try_get("url").map_err(RecoError::from)?,
                    picture_url: row.try_get("picture_url").map_err(RecoError::from)?,
                    description: row.try_get("description").map_err(RecoError::from)?,
                    parent_id: row.try_get("parent_id").map_err(RecoError::from)?,
                    parent_name: row.try_get("parent_name").map_err(RecoError::from)?,
                    weight_kg: row.try_get("weight_kg").map_err(RecoError::from)?,
                    shipping_weight_kg: row.try_get("shipping_weight_kg").map_err(RecoError::from)?,
                    volume_l: row.try_get("volume_l").map_err(RecoError::from)?,
                    length_mm: row.try_get("length_mm").map_err(RecoError::from)?,
                    key_params: row.try_get("key_params").map_err(RecoError::from)?,
                    embedding: row.try_get("embedding").map_err(RecoError::from)?,
                })
            })
            .collect::<Result<Vec<_>, RecoError>>()
    }
}

#[async_trait]
impl ArmStore for PostgresStore {
    async fn load_all_arms(&self) -> Result<Vec<(ArmKey, Arm)>, RecoError> {
        let rows = sqlx::query(
            r#"SELECT product_id, recommended_product_id, alpha, beta, updated_at FROM arm_stats"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let main_id: i64 = row.get("product_id");
                let rec_id: i64 = row.get("recommended_product_id");
                let arm = Arm {
                    alpha: row.get("alpha"),
                    beta: row.get("beta"),
                    updated_at: row.get("updated_at"),
                };
                ((main_id, rec_id), arm)
            })
            .collect())
    }

    async fn upsert_arm(&self, key: ArmKey, arm: Arm) -> Result<(), RecoError> {
        let (main_id, rec_id) = key;
        sqlx::query(
            r#"
            INSERT INTO arm_stats (product_id, recommended_product_id, alpha, beta, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id, recommended_product_id)
            DO UPDATE SET alpha = EXCLUDED.alpha, beta = EXCLUDED.beta, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(main_id)
        .bind(rec_id)
        .bind(arm.alpha)
        .bind(arm.beta)
        .bind(arm.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FeedbackStore for PostgresStore {
    async fn append_feedback(&self, main_id: i64, rec_id: i64, is_relevant: bool) -> Result<FeedbackRecord, RecoError> {
        let row = sqlx::query(
            r#"
            INSERT INTO feedback (product_id, recommended_product_id, is_relevant)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(main_id)
        .bind(rec_id)
        .bind(is_relevant)
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedbackRecord {
            id: row.get("id"),
            main_id,
            rec_id,
            is_relevant,
            created_at: row.get("created_at"),
        })
    }
}
