/// In-memory product catalog snapshot.
///
/// Loaded once at startup and held behind an atomically-swapped pointer so
/// readers never observe a torn mix of an old and a new snapshot. Failure of
/// the initial load is fatal; a failed `reload()` leaves the previous
/// snapshot in place.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RecoError;

/// Two recognized product roles. Replaces the original free-text
/// `product_role` column values (`"основной товар"` / `"сопутка"`) with a
/// typed enum at the Rust boundary; the string mapping lives at the store
/// boundary only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductRole {
    Main,
    Accessory,
}

impl ProductRole {
    pub fn from_db(raw: &str) -> Result<Self, RecoError> {
        match raw {
            "основной товар" => Ok(ProductRole::Main),
            "сопутка" => Ok(ProductRole::Accessory),
            other => Err(RecoError::Storage(format!(
                "unrecognized product_role value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub role: ProductRole,
    pub price: Option<f64>,
    pub category_name: String,
    pub category_id: Option<String>,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub url: String,
    pub picture_url: Option<String>,
    pub description: Option<String>,
    pub parent_id: String,
    pub parent_name: String,
    pub weight_kg: Option<f64>,
    pub shipping_weight_kg: Option<f64>,
    pub volume_l: Option<f64>,
    pub length_mm: Option<f64>,
    pub key_params: serde_json::Value,
    #[serde(skip)]
    pub embedding: Option<pgvector::Vector>,
}

/// Loads the full product set. Implemented by the Postgres store in
/// production and by an in-memory fake in tests.
#[async_trait]
pub trait ProductLoader: Send + Sync {
    async fn load_products(&self) -> Result<Vec<Product>, RecoError>;
}

struct Snapshot {
    by_id: HashMap<i64, Arc<Product>>,
    mains: Vec<Arc<Product>>,
    accessories: Vec<Arc<Product>>,
}

impl Snapshot {
    fn build(products: Vec<Product>) -> Self {
        let mut by_id = HashMap::with_capacity(products.len());
        let mut mains = Vec::new();
        let mut accessories = Vec::new();

        for product in products {
            let product = Arc::new(product);
            match product.role {
                ProductRole::Main => mains.push(product.clone()),
                ProductRole::Accessory => accessories.push(product.clone()),
            }
            by_id.insert(product.id, product);
        }

        Snapshot { by_id, mains, accessories }
    }
}

pub struct CatalogStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl CatalogStore {
    /// Loads the initial snapshot. Fatal on failure — the caller should refuse
    /// to serve if this errors.
    pub async fn load(loader: &dyn ProductLoader) -> Result<Self, RecoError> {
        let products = loader.load_products().await?;
        tracing::info!(count = products.len(), "catalog loaded");
        Ok(CatalogStore {
            snapshot: RwLock::new(Arc::new(Snapshot::build(products))),
        })
    }

    /// Replaces the snapshot atomically. On failure, the previous snapshot is
    /// left intact and the error is returned to the caller (not fatal).
    pub async fn reload(&self, loader: &dyn ProductLoader) -> Result<(), RecoError> {
        let products = loader.load_products().await?;
        let snapshot = Arc::new(Snapshot::build(products));
        *self.snapshot.write().expect("catalog lock poisoned") = snapshot;
        Ok(())
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("catalog lock poisoned").clone()
    }

    pub fn get(&self, id: i64) -> Option<Arc<Product>> {
        self.current().by_id.get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Product>> {
        self.current().by_id.values().cloned().collect()
    }

    pub fn mains(&self) -> Vec<Arc<Product>> {
        self.current().mains.clone()
    }

    pub fn accessories(&self) -> Vec<Arc<Product>> {
        self.current().accessories.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, role: ProductRole) -> Product {
        Product {
            id,
            name: format!("product-{id}"),
            role,
            price: Some(100.0),
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
            embedding: None,
        }
    }

    struct FixedLoader(Vec<Product>);

    #[async_trait]
    impl ProductLoader for FixedLoader {
        async fn load_products(&self) -> Result<Vec<Product>, RecoError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn splits_products_by_role() {
        let loader = FixedLoader(vec![
            product(1, ProductRole::Main),
            product(2, ProductRole::Accessory),
            product(3, ProductRole::Accessory),
        ]);
        let store = CatalogStore::load(&loader).await.unwrap();
        assert_eq!(store.mains().len(), 1);
        assert_eq!(store.accessories().len(), 2);
        assert!(store.get(1).is_some());
        assert!(store.get(99).is_none());
    }

    #[tokio::test]
    async fn reload_replaces_snapshot_atomically() {
        let initial = FixedLoader(vec![product(1, ProductRole::Main)]);
        let store = CatalogStore::load(&initial).await.unwrap();
        assert_eq!(store.all().len(), 1);

        let next = FixedLoader(vec![
            product(1, ProductRole::Main),
            product(2, ProductRole::Accessory),
        ]);
        store.reload(&next).await.unwrap();
        assert_eq!(store.all().len(), 2);
    }

    struct FailingLoader;

    #[async_trait]
    impl ProductLoader for FailingLoader {
        async fn load_products(&self) -> Result<Vec<Product>, RecoError> {
            Err(RecoError::Storage("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_reload_leaves_previous_snapshot() {
        let initial = FixedLoader(vec![product(1, ProductRole::Main)]);
        let store = CatalogStore::load(&initial).await.unwrap();
        let err = store.reload(&FailingLoader).await;
        assert!(err.is_err());
        assert_eq!(store.all().len(), 1);
    }
}
