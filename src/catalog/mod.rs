//! 商品目录：只读快照
//!
//! 对话层只需要「拿到当前全部商品」这一个能力（CatalogProvider::fetch_all_products），
//! 不缓存、不保证一致性；每次商品类回复都重新取一次。

pub mod sqlite;

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteCatalog;

/// 商品所属分类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
}

/// 商品记录（快照中的一条）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// 创建日期（dd/mm/YYYY），旧数据可能缺失
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub categories: Vec<ProductCategory>,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("catalog record could not be decoded: {0}")]
    Decode(String),

    #[error("catalog task failed: {0}")]
    Task(String),
}

/// 商品目录快照来源
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// 读取当前全部商品
    async fn fetch_all_products(&self) -> Result<Vec<Product>, CatalogError>;
}

/// 内存目录：测试与演示用，可在运行中替换内容
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<Product>>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: RwLock::new(products),
        }
    }

    pub fn replace(&self, products: Vec<Product>) {
        *self
            .products
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = products;
    }
}

#[async_trait]
impl CatalogProvider for InMemoryCatalog {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self
            .products
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}
