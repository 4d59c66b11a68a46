//! SQLite 商品目录（只读）
//!
//! 表结构：
//! - products(id, name, price, tags JSON 数组文本, created_at, description)
//! - categories(id, name)
//! - product_categories(product_id, category_id)
//!
//! rusqlite 为同步 API，查询放在 spawn_blocking 中执行；每次 fetch 单独打开只读连接。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};

use super::{CatalogError, CatalogProvider, Product, ProductCategory};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id          INTEGER PRIMARY KEY,
    name        TEXT    NOT NULL,
    price       REAL    NOT NULL DEFAULT 0,
    tags        TEXT,
    created_at  TEXT,
    description TEXT
);
CREATE TABLE IF NOT EXISTS categories (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS product_categories (
    product_id  INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    PRIMARY KEY (product_id, category_id)
);
"#;

#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 建表（已存在则跳过）；父目录不存在时自动创建
    pub fn ensure_schema(&self) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Task(format!("create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

fn read_products(path: &Path) -> Result<Vec<Product>, CatalogError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut categories: HashMap<i64, Vec<ProductCategory>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT pc.product_id, c.id, c.name
             FROM product_categories pc
             JOIN categories c ON c.id = pc.category_id
             ORDER BY pc.product_id, c.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ProductCategory {
                    id: row.get(1)?,
                    name: row.get(2)?,
                },
            ))
        })?;
        for row in rows {
            let (product_id, category) = row?;
            categories.entry(product_id).or_default().push(category);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, price, tags, created_at, description FROM products ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut products = Vec::new();
    for row in rows {
        let (id, name, price, tags, created_at, description) = row?;
        products.push(Product {
            id,
            name,
            price,
            tags: decode_tags(id, tags.as_deref())?,
            description: description.unwrap_or_default(),
            created_at,
            categories: categories.remove(&id).unwrap_or_default(),
        });
    }
    Ok(products)
}

/// tags 列存 JSON 数组文本；NULL 或空串视为无标签
fn decode_tags(product_id: i64, raw: Option<&str>) -> Result<Vec<String>, CatalogError> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(Vec::new()),
        Some(text) => serde_json::from_str(text).map_err(|e| {
            CatalogError::Decode(format!("product {} has invalid tags {:?}: {}", product_id, text, e))
        }),
    }
}

#[async_trait]
impl CatalogProvider for SqliteCatalog {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, CatalogError> {
        let path = self.path.clone();
        let products = tokio::task::spawn_blocking(move || read_products(&path))
            .await
            .map_err(|e| CatalogError::Task(e.to_string()))??;
        tracing::debug!(count = products.len(), "Catalog snapshot loaded");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_catalog(dir: &Path) -> SqliteCatalog {
        let catalog = SqliteCatalog::new(dir.join("nested").join("catalog.db"));
        catalog.ensure_schema().unwrap();
        let conn = Connection::open(catalog.path()).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO categories (id, name) VALUES (1, 'Lighting'), (2, 'Office');
            INSERT INTO products (id, name, price, tags, created_at, description)
                VALUES (1, 'Desk lamp', 29.9, '["led","usb"]', '01/02/2024', 'Dimmable lamp'),
                       (2, 'Notebook', 3.5, NULL, NULL, NULL);
            INSERT INTO product_categories (product_id, category_id) VALUES (1, 1), (1, 2);
            "#,
        )
        .unwrap();
        catalog
    }

    #[tokio::test]
    async fn test_fetch_all_products() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());

        let products = catalog.fetch_all_products().await.unwrap();
        assert_eq!(products.len(), 2);

        let lamp = &products[0];
        assert_eq!(lamp.name, "Desk lamp");
        assert_eq!(lamp.tags, vec!["led", "usb"]);
        assert_eq!(lamp.created_at.as_deref(), Some("01/02/2024"));
        let names: Vec<_> = lamp.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Lighting", "Office"]);

        let notebook = &products[1];
        assert!(notebook.tags.is_empty());
        assert!(notebook.categories.is_empty());
        assert_eq!(notebook.description, "");
    }

    #[tokio::test]
    async fn test_invalid_tags_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = seeded_catalog(dir.path());
        let conn = Connection::open(catalog.path()).unwrap();
        conn.execute("UPDATE products SET tags = 'not json' WHERE id = 2", [])
            .unwrap();

        let err = catalog.fetch_all_products().await.unwrap_err();
        assert!(matches!(err, CatalogError::Decode(_)));
    }

    #[tokio::test]
    async fn test_missing_database_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("absent.db"));
        assert!(matches!(
            catalog.fetch_all_products().await,
            Err(CatalogError::Database(_))
        ));
    }
}
