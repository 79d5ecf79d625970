/// Products and variants, which hold photo URLs
use crate::assets::ReferenceChecker;
use crate::assets::repository::encode_timestamp;
use crate::error::{StockroomError, StockroomResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub business_id: String,
    pub product_id: String,
    pub name: String,
    pub photos: Vec<String>,
}

fn encode_photos(photos: &[String]) -> StockroomResult<String> {
    serde_json::to_string(photos)
        .map_err(|e| StockroomError::Internal(format!("Failed to encode photos: {}", e)))
}

/// Product and variant store
#[derive(Clone)]
pub struct InventoryStore {
    db: SqlitePool,
}

impl InventoryStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create_product(
        &self,
        business_id: &str,
        name: &str,
        photos: Vec<String>,
    ) -> StockroomResult<Product> {
        let now = encode_timestamp(Utc::now());
        let product = Product {
            id: format!("prd_{}", Uuid::new_v4().simple()),
            business_id: business_id.to_string(),
            name: name.to_string(),
            photos,
        };

        sqlx::query(
            r#"
            INSERT INTO products (id, business_id, name, photos, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.business_id)
        .bind(&product.name)
        .bind(encode_photos(&product.photos)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(product)
    }

    pub async fn set_product_photos(&self, product_id: &str, photos: &[String]) -> StockroomResult<()> {
        let result = sqlx::query("UPDATE products SET photos = ?, updated_at = ? WHERE id = ?")
            .bind(encode_photos(photos)?)
            .bind(encode_timestamp(Utc::now()))
            .bind(product_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StockroomError::NotFound(format!("product {}", product_id)));
        }
        Ok(())
    }

    pub async fn create_variant(
        &self,
        product: &Product,
        name: &str,
        photos: Vec<String>,
    ) -> StockroomResult<Variant> {
        let now = encode_timestamp(Utc::now());
        let variant = Variant {
            id: format!("var_{}", Uuid::new_v4().simple()),
            business_id: product.business_id.clone(),
            product_id: product.id.clone(),
            name: name.to_string(),
            photos,
        };

        sqlx::query(
            r#"
            INSERT INTO variants (id, business_id, product_id, name, photos, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.business_id)
        .bind(&variant.product_id)
        .bind(&variant.name)
        .bind(encode_photos(&variant.photos)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(variant)
    }

    pub async fn set_variant_photos(&self, variant_id: &str, photos: &[String]) -> StockroomResult<()> {
        let result = sqlx::query("UPDATE variants SET photos = ?, updated_at = ? WHERE id = ?")
            .bind(encode_photos(photos)?)
            .bind(encode_timestamp(Utc::now()))
            .bind(variant_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StockroomError::NotFound(format!("variant {}", variant_id)));
        }
        Ok(())
    }
}

/// `products.photos[]`
#[derive(Clone)]
pub struct ProductPhotoReferences {
    db: SqlitePool,
}

impl ProductPhotoReferences {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferenceChecker for ProductPhotoReferences {
    fn name(&self) -> &'static str {
        "product.photos"
    }

    async fn is_referenced(&self, business_id: &str, url: &str) -> StockroomResult<bool> {
        let referenced: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM products, json_each(products.photos)
                WHERE products.business_id = ? AND json_each.value = ?
            )
            "#,
        )
        .bind(business_id)
        .bind(url)
        .fetch_one(&self.db)
        .await?;

        Ok(referenced != 0)
    }
}

/// `variants.photos[]`
#[derive(Clone)]
pub struct VariantPhotoReferences {
    db: SqlitePool,
}

impl VariantPhotoReferences {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferenceChecker for VariantPhotoReferences {
    fn name(&self) -> &'static str {
        "variant.photos"
    }

    async fn is_referenced(&self, business_id: &str, url: &str) -> StockroomResult<bool> {
        let referenced: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM variants, json_each(variants.photos)
                WHERE variants.business_id = ? AND json_each.value = ?
            )
            "#,
        )
        .bind(business_id)
        .bind(url)
        .fetch_one(&self.db)
        .await?;

        Ok(referenced != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use crate::domain::BusinessStore;

    #[tokio::test]
    async fn test_photo_references() {
        let pool = create_memory_pool().await.unwrap();
        let business = BusinessStore::new(pool.clone())
            .create("ws_1", "Shop")
            .await
            .unwrap();
        let inventory = InventoryStore::new(pool.clone());
        let products = ProductPhotoReferences::new(pool.clone());
        let variants = VariantPhotoReferences::new(pool);

        let photo = "http://localhost:8080/v1/public/assets/ast_1".to_string();
        let product = inventory
            .create_product(&business.id, "Mug", vec![photo.clone()])
            .await
            .unwrap();
        let variant = inventory
            .create_variant(&product, "Blue", vec![])
            .await
            .unwrap();

        assert!(products.is_referenced(&business.id, &photo).await.unwrap());
        assert!(!products.is_referenced("biz_other", &photo).await.unwrap());
        assert!(!variants.is_referenced(&business.id, &photo).await.unwrap());

        inventory.set_product_photos(&product.id, &[]).await.unwrap();
        inventory
            .set_variant_photos(&variant.id, &[photo.clone()])
            .await
            .unwrap();

        assert!(!products.is_referenced(&business.id, &photo).await.unwrap());
        assert!(variants.is_referenced(&business.id, &photo).await.unwrap());

        assert!(matches!(
            inventory.set_variant_photos("var_missing", &[]).await,
            Err(StockroomError::NotFound(_))
        ));
    }
}
