/// Businesses: the tenant boundary for assets, and holders of a logo URL
use crate::assets::{ReferenceChecker, Tenant};
use crate::assets::repository::{decode_timestamp, encode_timestamp};
use crate::error::{StockroomError, StockroomResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Business record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    pub fn tenant(&self) -> Tenant {
        Tenant {
            business_id: self.id.clone(),
            workspace_id: self.workspace_id.clone(),
        }
    }
}

/// PATCH body; an explicit `null` logo clears it, an absent one leaves it alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusinessRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub logo_url: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn row_to_business(row: &SqliteRow) -> StockroomResult<Business> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Business {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        name: row.try_get("name")?,
        logo_url: row.try_get("logo_url")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

/// Business store
#[derive(Clone)]
pub struct BusinessStore {
    db: SqlitePool,
}

impl BusinessStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a business in a workspace
    pub async fn create(&self, workspace_id: &str, name: &str) -> StockroomResult<Business> {
        let now = Utc::now();
        let business = Business {
            id: format!("biz_{}", Uuid::new_v4().simple()),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            logo_url: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO businesses (id, workspace_id, name, logo_url, created_at, updated_at)
            VALUES (?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&business.id)
        .bind(&business.workspace_id)
        .bind(&business.name)
        .bind(encode_timestamp(now))
        .bind(encode_timestamp(now))
        .execute(&self.db)
        .await?;

        tracing::info!(business_id = %business.id, workspace_id = %workspace_id, "Business created");
        Ok(business)
    }

    pub async fn get(&self, id: &str) -> StockroomResult<Option<Business>> {
        let row = sqlx::query(
            "SELECT id, workspace_id, name, logo_url, created_at, updated_at FROM businesses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_business).transpose()
    }

    /// Resolve the tenant scope of a business
    pub async fn tenant(&self, id: &str) -> StockroomResult<Tenant> {
        self.get(id)
            .await?
            .map(|business| business.tenant())
            .ok_or_else(|| StockroomError::NotFound(format!("business {}", id)))
    }

    /// Apply a partial update
    pub async fn update(&self, id: &str, request: &UpdateBusinessRequest) -> StockroomResult<Business> {
        let mut business = self
            .get(id)
            .await?
            .ok_or_else(|| StockroomError::NotFound(format!("business {}", id)))?;

        if let Some(name) = &request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(crate::error::ValidationError::MissingField {
                    field: "name".to_string(),
                }
                .into());
            }
            business.name = name.to_string();
        }
        if let Some(logo_url) = &request.logo_url {
            business.logo_url = logo_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from);
        }
        business.updated_at = Utc::now();

        sqlx::query("UPDATE businesses SET name = ?, logo_url = ?, updated_at = ? WHERE id = ?")
            .bind(&business.name)
            .bind(&business.logo_url)
            .bind(encode_timestamp(business.updated_at))
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(business)
    }
}

/// `businesses.logo_url`
#[derive(Clone)]
pub struct BusinessLogoReferences {
    db: SqlitePool,
}

impl BusinessLogoReferences {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferenceChecker for BusinessLogoReferences {
    fn name(&self) -> &'static str {
        "business.logo_url"
    }

    async fn is_referenced(&self, business_id: &str, url: &str) -> StockroomResult<bool> {
        let referenced: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM businesses WHERE id = ? AND logo_url = ?)",
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

    #[tokio::test]
    async fn test_create_and_resolve_tenant() {
        let store = BusinessStore::new(create_memory_pool().await.unwrap());
        let business = store.create("ws_1", "Corner Shop").await.unwrap();

        let tenant = store.tenant(&business.id).await.unwrap();
        assert_eq!(tenant.workspace_id, "ws_1");
        assert!(matches!(
            store.tenant("biz_missing").await,
            Err(StockroomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_logo_reference_follows_updates() {
        let pool = create_memory_pool().await.unwrap();
        let store = BusinessStore::new(pool.clone());
        let checker = BusinessLogoReferences::new(pool);
        let business = store.create("ws_1", "Corner Shop").await.unwrap();
        let url = "http://localhost:8080/v1/public/assets/ast_1";

        let patch: UpdateBusinessRequest =
            serde_json::from_value(serde_json::json!({ "logoUrl": url })).unwrap();
        store.update(&business.id, &patch).await.unwrap();
        assert!(checker.is_referenced(&business.id, url).await.unwrap());
        assert!(!checker.is_referenced("biz_other", url).await.unwrap());

        // Renaming leaves the logo alone
        let patch: UpdateBusinessRequest =
            serde_json::from_value(serde_json::json!({ "name": "New Name" })).unwrap();
        let updated = store.update(&business.id, &patch).await.unwrap();
        assert_eq!(updated.logo_url.as_deref(), Some(url));

        let patch: UpdateBusinessRequest =
            serde_json::from_value(serde_json::json!({ "logoUrl": null })).unwrap();
        let updated = store.update(&business.id, &patch).await.unwrap();
        assert_eq!(updated.logo_url, None);
        assert!(!checker.is_referenced(&business.id, url).await.unwrap());
    }
}
