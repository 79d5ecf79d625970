/// Asset persistence over the `uploaded_assets` table
use crate::assets::{Asset, FileCategory};
use crate::error::{StockroomError, StockroomResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const ASSET_COLUMNS: &str = "id, workspace_id, business_id, file_name, content_type, size_bytes, \
     category, object_key, public_url, cdn_url, thumbnail_of, upload_expires_at, ready_at, created_at, \
     idempotency_key, request_hash";

/// Fixed-width RFC 3339 so stored timestamps order correctly as text
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> StockroomResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StockroomError::Internal(format!("Invalid timestamp {}: {}", raw, e)))
}

fn decode_optional_timestamp(raw: Option<String>) -> StockroomResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_timestamp).transpose()
}

fn row_to_asset(row: &SqliteRow) -> StockroomResult<Asset> {
    let category: String = row.try_get("category")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Asset {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        business_id: row.try_get("business_id")?,
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        size_bytes: row.try_get("size_bytes")?,
        category: FileCategory::parse(&category).ok_or_else(|| {
            StockroomError::Internal(format!("Unknown asset category: {}", category))
        })?,
        object_key: row.try_get("object_key")?,
        public_url: row.try_get("public_url")?,
        cdn_url: row.try_get("cdn_url")?,
        thumbnail_of: row.try_get("thumbnail_of")?,
        upload_expires_at: decode_optional_timestamp(row.try_get("upload_expires_at")?)?,
        ready_at: decode_optional_timestamp(row.try_get("ready_at")?)?,
        created_at: decode_timestamp(&created_at)?,
        idempotency_key: row.try_get("idempotency_key")?,
        request_hash: row.try_get("request_hash")?,
    })
}

/// True when a write was rejected by a unique index
pub fn is_unique_violation(err: &StockroomError) -> bool {
    matches!(err, StockroomError::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
}

/// Condition a row must still satisfy at delete time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGuard {
    /// Delete whatever state the row is in
    Unconditional,
    /// Only while still pending and expired as of the given instant
    ExpiredPending(DateTime<Utc>),
    /// Only while ready
    Ready,
}

/// Rows removed by one delete: the target first, then its thumbnails
#[derive(Debug, Clone)]
pub struct DeletedRows {
    pub asset: Asset,
    pub thumbnails: Vec<Asset>,
}

/// Asset repository
#[derive(Clone)]
pub struct AssetRepository {
    db: SqlitePool,
}

impl AssetRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert pending rows in one transaction
    ///
    /// Parents must precede their thumbnails in `assets`.
    pub async fn insert_pending(&self, assets: &[Asset]) -> StockroomResult<()> {
        let mut tx = self.db.begin().await?;

        for asset in assets {
            let expires_at = asset.upload_expires_at.ok_or_else(|| {
                StockroomError::Internal(format!("Pending asset {} has no expiry", asset.id))
            })?;

            sqlx::query(
                r#"
                INSERT INTO uploaded_assets
                    (id, workspace_id, business_id, file_name, content_type, size_bytes, category,
                     object_key, public_url, cdn_url, thumbnail_of, upload_expires_at, ready_at, created_at,
                     idempotency_key, request_hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
                "#,
            )
            .bind(&asset.id)
            .bind(&asset.workspace_id)
            .bind(&asset.business_id)
            .bind(&asset.file_name)
            .bind(&asset.content_type)
            .bind(asset.size_bytes)
            .bind(asset.category.as_str())
            .bind(&asset.object_key)
            .bind(&asset.public_url)
            .bind(&asset.cdn_url)
            .bind(&asset.thumbnail_of)
            .bind(encode_timestamp(expires_at))
            .bind(encode_timestamp(asset.created_at))
            .bind(&asset.idempotency_key)
            .bind(&asset.request_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Find an asset by id regardless of owner
    pub async fn find_by_id(&self, id: &str) -> StockroomResult<Option<Asset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE id = ?",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    /// Find an asset owned by a business; another tenant's id behaves as unknown
    pub async fn find_scoped(&self, business_id: &str, id: &str) -> StockroomResult<Option<Asset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE id = ? AND business_id = ?",
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    /// Find the asset that owns a blob key
    pub async fn find_by_object_key(&self, object_key: &str) -> StockroomResult<Option<Asset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE object_key = ?",
            ASSET_COLUMNS
        ))
        .bind(object_key)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    /// Find the asset a business created under an idempotency key
    pub async fn find_by_idempotency_key(
        &self,
        business_id: &str,
        key: &str,
    ) -> StockroomResult<Option<Asset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE business_id = ? AND idempotency_key = ?",
            ASSET_COLUMNS
        ))
        .bind(business_id)
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    /// Thumbnail rows of a parent asset
    pub async fn find_thumbnails(&self, parent_id: &str) -> StockroomResult<Vec<Asset>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE thumbnail_of = ? ORDER BY id",
            ASSET_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_asset).collect()
    }

    /// Pending assets whose upload window closed before `now`, oldest first
    pub async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StockroomResult<Vec<Asset>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM uploaded_assets
            WHERE ready_at IS NULL AND upload_expires_at < ?
            ORDER BY upload_expires_at ASC, id ASC
            LIMIT ?
            "#,
            ASSET_COLUMNS
        ))
        .bind(encode_timestamp(now))
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_asset).collect()
    }

    /// One page of ready, non-thumbnail assets that became ready before `ready_before`
    ///
    /// Keyset-paged on `(ready_at, id)`: pass the last row of the previous page as `after`.
    pub async fn find_orphan_candidates(
        &self,
        ready_before: DateTime<Utc>,
        after: Option<(DateTime<Utc>, &str)>,
        limit: usize,
    ) -> StockroomResult<Vec<Asset>> {
        let (after_ready_at, after_id) = match after {
            Some((ready_at, id)) => (Some(encode_timestamp(ready_at)), id.to_string()),
            None => (None, String::new()),
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM uploaded_assets
            WHERE ready_at IS NOT NULL
              AND thumbnail_of IS NULL
              AND ready_at < ?
              AND (? IS NULL OR ready_at > ? OR (ready_at = ? AND id > ?))
            ORDER BY ready_at ASC, id ASC
            LIMIT ?
            "#,
            ASSET_COLUMNS
        ))
        .bind(encode_timestamp(ready_before))
        .bind(after_ready_at.clone())
        .bind(after_ready_at.clone())
        .bind(after_ready_at)
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_asset).collect()
    }

    /// Transition pending to ready with the observed size
    ///
    /// Returns false when the row is gone or was already ready.
    pub async fn mark_ready(
        &self,
        id: &str,
        size_bytes: i64,
        now: DateTime<Utc>,
    ) -> StockroomResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploaded_assets
            SET size_bytes = ?, upload_expires_at = NULL, ready_at = ?
            WHERE id = ? AND ready_at IS NULL
            "#,
        )
        .bind(size_bytes)
        .bind(encode_timestamp(now))
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete an asset and its thumbnails in one transaction
    ///
    /// Returns `None` when the row no longer exists or no longer satisfies `guard`;
    /// nothing is removed in that case.
    pub async fn delete_with_thumbnails(
        &self,
        id: &str,
        guard: DeleteGuard,
    ) -> StockroomResult<Option<DeletedRows>> {
        let mut tx = self.db.begin().await?;

        let asset = match sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE id = ?",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        {
            Some(row) => row_to_asset(&row)?,
            None => return Ok(None),
        };

        let thumbnail_rows = sqlx::query(&format!(
            "SELECT {} FROM uploaded_assets WHERE thumbnail_of = ? ORDER BY id",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let thumbnails = thumbnail_rows
            .iter()
            .map(row_to_asset)
            .collect::<StockroomResult<Vec<_>>>()?;

        let deleted = match guard {
            DeleteGuard::Unconditional => {
                sqlx::query("DELETE FROM uploaded_assets WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
            }
            DeleteGuard::ExpiredPending(now) => {
                sqlx::query(
                    "DELETE FROM uploaded_assets
                     WHERE id = ? AND ready_at IS NULL AND upload_expires_at < ?",
                )
                .bind(id)
                .bind(encode_timestamp(now))
                .execute(&mut *tx)
                .await?
            }
            DeleteGuard::Ready => {
                sqlx::query("DELETE FROM uploaded_assets WHERE id = ? AND ready_at IS NOT NULL")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
            }
        };

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        // Rows referencing the parent go with it through the foreign key; delete
        // them explicitly as well so the count does not depend on pragmas
        sqlx::query("DELETE FROM uploaded_assets WHERE thumbnail_of = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(DeletedRows { asset, thumbnails }))
    }

    /// Number of stored asset rows
    pub async fn count(&self) -> StockroomResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_assets")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use chrono::Duration;

    async fn setup() -> AssetRepository {
        let pool = create_memory_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO businesses (id, workspace_id, name, created_at, updated_at)
             VALUES ('biz_1', 'ws_1', 'Shop', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z'),
                    ('biz_2', 'ws_2', 'Other', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        AssetRepository::new(pool)
    }

    fn pending(id: &str, business_id: &str, expires_at: DateTime<Utc>) -> Asset {
        Asset {
            id: id.to_string(),
            workspace_id: "ws_1".to_string(),
            business_id: business_id.to_string(),
            file_name: "logo.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 12,
            category: FileCategory::Image,
            object_key: format!("business/{}/assets/{}/logo.png", business_id, id),
            public_url: format!("http://localhost/v1/public/assets/{}", id),
            cdn_url: format!("http://localhost/v1/public/assets/{}", id),
            thumbnail_of: None,
            upload_expires_at: Some(expires_at),
            ready_at: None,
            created_at: Utc::now(),
            idempotency_key: None,
            request_hash: None,
        }
    }

    fn thumbnail_of(parent: &Asset, id: &str) -> Asset {
        let mut thumb = pending(id, &parent.business_id, parent.upload_expires_at.unwrap());
        thumb.content_type = "image/jpeg".to_string();
        thumb.size_bytes = 0;
        thumb.object_key = format!("business/{}/assets/{}/thumbnail.jpg", parent.business_id, id);
        thumb.thumbnail_of = Some(parent.id.clone());
        thumb
    }

    #[tokio::test]
    async fn test_insert_and_scoped_lookup() {
        let repo = setup().await;
        let asset = pending("ast_1", "biz_1", Utc::now() + Duration::minutes(15));
        repo.insert_pending(&[asset.clone()]).await.unwrap();

        let found = repo.find_scoped("biz_1", "ast_1").await.unwrap().unwrap();
        assert_eq!(found.id, "ast_1");
        assert_eq!(found.category, FileCategory::Image);
        assert!(!found.is_ready());

        assert!(repo.find_scoped("biz_2", "ast_1").await.unwrap().is_none());
        assert!(repo.find_by_id("ast_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_idempotency_key_unique_per_business() {
        let repo = setup().await;
        let expires = Utc::now() + Duration::minutes(15);

        let mut first = pending("ast_1", "biz_1", expires);
        first.idempotency_key = Some("order-42".to_string());
        first.request_hash = Some("abc".to_string());
        repo.insert_pending(&[first]).await.unwrap();

        let found = repo
            .find_by_idempotency_key("biz_1", "order-42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "ast_1");
        assert_eq!(found.request_hash.as_deref(), Some("abc"));
        assert!(repo
            .find_by_idempotency_key("biz_2", "order-42")
            .await
            .unwrap()
            .is_none());

        // Same key under another business is independent
        let mut other = pending("ast_2", "biz_2", expires);
        other.idempotency_key = Some("order-42".to_string());
        repo.insert_pending(&[other]).await.unwrap();

        let mut dup = pending("ast_3", "biz_1", expires);
        dup.idempotency_key = Some("order-42".to_string());
        let err = repo.insert_pending(&[dup]).await.unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(repo.find_by_id("ast_3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_object_key() {
        let repo = setup().await;
        let asset = pending("ast_1", "biz_1", Utc::now() + Duration::minutes(15));
        repo.insert_pending(&[asset.clone()]).await.unwrap();

        let found = repo.find_by_object_key(&asset.object_key).await.unwrap().unwrap();
        assert_eq!(found.id, "ast_1");
        assert!(repo
            .find_by_object_key("business/biz_1/assets/nope/logo.png")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_ready_only_once() {
        let repo = setup().await;
        repo.insert_pending(&[pending("ast_1", "biz_1", Utc::now() + Duration::minutes(15))])
            .await
            .unwrap();

        let now = Utc::now();
        assert!(repo.mark_ready("ast_1", 99, now).await.unwrap());
        assert!(!repo.mark_ready("ast_1", 100, now + Duration::seconds(5)).await.unwrap());

        let ready = repo.find_by_id("ast_1").await.unwrap().unwrap();
        assert_eq!(ready.size_bytes, 99);
        assert!(ready.upload_expires_at.is_none());
        assert_eq!(ready.ready_at.map(encode_timestamp), Some(encode_timestamp(now)));
    }

    #[tokio::test]
    async fn test_find_expired_pending_respects_limit() {
        let repo = setup().await;
        let past = Utc::now() - Duration::minutes(1);
        repo.insert_pending(&[
            pending("ast_1", "biz_1", past - Duration::seconds(2)),
            pending("ast_2", "biz_1", past - Duration::seconds(1)),
            pending("ast_3", "biz_1", Utc::now() + Duration::minutes(15)),
        ])
        .await
        .unwrap();

        let expired = repo.find_expired_pending(Utc::now(), 10).await.unwrap();
        let ids: Vec<_> = expired.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["ast_1", "ast_2"]);

        assert_eq!(repo.find_expired_pending(Utc::now(), 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_orphan_candidates_keyset_paging() {
        let repo = setup().await;
        let expires = Utc::now() + Duration::minutes(15);
        let parent = pending("ast_a", "biz_1", expires);
        let thumb = thumbnail_of(&parent, "ast_a_thumb");
        repo.insert_pending(&[
            parent,
            thumb,
            pending("ast_b", "biz_1", expires),
            pending("ast_c", "biz_1", expires),
        ])
        .await
        .unwrap();

        let t0 = Utc::now() - Duration::hours(2);
        repo.mark_ready("ast_a", 1, t0).await.unwrap();
        repo.mark_ready("ast_a_thumb", 1, t0).await.unwrap();
        repo.mark_ready("ast_b", 1, t0).await.unwrap();
        repo.mark_ready("ast_c", 1, Utc::now()).await.unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let first = repo.find_orphan_candidates(cutoff, None, 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "ast_a");

        let last = &first[0];
        let second = repo
            .find_orphan_candidates(cutoff, Some((last.ready_at.unwrap(), &last.id)), 10)
            .await
            .unwrap();
        let ids: Vec<_> = second.iter().map(|a| a.id.as_str()).collect();
        // Thumbnail and too-young asset are excluded
        assert_eq!(ids, vec!["ast_b"]);
    }

    #[tokio::test]
    async fn test_delete_takes_thumbnails() {
        let repo = setup().await;
        let parent = pending("ast_1", "biz_1", Utc::now() + Duration::minutes(15));
        let thumb = thumbnail_of(&parent, "ast_1_thumb");
        repo.insert_pending(&[parent, thumb]).await.unwrap();

        let deleted = repo
            .delete_with_thumbnails("ast_1", DeleteGuard::Unconditional)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.asset.id, "ast_1");
        assert_eq!(deleted.thumbnails.len(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);

        // Deleting again is a no-op
        assert!(repo
            .delete_with_thumbnails("ast_1", DeleteGuard::Unconditional)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_guard_blocks_changed_rows() {
        let repo = setup().await;
        let past = Utc::now() - Duration::minutes(1);
        repo.insert_pending(&[pending("ast_1", "biz_1", past)]).await.unwrap();
        repo.mark_ready("ast_1", 12, Utc::now()).await.unwrap();

        // Completed after being selected as expired
        let outcome = repo
            .delete_with_thumbnails("ast_1", DeleteGuard::ExpiredPending(Utc::now()))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(repo.find_by_id("ast_1").await.unwrap().is_some());

        let outcome = repo
            .delete_with_thumbnails("ast_1", DeleteGuard::Ready)
            .await
            .unwrap();
        assert!(outcome.is_some());
    }
}
