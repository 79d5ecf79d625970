/// Asset garbage collection
///
/// A sweep removes expired pending uploads, then ready assets nobody references.
/// Sweeps are bounded by per-invocation limits and safe to replay: rows deleted
/// by an earlier sweep simply stop showing up in the selections.
use crate::assets::removal::{AssetRemoval, RemovalReason};
use crate::assets::repository::DeleteGuard;
use crate::assets::{Asset, AssetRepository, ReferenceTracker};
use crate::config::GcConfig;
use crate::error::{StockroomError, StockroomResult, ValidationError};
use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Rows fetched per orphan-scan page
const ORPHAN_SCAN_PAGE_SIZE: usize = 100;

/// Most ready rows the orphan scan inspects in one sweep
const ORPHAN_SCAN_BUDGET: usize = 10_000;

/// Longest accepted orphan grace period, one hundred years
pub const MAX_ORPHAN_MIN_AGE_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Orphan grace period from a client- or operator-supplied number of seconds
pub fn orphan_min_age(secs: i64) -> Result<Duration, ValidationError> {
    let invalid = |message: &str| ValidationError::Invalid {
        field: "orphanMinAgeSecs".to_string(),
        message: message.to_string(),
    };

    if secs < 0 {
        return Err(invalid("must not be negative"));
    }
    if secs > MAX_ORPHAN_MIN_AGE_SECS {
        return Err(invalid("exceeds one hundred years"));
    }
    Duration::try_seconds(secs).ok_or_else(|| invalid("out of range"))
}

/// Parameters of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcOptions {
    pub now: DateTime<Utc>,
    pub pending_limit: usize,
    pub orphan_limit: usize,
    pub orphan_min_age: Duration,
    /// Log what would be removed without removing anything
    pub dry_run: bool,
}

impl GcOptions {
    pub fn from_config(config: &GcConfig, now: DateTime<Utc>) -> StockroomResult<Self> {
        let secs = i64::try_from(config.orphan_min_age_secs).unwrap_or(i64::MAX);
        let orphan_min_age =
            orphan_min_age(secs).map_err(|e| StockroomError::Config(e.to_string()))?;

        Ok(Self {
            now,
            pending_limit: config.pending_limit,
            orphan_limit: config.orphan_limit,
            orphan_min_age,
            dry_run: false,
        })
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub expired_pending_candidates: usize,
    pub orphan_candidates: usize,
    /// Selected assets removed; thumbnails taken along are counted separately
    pub deleted_assets: usize,
    pub deleted_thumbnails: usize,
    pub deleted_blobs: usize,
    /// Objects left behind because deleting them failed after their row went
    pub blob_failures: usize,
    /// Candidates that were gone or had changed state by the time of deletion
    pub skipped: usize,
    pub errors: usize,
    pub dry_run: bool,
}

/// Bounded, single-flight sweeper
pub struct GarbageCollector {
    repo: AssetRepository,
    removal: AssetRemoval,
    references: Arc<ReferenceTracker>,
    running: Mutex<()>,
}

impl GarbageCollector {
    pub fn new(
        repo: AssetRepository,
        removal: AssetRemoval,
        references: Arc<ReferenceTracker>,
    ) -> Self {
        Self {
            repo,
            removal,
            references,
            running: Mutex::new(()),
        }
    }

    /// Run one sweep
    ///
    /// A second caller waits for the sweep in progress to finish. Per-item
    /// failures are counted in the report; only failing to select candidates
    /// is returned as an error.
    pub async fn run(&self, options: GcOptions) -> StockroomResult<GcReport> {
        let _running = self.running.lock().await;
        let started = std::time::Instant::now();

        let result = self.sweep(&options).await;

        let status = if result.as_ref().map(|r| r.errors == 0).unwrap_or(false) {
            "ok"
        } else {
            "error"
        };
        metrics::GC_RUNS.with_label_values(&[status]).inc();
        metrics::GC_DURATION.observe(started.elapsed().as_secs_f64());
        metrics::GC_LAST_RUN.set(Utc::now().timestamp());

        match &result {
            Ok(report) => tracing::info!(
                now = %options.now,
                dry_run = options.dry_run,
                expired_pending_candidates = report.expired_pending_candidates,
                orphan_candidates = report.orphan_candidates,
                deleted_assets = report.deleted_assets,
                deleted_thumbnails = report.deleted_thumbnails,
                deleted_blobs = report.deleted_blobs,
                blob_failures = report.blob_failures,
                skipped = report.skipped,
                errors = report.errors,
                "Asset GC complete"
            ),
            Err(e) => tracing::error!(error = %e, "Asset GC aborted"),
        }

        result
    }

    async fn sweep(&self, options: &GcOptions) -> StockroomResult<GcReport> {
        let ready_before = options
            .now
            .checked_sub_signed(options.orphan_min_age)
            .ok_or_else(|| ValidationError::Invalid {
                field: "orphanMinAgeSecs".to_string(),
                message: "reaches before the earliest representable time".to_string(),
            })?;

        let mut report = GcReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        // Abandoned uploads; nothing can reference a pending asset yet
        let pending = self
            .repo
            .find_expired_pending(options.now, options.pending_limit)
            .await?;
        report.expired_pending_candidates = pending.len();

        // Limits bound deleted rows, thumbnails included
        let mut budget = options.pending_limit;
        for asset in &pending {
            if options.dry_run {
                log_would_delete(asset, RemovalReason::ExpiredPending);
                continue;
            }
            if budget == 0 {
                break;
            }
            self.remove(
                asset,
                DeleteGuard::ExpiredPending(options.now),
                RemovalReason::ExpiredPending,
                &mut budget,
                &mut report,
            )
            .await;
        }

        let orphans = self
            .select_orphans(options, ready_before, &mut report)
            .await?;
        report.orphan_candidates = orphans.len();

        let mut budget = options.orphan_limit;
        for asset in &orphans {
            if options.dry_run {
                log_would_delete(asset, RemovalReason::Orphaned);
                continue;
            }
            if budget == 0 {
                break;
            }

            // The batch check may be stale; a reference added since then wins
            match self.is_orphan(asset).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(asset_id = %asset.id, "Orphan candidate became referenced, keeping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset.id, error = %e, "Reference re-check failed, keeping asset");
                    report.errors += 1;
                    continue;
                }
            }

            self.remove(
                asset,
                DeleteGuard::Ready,
                RemovalReason::Orphaned,
                &mut budget,
                &mut report,
            )
            .await;
        }

        Ok(report)
    }

    /// Page through old ready assets until enough unreferenced ones are found
    async fn select_orphans(
        &self,
        options: &GcOptions,
        ready_before: DateTime<Utc>,
        report: &mut GcReport,
    ) -> StockroomResult<Vec<Asset>> {
        let mut selected = Vec::new();
        let mut cursor: Option<(DateTime<Utc>, String)> = None;
        let mut scanned = 0;

        'scan: while selected.len() < options.orphan_limit && scanned < ORPHAN_SCAN_BUDGET {
            let page = self
                .repo
                .find_orphan_candidates(
                    ready_before,
                    cursor.as_ref().map(|(at, id)| (*at, id.as_str())),
                    ORPHAN_SCAN_PAGE_SIZE,
                )
                .await?;

            let Some(last) = page.last() else {
                break;
            };
            cursor = match last.ready_at {
                Some(ready_at) => Some((ready_at, last.id.clone())),
                None => break,
            };

            for asset in page {
                scanned += 1;
                match self.is_orphan(&asset).await {
                    Ok(true) => selected.push(asset),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(asset_id = %asset.id, error = %e, "Reference check failed, keeping asset");
                        report.errors += 1;
                    }
                }
                if selected.len() >= options.orphan_limit {
                    break 'scan;
                }
            }
        }

        if scanned >= ORPHAN_SCAN_BUDGET {
            tracing::debug!(scanned, "Orphan scan budget exhausted");
        }

        Ok(selected)
    }

    async fn is_orphan(&self, asset: &Asset) -> StockroomResult<bool> {
        let urls = self.removal.reference_urls(asset).await?;
        Ok(!self
            .references
            .is_referenced(&asset.business_id, &urls)
            .await?)
    }

    /// Remove a candidate with its thumbnails, charging every row to `budget`
    ///
    /// When the whole set does not fit, only thumbnails are removed, as many as
    /// the budget allows; the parent follows in a later sweep.
    async fn remove(
        &self,
        asset: &Asset,
        guard: DeleteGuard,
        reason: RemovalReason,
        budget: &mut usize,
        report: &mut GcReport,
    ) {
        let thumbnails = match self.repo.find_thumbnails(&asset.id).await {
            Ok(thumbnails) => thumbnails,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(asset_id = %asset.id, error = %e, "Failed to load thumbnails");
                return;
            }
        };

        if 1 + thumbnails.len() > *budget {
            let take = *budget;
            for thumbnail in thumbnails.iter().take(take) {
                // Same state condition as the parent
                match self.removal.remove(&thumbnail.id, guard, reason).await
                {
                    Ok(Some(removed)) => {
                        *budget -= 1;
                        report.deleted_thumbnails += 1;
                        report.deleted_blobs += removed.blobs_deleted;
                        report.blob_failures += removed.blob_failures;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        report.errors += 1;
                        tracing::warn!(asset_id = %thumbnail.id, error = %e, "Failed to delete thumbnail");
                    }
                }
            }
            tracing::debug!(asset_id = %asset.id, "GC limit reached, parent deferred");
            return;
        }

        match self.removal.remove(&asset.id, guard, reason).await {
            Ok(Some(removed)) => {
                *budget = budget.saturating_sub(1 + removed.thumbnails);
                report.deleted_assets += 1;
                report.deleted_thumbnails += removed.thumbnails;
                report.deleted_blobs += removed.blobs_deleted;
                report.blob_failures += removed.blob_failures;
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(
                    asset_id = %asset.id,
                    reason = reason.as_str(),
                    error = %e,
                    "Failed to delete asset"
                );
            }
        }
    }
}

fn log_would_delete(asset: &Asset, reason: RemovalReason) {
    tracing::info!(
        asset_id = %asset.id,
        business_id = %asset.business_id,
        object_key = %asset.object_key,
        public_url = %asset.public_url,
        reason = reason.as_str(),
        "Asset GC would delete asset"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetUrls, FileCategory, ReferenceChecker, UploadDescriptor};
    use crate::blob_store::{BlobBackend, DiskBlobBackend, UploadSigner, UploadTarget};
    use crate::config::ServerConfig;
    use crate::db::create_memory_pool;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// References held in memory, editable mid-test
    #[derive(Default)]
    struct MemoryRefs {
        urls: StdMutex<HashSet<String>>,
    }

    impl MemoryRefs {
        fn add(&self, url: &str) {
            self.urls.lock().unwrap().insert(url.to_string());
        }
    }

    #[async_trait]
    impl ReferenceChecker for MemoryRefs {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn is_referenced(&self, _business_id: &str, url: &str) -> StockroomResult<bool> {
            Ok(self.urls.lock().unwrap().contains(url))
        }
    }

    /// Reports a reference only from its second question onwards
    #[derive(Default)]
    struct LateReference {
        url: String,
        calls: StdMutex<usize>,
    }

    #[async_trait]
    impl ReferenceChecker for LateReference {
        fn name(&self) -> &'static str {
            "late"
        }

        async fn is_referenced(&self, _business_id: &str, url: &str) -> StockroomResult<bool> {
            if url != self.url {
                return Ok(false);
            }
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok(*calls > 1)
        }
    }

    /// Disk store whose deletes always fail
    struct StuckDeletes(DiskBlobBackend);

    #[async_trait]
    impl BlobBackend for StuckDeletes {
        async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StockroomResult<()> {
            self.0.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> StockroomResult<Option<Vec<u8>>> {
            self.0.get(key).await
        }

        async fn delete(&self, _key: &str) -> StockroomResult<()> {
            Err(StockroomError::BlobStorage("delete refused".to_string()))
        }

        async fn size(&self, key: &str) -> StockroomResult<Option<u64>> {
            self.0.size(key).await
        }

        async fn signed_upload_url(
            &self,
            target: UploadTarget<'_>,
        ) -> StockroomResult<UploadDescriptor> {
            self.0.signed_upload_url(target).await
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    struct Fixture {
        repo: AssetRepository,
        backend: Arc<dyn BlobBackend>,
        removal: AssetRemoval,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        setup_with(false).await
    }

    async fn setup_with(stuck_deletes: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_memory_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO businesses (id, workspace_id, name, created_at, updated_at)
             VALUES ('biz_1', 'ws_1', 'Shop', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let disk = DiskBlobBackend::new(
            dir.path().to_path_buf(),
            UploadSigner::new("s".repeat(32), "http://localhost:8080".to_string()),
        );
        let backend: Arc<dyn BlobBackend> = if stuck_deletes {
            Arc::new(StuckDeletes(disk))
        } else {
            Arc::new(disk)
        };
        let repo = AssetRepository::new(pool);
        let urls = AssetUrls::new("http://localhost:8080", None, backend.clone());
        let removal = AssetRemoval::new(repo.clone(), backend.clone(), urls);

        Fixture {
            repo,
            backend,
            removal,
            _dir: dir,
        }
    }

    fn collector(fx: &Fixture, tracker: ReferenceTracker) -> GarbageCollector {
        GarbageCollector::new(fx.repo.clone(), fx.removal.clone(), Arc::new(tracker))
    }

    fn row(id: &str, thumbnail_of: Option<&str>, expires_at: DateTime<Utc>) -> Asset {
        let key_name = if thumbnail_of.is_some() { "thumbnail.jpg" } else { "a.png" };
        Asset {
            id: id.to_string(),
            workspace_id: "ws_1".to_string(),
            business_id: "biz_1".to_string(),
            file_name: key_name.to_string(),
            content_type: if thumbnail_of.is_some() { "image/jpeg" } else { "image/png" }.to_string(),
            size_bytes: 3,
            category: FileCategory::Image,
            object_key: format!("business/biz_1/assets/{}/{}", id, key_name),
            public_url: format!("http://localhost:8080/v1/public/assets/{}", id),
            cdn_url: format!("http://localhost:8080/v1/public/assets/{}", id),
            thumbnail_of: thumbnail_of.map(String::from),
            upload_expires_at: Some(expires_at),
            ready_at: None,
            created_at: Utc::now(),
            idempotency_key: None,
            request_hash: None,
        }
    }

    /// Insert a pending asset and store its bytes
    async fn seed(fx: &Fixture, asset: &Asset) {
        fx.repo.insert_pending(&[asset.clone()]).await.unwrap();
        fx.backend
            .put(&asset.object_key, vec![1, 2, 3], &asset.content_type)
            .await
            .unwrap();
    }

    /// Insert an asset that became ready at `ready_at`
    async fn seed_ready(fx: &Fixture, asset: &Asset, ready_at: DateTime<Utc>) {
        seed(fx, asset).await;
        assert!(fx.repo.mark_ready(&asset.id, 3, ready_at).await.unwrap());
    }

    fn options(now: DateTime<Utc>, pending_limit: usize, orphan_limit: usize) -> GcOptions {
        GcOptions {
            now,
            pending_limit,
            orphan_limit,
            orphan_min_age: Duration::minutes(30),
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_expired_pending_removed_with_blobs() {
        let fx = setup().await;
        let now = Utc::now();
        let expired = row("ast_old", None, now - Duration::minutes(1));
        let fresh = row("ast_new", None, now + Duration::minutes(10));
        seed(&fx, &expired).await;
        seed(&fx, &fresh).await;

        let gc = collector(&fx, ReferenceTracker::new());
        let report = gc.run(options(now, 100, 100)).await.unwrap();

        assert_eq!(report.expired_pending_candidates, 1);
        assert_eq!(report.deleted_assets, 1);
        assert_eq!(report.deleted_blobs, 1);
        assert_eq!(report.errors, 0);
        assert!(fx.repo.find_by_id("ast_old").await.unwrap().is_none());
        assert_eq!(fx.backend.get(&expired.object_key).await.unwrap(), None);
        assert!(fx.repo.find_by_id("ast_new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_never_uploaded_is_removed() {
        let fx = setup().await;
        let now = Utc::now();
        fx.repo
            .insert_pending(&[row("ast_ghost", None, now - Duration::minutes(1))])
            .await
            .unwrap();

        let report = collector(&fx, ReferenceTracker::new())
            .run(options(now, 100, 0))
            .await
            .unwrap();

        assert_eq!(report.deleted_assets, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(fx.repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_referenced_ready_assets_survive() {
        let fx = setup().await;
        let now = Utc::now();
        let old = now - Duration::hours(2);
        let kept = row("ast_kept", None, now);
        let orphan = row("ast_orphan", None, now);
        seed_ready(&fx, &kept, old).await;
        seed_ready(&fx, &orphan, old).await;

        let refs = Arc::new(MemoryRefs::default());
        refs.add(&kept.public_url);
        let report = collector(&fx, ReferenceTracker::new().with(refs))
            .run(options(now, 100, 100))
            .await
            .unwrap();

        assert_eq!(report.orphan_candidates, 1);
        assert_eq!(report.deleted_assets, 1);
        assert!(fx.repo.find_by_id("ast_kept").await.unwrap().is_some());
        assert!(fx.backend.get(&kept.object_key).await.unwrap().is_some());
        assert!(fx.repo.find_by_id("ast_orphan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_young_ready_assets_survive() {
        let fx = setup().await;
        let now = Utc::now();
        seed_ready(&fx, &row("ast_young", None, now), now - Duration::minutes(5)).await;

        let report = collector(&fx, ReferenceTracker::new())
            .run(options(now, 100, 100))
            .await
            .unwrap();

        assert_eq!(report.orphan_candidates, 0);
        assert!(fx.repo.find_by_id("ast_young").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_thumbnail_follows_parent_reference_state() {
        let fx = setup().await;
        let now = Utc::now();
        let old = now - Duration::hours(2);
        let parent = row("ast_parent", None, now);
        let thumb = row("ast_thumb", Some("ast_parent"), now);
        seed_ready(&fx, &parent, old).await;
        seed_ready(&fx, &thumb, old).await;

        // Parent referenced: thumbnail stays although nothing points at it
        let refs = Arc::new(MemoryRefs::default());
        refs.add(&parent.public_url);
        let report = collector(&fx, ReferenceTracker::new().with(refs))
            .run(options(now, 100, 100))
            .await
            .unwrap();
        assert_eq!(report.deleted_assets, 0);
        assert!(fx.repo.find_by_id("ast_thumb").await.unwrap().is_some());

        // Parent unreferenced: both go
        let report = collector(&fx, ReferenceTracker::new())
            .run(options(now, 100, 100))
            .await
            .unwrap();
        assert_eq!(report.deleted_assets, 1);
        assert_eq!(report.deleted_thumbnails, 1);
        assert_eq!(report.deleted_blobs, 2);
        assert_eq!(fx.repo.count().await.unwrap(), 0);
        assert_eq!(fx.backend.get(&thumb.object_key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_thumbnail_reference_keeps_parent() {
        let fx = setup().await;
        let now = Utc::now();
        let old = now - Duration::hours(2);
        let parent = row("ast_parent", None, now);
        let thumb = row("ast_thumb", Some("ast_parent"), now);
        seed_ready(&fx, &parent, old).await;
        seed_ready(&fx, &thumb, old).await;

        let refs = Arc::new(MemoryRefs::default());
        refs.add(&thumb.public_url);
        let report = collector(&fx, ReferenceTracker::new().with(refs))
            .run(options(now, 100, 100))
            .await
            .unwrap();

        assert_eq!(report.deleted_assets, 0);
        assert_eq!(fx.repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_limits_bound_deletions() {
        let fx = setup().await;
        let now = Utc::now();
        for i in 0..5 {
            seed(&fx, &row(&format!("ast_p{}", i), None, now - Duration::minutes(1))).await;
            seed_ready(&fx, &row(&format!("ast_r{}", i), None, now), now - Duration::hours(1)).await;
        }

        let gc = collector(&fx, ReferenceTracker::new());
        let report = gc.run(options(now, 2, 3)).await.unwrap();
        assert_eq!(report.expired_pending_candidates, 2);
        assert_eq!(report.orphan_candidates, 3);
        assert_eq!(report.deleted_assets, 5);
        assert_eq!(fx.repo.count().await.unwrap(), 5);

        // Replaying continues where the last sweep stopped
        let report = gc.run(options(now, 2, 3)).await.unwrap();
        assert_eq!(report.deleted_assets, 4);
        let report = gc.run(options(now, 2, 3)).await.unwrap();
        assert_eq!(report.deleted_assets, 1);
        let report = gc.run(options(now, 2, 3)).await.unwrap();
        assert_eq!(report, GcReport::default());
    }

    #[tokio::test]
    async fn test_reference_added_during_sweep_is_honoured() {
        let fx = setup().await;
        let now = Utc::now();
        let asset = row("ast_racy", None, now);
        seed_ready(&fx, &asset, now - Duration::hours(2)).await;

        let late = Arc::new(LateReference {
            url: asset.public_url.clone(),
            ..Default::default()
        });
        let report = collector(&fx, ReferenceTracker::new().with(late))
            .run(options(now, 100, 100))
            .await
            .unwrap();

        assert_eq!(report.orphan_candidates, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted_assets, 0);
        assert!(fx.repo.find_by_id("ast_racy").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let fx = setup().await;
        let now = Utc::now();
        seed(&fx, &row("ast_old", None, now - Duration::minutes(1))).await;
        seed_ready(&fx, &row("ast_orphan", None, now), now - Duration::hours(1)).await;

        let mut opts = options(now, 100, 100);
        opts.dry_run = true;
        let report = collector(&fx, ReferenceTracker::new()).run(opts).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.expired_pending_candidates, 1);
        assert_eq!(report.orphan_candidates, 1);
        assert_eq!(report.deleted_assets, 0);
        assert_eq!(fx.repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_checker_failure_keeps_asset_and_counts_error() {
        struct Broken;

        #[async_trait]
        impl ReferenceChecker for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }

            async fn is_referenced(&self, _business_id: &str, _url: &str) -> StockroomResult<bool> {
                Err(crate::error::StockroomError::Internal("down".to_string()))
            }
        }

        let fx = setup().await;
        let now = Utc::now();
        seed_ready(&fx, &row("ast_r", None, now), now - Duration::hours(1)).await;

        let report = collector(&fx, ReferenceTracker::new().with(Arc::new(Broken)))
            .run(options(now, 100, 100))
            .await
            .unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.deleted_assets, 0);
        assert!(fx.repo.find_by_id("ast_r").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_limit_counts_thumbnails() {
        let fx = setup().await;
        let now = Utc::now();
        let expires = now - Duration::minutes(1);
        seed(&fx, &row("ast_parent", None, expires)).await;
        seed(&fx, &row("ast_thumb", Some("ast_parent"), expires)).await;

        let gc = collector(&fx, ReferenceTracker::new());
        let report = gc.run(options(now, 1, 100)).await.unwrap();
        assert_eq!(report.deleted_assets, 0);
        assert_eq!(report.deleted_thumbnails, 1);
        assert_eq!(fx.repo.count().await.unwrap(), 1);
        assert!(fx.repo.find_by_id("ast_parent").await.unwrap().is_some());

        let report = gc.run(options(now, 1, 100)).await.unwrap();
        assert_eq!(report.deleted_assets, 1);
        assert_eq!(report.deleted_thumbnails, 0);
        assert_eq!(fx.repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_orphan_limit_counts_thumbnails() {
        let fx = setup().await;
        let now = Utc::now();
        let old = now - Duration::hours(2);
        seed_ready(&fx, &row("ast_parent", None, now), old).await;
        seed_ready(&fx, &row("ast_thumb", Some("ast_parent"), now), old).await;
        seed_ready(&fx, &row("ast_solo", None, now), old).await;

        let gc = collector(&fx, ReferenceTracker::new());
        let report = gc.run(options(now, 100, 2)).await.unwrap();
        // Parent and thumbnail use the whole budget
        assert_eq!(report.deleted_assets, 1);
        assert_eq!(report.deleted_thumbnails, 1);
        assert!(fx.repo.find_by_id("ast_solo").await.unwrap().is_some());

        let report = gc.run(options(now, 100, 1)).await.unwrap();
        assert_eq!(report.deleted_assets, 1);
        assert_eq!(fx.repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blob_failures_reported() {
        let fx = setup_with(true).await;
        let now = Utc::now();
        let asset = row("ast_old", None, now - Duration::minutes(1));
        seed(&fx, &asset).await;

        let report = collector(&fx, ReferenceTracker::new())
            .run(options(now, 100, 100))
            .await
            .unwrap();

        // The row is gone even though its object stays behind
        assert_eq!(report.deleted_assets, 1);
        assert_eq!(report.deleted_blobs, 0);
        assert_eq!(report.blob_failures, 1);
        assert_eq!(report.errors, 0);
        assert!(fx.repo.find_by_id("ast_old").await.unwrap().is_none());
        assert!(fx.backend.get(&asset.object_key).await.unwrap().is_some());
        assert!(metrics::ASSET_BLOB_DELETE_FAILURES.get() >= 1);
    }

    #[test]
    fn test_orphan_min_age_bounds() {
        assert_eq!(orphan_min_age(0).unwrap(), Duration::zero());
        assert_eq!(orphan_min_age(1800).unwrap(), Duration::minutes(30));
        assert!(orphan_min_age(-1).is_err());

        let err = orphan_min_age(1_000_000_000_000_000).unwrap_err();
        assert_eq!(err.field(), Some("orphanMinAgeSecs"));
    }

    #[test]
    fn test_from_config_rejects_huge_min_age() {
        let mut config = ServerConfig::defaults(std::path::PathBuf::from("/tmp/stockroom"));
        config.gc.orphan_min_age_secs = u64::MAX;
        assert!(matches!(
            GcOptions::from_config(&config.gc, Utc::now()),
            Err(StockroomError::Config(_))
        ));

        config.gc.orphan_min_age_secs = 600;
        let options = GcOptions::from_config(&config.gc, Utc::now()).unwrap();
        assert_eq!(options.orphan_min_age, Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_unrepresentable_cutoff_fails_without_deleting() {
        let fx = setup().await;
        let now = Utc::now();
        seed(&fx, &row("ast_old", None, now - Duration::minutes(1))).await;

        let mut opts = options(now, 100, 100);
        opts.orphan_min_age = Duration::days(365 * 1_000_000);
        let result = collector(&fx, ReferenceTracker::new()).run(opts).await;

        assert!(matches!(result, Err(StockroomError::Validation(_))));
        assert_eq!(fx.repo.count().await.unwrap(), 1);
    }
}
