/// Reference tracking across domain modules
///
/// There is no central reference table. Each module that can hold asset URLs
/// registers a checker, and the tracker asks all of them.
use crate::error::StockroomResult;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;

/// Answers whether one domain module points at a URL
#[async_trait]
pub trait ReferenceChecker: Send + Sync {
    /// Short name for logs, e.g. `business.logo_url`
    fn name(&self) -> &'static str;

    /// Whether any entity of `business_id` references `url`
    async fn is_referenced(&self, business_id: &str, url: &str) -> StockroomResult<bool>;

    /// Whether any of `urls` is referenced
    async fn references_any(&self, business_id: &str, urls: &[String]) -> StockroomResult<bool> {
        for url in urls {
            if self.is_referenced(business_id, url).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Registry of reference checkers
#[derive(Clone, Default)]
pub struct ReferenceTracker {
    checkers: Vec<Arc<dyn ReferenceChecker>>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, checker: Arc<dyn ReferenceChecker>) {
        tracing::debug!(checker = checker.name(), "Registered asset reference checker");
        self.checkers.push(checker);
    }

    pub fn with(mut self, checker: Arc<dyn ReferenceChecker>) -> Self {
        self.register(checker);
        self
    }

    /// Checkers that currently reference any of `urls`
    ///
    /// A failing checker fails the whole query; callers treat that as "unknown"
    /// and keep the asset.
    pub async fn referencing(
        &self,
        business_id: &str,
        urls: &[String],
    ) -> StockroomResult<Vec<&'static str>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let results = try_join_all(self.checkers.iter().map(|checker| async move {
            let hit = checker.references_any(business_id, urls).await?;
            StockroomResult::Ok(hit.then(|| checker.name()))
        }))
        .await?;

        Ok(results.into_iter().flatten().collect())
    }

    /// Whether any registered module references any of `urls`
    pub async fn is_referenced(&self, business_id: &str, urls: &[String]) -> StockroomResult<bool> {
        Ok(!self.referencing(business_id, urls).await?.is_empty())
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}
