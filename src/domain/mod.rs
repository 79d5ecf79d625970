/// Domain modules that hold asset URLs
///
/// Only the slices the asset subsystem touches live here: tenant lookup and
/// the per-module reference checkers.

pub mod business;
pub mod inventory;

pub use business::{Business, BusinessLogoReferences, BusinessStore, UpdateBusinessRequest};
pub use inventory::{InventoryStore, Product, ProductPhotoReferences, Variant, VariantPhotoReferences};

use crate::assets::ReferenceTracker;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Tracker with every domain checker registered
pub fn reference_tracker(db: &SqlitePool) -> ReferenceTracker {
    ReferenceTracker::new()
        .with(Arc::new(BusinessLogoReferences::new(db.clone())))
        .with(Arc::new(ProductPhotoReferences::new(db.clone())))
        .with(Arc::new(VariantPhotoReferences::new(db.clone())))
}
