/// Asset storage lifecycle
///
/// Upload descriptors create pending rows, completion makes them ready, and
/// ready assets live for as long as some domain entity references their URL.
/// Garbage collection and explicit deletes reclaim the rest.

pub mod cdn;
pub mod completion;
pub mod gc;
pub mod models;
pub mod policy;
pub mod references;
pub mod removal;
pub mod repository;
pub mod service;
pub mod uploads;

pub use cdn::AssetUrls;
pub use completion::CompletionHandler;
pub use gc::{orphan_min_age, GarbageCollector, GcOptions, GcReport};
pub use models::*;
pub use policy::FileTypePolicy;
pub use references::{ReferenceChecker, ReferenceTracker};
pub use removal::AssetRemoval;
pub use repository::AssetRepository;
pub use service::{AssetService, PublicObject};
pub use uploads::UploadDescriptorGenerator;
