/// Stockroom - asset storage for the business backend
///
/// Issues upload descriptors, confirms completed uploads, serves ready assets
/// and reclaims the ones no business, product or variant references anymore.

pub mod api;
pub mod assets;
pub mod blob_store;
pub mod config;
pub mod context;
pub mod db;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{StockroomError, StockroomResult};
