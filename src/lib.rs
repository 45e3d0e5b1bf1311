pub mod checker;
pub mod config;
pub mod error;
pub mod feed;
pub mod loader;
pub mod normalize;
pub mod refresh;
pub mod store;
pub mod testing;

#[cfg(test)]
mod tests;

pub use checker::{CheckInfo, PhishChecker};
pub use config::Config;
pub use error::PhishError;
pub use loader::BulkLoader;
pub use refresh::RefreshCoordinator;
