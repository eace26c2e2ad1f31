//! Renews S3 Object Lock retention before it lapses.
//!
//! A run reads the bucket's default retention rule, walks every object and
//! extends each lock that ends within `factor * period` of now to the full
//! default period. Every write is read back and must match exactly.
//!
//! ```ignore
//! let config = RetainConfig::from_env()?.with_overrides(ConfigOverrides::default())?;
//! let store = S3LockStore::new(&config.storage).await?;
//! let result = retention::run_renewal(&store, &config).await;
//! retention::report(&result);
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "cli")]
pub mod observability;
pub mod retention;
pub mod retry;
pub mod storage;

pub use config::RetainConfig;
pub use error::RetainError;
