//! Renewal run configuration.
//!
//! # Example
//!
//! ```toml
//! [renewal]
//! factor = 0.5
//! page_size = 1000
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

/// Largest page the S3 listing API returns.
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Controls when a lock counts as expiring and how the bucket is walked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewalConfig {
    /// Fraction of the bucket's default retention period used to compute
    /// the renewal threshold. Objects whose lock ends before
    /// `now + factor * period` are renewed.
    /// Default: 0.5
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Keys requested per listing page.
    /// Default: 1000
    #[serde(default = "default_page_size")]
    pub page_size: i32,

    /// If true, log which objects would be renewed without writing.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            page_size: default_page_size(),
            dry_run: false,
        }
    }
}

impl RenewalConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.factor.is_finite() || !(0.0..=1.0).contains(&self.factor) {
            return Err(format!(
                "renewal factor must be between 0 and 1, got {}",
                self.factor
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(format!(
                "renewal page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            ));
        }
        Ok(())
    }
}

pub(crate) fn default_factor() -> f64 {
    0.5
}

fn default_page_size() -> i32 {
    MAX_PAGE_SIZE
}
