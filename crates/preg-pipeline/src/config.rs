//! Pipeline configuration
//!
//! [`PipelineConfig`] can be built in code with the `with_*` methods or
//! loaded from TOML. Missing keys fall back to defaults.
//!
//! ```toml
//! max_concurrent_uploads = 8
//!
//! [ledger]
//! target_address = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM"
//! target_name = "parasite-registry"
//!
//! [retry]
//! max_attempts = 5
//! delay_ms = 500
//! backoff = "exponential"
//! ```

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Default registry contract address
pub const DEFAULT_TARGET_ADDRESS: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";

/// Default registry contract name
pub const DEFAULT_TARGET_NAME: &str = "parasite-registry";

const FALLBACK_UPLOAD_WORKERS: usize = 4;

/// Ledger contract the pipeline writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerTarget {
    pub target_address: String,
    pub target_name: String,
}

impl Default for LedgerTarget {
    fn default() -> Self {
        Self {
            target_address: DEFAULT_TARGET_ADDRESS.to_string(),
            target_name: DEFAULT_TARGET_NAME.to_string(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Contract to call
    pub ledger: LedgerTarget,
    /// Upper bound on attachment uploads in flight per submission
    pub max_concurrent_uploads: usize,
    /// Retry policy for ledger calls, uploads and fetches
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML
    ///
    /// # Errors
    /// Returns `PipelineError::Config` on syntax errors or invalid values.
    pub fn from_toml_str(input: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(input).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// With ledger target
    #[inline]
    #[must_use]
    pub fn with_target(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.ledger = LedgerTarget {
            target_address: address.into(),
            target_name: name.into(),
        };
        self
    }

    /// With upload concurrency bound
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_uploads(mut self, max: usize) -> Self {
        self.max_concurrent_uploads = max;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `PipelineError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrent_uploads == 0 {
            return Err(PipelineError::Config("max_concurrent_uploads must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.ledger.target_address.is_empty() || self.ledger.target_name.is_empty() {
            return Err(PipelineError::Config("ledger target must be non-empty".into()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerTarget::default(),
            max_concurrent_uploads: std::thread::available_parallelism()
                .map_or(FALLBACK_UPLOAD_WORKERS, NonZeroUsize::get),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    #[test]
    fn defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.ledger.target_name, "parasite-registry");
        assert!(config.max_concurrent_uploads >= 1);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_toml_partial() {
        let config = PipelineConfig::from_toml_str(
            r#"
            max_concurrent_uploads = 2

            [retry]
            max_attempts = 5
            backoff = "exponential"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_uploads, 2);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, Backoff::Exponential);
        assert_eq!(config.ledger.target_address, DEFAULT_TARGET_ADDRESS);
    }

    #[test]
    fn from_toml_rejects_zero_workers() {
        let err = PipelineConfig::from_toml_str("max_concurrent_uploads = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn from_toml_rejects_syntax_error() {
        assert!(PipelineConfig::from_toml_str("max_concurrent_uploads = ").is_err());
    }

    #[test]
    fn builder_methods() {
        let config = PipelineConfig::new()
            .with_target("SP000", "registry-v2")
            .with_max_concurrent_uploads(3)
            .with_retry(RetryPolicy::no_retry());
        assert_eq!(config.ledger.target_address, "SP000");
        assert_eq!(config.max_concurrent_uploads, 3);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
