//! Session configuration
//!
//! Where jobs run and which defaults apply when a job config leaves them out.
//! Loaded from TOML, then overridden by `PIPEMODE_REGION`, `PIPEMODE_ROLE`
//! and `PIPEMODE_BUCKET` when those are set.
//!
//! ```toml
//! region = "eu-west-1"
//! role = "arn:aws:iam::111122223333:role/training"
//! log_filter = "pipemode=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Region override
pub const ENV_REGION: &str = "PIPEMODE_REGION";
/// Execution role override
pub const ENV_ROLE: &str = "PIPEMODE_ROLE";
/// Default bucket override
pub const ENV_BUCKET: &str = "PIPEMODE_BUCKET";

/// Session-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Service region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Execution role used when a job config does not name one.
    #[serde(default)]
    pub role: Option<String>,

    /// Bucket for job outputs (see [`SessionConfig::bucket`]).
    #[serde(default)]
    pub default_bucket: Option<String>,

    /// `tracing` filter directive for [`crate::init_tracing`].
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_log_filter() -> String {
    "pipemode=info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            role: None,
            default_bucket: None,
            log_filter: default_log_filter(),
        }
    }
}

impl SessionConfig {
    /// Parse from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    /// `Error::Toml` on a syntax error, `Error::Config` if validation fails.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, or defaults when `path` is `None`, then apply the
    /// environment overrides.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a lookup such as `std::env::var`. Empty values
    /// are ignored.
    ///
    /// # Errors
    /// `Error::Config` if the overridden config is invalid.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(region) = lookup(ENV_REGION) {
            self.region = region;
        }
        if let Some(role) = lookup(ENV_ROLE) {
            self.role = Some(role);
        }
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.default_bucket = Some(bucket);
        }
        self.validate()?;
        Ok(self)
    }

    /// Output bucket: the configured one, else `pipemode-<region>`.
    #[must_use]
    pub fn bucket(&self) -> String {
        self.default_bucket
            .clone()
            .unwrap_or_else(|| format!("pipemode-{}", self.region))
    }

    /// `s3://<bucket>/<prefix>` under the session bucket.
    #[must_use]
    pub fn output_location(&self, prefix: &str) -> String {
        format!("s3://{}/{}", self.bucket(), prefix.trim_matches('/'))
    }

    /// Check the region looks like `xx-name-N`.
    ///
    /// # Errors
    /// `Error::Config` on an empty or malformed region.
    pub fn validate(&self) -> Result<()> {
        let region = self.region.as_str();
        if region.is_empty()
            || !region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::Config(format!(
                "region '{region}' must be lowercase letters, digits and hyphens"
            )));
        }
        if let Some(bucket) = &self.default_bucket {
            if bucket.is_empty() || bucket.contains('/') {
                return Err(Error::Config(format!(
                    "default_bucket '{bucket}' must be a bare bucket name"
                )));
            }
        }
        Ok(())
    }
}
