//! Job configuration records

use crate::channel::{validate_channel_name, ChannelRef};
use crate::metrics::{MetricDefinition, MetricExtractor};
use crate::record::RecordFormat;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Maximum training job name length accepted by the service
pub const MAX_JOB_NAME_LEN: usize = 63;

/// How channel data reaches the training container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputMode {
    /// Records are streamed into a pipe as the job reads them
    #[default]
    Pipe,
    /// The whole channel is downloaded before training starts
    File,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe => f.write_str("Pipe"),
            Self::File => f.write_str("File"),
        }
    }
}

/// Compute shape of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Instance type, e.g. `ml.p3.2xlarge`
    pub instance_type: String,
    /// Number of instances
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    /// Attached storage per instance
    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u32,
}

const fn default_instance_count() -> u32 {
    1
}

const fn default_volume_size_gb() -> u32 {
    30
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            instance_type: "ml.c5.xlarge".to_string(),
            instance_count: default_instance_count(),
            volume_size_gb: default_volume_size_gb(),
        }
    }
}

/// One input channel of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Remote data location (`s3://bucket/prefix`)
    pub location: String,
    /// Record framing of the channel data
    #[serde(default)]
    pub format: RecordFormat,
    /// Per-channel override of the job input mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<InputMode>,
}

impl ChannelConfig {
    /// Channel at `location` with default framing and the job's input mode.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            format: RecordFormat::default(),
            input_mode: None,
        }
    }
}

/// Everything needed to submit one training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobConfig {
    /// Prefix for generated job names
    pub base_job_name: String,
    /// Script the training container runs
    pub entry_point: String,
    /// Framework version of the training container
    pub framework_version: String,
    /// Role credential the job runs under
    pub role: String,
    /// Default delivery mode for every channel
    #[serde(default)]
    pub input_mode: InputMode,
    /// Compute shape
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Channel name to channel config
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
    /// Log scraping patterns
    #[serde(default)]
    pub metric_definitions: Vec<MetricDefinition>,
    /// Values passed to the entry point
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, serde_json::Value>,
}

impl TrainingJobConfig {
    /// Minimal config; add channels and metrics before submitting.
    #[must_use]
    pub fn new(
        base_job_name: impl Into<String>,
        entry_point: impl Into<String>,
        framework_version: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            base_job_name: base_job_name.into(),
            entry_point: entry_point.into(),
            framework_version: framework_version.into(),
            role: role.into(),
            input_mode: InputMode::default(),
            resources: ResourceConfig::default(),
            channels: BTreeMap::new(),
            metric_definitions: Vec::new(),
            hyperparameters: BTreeMap::new(),
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or the config is invalid
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Add a channel.
    #[must_use]
    pub fn channel(mut self, name: impl Into<String>, channel: ChannelConfig) -> Self {
        self.channels.insert(name.into(), channel);
        self
    }

    /// Add a metric definition.
    #[must_use]
    pub fn metric(mut self, definition: MetricDefinition) -> Self {
        self.metric_definitions.push(definition);
        self
    }

    /// Set a hyperparameter.
    #[must_use]
    pub fn hyperparameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.hyperparameters.insert(key.into(), value.into());
        self
    }

    /// Set the default input mode.
    #[must_use]
    pub const fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    /// Set the compute shape.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceConfig) -> Self {
        self.resources = resources;
        self
    }

    /// Reference to a declared channel, for building a dataset.
    ///
    /// # Errors
    /// Returns `Error::Config` if the job does not declare `name`
    pub fn channel_ref(&self, name: &str) -> Result<ChannelRef> {
        let channel = self.channels.get(name).ok_or_else(|| {
            let declared: Vec<&str> = self.channels.keys().map(String::as_str).collect();
            Error::Config(format!(
                "channel '{name}' is not declared by the job (declared: {})",
                declared.join(", ")
            ))
        })?;
        ChannelRef::new(name, channel.format)
    }

    /// Delivery mode of a declared channel.
    #[must_use]
    pub fn channel_input_mode(&self, name: &str) -> Option<InputMode> {
        self.channels
            .get(name)
            .map(|c| c.input_mode.unwrap_or(self.input_mode))
    }

    /// Hyperparameters as the string map the container receives.
    ///
    /// String values pass through unquoted; everything else is JSON-encoded.
    #[must_use]
    pub fn hyperparameter_strings(&self) -> BTreeMap<String, String> {
        self.hyperparameters
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// Check everything the service would otherwise reject.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first problem found
    pub fn validate(&self) -> Result<()> {
        validate_base_job_name(&self.base_job_name)?;
        for (field, value) in [
            ("entry_point", &self.entry_point),
            ("framework_version", &self.framework_version),
            ("role", &self.role),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        if !self.resources.instance_type.starts_with("ml.") {
            return Err(Error::Config(format!(
                "instance type '{}' must start with 'ml.'",
                self.resources.instance_type
            )));
        }
        if self.resources.instance_count == 0 {
            return Err(Error::Config("instance_count must be at least 1".to_string()));
        }
        if self.channels.is_empty() {
            return Err(Error::Config("job declares no input channels".to_string()));
        }
        for (name, channel) in &self.channels {
            validate_channel_name(name)?;
            validate_location(name, &channel.location)?;
        }
        MetricExtractor::new(&self.metric_definitions)?;
        Ok(())
    }
}

fn validate_base_job_name(name: &str) -> Result<()> {
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::Config(format!(
            "base job name '{name}' must start with a letter or digit and contain only letters, digits and hyphens"
        )));
    }
    Ok(())
}

fn validate_location(channel: &str, location: &str) -> Result<()> {
    let bucket = location
        .strip_prefix("s3://")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or_default();
    if bucket.is_empty() {
        return Err(Error::Config(format!(
            "channel '{channel}' location '{location}' is not an s3://bucket/prefix URI"
        )));
    }
    Ok(())
}

/// Job name `"<base>-<YYYY-MM-DD-HH-MM-SS-mmm>"`, at most 63 characters.
#[must_use]
pub fn job_name(base: &str, now: DateTime<Utc>) -> String {
    crate::naming::timestamped(base, now, MAX_JOB_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
base_job_name = "pipe-mode"
entry_point = "train.py"
framework_version = "2.3"
role = "arn:aws:iam::111122223333:role/TrainingRole"
input_mode = "Pipe"

[resources]
instance_type = "ml.p3.2xlarge"

[channels.training]
location = "s3://example-bucket/pipe-mode/train"
format = "TFRecord"

[channels.eval]
location = "s3://example-bucket/pipe-mode/eval"
input_mode = "File"

[[metric_definitions]]
Name = "train:loss"
Regex = "loss: ([0-9\\.]+)"

[hyperparameters]
epochs = 10
optimizer = "adam"
"#;

    #[test]
    fn test_parse_toml() {
        let config = TrainingJobConfig::from_toml_str(TOML).unwrap();
        assert_eq!(config.input_mode, InputMode::Pipe);
        assert_eq!(config.resources.instance_count, 1);
        assert_eq!(config.resources.volume_size_gb, 30);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.metric_definitions[0].name, "train:loss");
        assert_eq!(config.channel_input_mode("training"), Some(InputMode::Pipe));
        assert_eq!(config.channel_input_mode("eval"), Some(InputMode::File));
        assert_eq!(config.channel_input_mode("test"), None);
    }

    #[test]
    fn test_hyperparameter_strings() {
        let config = TrainingJobConfig::from_toml_str(TOML).unwrap();
        let hp = config.hyperparameter_strings();
        assert_eq!(hp["epochs"], "10");
        assert_eq!(hp["optimizer"], "adam");
    }

    #[test]
    fn test_channel_ref_requires_declaration() {
        let config = TrainingJobConfig::from_toml_str(TOML).unwrap();
        assert_eq!(config.channel_ref("training").unwrap().name(), "training");
        let err = config.channel_ref("test").unwrap_err();
        assert!(err.to_string().contains("declared: eval, training"));
    }

    #[test]
    fn test_validate_rejects_missing_channels() {
        let config = TrainingJobConfig::new("pipe-mode", "train.py", "2.3", "role");
        assert!(config.validate().unwrap_err().to_string().contains("no input channels"));
    }

    #[test]
    fn test_validate_rejects_bad_location() {
        let config = TrainingJobConfig::new("pipe-mode", "train.py", "2.3", "role")
            .channel("training", ChannelConfig::new("/local/path"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_metric_regex() {
        let config = TrainingJobConfig::new("pipe-mode", "train.py", "2.3", "role")
            .channel("training", ChannelConfig::new("s3://bucket/train"))
            .metric(MetricDefinition::new("loss", "loss: (["));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_base_name() {
        let config = TrainingJobConfig::new("-pipe", "train.py", "2.3", "role")
            .channel("training", ChannelConfig::new("s3://bucket/train"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_name_fits_limit() {
        let name = job_name(&"a".repeat(80), Utc::now());
        assert!(name.len() <= MAX_JOB_NAME_LEN);
    }

    #[test]
    fn test_input_mode_wire_strings() {
        assert_eq!(serde_json::to_string(&InputMode::Pipe).unwrap(), "\"Pipe\"");
        assert_eq!(InputMode::File.to_string(), "File");
    }
}
