use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    pub locator: LocatorConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Run at most one inference request at a time across the process.
    #[serde(default = "default_serialize_inference")]
    pub serialize_inference: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_samples_per_second")]
    pub samples_per_second: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocatorConfig {
    pub url: String,
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub channel_order: ChannelOrder,
}

/// Channel layout of the tensor handed to the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    #[default]
    Bgr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Where uploaded videos are staged. Defaults to the OS temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_image_formats")]
    pub image_formats: Vec<String>,
    #[serde(default = "default_video_formats")]
    pub video_formats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            serialize_inference: default_serialize_inference(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples_per_second: default_samples_per_second(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            temp_dir: None,
            image_formats: default_image_formats(),
            video_formats: default_video_formats(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl UploadConfig {
    /// Whether `filename`'s extension is one of the allowed image formats.
    /// Names without an extension are let through; the decoder sniffs them.
    pub fn accepts_image(&self, filename: &str) -> bool {
        extension_allowed(filename, &self.image_formats)
    }

    pub fn accepts_video(&self, filename: &str) -> bool {
        extension_allowed(filename, &self.video_formats)
    }
}

fn extension_allowed(filename: &str, allowed: &[String]) -> bool {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
        None => true,
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.sampling.samples_per_second;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sampling.samples_per_second must be positive, got {rate}"
            )));
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Invalid("upload.max_bytes must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_serialize_inference() -> bool {
    true
}
fn default_samples_per_second() -> f64 {
    0.5
}
fn default_min_face_size() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_bytes() -> usize {
    256 * 1024 * 1024
}
fn default_image_formats() -> Vec<String> {
    vec!["jpg".into(), "jpeg".into(), "png".into()]
}
fn default_video_formats() -> Vec<String> {
    vec!["mp4".into(), "mov".into(), "avi".into()]
}
fn default_log_level() -> String {
    "info".into()
}
