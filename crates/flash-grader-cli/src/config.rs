//! Configuration file support for the flash-grader CLI
//!
//! Loads settings from a `_flash-grader.toml` configuration file.

use anyhow::{Context, Result};
use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up next to the input
pub const CONFIG_FILE_NAME: &str = "_flash-grader.toml";

/// Schema URL for the configuration file
pub const SCHEMA_URL: &str = "https://raw.githubusercontent.com/flash-grader/flash-grader/main/crates/flash-grader-cli/schema/flash-grader.schema.json";

/// Output format of a conversion
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CommonMark with GFM tables and strikethrough
    #[default]
    Md,
    /// HTML fragment
    Html,
    /// JSON array of slides, each an array of nodes
    Slides,
}

impl OutputFormat {
    /// File extension for output files, without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Md => "md",
            OutputFormat::Html => "html",
            OutputFormat::Slides => "slides.json",
        }
    }
}

/// Root configuration structure
#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Output configuration
    #[serde(skip_serializing_if = "OutputConfig::is_empty")]
    pub output: OutputConfig,
    /// Document parsing limits
    #[serde(skip_serializing_if = "DocumentConfig::is_empty")]
    pub document: DocumentConfig,
}

/// Output configuration
#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "md", "html" or "slides" (default: "md")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    /// Drop `<!-- Slide -->` marker lines from Markdown output (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_slide_markers: Option<bool>,
}

impl OutputConfig {
    fn is_empty(&self) -> bool {
        self.format.is_none() && self.strip_slide_markers.is_none()
    }
}

/// Document parsing limits
#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct DocumentConfig {
    /// Deepest node nesting accepted in a stored document (default: 50)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

impl DocumentConfig {
    fn is_empty(&self) -> bool {
        self.max_depth.is_none()
    }
}

impl Config {
    /// Load configuration from a specific file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Try to load configuration from a directory (looks for `_flash-grader.toml`)
    ///
    /// Returns `Ok(None)` if the config file doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            log::debug!("Using config file: {}", config_path.display());
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Generate JSON schema for the configuration
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }

    /// Generate JSON schema as a string
    pub fn json_schema_string() -> Result<String> {
        let schema = Self::json_schema();
        serde_json::to_string_pretty(&schema).context("Failed to serialize JSON schema")
    }

    /// Serialize configuration to TOML string with schema directive
    pub fn to_toml_with_schema(&self) -> Result<String> {
        let toml_content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        Ok(format!("#:schema {}\n\n{}", SCHEMA_URL, toml_content))
    }

    /// Sample configuration written by `--init-config`
    pub fn sample() -> Self {
        Config {
            output: OutputConfig {
                format: Some(OutputFormat::Md),
                strip_slide_markers: Some(false),
            },
            document: DocumentConfig {
                max_depth: Some(lesson_doc::DEFAULT_MAX_DEPTH),
            },
        }
    }
}
