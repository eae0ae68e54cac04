//! Configuration types for the Scholar orchestrator.
//!
//! This module provides all configuration structures used to control
//! module generation: which models each step calls, the narration voice,
//! how the gateway is reached, and how many modules a plan may hold.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScholarError};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "scholar.json";

/// Default model for text and JSON generation.
fn default_text_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Default model for image generation.
fn default_image_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

/// Default model for background removal.
fn default_background_removal_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

/// Default model for speech synthesis.
fn default_speech_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

/// Default prebuilt voice for narration.
fn default_voice() -> String {
    "Kore".to_string()
}

/// Default Gemini REST endpoint.
fn default_endpoint() -> String {
    scholar_gateway::gemini::DEFAULT_ENDPOINT.to_string()
}

/// Default environment variable holding the API key.
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Default gateway request timeout in seconds.
const fn default_timeout_secs() -> u64 {
    120
}

/// Default upper bound on planned modules.
const fn default_max_modules() -> usize {
    3
}

/// Default number of finished runs the server keeps.
const fn default_max_retained_runs() -> usize {
    crate::runs::DEFAULT_RETAINED_RUNS
}

/// Default output directory for exported runs.
fn default_output_dir() -> String {
    "scholar-output".to_string()
}

/// Main configuration for Scholar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Models used by the generation steps.
    #[serde(default)]
    pub models: ModelConfig,

    /// How to reach the model gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Maximum number of modules kept from a plan.
    #[serde(default = "default_max_modules")]
    pub max_modules: usize,

    /// Mode used when a request does not name one.
    #[serde(default)]
    pub default_mode: GenerationMode,

    /// Output directory for exported runs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// How many finished runs the server keeps before dropping the oldest.
    /// Runs still in progress are never dropped.
    #[serde(default = "default_max_retained_runs")]
    pub max_retained_runs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelConfig::default(),
            gateway: GatewayConfig::default(),
            max_modules: default_max_modules(),
            default_mode: GenerationMode::default(),
            output_dir: default_output_dir(),
            max_retained_runs: default_max_retained_runs(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `scholar.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ScholarError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `scholar.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ScholarError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `ScholarError::ConfigValidationError` if the configuration values
    /// are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ScholarError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ScholarError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ScholarError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.max_modules == 0 {
            return Err(ScholarError::config_validation(
                "maxModules must be greater than 0",
                "Set maxModules to at least 1 in your scholar.json",
            ));
        }

        for (field, value) in [
            ("models.text", &self.models.text),
            ("models.image", &self.models.image),
            ("models.backgroundRemoval", &self.models.background_removal),
            ("models.speech", &self.models.speech),
            ("models.voice", &self.models.voice),
        ] {
            if value.trim().is_empty() {
                return Err(ScholarError::config_validation(
                    format!("{field} must not be empty"),
                    format!("Provide a value for {field} in your scholar.json or remove it to use the default"),
                ));
            }
        }

        if self.gateway.timeout_secs == 0 {
            return Err(ScholarError::config_validation(
                "gateway.timeoutSecs must be greater than 0",
                "Set gateway.timeoutSecs to at least 1 second in your scholar.json",
            ));
        }

        if self.gateway.api_key_env.trim().is_empty() {
            return Err(ScholarError::config_validation(
                "gateway.apiKeyEnv must not be empty",
                "Name the environment variable holding your API key (default GEMINI_API_KEY)",
            ));
        }

        if !self.gateway.endpoint.starts_with("http://")
            && !self.gateway.endpoint.starts_with("https://")
        {
            return Err(ScholarError::config_validation(
                format!("gateway.endpoint '{}' is not an HTTP URL", self.gateway.endpoint),
                "Use a full URL such as https://generativelanguage.googleapis.com/v1beta",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(ScholarError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your scholar.json (use '.' for current directory)",
            ));
        }

        if self.max_retained_runs == 0 {
            return Err(ScholarError::config_validation(
                "maxRetainedRuns must be greater than 0",
                "Set maxRetainedRuns to at least 1 in your scholar.json",
            ));
        }

        Ok(())
    }
}

/// Models used by each generation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Model for plan, idea, content and script generation.
    #[serde(default = "default_text_model")]
    pub text: String,

    /// Model for image generation.
    #[serde(default = "default_image_model")]
    pub image: String,

    /// Model for background removal.
    #[serde(default = "default_background_removal_model")]
    pub background_removal: String,

    /// Model for speech synthesis.
    #[serde(default = "default_speech_model")]
    pub speech: String,

    /// Prebuilt voice used for narration.
    #[serde(default = "default_voice")]
    pub voice: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text: default_text_model(),
            image: default_image_model(),
            background_removal: default_background_removal_model(),
            speech: default_speech_model(),
            voice: default_voice(),
        }
    }
}

/// Model gateway connection settings.
///
/// The API key itself is never stored here, only the name of the
/// environment variable it is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Base URL of the Gemini REST API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Whether a run plans several modules or treats the topic as one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationMode {
    /// The topic itself is the only module; no plan step.
    Single,
    /// The topic is broken into planned modules (default).
    #[default]
    Multi,
}

impl GenerationMode {
    /// Parses a string into a `GenerationMode`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "single" => Some(Self::Single),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s)
            .ok_or_else(|| format!("invalid mode '{s}': expected one of 'single', 'multi'"))
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

impl<'de> Deserialize<'de> for GenerationMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for GenerationMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
