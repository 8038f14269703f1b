use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::RetryPolicy;

pub const DEFAULT_SEARCH_URL: &str = "https://api.rainforestapi.com";
pub const DEFAULT_VISION_URL: &str = "https://api.openai.com";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com";
pub const PROJECT_CONFIG_FILE: &str = "labelscout.toml";

pub const ENV_SEARCH_KEY: &str = "RAINFOREST_API_KEY";
pub const ENV_VISION_KEY: &str = "OPENAI_API_KEY";
pub const ENV_DRIVE_TOKEN: &str = "GOOGLE_DRIVE_ACCESS_TOKEN";
pub const ENV_DRIVE_FOLDER: &str = "GOOGLE_DRIVE_FOLDER_ID";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

impl Config {
    pub fn project_path() -> PathBuf {
        PathBuf::from(PROJECT_CONFIG_FILE)
    }

    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("labelscout").join("config.toml"))
    }

    /// The file `load` reads: the project file wins over the global one.
    pub fn locate() -> Option<PathBuf> {
        let project = Self::project_path();
        if project.exists() {
            return Some(project);
        }
        Self::global_path().filter(|p| p.exists())
    }

    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn init_global() -> Result<PathBuf, ConfigError> {
        let path = Self::global_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        Self::default().save_to(&path)?;
        Ok(path)
    }

    pub fn init_project() -> Result<PathBuf, ConfigError> {
        let path = Self::project_path();
        Self::default().save_to(&path)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub base_url: String,

    #[serde(default = "default_amazon_domain")]
    pub amazon_domain: String,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

fn default_amazon_domain() -> String {
    "amazon.com".to_string()
}

fn default_max_pages() -> u32 {
    2
}

fn default_search_timeout() -> u64 {
    60
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            amazon_domain: default_amazon_domain(),
            max_pages: default_max_pages(),
            timeout_secs: default_search_timeout(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_url")]
    pub base_url: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Overrides the built-in extraction prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_max_panel_images")]
    pub max_panel_images: usize,

    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_vision_url() -> String {
    DEFAULT_VISION_URL.to_string()
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_max_panel_images() -> usize {
    4
}

fn default_vision_timeout() -> u64 {
    90
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_vision_url(),
            model: default_vision_model(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            max_panel_images: default_max_panel_images(),
            timeout_secs: default_vision_timeout(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_item_limit")]
    pub item_limit: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_limit: Option<usize>,

    #[serde(default = "default_keywords_file")]
    pub keywords_file: PathBuf,

    /// Zero-based column holding the keyword when the list is a CSV file
    #[serde(default = "default_keyword_column")]
    pub keyword_column: usize,

    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_item_limit() -> usize {
    10
}

fn default_keywords_file() -> PathBuf {
    PathBuf::from("keywords.csv")
}

fn default_keyword_column() -> usize {
    1
}

fn default_item_delay() -> u64 {
    1000
}

fn default_call_timeout() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            item_limit: default_item_limit(),
            keyword_limit: None,
            keywords_file: default_keywords_file(),
            keyword_column: default_keyword_column(),
            item_delay_ms: default_item_delay(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output/supplement_facts.csv")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("output/checkpoint.sqlite")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

/// Where the output file is published after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    None,
    Local,
    Drive,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::None => write!(f, "none"),
            SinkKind::Local => write!(f, "local"),
            SinkKind::Drive => write!(f, "drive"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub sink: SinkKind,

    /// Target directory for the `local` sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Shared folder for the `drive` sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// Remote file name; defaults to the local file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,

    /// Publish even when the run wrote no new rows
    #[serde(default)]
    pub publish_always: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_drive_api_url")]
    pub drive_api_base: String,

    #[serde(default = "default_drive_upload_url")]
    pub drive_upload_base: String,
}

fn default_drive_api_url() -> String {
    DEFAULT_DRIVE_API_URL.to_string()
}

fn default_drive_upload_url() -> String {
    DEFAULT_DRIVE_UPLOAD_URL.to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::None,
            dir: None,
            folder_id: None,
            remote_name: None,
            publish_always: false,
            access_token: None,
            drive_api_base: default_drive_api_url(),
            drive_upload_base: default_drive_upload_url(),
        }
    }
}

impl PublishConfig {
    /// Fill the Drive token and folder from the environment when unset.
    #[must_use]
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if self.access_token.is_none() {
            self.access_token = non_empty(env(ENV_DRIVE_TOKEN));
        }
        if self.folder_id.is_none() {
            self.folder_id = non_empty(env(ENV_DRIVE_FOLDER));
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sink {
            SinkKind::None => Ok(()),
            SinkKind::Local if self.dir.is_none() => Err(ConfigError::ValidationError(
                "publish.dir is required for the local sink".to_string(),
            )),
            SinkKind::Local => Ok(()),
            SinkKind::Drive => {
                if self.folder_id.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingKey("drive folder id"));
                }
                if self.access_token.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingKey(ENV_DRIVE_TOKEN));
                }
                Ok(())
            }
        }
    }
}

/// Per-invocation overrides, usually from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub item_limit: Option<usize>,
    pub keyword_limit: Option<usize>,
    pub keywords_file: Option<PathBuf>,
    pub max_pages: Option<u32>,
    pub output_path: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
    pub search_api_key: Option<String>,
    pub vision_api_key: Option<String>,
    pub no_publish: bool,
    pub refresh_search: bool,
}

/// Immutable parameters of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub search_api_key: String,
    pub vision_api_key: String,
    pub search: SearchConfig,
    pub vision: VisionConfig,
    pub item_limit: usize,
    pub keyword_limit: Option<usize>,
    pub keywords_file: PathBuf,
    pub keyword_column: usize,
    pub max_pages: u32,
    pub max_panel_images: usize,
    pub item_delay: Duration,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub output_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub publish: PublishConfig,
    pub refresh_search: bool,
}

impl RunConfiguration {
    /// Defaults for everything but the two API keys.
    pub fn new(search_api_key: impl Into<String>, vision_api_key: impl Into<String>) -> Self {
        let config = Config::default();
        Self {
            search_api_key: search_api_key.into(),
            vision_api_key: vision_api_key.into(),
            max_pages: config.search.max_pages,
            max_panel_images: config.vision.max_panel_images,
            item_limit: config.pipeline.item_limit,
            keyword_limit: config.pipeline.keyword_limit,
            keywords_file: config.pipeline.keywords_file,
            keyword_column: config.pipeline.keyword_column,
            item_delay: Duration::from_millis(config.pipeline.item_delay_ms),
            call_timeout: Duration::from_secs(config.pipeline.call_timeout_secs),
            retry: config.retry.policy(),
            output_path: config.output.path,
            checkpoint_path: config.output.checkpoint_path,
            publish: config.publish,
            search: config.search,
            vision: config.vision,
            refresh_search: false,
        }
    }

    /// Merge file config, overrides and environment, then validate.
    ///
    /// Precedence for secrets: override flag, then environment, then file.
    pub fn resolve<F>(config: &Config, overrides: RunOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let search_api_key = non_empty(overrides.search_api_key)
            .or_else(|| non_empty(env(ENV_SEARCH_KEY)))
            .or_else(|| non_empty(config.search.api_key.clone()))
            .ok_or(ConfigError::MissingKey(ENV_SEARCH_KEY))?;

        let vision_api_key = non_empty(overrides.vision_api_key)
            .or_else(|| non_empty(env(ENV_VISION_KEY)))
            .or_else(|| non_empty(config.vision.api_key.clone()))
            .ok_or(ConfigError::MissingKey(ENV_VISION_KEY))?;

        let mut publish = config.publish.clone().with_env(&env);
        if overrides.no_publish {
            publish.sink = SinkKind::None;
        }

        let resolved = Self {
            search_api_key,
            vision_api_key,
            search: config.search.clone(),
            vision: config.vision.clone(),
            item_limit: overrides.item_limit.unwrap_or(config.pipeline.item_limit),
            keyword_limit: overrides.keyword_limit.or(config.pipeline.keyword_limit),
            keywords_file: overrides
                .keywords_file
                .unwrap_or_else(|| config.pipeline.keywords_file.clone()),
            keyword_column: config.pipeline.keyword_column,
            max_pages: overrides.max_pages.unwrap_or(config.search.max_pages),
            max_panel_images: config.vision.max_panel_images,
            item_delay: Duration::from_millis(config.pipeline.item_delay_ms),
            call_timeout: Duration::from_secs(config.pipeline.call_timeout_secs),
            retry: config.retry.policy(),
            output_path: overrides
                .output_path
                .unwrap_or_else(|| config.output.path.clone()),
            checkpoint_path: overrides
                .checkpoint_path
                .unwrap_or_else(|| config.output.checkpoint_path.clone()),
            publish,
            refresh_search: overrides.refresh_search,
        };

        resolved.validate()?;
        Ok(resolved)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.item_limit == 0 {
            return Err(ConfigError::ValidationError(
                "item limit must be at least 1".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::ValidationError(
                "max pages must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "retry.multiplier must be a finite number of at least 1, got {}",
                self.retry.multiplier
            )));
        }
        if self.max_panel_images == 0 {
            return Err(ConfigError::ValidationError(
                "vision.max_panel_images must be at least 1".to_string(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "pipeline.call_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.publish.validate()
    }
}
