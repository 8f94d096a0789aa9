//! Loader for `ally.yaml` with environment overlays.
//!
//! Sources are merged in the order they are added, with `ALLY__`-prefixed
//! environment variables applied first and therefore overridden by files
//! (`ALLY__BROWSER__HEADLESS=true` maps to `browser.headless`). After merging,
//! every string value is run through `${VAR}` expansion so secrets can stay in
//! the environment:
//!
//! ```yaml
//! browser:
//!   engine: firefox
//!   start_url: "https://www.google.com"
//! model:
//!   provider: anthropic
//!   model: claude-3-5-sonnet-20241022
//!   auth_token: "${ANTHROPIC_API_KEY}"
//! agent:
//!   only_n_most_recent_images: 5
//! streaming:
//!   fps: 5
//! ```
use ally_common::observability::{LogConfig, LogFormat};
use ally_common::FRAME_RATE_RANGE;
pub use ally_common::{BrowserEngine, Viewport, WaitUntil};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct AllyConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub engine: BrowserEngine,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default = "default_start_url")]
    pub start_url: String,
    /// Draw a cursor sprite onto screenshots.
    #[serde(default = "default_true")]
    pub use_cursor: bool,
    /// Extra readiness condition awaited before every screenshot.
    #[serde(default)]
    pub screenshot_wait_until: Option<WaitUntil>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            engine: BrowserEngine::default(),
            headless: false,
            viewport: Viewport::default(),
            start_url: default_start_url(),
            use_cursor: true,
            screenshot_wait_until: None,
        }
    }
}

/// The tag is `provider`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ModelConfig {
    Anthropic {
        model: String,
        auth_token: String,
        #[serde(default = "default_anthropic_endpoint")]
        endpoint: String,
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
        #[serde(default = "default_computer_use_beta")]
        computer_use_beta: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Screenshots kept in the conversation; `null` or 0 keeps all of them.
    #[serde(default = "default_image_retention")]
    pub only_n_most_recent_images: Option<usize>,
    /// Images are pruned in batches of this size. Defaults to the retention count.
    #[serde(default)]
    pub min_removal_chunk: Option<usize>,
    #[serde(default)]
    pub max_turns: Option<usize>,
    #[serde(default)]
    pub prompt_caching: bool,
    /// Replaces the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            only_n_most_recent_images: default_image_retention(),
            min_removal_chunk: None,
            max_turns: None,
            prompt_caching: false,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_true")]
    pub start_on_launch: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            start_on_launch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub emit_stderr: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: false,
            dir: None,
            filter: default_log_filter(),
        }
    }
}

impl LoggingConfig {
    /// Settings for [`ally_common::observability::init_logging`].
    pub fn log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            log_dir: self.dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_start_url() -> String {
    "https://www.google.com".into()
}
fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com/v1/".into()
}
fn default_computer_use_beta() -> String {
    "computer-use-2025-01-24".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_image_retention() -> Option<usize> {
    Some(5)
}
fn default_fps() -> u32 {
    5
}
fn default_log_filter() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

fn validate(cfg: &AllyConfig) -> Result<(), ConfigError> {
    if !FRAME_RATE_RANGE.contains(&cfg.streaming.fps) {
        return Err(ConfigError::Message(format!(
            "streaming.fps must be between 1 and 30, got {}",
            cfg.streaming.fps
        )));
    }
    let vp = cfg.browser.viewport;
    if vp.width == 0 || vp.height == 0 {
        return Err(ConfigError::Message(format!(
            "browser.viewport must be non-empty, got {}x{}",
            vp.width, vp.height
        )));
    }
    Ok(())
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct AllyConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for AllyConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AllyConfigLoader {
    /// Start with `ALLY__` env overrides only.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(
            Environment::with_prefix("ALLY")
                .separator("__")
                .try_parsing(true),
        );
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`Self::with_file`] but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use ally_config::{AllyConfigLoader, BrowserEngine, ModelConfig};
    ///
    /// let cfg = AllyConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// browser:
    ///   engine: firefox
    /// model:
    ///   provider: anthropic
    ///   model: "claude-3-5-sonnet-20241022"
    ///   auth_token: "example"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.browser.engine, BrowserEngine::Firefox);
    /// assert_eq!(cfg.agent.only_n_most_recent_images, Some(5));
    /// assert!(matches!(cfg.model, ModelConfig::Anthropic { max_tokens: 4096, .. }));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders and deserialize.
    pub fn load(self) -> Result<AllyConfig, ConfigError> {
        let cfg = self.builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: AllyConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("HOST", Some("example.org")), ("PORT", Some("8080"))], || {
            let mut v = json!([
                "https://$HOST",
                { "url": "http://${HOST}:${PORT}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!([
                    "https://example.org",
                    { "url": "http://example.org:8080" },
                    42,
                    true,
                    null
                ])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn logging_section_maps_to_log_config() {
        let logging = LoggingConfig {
            format: LogFormat::Json,
            emit_stderr: true,
            dir: Some(PathBuf::from("/tmp/ally")),
            filter: "debug".into(),
        };
        let lc = logging.log_config("ally");
        assert_eq!(lc.app_name, "ally");
        assert_eq!(lc.format, LogFormat::Json);
        assert!(lc.emit_stderr);
        assert_eq!(lc.default_filter, "debug");
        assert_eq!(lc.log_dir.as_deref(), Some(Path::new("/tmp/ally")));
    }
}
