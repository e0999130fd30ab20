//! Explorer configuration: `config.toml`, then environment, then CLI flags.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::snapshot::SnapshotConfig;
use crate::error::SetupError;

/// Which vision-language backend answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Qwen,
    Gemini,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Qwen => "qwen",
            Provider::Gemini => "gemini",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "qwen" => Ok(Provider::Qwen),
            "gemini" => Ok(Provider::Gemini),
            other => Err(anyhow!("unknown model provider `{other}` (expected openai, qwen, gemini)")),
        }
    }
}

/// Explorer configuration (TOML).
///
/// Missing fields default to the values a first run needs; credentials are
/// expected from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ExplorerConfig {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    pub temperature: f64,
    pub max_tokens: u32,
    /// HTTP timeout for a single model call.
    pub request_timeout_secs: u64,
    pub openai: EndpointConfig,
    pub qwen: EndpointConfig,
    pub gemini: EndpointConfig,
}

/// Credentials and location of one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EndpointConfig {
    pub api_base: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Pause after every executed action and failed round.
    pub request_interval_secs: u64,
    /// Round budget in TASK mode.
    pub max_rounds: u32,
    /// Round budget in EXPLORE mode.
    pub max_explore_rounds: u32,
    /// Minimum Manhattan distance between element centers.
    pub min_dist: i32,
    /// Disambiguate uids with the node `index` attribute.
    pub add_index: bool,
    /// Append refined documentation instead of replacing it.
    pub doc_refine: bool,
    pub dark_mode: bool,
    pub app_load_delay_secs: u64,
    /// Target grid cell edge in pixels.
    pub grid_cell_px: i32,
    pub long_press_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub adb_path: String,
    /// Device serial; required when more than one device is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// On-device staging directory for screenshots.
    pub screenshot_dir: String,
    /// On-device staging directory for hierarchy dumps.
    pub xml_dir: String,
    pub command_timeout_secs: u64,
    /// Truncate captured adb stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            temperature: 0.0,
            max_tokens: 1024,
            request_timeout_secs: 120,
            openai: EndpointConfig {
                api_base: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-4o".to_string(),
                api_key: None,
            },
            qwen: EndpointConfig {
                api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
                    .to_string(),
                model: "qwen-vl-max".to_string(),
                api_key: None,
            },
            gemini: EndpointConfig {
                api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-1.5-pro-latest".to_string(),
                api_key: None,
            },
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            request_interval_secs: 3,
            max_rounds: 20,
            max_explore_rounds: 50,
            min_dist: 30,
            add_index: false,
            doc_refine: false,
            dark_mode: false,
            app_load_delay_secs: 5,
            grid_cell_px: 120,
            long_press_ms: 1000,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            serial: None,
            screenshot_dir: "/sdcard/".to_string(),
            xml_dir: "/sdcard/".to_string(),
            command_timeout_secs: 30,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl ModelConfig {
    pub fn endpoint(&self) -> &EndpointConfig {
        match self.provider {
            Provider::OpenAi => &self.openai,
            Provider::Qwen => &self.qwen,
            Provider::Gemini => &self.gemini,
        }
    }

    fn endpoint_mut(&mut self) -> &mut EndpointConfig {
        match self.provider {
            Provider::OpenAi => &mut self.openai,
            Provider::Qwen => &mut self.qwen,
            Provider::Gemini => &mut self.gemini,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AgentConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }

    pub fn app_load_delay(&self) -> Duration {
        Duration::from_secs(self.app_load_delay_secs)
    }

    pub fn snapshot(&self) -> SnapshotConfig {
        SnapshotConfig {
            min_dist: self.min_dist,
            add_index: self.add_index,
        }
    }
}

impl DeviceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Flags given on the command line; `None` leaves the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub provider: Option<Provider>,
    pub api_key: Option<String>,
    pub serial: Option<String>,
}

impl ExplorerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(anyhow!("model.temperature must be within 0.0..=2.0"));
        }
        if self.model.max_tokens == 0 {
            return Err(anyhow!("model.max_tokens must be > 0"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        let endpoint = self.model.endpoint();
        if endpoint.api_base.trim().is_empty() || endpoint.model.trim().is_empty() {
            return Err(anyhow!(
                "model.{} needs a non-empty api_base and model",
                self.model.provider.as_str()
            ));
        }
        if self.agent.max_rounds == 0 || self.agent.max_explore_rounds == 0 {
            return Err(anyhow!("agent.max_rounds and agent.max_explore_rounds must be > 0"));
        }
        if self.agent.min_dist < 0 {
            return Err(anyhow!("agent.min_dist must be >= 0"));
        }
        if self.agent.grid_cell_px <= 0 {
            return Err(anyhow!("agent.grid_cell_px must be > 0"));
        }
        if self.device.adb_path.trim().is_empty() {
            return Err(anyhow!("device.adb_path must be non-empty"));
        }
        if self.device.command_timeout_secs == 0 {
            return Err(anyhow!("device.command_timeout_secs must be > 0"));
        }
        if self.device.output_limit_bytes == 0 {
            return Err(anyhow!("device.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Override fields from environment variables, using `lookup` to read them.
    ///
    /// Keys follow the historical upper-case names (`MODEL`, `OPENAI_API_KEY`,
    /// `MAX_ROUNDS`, ...). Unparseable values are errors, not silently ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = get("MODEL") {
            self.model.provider = raw.parse()?;
        }
        set_string(&get, "OPENAI_API_KEY", |v| self.model.openai.api_key = Some(v));
        set_string(&get, "OPENAI_API_BASE", |v| self.model.openai.api_base = v);
        set_string(&get, "OPENAI_API_MODEL", |v| self.model.openai.model = v);
        set_string(&get, "DASHSCOPE_API_KEY", |v| self.model.qwen.api_key = Some(v));
        set_string(&get, "QWEN_MODEL", |v| self.model.qwen.model = v);
        set_string(&get, "GEMINI_API_KEY", |v| self.model.gemini.api_key = Some(v));
        set_string(&get, "GEMINI_MODEL_NAME", |v| self.model.gemini.model = v);
        set_string(&get, "ANDROID_SCREENSHOT_DIR", |v| self.device.screenshot_dir = v);
        set_string(&get, "ANDROID_XML_DIR", |v| self.device.xml_dir = v);

        set_parsed(&get, "TEMPERATURE", &mut self.model.temperature)?;
        set_parsed(&get, "MAX_TOKENS", &mut self.model.max_tokens)?;
        set_parsed(&get, "REQUEST_INTERVAL", &mut self.agent.request_interval_secs)?;
        set_parsed(&get, "MAX_ROUNDS", &mut self.agent.max_rounds)?;
        set_parsed(&get, "MAX_EXPLORE_ROUNDS", &mut self.agent.max_explore_rounds)?;
        set_parsed(&get, "MIN_DIST", &mut self.agent.min_dist)?;
        set_parsed(&get, "APP_LOAD_DELAY_SECONDS", &mut self.agent.app_load_delay_secs)?;
        set_bool(&get, "DOC_REFINE", &mut self.agent.doc_refine);
        set_bool(&get, "DARK_MODE", &mut self.agent.dark_mode);
        Ok(())
    }

    /// Apply command-line flags, which win over file and environment.
    pub fn apply_cli(&mut self, overrides: &CliOverrides) {
        if let Some(provider) = overrides.provider {
            self.model.provider = provider;
        }
        if let Some(key) = &overrides.api_key {
            self.model.endpoint_mut().api_key = Some(key.clone());
        }
        if let Some(serial) = &overrides.serial {
            self.device.serial = Some(serial.clone());
        }
    }

    /// API key for the selected provider, or a setup error naming what is missing.
    pub fn api_key(&self) -> Result<&str, SetupError> {
        self.model
            .endpoint()
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(SetupError::MissingCredential {
                provider: self.model.provider.as_str(),
            })
    }
}

fn set_string<G, S>(get: &G, key: &str, mut set: S)
where
    G: Fn(&str) -> Option<String>,
    S: FnMut(String),
{
    if let Some(value) = get(key) {
        set(value.trim().to_string());
    }
}

fn set_parsed<G, T>(get: &G, key: &str, slot: &mut T) -> Result<()>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = get(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {key}={raw:?}: {err}"))?;
    }
    Ok(())
}

fn set_bool<G>(get: &G, key: &str, slot: &mut bool)
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = raw.trim().eq_ignore_ascii_case("true");
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ExplorerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ExplorerConfig> {
    if !path.exists() {
        return Ok(ExplorerConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExplorerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Resolve the effective config: file, then environment, then CLI, then validate.
pub fn resolve_config<F>(path: &Path, lookup: F, overrides: &CliOverrides) -> Result<ExplorerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = load_config(path)?;
    cfg.apply_env(lookup).context("apply environment overrides")?;
    cfg.apply_cli(overrides);
    cfg.validate()?;
    Ok(cfg)
}
