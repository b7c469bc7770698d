//! Monitor configuration.
//!
//! Loaded from a TOML file with one section per collaborator:
//! - `[scheduler]` check interval and jitter
//! - `[renderer]` render service endpoint and page timeout
//! - `[gateway]` where notifications go
//! - `[notification]` message body

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotwatch_notify::{Gateway, LogGateway, WebhookConfig, WebhookGateway, DEFAULT_BODY};
use slotwatch_scheduler::SchedulerConfig;

use crate::error::ConfigError;

/// Check interval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Mean seconds between checks.
    pub base_interval_secs: u64,
    /// Relative jitter in `[0, 1)`.
    pub jitter_ratio: f64,
    /// Lower bound of any delay, in seconds.
    pub min_delay_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            base_interval_secs: 60,
            jitter_ratio: 0.2,
            min_delay_secs: 1,
        }
    }
}

impl SchedulerSection {
    /// Base interval as a duration.
    #[must_use]
    pub const fn base_interval(&self) -> Duration {
        Duration::from_secs(self.base_interval_secs)
    }

    /// Scheduler settings for this section.
    #[must_use]
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.base_interval())
            .with_jitter(self.jitter_ratio)
            .with_min_delay(Duration::from_secs(self.min_delay_secs))
    }
}

/// Render service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RendererSection {
    /// Render service URL.
    #[serde(default = "default_render_endpoint")]
    pub endpoint: String,
    /// Page load timeout in milliseconds.
    #[serde(default = "default_render_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_render_endpoint() -> String {
    "http://127.0.0.1:3000/render".to_string()
}

const fn default_render_timeout_ms() -> u64 {
    30_000
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            endpoint: default_render_endpoint(),
            timeout_ms: default_render_timeout_ms(),
        }
    }
}

impl RendererSection {
    /// Page load timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Kind of push gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// HTTP webhook.
    Webhook,
    /// Log only.
    #[default]
    Log,
}

/// Push gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Gateway kind.
    #[serde(default)]
    pub kind: GatewayKind,
    /// Webhook URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Webhook bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Webhook request timeout in seconds.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_gateway_timeout_secs() -> u64 {
    10
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Log,
            url: None,
            token: None,
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// Notification text settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NotificationSection {
    /// Body of every open notification.
    #[serde(default = "default_body")]
    pub body: String,
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            body: default_body(),
        }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Directory holding targets and observation logs.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Renderer settings.
    #[serde(default)]
    pub renderer: RendererSection,
    /// Gateway settings.
    #[serde(default)]
    pub gateway: GatewaySection,
    /// Notification settings.
    #[serde(default)]
    pub notification: NotificationSection,
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("state"), |d| d.join("slotwatch"))
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            scheduler: SchedulerSection::default(),
            renderer: RendererSection::default(),
            gateway: GatewaySection::default(),
            notification: NotificationSection::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Write the configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_err)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("state_dir cannot be empty".to_string()));
        }

        self.scheduler
            .to_scheduler_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("scheduler: {e}")))?;

        if !is_http_url(&self.renderer.endpoint) {
            return Err(ConfigError::Invalid(
                "renderer.endpoint must start with http:// or https://".to_string(),
            ));
        }
        if self.renderer.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "renderer.timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.gateway.kind == GatewayKind::Webhook {
            match self.gateway.url.as_deref() {
                Some(url) if is_http_url(url) => {}
                Some(_) => {
                    return Err(ConfigError::Invalid(
                        "gateway.url must start with http:// or https://".to_string(),
                    ));
                }
                None => {
                    return Err(ConfigError::Invalid(
                        "gateway.url is required for the webhook gateway".to_string(),
                    ));
                }
            }
            if self.gateway.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "gateway.timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        if self.notification.body.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notification.body cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builds the configured push gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook gateway cannot be created.
    pub fn build_gateway(&self) -> Result<Gateway, ConfigError> {
        match self.gateway.kind {
            GatewayKind::Log => Ok(Gateway::Log(LogGateway)),
            GatewayKind::Webhook => {
                let url = self.gateway.url.clone().ok_or_else(|| {
                    ConfigError::Invalid("gateway.url is required for the webhook gateway".to_string())
                })?;
                let mut webhook = WebhookConfig::new(url)
                    .with_timeout(Duration::from_secs(self.gateway.timeout_secs));
                if let Some(token) = &self.gateway.token {
                    webhook = webhook.with_token(token.clone());
                }
                WebhookGateway::new(webhook)
                    .map(Gateway::Webhook)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            }
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
