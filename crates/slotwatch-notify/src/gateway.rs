//! Push gateways that deliver notifications.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{NotifyError, Result};
use crate::notification::Notification;

/// Delivers notifications to a push service.
#[allow(async_fn_in_trait)]
pub trait PushGateway: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway did not accept the notification.
    fn deliver(&self, notification: &Notification) -> impl Future<Output = Result<()>> + Send;
}

impl<T: PushGateway> PushGateway for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver(&self, notification: &Notification) -> impl Future<Output = Result<()>> + Send {
        (**self).deliver(notification)
    }
}

/// Settings of a [`WebhookGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Endpoint receiving the JSON notification.
    pub url: String,
    /// Sent as a bearer token when set.
    pub token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl WebhookConfig {
    /// Creates a config for `url` with a 10 second timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Posts notifications as JSON to an HTTP endpoint.
///
/// Any non-2xx answer counts as a failed delivery.
#[derive(Debug, Clone)]
pub struct WebhookGateway {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookGateway {
    /// Creates the gateway.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` for an empty URL or a client that
    /// cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(NotifyError::InvalidConfig(
                "webhook url cannot be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?;
        Ok(Self { config, client })
    }
}

impl PushGateway for WebhookGateway {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let mut request = self.client.post(&self.config.url).json(notification);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(url = %self.config.url, status = status.as_u16(), "webhook accepted notification");
        Ok(())
    }
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

impl PushGateway for LogGateway {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            body = %notification.body,
            click_url = %notification.click_url,
            "notification"
        );
        Ok(())
    }
}

/// A gateway chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum Gateway {
    /// HTTP webhook.
    Webhook(WebhookGateway),
    /// Log only.
    Log(LogGateway),
}

impl PushGateway for Gateway {
    fn name(&self) -> &str {
        match self {
            Self::Webhook(g) => g.name(),
            Self::Log(g) => g.name(),
        }
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        match self {
            Self::Webhook(g) => g.deliver(notification).await,
            Self::Log(g) => g.deliver(notification).await,
        }
    }
}
