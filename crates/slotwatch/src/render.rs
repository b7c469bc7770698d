//! Page rendering.
//!
//! Rendering is delegated to an external headless-browser service. The
//! service loads the page, follows redirects and scripts, and answers with
//! the final URL and the interactive elements the detection rules look at.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotwatch_detect::{Element, Snapshot};
use tracing::debug;

use crate::error::RenderError;

/// Extra time granted to the HTTP round trip on top of the page timeout.
const TRANSPORT_SLACK: Duration = Duration::from_secs(5);

/// Loads a page and returns a queryable snapshot of it.
#[allow(async_fn_in_trait)]
pub trait Renderer: Send + Sync {
    /// Renders `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a `RenderError` describing why no snapshot was produced.
    fn render(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Snapshot, RenderError>> + Send;
}

impl<T: Renderer> Renderer for Arc<T> {
    fn render(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Snapshot, RenderError>> + Send {
        (**self).render(url, timeout)
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    final_url: String,
    #[serde(default)]
    elements: Vec<Element>,
}

/// Renders pages through an HTTP render service.
///
/// The service receives `{"url", "timeout_ms"}` and answers with
/// `{"final_url", "elements": [{"tag", "text", "href", "disabled"}]}`.
/// A 408 or 504 answer means the page timed out; any other non-2xx answer is
/// a navigation failure whose body is kept as the reason.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpRenderer {
    /// Creates a renderer posting to `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<Snapshot, RenderError> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let transport_err = |e: reqwest::Error| {
            if e.is_timeout() {
                RenderError::Timeout { timeout_ms }
            } else if e.is_decode() {
                RenderError::Decode(e.to_string())
            } else {
                RenderError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout + TRANSPORT_SLACK)
            .json(&RenderRequest { url, timeout_ms })
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return Err(RenderError::Timeout { timeout_ms });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if body.trim().is_empty() {
                format!("render service answered {status}")
            } else {
                body.trim().to_string()
            };
            return Err(RenderError::Navigation(reason));
        }

        let bytes = response.bytes().await.map_err(transport_err)?;
        let page: RenderResponse =
            serde_json::from_slice(&bytes).map_err(|e| RenderError::Decode(e.to_string()))?;

        debug!(
            url,
            final_url = %page.final_url,
            elements = page.elements.len(),
            "rendered page"
        );
        Ok(Snapshot::new(page.final_url, page.elements))
    }
}
