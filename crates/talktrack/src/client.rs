//! HTTP client for the talks server.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::repository::TalkSource;
use crate::talk::Talk;

/// Path of the talks endpoint, relative to the base URL.
pub const TALKS_PATH: &str = "/talks";

/// Client for `GET {base_url}/talks`.
///
/// No retries and no timeout: a hung server leaves the call pending.
#[derive(Debug, Clone)]
pub struct RemoteTalksClient {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteTalksClient {
    /// Create a client for the server at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    /// The base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the talks endpoint.
    #[must_use]
    pub fn talks_url(&self) -> String {
        format!("{}{TALKS_PATH}", self.base_url.trim_end_matches('/'))
    }

    /// Fetch the current talk list.
    ///
    /// The body is decoded as a list of talks without further checks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the server cannot be reached,
    /// [`Error::HttpStatus`] for a non-2xx answer and [`Error::Decode`] if the
    /// body is not a list of talks. Every failure is also logged.
    pub async fn get_talks(&self) -> Result<Vec<Talk>> {
        let url = self.talks_url();
        let result = self.request_talks(&url).await;
        match &result {
            Ok(talks) => debug!(count = talks.len(), "Fetched talks from {}", url),
            Err(e) => error!("Failed to fetch talks: {}", e),
        }
        result
    }

    async fn request_talks(&self, url: &str) -> Result<Vec<Talk>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| Error::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Vec<Talk>>().await.map_err(|source| {
            if source.is_decode() {
                Error::Decode {
                    url: url.to_string(),
                    message: source.to_string(),
                }
            } else {
                Error::Http {
                    url: url.to_string(),
                    source,
                }
            }
        })
    }

    /// Check that the server answers on its root path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the server cannot be reached.
    pub async fn check_health(&self) -> Result<bool> {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| Error::Http { url, source })?;
        Ok(response.status().is_success())
    }

    /// Classify the server for a failed fetch, via [`Self::check_health`].
    pub async fn server_status(&self) -> ServerStatus {
        match self.check_health().await {
            Ok(true) => ServerStatus::Up,
            Ok(false) => ServerStatus::Unhealthy,
            Err(e) => {
                debug!("Health check failed: {}", e);
                ServerStatus::Unreachable
            }
        }
    }
}

/// What the server's root path says about its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// The root path answered with a success status.
    Up,
    /// The server answered with an error status.
    Unhealthy,
    /// No answer at all.
    Unreachable,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "server is up"),
            Self::Unhealthy => write!(f, "server is answering with errors"),
            Self::Unreachable => write!(f, "server is unreachable"),
        }
    }
}

#[async_trait]
impl TalkSource for RemoteTalksClient {
    async fn fetch_talks(&self) -> Result<Vec<Talk>> {
        self.get_talks().await
    }
}
