use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chanclol_common::{ChanclolError, RiotApiConfig, Secret};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::consts::{MAX_THROTTLED_RETRIES, RIOT_TOKEN_HEADER};
use crate::rate_limiting::{AdmissionController, Priority};

/// Performs the actual outbound call
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<(StatusCode, Bytes), ChanclolError>;
}

pub struct HttpStatusProvider {
    client: reqwest::Client,
    api_key: Secret<String>,
}

impl HttpStatusProvider {
    pub fn new(config: &RiotApiConfig) -> Result<Self, ChanclolError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl StatusProvider for HttpStatusProvider {
    async fn fetch(&self, url: &Url) -> Result<(StatusCode, Bytes), ChanclolError> {
        let response = self
            .client
            .get(url.clone())
            .header(RIOT_TOKEN_HEADER, self.api_key.expose_secret())
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Riot id and puuid resolution
    Identity,
    /// One-off lookups on behalf of a user command
    Lookup,
    /// Repeated checks issued by the scheduler
    StatusPoll,
}

impl EndpointClass {
    pub fn priority(&self) -> Priority {
        match self {
            Self::Identity | Self::Lookup => Priority::Vital,
            Self::StatusPoll => Priority::NonVital,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Payload(Bytes),
    /// Admission refused, nothing was sent
    NotAttempted,
    /// The remote answered with 429
    Throttled,
    /// Any other non-success status
    NoData(StatusCode),
}

#[derive(Clone)]
pub struct RequestGateway {
    admission: AdmissionController,
    provider: Arc<dyn StatusProvider>,
}

impl RequestGateway {
    pub fn new(admission: AdmissionController, provider: Arc<dyn StatusProvider>) -> Self {
        Self {
            admission,
            provider,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Vital classes only ever produce [FetchOutcome::Payload] or an error.
    pub async fn fetch(&self, class: EndpointClass, url: &Url) -> Result<FetchOutcome, ChanclolError> {
        match class.priority() {
            Priority::Vital => self.fetch_vital(url).await.map(FetchOutcome::Payload),
            Priority::NonVital => self.fetch_non_vital(url).await,
        }
    }

    /// Waits for admission and retries a bounded number of times while the remote throttles.
    pub async fn fetch_vital(&self, url: &Url) -> Result<Bytes, ChanclolError> {
        for attempt in 0..=MAX_THROTTLED_RETRIES {
            self.admission.admit(Priority::Vital).await?;
            let (status, body) = self.provider.fetch(url).await?;
            match status {
                StatusCode::OK => return Ok(body),
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(%url, attempt, "Vital request throttled by remote");
                    self.admission.notify_throttled()?;
                }
                status => {
                    debug!(%url, %status, "Vital request failed");
                    return Err(ChanclolError::RemoteStatus(status));
                }
            }
        }
        Err(ChanclolError::Throttled)
    }

    pub async fn fetch_non_vital(&self, url: &Url) -> Result<FetchOutcome, ChanclolError> {
        if !self.admission.admit(Priority::NonVital).await? {
            return Ok(FetchOutcome::NotAttempted);
        }
        let (status, body) = self.provider.fetch(url).await?;
        match status {
            StatusCode::OK => Ok(FetchOutcome::Payload(body)),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(%url, "Request throttled by remote");
                self.admission.notify_throttled()?;
                Ok(FetchOutcome::Throttled)
            }
            status => {
                debug!(%url, %status, "No data");
                Ok(FetchOutcome::NoData(status))
            }
        }
    }
}
