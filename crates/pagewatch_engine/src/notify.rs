use pagewatch_core::Notification;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::http::{describe_reqwest_error, HttpSettings};

pub const PUSHBULLET_BASE_URL: &str = "https://api.pushbullet.com/";
const PUSHES_PATH: &str = "v2/pushes";
const ACCESS_TOKEN_HEADER: &str = "Access-Token";
const NOTE_TYPE: &str = "note";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("invalid notification endpoint: {0}")]
    Endpoint(String),
    #[error("notification request failed: {0}")]
    Transport(String),
    #[error("notification service returned an unexpected status code {0}")]
    Status(u16),
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification. Only an explicit acceptance counts as success.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Sends notes through the Pushbullet pushes API.
#[derive(Debug, Clone)]
pub struct PushbulletNotifier {
    client: reqwest::Client,
    pushes_url: Url,
    access_token: String,
}

impl PushbulletNotifier {
    pub fn new(
        access_token: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, NotifyError> {
        Self::with_base_url(access_token, PUSHBULLET_BASE_URL, settings)
    }

    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: &str,
        settings: &HttpSettings,
    ) -> Result<Self, NotifyError> {
        let base = Url::parse(base_url).map_err(|err| NotifyError::Endpoint(err.to_string()))?;
        let pushes_url = base
            .join(PUSHES_PATH)
            .map_err(|err| NotifyError::Endpoint(err.to_string()))?;
        let client = settings
            .build_client()
            .map_err(|err| NotifyError::Transport(describe_reqwest_error(&err)))?;
        Ok(Self {
            client,
            pushes_url,
            access_token: access_token.into(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for PushbulletNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(&PushRequest {
            title: &notification.title,
            body: &notification.body,
            kind: NOTE_TYPE,
        })
        .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let response = self
            .client
            .post(self.pushes_url.clone())
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|err| NotifyError::Transport(describe_reqwest_error(&err)))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(NotifyError::Status(status));
        }
        Ok(())
    }
}
