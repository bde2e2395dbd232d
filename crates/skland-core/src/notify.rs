use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::DEFAULT_NOTIFICATION_TITLE;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// One narrated line of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub is_error: bool,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build notification client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("notification to {url} failed: {source}")]
    Delivery {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("notification to {url} rejected with HTTP {status}")]
    Rejected {
        url: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Serialize)]
struct Payload<'a> {
    title: &'a str,
    messages: &'a [Message],
}

/// Buffers a run's messages and pushes them as one webhook payload per destination.
///
/// Built once per run and discarded after [`Notifier::flush`].
#[derive(Debug)]
pub struct Notifier {
    title: String,
    urls: Vec<String>,
    messages: Vec<Message>,
    client: Option<Client>,
}

impl Notifier {
    /// A notifier that only buffers; `flush` is always a no-op.
    pub fn buffer_only() -> Self {
        Self {
            title: DEFAULT_NOTIFICATION_TITLE.to_string(),
            urls: Vec::new(),
            messages: Vec::new(),
            client: None,
        }
    }

    pub fn webhook(title: impl Into<String>, urls: Vec<String>) -> Result<Self, NotifyError> {
        let client = if urls.is_empty() {
            None
        } else {
            Some(
                Client::builder()
                    .timeout(PUSH_TIMEOUT)
                    .build()
                    .map_err(NotifyError::Client)?,
            )
        };
        Ok(Self {
            title: title.into(),
            urls,
            messages: Vec::new(),
            client,
        })
    }

    /// Append one line; lines are delivered in append order.
    pub fn collect(&mut self, message: Message) {
        if message.is_error {
            error!(target: "skland::notify", "{}", message.text);
        } else {
            info!(target: "skland::notify", "{}", message.text);
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Send the whole buffer to every destination.
    ///
    /// Stops at the first failing destination. Returns immediately when there is nothing to
    /// send or nowhere to send it.
    pub async fn flush(&self) -> Result<(), NotifyError> {
        let Some(client) = self.client.as_ref() else {
            return Ok(());
        };
        if self.urls.is_empty() || self.messages.is_empty() {
            return Ok(());
        }

        let payload = Payload {
            title: &self.title,
            messages: &self.messages,
        };
        for url in &self.urls {
            let response = client
                .post(url)
                .json(&payload)
                .send()
                .await
                .map_err(|source| NotifyError::Delivery {
                    url: url.clone(),
                    source,
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Rejected {
                    url: url.clone(),
                    status,
                });
            }
            debug!(%url, messages = self.messages.len(), "Notification delivered");
        }
        Ok(())
    }
}
