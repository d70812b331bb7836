use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::{BotError, Result};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub const VERIFICATION_SUBJECT: &str = "Your Discord verification code";
const VERIFICATION_BODY: &str = "Hello,\n\n\
    Someone asked to link this address to a Discord account on the study server.\n\
    If that was you, run /auth code with the code below within the hour:\n\n\
    {token}\n\n\
    If it was not you, you can ignore this message.\n";

/// Fills the `{token}` placeholder of the verification template.
pub fn verification_body(token: &str) -> String {
    VERIFICATION_BODY.replace("{token}", token)
}

/// One-time notification delivery. The workflow only depends on this
/// contract; tests swap in a recording implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()>;
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Sends mail through the university's HTTP relay.
pub struct RelayMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RelayMailer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .json(&RelayMessage {
                to: recipient,
                subject,
                text: body,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::ExternalService(format!(
                "mail relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
