use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::sanitize;

use super::{DeskError, SupportDesk};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the support desk REST API.
///
/// Authenticates with HTTP Basic auth using the API key as the username
/// and `X` as the password.
pub struct DeskClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct NoteRequest<'a> {
    body: &'a str,
    private: bool,
}

impl DeskClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, DeskError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| DeskError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn notes_url(&self, ticket_id: &str) -> String {
        format!("{}/api/v2/tickets/{}/notes", self.base_url, ticket_id)
    }
}

#[async_trait]
impl SupportDesk for DeskClient {
    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, DeskError> {
        let safe_url = sanitize::redact_url(url);
        debug!(url = %safe_url, "Downloading attachment");

        let response = self
            .client
            .get(url)
            .basic_auth(self.api_key.expose_secret(), Some("X"))
            .send()
            .await
            .map_err(|e| DeskError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeskError::Status {
                status: status.as_u16(),
                url: safe_url,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeskError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn add_private_note(&self, ticket_id: &str, body: &str) -> Result<(), DeskError> {
        let url = self.notes_url(ticket_id);
        let response = self
            .client
            .post(&url)
            .basic_auth(self.api_key.expose_secret(), Some("X"))
            .json(&NoteRequest {
                body,
                private: true,
            })
            .send()
            .await
            .map_err(|e| DeskError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeskError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }
}
