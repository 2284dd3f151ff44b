//! HTTP mail transport implementation.
//!
//! Delivers follow-ups through a bearer-authenticated sendMail-style REST
//! endpoint, acquiring tokens from a client-credentials token endpoint.
//! A `simulate` flag short-circuits the wire calls for development and
//! safety: messages are logged and recorded as sent without touching the
//! provider.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{Credential, MailTransport, OutboundMessage, Result, TransportError};

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the sendMail endpoint.
    pub base_url: String,
    /// Token endpoint for client-credentials acquisition.
    pub token_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Wire timeout per request.
    pub timeout: Duration,
    /// When set, no wire calls happen; sends are logged and succeed.
    pub simulate: bool,
}

impl TransportConfig {
    /// A simulation-only configuration with no endpoints.
    pub fn simulated() -> Self {
        Self {
            base_url: String::new(),
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout: Duration::from_secs(30),
            simulate: true,
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    expires_in: Option<u64>,
}

/// HTTP mail transport.
pub struct HttpTransport {
    config: TransportConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport from configuration.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Internal(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Builds a transport from `CADENCE_MAIL_URL`, `CADENCE_TOKEN_URL`,
    /// `CADENCE_CLIENT_ID`, and `CADENCE_CLIENT_SECRET`. When any of them
    /// is missing the transport runs in simulation mode.
    pub fn from_env() -> Result<Self> {
        let vars = [
            std::env::var("CADENCE_MAIL_URL"),
            std::env::var("CADENCE_TOKEN_URL"),
            std::env::var("CADENCE_CLIENT_ID"),
            std::env::var("CADENCE_CLIENT_SECRET"),
        ];

        if let [Ok(base_url), Ok(token_url), Ok(client_id), Ok(client_secret)] = &vars {
            Self::new(TransportConfig {
                base_url: base_url.clone(),
                token_url: token_url.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                timeout: Duration::from_secs(30),
                simulate: false,
            })
        } else {
            info!("mail transport endpoints not configured, running in simulation mode");
            Self::new(TransportConfig::simulated())
        }
    }
}

#[async_trait]
impl MailTransport for HttpTransport {
    async fn acquire_credential(&self) -> Result<Credential> {
        if self.config.simulate {
            return Ok(Credential::new("simulated"));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Credential(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Credential(e.to_string()))?;

        Ok(Credential::new(token.access_token))
    }

    async fn send_message(&self, credential: &Credential, message: &OutboundMessage) -> Result<()> {
        if self.config.simulate {
            info!(
                to = %message.to.first().map(|a| a.email.as_str()).unwrap_or("-"),
                subject = %message.subject,
                conversation = message.conversation_id.as_deref().unwrap_or("-"),
                "simulated delivery"
            );
            return Ok(());
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credential.token()))
                .map_err(|e| TransportError::Internal(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let payload = json!({
            "message": {
                "subject": message.subject,
                "body": { "contentType": "Text", "content": message.body },
                "from": { "emailAddress": { "address": message.from.email } },
                "toRecipients": message
                    .to
                    .iter()
                    .map(|a| json!({ "emailAddress": { "address": a.email, "name": a.name } }))
                    .collect::<Vec<_>>(),
                "conversationId": message.conversation_id,
            },
            "saveToSentItems": true,
        });

        debug!(url = %self.config.base_url, "posting follow-up to mail provider");

        let response = self
            .client
            .post(&self.config.base_url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail = detail.chars().take(200).collect::<String>();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;

    fn sample_message() -> OutboundMessage {
        OutboundMessage {
            from: Address::new("sales@example.com"),
            to: vec![Address::new("lead@example.org")],
            subject: "Re: Proposal".to_string(),
            body: "Following up.".to_string(),
            conversation_id: Some("conv-1".to_string()),
        }
    }

    #[tokio::test]
    async fn simulated_transport_never_touches_the_wire() {
        let transport = HttpTransport::new(TransportConfig::simulated()).unwrap();

        let credential = transport.acquire_credential().await.unwrap();
        transport
            .send_message(&credential, &sample_message())
            .await
            .unwrap();
    }

    #[test]
    fn simulated_config_has_no_endpoints() {
        let config = TransportConfig::simulated();
        assert!(config.simulate);
        assert!(config.base_url.is_empty());
    }
}
