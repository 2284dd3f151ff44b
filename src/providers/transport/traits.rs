//! Mail transport trait definition.
//!
//! This module defines the [`MailTransport`] trait which abstracts over the
//! outbound mail provider. The engine hands it a fully rendered message and
//! a recipient list; authentication details stay behind the seam as an
//! opaque bearer credential.

use async_trait::async_trait;
use std::fmt;

use crate::domain::Address;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Credential acquisition failed or the token was rejected.
    #[error("credential error: {0}")]
    Credential(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider rejected the message.
    #[error("send rejected with status {status}: {detail}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Response detail, truncated to a reasonable length.
        detail: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// An opaque bearer credential for the mail provider.
///
/// The token never appears in Debug output or logs.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the Authorization header.
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A fully rendered follow-up ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Sender address (the original email's sender).
    pub from: Address,
    /// Recipient addresses (the original email's recipients).
    pub to: Vec<Address>,
    /// Rendered subject line.
    pub subject: String,
    /// Rendered body.
    pub body: String,
    /// Provider conversation identifier of the original email, so the
    /// follow-up threads as a reply.
    pub conversation_id: Option<String>,
}

/// Trait for outbound mail delivery.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Obtains a bearer credential for subsequent sends.
    ///
    /// Called once per batch; the same credential is reused for every
    /// message in the pass.
    async fn acquire_credential(&self) -> Result<Credential>;

    /// Delivers one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] when the provider refuses the
    /// message and [`TransportError::Connection`] on wire failures.
    async fn send_message(&self, credential: &Credential, message: &OutboundMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_never_reveals_the_token() {
        let credential = Credential::new("sk-very-secret");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(debug, "Credential(***)");
    }

    #[test]
    fn transport_error_display() {
        let rejected = TransportError::Rejected {
            status: 502,
            detail: "bad gateway".to_string(),
        };
        assert!(rejected.to_string().contains("502"));

        let credential = TransportError::Credential("expired".to_string());
        assert!(credential.to_string().contains("expired"));
    }
}
