//! Outbound mail transport providers.

mod http;
mod traits;

pub use http::{HttpTransport, TransportConfig};
pub use traits::{Credential, MailTransport, OutboundMessage, Result, TransportError};
