//! Shared error type for the provider clients.

/// Errors from any of the remote provider clients.
///
/// Workflow code treats these as passthrough failures; the `provider`
/// tag identifies which collaborator failed.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, decode).
    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The provider returned a non-2xx status code.
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// A guest-agent message could not be delivered or answered.
    #[error("guest agent call failed: {0}")]
    Guest(String),
}
