//! Response helpers shared by the HTTP provider clients.

use serde::de::DeserializeOwned;

use crate::error::ProviderError;

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`ProviderError::Api`] containing the
/// status and body text on failure.
pub(crate) async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let response = ensure_success(provider, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|source| ProviderError::Request { provider, source })
}

/// Assert the response has a success status code, discarding the body.
pub(crate) async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<(), ProviderError> {
    ensure_success(provider, response).await?;
    Ok(())
}
