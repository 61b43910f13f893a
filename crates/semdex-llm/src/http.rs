//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

use crate::error::LlmError;

/// Build the HTTP client used by network providers.
///
/// Config: 10s connect timeout, caller-supplied request timeout, rustls TLS,
/// `semdex/{version}` user-agent, redirect limit 10.
///
/// # Errors
///
/// Returns `LlmError::Http` if the TLS backend cannot be initialized.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client, LlmError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .user_agent(concat!("semdex/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_with_short_timeout() {
        assert!(build_client(Duration::from_millis(250)).is_ok());
    }
}
