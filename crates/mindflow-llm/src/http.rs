use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};

use mindflow_core::errors::GatewayError;

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client() -> Result<Client, GatewayError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn map_transport_error(err: reqwest::Error, timeout: Option<Duration>) -> GatewayError {
    match timeout {
        Some(limit) if err.is_timeout() => GatewayError::Timeout(limit),
        _ => GatewayError::NetworkError(err.to_string()),
    }
}

/// Send a request and turn non-success statuses into classified errors.
pub(crate) async fn send(
    request: RequestBuilder,
    timeout: Option<Duration>,
) -> Result<Response, GatewayError> {
    let resp = request
        .send()
        .await
        .map_err(|e| map_transport_error(e, timeout))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(GatewayError::from_status(status, body));
    }
    Ok(resp)
}
