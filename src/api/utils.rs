use crate::error::{ParleyError, Result};

/// Pass successful responses through; turn anything else into a
/// [`ParleyError::Store`] carrying status and body.
pub async fn check_response_status(
    service_name: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            service = service_name,
            status = %status,
            error = %error_text,
            "Request failed"
        );
        return Err(ParleyError::Store(format!(
            "{} request failed with status {}: {}",
            service_name, status, error_text
        )));
    }
    Ok(response)
}

/// `https://x.supabase.co` -> `wss://x.supabase.co`
pub fn websocket_base(http_url: &str) -> Result<String> {
    let trimmed = http_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        Ok(format!("wss://{}", rest))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        Ok(format!("ws://{}", rest))
    } else {
        Err(ParleyError::Config(format!(
            "Supabase URL must start with http:// or https://, got {}",
            http_url
        )))
    }
}
