//! Single-shot HTTP helper shared by the providers.
//!
//! No retries happen here; the coordinate cache owns the retry policy.

use crate::GeocodeError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends a request and parses the body as JSON.
///
/// HTTP 429 maps to [`GeocodeError::RateLimited`]; any other non-success
/// status maps to [`GeocodeError::Status`].
///
/// # Errors
///
/// Returns [`GeocodeError`] if the request fails, the status is not a
/// success, or the body is not JSON.
pub async fn get_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, GeocodeError> {
    let response = request.send().await?;
    let url = response.url().to_string();
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        log::warn!("HTTP 429 (rate limited) from {url}");
        return Err(GeocodeError::RateLimited);
    }

    if !status.is_success() {
        return Err(GeocodeError::Status {
            status: status.as_u16(),
            url,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::debug!("JSON parse failed for {url}: {e}\n  body preview: {preview}");
        GeocodeError::Parse {
            message: format!("invalid JSON from {url}: {e}"),
        }
    })
}
