//! JSON-over-HTTP plumbing shared by the embedding and generation providers.
//!
//! Retry policy: a transient failure (network error, timeout, HTTP 429 or
//! 5xx) is retried immediately, at most `max_retries` times (config caps it
//! at one). Any other 4xx fails on the first attempt. There is no backoff;
//! a question should fail fast rather than hang.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ServiceError;

/// Longest slice of an error body kept in a [`ServiceError::Status`].
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("askdocs/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Send the request built by `request` and decode a JSON body.
///
/// `request` is called once per attempt because a `RequestBuilder` is
/// consumed by `send`.
pub(crate) async fn send_json<F>(
    service: &str,
    request: F,
    max_retries: u32,
    timeout: Duration,
) -> Result<Value, ServiceError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            debug!(service, attempt, "retrying request");
        }

        let err = match request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| ServiceError::InvalidResponse(e.to_string()));
                }
                let mut body = response.text().await.unwrap_or_default();
                truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
                ServiceError::Status {
                    status: status.as_u16(),
                    body,
                }
            }
            Err(e) => ServiceError::from_reqwest(e, timeout),
        };

        if !err.is_transient() {
            return Err(err);
        }
        warn!(service, attempt, error = %err, "transient failure");
        last_err = Some(err);
    }

    Err(last_err.unwrap_or_else(|| ServiceError::Unavailable(format!("{} not reached", service))))
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut s = "ééééé".to_string();
        truncate_at_char_boundary(&mut s, 3);
        assert_eq!(s, "é");

        let mut short = "ok".to_string();
        truncate_at_char_boundary(&mut short, 10);
        assert_eq!(short, "ok");
    }
}
