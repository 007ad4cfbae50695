//! Shared HTTP plumbing for the network providers: client construction and
//! classification of transport outcomes into [`FailureReason`].

use std::time::Duration;

use anyhow::Result;
use reqwest::{RequestBuilder, StatusCode};

use crate::error::FailureReason;

const BODY_EXCERPT_CHARS: usize = 200;

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("emr-assist/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= BODY_EXCERPT_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{}...", cut)
}

/// Map a non-2xx status to a failure reason.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> FailureReason {
    let detail = format!("HTTP {}: {}", status.as_u16(), excerpt(body));
    match status.as_u16() {
        401 | 403 => FailureReason::Auth(detail),
        429 => FailureReason::RateLimited(detail),
        _ => FailureReason::Transport(detail),
    }
}

pub(crate) fn classify_error(err: &reqwest::Error, timeout: Duration) -> FailureReason {
    if err.is_timeout() {
        FailureReason::Timeout(timeout)
    } else if err.is_decode() {
        FailureReason::MalformedResponse(err.to_string())
    } else {
        FailureReason::Transport(err.to_string())
    }
}

/// Send a request once and decode the JSON body of a 2xx response.
pub(crate) async fn send_json(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<serde_json::Value, FailureReason> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_error(&e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_error(&e, timeout))?;
    serde_json::from_str(&body).map_err(|e| {
        FailureReason::MalformedResponse(format!("invalid JSON body ({}): {}", e, excerpt(&body)))
    })
}
