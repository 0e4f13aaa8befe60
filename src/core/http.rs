//! Blocking HTTP plumbing shared by the provider clients.
//!
//! Maps transport failures, HTTP status codes and body parsing onto the
//! crate error taxonomy so callers only inspect provider success flags.

use crate::error::{Error, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

pub fn build_client(accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::internal_unexpected(format!("Failed to build HTTP client: {}", e)))
}

pub fn timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

/// Map a reqwest transport error for `target`.
///
/// The request URL is stripped from the error text since query strings may
/// carry credentials.
pub fn transport_error(target: &str, err: reqwest::Error) -> Error {
    let timed_out = err.is_timeout();
    let reason = describe(&err.without_url());

    if timed_out {
        Error::connection_timeout(target, reason)
    } else {
        Error::connection_failed(target, reason, None)
    }
}

/// Error text followed by its source chain.
fn describe(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Check HTTP status and decode the JSON body.
///
/// 401/403 become authentication failures, any other non-2xx status a
/// connection error carrying the status.
pub fn read_json(
    response: Response,
    target: &str,
    provider: &str,
    operation: &str,
) -> Result<Value> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::provider_auth_failed(provider, operation));
    }

    if !status.is_success() {
        let reason = status.canonical_reason().unwrap_or("unexpected status");
        return Err(Error::connection_failed(target, reason, Some(status.as_u16())));
    }

    let body = response.text().map_err(|e| transport_error(target, e))?;
    parse_body(&body, provider, operation)
}

pub fn parse_body(body: &str, provider: &str, operation: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| Error::provider_rejected(provider, operation, format!("unreadable response: {}", e)))
}

/// Strip scheme credentials and query strings before a URL is logged.
pub fn display_target(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.split_once("://") {
        Some((scheme, rest)) => {
            let host_part = rest.rsplit_once('@').map(|(_, h)| h).unwrap_or(rest);
            format!("{}://{}", scheme, host_part)
        }
        None => without_query.to_string(),
    }
}
