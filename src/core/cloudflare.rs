//! Cloudflare v4 client: zone lookup and TLS mode enforcement.

use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::defaults::EdgeConfig;
use crate::error::{Error, Result};
use crate::http;

const PROVIDER: &str = "Cloudflare";

/// Edge/DNS provider operations the pipeline depends on.
pub trait EdgeProvider: Send + Sync {
    /// Resolve the zone id for an exact domain name.
    fn find_zone_id(&self, domain: &str) -> Result<String>;

    /// Set the zone's TLS mode. Returns the mode the provider reports.
    fn set_tls_mode(&self, zone_id: &str, mode: &str) -> Result<String>;
}

pub struct CloudflareClient {
    client: Client,
    token: String,
    config: EdgeConfig,
}

impl CloudflareClient {
    pub fn new(token: &str, config: &EdgeConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(false)?,
            token: token.to_string(),
            config: config.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

impl EdgeProvider for CloudflareClient {
    fn find_zone_id(&self, domain: &str) -> Result<String> {
        let operation = format!("zone lookup for {}", domain);
        let url = self.url("/zones");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("name", domain)])
            .timeout(http::timeout(self.config.timeout_secs))
            .send()
            .map_err(|e| http::transport_error(&url, e))?;

        let body = http::read_json(response, &url, PROVIDER, &operation)?;
        zone_id_from(&body, domain, &operation)
    }

    fn set_tls_mode(&self, zone_id: &str, mode: &str) -> Result<String> {
        let operation = format!("set TLS mode '{}' on zone {}", mode, zone_id);
        let url = self.url(&format!("/zones/{}/settings/ssl", zone_id));

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "value": mode }))
            .timeout(http::timeout(self.config.timeout_secs))
            .send()
            .map_err(|e| http::transport_error(&url, e))?;

        let body = http::read_json(response, &url, PROVIDER, &operation)?;
        ensure_success(&body, &operation)?;

        Ok(body
            .pointer("/result/value")
            .and_then(Value::as_str)
            .unwrap_or(mode)
            .to_string())
    }
}

/// Pick the zone id out of a `/zones?name=` response. No match is the only
/// hard failure; several matches resolve to the first.
pub fn zone_id_from(body: &Value, domain: &str, operation: &str) -> Result<String> {
    ensure_success(body, operation)?;

    let zones = body
        .get("result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if zones.len() > 1 {
        log_status!("cloudflare", "{} zones match {}, using the first", zones.len(), domain);
    }

    zones
        .first()
        .and_then(|zone| zone.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::provider_zone_not_found(domain))
}

/// Cloudflare signals outcome with `"success": true|false` regardless of
/// HTTP status.
pub fn ensure_success(body: &Value, operation: &str) -> Result<()> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }

    let reason = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .map(|err| match err.get("message").and_then(Value::as_str) {
            Some(message) => match err.get("code") {
                Some(code) => format!("{} (code {})", message, code),
                None => message.to_string(),
            },
            None => err.to_string(),
        })
        .unwrap_or_else(|| "Unknown error".to_string());

    Err(Error::provider_rejected(PROVIDER, operation, reason))
}
