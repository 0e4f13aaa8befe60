//! cPanel UAPI client: database password rotation and file writes.
//!
//! Every account has its own panel at `https://<domain>:<port>`, so requests
//! carry the domain and authenticate with the derived account.

use reqwest::blocking::Client;
use serde_json::Value;

use crate::defaults::ControlPanelConfig;
use crate::error::{Error, Result};
use crate::http;

const PROVIDER: &str = "cPanel";
const UNKNOWN_ERROR: &str = "Unknown error";

/// Per-account panel credentials.
#[derive(Debug, Clone, Copy)]
pub struct PanelAuth<'a> {
    pub domain: &'a str,
    pub account: &'a str,
    pub password: &'a str,
}

/// Control-panel operations the pipeline depends on.
pub trait ControlPanel: Send + Sync {
    /// Set the password of an existing database user. Returns a log message.
    fn set_database_password(&self, auth: &PanelAuth<'_>, db_user: &str, password: &str)
        -> Result<String>;

    /// Write `content` to `<dir>/<file>` under the account's home. Returns a
    /// log message.
    fn save_file(&self, auth: &PanelAuth<'_>, dir: &str, file: &str, content: &str)
        -> Result<String>;
}

pub struct CpanelClient {
    client: Client,
    config: ControlPanelConfig,
}

impl CpanelClient {
    pub fn new(config: &ControlPanelConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(!config.verify_tls)?,
            config: config.clone(),
        })
    }

    fn endpoint(&self, domain: &str, module: &str, function: &str) -> String {
        format!(
            "https://{}:{}/execute/{}/{}",
            domain, self.config.port, module, function
        )
    }
}

impl ControlPanel for CpanelClient {
    fn set_database_password(
        &self,
        auth: &PanelAuth<'_>,
        db_user: &str,
        password: &str,
    ) -> Result<String> {
        let operation = format!("set password for database user {}", db_user);
        let url = self.endpoint(auth.domain, "Mysql", "set_password");
        let target = http::display_target(&url);

        log_status!("cpanel", "Rotating password for {} on {}", db_user, auth.domain);

        let response = self
            .client
            .post(&url)
            .basic_auth(auth.account, Some(auth.password))
            .form(&[("user", db_user), ("password", password)])
            .timeout(http::timeout(self.config.password_timeout_secs))
            .send()
            .map_err(|e| http::transport_error(&target, e))?;

        let body = http::read_json(response, &target, PROVIDER, &operation)?;
        check_status(&body, &operation)?;

        Ok(format!("Database password for {} updated", db_user))
    }

    fn save_file(
        &self,
        auth: &PanelAuth<'_>,
        dir: &str,
        file: &str,
        content: &str,
    ) -> Result<String> {
        let operation = format!("write {}/{}", dir, file);
        let url = self.endpoint(auth.domain, "Fileman", "save_file_content");
        let target = http::display_target(&url);

        log_status!("cpanel", "Writing {}/{} on {}", dir, file, auth.domain);

        let response = self
            .client
            .post(&url)
            .basic_auth(auth.account, Some(auth.password))
            .form(&[("dir", dir), ("file", file), ("content", content)])
            .timeout(http::timeout(self.config.file_timeout_secs))
            .send()
            .map_err(|e| http::transport_error(&target, e))?;

        let body = http::read_json(response, &target, PROVIDER, &operation)?;
        check_status(&body, &operation)?;

        Ok(format!("File {}/{} written", dir, file))
    }
}

/// UAPI reports success as `"status": 1`; anything else carries `errors`.
pub fn check_status(body: &Value, operation: &str) -> Result<()> {
    if body.get("status").and_then(Value::as_i64) == Some(1) {
        return Ok(());
    }

    Err(Error::provider_rejected(PROVIDER, operation, first_error(body)))
}

fn first_error(body: &Value) -> String {
    body.get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .map(|err| match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
