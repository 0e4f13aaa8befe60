//! Push one file to many accounts through the control panel.

use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::batch::LogSink;
use crate::cpanel::{ControlPanel, PanelAuth};
use crate::error::{Error, Result};
use crate::job::{derive_account, SubstitutionRule};
use crate::output::BatchResult;
use crate::render;
use crate::utils::{io, shell};

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDistribution {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub control_panel_password: String,
    /// File body. Read from `source_file` when empty.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source_file: Option<String>,
    /// Directory inside the account home, e.g. `public_html/app/`.
    #[serde(default)]
    pub target_dir: String,
    /// Defaults to the source file's name.
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub rules: Vec<SubstitutionRule>,
}

impl std::fmt::Debug for FileDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDistribution")
            .field("domains", &self.domains)
            .field("control_panel_password", &"<redacted>")
            .field("content_len", &self.content.len())
            .field("source_file", &self.source_file)
            .field("target_dir", &self.target_dir)
            .field("file_name", &self.file_name)
            .field("rules", &self.rules)
            .finish()
    }
}

impl FileDistribution {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            Error::validation_invalid_json(
                e,
                Some("parse file distribution".to_string()),
                Some(raw.chars().take(200).collect::<String>()),
            )
        })
    }

    /// Load `content` from `source_file` when needed and default the file
    /// name from it.
    pub fn resolve_source(&mut self) -> Result<()> {
        let Some(source) = self.source_file.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(());
        };

        if self.content.is_empty() {
            self.content = io::read_user_file(source, "read source file")?;
        }
        if self.file_name.trim().is_empty() {
            self.file_name = shell::base_name(source).to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.control_panel_password.is_empty() {
            missing.push("controlPanelPassword".to_string());
        }
        if self.target_dir.trim().is_empty() {
            missing.push("targetDir".to_string());
        }
        if self.file_name.trim().is_empty() {
            missing.push("fileName".to_string());
        }
        if !missing.is_empty() {
            return Err(Error::validation_missing_argument(missing));
        }

        if self.domain_list().is_empty() {
            return Err(Error::validation_invalid_argument(
                "domains",
                "Domain list is empty",
                None,
                None,
            ));
        }
        Ok(())
    }

    pub fn domain_list(&self) -> Vec<String> {
        self.domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn target_dir(&self) -> &str {
        self.target_dir.trim_end_matches('/')
    }
}

/// Write the rendered file to every domain. One domain's failure never stops
/// the others.
pub fn push_file(
    distribution: &FileDistribution,
    panel: &dyn ControlPanel,
    sink: &mut dyn LogSink,
    delay: Duration,
) -> BatchResult {
    let domains = distribution.domain_list();
    let mut result = BatchResult::new();
    log_status!("distribute", "Pushing {} to {} domain(s)", distribution.file_name, domains.len());

    for (index, domain) in domains.iter().enumerate() {
        let account = derive_account(domain);
        let content = render::apply_rules(&distribution.content, domain, &account, &distribution.rules);
        let auth = PanelAuth {
            domain,
            account: &account,
            password: &distribution.control_panel_password,
        };

        match panel.save_file(&auth, distribution.target_dir(), &distribution.file_name, &content) {
            Ok(message) => {
                sink.line(&format!("[ok] {}: {}", domain, message));
                result.record_updated(domain.clone());
            }
            Err(err) => {
                sink.line(&format!("[failed] {}: {}", domain, err.message));
                result.record_error(domain.clone(), err.message);
            }
        }

        if index + 1 < domains.len() && !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    let summary = result.summary();
    sink.line(&format!(
        "Push complete: {} domain(s), {} updated, {} failed",
        summary.total, summary.succeeded, summary.failed
    ));

    result
}
