//! Job request and per-domain job state.
//!
//! A `JobRequest` is built once from validated input and shared read-only by
//! every domain in the batch. `DomainJob` and `StepOutcome` are the only
//! values mutated while the batch runs.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, FailureKind, Result};

/// Maximum length of a control-panel account name.
pub const ACCOUNT_MAX_LEN: usize = 16;

/// Derive the control-panel account from a domain: its first label, capped
/// at 16 characters.
pub fn derive_account(domain: &str) -> String {
    let label = domain.trim().split('.').next().unwrap_or("");
    label.chars().take(ACCOUNT_MAX_LEN).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub timestamp: DateTime<Utc>,
}

impl StepOutcome {
    pub fn succeeded(
        step: impl Into<String>,
        message: impl Into<String>,
        details: Vec<String>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            step: step.into(),
            success: true,
            message: message.into(),
            details,
            warnings,
            failure: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(step: impl Into<String>, error: &Error) -> Self {
        Self {
            step: step.into(),
            success: false,
            message: error.message.clone(),
            details: Vec::new(),
            warnings: Vec::new(),
            failure: Some(error.failure_kind()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainJob {
    pub domain: String,
    pub account: String,
    pub status: JobStatus,
    pub step_log: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
}

impl DomainJob {
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim().to_string();
        let account = derive_account(&domain);
        Self {
            domain,
            account,
            status: JobStatus::Pending,
            step_log: Vec::new(),
            failed_step: None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub staging_path: String,
}

impl BackupPolicy {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.source_path.trim().is_empty() {
            missing.push("backup.sourcePath".to_string());
        }
        if self.staging_path.trim().is_empty() {
            missing.push("backup.stagingPath".to_string());
        }

        if !missing.is_empty() {
            return Err(Error::validation_missing_argument(missing)
                .with_hint("Both backup paths are required when backup is enabled"));
        }

        if self.source_path.trim_end_matches('/') == self.staging_path.trim_end_matches('/') {
            return Err(Error::validation_invalid_argument(
                "backup.stagingPath",
                "Staging path must differ from the source path",
                Some(self.staging_path.clone()),
                None,
            ));
        }

        self.check_staging_outside("")
    }

    /// Reject a staging directory that resolves inside `web_root`. The web
    /// root is emptied and cloned into, so nothing may survive there.
    ///
    /// With an empty `web_root` only relative staging paths can be judged.
    pub fn check_staging_outside(&self, web_root: &str) -> Result<()> {
        if !staging_inside_web_root(&self.staging_path, web_root) {
            return Ok(());
        }

        Err(Error::validation_invalid_argument(
            "backup.stagingPath",
            "Staging path must be outside the web root",
            Some(self.staging_path.clone()),
            None,
        )
        .with_hint("Use a sibling directory such as ../backup_images"))
    }
}

/// Whether `staging` lands inside `web_root`. Relative staging paths resolve
/// against the web root. Paths that cannot be resolved lexically (`~`, or an
/// absolute path against a relative root) count as outside.
pub fn staging_inside_web_root(staging: &str, web_root: &str) -> bool {
    let staging = staging.trim();
    let web_root = web_root.trim();
    if staging.is_empty() || staging.starts_with('~') {
        return false;
    }

    let root = Path::new(web_root);
    let resolved = if Path::new(staging).is_absolute() {
        if !root.is_absolute() {
            return false;
        }
        normalize(Path::new(staging))
    } else {
        normalize(&root.join(staging))
    };

    resolved.starts_with(normalize(root)) && !resolved.starts_with("..")
}

fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.into_iter().collect()
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    #[serde(default)]
    pub control_panel_password: String,
    /// Shell password. Falls back to the control panel password when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_password: Option<String>,
    #[serde(default)]
    pub repo_token: String,
    #[serde(default)]
    pub edge_token: String,
    #[serde(default)]
    pub database_password: String,
}

impl CredentialSet {
    pub fn shell_password(&self) -> &str {
        match &self.shell_password {
            Some(password) if !password.is_empty() => password,
            _ => &self.control_panel_password,
        }
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("control_panel_password", &"<redacted>")
            .field("shell_password", &self.shell_password.as_ref().map(|_| "<redacted>"))
            .field("repo_token", &"<redacted>")
            .field("edge_token", &"<redacted>")
            .field("database_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub find: String,
    pub replace: String,
}

impl SubstitutionRule {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseNaming {
    pub name_marker: String,
    pub name_suffix: String,
    pub user_marker: String,
    pub user_suffix: String,
}

impl DatabaseNaming {
    pub fn database_name(&self, account: &str) -> String {
        format!("{}_{}", account, self.name_suffix)
    }

    pub fn database_user(&self, account: &str) -> String {
        format!("{}_{}", account, self.user_suffix)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub shell_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_port: Option<u16>,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub credentials: CredentialSet,
    #[serde(default)]
    pub config_template: String,
    #[serde(default)]
    pub database: DatabaseNaming,
    #[serde(default)]
    pub rules: Vec<SubstitutionRule>,
    #[serde(default)]
    pub seeders: Vec<String>,
    #[serde(default)]
    pub backup: BackupPolicy,
}

impl JobRequest {
    /// Parse a request from JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            Error::validation_invalid_json(
                e,
                Some("parse job request".to_string()),
                Some(raw.chars().take(200).collect::<String>()),
            )
        })
    }

    /// Reject requests the pipeline cannot run. Reports every missing field
    /// at once.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("shellHost", self.shell_host.as_str()),
            ("repoUrl", self.repo_url.as_str()),
            ("configTemplate", self.config_template.as_str()),
            (
                "credentials.controlPanelPassword",
                self.credentials.control_panel_password.as_str(),
            ),
            ("credentials.repoToken", self.credentials.repo_token.as_str()),
            ("credentials.edgeToken", self.credentials.edge_token.as_str()),
            (
                "credentials.databasePassword",
                self.credentials.database_password.as_str(),
            ),
            ("database.userSuffix", self.database.user_suffix.as_str()),
        ];

        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(Error::validation_missing_argument(missing));
        }

        if self.domains.iter().all(|d| d.trim().is_empty()) {
            return Err(Error::validation_invalid_argument(
                "domains",
                "Domain list is empty",
                None,
                None,
            ));
        }

        if !self.repo_url.starts_with("https://") {
            return Err(Error::validation_invalid_argument(
                "repoUrl",
                "Repository URL must use https:// so the token can be embedded",
                Some(self.repo_url.clone()),
                None,
            ));
        }

        self.backup.validate()
    }

    /// Domains in input order, trimmed, blanks removed.
    pub fn domain_list(&self) -> Vec<String> {
        self.domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Parse a domain list file: one domain per line, blank lines and `#`
/// comments skipped.
pub fn parse_domain_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parse `FIND|REPLACE` lines into rules. Splits on the first `|`; lines
/// without one are ignored.
pub fn parse_rules(text: &str) -> Vec<SubstitutionRule> {
    text.lines()
        .filter_map(|line| line.split_once('|'))
        .map(|(find, replace)| SubstitutionRule::new(find, replace))
        .collect()
}

/// Parse a comma-separated seeder list.
pub fn parse_seeders(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> JobRequest {
        JobRequest {
            domains: vec!["example.com".to_string()],
            shell_host: "203.0.113.7".to_string(),
            shell_port: None,
            repo_url: "https://github.com/acme/site.git".to_string(),
            credentials: CredentialSet {
                control_panel_password: "panel".to_string(),
                shell_password: None,
                repo_token: "ghp_token".to_string(),
                edge_token: "cf_token".to_string(),
                database_password: "db-secret".to_string(),
            },
            config_template: "APP_URL=http://localhost\n".to_string(),
            database: DatabaseNaming {
                name_marker: "DB_DATABASE=laravel".to_string(),
                name_suffix: "portal".to_string(),
                user_marker: "DB_USERNAME=root".to_string(),
                user_suffix: "root".to_string(),
            },
            rules: Vec::new(),
            seeders: Vec::new(),
            backup: BackupPolicy::default(),
        }
    }

    #[test]
    fn derive_account_takes_first_label() {
        assert_eq!(derive_account("example.com"), "example");
        assert_eq!(derive_account("shop.example.co.uk"), "shop");
    }

    #[test]
    fn derive_account_truncates_to_sixteen() {
        let account = derive_account("a-very-long-domain-name-here.com");
        assert_eq!(account, "a-very-long-doma");
        assert_eq!(account.chars().count(), 16);
    }

    #[test]
    fn new_job_is_pending_with_empty_log() {
        let job = DomainJob::new("  example.com ");
        assert_eq!(job.domain, "example.com");
        assert_eq!(job.account, "example");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.step_log.is_empty());
    }

    #[test]
    fn shell_password_falls_back_to_panel_password() {
        let mut creds = valid_request().credentials;
        assert_eq!(creds.shell_password(), "panel");
        creds.shell_password = Some("ssh-only".to_string());
        assert_eq!(creds.shell_password(), "ssh-only");
    }

    #[test]
    fn credential_debug_redacts_secrets() {
        let printed = format!("{:?}", valid_request().credentials);
        assert!(!printed.contains("ghp_token"));
        assert!(!printed.contains("db-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn database_naming_joins_with_underscore() {
        let naming = valid_request().database;
        assert_eq!(naming.database_name("example"), "example_portal");
        assert_eq!(naming.database_user("example"), "example_root");
    }

    #[test]
    fn valid_request_passes() {
        valid_request().validate().unwrap();
    }

    #[test]
    fn validate_lists_every_missing_field() {
        let mut request = valid_request();
        request.shell_host.clear();
        request.credentials.edge_token.clear();

        let err = request.validate().unwrap_err();
        let args = err.details["args"].as_array().unwrap();
        assert_eq!(args.len(), 2);
        assert!(err.message.contains("shellHost"));
        assert!(err.message.contains("credentials.edgeToken"));
    }

    #[test]
    fn validate_rejects_blank_domain_list() {
        let mut request = valid_request();
        request.domains = vec!["  ".to_string(), String::new()];
        let err = request.validate().unwrap_err();
        assert_eq!(err.details["field"], "domains");
    }

    #[test]
    fn validate_rejects_non_https_repo() {
        let mut request = valid_request();
        request.repo_url = "git@github.com:acme/site.git".to_string();
        let err = request.validate().unwrap_err();
        assert_eq!(err.details["field"], "repoUrl");
    }

    #[test]
    fn enabled_backup_needs_both_paths() {
        let policy = BackupPolicy {
            enabled: true,
            source_path: "public/assets/img".to_string(),
            staging_path: String::new(),
        };
        let err = policy.validate().unwrap_err();
        assert!(err.message.contains("backup.stagingPath"));
    }

    #[test]
    fn disabled_backup_ignores_paths() {
        BackupPolicy::default().validate().unwrap();
    }

    #[test]
    fn backup_staging_must_differ_from_source() {
        let policy = BackupPolicy {
            enabled: true,
            source_path: "storage/app".to_string(),
            staging_path: "storage/app/".to_string(),
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn staging_inside_web_root_is_rejected() {
        let policy = BackupPolicy {
            enabled: true,
            source_path: "public/assets/img".to_string(),
            staging_path: "backup_images".to_string(),
        };
        let err = policy.validate().unwrap_err();
        assert_eq!(err.details["field"], "backup.stagingPath");
    }

    #[test]
    fn staging_location_is_resolved_against_web_root() {
        assert!(staging_inside_web_root("backup_images", "public_html"));
        assert!(staging_inside_web_root("./storage/backup/", "public_html"));
        assert!(staging_inside_web_root("../public_html/tmp", "public_html"));
        assert!(!staging_inside_web_root("../backup_images", "public_html"));
        assert!(!staging_inside_web_root("../../backup", "public_html"));
        assert!(!staging_inside_web_root("/tmp/backup", "public_html"));
        assert!(!staging_inside_web_root("~/backup", "public_html"));

        assert!(staging_inside_web_root("/home/acme/public_html/tmp", "/home/acme/public_html"));
        assert!(!staging_inside_web_root("/home/acme/backup", "/home/acme/public_html"));
        assert!(!staging_inside_web_root("../backup", "/home/acme/public_html"));

        assert!(staging_inside_web_root("backup", ""));
        assert!(!staging_inside_web_root("../backup", ""));
    }

    #[test]
    fn request_parses_camel_case_json() {
        let raw = r#"{
            "domains": ["a.com", "b.com"],
            "shellHost": "203.0.113.7",
            "repoUrl": "https://github.com/acme/site.git",
            "credentials": {"controlPanelPassword": "p", "repoToken": "t", "edgeToken": "e", "databasePassword": "d"},
            "configTemplate": "APP_URL=http://localhost",
            "database": {"nameMarker": "DB_DATABASE=laravel", "nameSuffix": "app", "userMarker": "DB_USERNAME=root", "userSuffix": "root"},
            "rules": [{"find": "APP_ENV=local", "replace": "APP_ENV=production"}],
            "seeders": ["SeoSettingSeeder"],
            "backup": {"enabled": true, "sourcePath": "public/img", "stagingPath": "../backup_images"}
        }"#;

        let request = JobRequest::from_json(raw).unwrap();
        assert_eq!(request.domain_list(), vec!["a.com", "b.com"]);
        assert_eq!(request.rules[0].replace, "APP_ENV=production");
        assert!(request.backup.enabled);
        request.validate().unwrap();
    }

    #[test]
    fn parse_domain_list_skips_blanks_and_comments() {
        let domains = parse_domain_list("a.com\n\n  b.com  \n# c.com\r\nd.com\r\n");
        assert_eq!(domains, vec!["a.com", "b.com", "d.com"]);
    }

    #[test]
    fn parse_rules_splits_on_first_pipe() {
        let rules = parse_rules("APP_ENV=local|APP_ENV=production\nno pipe here\nA|B|C");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], SubstitutionRule::new("APP_ENV=local", "APP_ENV=production"));
        assert_eq!(rules[1], SubstitutionRule::new("A", "B|C"));
    }

    #[test]
    fn parse_seeders_trims_and_drops_empty() {
        assert_eq!(
            parse_seeders(" SeoSettingSeeder, ,SubdomainSeeder,"),
            vec!["SeoSettingSeeder", "SubdomainSeeder"]
        );
        assert!(parse_seeders("").is_empty());
    }
}
