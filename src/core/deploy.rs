//! Remote deployment: backup, purge, clone, restore and dependency install
//! over one scoped shell session.

use serde::{Deserialize, Serialize};

use crate::defaults::ShellConfig;
use crate::error::{Error, Result};
use crate::job::BackupPolicy;
use crate::ssh::{with_session, ScopedSession, SessionOpener, ShellTarget};
use crate::utils::shell;
use crate::utils::template::{self, TemplateVars};

/// Shown in place of the repository token in every log line.
const REDACTED: &str = "***";

/// Command templates for the remote steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommands {
    /// Receives `{{repoUrl}}`.
    pub clone: String,
    pub install: String,
    pub migrate: String,
    /// Receives `{{seeder}}`, already shell-quoted.
    pub seed: String,
}

impl From<&ShellConfig> for ShellCommands {
    fn from(config: &ShellConfig) -> Self {
        Self {
            clone: config.clone_command.clone(),
            install: config.install_command.clone(),
            migrate: config.migrate_command.clone(),
            seed: config.seed_command.clone(),
        }
    }
}

impl ShellCommands {
    /// Reject templates missing the placeholder their step substitutes.
    pub fn validate(&self) -> Result<()> {
        for (key, value, placeholder) in [
            ("defaults.shell.clone_command", &self.clone, TemplateVars::REPO_URL),
            ("defaults.shell.seed_command", &self.seed, TemplateVars::SEEDER),
        ] {
            if !template::is_present(value, placeholder) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(value.clone()),
                    format!("{} must contain {{{{{}}}}}", key, placeholder),
                ));
            }
        }
        Ok(())
    }
}

/// Repository to clone and the access token that authenticates it.
#[derive(Clone)]
pub struct RepoSource {
    pub url: String,
    pub token: String,
}

impl RepoSource {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    /// `https://<token>@host/...`. URLs without a token or an https scheme
    /// are returned unchanged.
    pub fn authenticated_url(&self) -> String {
        self.url_with_credential(&self.token)
    }

    /// Same shape as `authenticated_url` with the token masked.
    pub fn display_url(&self) -> String {
        self.url_with_credential(REDACTED)
    }

    fn url_with_credential(&self, credential: &str) -> String {
        if self.token.is_empty() {
            return self.url.clone();
        }
        match self.url.strip_prefix("https://") {
            Some(rest) => format!("https://{}@{}", credential, rest),
            None => self.url.clone(),
        }
    }
}

/// One executed command and how it exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub label: String,
    /// The command as shown to operators (secrets masked).
    pub command: String,
    pub exit_code: i32,
}

impl CommandRecord {
    /// A non-zero exit is recorded and reported, never fatal.
    pub fn is_warning(&self) -> bool {
        self.exit_code != 0
    }

    pub fn log_line(&self) -> String {
        format!("{}: `{}` (exit code {})", self.label, self.command, self.exit_code)
    }
}

/// Log lines for every record, in execution order.
pub fn log_lines(records: &[CommandRecord]) -> Vec<String> {
    records.iter().map(CommandRecord::log_line).collect()
}

/// Log lines for records that exited non-zero.
pub fn warnings(records: &[CommandRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.is_warning())
        .map(CommandRecord::log_line)
        .collect()
}

/// Run `command` and record it under `display`. Only a session failure is an
/// error.
pub(crate) fn run_recorded(
    session: &mut ScopedSession,
    label: &str,
    command: &str,
    display: &str,
) -> Result<CommandRecord> {
    let output = session.run(command)?;

    if !output.success {
        let stderr = output.stderr.trim();
        if stderr.is_empty() {
            log_status!("deploy", "{} exited with code {}", label, output.exit_code);
        } else {
            log_status!("deploy", "{} exited with code {}: {}", label, output.exit_code, stderr);
        }
    }

    Ok(CommandRecord {
        label: label.to_string(),
        command: display.to_string(),
        exit_code: output.exit_code,
    })
}

/// Deploy the repository into the target's web root.
///
/// Every sub-step is attempted even when an earlier command exits non-zero.
/// The session is released on every exit path.
pub fn deploy_site(
    opener: &dyn SessionOpener,
    target: &ShellTarget,
    repo: &RepoSource,
    backup: &BackupPolicy,
    commands: &ShellCommands,
) -> Result<Vec<CommandRecord>> {
    let backup_active = is_backup_active(backup);
    if backup_active {
        backup.check_staging_outside(&target.web_root)?;
    }

    with_session(opener, target, |session| {
        let mut records = Vec::new();

        if backup_active {
            let cmd = copy_tree_command(&backup.source_path, &backup.staging_path);
            log_status!("deploy", "Backing up {} to {}", backup.source_path, backup.staging_path);
            records.push(run_recorded(session, "backup", &cmd, &cmd)?);
        }

        let cmd = purge_command(backup_active.then_some(backup.staging_path.as_str()));
        log_status!("deploy", "Purging {}", target.web_root);
        records.push(run_recorded(session, "purge", &cmd, &cmd)?);

        let clone = template::render(&commands.clone, &[(TemplateVars::REPO_URL, &repo.authenticated_url())]);
        let clone_display = template::render(&commands.clone, &[(TemplateVars::REPO_URL, &repo.display_url())]);
        log_status!("deploy", "Cloning {}", repo.display_url());
        records.push(run_recorded(session, "clone", &clone, &clone_display)?);

        if backup_active {
            let cmd = copy_tree_command(&backup.staging_path, &backup.source_path);
            log_status!("deploy", "Restoring {} from {}", backup.source_path, backup.staging_path);
            records.push(run_recorded(session, "restore", &cmd, &cmd)?);

            let cmd = format!("rm -rf {}", shell::quote_path(&backup.staging_path));
            records.push(run_recorded(session, "cleanup", &cmd, &cmd)?);
        }

        log_status!("deploy", "Installing dependencies");
        records.push(run_recorded(session, "install", &commands.install, &commands.install)?);

        Ok(records)
    })
}

fn is_backup_active(backup: &BackupPolicy) -> bool {
    backup.enabled && !backup.source_path.trim().is_empty() && !backup.staging_path.trim().is_empty()
}

/// `mkdir -p <to> && cp -R <from>/. <to>/` (copies dotfiles too).
fn copy_tree_command(from: &str, to: &str) -> String {
    let from = from.trim_end_matches('/');
    let to = to.trim_end_matches('/');
    format!(
        "mkdir -p {to} && cp -R {from}/. {to}/",
        to = shell::quote_path(to),
        from = shell::quote_path(from)
    )
}

/// Remove every entry directly inside the working directory except one named
/// like the staging directory.
fn purge_command(staging: Option<&str>) -> String {
    let keep = staging
        .map(|path| shell::base_name(path.trim()))
        .filter(|name| !name.is_empty());

    match keep {
        Some(keep) => format!(
            "find . -mindepth 1 -maxdepth 1 ! -name {} -exec rm -rf {{}} +",
            shell::quote_path(keep)
        ),
        None => "find . -mindepth 1 -maxdepth 1 -exec rm -rf {} +".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{LocalSession, RemoteSession};
    use crate::testing::{FakeOpener, ScriptedShell};
    use std::path::PathBuf;

    fn target() -> ShellTarget {
        ShellTarget {
            host: "203.0.113.7".to_string(),
            port: 22,
            user: "example".to_string(),
            password: "secret".to_string(),
            web_root: "public_html".to_string(),
        }
    }

    fn commands() -> ShellCommands {
        ShellCommands::from(&crate::defaults::builtin_defaults().shell)
    }

    fn repo() -> RepoSource {
        RepoSource::new("https://github.com/acme/site.git", "ghp_secret123")
    }

    fn backup(staging: &str) -> BackupPolicy {
        BackupPolicy {
            enabled: true,
            source_path: "public/images".to_string(),
            staging_path: staging.to_string(),
        }
    }

    #[test]
    fn token_is_embedded_and_masked() {
        assert_eq!(
            repo().authenticated_url(),
            "https://ghp_secret123@github.com/acme/site.git"
        );
        assert_eq!(repo().display_url(), "https://***@github.com/acme/site.git");
    }

    #[test]
    fn empty_token_leaves_url_alone() {
        let repo = RepoSource::new("https://github.com/acme/site.git", "");
        assert_eq!(repo.authenticated_url(), "https://github.com/acme/site.git");
    }

    #[test]
    fn sub_steps_run_in_order() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());

        let records = deploy_site(&opener, &target(), &repo(), &backup("../backup_images"), &commands()).unwrap();

        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["backup", "purge", "clone", "restore", "cleanup", "install"]);
        assert_eq!(shell.commands().len(), 6);
        assert!(shell.commands()[1].contains("! -name 'backup_images'"));
        assert_eq!(shell.closes(), 1);
    }

    #[test]
    fn no_backup_skips_backup_and_restore() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());

        let records = deploy_site(&opener, &target(), &repo(), &BackupPolicy::default(), &commands()).unwrap();

        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["purge", "clone", "install"]);
        assert!(!shell.commands()[0].contains("! -name"));
    }

    #[test]
    fn non_zero_exit_is_a_warning() {
        let shell = ScriptedShell::default().exit_with("git clone", 128);
        let opener = FakeOpener::new(shell.clone());

        let records = deploy_site(&opener, &target(), &repo(), &BackupPolicy::default(), &commands()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(warnings(&records).len(), 1);
        assert!(warnings(&records)[0].contains("(exit code 128)"));
        assert!(records[2].label == "install");
    }

    #[test]
    fn token_never_logged() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());

        let records = deploy_site(&opener, &target(), &repo(), &BackupPolicy::default(), &commands()).unwrap();

        assert!(shell.commands().iter().any(|c| c.contains("ghp_secret123")));
        assert!(log_lines(&records).iter().all(|l| !l.contains("ghp_secret123")));
    }

    #[test]
    fn session_loss_fails_and_closes() {
        let shell = ScriptedShell::default().lose_session_on("git clone");
        let opener = FakeOpener::new(shell.clone());

        let err = deploy_site(&opener, &target(), &repo(), &BackupPolicy::default(), &commands()).unwrap_err();

        assert_eq!(err.failure_kind(), crate::FailureKind::Session);
        assert_eq!(shell.closes(), 1);
        assert!(!shell.commands().iter().any(|c| c.contains("composer")));
    }

    #[test]
    fn purge_keeps_staging_base_name() {
        assert!(purge_command(Some("../backup_images/")).contains("! -name 'backup_images'"));
        assert!(!purge_command(Some("  ")).contains("! -name"));
        assert!(!purge_command(None).contains("! -name"));
    }

    #[test]
    fn staging_inside_web_root_opens_no_session() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::new(shell.clone());

        let err = deploy_site(&opener, &target(), &repo(), &backup("backup_images"), &commands()).unwrap_err();

        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
        assert!(opener.opened().is_empty());
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn copy_includes_dotfiles() {
        assert_eq!(
            copy_tree_command("public/images/", "backup_images"),
            "mkdir -p 'backup_images' && cp -R 'public/images'/. 'backup_images'/"
        );
    }

    struct LocalOpener(PathBuf);

    impl SessionOpener for LocalOpener {
        fn open(&self, target: &ShellTarget) -> crate::Result<Box<dyn RemoteSession>> {
            Ok(Box::new(LocalSession::open(&target.user, &self.0, std::time::Duration::from_secs(120))?))
        }
    }

    /// Default clone command, no-op install.
    fn local_commands() -> ShellCommands {
        ShellCommands {
            install: "true".to_string(),
            ..commands()
        }
    }

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=deckhand", "-c", "user.email=deckhand@example.com"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?}", args);
    }

    /// Local repository holding `index.php` and an empty `public/images`.
    fn site_repo(dir: &std::path::Path) -> RepoSource {
        let repo = dir.join("repo");
        std::fs::create_dir_all(repo.join("public")).unwrap();
        std::fs::write(repo.join("index.php"), "fresh").unwrap();
        std::fs::write(repo.join("public/robots.txt"), "User-agent: *").unwrap();
        git(&repo, &["init", "-q"]);
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-q", "-m", "site"]);
        RepoSource::new(repo.display().to_string(), "")
    }

    fn seed_site(root: &std::path::Path) {
        std::fs::create_dir_all(root.join("public/images")).unwrap();
        std::fs::write(root.join("public/images/logo.png"), "logo").unwrap();
        std::fs::write(root.join("public/images/.keep"), "").unwrap();
        std::fs::write(root.join("old.txt"), "stale").unwrap();
    }

    #[test]
    fn git_clone_and_backup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site");
        seed_site(&root);
        let repo = site_repo(dir.path());

        let records = deploy_site(
            &LocalOpener(root.clone()),
            &target(),
            &repo,
            &backup("../staging"),
            &local_commands(),
        )
        .unwrap();

        assert!(warnings(&records).is_empty(), "{:?}", records);
        assert_eq!(std::fs::read_to_string(root.join("index.php")).unwrap(), "fresh");
        assert!(root.join(".git").is_dir());
        assert!(root.join("public/robots.txt").exists());
        assert!(!root.join("old.txt").exists());
        assert_eq!(
            std::fs::read_to_string(root.join("public/images/logo.png")).unwrap(),
            "logo"
        );
        assert!(root.join("public/images/.keep").exists());
        assert!(!dir.path().join("staging").exists());
    }

    #[test]
    fn git_clone_without_backup_replaces_site() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site");
        seed_site(&root);
        let repo = site_repo(dir.path());

        let records = deploy_site(
            &LocalOpener(root.clone()),
            &target(),
            &repo,
            &BackupPolicy::default(),
            &local_commands(),
        )
        .unwrap();

        assert!(warnings(&records).is_empty(), "{:?}", records);
        assert!(root.join("index.php").exists());
        assert!(!root.join("public/images").exists());
    }

    #[test]
    fn open_failure_runs_nothing() {
        let shell = ScriptedShell::default();
        let opener = FakeOpener::failing(shell.clone());

        let err: Error = deploy_site(&opener, &target(), &repo(), &BackupPolicy::default(), &commands()).unwrap_err();
        assert_eq!(err.failure_kind(), crate::FailureKind::Session);
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn validate_requires_placeholders() {
        commands().validate().unwrap();

        let mut broken = commands();
        broken.clone = "git clone . ".to_string();
        let err = broken.validate().unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidValue);
        assert!(err.message.contains("clone_command"));
    }
}
