//! In-memory capability fakes for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cloudflare::EdgeProvider;
use crate::cpanel::{ControlPanel, PanelAuth};
use crate::error::{Error, Result};
use crate::ssh::{CommandOutput, RemoteSession, SessionOpener, ShellTarget};

#[derive(Default)]
struct ShellState {
    commands: Vec<String>,
    closes: usize,
    exit_codes: Vec<(String, i32)>,
    lose_session_on: Option<String>,
}

/// Records commands and answers with scripted exit codes.
#[derive(Clone, Default)]
pub struct ScriptedShell {
    state: Arc<Mutex<ShellState>>,
}

impl ScriptedShell {
    /// Commands containing `needle` exit with `code`.
    pub fn exit_with(self, needle: &str, code: i32) -> Self {
        self.state
            .lock()
            .unwrap()
            .exit_codes
            .push((needle.to_string(), code));
        self
    }

    /// Commands containing `needle` fail at the session level.
    pub fn lose_session_on(self, needle: &str) -> Self {
        self.state.lock().unwrap().lose_session_on = Some(needle.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl RemoteSession for ScriptedShell {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());

        if let Some(needle) = &state.lose_session_on {
            if command.contains(needle.as_str()) {
                return Err(Error::ssh_session_lost("fake", "fake", "connection reset"));
            }
        }

        let exit_code = state
            .exit_codes
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        Ok(CommandOutput {
            stdout: String::new(),
            stderr: if exit_code == 0 { String::new() } else { "scripted failure".to_string() },
            success: exit_code == 0,
            exit_code,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Hands out the same scripted shell for every open.
pub struct FakeOpener {
    shell: ScriptedShell,
    fail_all: bool,
    fail_users: Vec<String>,
    opened: Mutex<Vec<String>>,
}

impl FakeOpener {
    pub fn new(shell: ScriptedShell) -> Self {
        Self {
            shell,
            fail_all: false,
            fail_users: Vec::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(shell: ScriptedShell) -> Self {
        Self {
            fail_all: true,
            ..Self::new(shell)
        }
    }

    pub fn failing_for(shell: ScriptedShell, users: &[&str]) -> Self {
        Self {
            fail_users: users.iter().map(|u| u.to_string()).collect(),
            ..Self::new(shell)
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl SessionOpener for FakeOpener {
    fn open(&self, target: &ShellTarget) -> Result<Box<dyn RemoteSession>> {
        if self.fail_all || self.fail_users.contains(&target.user) {
            return Err(Error::ssh_connect_failed(&target.host, &target.user, "Connection refused"));
        }
        self.opened.lock().unwrap().push(target.user.clone());
        Ok(Box::new(self.shell.clone()))
    }
}

/// Control panel that records calls and fails for chosen domains.
#[derive(Default)]
pub struct FakePanel {
    pub fail_password_for: Vec<String>,
    pub fail_save_for: Vec<String>,
    calls: Mutex<Vec<String>>,
    saved: Mutex<Vec<(String, String, String, String)>>,
}

impl FakePanel {
    pub fn failing_password_for(domains: &[&str]) -> Self {
        Self {
            fail_password_for: domains.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_save_for(domains: &[&str]) -> Self {
        Self {
            fail_save_for: domains.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// `(domain, dir, file, content)` for every successful save.
    pub fn saved(&self) -> Vec<(String, String, String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

impl ControlPanel for FakePanel {
    fn set_database_password(
        &self,
        auth: &PanelAuth<'_>,
        db_user: &str,
        _password: &str,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("password:{}:{}", auth.domain, db_user));

        if self.fail_password_for.iter().any(|d| d == auth.domain) {
            return Err(Error::provider_rejected(
                "cPanel",
                "set password",
                format!("The user \"{}\" does not exist.", db_user),
            ));
        }
        Ok(format!("Database password for {} updated", db_user))
    }

    fn save_file(
        &self,
        auth: &PanelAuth<'_>,
        dir: &str,
        file: &str,
        content: &str,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("save:{}:{}/{}", auth.domain, dir, file));

        if self.fail_save_for.iter().any(|d| d == auth.domain) {
            return Err(Error::connection_failed(
                format!("https://{}:2083", auth.domain),
                "connection refused",
                None,
            ));
        }

        self.saved.lock().unwrap().push((
            auth.domain.to_string(),
            dir.to_string(),
            file.to_string(),
            content.to_string(),
        ));
        Ok(format!("File {}/{} written", dir, file))
    }
}

/// Edge provider with a fixed zone table.
#[derive(Default)]
pub struct FakeEdge {
    zones: HashMap<String, String>,
    modes: Mutex<Vec<(String, String)>>,
}

impl FakeEdge {
    pub fn with_zones(domains: &[&str]) -> Self {
        Self {
            zones: domains
                .iter()
                .map(|d| (d.to_string(), format!("zone-{}", d)))
                .collect(),
            modes: Mutex::new(Vec::new()),
        }
    }

    pub fn modes(&self) -> Vec<(String, String)> {
        self.modes.lock().unwrap().clone()
    }
}

impl EdgeProvider for FakeEdge {
    fn find_zone_id(&self, domain: &str) -> Result<String> {
        self.zones
            .get(domain)
            .cloned()
            .ok_or_else(|| Error::provider_zone_not_found(domain))
    }

    fn set_tls_mode(&self, zone_id: &str, mode: &str) -> Result<String> {
        self.modes
            .lock()
            .unwrap()
            .push((zone_id.to_string(), mode.to_string()));
        Ok(mode.to_string())
    }
}
