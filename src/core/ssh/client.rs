use crate::defaults::ShellConfig;
use crate::error::{Error, Result};
use crate::ssh::{RemoteSession, SessionOpener, ShellTarget};
use crate::utils::{io, shell};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

/// Exit status ssh uses for its own failures (not the remote command's).
const SSH_ERROR_EXIT: i32 = 255;

/// sshpass exit code for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// How often a running command is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Opens OpenSSH sessions, or local sessions for localhost targets.
pub struct SshOpener {
    config: ShellConfig,
}

impl SshOpener {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl SessionOpener for SshOpener {
    fn open(&self, target: &ShellTarget) -> Result<Box<dyn RemoteSession>> {
        if is_local_host(&target.host) {
            log_status!("ssh", "Host '{}' is localhost, using local execution", target.host);
            let root = resolve_local_root(&target.web_root);
            let session = LocalSession::open(&target.user, &root, command_timeout(&self.config))?;
            return Ok(Box::new(session));
        }

        Ok(Box::new(SshSession::open(target, &self.config)?))
    }
}

/// One multiplexed OpenSSH connection (ControlMaster socket).
///
/// The master authenticates once. Every command reuses it and runs inside the
/// web root. The master is shut down by `close` or on drop.
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    web_root: String,
    control_path: PathBuf,
    log_path: PathBuf,
    command_timeout: Duration,
    open: bool,
}

impl SshSession {
    pub fn open(target: &ShellTarget, config: &ShellConfig) -> Result<Self> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let control_path = std::env::temp_dir().join(format!("deckhand-{}.sock", &id[..12]));
        let log_path = std::env::temp_dir().join(format!("deckhand-{}.log", &id[..12]));

        let mut args = vec![
            "-M".to_string(),
            "-S".to_string(),
            control_path.display().to_string(),
            "-f".to_string(),
            "-N".to_string(),
            "-E".to_string(),
            log_path.display().to_string(),
        ];
        args.extend(connection_options(config.connect_timeout_secs));
        args.extend([
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
        ]);

        let mut cmd = if target.password.is_empty() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
            Command::new("ssh")
        } else {
            args.extend([
                "-o".to_string(),
                "NumberOfPasswordPrompts=1".to_string(),
                "-o".to_string(),
                "PreferredAuthentications=password,keyboard-interactive".to_string(),
            ]);
            let mut cmd = Command::new("sshpass");
            cmd.args(["-e", "ssh"]).env("SSHPASS", &target.password);
            cmd
        };

        args.extend(port_args(target.port));
        args.push(format!("{}@{}", target.user, target.host));

        log_status!("ssh", "Opening session to {}@{}", target.user, target.host);

        // Output goes to the -E log: the backgrounded master would otherwise
        // hold captured pipes open.
        let status = cmd
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                let program = if target.password.is_empty() { "ssh" } else { "sshpass" };
                Error::ssh_connect_failed(&target.host, &target.user, format!("{}: {}", program, e))
                    .with_hint("Install sshpass for password authentication, or omit the shell password to use SSH keys")
            })?;

        let diagnostics = std::fs::read_to_string(&log_path).unwrap_or_default();
        let _ = std::fs::remove_file(&log_path);

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let stderr = if diagnostics.trim().is_empty() {
                format!("exit code {}", code)
            } else {
                diagnostics
            };

            if code == SSHPASS_BAD_PASSWORD && !target.password.is_empty() {
                return Err(Error::ssh_auth_failed(&target.host, &target.user, stderr));
            }
            if stderr.contains("Permission denied") {
                return Err(Error::ssh_auth_failed(&target.host, &target.user, stderr));
            }
            return Err(Error::ssh_connect_failed(&target.host, &target.user, stderr));
        }

        Ok(Self {
            host: target.host.clone(),
            user: target.user.clone(),
            port: target.port,
            web_root: target.web_root.clone(),
            control_path,
            log_path,
            command_timeout: command_timeout(config),
            open: true,
        })
    }

    fn control_args(&self) -> Vec<String> {
        let mut args = vec!["-S".to_string(), self.control_path.display().to_string()];
        args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        args.extend(port_args(self.port));
        args.push(format!("{}@{}", self.user, self.host));
        args
    }
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.open {
            return Err(Error::ssh_session_lost(&self.host, &self.user, "session already closed"));
        }

        let scoped = format!("cd {} && {}", shell::quote_path(&self.web_root), command);
        let mut args = self.control_args();
        args.push(scoped);

        let output = output_with_deadline(Command::new("ssh").args(&args), self.command_timeout)
            .map_err(|e| Error::ssh_session_lost(&self.host, &self.user, e.to_string()))?
            .ok_or_else(|| {
                Error::remote_command_timeout(&self.host, &self.user, self.command_timeout.as_secs())
            })?;

        let out = CommandOutput::from(output);

        if out.exit_code == SSH_ERROR_EXIT && is_connection_failure(&out.stderr) {
            return Err(Error::ssh_session_lost(&self.host, &self.user, out.stderr));
        }

        Ok(out)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let mut args = vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
        ];
        args.extend(port_args(self.port));
        args.push(format!("{}@{}", self.user, self.host));

        let result = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .output();

        let _ = std::fs::remove_file(&self.control_path);
        let _ = std::fs::remove_file(&self.log_path);

        match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(Error::ssh_session_lost(
                &self.host,
                &self.user,
                String::from_utf8_lossy(&out.stderr).to_string(),
            )),
            Err(e) => Err(Error::ssh_session_lost(&self.host, &self.user, e.to_string())),
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Session that runs commands through the local shell, rooted in a directory.
pub struct LocalSession {
    user: String,
    root: PathBuf,
    command_timeout: Duration,
}

impl LocalSession {
    pub fn open(user: &str, root: &Path, command_timeout: Duration) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::ssh_connect_failed(
                "localhost",
                user,
                format!("web root {} does not exist", root.display()),
            ));
        }

        Ok(Self {
            user: user.to_string(),
            root: root.to_path_buf(),
            command_timeout,
        })
    }
}

impl RemoteSession for LocalSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let mut cmd = local_shell(command);
        cmd.current_dir(&self.root);

        match output_with_deadline(&mut cmd, self.command_timeout) {
            Ok(Some(output)) => Ok(CommandOutput::from(output)),
            Ok(None) => Err(Error::remote_command_timeout(
                "localhost",
                &self.user,
                self.command_timeout.as_secs(),
            )),
            // The shell could not start; report it like a failed command.
            Err(e) => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("Command error: {}", e),
                success: false,
                exit_code: -1,
            }),
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

fn command_timeout(config: &ShellConfig) -> Duration {
    Duration::from_secs(config.command_timeout_secs.max(1))
}

/// Run `cmd` with captured output, killing it once `limit` has passed.
///
/// `Ok(None)` means the command was killed at the deadline.
fn output_with_deadline(cmd: &mut Command, limit: Duration) -> std::io::Result<Option<Output>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Pipes are drained concurrently so a chatty command never blocks on a
    // full pipe while we poll.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + limit;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                // Orphaned grandchildren may still hold the pipes open, so
                // the drain threads are not joined.
                return Ok(None);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(e);
            }
        }
    };

    Ok(Some(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn connection_options(connect_timeout_secs: u64) -> Vec<String> {
    vec![
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout_secs),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-o".to_string(),
        "ServerAliveCountMax=3".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ]
}

fn port_args(port: u16) -> Vec<String> {
    if port == 22 {
        Vec::new()
    } else {
        vec!["-p".to_string(), port.to_string()]
    }
}

fn resolve_local_root(web_root: &str) -> PathBuf {
    if Path::new(web_root).is_absolute() || web_root.starts_with('~') {
        io::expand_path(web_root)
    } else {
        io::expand_path(&format!("~/{}", web_root))
    }
}

fn local_shell(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if ssh stderr describes a broken connection rather than a remote
/// command failure.
fn is_connection_failure(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();

    let patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "broken pipe",
        "control socket connect",
        "mux_client_request_session",
        "connection closed by remote host",
    ];

    patterns.iter().any(|p| stderr.contains(p))
}
