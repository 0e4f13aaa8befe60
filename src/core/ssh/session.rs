//! Remote session capability and scoped acquisition.

use crate::error::Result;
use crate::ssh::CommandOutput;

/// Where a domain's shell session goes.
#[derive(Clone)]
pub struct ShellTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Empty means key-based authentication.
    pub password: String,
    /// Directory every command runs in, relative to the account home.
    pub web_root: String,
}

impl std::fmt::Debug for ShellTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("web_root", &self.web_root)
            .finish()
    }
}

/// An established shell session scoped to a working directory.
pub trait RemoteSession {
    /// Run one command in the session's working directory.
    ///
    /// A non-zero exit is returned as output, not an error. `Err` means the
    /// session itself failed.
    fn run(&mut self, command: &str) -> Result<CommandOutput>;

    /// Release the session. Must be safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Opens sessions for shell targets.
pub trait SessionOpener: Send + Sync {
    fn open(&self, target: &ShellTarget) -> Result<Box<dyn RemoteSession>>;
}

/// Session guard: closes on drop unless already finished.
pub struct ScopedSession {
    inner: Option<Box<dyn RemoteSession>>,
    label: String,
}

impl ScopedSession {
    pub fn new(inner: Box<dyn RemoteSession>, label: impl Into<String>) -> Self {
        Self {
            inner: Some(inner),
            label: label.into(),
        }
    }

    pub fn run(&mut self, command: &str) -> Result<CommandOutput> {
        match self.inner.as_mut() {
            Some(session) => session.run(command),
            None => Err(crate::Error::internal_unexpected(format!(
                "session {} already closed",
                self.label
            ))),
        }
    }

    /// Close explicitly, surfacing the close error.
    pub fn finish(mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(mut session) = self.inner.take() {
            if let Err(err) = session.close() {
                log_status!("ssh", "Failed to close session {}: {}", self.label, err);
            }
        }
    }
}

/// Open a session for `target`, run `body`, and close the session on every
/// exit path. A close failure after a successful body is logged, not
/// returned.
pub fn with_session<T>(
    opener: &dyn SessionOpener,
    target: &ShellTarget,
    body: impl FnOnce(&mut ScopedSession) -> Result<T>,
) -> Result<T> {
    let label = format!("{}@{}", target.user, target.host);
    let mut session = ScopedSession::new(opener.open(target)?, label.clone());

    let result = body(&mut session);

    if let Err(err) = session.finish() {
        log_status!("ssh", "Failed to close session {}: {}", label, err);
    }

    result
}
