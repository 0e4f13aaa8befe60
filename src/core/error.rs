use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    ConnectionFailed,
    ConnectionTimeout,

    ProviderRejected,
    ProviderAuthFailed,
    ProviderZoneNotFound,

    SshConnectFailed,
    SshAuthFailed,
    SshSessionLost,

    RemoteCommandTimeout,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

/// Failure classes a pipeline step can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport or timeout failure reaching a provider or host.
    Connection,
    /// Remote call completed but reported a business failure.
    Provider,
    /// Provider rejected the credentials.
    Authentication,
    /// Remote shell could not be established or was lost.
    Session,
    /// Local failure: bad input, I/O, serialization.
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::ConnectionFailed => "connection.failed",
            ErrorCode::ConnectionTimeout => "connection.timeout",

            ErrorCode::ProviderRejected => "provider.rejected",
            ErrorCode::ProviderAuthFailed => "provider.auth_failed",
            ErrorCode::ProviderZoneNotFound => "provider.zone_not_found",

            ErrorCode::SshConnectFailed => "ssh.connect_failed",
            ErrorCode::SshAuthFailed => "ssh.auth_failed",
            ErrorCode::SshSessionLost => "ssh.session_lost",

            ErrorCode::RemoteCommandTimeout => "remote.command_timeout",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ErrorCode::ConnectionFailed | ErrorCode::ConnectionTimeout => FailureKind::Connection,

            ErrorCode::ProviderRejected | ErrorCode::ProviderZoneNotFound => FailureKind::Provider,
            ErrorCode::ProviderAuthFailed => FailureKind::Authentication,

            ErrorCode::SshConnectFailed
            | ErrorCode::SshAuthFailed
            | ErrorCode::SshSessionLost
            | ErrorCode::RemoteCommandTimeout => FailureKind::Session,

            ErrorCode::ConfigInvalidValue
            | ErrorCode::ValidationMissingArgument
            | ErrorCode::ValidationInvalidArgument
            | ErrorCode::ValidationInvalidJson
            | ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => FailureKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTimeoutDetails {
    pub host: String,
    pub user: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFailedDetails {
    pub target: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRejectedDetails {
    pub provider: String,
    pub operation: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshFailureDetails {
    pub host: String,
    pub user: String,
    pub stderr: String,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        self.code.failure_kind()
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let message = format!("Missing required argument(s): {}", args.join(", "));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            message,
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let field = field.into();
        let problem = problem.into();
        let message = format!("Invalid argument '{}': {}", field, problem);
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            message,
            to_details(InvalidArgumentDetails {
                field,
                problem,
                id,
                tried,
            }),
        )
    }

    pub fn validation_invalid_json(
        err: serde_json::Error,
        context: Option<String>,
        input: Option<String>,
    ) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
            "input": input,
        });

        Self::new(
            ErrorCode::ValidationInvalidJson,
            format!("Invalid JSON: {}", err),
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let message = format!("Invalid configuration value: {}", problem);
        Self::new(
            ErrorCode::ConfigInvalidValue,
            message,
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem,
            }),
        )
    }

    pub fn connection_failed(
        target: impl Into<String>,
        error: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        let target = target.into();
        let error = error.into();
        let message = match status {
            Some(code) => format!("Connection error reaching {}: HTTP {}", target, code),
            None => format!("Connection error reaching {}: {}", target, error),
        };
        Self::new(
            ErrorCode::ConnectionFailed,
            message,
            to_details(ConnectionFailedDetails {
                target,
                error,
                status,
            }),
        )
        .retryable(true)
    }

    pub fn connection_timeout(target: impl Into<String>, error: impl Into<String>) -> Self {
        let target = target.into();
        let message = format!("Connection to {} timed out", target);
        Self::new(
            ErrorCode::ConnectionTimeout,
            message,
            to_details(ConnectionFailedDetails {
                target,
                error: error.into(),
                status: None,
            }),
        )
        .retryable(true)
    }

    pub fn provider_rejected(
        provider: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let provider = provider.into();
        let operation = operation.into();
        let reason = reason.into();
        let message = format!("{} rejected {}: {}", provider, operation, reason);
        Self::new(
            ErrorCode::ProviderRejected,
            message,
            to_details(ProviderRejectedDetails {
                provider,
                operation,
                reason,
            }),
        )
    }

    pub fn provider_auth_failed(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        let provider = provider.into();
        let operation = operation.into();
        let message = format!("{} rejected the credentials for {}", provider, operation);
        Self::new(
            ErrorCode::ProviderAuthFailed,
            message,
            to_details(ProviderRejectedDetails {
                provider,
                operation,
                reason: "authentication failed".to_string(),
            }),
        )
    }

    pub fn provider_zone_not_found(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self::new(
            ErrorCode::ProviderZoneNotFound,
            format!("No zone found for {}", domain),
            serde_json::json!({ "domain": domain }),
        )
        .with_hint("Check that the domain is added to the edge provider account the token belongs to")
    }

    pub fn ssh_connect_failed(
        host: impl Into<String>,
        user: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let host = host.into();
        let user = user.into();
        let stderr = stderr.into();
        let message = format!("Could not open SSH session to {}@{}: {}", user, host, stderr.trim());
        Self::new(
            ErrorCode::SshConnectFailed,
            message,
            to_details(SshFailureDetails { host, user, stderr }),
        )
    }

    pub fn ssh_auth_failed(host: impl Into<String>, user: impl Into<String>, stderr: impl Into<String>) -> Self {
        let host = host.into();
        let user = user.into();
        let message = format!("SSH authentication failed for {}@{}", user, host);
        Self::new(
            ErrorCode::SshAuthFailed,
            message,
            to_details(SshFailureDetails {
                host,
                user,
                stderr: stderr.into(),
            }),
        )
    }

    pub fn ssh_session_lost(host: impl Into<String>, user: impl Into<String>, stderr: impl Into<String>) -> Self {
        let host = host.into();
        let user = user.into();
        let message = format!("SSH session to {}@{} was lost", user, host);
        Self::new(
            ErrorCode::SshSessionLost,
            message,
            to_details(SshFailureDetails {
                host,
                user,
                stderr: stderr.into(),
            }),
        )
    }

    /// A remote command ran past its limit and was killed.
    pub fn remote_command_timeout(
        host: impl Into<String>,
        user: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let host = host.into();
        let user = user.into();
        let message = format!(
            "Command on {}@{} timed out after {}s",
            user, host, timeout_secs
        );
        Self::new(
            ErrorCode::RemoteCommandTimeout,
            message,
            to_details(CommandTimeoutDetails {
                host,
                user,
                timeout_secs,
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        Self::new(
            ErrorCode::InternalIoError,
            message,
            to_details(InternalIoErrorDetails { error, context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });
        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}
