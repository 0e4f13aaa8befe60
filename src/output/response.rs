//! JSON envelope written to stdout and the process exit code.
//!
//! Every command prints exactly one envelope. Errors carry their dotted code
//! and failure class so scripts can branch without parsing messages.

use std::io::{self, Write};

use deckhand::error::Hint;
use deckhand::{Error, ErrorCode, FailureKind, Result};
use serde::Serialize;

/// Bad input or configuration. Nothing was contacted.
pub const EXIT_INVALID_INPUT: i32 = 2;
/// A shell session failed to open, was lost, or a command timed out.
pub const EXIT_SESSION: i32 = 10;
/// A provider or host was unreachable or refused the call.
pub const EXIT_REMOTE: i32 = 20;
/// Local failure.
pub const EXIT_INTERNAL: i32 = 1;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: &'static str,
    pub failure: FailureKind,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl From<&Error> for CliError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str(),
            failure: err.failure_kind(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: err.hints.clone(),
            retryable: err.retryable,
        }
    }
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError::from(err)),
        }
    }
}

/// Exit code for a failed command, by failure class. Validation and config
/// errors are split out of the internal class since nothing ran.
pub fn exit_code_for(err: &Error) -> i32 {
    match err.failure_kind() {
        FailureKind::Session => EXIT_SESSION,
        FailureKind::Connection | FailureKind::Provider | FailureKind::Authentication => EXIT_REMOTE,
        FailureKind::Internal if is_input_error(err.code) => EXIT_INVALID_INPUT,
        FailureKind::Internal => EXIT_INTERNAL,
    }
}

fn is_input_error(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::ConfigInvalidValue
            | ErrorCode::ValidationMissingArgument
            | ErrorCode::ValidationInvalidArgument
            | ErrorCode::ValidationInvalidJson
    )
}

fn write_response<T: Serialize>(writer: &mut impl Write, response: &CliResponse<T>) -> Result<()> {
    let payload = serde_json::to_string_pretty(response)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize response".to_string())))?;

    match writeln!(writer, "{}", payload) {
        Ok(()) => Ok(()),
        // Reader went away (e.g. piped into `head`).
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(Error::internal_io(e.to_string(), Some("write stdout".to_string()))),
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    write_response(&mut io::stdout().lock(), response)
}

pub fn print_result<T: Serialize>(result: Result<T>) -> Result<()> {
    match result {
        Ok(data) => print_response(&CliResponse::success(data)),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    }
}

pub fn print_json_result(result: Result<serde_json::Value>) -> Result<()> {
    print_result(result)
}

/// Serialize a command's output, keeping its own exit code, or map its error.
pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                EXIT_INTERNAL,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for(&err);
            (Err(err), exit_code)
        }
    }
}
