use std::io::Read;
use std::path::Path;

pub type CmdResult<T> = deckhand::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

// ============================================================================
// JSON Input Parsing (CLI layer)
// ============================================================================

/// Read JSON spec from string, file (@path), or stdin (-).
pub(crate) fn read_json_spec_to_string(spec: &str) -> deckhand::Result<String> {
    if spec.trim() == "-" {
        let mut buf = String::new();
        if crate::tty::is_stdin_tty() {
            return Err(deckhand::Error::validation_invalid_argument(
                "spec",
                "Cannot read JSON from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        std::io::stdin().read_to_string(&mut buf).map_err(|e| {
            deckhand::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(deckhand::Error::validation_invalid_argument(
                "spec",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }
        return std::fs::read_to_string(Path::new(path)).map_err(|e| {
            deckhand::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
        });
    }

    Ok(spec.to_string())
}

pub mod config;
pub mod deploy;
pub mod file;
pub mod render;

pub(crate) fn run_raw(
    command: crate::Commands,
    _global: &GlobalArgs,
) -> deckhand::Result<(String, i32)> {
    match command {
        crate::Commands::Render(args) => render::run_raw(args),
        _ => Err(deckhand::Error::validation_invalid_argument(
            "output_mode",
            "Command does not support raw output",
            None,
            None,
        )),
    }
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (deckhand::Result<serde_json::Value>, i32) {
    crate::tty::status("deckhand is working...");

    match command {
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::PushFile(args) => dispatch!(args, global, file),
        crate::Commands::Config(args) => dispatch!(args, global, config),

        // Render uses raw output mode
        crate::Commands::Render(_) => {
            let err = deckhand::Error::validation_invalid_argument(
                "output_mode",
                "Render command uses raw output mode",
                None,
                None,
            );
            crate::output::map_cmd_result_to_json::<serde_json::Value>(Err(err))
        }
    }
}
