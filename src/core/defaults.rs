use serde::{Deserialize, Serialize};
use std::fs;

use crate::paths;

/// Root configuration structure for deckhand.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeckhandConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via deckhand.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_control_panel")]
    pub control_panel: ControlPanelConfig,

    #[serde(default = "default_edge")]
    pub edge: EdgeConfig,

    #[serde(default = "default_shell")]
    pub shell: ShellConfig,

    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            control_panel: default_control_panel(),
            edge: default_edge(),
            shell: default_shell(),
            pipeline: default_pipeline(),
        }
    }
}

/// Control panel (cPanel UAPI) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPanelConfig {
    #[serde(default = "default_control_panel_port")]
    pub port: u16,

    /// Shared hosts usually serve the panel on a self-signed certificate.
    #[serde(default)]
    pub verify_tls: bool,

    #[serde(default = "default_password_timeout_secs")]
    pub password_timeout_secs: u64,

    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,

    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    #[serde(default = "default_config_file")]
    pub config_file: String,
}

/// Edge/DNS provider (Cloudflare) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_edge_api_base")]
    pub api_base: String,

    #[serde(default = "default_edge_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_tls_mode")]
    pub tls_mode: String,
}

/// Remote shell settings and the command templates run inside the web root.
///
/// Templates use `{{var}}` placeholders rendered by `utils::template::render`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_web_root")]
    pub web_root: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Longest any single remote command may run before it is killed.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_clone_command")]
    pub clone_command: String,

    #[serde(default = "default_install_command")]
    pub install_command: String,

    #[serde(default = "default_migrate_command")]
    pub migrate_command: String,

    #[serde(default = "default_seed_command")]
    pub seed_command: String,
}

/// Batch scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pause after every remote or API call, for third-party rate limits.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_control_panel() -> ControlPanelConfig {
    ControlPanelConfig {
        port: default_control_panel_port(),
        verify_tls: false,
        password_timeout_secs: default_password_timeout_secs(),
        file_timeout_secs: default_file_timeout_secs(),
        config_dir: default_config_dir(),
        config_file: default_config_file(),
    }
}

fn default_control_panel_port() -> u16 {
    2083
}

fn default_password_timeout_secs() -> u64 {
    20
}

fn default_file_timeout_secs() -> u64 {
    30
}

fn default_config_dir() -> String {
    "public_html".to_string()
}

fn default_config_file() -> String {
    ".env".to_string()
}

fn default_edge() -> EdgeConfig {
    EdgeConfig {
        api_base: default_edge_api_base(),
        timeout_secs: default_edge_timeout_secs(),
        tls_mode: default_tls_mode(),
    }
}

fn default_edge_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_edge_timeout_secs() -> u64 {
    10
}

fn default_tls_mode() -> String {
    "strict".to_string()
}

fn default_shell() -> ShellConfig {
    ShellConfig {
        port: default_ssh_port(),
        web_root: default_web_root(),
        connect_timeout_secs: default_connect_timeout_secs(),
        command_timeout_secs: default_command_timeout_secs(),
        clone_command: default_clone_command(),
        install_command: default_install_command(),
        migrate_command: default_migrate_command(),
        seed_command: default_seed_command(),
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_web_root() -> String {
    "public_html".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    900
}

fn default_clone_command() -> String {
    "git clone {{repoUrl}} .".to_string()
}

fn default_install_command() -> String {
    "php /opt/cpanel/ea-php81/root/usr/bin/composer install --no-dev --optimize-autoloader"
        .to_string()
}

fn default_migrate_command() -> String {
    "php artisan migrate --force".to_string()
}

fn default_seed_command() -> String {
    "php artisan db:seed --class={{seeder}} --force".to_string()
}

fn default_pipeline() -> PipelineConfig {
    PipelineConfig {
        step_delay_ms: default_step_delay_ms(),
        workers: default_workers(),
    }
}

fn default_step_delay_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    1
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If deckhand.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full deckhand.json config, falling back to defaults on any error.
pub fn load_config() -> DeckhandConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> crate::Result<DeckhandConfig> {
    let path = paths::deckhand_json()?;

    if !path.exists() {
        return Err(crate::Error::other("deckhand.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_config(&content)
}

fn parse_config(content: &str) -> crate::Result<DeckhandConfig> {
    serde_json::from_str(content).map_err(|e| {
        crate::Error::validation_invalid_json(e, Some("parse deckhand.json".to_string()), None)
    })
}

/// Delete deckhand.json file (reset to defaults)
pub fn reset_config() -> crate::Result<bool> {
    let path = paths::deckhand_json()?;

    if path.exists() {
        fs::remove_file(&path).map_err(|e| {
            crate::Error::internal_io(e.to_string(), Some(format!("delete {}", path.display())))
        })?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Check if deckhand.json file exists
pub fn config_exists() -> bool {
    paths::deckhand_json()
        .map(|p| p.exists())
        .unwrap_or(false)
}

/// Get the path to deckhand.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::deckhand_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}
