//! Per-domain step pipeline.
//!
//! The step order is declared once in [`STEPS`]. A job runs the steps in that
//! order and halts at the first failing step, so a job's step log is always a
//! prefix of the declared order.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::LogSink;
use crate::cloudflare::EdgeProvider;
use crate::cpanel::{ControlPanel, PanelAuth};
use crate::defaults::Defaults;
use crate::deploy::{self, CommandRecord, RepoSource, ShellCommands};
use crate::error::Result;
use crate::job::{DomainJob, JobRequest, JobStatus, StepOutcome};
use crate::migrate;
use crate::ssh::{SessionOpener, ShellTarget};

/// External capabilities a job needs. One set is shared by every domain.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    pub control_panel: &'a dyn ControlPanel,
    pub edge: &'a dyn EdgeProvider,
    pub shell: &'a dyn SessionOpener,
}

/// Per-run settings that are not part of the job request.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub shell_port: u16,
    pub web_root: String,
    pub config_dir: String,
    pub config_file: String,
    pub tls_mode: String,
    pub commands: ShellCommands,
}

impl JobSettings {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            shell_port: defaults.shell.port,
            web_root: defaults.shell.web_root.clone(),
            config_dir: defaults.control_panel.config_dir.clone(),
            config_file: defaults.control_panel.config_file.clone(),
            tls_mode: defaults.edge.tls_mode.clone(),
            commands: ShellCommands::from(&defaults.shell),
        }
    }
}

/// Everything one step call can see.
pub struct JobContext<'a> {
    pub domain: &'a str,
    pub account: &'a str,
    pub rendered_config: &'a str,
    pub request: &'a JobRequest,
    pub capabilities: Capabilities<'a>,
    pub settings: &'a JobSettings,
}

impl JobContext<'_> {
    fn panel_auth(&self) -> PanelAuth<'_> {
        PanelAuth {
            domain: self.domain,
            account: self.account,
            password: &self.request.credentials.control_panel_password,
        }
    }

    fn shell_target(&self) -> ShellTarget {
        ShellTarget {
            host: self.request.shell_host.clone(),
            port: self.request.shell_port.unwrap_or(self.settings.shell_port),
            user: self.account.to_string(),
            password: self.request.credentials.shell_password().to_string(),
            web_root: self.settings.web_root.clone(),
        }
    }
}

/// What a successful step reports back.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub message: String,
    pub details: Vec<String>,
    pub warnings: Vec<String>,
}

impl StepReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    fn from_records(message: impl Into<String>, records: &[CommandRecord]) -> Self {
        let warnings = deploy::warnings(records);
        let mut message = message.into();
        if !warnings.is_empty() {
            message = format!("{} ({} command warning(s))", message, warnings.len());
        }
        Self {
            message,
            details: deploy::log_lines(records),
            warnings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    RotateCredential,
    RemoteDeploy,
    WriteConfig,
    RunMigrations,
    EnforceTls,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RotateCredential => "rotate-credential",
            Self::RemoteDeploy => "remote-deploy",
            Self::WriteConfig => "write-config",
            Self::RunMigrations => "run-migrations",
            Self::EnforceTls => "enforce-tls",
        }
    }
}

pub type StepFn = fn(&JobContext<'_>) -> Result<StepReport>;

pub struct PipelineStep {
    pub kind: StepKind,
    pub execute: StepFn,
}

pub const STEPS: [PipelineStep; 5] = [
    PipelineStep {
        kind: StepKind::RotateCredential,
        execute: rotate_credential,
    },
    PipelineStep {
        kind: StepKind::RemoteDeploy,
        execute: remote_deploy,
    },
    PipelineStep {
        kind: StepKind::WriteConfig,
        execute: write_config,
    },
    PipelineStep {
        kind: StepKind::RunMigrations,
        execute: run_migrations,
    },
    PipelineStep {
        kind: StepKind::EnforceTls,
        execute: enforce_tls,
    },
];

/// Step names in execution order.
pub fn step_names() -> Vec<&'static str> {
    STEPS.iter().map(|step| step.kind.as_str()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Running(usize),
    Succeeded,
    FailedAt(usize),
}

impl From<JobState> for JobStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::NotStarted => JobStatus::Pending,
            JobState::Running(_) => JobStatus::Running,
            JobState::Succeeded => JobStatus::Succeeded,
            JobState::FailedAt(_) => JobStatus::Failed,
        }
    }
}

/// Run the declared steps for one domain.
pub fn run_job(
    job: &mut DomainJob,
    ctx: &JobContext<'_>,
    step_delay: Duration,
    sink: &mut dyn LogSink,
) -> JobState {
    run_steps(&STEPS, job, ctx, step_delay, sink)
}

/// Run `steps` in order, halting at the first failure. Each outcome is
/// appended to the job's log and written to `sink` as it happens, followed by
/// one line per remote command it ran. The delay follows every step call.
pub fn run_steps(
    steps: &[PipelineStep],
    job: &mut DomainJob,
    ctx: &JobContext<'_>,
    step_delay: Duration,
    sink: &mut dyn LogSink,
) -> JobState {
    let mut state = JobState::NotStarted;
    job.status = state.into();

    for (index, step) in steps.iter().enumerate() {
        state = JobState::Running(index);
        job.status = state.into();

        let name = step.kind.as_str();
        log_status!("pipeline", "{}: {} ({}/{})", job.domain, name, index + 1, steps.len());

        let outcome = match (step.execute)(ctx) {
            Ok(report) => StepOutcome::succeeded(name, report.message, report.details, report.warnings),
            Err(err) => {
                log_status!("pipeline", "{}: {} failed: {}", job.domain, name, err);
                StepOutcome::failed(name, &err)
            }
        };

        sink.line(&outcome_line(&outcome));
        for detail in &outcome.details {
            sink.line(&detail_line(detail));
        }
        let failed = !outcome.success;
        job.step_log.push(outcome);

        if !step_delay.is_zero() {
            thread::sleep(step_delay);
        }

        if failed {
            state = JobState::FailedAt(index);
            job.status = state.into();
            job.failed_step = Some(index);
            return state;
        }
    }

    state = JobState::Succeeded;
    job.status = state.into();
    state
}

/// One log line per step outcome.
pub fn outcome_line(outcome: &StepOutcome) -> String {
    if outcome.success {
        format!("[ok] {}: {}", outcome.step, outcome.message)
    } else {
        format!("[failed] {}: {}", outcome.step, outcome.message)
    }
}

/// Per-command record under its step's outcome line.
pub fn detail_line(detail: &str) -> String {
    format!("    {}", detail)
}

fn rotate_credential(ctx: &JobContext<'_>) -> Result<StepReport> {
    let db_user = ctx.request.database.database_user(ctx.account);
    let message = ctx.capabilities.control_panel.set_database_password(
        &ctx.panel_auth(),
        &db_user,
        &ctx.request.credentials.database_password,
    )?;
    Ok(StepReport::new(message))
}

fn remote_deploy(ctx: &JobContext<'_>) -> Result<StepReport> {
    let repo = RepoSource::new(&ctx.request.repo_url, &ctx.request.credentials.repo_token);
    let records = deploy::deploy_site(
        ctx.capabilities.shell,
        &ctx.shell_target(),
        &repo,
        &ctx.request.backup,
        &ctx.settings.commands,
    )?;
    Ok(StepReport::from_records(
        format!("Deployed {} into {}", repo.display_url(), ctx.settings.web_root),
        &records,
    ))
}

fn write_config(ctx: &JobContext<'_>) -> Result<StepReport> {
    let message = ctx.capabilities.control_panel.save_file(
        &ctx.panel_auth(),
        &ctx.settings.config_dir,
        &ctx.settings.config_file,
        ctx.rendered_config,
    )?;
    Ok(StepReport::new(message))
}

fn run_migrations(ctx: &JobContext<'_>) -> Result<StepReport> {
    let records = migrate::run_migrations(
        ctx.capabilities.shell,
        &ctx.shell_target(),
        &ctx.request.seeders,
        &ctx.settings.commands,
    )?;
    let seeded = records.len().saturating_sub(1);
    Ok(StepReport::from_records(
        format!("Migrations run, {} seeder(s)", seeded),
        &records,
    ))
}

fn enforce_tls(ctx: &JobContext<'_>) -> Result<StepReport> {
    let zone_id = ctx.capabilities.edge.find_zone_id(ctx.domain)?;
    let mode = ctx.capabilities.edge.set_tls_mode(&zone_id, &ctx.settings.tls_mode)?;
    Ok(StepReport::new(format!("TLS mode for {} set to {}", ctx.domain, mode)))
}
