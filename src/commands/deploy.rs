use clap::Args;
use serde::Serialize;

use deckhand::batch::{self, BatchOptions, BatchReport, StreamSink};
use deckhand::cloudflare::CloudflareClient;
use deckhand::cpanel::CpanelClient;
use deckhand::defaults;
use deckhand::job::{self, JobRequest};
use deckhand::pipeline::{self, Capabilities};
use deckhand::render::{self, RenderContext};
use deckhand::ssh::SshOpener;
use deckhand::utils::io;

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Job request JSON (supports @file and - for stdin)
    pub spec: String,

    /// Domain list file, one domain per line (replaces `domains`)
    #[arg(long, value_name = "FILE")]
    pub domains_file: Option<String>,

    /// Configuration template file (replaces `configTemplate`)
    #[arg(long, value_name = "FILE")]
    pub template_file: Option<String>,

    /// Domains processed at once (default from deckhand.json, 1 = sequential)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Render every domain's configuration and show the step order without
    /// contacting any host
    #[arg(long)]
    pub plan: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedDomain {
    pub domain: String,
    pub account: String,
    pub database_name: String,
    pub database_user: String,
    pub config: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployPlan {
    pub steps: Vec<&'static str>,
    pub workers: usize,
    pub domains: Vec<PlannedDomain>,
}

#[derive(Serialize)]
pub struct DeployOutput {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<DeployPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DeployOutput> {
    let request = load_request(&args)?;
    let defaults = defaults::load_defaults();

    let mut options = BatchOptions::from_defaults(&defaults);
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    options.settings.commands.validate()?;
    if request.backup.enabled {
        request.backup.check_staging_outside(&options.settings.web_root)?;
    }

    if args.plan {
        return Ok((
            DeployOutput {
                command: "deploy.plan".to_string(),
                plan: Some(plan(&request, options.workers)),
                report: None,
            },
            0,
        ));
    }

    let control_panel = CpanelClient::new(&defaults.control_panel)?;
    let edge = CloudflareClient::new(&request.credentials.edge_token, &defaults.edge)?;
    let shell = SshOpener::new(&defaults.shell);
    let capabilities = Capabilities {
        control_panel: &control_panel,
        edge: &edge,
        shell: &shell,
    };

    let mut sink = StreamSink::new(std::io::stderr());
    let report = batch::run_batch(&request, &capabilities, &options, &mut sink);

    let exit_code = if report.summary.failed > 0 { 1 } else { 0 };

    Ok((
        DeployOutput {
            command: "deploy.run".to_string(),
            plan: None,
            report: Some(report),
        },
        exit_code,
    ))
}

/// Parse the request, apply file overrides, and validate it.
pub(crate) fn load_request(args: &DeployArgs) -> deckhand::Result<JobRequest> {
    let raw = super::read_json_spec_to_string(&args.spec)?;
    let mut request = JobRequest::from_json(&raw)?;

    if let Some(path) = &args.domains_file {
        request.domains = job::parse_domain_list(&io::read_user_file(path, "read domains file")?);
    }
    if let Some(path) = &args.template_file {
        request.config_template = io::read_user_file(path, "read template file")?;
    }

    request.validate()?;
    Ok(request)
}

fn plan(request: &JobRequest, workers: usize) -> DeployPlan {
    let domains = request
        .domain_list()
        .iter()
        .map(|domain| {
            let account = job::derive_account(domain);
            let config = render::render(
                &request.config_template,
                &RenderContext {
                    domain,
                    account: &account,
                    password: "<redacted>",
                },
                &request.database,
                &request.rules,
            );
            PlannedDomain {
                domain: domain.clone(),
                database_name: request.database.database_name(&account),
                database_user: request.database.database_user(&account),
                account,
                config,
            }
        })
        .collect();

    DeployPlan {
        steps: pipeline::step_names(),
        workers: workers.max(1),
        domains,
    }
}
