use clap::Args;
use serde::Serialize;
use std::time::Duration;

use deckhand::batch::StreamSink;
use deckhand::cpanel::CpanelClient;
use deckhand::defaults;
use deckhand::distribute::{self, FileDistribution};
use deckhand::job;
use deckhand::utils::io;
use deckhand::{BatchResult, BulkSummary};

use super::CmdResult;

#[derive(Args)]
pub struct PushFileArgs {
    /// File distribution JSON (supports @file and - for stdin)
    pub spec: String,

    /// Domain list file, one domain per line (replaces `domains`)
    #[arg(long, value_name = "FILE")]
    pub domains_file: Option<String>,

    /// Local file to push (replaces `sourceFile`)
    #[arg(long, value_name = "FILE")]
    pub source_file: Option<String>,
}

#[derive(Serialize)]
pub struct PushFileOutput {
    pub command: String,
    pub target: String,
    pub result: BatchResult,
    pub summary: BulkSummary,
}

pub fn run(args: PushFileArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PushFileOutput> {
    let raw = super::read_json_spec_to_string(&args.spec)?;
    let mut distribution = FileDistribution::from_json(&raw)?;

    if let Some(path) = &args.domains_file {
        distribution.domains = job::parse_domain_list(&io::read_user_file(path, "read domains file")?);
    }
    if let Some(path) = args.source_file {
        distribution.content.clear();
        distribution.source_file = Some(path);
    }

    distribution.resolve_source()?;
    distribution.validate()?;

    let defaults = defaults::load_defaults();
    let panel = CpanelClient::new(&defaults.control_panel)?;
    let delay = Duration::from_millis(defaults.pipeline.step_delay_ms);

    let mut sink = StreamSink::new(std::io::stderr());
    let result = distribute::push_file(&distribution, &panel, &mut sink, delay);
    let summary = result.summary();
    let exit_code = if summary.failed > 0 { 1 } else { 0 };

    Ok((
        PushFileOutput {
            command: "push-file".to_string(),
            target: format!(
                "{}/{}",
                distribution.target_dir.trim_end_matches('/'),
                distribution.file_name
            ),
            result,
            summary,
        },
        exit_code,
    ))
}
