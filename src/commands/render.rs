use clap::Args;

use deckhand::job::DomainJob;
use deckhand::render::{self, RenderContext};

use super::deploy::{load_request, DeployArgs};

#[derive(Args)]
pub struct RenderArgs {
    /// Job request JSON (supports @file and - for stdin)
    pub spec: String,

    /// Domain to render the configuration for
    pub domain: String,

    /// Configuration template file (replaces `configTemplate`)
    #[arg(long, value_name = "FILE")]
    pub template_file: Option<String>,
}

/// Print the configuration one domain would receive.
pub fn run_raw(args: RenderArgs) -> deckhand::Result<(String, i32)> {
    let request = load_request(&DeployArgs {
        spec: args.spec,
        domains_file: None,
        template_file: args.template_file,
        workers: None,
        plan: true,
    })?;

    let job = DomainJob::new(&args.domain);
    let content = render::render(
        &request.config_template,
        &RenderContext {
            domain: &job.domain,
            account: &job.account,
            password: &request.credentials.database_password,
        },
        &request.database,
        &request.rules,
    );

    Ok((content, 0))
}
