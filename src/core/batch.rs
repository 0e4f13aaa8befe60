//! Batch runner: every domain through the pipeline, one log segment each.
//!
//! Each domain's segment opens with a boundary marker and closes with either
//! a stop marker or a success marker. With one worker, domains run in input
//! order and lines stream as they happen. With more, domains run on a rayon
//! pool and each segment is buffered, then flushed in input order once every
//! earlier segment has been written.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;

use crate::defaults::Defaults;
use crate::job::{DomainJob, JobRequest};
use crate::output::BulkSummary;
use crate::pipeline::{self, Capabilities, JobContext, JobSettings, JobState, STEPS};
use crate::render::{self, RenderContext};

const RULE: &str = "==================================================";

/// Destination for the operator-facing log, one line at a time.
pub trait LogSink {
    fn line(&mut self, line: &str);
}

impl LogSink for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Writes each line immediately, for real-time progress.
pub struct StreamSink<W: Write> {
    writer: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> LogSink for StreamSink<W> {
    fn line(&mut self, line: &str) {
        // A closed stream has nowhere to report to.
        let _ = writeln!(self.writer, "{}", line);
        let _ = self.writer.flush();
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Domains processed at once. 1 (or 0) means strictly sequential.
    pub workers: usize,
    /// Pause after every step call.
    pub step_delay: Duration,
    pub settings: JobSettings,
}

impl BatchOptions {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            workers: defaults.pipeline.workers,
            step_delay: Duration::from_millis(defaults.pipeline.step_delay_ms),
            settings: JobSettings::from_defaults(defaults),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub jobs: Vec<DomainJob>,
    pub summary: BulkSummary,
}

/// Run every domain in the request. Always attempts all of them.
pub fn run_batch(
    request: &JobRequest,
    capabilities: &Capabilities<'_>,
    options: &BatchOptions,
    sink: &mut dyn LogSink,
) -> BatchReport {
    let domains = request.domain_list();
    log_status!("batch", "Processing {} domain(s) with {} worker(s)", domains.len(), options.workers.max(1));

    let jobs = if options.workers > 1 && domains.len() > 1 {
        run_parallel(&domains, request, capabilities, options, sink)
    } else {
        run_sequential(&domains, request, capabilities, options, sink)
    };

    let summary = summarize(&jobs);
    sink.line(&summary_line(&summary));

    BatchReport { jobs, summary }
}

fn run_sequential(
    domains: &[String],
    request: &JobRequest,
    capabilities: &Capabilities<'_>,
    options: &BatchOptions,
    sink: &mut dyn LogSink,
) -> Vec<DomainJob> {
    domains
        .iter()
        .enumerate()
        .map(|(index, domain)| process_domain(index, domains.len(), domain, request, capabilities, options, sink))
        .collect()
}

fn run_parallel(
    domains: &[String],
    request: &JobRequest,
    capabilities: &Capabilities<'_>,
    options: &BatchOptions,
    sink: &mut dyn LogSink,
) -> Vec<DomainJob> {
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(options.workers).build() {
        Ok(pool) => pool,
        Err(e) => {
            log_status!("batch", "Failed to create worker pool ({}), running sequentially", e);
            return run_sequential(domains, request, capabilities, options, sink);
        }
    };

    let total = domains.len();
    let (tx, rx) = mpsc::channel::<(usize, DomainJob, Vec<String>)>();
    let mut jobs = Vec::with_capacity(total);

    thread::scope(|scope| {
        scope.spawn(move || {
            pool.install(|| {
                domains.par_iter().enumerate().for_each_with(tx, |tx, (index, domain)| {
                    let mut lines: Vec<String> = Vec::new();
                    let job = process_domain(index, total, domain, request, capabilities, options, &mut lines);
                    // The receiver outlives every worker.
                    let _ = tx.send((index, job, lines));
                });
            });
        });

        let mut pending = BTreeMap::new();
        for (index, job, lines) in rx {
            pending.insert(index, (job, lines));
            while let Some((job, lines)) = pending.remove(&jobs.len()) {
                for line in &lines {
                    sink.line(line);
                }
                jobs.push(job);
            }
        }
    });

    jobs
}

fn process_domain(
    index: usize,
    total: usize,
    domain: &str,
    request: &JobRequest,
    capabilities: &Capabilities<'_>,
    options: &BatchOptions,
    sink: &mut dyn LogSink,
) -> DomainJob {
    let mut job = DomainJob::new(domain);
    let domain = job.domain.clone();
    let account = job.account.clone();

    sink.line(RULE);
    sink.line(&format!("[{}/{}] PROCESSING: {}", index + 1, total, domain));
    sink.line(RULE);

    let rendered = render::render(
        &request.config_template,
        &RenderContext {
            domain: &domain,
            account: &account,
            password: &request.credentials.database_password,
        },
        &request.database,
        &request.rules,
    );

    let ctx = JobContext {
        domain: &domain,
        account: &account,
        rendered_config: &rendered,
        request,
        capabilities: *capabilities,
        settings: &options.settings,
    };

    match pipeline::run_job(&mut job, &ctx, options.step_delay, sink) {
        JobState::FailedAt(step) => {
            let name = STEPS.get(step).map(|s| s.kind.as_str()).unwrap_or("unknown");
            sink.line(&format!("STOPPED: {} halted at {} due to error", domain, name));
        }
        _ => sink.line(&format!("DONE: {} deployed successfully", domain)),
    }

    job
}

fn summarize(jobs: &[DomainJob]) -> BulkSummary {
    let succeeded = jobs.iter().filter(|job| job.is_succeeded()).count();
    BulkSummary {
        total: jobs.len(),
        succeeded,
        failed: jobs.len() - succeeded,
    }
}

fn summary_line(summary: &BulkSummary) -> String {
    format!(
        "Batch complete: {} domain(s), {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    )
}

/// Whether a log line opens a domain segment.
pub fn is_boundary_marker(line: &str) -> bool {
    line.starts_with('[') && line.contains("] PROCESSING: ")
}
