use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use futures::StreamExt;
use phase_runner::{abort_pair, HttpPageChecker};
use probe_core::combination::{combinations, filter};
use probe_core::config::WarnLevel;
use probe_core::{
    Combination, GenerationOutcome, Generator, MatrixRunner, PhasePlan, PhaseSequencer,
    ProbeError, RunReport, StreamLib,
};
use tracing::{info, warn};

use crate::cmd::load_config;
use crate::output::{print_json, print_table, truncate};

/// One hour, the budget of a full matrix run.
const DEFAULT_SUITE_TIMEOUT_SECS: u64 = 3600;
const CAUSE_WIDTH: usize = 72;

#[derive(Args)]
pub struct RunArgs {
    /// Only run this template (repeatable)
    #[arg(long = "flavor", value_name = "TEMPLATE")]
    flavors: Vec<String>,

    /// Only run this stream library (repeatable): xstream, most, rxjs, rx
    #[arg(long = "stream", value_name = "LIB")]
    streams: Vec<String>,

    /// Also write the JSON report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Abort the whole run after this many seconds
    #[arg(long, default_value_t = DEFAULT_SUITE_TIMEOUT_SECS)]
    suite_timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// RunExit: typed non-zero exit codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RunExit {
    Failed { failed: usize, total: usize },
    Aborted,
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::Failed { .. } => 2,
            RunExit::Aborted => 130,
        }
    }
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunExit::Failed { failed, total } => {
                write!(f, "{failed} of {total} combination(s) failed")
            }
            RunExit::Aborted => write!(f, "run aborted"),
        }
    }
}

impl std::error::Error for RunExit {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(root: &Path, config: Option<&Path>, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(root, config)?;

    let errors: Vec<String> = config
        .validate(root)
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        return Err(ProbeError::InvalidConfig(errors.join("; ")).into());
    }

    let streams = args
        .streams
        .iter()
        .map(|s| s.parse::<StreamLib>())
        .collect::<Result<Vec<_>, _>>()?;
    let combos = filter(
        combinations(&config.flavors(root), &config.stream_libs),
        &args.flavors,
        &streams,
    );
    if combos.is_empty() {
        return Err(ProbeError::EmptyMatrix.into());
    }

    let plan = PhasePlan::from_config(&config).context("invalid phase configuration")?;
    let checker = HttpPageChecker::new().context("failed to build page checker")?;
    let sequencer = PhaseSequencer::new(plan).with_page_checker(Arc::new(checker));
    let generator = Generator::from_config(&config, root);
    let suite_timeout = Duration::from_secs(args.suite_timeout_secs);

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(drive(generator, sequencer, combos, suite_timeout));

    if let Some(path) = &args.report {
        let path = probe_core::paths::resolve(root, path);
        report
            .save(&path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.aborted {
        return Err(RunExit::Aborted.into());
    }
    if report.failed() > 0 {
        return Err(RunExit::Failed {
            failed: report.failed(),
            total: report.results.len(),
        }
        .into());
    }
    Ok(())
}

/// Collect every result, firing the abort on Ctrl-C or the suite timeout.
async fn drive(
    generator: Generator,
    sequencer: PhaseSequencer,
    combos: Vec<Combination>,
    suite_timeout: Duration,
) -> RunReport {
    let (abort, signal) = abort_pair();
    let runner = MatrixRunner::new(generator, sequencer).with_abort(signal);
    let started_at = Utc::now();
    let total = combos.len();

    let mut stream = runner.run_all(combos);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let suite = tokio::time::sleep(suite_timeout);
    tokio::pin!(suite);

    let mut aborted = false;
    let mut listen_ctrl_c = true;
    let mut results = Vec::with_capacity(total);
    loop {
        tokio::select! {
            res = &mut ctrl_c, if listen_ctrl_c && !aborted => {
                listen_ctrl_c = false;
                match res {
                    Ok(()) => {
                        warn!("interrupted, aborting run");
                        abort.abort();
                        aborted = true;
                    }
                    Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
                }
            }
            _ = &mut suite, if !aborted => {
                warn!(timeout_secs = suite_timeout.as_secs(), "suite timeout elapsed, aborting run");
                abort.abort();
                aborted = true;
            }
            next = stream.next() => match next {
                Some(result) => {
                    info!(
                        combination = %result.combination.label(),
                        verdict = result.verdict.as_str(),
                        done = results.len() + 1,
                        total,
                        "combination result"
                    );
                    results.push(result);
                }
                None => break,
            },
        }
    }

    RunReport {
        started_at,
        finished_at: Utc::now(),
        aborted,
        results,
    }
}

// ---------------------------------------------------------------------------
// Human output
// ---------------------------------------------------------------------------

fn print_report(report: &RunReport) {
    let mut rows = Vec::new();
    for result in &report.results {
        let label = result.combination.label();
        let generation = match &result.generation {
            GenerationOutcome::Passed => "passed".to_string(),
            GenerationOutcome::Failed { reason } => truncate(reason, CAUSE_WIDTH),
            GenerationOutcome::Aborted => "aborted".to_string(),
        };
        rows.push(vec![
            label.clone(),
            "generate".to_string(),
            generation,
            String::new(),
        ]);
        for phase in &result.phases {
            rows.push(vec![
                label.clone(),
                phase.name.clone(),
                truncate(&phase.outcome.to_string(), CAUSE_WIDTH),
                format!("{}ms", phase.elapsed.as_millis()),
            ]);
        }
    }
    print_table(&["COMBINATION", "PHASE", "OUTCOME", "TIME"], rows);

    println!();
    for result in &report.results {
        let verdict = result.verdict.as_str().to_uppercase();
        match result.first_failure() {
            Some(cause) => println!(
                "{verdict}  {}  ({})",
                result.combination.label(),
                truncate(&cause, CAUSE_WIDTH)
            ),
            None => println!("{verdict}  {}", result.combination.label()),
        }
    }
    println!(
        "\n{} passed, {} failed{}",
        report.passed(),
        report.failed(),
        if report.aborted { " (aborted)" } else { "" }
    );
}
