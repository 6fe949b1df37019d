//! Full in-process testing session

use anyhow::{bail, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use personatest_common::url::random_url;
use personatest_common::{AppConfig, Audience, Persona, Session, SessionDeps, TestReport, UrlOutcome};

use super::persona::{persona_rows, ReportDisplay};
use crate::output::{print_info, print_item, print_list, print_success, print_warning, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Args)]
pub struct RunArgs {
    /// Website to test
    #[arg(required_unless_present = "random", conflicts_with = "random")]
    pub url: Option<String>,

    /// Pick one of the demo sites
    #[arg(long)]
    pub random: bool,

    /// Number of personas
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Persona population: random or potential
    #[arg(long)]
    pub persona_type: Option<Audience>,

    /// Stop after persona acquisition
    #[arg(long)]
    pub no_test: bool,
}

/// Everything a run produced
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub url: String,
    pub outcome: UrlOutcome,
    pub personas: Vec<Persona>,
    pub report: Option<TestReport>,
}

fn progress(len: u64, format: OutputFormat, message: &str) -> ProgressBar {
    if !format.is_interactive() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(POLL_INTERVAL);
    bar
}

/// Acquire personas for `url` and, when `test` is set, run the test pass.
/// Progress is drawn from session snapshots while the work runs.
pub async fn run_session(session: Arc<Session>, url: &str, count: usize, test: bool, format: OutputFormat) -> Result<RunSummary> {
    let bar = progress(count as u64, format, "Generating personas");
    let acquiring = {
        let session = session.clone();
        let url = url.to_string();
        tokio::spawn(async move { session.set_url(&url).await })
    };
    while !acquiring.is_finished() {
        bar.set_position(session.snapshot().ready_count as u64);
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    let outcome = acquiring.await??;
    bar.finish_and_clear();
    debug!(?outcome, "Acquisition finished");

    match outcome {
        UrlOutcome::Ready => {}
        UrlOutcome::TimedOut => {
            if format.is_interactive() {
                print_warning("Persona generation timed out; continuing with what arrived");
            }
        }
        UrlOutcome::TooShort | UrlOutcome::Invalid => bail!("'{}' is not a valid website URL", url),
        UrlOutcome::Unavailable => bail!("{} is not reachable", url),
        UrlOutcome::Superseded => bail!("URL changed while personas were being generated"),
    }

    let report = if test {
        let snapshot = session.snapshot();
        let bar = progress(snapshot.ready_count as u64, format, "Testing");
        let testing = {
            let session = session.clone();
            tokio::spawn(async move { session.start_testing().await })
        };
        while !testing.is_finished() {
            if let Some(report) = session.report() {
                bar.set_length(report.total_tests as u64);
                bar.set_position(report.completed_tests as u64);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let report = testing.await??;
        bar.finish_and_clear();
        Some(report)
    } else {
        None
    };

    let snapshot = session.snapshot();
    Ok(RunSummary {
        url: url.to_string(),
        outcome,
        personas: snapshot.personas,
        report,
    })
}

fn print_report(report: &TestReport, format: OutputFormat) {
    print_item(&ReportDisplay(report), format);
    if format != OutputFormat::Table {
        return;
    }
    for (title, items) in [
        ("What worked", &report.successes),
        ("Recommendations", &report.recommendations),
        ("Common issues", &report.common_issues),
    ] {
        println!("\n{}:", title);
        for item in items {
            println!("  - {}", item);
        }
    }
}

pub async fn execute(args: RunArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let url = match (args.url, args.random) {
        (_, true) => random_url().to_string(),
        (Some(url), false) => url,
        (None, false) => bail!("a URL or --random is required"),
    };

    let mut session_config = config.session.clone();
    if let Some(count) = args.count {
        session_config.persona_count = count;
    }
    if let Some(audience) = args.persona_type {
        session_config.audience = audience;
    }
    let count = session_config.persona_count;

    let deps = SessionDeps::from_config(config)?;
    let session = Arc::new(Session::new(session_config, deps));
    info!(session = session.id(), url = %url, count, "Starting run");

    if format.is_interactive() {
        print_info(&format!("Testing {} with {} personas", url, count));
    }
    let summary = run_session(session, &url, count, !args.no_test, format).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&summary)?),
        OutputFormat::Table | OutputFormat::Plain => {
            print_list(&persona_rows(&summary.personas), format);
            if let Some(report) = &summary.report {
                println!();
                print_report(report, format);
                print_success(&format!("Testing complete for {}", summary.url));
            }
        }
    }
    Ok(())
}
