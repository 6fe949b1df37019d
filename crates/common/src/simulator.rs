//! Simulated test runs
//!
//! Each ready persona is evaluated in its own task. Results are written to
//! the collection and the report as each task finishes; aggregate findings
//! are filled in once every task has settled.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::collection::SharedCollection;
use crate::error::{Error, Result};
use crate::report::{ReportFindings, TestReport};
use crate::types::{Persona, PersonaStatus};

/// Report handle shared between a run's tasks
pub type SharedReport = Arc<Mutex<TestReport>>;

/// Produces feedback for one persona visiting a URL
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, persona: &Persona, url: &str) -> Result<String>;
}

/// Canned feedback after a random delay
#[derive(Debug, Clone)]
pub struct SimulatedEvaluator {
    min_delay: Duration,
    max_delay: Duration,
}

impl SimulatedEvaluator {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay: min_delay.min(max_delay),
            max_delay: max_delay.max(min_delay),
        }
    }

    pub fn feedback(url: &str) -> String {
        format!(
            "Found the website {} to be quite interesting. The navigation could be improved...",
            url
        )
    }
}

impl Default for SimulatedEvaluator {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

/// Uniform random duration in `[min, max]`
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = (max.as_millis() as u64).max(lo);
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

#[async_trait]
impl Evaluator for SimulatedEvaluator {
    async fn evaluate(&self, _persona: &Persona, url: &str) -> Result<String> {
        tokio::time::sleep(random_delay(self.min_delay, self.max_delay)).await;
        Ok(Self::feedback(url))
    }
}

fn round_tenths(seconds: f64) -> f64 {
    (seconds * 10.0).round() / 10.0
}

pub struct TestRunSimulator {
    evaluator: Arc<dyn Evaluator>,
    findings: ReportFindings,
}

impl TestRunSimulator {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            findings: ReportFindings::simulated(),
        }
    }

    pub fn with_findings(mut self, findings: ReportFindings) -> Self {
        self.findings = findings;
        self
    }

    /// Test every idle persona against `url`.
    ///
    /// The report is reset to cover exactly the eligible personas. A failed
    /// or panicked task fails the run; results already written stay, and
    /// personas still marked `testing` return to `idle`.
    pub async fn run(
        &self,
        collection: &SharedCollection,
        report: &SharedReport,
        url: &str,
    ) -> Result<TestReport> {
        let (generation, eligible) = {
            let mut guard = collection.lock();
            let generation = guard.generation();
            let ids = guard.ready_ids();
            let mut eligible = Vec::with_capacity(ids.len());
            for id in &ids {
                guard.apply(generation, id, |slot| {
                    slot.status = PersonaStatus::Testing;
                    slot.feedback = None;
                    slot.time_elapsed = None;
                    eligible.push(slot.clone());
                });
            }
            (generation, eligible)
        };

        if eligible.is_empty() {
            return Err(Error::Validation("no personas ready for testing".into()));
        }

        *report.lock() = TestReport::new(url, eligible.len() as u32);
        info!(url, personas = eligible.len(), "Test run started");

        let ids: Vec<String> = eligible.iter().map(|p| p.id.clone()).collect();
        let mut tasks = JoinSet::new();
        for persona in eligible {
            let evaluator = self.evaluator.clone();
            let collection = collection.clone();
            let report = report.clone();
            let url = url.to_string();

            tasks.spawn(async move {
                let started = Instant::now();
                let feedback = evaluator.evaluate(&persona, &url).await?;
                let elapsed = round_tenths(started.elapsed().as_secs_f64());

                collection.lock().apply(generation, &persona.id, |slot| {
                    slot.status = PersonaStatus::Completed;
                    slot.feedback = Some(feedback);
                    slot.time_elapsed = Some(elapsed);
                });
                let completed = report.lock().record_completion()?;
                debug!(id = %persona.id, name = %persona.content.name, elapsed, completed, "Persona test finished");
                Ok::<_, Error>(())
            });
        }

        let mut failure: Option<String> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Persona test failed");
                    failure.get_or_insert_with(|| e.to_string());
                }
                Err(e) => {
                    error!(error = %e, "Persona test task aborted");
                    failure.get_or_insert_with(|| format!("test task aborted: {}", e));
                }
            }
        }

        if let Some(message) = failure {
            let mut guard = collection.lock();
            for id in &ids {
                guard.apply(generation, id, |slot| {
                    if slot.status == PersonaStatus::Testing {
                        slot.status = PersonaStatus::Idle;
                    }
                });
            }
            return Err(Error::TestRun(message));
        }

        let mut report = report.lock();
        report.apply_findings(self.findings.clone());
        info!(url, score = report.overall_score, completed = report.completed_tests, "Test run complete");
        Ok(report.clone())
    }
}
