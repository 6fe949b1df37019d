//! Testing session
//!
//! Ties together URL entry, persona acquisition, test runs and chat for one
//! user. All methods take `&self`; a session is shared behind an `Arc` and its
//! long-running operations are usually spawned as background tasks while
//! clients poll [`Session::snapshot`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::{ChatLog, ChatMessage};
use crate::collection::{PersonaCollection, SharedCollection};
use crate::config::{AppConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::report::TestReport;
use crate::simulator::{random_delay, Evaluator, SharedReport, SimulatedEvaluator, TestRunSimulator};
use crate::source::{PersonaSource, RemotePersonaSource};
use crate::types::{Audience, Persona, PersonaStatus};
use crate::url::{is_valid_url, AvailabilityCheck, FormatOnly, ProxyProbe};

/// Inputs shorter than this are not treated as URLs yet
pub const MIN_URL_LEN: usize = 3;

pub const MSG_GENERATING: &str = "Generating personas...";
pub const MSG_READY: &str = "All personas are ready! Click \"Start Testing\" to begin the analysis.";
pub const MSG_GENERATION_FAILED: &str = "Sorry, there was an error generating personas. Please try again.";
pub const MSG_TESTING: &str = "Testing in progress...";
pub const MSG_TEST_FAILED: &str = "Sorry, there was an error testing the website. Please try again.";

/// Collaborators a session talks to
#[derive(Clone)]
pub struct SessionDeps {
    pub source: Arc<dyn PersonaSource>,
    pub availability: Arc<dyn AvailabilityCheck>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl SessionDeps {
    /// Remote source, probe and simulated evaluator built from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source = Arc::new(RemotePersonaSource::new(config.backend.clone())?);
        let availability: Arc<dyn AvailabilityCheck> = if config.probe.enabled {
            Arc::new(ProxyProbe::new(
                config.probe.proxy_url.clone(),
                Duration::from_secs(config.probe.timeout_secs),
            )?)
        } else {
            Arc::new(FormatOnly)
        };
        let (min, max) = config.session.test_delay_range();
        Ok(Self {
            source,
            availability,
            evaluator: Arc::new(SimulatedEvaluator::new(min, max)),
        })
    }
}

/// What happened to a URL submitted with [`Session::set_url`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlOutcome {
    /// Fewer than three characters, nothing started
    TooShort,
    Invalid,
    Unavailable,
    /// A newer URL replaced this one while it was being checked
    Superseded,
    /// Personas were acquired
    Ready,
    /// The safety timeout fired before acquisition settled
    TimedOut,
}

#[derive(Debug)]
struct SessionState {
    url: String,
    url_valid: bool,
    is_checking: bool,
    is_loading: bool,
    audience: Audience,
    chat: ChatLog,
    report: Option<SharedReport>,
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub url: String,
    pub url_valid: bool,
    pub is_checking: bool,
    pub is_loading: bool,
    pub persona_type: Audience,
    pub ready_count: usize,
    pub personas: Vec<Persona>,
    pub messages: Vec<ChatMessage>,
    pub report: Option<TestReport>,
}

/// Clears `is_loading` and settles loading slots when an operation ends,
/// including by timeout, panic or cancellation. Does nothing once the
/// collection has moved on to a newer generation.
struct LoadingGuard {
    state: Arc<Mutex<SessionState>>,
    collection: SharedCollection,
    generation: u64,
    settle: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let current = {
            let mut collection = self.collection.lock();
            if self.settle {
                let settled = collection.settle_loading(self.generation);
                if settled > 0 {
                    warn!(settled, "Forced loading personas to idle");
                }
            }
            collection.is_current(self.generation)
        };
        if current {
            self.state.lock().is_loading = false;
        }
    }
}

pub struct Session {
    id: String,
    config: SessionConfig,
    safety_timeout: Duration,
    deps: SessionDeps,
    collection: SharedCollection,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        let state = SessionState {
            url: String::new(),
            url_valid: false,
            is_checking: false,
            is_loading: false,
            audience: config.audience,
            chat: ChatLog::new(),
            report: None,
        };
        Self {
            id: Uuid::new_v4().to_string(),
            safety_timeout: config.safety_timeout(),
            config,
            deps,
            collection: PersonaCollection::shared(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Override the safety timeout from configuration
    pub fn with_safety_timeout(mut self, timeout: Duration) -> Self {
        self.safety_timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &SharedCollection {
        &self.collection
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    pub fn set_persona_type(&self, audience: Audience) {
        self.state.lock().audience = audience;
    }

    fn pipeline(&self) -> Pipeline {
        let audience = self.state.lock().audience;
        Pipeline::new(self.deps.source.clone()).with_audience(audience)
    }

    fn generation(&self) -> u64 {
        self.collection.lock().generation()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.collection.lock().is_current(generation)
    }

    fn post_status(&self, generation: u64, content: &str) {
        if self.is_current(generation) {
            self.state.lock().chat.post_status(content);
        }
    }

    fn require_valid_url(&self) -> Result<String> {
        let state = self.state.lock();
        if !state.url_valid {
            return Err(Error::Validation("enter a valid website URL first".into()));
        }
        Ok(state.url.clone())
    }

    /// Start over with a new target URL.
    ///
    /// Chat, report and personas are discarded immediately. A usable URL is
    /// then checked for availability and personas are acquired under the
    /// safety timeout.
    pub async fn set_url(&self, input: &str) -> Result<UrlOutcome> {
        let url = input.trim().to_string();
        let generation = {
            let mut state = self.state.lock();
            state.url = url.clone();
            state.url_valid = false;
            state.is_checking = false;
            state.is_loading = false;
            state.report = None;
            state.chat.reset();
            self.collection.lock().reset()
        };

        if url.chars().count() < MIN_URL_LEN {
            return Ok(UrlOutcome::TooShort);
        }
        if !is_valid_url(&url) {
            debug!(url, "Rejected invalid URL");
            return Ok(UrlOutcome::Invalid);
        }

        self.state.lock().is_checking = true;
        let available = self.deps.availability.is_available(&url).await;
        if !self.is_current(generation) {
            return Ok(UrlOutcome::Superseded);
        }
        {
            let mut state = self.state.lock();
            state.is_checking = false;
            state.url_valid = available;
        }
        if !available {
            info!(url, "Website unavailable");
            return Ok(UrlOutcome::Unavailable);
        }

        self.acquire(generation).await
    }

    async fn acquire(&self, generation: u64) -> Result<UrlOutcome> {
        let count = self.config.persona_count;
        {
            let mut state = self.state.lock();
            state.is_loading = true;
            state.chat.post_status(MSG_GENERATING);
        }
        let _guard = LoadingGuard {
            state: self.state.clone(),
            collection: self.collection.clone(),
            generation,
            settle: true,
        };

        let pipeline = self.pipeline();
        let populate = pipeline.populate(&self.collection, generation, count);
        match tokio::time::timeout(self.safety_timeout, populate).await {
            Ok(_) => {
                let ready = {
                    let collection = self.collection.lock();
                    if !collection.is_current(generation) {
                        return Ok(UrlOutcome::Superseded);
                    }
                    collection.count_status(PersonaStatus::Idle)
                };
                if ready == count {
                    self.post_status(generation, MSG_READY);
                }
                info!(session = %self.id, ready, count, "Personas acquired");
                Ok(UrlOutcome::Ready)
            }
            Err(_) => {
                warn!(
                    session = %self.id,
                    seconds = self.safety_timeout.as_secs_f64(),
                    "Persona acquisition hit the safety timeout"
                );
                self.post_status(generation, MSG_GENERATION_FAILED);
                Ok(UrlOutcome::TimedOut)
            }
        }
    }

    /// Run the simulated test over every ready persona
    pub async fn start_testing(&self) -> Result<TestReport> {
        let url = self.require_valid_url()?;
        let generation = self.generation();
        let report: SharedReport = Arc::new(Mutex::new(TestReport::new(url.clone(), 0)));
        {
            let mut state = self.state.lock();
            if state.is_loading {
                return Err(Error::Validation("another operation is still in progress".into()));
            }
            state.is_loading = true;
            state.report = Some(report.clone());
            state.chat.post_status(MSG_TESTING);
        }
        let _guard = LoadingGuard {
            state: self.state.clone(),
            collection: self.collection.clone(),
            generation,
            settle: false,
        };

        let simulator = TestRunSimulator::new(self.deps.evaluator.clone());
        match simulator.run(&self.collection, &report, &url).await {
            Ok(finished) => {
                self.post_status(
                    generation,
                    &format!(
                        "Testing complete! I've analyzed {} with all personas. Would you like to view the detailed report?",
                        url
                    ),
                );
                Ok(finished)
            }
            Err(Error::Validation(message)) => {
                if self.is_current(generation) {
                    self.state.lock().report = None;
                }
                Err(Error::Validation(message))
            }
            Err(e) => {
                self.post_status(generation, MSG_TEST_FAILED);
                Err(e)
            }
        }
    }

    /// Run a slot operation under the safety timeout. On expiry the
    /// operation is dropped, which settles the slots it touched.
    async fn bounded<T, F>(&self, operation: &str, op: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.safety_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session = %self.id, operation, "Persona operation hit the safety timeout");
                Err(Error::Timeout {
                    seconds: self.safety_timeout.as_secs(),
                })
            }
        }
    }

    pub async fn add_persona(&self) -> Result<String> {
        self.require_valid_url()?;
        let generation = self.generation();
        let pipeline = self.pipeline();
        self.bounded("add", pipeline.add(&self.collection, generation)).await
    }

    pub fn remove_persona(&self, id: &str) -> Result<Persona> {
        self.collection.lock().remove(id)
    }

    pub fn toggle_lock(&self, id: &str) -> Result<bool> {
        self.collection.lock().toggle_lock(id)
    }

    pub async fn refresh_persona(&self, id: &str) -> Result<()> {
        let generation = self.generation();
        let pipeline = self.pipeline();
        self.bounded("refresh", pipeline.refresh_one(&self.collection, generation, id))
            .await
    }

    pub async fn shuffle(&self) -> Result<usize> {
        self.require_valid_url()?;
        let generation = self.generation();
        let pipeline = self.pipeline();
        self.bounded("shuffle", async {
            Ok(pipeline.shuffle_unlocked(&self.collection, generation).await)
        })
        .await
    }

    /// Ask every idle or completed persona a question.
    ///
    /// Each persona answers after a random delay; once all have answered a
    /// combined summary is appended to the chat and returned.
    pub async fn ask(&self, message: &str) -> Result<String> {
        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(Error::Validation("message is empty".into()));
        }
        self.require_valid_url()?;

        let generation = self.generation();
        let responders: Vec<(String, String, String)> = self
            .collection
            .lock()
            .list()
            .iter()
            .filter(|p| matches!(p.status, PersonaStatus::Idle | PersonaStatus::Completed))
            .map(|p| (p.id.clone(), p.content.name.clone(), p.content.persona_type.clone()))
            .collect();
        if responders.is_empty() {
            return Err(Error::Validation("no personas are available to answer".into()));
        }

        self.state.lock().chat.push(ChatMessage::user(message.clone()));

        let that = if message.to_lowercase().starts_with("what") {
            "that "
        } else {
            ""
        };
        let (min, max) = self.config.chat_delay_range();
        let mut replies = JoinSet::new();
        for (id, name, persona_type) in responders {
            let collection = self.collection.clone();
            let text = format!("As {}, I think {}{}", persona_type, that, message);
            let delay = random_delay(min, max);
            replies.spawn(async move {
                tokio::time::sleep(delay).await;
                let reply = ChatMessage::from_persona(&id, text.clone());
                collection
                    .lock()
                    .apply(generation, &id, |persona| persona.messages.push(reply));
                format!("{}: {}", name, text)
            });
        }

        let mut responses = Vec::new();
        while let Some(joined) = replies.join_next().await {
            match joined {
                Ok(line) => responses.push(line),
                Err(e) => warn!(error = %e, "Persona reply task failed"),
            }
        }

        let summary = format!("Here's what our personas think:\n\n{}", responses.join("\n\n"));
        if self.is_current(generation) {
            self.state.lock().chat.append_system(summary.clone());
        }
        Ok(summary)
    }

    pub fn report(&self) -> Option<TestReport> {
        let report = self.state.lock().report.clone();
        report.map(|r| r.lock().clone())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let personas = self.collection.lock().list().to_vec();
        let report = self.report();
        let state = self.state.lock();
        SessionSnapshot {
            id: self.id.clone(),
            url: state.url.clone(),
            url_valid: state.url_valid,
            is_checking: state.is_checking,
            is_loading: state.is_loading,
            persona_type: state.audience,
            ready_count: personas.iter().filter(|p| p.is_ready()).count(),
            personas,
            messages: state.chat.messages().to_vec(),
            report,
        }
    }
}
