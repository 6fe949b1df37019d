//! Scripted fakes for tests
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! dependent crates.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::source::{ExpandRequest, ExpandedDetails, PersonaSource, RandomName};
use crate::simulator::Evaluator;
use crate::types::Persona;
use crate::url::{is_valid_url, AvailabilityCheck};

fn upstream(service: &str) -> Error {
    Error::Upstream {
        service: service.to_string(),
        status: 503,
        message: "scripted failure".to_string(),
    }
}

/// Persona source that answers with numbered names.
///
/// Name calls and expansion calls are counted from 1; individual calls can
/// be scripted to fail, and every call can be delayed.
#[derive(Default)]
pub struct ScriptedSource {
    name_calls: AtomicUsize,
    expand_calls: AtomicUsize,
    failing_names: HashSet<usize>,
    failing_expansions: HashSet<usize>,
    fail_all_names: bool,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_name_call(mut self, call: usize) -> Self {
        self.failing_names.insert(call);
        self
    }

    pub fn fail_all_names(mut self) -> Self {
        self.fail_all_names = true;
        self
    }

    pub fn fail_expand_call(mut self, call: usize) -> Self {
        self.failing_expansions.insert(call);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn name_calls(&self) -> usize {
        self.name_calls.load(Ordering::SeqCst)
    }

    pub fn expand_calls(&self) -> usize {
        self.expand_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PersonaSource for ScriptedSource {
    async fn fetch_random_name(&self) -> Result<RandomName> {
        let call = self.name_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if self.fail_all_names || self.failing_names.contains(&call) {
            return Err(upstream("random-name"));
        }
        Ok(RandomName {
            name: format!("Persona {}", call),
            base_persona: format!("Base description {}", call),
        })
    }

    async fn expand_persona(&self, request: &ExpandRequest) -> Result<ExpandedDetails> {
        let call = self.expand_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if self.failing_expansions.contains(&call) {
            return Err(upstream("expand-persona"));
        }
        Ok(ExpandedDetails {
            description: Some(format!("{} explores every page carefully", request.name)),
            title: Some("Thorough Explorer".to_string()),
            goals: Some(serde_json::json!(["Understand the product"])),
            tech_proficiency: Some(Value::String("Moderate".to_string())),
            ..Default::default()
        })
    }
}

/// Fixed availability answer
#[derive(Debug, Clone, Copy)]
pub struct StaticAvailability(pub bool);

#[async_trait]
impl AvailabilityCheck for StaticAvailability {
    async fn is_available(&self, url: &str) -> bool {
        self.0 && is_valid_url(url)
    }
}

/// Evaluator that answers immediately, failing or panicking for chosen ids
#[derive(Default)]
pub struct ScriptedEvaluator {
    fail_ids: HashSet<String>,
    panic_ids: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(mut self, id: &str) -> Self {
        self.fail_ids.insert(id.to_string());
        self
    }

    pub fn panic_for(mut self, id: &str) -> Self {
        self.panic_ids.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, persona: &Persona, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.panic_ids.contains(&persona.id) {
            panic!("scripted panic for {}", persona.id);
        }
        if self.fail_ids.contains(&persona.id) {
            return Err(Error::Internal(format!("scripted failure for {}", persona.id)));
        }
        Ok(format!("{} looked at {}", persona.content.name, url))
    }
}

/// Chat model that replays queued responses, then fails
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, text: impl Into<String>) -> Self {
        self.responses.lock().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses.lock().push_back(Err(Error::Llm(message.to_string())));
        self
    }

    /// `(system, user)` prompts received so far
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts.lock().push((system.to_string(), user.to_string()));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("no scripted response left".to_string())))
    }
}
