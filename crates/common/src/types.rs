//! Core types for personatest

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::chat::ChatMessage;

/// Persona lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaStatus {
    Loading,
    Idle,
    Testing,
    Completed,
}

impl Default for PersonaStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for PersonaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonaStatus::Loading => write!(f, "loading"),
            PersonaStatus::Idle => write!(f, "idle"),
            PersonaStatus::Testing => write!(f, "testing"),
            PersonaStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Where a slot's current content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaOrigin {
    /// Random-name API, optionally expanded
    Remote,
    /// Offline placeholder tables
    Placeholder,
    /// LLM generator function
    Generated,
}

impl std::fmt::Display for PersonaOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonaOrigin::Remote => write!(f, "remote"),
            PersonaOrigin::Placeholder => write!(f, "placeholder"),
            PersonaOrigin::Generated => write!(f, "generated"),
        }
    }
}

/// Which population personas are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Anyone, not necessarily interested in the site
    Random,
    /// Likely users of the site
    Potential,
}

impl Default for Audience {
    fn default() -> Self {
        Self::Random
    }
}

impl Audience {
    /// Card label used while personas for this audience are being fetched.
    pub fn label(&self) -> &'static str {
        match self {
            Audience::Random => "Random Users",
            Audience::Potential => "Targeted Users",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::Random => write!(f, "random"),
            Audience::Potential => write!(f, "potential"),
        }
    }
}

impl std::str::FromStr for Audience {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Audience::Random),
            "potential" | "targeted" => Ok(Audience::Potential),
            other => Err(crate::Error::Validation(format!(
                "unknown persona type '{}', expected 'random' or 'potential'",
                other
            ))),
        }
    }
}

/// Demographic block of a fully described persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub age: f64,
    pub gender: String,
    pub occupation: String,
    pub education: String,
    pub location: String,
}

/// Detail set produced by expansion or generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub frustrations: Vec<String>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub motivations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_proficiency: Option<String>,
    #[serde(default)]
    pub preferred_channels: Vec<String>,
}

impl PersonaDetails {
    pub fn is_empty(&self) -> bool {
        self.demographics.is_none()
            && self.goals.is_empty()
            && self.frustrations.is_empty()
            && self.behaviors.is_empty()
            && self.motivations.is_empty()
            && self.tech_proficiency.is_none()
            && self.preferred_channels.is_empty()
    }
}

/// Display content of a persona slot. Swapped wholesale on refresh/shuffle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaContent {
    pub name: String,
    #[serde(rename = "type")]
    pub persona_type: String,
    pub description: String,
    /// URL reference only
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<PersonaDetails>,
    /// Provider-specific extras kept verbatim from expansion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_attributes: BTreeMap<String, Value>,
}

impl PersonaContent {
    pub fn new(name: impl Into<String>, persona_type: impl Into<String>, description: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona_type: persona_type.into(),
            description: description.into(),
            avatar: avatar.into(),
            details: None,
            additional_attributes: BTreeMap::new(),
        }
    }
}

/// One persona slot: stable identity plus replaceable content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    #[serde(flatten)]
    pub content: PersonaContent,
    pub status: PersonaStatus,
    pub is_locked: bool,
    pub expanded: bool,
    pub origin: PersonaOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_elapsed: Option<f64>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Persona {
    /// Create a slot with a fresh id holding `content`
    pub fn new(content: PersonaContent, origin: PersonaOrigin) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            status: PersonaStatus::Idle,
            is_locked: false,
            expanded: false,
            origin,
            feedback: None,
            time_elapsed: None,
            messages: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: PersonaStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.content.name
    }

    pub fn is_loading(&self) -> bool {
        self.status == PersonaStatus::Loading
    }

    /// Idle personas are the ones a test run picks up.
    pub fn is_ready(&self) -> bool {
        self.status == PersonaStatus::Idle
    }

    /// Swap in new content, keeping the slot id and lock flag.
    /// Clears any results of a previous test run.
    pub fn replace_content(&mut self, content: PersonaContent, origin: PersonaOrigin, expanded: bool) {
        self.content = content;
        self.origin = origin;
        self.expanded = expanded;
        self.feedback = None;
        self.time_elapsed = None;
    }
}
