//! Remote persona source
//!
//! Personas are acquired in two steps: a cheap call for a random name and a
//! base description, then a slower call that expands it into a full detail
//! set. Callers can show the first result while the second is in flight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{Demographics, PersonaContent, PersonaDetails};

/// Step 1 response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomName {
    pub name: String,
    #[serde(default)]
    pub base_persona: String,
}

/// Step 2 request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExpandRequest {
    pub fn for_content(content: &PersonaContent) -> Self {
        Self {
            name: content.name.clone(),
            title: Some(content.persona_type.clone()).filter(|t| !t.is_empty()),
            description: Some(content.description.clone()).filter(|d| !d.is_empty()),
        }
    }
}

/// Step 2 response: known fields plus whatever else the provider sends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedDetails {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub persona_type: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub demographics: Option<Value>,
    #[serde(default)]
    pub goals: Option<Value>,
    #[serde(default)]
    pub frustrations: Option<Value>,
    #[serde(default)]
    pub behaviors: Option<Value>,
    #[serde(default)]
    pub motivations: Option<Value>,
    #[serde(default)]
    pub tech_proficiency: Option<Value>,
    #[serde(default)]
    pub preferred_channels: Option<Value>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

impl ExpandedDetails {
    /// Minimal shape an expansion must have before it is merged
    pub fn validate(&self) -> Result<()> {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => Ok(()),
            _ => Err(Error::InvalidPersona(vec![
                "Missing field: description".to_string(),
            ])),
        }
    }

    /// Merge into `content`. Validation runs first and nothing is touched
    /// when it fails.
    pub fn merge_into(self, content: &mut PersonaContent) -> Result<()> {
        self.validate()?;

        let ExpandedDetails {
            description,
            title,
            persona_type,
            avatar,
            demographics,
            goals,
            frustrations,
            behaviors,
            motivations,
            tech_proficiency,
            preferred_channels,
            mut additional,
        } = self;

        if let Some(description) = description {
            content.description = description;
        }
        if let Some(kind) = persona_type.or(title).filter(|t| !t.trim().is_empty()) {
            content.persona_type = kind;
        }
        if let Some(avatar) = avatar.filter(|a| !a.trim().is_empty()) {
            content.avatar = avatar;
        }

        let mut details = content.details.take().unwrap_or_default();
        if let Some(raw) = demographics {
            match serde_json::from_value::<Demographics>(raw.clone()) {
                Ok(parsed) => details.demographics = Some(parsed),
                Err(_) => {
                    additional.insert("demographics".to_string(), raw);
                }
            }
        }
        fill(&mut details.goals, string_list("goals", goals, &mut additional));
        fill(&mut details.frustrations, string_list("frustrations", frustrations, &mut additional));
        fill(&mut details.behaviors, string_list("behaviors", behaviors, &mut additional));
        fill(&mut details.motivations, string_list("motivations", motivations, &mut additional));
        fill(
            &mut details.preferred_channels,
            string_list("preferredChannels", preferred_channels, &mut additional),
        );
        match tech_proficiency {
            None | Some(Value::Null) => {}
            Some(Value::String(level)) => details.tech_proficiency = Some(level),
            Some(other) => {
                additional.insert("techProficiency".to_string(), other);
            }
        }
        content.details = if details.is_empty() { None } else { Some(details) };

        content.additional_attributes.extend(additional);
        Ok(())
    }
}

/// A list of strings stays a detail; any other shape is kept under `key`
/// in the extras.
fn string_list(key: &str, raw: Option<Value>, additional: &mut BTreeMap<String, Value>) -> Option<Vec<String>> {
    match raw? {
        Value::Null => None,
        Value::Array(items) if items.iter().all(Value::is_string) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        other => {
            additional.insert(key.to_string(), other);
            None
        }
    }
}

fn fill(target: &mut Vec<String>, value: Option<Vec<String>>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Where personas come from
#[async_trait]
pub trait PersonaSource: Send + Sync {
    async fn fetch_random_name(&self) -> Result<RandomName>;

    async fn expand_persona(&self, request: &ExpandRequest) -> Result<ExpandedDetails>;
}

/// HTTP implementation of [`PersonaSource`]
#[derive(Debug, Clone)]
pub struct RemotePersonaSource {
    client: reqwest::Client,
    config: BackendConfig,
}

impl RemotePersonaSource {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(self.config.api_key_header.as_str(), key),
            None => request,
        }
    }

    async fn check(service: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Upstream {
            service: service.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PersonaSource for RemotePersonaSource {
    async fn fetch_random_name(&self) -> Result<RandomName> {
        let request = self.authorize(self.client.get(&self.config.name_url));
        let response = Self::check("random-name", request.send().await?).await?;
        let name: RandomName = response.json().await?;
        debug!(name = %name.name, "Fetched random name");
        Ok(name)
    }

    async fn expand_persona(&self, request: &ExpandRequest) -> Result<ExpandedDetails> {
        let builder = self.authorize(self.client.post(&self.config.expand_url).json(request));
        let response = Self::check("expand-persona", builder.send().await?).await?;
        let details: ExpandedDetails = response.json().await?;
        debug!(name = %request.name, "Expanded persona");
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_for(server: &mockito::ServerGuard) -> BackendConfig {
        BackendConfig {
            name_url: format!("{}/api/random-name", server.url()),
            expand_url: format!("{}/api/expand-persona", server.url()),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    fn base_content() -> PersonaContent {
        PersonaContent::new("Ada Lovelace", "Random Users", "Curious mathematician", "a.png")
    }

    #[test]
    fn test_merge_replaces_and_fills() {
        let expanded: ExpandedDetails = serde_json::from_value(json!({
            "description": "Analyses every page in depth",
            "title": "Researcher",
            "goals": ["Find sources"],
            "techProficiency": "High",
            "demographics": {
                "age": 36, "gender": "female", "occupation": "Analyst",
                "education": "PhD", "location": "London"
            },
            "favoriteColor": "teal"
        }))
        .unwrap();

        let mut content = base_content();
        expanded.merge_into(&mut content).unwrap();

        assert_eq!(content.description, "Analyses every page in depth");
        assert_eq!(content.persona_type, "Researcher");
        assert_eq!(content.avatar, "a.png");
        let details = content.details.unwrap();
        assert_eq!(details.goals, vec!["Find sources".to_string()]);
        assert_eq!(details.tech_proficiency.as_deref(), Some("High"));
        assert_eq!(details.demographics.unwrap().age, 36.0);
        assert_eq!(content.additional_attributes["favoriteColor"], json!("teal"));
    }

    #[test]
    fn test_merge_without_description_is_rejected_untouched() {
        let expanded: ExpandedDetails =
            serde_json::from_value(json!({"title": "Researcher", "description": " "})).unwrap();
        let mut content = base_content();
        let err = expanded.merge_into(&mut content).unwrap_err();
        assert!(matches!(err, Error::InvalidPersona(_)));
        assert_eq!(content, base_content());
    }

    #[test]
    fn test_odd_demographics_are_kept_as_extras() {
        let expanded: ExpandedDetails = serde_json::from_value(json!({
            "description": "d",
            "demographics": [{"label": "Age", "value": "30"}]
        }))
        .unwrap();
        let mut content = base_content();
        expanded.merge_into(&mut content).unwrap();
        assert!(content.details.is_none());
        assert!(content.additional_attributes.contains_key("demographics"));
    }

    #[test]
    fn test_mistyped_detail_fields_are_kept_as_extras() {
        let expanded: ExpandedDetails = serde_json::from_value(json!({
            "description": "Reads reviews before buying",
            "goals": "Find a bargain",
            "behaviors": ["Compares prices", 3],
            "motivations": ["Saving money"],
            "techProficiency": {"level": 4}
        }))
        .unwrap();

        let mut content = base_content();
        expanded.merge_into(&mut content).unwrap();

        assert_eq!(content.description, "Reads reviews before buying");
        let details = content.details.unwrap();
        assert!(details.goals.is_empty());
        assert!(details.behaviors.is_empty());
        assert_eq!(details.motivations, vec!["Saving money".to_string()]);
        assert!(details.tech_proficiency.is_none());
        assert_eq!(content.additional_attributes["goals"], json!("Find a bargain"));
        assert_eq!(content.additional_attributes["behaviors"], json!(["Compares prices", 3]));
        assert_eq!(content.additional_attributes["techProficiency"], json!({"level": 4}));
    }

    #[tokio::test]
    async fn test_fetch_random_name_sends_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/random-name")
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"Grace Hopper","base_persona":"Navy engineer"}"#)
            .create_async()
            .await;

        let source = RemotePersonaSource::new(config_for(&server)).unwrap();
        let name = source.fetch_random_name().await.unwrap();
        assert_eq!(name.name, "Grace Hopper");
        assert_eq!(name.base_persona, "Navy engineer");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_random_name_non_success_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/random-name")
            .with_status(503)
            .with_body("down")
            .create_async()
            .await;

        let source = RemotePersonaSource::new(config_for(&server)).unwrap();
        match source.fetch_random_name().await {
            Err(Error::Upstream { status, message, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "down");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expand_posts_partial_persona() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/expand-persona")
            .match_body(mockito::Matcher::Json(json!({
                "name": "Ada Lovelace",
                "title": "Random Users",
                "description": "Curious mathematician"
            })))
            .with_status(200)
            .with_body(r#"{"description":"Expanded","goals":["g"]}"#)
            .create_async()
            .await;

        let source = RemotePersonaSource::new(config_for(&server)).unwrap();
        let expanded = source
            .expand_persona(&ExpandRequest::for_content(&base_content()))
            .await
            .unwrap();
        assert_eq!(expanded.description.as_deref(), Some("Expanded"));
        assert_eq!(expanded.goals, Some(json!(["g"])));
        mock.assert_async().await;
    }
}
