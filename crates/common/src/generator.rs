//! Client for the persona generate endpoint

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::types::{Audience, Persona, PersonaOrigin};
use crate::validation::validate_persona;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    url: &'a str,
    count: usize,
    persona_type: Audience,
}

#[derive(Debug, Clone)]
pub struct GeneratorClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GeneratorClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        Self::new(config.endpoint.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// Generate `count` personas for `url`
    pub async fn generate(&self, url: &str, count: usize, persona_type: Audience) -> Result<Vec<Persona>> {
        let request = GenerateRequest {
            url,
            count,
            persona_type,
        };
        info!(url, count, persona_type = %persona_type, "Requesting generated personas");

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(Error::Upstream {
                service: "generator".to_string(),
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let items = match body {
            Value::Array(items) => items,
            Value::Object(_) => vec![body],
            other => {
                return Err(Error::Validation(format!(
                    "generator returned neither an object nor an array: {}",
                    other
                )))
            }
        };

        let mut personas = Vec::with_capacity(items.len());
        for item in &items {
            let content = validate_persona(item)?;
            let mut persona = Persona::new(content, PersonaOrigin::Generated);
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                persona.id = id.to_string();
            }
            persona.expanded = true;
            personas.push(persona);
        }
        debug!(received = personas.len(), "Generated personas parsed");
        Ok(personas)
    }
}

fn error_message(body: &Value) -> String {
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Failed to generate persona");
    match body.get("details") {
        Some(Value::String(details)) => format!("{}: {}", error, details),
        Some(Value::Array(details)) => {
            let parts: Vec<String> = details
                .iter()
                .map(|d| d.as_str().map(String::from).unwrap_or_else(|| d.to_string()))
                .collect();
            format!("{}: {}", error, parts.join(", "))
        }
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn persona_json(name: &str) -> Value {
        json!({
            "id": format!("id-{}", name),
            "name": name,
            "avatar": "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d",
            "type": "Tech Professional",
            "description": "Software developer",
            "demographics": {
                "age": 32, "gender": "Male", "occupation": "Engineer",
                "education": "BSc", "location": "Austin, TX"
            },
            "goals": ["Ship"],
            "frustrations": ["Docs"],
            "behaviors": ["Reads code"],
            "motivations": ["Growth"],
            "techProficiency": "Expert",
            "preferredChannels": ["GitHub"],
            "status": "idle",
            "isLocked": false,
            "messages": []
        })
    }

    #[tokio::test]
    async fn test_generate_accepts_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_body(mockito::Matcher::Json(json!({
                "url": "github.com", "count": 2, "personaType": "potential"
            })))
            .with_status(200)
            .with_body(json!([persona_json("Michael"), persona_json("Ana")]).to_string())
            .create_async()
            .await;

        let client = GeneratorClient::new(format!("{}/generate", server.url()), Duration::from_secs(5)).unwrap();
        let personas = client.generate("github.com", 2, Audience::Potential).await.unwrap();
        assert_eq!(personas.len(), 2);
        assert_eq!(personas[0].id, "id-Michael");
        assert_eq!(personas[1].name(), "Ana");
        assert_eq!(personas[0].origin, PersonaOrigin::Generated);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_accepts_single_object() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/generate")
            .with_status(200)
            .with_body(persona_json("Solo").to_string())
            .create_async()
            .await;

        let client = GeneratorClient::new(format!("{}/generate", server.url()), Duration::from_secs(5)).unwrap();
        let personas = client.generate("github.com", 1, Audience::Random).await.unwrap();
        assert_eq!(personas.len(), 1);
        assert_eq!(personas[0].name(), "Solo");
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/generate")
            .with_status(500)
            .with_body(r#"{"error":"Failed to generate personas","details":"quota exceeded"}"#)
            .create_async()
            .await;

        let client = GeneratorClient::new(format!("{}/generate", server.url()), Duration::from_secs(5)).unwrap();
        match client.generate("github.com", 1, Audience::Random).await {
            Err(Error::Upstream { status, message, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Failed to generate personas: quota exceeded");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
