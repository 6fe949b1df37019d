//! Persona generate function
//!
//! Serverless-style entry point: takes invocation arguments, asks an LLM for
//! one or more personas and answers with a `{statusCode, body}` envelope.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use personatest_common::llm::ChatModel;
use personatest_common::validation::{persona_document, validate_persona};
use personatest_common::{Audience, Error, Persona, PersonaOrigin};

pub const MAX_COUNT: u64 = 10;

pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "POST, OPTIONS"),
    ("access-control-allow-headers", "Content-Type"),
];

pub const SYSTEM_PROMPT: &str = "You are a UX research expert who creates detailed user personas. \
You must respond with valid JSON that EXACTLY matches the schema provided, including all fields \
with appropriate types. Do not include any explanation or text outside the JSON object.";

const PERSONA_SHAPE: &str = r#"{
  "name": string,
  "avatar": string (an Unsplash URL),
  "type": string (their primary user type),
  "description": string (a one-line summary),
  "demographics": {
    "age": number,
    "gender": string,
    "occupation": string,
    "education": string,
    "location": string
  },
  "goals": string[],
  "frustrations": string[],
  "behaviors": string[],
  "motivations": string[],
  "techProficiency": string,
  "preferredChannels": string[]
}"#;

/// User prompt for one persona of the given audience
pub fn persona_prompt(url: &str, audience: Audience) -> String {
    match audience {
        Audience::Random => format!(
            "Create a random user persona with diverse interests and backgrounds who visits this website: {}\n\
             The persona should be realistic but not necessarily interested in this type of website.\n\
             You must return a JSON object with EXACTLY this structure:\n{}",
            url, PERSONA_SHAPE
        ),
        Audience::Potential => format!(
            "Create a detailed UX persona who would be a potential user of this website: {}\n\
             The persona should be realistic and specific to this type of website.\n\
             You must return a JSON object with EXACTLY this structure:\n{}",
            url, PERSONA_SHAPE
        ),
    }
}

/// Function result: an HTTP-like status code and a JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
}

impl FunctionResponse {
    fn ok(body: Value) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }

    fn error(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateParams {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    count: Option<Value>,
    #[serde(default)]
    persona_type: Option<String>,
}

/// Parameters come from `__ow_body` (a JSON string) when present, otherwise
/// from the arguments themselves.
fn extract_params(args: &Value) -> std::result::Result<GenerateParams, String> {
    let raw = match args.get("__ow_body") {
        Some(Value::String(body)) => {
            serde_json::from_str::<Value>(body).map_err(|e| format!("Invalid request body: {}", e))?
        }
        Some(other) => other.clone(),
        None => args.clone(),
    };
    if raw.is_null() {
        return Ok(GenerateParams::default());
    }
    serde_json::from_value(raw).map_err(|e| format!("Invalid request body: {}", e))
}

fn parse_count(count: &Value) -> std::result::Result<Option<u64>, String> {
    let n = match count {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match n {
        Some(0) => Ok(None),
        Some(n) if n <= MAX_COUNT => Ok(Some(n)),
        _ => Err(format!("count must be between 1 and {}", MAX_COUNT)),
    }
}

/// Strip a Markdown code fence some models wrap JSON in
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Ask the model for one persona and validate it
pub async fn generate_persona(model: &dyn ChatModel, url: &str, audience: Audience) -> personatest_common::Result<Persona> {
    let prompt = persona_prompt(url, audience);
    let text = model.complete(SYSTEM_PROMPT, &prompt).await?;
    let value: Value = serde_json::from_str(strip_fence(&text))
        .map_err(|e| Error::Llm(format!("Invalid JSON response: {}", e)))?;
    let content = validate_persona(&value)?;
    let mut persona = Persona::new(content, PersonaOrigin::Generated);
    persona.expanded = true;
    debug!(name = %persona.content.name, "Generated persona");
    Ok(persona)
}

fn failure(e: Error) -> FunctionResponse {
    match e {
        Error::InvalidPersona(details) => {
            warn!(?details, "Generated persona failed validation");
            FunctionResponse::error(422, json!({"error": "Invalid persona", "details": details}))
        }
        other => {
            error!(error = %other, "Persona generation failed");
            FunctionResponse::error(
                500,
                json!({"error": "Failed to generate personas", "details": other.to_string()}),
            )
        }
    }
}

/// Run the generate function
pub async fn invoke(args: Value, model: &dyn ChatModel) -> FunctionResponse {
    let params = match extract_params(&args) {
        Ok(params) => params,
        Err(message) => return FunctionResponse::error(400, json!({"error": message})),
    };

    let url = match params.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => return FunctionResponse::error(400, json!({"error": "URL is required"})),
    };

    let audience = match params.persona_type.as_deref() {
        None => Audience::Potential,
        Some(kind) => match kind.parse::<Audience>() {
            Ok(audience) => audience,
            Err(e) => return FunctionResponse::error(400, json!({"error": e.to_string()})),
        },
    };

    let count = match params.count.as_ref().map(parse_count).transpose() {
        Ok(count) => count.flatten(),
        Err(message) => return FunctionResponse::error(400, json!({"error": message})),
    };

    match count {
        Some(count) => {
            info!(url, count, audience = %audience, "Generating personas");
            let calls = (0..count).map(|_| generate_persona(model, &url, audience));
            let results: personatest_common::Result<Vec<Persona>> = join_all(calls).await.into_iter().collect();
            let body = results.and_then(|personas| {
                personas
                    .iter()
                    .map(persona_document)
                    .collect::<personatest_common::Result<Vec<Value>>>()
                    .map(Value::Array)
            });
            match body {
                Ok(body) => FunctionResponse::ok(body),
                Err(e) => failure(e),
            }
        }
        None => {
            info!(url, audience = %audience, "Generating single persona");
            match generate_persona(model, &url, audience)
                .await
                .and_then(|persona| persona_document(&persona))
            {
                Ok(body) => FunctionResponse::ok(body),
                Err(e) => failure(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personatest_common::testing::ScriptedModel;

    fn persona_text(name: &str) -> String {
        json!({
            "name": name,
            "avatar": "https://images.unsplash.com/photo-1494790108377-be9c29b29330",
            "type": "Digital Native",
            "description": "Tech-savvy professional",
            "demographics": {
                "age": 28, "gender": "Female", "occupation": "Product Manager",
                "education": "MBA", "location": "San Francisco, CA"
            },
            "goals": ["Streamline workflows"],
            "frustrations": ["Slow loading times"],
            "behaviors": ["Mobile first"],
            "motivations": ["Career growth"],
            "techProficiency": "High",
            "preferredChannels": ["Mobile apps"]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_missing_url() {
        let model = ScriptedModel::new();
        let response = invoke(json!({"count": 2}), &model).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.body, json!({"error": "URL is required"}));
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_single_persona_from_ow_body() {
        let model = ScriptedModel::new().respond(persona_text("Sarah Chen"));
        let args = json!({"__ow_body": r#"{"url":"github.com"}"#});

        let response = invoke(args, &model).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["name"], "Sarah Chen");
        assert_eq!(response.body["status"], "idle");
        assert_eq!(response.body["isLocked"], false);
        assert_eq!(response.body["messages"], json!([]));
        assert!(response.body["id"].is_string());

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].1.contains("potential user of this website: github.com"));
    }

    #[tokio::test]
    async fn test_count_returns_array() {
        let model = ScriptedModel::new()
            .respond(persona_text("A"))
            .respond(format!("```json\n{}\n```", persona_text("B")))
            .respond(persona_text("C"));
        let args = json!({"url": "github.com", "count": 3, "personaType": "random"});

        let response = invoke(args, &model).await;
        assert_eq!(response.status_code, 200);
        let body = response.body.as_array().unwrap();
        assert_eq!(body.len(), 3);
        assert!(model.prompts()[0].1.starts_with("Create a random user persona"));
    }

    #[tokio::test]
    async fn test_body_has_the_persona_shape() {
        let model = ScriptedModel::new().respond(persona_text("Sarah Chen"));
        let response = invoke(json!({"url": "github.com"}), &model).await;
        assert_eq!(response.status_code, 200);

        let content = validate_persona(&response.body).unwrap();
        assert_eq!(content.name, "Sarah Chen");
        assert_eq!(response.body["goals"], json!(["Streamline workflows"]));
        assert_eq!(response.body["demographics"]["occupation"], "Product Manager");
        for internal in ["details", "origin", "expanded"] {
            assert!(response.body.get(internal).is_none(), "{} leaked", internal);
        }
    }

    #[tokio::test]
    async fn test_count_out_of_range() {
        let model = ScriptedModel::new();
        let response = invoke(json!({"url": "github.com", "count": 11}), &model).await;
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn test_llm_failure_is_500() {
        let model = ScriptedModel::new().fail("quota exceeded");
        let response = invoke(json!({"url": "github.com"}), &model).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body["error"], "Failed to generate personas");
        assert!(response.body["details"].as_str().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_bad_shape_is_422() {
        let model = ScriptedModel::new().respond(r#"{"name": "Half"}"#);
        let response = invoke(json!({"url": "github.com"}), &model).await;
        assert_eq!(response.status_code, 422);
        assert_eq!(response.body["error"], "Invalid persona");
        assert!(response.body["details"]
            .as_array()
            .unwrap()
            .contains(&json!("Missing field: avatar")));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_500() {
        let model = ScriptedModel::new().respond("Sure! Here is a persona.");
        let response = invoke(json!({"url": "github.com"}), &model).await;
        assert_eq!(response.status_code, 500);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(&json!(3)), Ok(Some(3)));
        assert_eq!(parse_count(&json!("4")), Ok(Some(4)));
        assert_eq!(parse_count(&json!(0)), Ok(None));
        assert!(parse_count(&json!(-1)).is_err());
        assert!(parse_count(&json!("lots")).is_err());
    }
}
