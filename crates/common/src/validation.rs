//! Shape validation for generated persona JSON

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{Demographics, Persona, PersonaContent, PersonaDetails};

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Str,
    List,
    Object,
    Number,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::Str => "string",
            Kind::List => "list",
            Kind::Object => "object",
            Kind::Number => "number",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Kind::Str => value.is_string(),
            Kind::List => value.is_array(),
            Kind::Object => value.is_object(),
            Kind::Number => value.is_number(),
        }
    }
}

const FIELDS: &[(&str, Kind)] = &[
    ("name", Kind::Str),
    ("avatar", Kind::Str),
    ("type", Kind::Str),
    ("description", Kind::Str),
    ("demographics", Kind::Object),
    ("goals", Kind::List),
    ("frustrations", Kind::List),
    ("behaviors", Kind::List),
    ("motivations", Kind::List),
    ("techProficiency", Kind::Str),
    ("preferredChannels", Kind::List),
];

const DEMOGRAPHIC_FIELDS: &[(&str, Kind)] = &[
    ("age", Kind::Number),
    ("gender", Kind::Str),
    ("occupation", Kind::Str),
    ("education", Kind::Str),
    ("location", Kind::Str),
];

/// Slot fields the generator adds itself; never copied from model output
const SLOT_FIELDS: &[&str] = &["id", "status", "isLocked", "messages", "expanded", "origin"];

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn check_fields(
    object: &Map<String, Value>,
    fields: &[(&str, Kind)],
    label: &str,
    errors: &mut Vec<String>,
) {
    for (field, kind) in fields {
        match object.get(*field) {
            None | Some(Value::Null) => errors.push(format!("Missing {}field: {}", label, field)),
            Some(value) if !kind.matches(value) => errors.push(format!(
                "Invalid type for {}{}: expected {}, got {}",
                label,
                field,
                kind.name(),
                type_name(value)
            )),
            Some(Value::Array(items)) if !items.iter().all(Value::is_string) => {
                errors.push(format!("All items in {} must be strings", field))
            }
            Some(_) => {}
        }
    }
}

/// Check a generated persona against the full persona shape.
///
/// Every problem is collected; the error lists all of them. On success the
/// persona content is returned, with unrecognised keys kept as additional
/// attributes.
pub fn validate_persona(value: &Value) -> Result<PersonaContent> {
    let object = value.as_object().ok_or_else(|| {
        Error::InvalidPersona(vec![format!(
            "Invalid persona: expected object, got {}",
            type_name(value)
        )])
    })?;

    let mut errors = Vec::new();
    check_fields(object, FIELDS, "", &mut errors);
    if let Some(Value::Object(demographics)) = object.get("demographics") {
        check_fields(demographics, DEMOGRAPHIC_FIELDS, "demographic ", &mut errors);
    }
    if !errors.is_empty() {
        return Err(Error::InvalidPersona(errors));
    }

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let list = |key: &str| -> Vec<String> {
        object
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default()
    };

    let demographics: Demographics = serde_json::from_value(object["demographics"].clone())?;
    let details = PersonaDetails {
        demographics: Some(demographics),
        goals: list("goals"),
        frustrations: list("frustrations"),
        behaviors: list("behaviors"),
        motivations: list("motivations"),
        tech_proficiency: Some(text("techProficiency")),
        preferred_channels: list("preferredChannels"),
    };

    let known: Vec<&str> = FIELDS.iter().map(|(f, _)| *f).collect();
    let additional_attributes: BTreeMap<String, Value> = object
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()) && !SLOT_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut content = PersonaContent::new(text("name"), text("type"), text("description"), text("avatar"));
    content.details = Some(details);
    content.additional_attributes = additional_attributes;
    Ok(content)
}

/// The persona as a flat JSON document in the shape [`validate_persona`]
/// accepts: detail fields at the top level, extras merged in, and only the
/// `id`, `status`, `isLocked` and `messages` slot fields.
pub fn persona_document(persona: &Persona) -> Result<Value> {
    let content = &persona.content;
    let details = content.details.clone().unwrap_or_default();

    let mut object = Map::new();
    for (key, value) in &content.additional_attributes {
        object.insert(key.clone(), value.clone());
    }
    object.insert("id".into(), Value::String(persona.id.clone()));
    object.insert("name".into(), Value::String(content.name.clone()));
    object.insert("avatar".into(), Value::String(content.avatar.clone()));
    object.insert("type".into(), Value::String(content.persona_type.clone()));
    object.insert("description".into(), Value::String(content.description.clone()));
    if let Some(demographics) = &details.demographics {
        object.insert("demographics".into(), serde_json::to_value(demographics)?);
    }
    object.insert("goals".into(), serde_json::to_value(&details.goals)?);
    object.insert("frustrations".into(), serde_json::to_value(&details.frustrations)?);
    object.insert("behaviors".into(), serde_json::to_value(&details.behaviors)?);
    object.insert("motivations".into(), serde_json::to_value(&details.motivations)?);
    if let Some(level) = &details.tech_proficiency {
        object.insert("techProficiency".into(), Value::String(level.clone()));
    }
    object.insert("preferredChannels".into(), serde_json::to_value(&details.preferred_channels)?);
    object.insert("status".into(), serde_json::to_value(persona.status)?);
    object.insert("isLocked".into(), Value::Bool(persona.is_locked));
    object.insert("messages".into(), serde_json::to_value(&persona.messages)?);
    Ok(Value::Object(object))
}
