//! Persona commands: validate, placeholders, generate

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::time::Duration;

use personatest_common::placeholder::placeholder_persona;
use personatest_common::url::ProxyProbe;
use personatest_common::{
    normalize_url, AppConfig, Audience, AvailabilityCheck, GeneratorClient, Persona, TestReport,
};

use crate::output::{print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay};

/// Persona display wrapper for serialization
#[derive(Debug, Serialize)]
pub struct PersonaDisplay {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub persona_type: String,
    pub status: String,
    pub origin: String,
    pub locked: bool,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_elapsed: Option<f64>,
}

impl From<&Persona> for PersonaDisplay {
    fn from(persona: &Persona) -> Self {
        Self {
            id: persona.id.clone(),
            name: persona.content.name.clone(),
            persona_type: persona.content.persona_type.clone(),
            status: persona.status.to_string(),
            origin: persona.origin.to_string(),
            locked: persona.is_locked,
            expanded: persona.expanded,
            feedback: persona.feedback.clone(),
            time_elapsed: persona.time_elapsed,
        }
    }
}

impl TableDisplay for PersonaDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Type", "Status", "Origin", "Time", "Feedback"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.chars().take(8).collect(),
            if self.locked {
                format!("{} (locked)", self.name)
            } else {
                self.name.clone()
            },
            self.persona_type.clone(),
            self.status.clone(),
            self.origin.clone(),
            self.time_elapsed.map(|t| format!("{:.1}s", t)).unwrap_or_default(),
            self.feedback.clone().unwrap_or_default(),
        ]
    }
}

pub fn persona_rows(personas: &[Persona]) -> Vec<PersonaDisplay> {
    personas.iter().map(PersonaDisplay::from).collect()
}

/// Report display wrapper
#[derive(Debug, Serialize)]
pub struct ReportDisplay<'a>(pub &'a TestReport);

impl TableDisplay for ReportDisplay<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["URL", "Score", "Tests", "Summary"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.0.url.clone(),
            format!("{}/100", self.0.overall_score),
            format!("{}/{}", self.0.completed_tests, self.0.total_tests),
            self.0.summary.clone(),
        ]
    }
}

#[derive(Args)]
pub struct ValidateArgs {
    /// URL to validate
    pub url: String,

    /// Also check that the site answers through the reachability proxy
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub url: String,
    pub normalized: Option<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

impl TableDisplay for ValidationResult {
    fn headers() -> Vec<&'static str> {
        vec!["URL", "Normalized", "Valid", "Available"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.url.clone(),
            self.normalized.clone().unwrap_or_else(|| "-".to_string()),
            self.valid.to_string(),
            self.available.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
        ]
    }
}

pub async fn validate(args: ValidateArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let normalized = normalize_url(&args.url).ok().map(|u| u.to_string());
    let valid = normalized.is_some();

    let available = if args.check && valid {
        let probe = ProxyProbe::new(
            config.probe.proxy_url.clone(),
            Duration::from_secs(config.probe.timeout_secs),
        )?;
        Some(probe.is_available(&args.url).await)
    } else {
        None
    };

    let result = ValidationResult {
        url: args.url,
        normalized,
        valid,
        available,
    };
    print_item(&result, format);
    if format.is_interactive() && !(result.valid && result.available.unwrap_or(true)) {
        print_warning("URL cannot be tested");
    }
    Ok(())
}

pub fn placeholders(count: usize, format: OutputFormat) {
    let personas: Vec<Persona> = (0..count).map(placeholder_persona).collect();
    print_list(&persona_rows(&personas), format);
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Website the personas should visit
    #[arg(long)]
    pub url: String,

    /// Number of personas (1-10)
    #[arg(short, long, default_value = "1")]
    pub count: usize,

    /// Persona population: random or potential
    #[arg(long, default_value = "potential")]
    pub persona_type: Audience,

    /// Generate endpoint, overriding configuration
    #[arg(long)]
    pub endpoint: Option<String>,
}

pub async fn generate(args: GenerateArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let mut generator_config = config.generator.clone();
    if let Some(endpoint) = args.endpoint {
        generator_config.endpoint = endpoint;
    }
    let client = GeneratorClient::from_config(&generator_config)?;
    let personas = client.generate(&args.url, args.count, args.persona_type).await?;

    match format {
        // Full persona documents, details included
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&personas)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&personas)?),
        _ => {
            print_list(&persona_rows(&personas), format);
            print_success(&format!("Generated {} persona(s) for {}", personas.len(), args.url));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use personatest_common::PersonaStatus;

    #[test]
    fn test_persona_row() {
        let mut persona = placeholder_persona(0).with_id("0123456789abcdef");
        persona.is_locked = true;
        persona.status = PersonaStatus::Completed;
        persona.time_elapsed = Some(3.4);
        persona.feedback = Some("Navigation was intuitive".into());

        let row = PersonaDisplay::from(&persona).row();
        assert_eq!(row[0], "01234567");
        assert!(row[1].ends_with("(locked)"));
        assert_eq!(row[3], "completed");
        assert_eq!(row[4], "placeholder");
        assert_eq!(row[5], "3.4s");
        assert_eq!(row[6], "Navigation was intuitive");
    }

    #[test]
    fn test_report_row() {
        let mut report = TestReport::new("https://github.com/", 5);
        report.overall_score = 75;
        let row = ReportDisplay(&report).row();
        assert_eq!(row[1], "75/100");
        assert_eq!(row[2], "0/5");
    }
}
