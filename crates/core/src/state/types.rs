//! # Domain Records
//!
//! The structured values that flow through the workflow state: branding,
//! feature plans, research findings, generated code, and validation reports.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, MIN_API_KEY_LEN};

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation that started the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Customer color palette, as CSS hex strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub text: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            primary: "#3ACCDD".to_string(),
            secondary: "#2196F3".to_string(),
            accent: "#F64060".to_string(),
            background: "#FFFFFF".to_string(),
            text: "#333333".to_string(),
        }
    }
}

/// Customer font choices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typography {
    pub primary_font: String,
    pub heading_font: String,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            primary_font: "'Inter', sans-serif".to_string(),
            heading_font: "'Poppins', sans-serif".to_string(),
        }
    }
}

/// Branding extracted from the customer website
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingData {
    #[serde(default)]
    pub website_url: Option<String>,
    pub colors: ColorScheme,
    pub typography: Typography,
    pub extraction_success: bool,
    pub fallback_used: bool,
    #[serde(default)]
    pub extraction_notes: String,
}

impl BrandingData {
    /// Default branding, flagged as a fallback
    pub fn fallback(website_url: Option<String>, reason: &str) -> Self {
        Self {
            website_url,
            colors: ColorScheme::default(),
            typography: Typography::default(),
            extraction_success: false,
            fallback_used: true,
            extraction_notes: format!("Fallback: {}", reason),
        }
    }
}

impl Default for BrandingData {
    fn default() -> Self {
        Self::fallback(None, "no website provided")
    }
}

/// One SDK capability the page should demonstrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SdkFeature {
    /// Short feature name
    pub name: String,
    /// What the feature demonstrates
    pub description: String,
    /// SDK calls used by the feature
    #[serde(default, deserialize_with = "flat_strings")]
    #[schemars(with = "Vec<String>")]
    pub sdk_methods: Vec<String>,
    /// How to wire it into the page
    #[serde(default)]
    pub implementation_notes: String,
    /// 1 is highest
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    1
}

/// The planned set of features plus page metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FeaturePlan {
    /// Features to implement, in priority order
    pub features: Vec<SdkFeature>,
    /// Title of the landing page
    pub page_title: String,
    /// One-sentence page description
    #[serde(default)]
    pub page_description: String,
    /// Constraints the design must respect
    #[serde(default)]
    pub branding_constraints: Option<String>,
}

impl FeaturePlan {
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }
}

/// Accepts `["a", ["b", "c"]]` and yields `["a", "b", "c"]`.
///
/// LLM structured output occasionally nests the method lists; they are
/// flattened once here so every consumer sees a flat sequence.
fn flat_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn collect(value: serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    collect(item, out);
                }
            }
            serde_json::Value::String(s) => out.push(s),
            serde_json::Value::Null => {}
            other => out.push(other.to_string()),
        }
    }

    let value = serde_json::Value::deserialize(deserializer)?;
    let mut out = Vec::new();
    collect(value, &mut out);
    Ok(out)
}

/// Findings from the documentation research stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub query: String,
    pub summary: String,
    pub implementation_guidance: String,
}

/// The current landing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub html: String,
    pub sdk_initialized: bool,
    pub features_implemented: Vec<String>,
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A single problem found in the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub fix_suggestion: Option<String>,
}

/// Outcome of one validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
    pub sdk_loaded: bool,
    pub console_errors: Vec<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    pub timestamp: String,
}

impl ValidationReport {
    /// Report used when browser validation is disabled
    pub fn skipped() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
            sdk_loaded: true,
            console_errors: Vec::new(),
            screenshots: Vec::new(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Failing report describing a validator crash
    pub fn infrastructure_failure(reason: &str) -> Self {
        Self {
            passed: false,
            issues: vec![ValidationIssue {
                severity: Severity::Error,
                category: "browser".to_string(),
                message: format!("Browser testing failed: {}", reason),
                fix_suggestion: Some(
                    "Check HTML syntax and Braze SDK integration".to_string(),
                ),
            }],
            sdk_loaded: false,
            console_errors: vec![reason.to_string()],
            screenshots: Vec::new(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }
}

/// SDK connection settings supplied by the caller
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub sdk_endpoint: String,
}

impl ApiConfig {
    /// Validate and normalize connection settings
    pub fn new(api_key: &str, sdk_endpoint: &str) -> Result<Self, ConfigError> {
        let api_key = api_key.trim();
        let actual = api_key.chars().count();
        if actual < MIN_API_KEY_LEN {
            return Err(ConfigError::ApiKeyTooShort {
                min: MIN_API_KEY_LEN,
                actual,
            });
        }
        let sdk_endpoint = sdk_endpoint.trim().trim_end_matches('/');
        if sdk_endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        Ok(Self {
            api_key: api_key.to_string(),
            sdk_endpoint: sdk_endpoint.to_string(),
        })
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("sdk_endpoint", &self.sdk_endpoint)
            .finish()
    }
}
