//! # Planning Stage
//!
//! Resolves the customer website, extracts its branding and turns the user
//! request into a [`FeaturePlan`]. Every expected failure is absorbed: an
//! unusable plan from the model is replaced by the deterministic default plan.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use url::Url;

use super::prompts::{self, render};
use super::{cancelled_update, Stage, StageContext, StageId};
use crate::llm::{complete_as, LlmBackend};
use crate::state::{BrandingData, FeaturePlan, NextStep, SdkFeature, StateUpdate, WorkflowState};
use crate::tools::BrandingExtractor;

/// Placeholder domains never treated as a customer site
const IGNORED_DOMAINS: &[&str] = &["example.com", "test.com"];

const USER_PROMPT: &str = "Create the feature plan based on the user request.";

pub struct PlanningStage {
    llm: Arc<dyn LlmBackend>,
    branding: Arc<dyn BrandingExtractor>,
}

impl PlanningStage {
    pub fn new(llm: Arc<dyn LlmBackend>, branding: Arc<dyn BrandingExtractor>) -> Self {
        Self { llm, branding }
    }
}

#[async_trait]
impl Stage for PlanningStage {
    fn id(&self) -> StageId {
        StageId::Planning
    }

    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate {
        let request = state.latest_user_message();

        let url = state
            .customer_website_url
            .clone()
            .or_else(|| extract_url(request));
        if let Some(url) = &url {
            info!(url = %url, "Resolved customer website");
        }

        let branding = match &url {
            Some(url) => {
                ctx.status(StageId::Planning, format!("Analyzing branding of {}", url));
                let Ok(branding) = ctx.guard(self.branding.analyze(url)).await else {
                    return cancelled_update();
                };
                if branding.fallback_used {
                    warn!(url = %url, notes = %branding.extraction_notes, "Branding extraction fell back to defaults");
                }
                Some(branding)
            }
            None => None,
        };

        let system = planning_prompt(request, url.as_deref(), branding.as_ref());
        ctx.status(StageId::Planning, "Creating feature plan");
        let planned = ctx
            .guard(complete_as::<FeaturePlan>(self.llm.as_ref(), &system, USER_PROMPT))
            .await;

        let plan = match planned {
            Err(_) => return cancelled_update(),
            Ok(Ok(plan)) if !plan.features.is_empty() => plan,
            Ok(Ok(_)) => {
                warn!("Feature plan came back empty, using default plan");
                default_plan(url.as_deref())
            }
            Ok(Err(e)) => {
                warn!("Error creating feature plan: {:#}", e);
                default_plan(url.as_deref())
            }
        };
        info!(features = plan.features.len(), title = %plan.page_title, "Created feature plan");

        StateUpdate {
            customer_website_url: url,
            branding_data: branding,
            feature_plan: Some(plan),
            ..StateUpdate::route(NextStep::Research)
        }
    }
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("static regex"))
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}\b").expect("static regex"))
}

/// First explicit http(s) URL in `message`
pub fn first_http_url(message: &str) -> Option<String> {
    url_regex().find(message).map(|m| m.as_str().to_string())
}

/// First website mentioned in `message`.
///
/// An explicit http(s) URL wins; otherwise the first domain-like token that
/// is not a placeholder domain gets an `https://` scheme.
pub fn extract_url(message: &str) -> Option<String> {
    if let Some(url) = first_http_url(message) {
        return Some(url);
    }
    domain_regex()
        .find_iter(message)
        .map(|m| m.as_str())
        .find(|d| !IGNORED_DOMAINS.contains(d))
        .map(|d| format!("https://{}", d))
}

/// Capitalized first label of the URL's host, without `www.`
pub fn domain_label(url: Option<&str>) -> String {
    let host = url
        .and_then(|u| Url::parse(u).ok())
        .and_then(|u| u.host_str().map(str::to_string));
    let Some(host) = host else {
        return "Customer".to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);
    match host.split('.').next() {
        Some(label) if !label.is_empty() => capitalize(label),
        _ => "Customer".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Two-feature plan used whenever the model cannot produce one
pub fn default_plan(url: Option<&str>) -> FeaturePlan {
    let domain = domain_label(url);
    FeaturePlan {
        features: vec![
            SdkFeature {
                name: "User Tracking".to_string(),
                description: "Track custom events for user interactions".to_string(),
                sdk_methods: vec!["braze.logCustomEvent()".to_string()],
                implementation_notes: "Add event tracking to buttons and form submissions"
                    .to_string(),
                priority: 1,
            },
            SdkFeature {
                name: "User Attributes".to_string(),
                description: "Collect and set user attributes".to_string(),
                sdk_methods: vec![
                    "braze.getUser().setEmail()".to_string(),
                    "braze.getUser().setFirstName()".to_string(),
                ],
                implementation_notes: "Create a form to collect user information".to_string(),
                priority: 1,
            },
        ],
        page_title: format!("Braze SDK Demo - {}", domain),
        page_description: format!("Interactive Braze SDK demonstration for {}", domain),
        branding_constraints: url.map(|_| "Use customer branding colors and fonts".to_string()),
    }
}

fn planning_prompt(request: &str, url: Option<&str>, branding: Option<&BrandingData>) -> String {
    let (branding_section, constraints) = match branding {
        Some(b) => (
            format!(
                "## Customer Branding\n\n**Colors**:\n- Primary: {}\n- Secondary: {}\n- Accent: {}\n- Background: {}\n- Text: {}\n\n**Typography**:\n- Primary Font: {}\n- Heading Font: {}\n\n**Extraction Status**: {}",
                b.colors.primary,
                b.colors.secondary,
                b.colors.accent,
                b.colors.background,
                b.colors.text,
                b.typography.primary_font,
                b.typography.heading_font,
                if b.extraction_success {
                    "Successfully extracted"
                } else {
                    "Using defaults"
                }
            ),
            format!(
                "Use the extracted colors and fonts from {}",
                url.unwrap_or("the customer website")
            ),
        ),
        None => (
            "**No branding data available** - will use Braze default branding".to_string(),
            "Use Braze default branding (teal and coral colors, Inter font)".to_string(),
        ),
    };

    render(
        prompts::PLANNING,
        &[
            ("user_request", request),
            ("website_url", url.unwrap_or("Not provided")),
            ("branding_section", &branding_section),
            ("branding_constraints", &constraints),
        ],
    )
}
