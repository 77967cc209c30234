//! Default prompt templates bundled at compile time.
//!
//! Templates use `{name}` placeholders filled by [`render`].

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Planning - turns the request into a feature plan
pub const PLANNING: &str = include_str!("defaults/planning.md");

/// Research - tool-using documentation agent
pub const RESEARCH: &str = include_str!("defaults/research.md");

/// Code generation - writes the landing page
pub const CODE_GENERATION: &str = include_str!("defaults/code_generation.md");

/// Validation - PASS/FAIL judge over the browser report
pub const VALIDATION: &str = include_str!("defaults/validation.md");

/// Refinement - surgical fixes for validation issues
pub const REFINEMENT: &str = include_str!("defaults/refinement.md");

/// Finalization - production polish
pub const FINALIZATION: &str = include_str!("defaults/finalization.md");

/// All default prompts with their slugs
#[cfg(test)]
fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("planning", PLANNING),
        ("research", RESEARCH),
        ("code_generation", CODE_GENERATION),
        ("validation", VALIDATION),
        ("refinement", REFINEMENT),
        ("finalization", FINALIZATION),
    ]
}

/// Replace each `{key}` in `template` with its value.
///
/// One pass over the template: placeholders inside substituted values are
/// left as written. Unknown keys stay in place.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder = PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("static regex"));

    placeholder
        .replace_all(template, |caps: &Captures| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_non_empty() {
        for (slug, content) in all_defaults() {
            assert!(content.len() > 50, "Prompt '{}' seems too short", slug);
        }
    }

    #[test]
    fn test_render_fills_placeholders() {
        let out = render("Hello {name}, {name}! {other}", &[("name", "Ada")]);
        assert_eq!(out, "Hello Ada, Ada! {other}");
    }

    #[test]
    fn test_render_leaves_placeholders_in_values_alone() {
        let out = render(
            "Request: {user_request}\n{branding_section}",
            &[
                ("user_request", "Use {branding_section} and {primary_color}"),
                ("branding_section", "## Branding"),
            ],
        );
        assert_eq!(
            out,
            "Request: Use {branding_section} and {primary_color}\n## Branding"
        );
    }

    #[test]
    fn test_templates_keep_initialization_rule() {
        for prompt in [CODE_GENERATION, REFINEMENT, FINALIZATION] {
            assert!(prompt.contains("braze.initialize()"));
        }
    }
}
