//! # HTML Helpers
//!
//! Normalization of raw LLM output into a standalone document, and the base
//! page skeleton carrying the real SDK initialization.

use crate::state::{ApiConfig, BrandingData};

const DOCTYPE: &str = "<!DOCTYPE html>";
const SDK_SCRIPT_URL: &str = "https://js.appboycdn.com/web-sdk/6.5/braze.min.js";

/// Turn raw model output into an HTML document.
///
/// Takes the interior of an `html` fenced block if present, else the first
/// fenced block, else the whole text. The result is trimmed and gets a
/// doctype line when it starts with an `<html` root tag but has none.
pub fn normalize_html(raw: &str) -> String {
    let body = fenced_block(raw).unwrap_or(raw).trim();

    if !starts_with_ignore_case(body, "<!doctype") && starts_with_ignore_case(body, "<html") {
        format!("{}\n{}", DOCTYPE, body)
    } else {
        body.to_string()
    }
}

fn fenced_block(raw: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets aligned with `raw`
    let lower = raw.to_ascii_lowercase();

    if let Some(idx) = lower.find("```html") {
        let start = idx + "```html".len();
        return Some(until_fence(&raw[start..]));
    }

    let idx = raw.find("```")?;
    let mut rest = &raw[idx + 3..];
    // skip an info string such as ```xml or ```
    if let Some(newline) = rest.find('\n') {
        let info = &rest[..newline];
        if !info.contains('<') {
            rest = &rest[newline + 1..];
        }
    }
    Some(until_fence(rest))
}

fn until_fence(text: &str) -> &str {
    match text.find("```") {
        Some(end) => &text[..end],
        None => text,
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Escape a value for a single-quoted JavaScript string literal
fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\x3C"),
            _ => out.push(c),
        }
    }
    out
}

fn html_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Base page with the SDK loaded and initialized with the caller's settings
pub fn base_template(api: &ApiConfig, branding: &BrandingData, title: &str) -> String {
    let colors = &branding.colors;
    let fonts = &branding.typography;
    format!(
        r#"{doctype}
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        :root {{
            --color-primary: {primary};
            --color-secondary: {secondary};
            --color-accent: {accent};
            --color-background: {background};
            --color-text: {text};
        }}
        body {{
            margin: 0;
            font-family: {body_font};
            background: var(--color-background);
            color: var(--color-text);
        }}
        h1, h2, h3 {{
            font-family: {heading_font};
            color: var(--color-primary);
        }}
    </style>
    <script src="{sdk_url}"></script>
    <script>
        braze.initialize('{api_key}', {{
            baseUrl: '{endpoint}',
            enableLogging: true
        }});
        braze.openSession();
    </script>
</head>
<body>
</body>
</html>"#,
        doctype = DOCTYPE,
        title = html_text(title),
        primary = colors.primary,
        secondary = colors.secondary,
        accent = colors.accent,
        background = colors.background,
        text = colors.text,
        body_font = fonts.primary_font,
        heading_font = fonts.heading_font,
        sdk_url = SDK_SCRIPT_URL,
        api_key = js_string(&api.api_key),
        endpoint = js_string(&api.sdk_endpoint),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_fence_interior_is_extracted() {
        let raw = "Here you go:\n```html\n<html><body>Hi</body></html>\n```\nEnjoy!";
        assert_eq!(
            normalize_html(raw),
            "<!DOCTYPE html>\n<html><body>Hi</body></html>"
        );
    }

    #[test]
    fn test_uppercase_fence_tag() {
        let raw = "```HTML\n<!DOCTYPE html>\n<html></html>\n```";
        assert_eq!(normalize_html(raw), "<!DOCTYPE html>\n<html></html>");
    }

    #[test]
    fn test_generic_fence_is_used_when_untagged() {
        let raw = "```\n<html><p>x</p></html>\n```";
        assert_eq!(normalize_html(raw), "<!DOCTYPE html>\n<html><p>x</p></html>");
    }

    #[test]
    fn test_generic_fence_with_other_info_string() {
        let raw = "```xml\n<div>fragment</div>\n```";
        assert_eq!(normalize_html(raw), "<div>fragment</div>");
    }

    #[test]
    fn test_unclosed_fence_takes_rest() {
        let raw = "```html\n<html><body>cut off";
        assert_eq!(normalize_html(raw), "<!DOCTYPE html>\n<html><body>cut off");
    }

    #[test]
    fn test_plain_text_passes_through_trimmed() {
        assert_eq!(normalize_html("  <div>hi</div>\n"), "<div>hi</div>");
        assert_eq!(normalize_html("no markup"), "no markup");
    }

    #[test]
    fn test_existing_doctype_is_not_duplicated() {
        let raw = "<!doctype html>\n<html></html>";
        assert_eq!(normalize_html(raw), raw);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            "```html\n<html><body>A</body></html>\n```",
            "<HTML><body>B</body></HTML>",
            "```\n<!DOCTYPE html><html></html>\n```",
            "  just text  ",
        ];
        for input in inputs {
            let once = normalize_html(input);
            assert_eq!(normalize_html(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_base_template_embeds_real_credentials() {
        let api = ApiConfig {
            api_key: "abc'def-0000-1111-2222-333344445555".to_string(),
            sdk_endpoint: "sdk.iad-01.braze.com".to_string(),
        };
        let html = base_template(&api, &BrandingData::default(), "Demo <Acme>");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("braze.initialize('abc\\'def-0000-1111-2222-333344445555'"));
        assert!(html.contains("baseUrl: 'sdk.iad-01.braze.com'"));
        assert!(html.contains("<title>Demo &lt;Acme&gt;</title>"));
        assert!(html.contains("--color-primary: #3ACCDD"));
        assert_eq!(normalize_html(&html), html);
    }
}
