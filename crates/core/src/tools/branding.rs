//! # Branding Extractor
//!
//! Scrapes a customer website for its color palette and fonts. Extraction
//! never fails: any problem yields the default branding flagged as fallback.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::state::{BrandingData, ColorScheme, Typography};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const MAX_STYLESHEETS: usize = 3;
const GENERIC_FAMILIES: [&str; 5] = ["sans-serif", "serif", "monospace", "cursive", "fantasy"];

/// Branding collaborator
#[async_trait]
pub trait BrandingExtractor: Send + Sync {
    /// Analyze `url`; never fails
    async fn analyze(&self, url: &str) -> BrandingData;
}

/// Extractor fetching pages over HTTP
pub struct HttpBrandingExtractor {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpBrandingExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<String> {
        let resp = self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}

impl Default for HttpBrandingExtractor {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl BrandingExtractor for HttpBrandingExtractor {
    async fn analyze(&self, url: &str) -> BrandingData {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        info!(url = %url, "Analyzing website branding");

        let html = match self.fetch(&url, self.timeout).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch website, using default branding");
                return BrandingData::fallback(Some(url), "Failed to fetch website");
            }
        };

        let mut stylesheets = Vec::new();
        for href in stylesheet_links(&html).into_iter().take(MAX_STYLESHEETS) {
            let Some(css_url) = resolve_url(&url, &href) else {
                continue;
            };
            match self.fetch(&css_url, Duration::from_secs(5)).await {
                Ok(css) => stylesheets.push(css),
                Err(e) => warn!(css_url = %css_url, error = %e, "Skipping stylesheet"),
            }
        }

        extract_branding(&url, &html, &stylesheets)
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn style_sources(html: &str) -> Vec<&str> {
    static STYLE_ATTR: OnceLock<Regex> = OnceLock::new();
    static STYLE_TAG: OnceLock<Regex> = OnceLock::new();
    let attr = regex(&STYLE_ATTR, r#"(?i)style\s*=\s*"([^"]*)""#);
    let tag = regex(&STYLE_TAG, r"(?is)<style[^>]*>(.*?)</style>");

    attr.captures_iter(html)
        .chain(tag.captures_iter(html))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

fn stylesheet_links(html: &str) -> Vec<String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    static HREF: OnceLock<Regex> = OnceLock::new();
    let link = regex(&LINK, r"(?i)<link\b[^>]*>");
    let href = regex(&HREF, r#"(?i)href\s*=\s*["']([^"']+)["']"#);

    link.find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| tag.to_ascii_lowercase().contains("stylesheet"))
        .filter_map(|tag| href.captures(tag).map(|c| c[1].to_string()))
        .collect()
}

/// Absolute stylesheet URL for `href` as linked from `base`
fn resolve_url(base: &str, href: &str) -> Option<String> {
    let joined = Url::parse(base).ok()?.join(href).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Normalize a CSS color to upper-case `#RRGGBB`
fn normalize_color(raw: &str) -> Option<String> {
    static RGB: OnceLock<Regex> = OnceLock::new();
    let color = raw.trim().to_ascii_lowercase();

    if let Some(hex) = color.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        return match hex.len() {
            6 => Some(format!("#{}", hex.to_ascii_uppercase())),
            3 => Some(format!(
                "#{}",
                hex.chars()
                    .flat_map(|c| [c, c])
                    .collect::<String>()
                    .to_ascii_uppercase()
            )),
            _ => None,
        };
    }

    let rgb = regex(&RGB, r"^rgba?\((\d+),\s*(\d+),\s*(\d+)");
    let caps = rgb.captures(&color)?;
    let channel = |i: usize| caps[i].parse::<u32>().ok().map(|v| v.min(255));
    Some(format!(
        "#{:02X}{:02X}{:02X}",
        channel(1)?,
        channel(2)?,
        channel(3)?
    ))
}

/// Values ordered by frequency, ties kept in first-seen order
fn most_common(values: impl IntoIterator<Item = String>, limit: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(limit).map(|(v, _)| v).collect()
}

fn extract_colors(css: &[&str]) -> Option<ColorScheme> {
    static COLOR: OnceLock<Regex> = OnceLock::new();
    let pattern = regex(&COLOR, r"#[0-9A-Fa-f]{6}\b|#[0-9A-Fa-f]{3}\b|rgba?\([^)]+\)");

    let found = css
        .iter()
        .flat_map(|text| pattern.find_iter(text))
        .filter_map(|m| normalize_color(m.as_str()));
    let colors = most_common(found, 10);
    if colors.len() < 3 {
        return None;
    }

    let non_bw: Vec<&String> = colors
        .iter()
        .filter(|c| c.as_str() != "#FFFFFF" && c.as_str() != "#000000")
        .collect();
    let defaults = ColorScheme::default();
    let (primary, secondary, accent) = match non_bw.len() {
        0 => return None,
        1 | 2 => (
            non_bw[0].clone(),
            colors.get(1).cloned().unwrap_or_else(|| "#2196F3".to_string()),
            colors.get(2).cloned().unwrap_or_else(|| "#FF5722".to_string()),
        ),
        _ => (non_bw[0].clone(), non_bw[1].clone(), non_bw[2].clone()),
    };

    let top = &colors[..colors.len().min(5)];
    let text = if !top.iter().any(|c| c == "#FFFFFF") && top.iter().any(|c| c == "#000000") {
        "#000000".to_string()
    } else {
        defaults.text
    };

    Some(ColorScheme {
        primary,
        secondary,
        accent,
        background: defaults.background,
        text,
    })
}

fn clean_font_family(raw: &str) -> Option<String> {
    let cleaned = raw.replace("!important", "");
    let trimmed = cleaned.trim().trim_matches(|c| c == '"' || c == '\'');
    let mut family = trimmed.to_string();

    if trimmed.contains(',') {
        family = trimmed
            .split(',')
            .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\''))
            .find(|f| !GENERIC_FAMILIES.contains(&f.to_ascii_lowercase().as_str()))?
            .to_string();
    }
    if family.is_empty() || family.starts_with("var(") {
        return None;
    }
    if family.contains(' ') && !family.starts_with('\'') && !family.starts_with('"') {
        family = format!("'{}'", family);
    }
    if !family.to_ascii_lowercase().contains("sans-serif") {
        family = format!("{}, sans-serif", family);
    }
    Some(family)
}

fn extract_typography(html: &str, css: &[&str]) -> Option<Typography> {
    static FONT: OnceLock<Regex> = OnceLock::new();
    static GOOGLE: OnceLock<Regex> = OnceLock::new();
    let font = regex(&FONT, r"font-family:\s*([^;}]+)");
    let google = regex(&GOOGLE, r"fonts\.googleapis\.com/[^\x22']*family=([^&:\x22']+)");

    let declared = css
        .iter()
        .flat_map(|text| font.captures_iter(text))
        .map(|c| c[1].to_string());
    let hosted = google
        .captures_iter(html)
        .map(|c| c[1].replace('+', " "));
    let cleaned = declared.chain(hosted).filter_map(|f| clean_font_family(&f));

    let fonts = most_common(cleaned, 5);
    let primary_font = fonts.first()?.clone();
    let heading_font = fonts.get(1).cloned().unwrap_or_else(|| primary_font.clone());
    Some(Typography {
        primary_font,
        heading_font,
    })
}

/// Build branding from a fetched page and its stylesheets
pub fn extract_branding(url: &str, html: &str, stylesheets: &[String]) -> BrandingData {
    let mut css = style_sources(html);
    css.extend(stylesheets.iter().map(String::as_str));

    let colors = extract_colors(&css);
    let typography = extract_typography(html, &css);

    let mut extracted = Vec::new();
    if colors.is_some() {
        extracted.push("colors");
    }
    if typography.is_some() {
        extracted.push("typography");
    }
    let extraction_notes = if extracted.is_empty() {
        "Used default branding (extraction failed)".to_string()
    } else if colors.is_none() {
        format!("Successfully extracted {} (using default colors)", extracted.join(", "))
    } else if typography.is_none() {
        format!(
            "Successfully extracted {} (using default typography)",
            extracted.join(", ")
        )
    } else {
        format!("Successfully extracted {}", extracted.join(", "))
    };

    let extraction_success = !extracted.is_empty();
    BrandingData {
        website_url: Some(url.to_string()),
        colors: colors.unwrap_or_default(),
        typography: typography.unwrap_or_default(),
        extraction_success,
        fallback_used: !extraction_success,
        extraction_notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <link rel="stylesheet" href="/css/site.css">
        <link href="https://fonts.googleapis.com/css2?family=Open+Sans:wght@400" rel="stylesheet">
        <style>
            body { font-family: "Helvetica Neue", Arial, sans-serif; color: #222; background: #ffffff; }
            .btn { background: #E4002B; color: #fff; }
            .btn:hover { background: #e4002b; }
            .link { color: rgb(0, 102, 204); }
            h1 { font-family: Georgia, serif; color: #E4002B; }
        </style></head>
        <body><div style="border-color: #0066CC"></div></body></html>"#;

    #[test]
    fn test_color_normalization() {
        assert_eq!(normalize_color("#abc").as_deref(), Some("#AABBCC"));
        assert_eq!(normalize_color("#a1b2c3").as_deref(), Some("#A1B2C3"));
        assert_eq!(normalize_color("rgba(255, 0, 16, 0.5)").as_deref(), Some("#FF0010"));
        assert_eq!(normalize_color("#abcd"), None);
    }

    #[test]
    fn test_extracts_palette_by_frequency() {
        let branding = extract_branding("https://acme.io", PAGE, &[]);

        assert!(branding.extraction_success);
        assert!(!branding.fallback_used);
        assert_eq!(branding.colors.primary, "#E4002B");
        assert_eq!(branding.colors.secondary, "#0066CC");
        assert_eq!(branding.colors.accent, "#222222");
        assert_eq!(branding.colors.background, "#FFFFFF");
    }

    #[test]
    fn test_extracts_fonts_skipping_generic_families() {
        let branding = extract_branding("https://acme.io", PAGE, &[]);
        assert_eq!(
            branding.typography.primary_font,
            "'Helvetica Neue', sans-serif"
        );
        assert_eq!(branding.typography.heading_font, "Georgia, sans-serif");
    }

    #[test]
    fn test_empty_page_falls_back() {
        let branding = extract_branding("https://acme.io", "<html></html>", &[]);
        assert!(!branding.extraction_success);
        assert!(branding.fallback_used);
        assert_eq!(branding.colors, ColorScheme::default());
    }

    #[test]
    fn test_stylesheet_links_and_resolution() {
        let links = stylesheet_links(PAGE);
        assert_eq!(links[0], "/css/site.css");
        assert_eq!(
            resolve_url("https://acme.io/products/x", "/css/site.css").as_deref(),
            Some("https://acme.io/css/site.css")
        );
        assert_eq!(
            resolve_url("https://acme.io/products/x", "main.css").as_deref(),
            Some("https://acme.io/products/main.css")
        );
        assert_eq!(
            resolve_url("https://acme.io", "//cdn.acme.io/a.css").as_deref(),
            Some("https://cdn.acme.io/a.css")
        );
    }

    #[test]
    fn test_resolve_url_ignores_query_and_dot_segments() {
        assert_eq!(
            resolve_url("https://acme.io/shop?ref=/promo/x", "css/site.css").as_deref(),
            Some("https://acme.io/css/site.css")
        );
        assert_eq!(
            resolve_url("https://acme.io/a/b/page.html", "../css/site.css").as_deref(),
            Some("https://acme.io/a/css/site.css")
        );
        assert_eq!(resolve_url("not a url", "site.css"), None);
        assert_eq!(resolve_url("https://acme.io", "data:text/css,body{}"), None);
    }

    #[tokio::test]
    async fn test_unreachable_site_yields_fallback() {
        let extractor = HttpBrandingExtractor::new(Duration::from_millis(200));
        let branding = extractor.analyze("http://127.0.0.1:9/").await;
        assert!(branding.fallback_used);
        assert_eq!(branding.extraction_notes, "Fallback: Failed to fetch website");
    }
}
