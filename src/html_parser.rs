use regex::{Captures, Regex};
use select::document::Document;
use select::predicate::Name;
use std::sync::OnceLock;
use url::Url;

use crate::error::{MirrorError, Result};

/// An embedded resource occurrence found in a page or stylesheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReference {
    pub tag: &'static str,
    pub attribute: &'static str,
    /// Reference text exactly as written, the substring the rewrite replaces.
    pub original: String,
    pub absolute: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hyperlink {
    pub original: String,
    pub absolute: Url,
}

/// `rel` values of `<link>` tags whose target is downloaded as a resource.
const RESOURCE_LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "shortcut",
    "apple-touch-icon",
    "mask-icon",
    "preload",
    "modulepreload",
    "prefetch",
    "manifest",
];

/// Tag/attribute pairs scanned after `<link>`, in discovery order.
const RESOURCE_ATTRIBUTES: &[(&str, &str)] = &[
    ("script", "src"),
    ("img", "src"),
    ("source", "src"),
    ("video", "src"),
    ("audio", "src"),
    ("video", "poster"),
];

const SKIPPED_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

#[derive(Clone)]
pub struct HtmlParser {
    base_url: Url,
}

impl HtmlParser {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| MirrorError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { base_url: parsed })
    }

    pub fn from_url(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Every embedded resource of the page: link/script/media attributes
    /// first, then inline `url(...)` occurrences anywhere in the markup.
    pub fn extract_resources(&self, html_content: &str) -> Vec<ResourceReference> {
        let document = Document::from(html_content);
        let mut resources = Vec::new();

        for link in document.find(Name("link")) {
            let Some(href) = link.attr("href") else {
                continue;
            };
            let is_resource = link.attr("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace().any(|token| {
                    RESOURCE_LINK_RELS
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(token))
                })
            });
            if is_resource {
                self.push_reference(&mut resources, "link", "href", href);
            }
        }

        for &(tag, attribute) in RESOURCE_ATTRIBUTES {
            for node in document.find(Name(tag)) {
                if let Some(value) = node.attr(attribute) {
                    self.push_reference(&mut resources, tag, attribute, value);
                }
            }
        }

        resources.extend(extract_css_urls(html_content, &self.base_url));
        resources
    }

    /// Every `<a href>` that resolves to an http(s) URL.
    pub fn extract_hyperlinks(&self, html_content: &str) -> Vec<Hyperlink> {
        Document::from(html_content)
            .find(Name("a"))
            .filter_map(|anchor| anchor.attr("href"))
            .filter_map(|href| {
                resolve_url(&self.base_url, href).map(|absolute| Hyperlink {
                    original: href.to_string(),
                    absolute,
                })
            })
            .collect()
    }

    fn push_reference(
        &self,
        resources: &mut Vec<ResourceReference>,
        tag: &'static str,
        attribute: &'static str,
        value: &str,
    ) {
        if let Some(absolute) = resolve_url(&self.base_url, value) {
            resources.push(ResourceReference {
                tag,
                attribute,
                original: value.to_string(),
                absolute,
            });
        }
    }
}

/// Resolves a reference against `base`. Non-fetchable references (fragments,
/// `data:`, `javascript:`, `mailto:` and friends, malformed or non-http URLs)
/// yield `None`.
pub fn resolve_url(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }
    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// `url(...)` references of a stylesheet or markup payload, resolved against
/// `base`.
pub fn extract_css_urls(css_content: &str, base: &Url) -> Vec<ResourceReference> {
    css_url_regex()
        .captures_iter(css_content)
        .filter_map(|caps| {
            let raw = css_url_value(&caps);
            resolve_url(base, raw).map(|absolute| ResourceReference {
                tag: "style",
                attribute: "url",
                original: raw.to_string(),
                absolute,
            })
        })
        .collect()
}

/// Rewrites each `url(...)` whose value `replacement` maps to something;
/// other occurrences are kept byte for byte.
pub fn rewrite_css_urls<F>(css_content: &str, mut replacement: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    css_url_regex()
        .replace_all(css_content, |caps: &Captures| {
            match replacement(css_url_value(caps)) {
                Some(target) => format!("url({})", target),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn css_url_regex() -> &'static Regex {
    static CSS_URL: OnceLock<Regex> = OnceLock::new();
    CSS_URL.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|&quot;(.*?)&quot;|([^'"()\s]*))\s*\)"#)
            .expect("url() pattern is a valid regex")
    })
}

fn css_url_value<'h>(caps: &Captures<'h>) -> &'h str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))
        .map(|m| m.as_str().trim())
        .unwrap_or_default()
}
