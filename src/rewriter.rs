use regex::{Captures, Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

use crate::fetcher::Fetch;
use crate::html_parser::HtmlParser;
use crate::materializer::{successful_rewrites, unique_targets, Materializer};
use crate::path_mapper::{is_asset_path, page_href, page_key};
use crate::progress::{emit, MirrorEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct RewrittenPage {
    pub html: String,
    /// Same-host page links with query and fragment removed, first
    /// occurrence only.
    pub links: Vec<Url>,
    pub resources_found: usize,
    pub resources_saved: usize,
    pub hyperlinks_found: usize,
}

/// Rewrites one HTML page so it works from the output root.
pub struct PageRewriter<'m, 'a, F> {
    materializer: &'m Materializer<'a, F>,
    host: String,
    progress: Option<ProgressSink>,
}

impl<'m, 'a, F: Fetch + Sync> PageRewriter<'m, 'a, F> {
    /// `host` is the crawl's host; only hyperlinks to it are rewritten.
    pub fn new(materializer: &'m Materializer<'a, F>, host: impl Into<String>) -> Self {
        Self {
            materializer,
            host: host.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn rewrite_page(&self, html: &str, page_url: &Url) -> RewrittenPage {
        let parser = HtmlParser::from_url(page_url.clone());

        let references = parser
            .extract_resources(html)
            .into_iter()
            .filter(|reference| is_replaceable(&reference.original))
            .collect();
        let targets = unique_targets(references);
        let resources_found = targets.len();
        let hyperlinks_found = parser.extract_hyperlinks(html).len();
        emit(
            self.progress.as_ref(),
            MirrorEvent::LinksDiscovered {
                url: page_url.to_string(),
                resources: resources_found,
                hyperlinks: hyperlinks_found,
            },
        );

        let rewrites = successful_rewrites(self.materializer.materialize_all(targets).await);
        let resources_saved = rewrites.len();
        emit(
            self.progress.as_ref(),
            MirrorEvent::ResourcesSaved {
                url: page_url.to_string(),
                saved: resources_saved,
                failed: resources_found - resources_saved,
            },
        );
        let html = replace_references(html, &rewrites);

        let hyperlinks = parser.extract_hyperlinks(&html);
        let mut href_rewrites = HashMap::new();
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for link in hyperlinks {
            if !self.is_crawlable(&link.absolute) {
                continue;
            }
            href_rewrites
                .entry(link.original)
                .or_insert_with(|| page_href(&link.absolute));

            let mut next = link.absolute;
            next.set_query(None);
            next.set_fragment(None);
            if seen.insert(page_key(&next)) {
                links.push(next);
            }
        }
        let html = replace_anchor_hrefs(&html, &href_rewrites);

        RewrittenPage {
            html,
            links,
            resources_found,
            resources_saved,
            hyperlinks_found,
        }
    }

    /// Same-host http(s) links that do not point at a static asset.
    pub fn is_crawlable(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str() == Some(self.host.as_str())
            && !is_asset_path(url.path())
    }
}

/// Reference texts like `/` or `./` would rewrite unrelated markup when
/// substituted page-wide.
fn is_replaceable(original: &str) -> bool {
    original.chars().any(|c| c.is_alphanumeric())
}

/// One pass over `html` replacing every occurrence of each original
/// reference text (and its `&amp;`-encoded form) with `/<local path>`.
/// Longer originals win where two overlap, and replaced text is never
/// scanned again.
pub fn replace_references(html: &str, rewrites: &HashMap<String, String>) -> String {
    if rewrites.is_empty() {
        return html.to_string();
    }

    let mut lookup: HashMap<String, String> = HashMap::new();
    for (original, path) in rewrites {
        let target = format!("/{}", path);
        let encoded = original.replace('&', "&amp;");
        if encoded != *original {
            lookup.entry(encoded).or_insert_with(|| target.clone());
        }
        lookup.insert(original.clone(), target);
    }

    let mut originals: Vec<&String> = lookup.keys().collect();
    originals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let pattern = originals
        .iter()
        .map(|original| regex::escape(original))
        .collect::<Vec<_>>()
        .join("|");

    let regex = match RegexBuilder::new(&pattern).size_limit(1 << 26).build() {
        Ok(regex) => regex,
        Err(e) => {
            warn!(error = %e, "too many references to rewrite, page left unchanged");
            return html.to_string();
        }
    };

    regex
        .replace_all(html, |caps: &Captures| lookup[&caps[0]].clone())
        .into_owned()
}

/// Replaces the `href` value of `<a>` tags found in `rewrites`. Values are
/// matched as written or with `&amp;` decoded; everything outside anchor
/// hrefs is untouched. Unquoted values are written back double-quoted.
pub fn replace_anchor_hrefs(html: &str, rewrites: &HashMap<String, String>) -> String {
    if rewrites.is_empty() {
        return html.to_string();
    }

    anchor_href_regex()
        .replace_all(html, |caps: &Captures| {
            let (value, quote) = match (caps.get(2), caps.get(3), caps.get(4)) {
                (Some(value), _, _) => (value.as_str(), '"'),
                (None, Some(value), _) => (value.as_str(), '\''),
                (None, None, Some(value)) => (value.as_str(), '"'),
                _ => return caps[0].to_string(),
            };
            let rewritten = rewrites
                .get(value)
                .or_else(|| rewrites.get(&value.replace("&amp;", "&")));
            match rewritten {
                Some(href) => format!("{}{quote}{}{quote}", &caps[1], href),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn anchor_href_regex() -> &'static Regex {
    static ANCHOR_HREF: OnceLock<Regex> = OnceLock::new();
    ANCHOR_HREF.get_or_init(|| {
        Regex::new(r#"(?i)(<a\b[^>]*?\shref\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'<>`]+))"#)
            .expect("anchor href pattern is a valid regex")
    })
}
