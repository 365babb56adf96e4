//! URL to on-disk path mapping.
//!
//! Everything here is a pure function of the URL. Pages land at
//! `index.html`, `<path>` or `<path>/index.html`; every other resource lands
//! under `assets/<host>/<path>`. Query strings and fragments never reach the
//! filesystem, and `.`/`..` segments are dropped so no mapping can leave the
//! output root. Empty segments are dropped as well, so `/a//b` and `/a/b` are
//! one file; the page and resource keys are built from the mapped path and
//! therefore treat them as one URL too.

use std::fmt::Write;
use url::Url;

/// Extensions that mark a URL as a static asset rather than a crawlable page.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "css", "js", "mjs", "ico", "woff",
    "woff2", "ttf", "otf", "eot", "mp4", "webm", "mp3", "map",
];

/// Directory under the output root holding every downloaded resource.
pub const ASSETS_DIR: &str = "assets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageForm {
    Root,
    File,
    Directory,
}

/// Relative path of a downloaded resource: `assets/<host>/<path>`.
///
/// A path ending in `/` gets a trailing `index` file name so that the
/// result is always a file.
pub fn map_resource_path(url: &Url) -> String {
    let mut parts = vec![ASSETS_DIR.to_string(), host_dir(url)];
    parts.extend(path_segments(url));
    if url.path().ends_with('/') {
        parts.push("index".to_string());
    }
    parts.join("/")
}

/// Relative path of a crawled page.
pub fn map_page_path(url: &Url) -> String {
    let segments = path_segments(url);
    match page_form(url, &segments) {
        PageForm::Root => "index.html".to_string(),
        PageForm::File => segments.join("/"),
        PageForm::Directory => format!("{}/index.html", segments.join("/")),
    }
}

/// Href a rewritten anchor should carry to reach the page written by
/// [`map_page_path`] when the output root is served at `/`.
pub fn page_href(url: &Url) -> String {
    let segments = path_segments(url);
    let mut href = match page_form(url, &segments) {
        PageForm::Root => "/".to_string(),
        PageForm::File => format!("/{}", segments.join("/")),
        PageForm::Directory => format!("/{}/", segments.join("/")),
    };
    if let Some(fragment) = url.fragment().filter(|f| !f.is_empty()) {
        href.push('#');
        href.push_str(fragment);
    }
    href
}

/// Visited-set key: host plus the file the page is written to. Two URLs
/// share a key exactly when they would overwrite each other on disk.
pub fn page_key(url: &Url) -> String {
    format!("{}/{}", host_dir(url), map_page_path(url))
}

pub fn is_asset_path(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match extension(last) {
        Some(ext) => ASSET_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

pub fn is_stylesheet(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".css")
}

/// File name for one URL segment. Segments are kept verbatim except on
/// Windows, where reserved characters are escaped by [`escape_reserved`].
pub fn sanitize_segment(segment: &str) -> String {
    if cfg!(windows) {
        escape_reserved(segment)
    } else {
        segment.to_string()
    }
}

/// Writes `\ : * ? " < > |`, control characters and `%` itself as `%XX`.
/// Escaping `%` keeps the mapping injective: `a:b`, `a%3Ab` and `a_b` stay
/// three different names.
pub fn escape_reserved(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c.is_control() || matches!(c, '%' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            let _ = write!(escaped, "%{:02X}", c as u32);
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn host_dir(url: &Url) -> String {
    url.host_str()
        .map(sanitize_segment)
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path()
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(sanitize_segment)
        .collect()
}

fn page_form(url: &Url, segments: &[String]) -> PageForm {
    match segments.last() {
        None => PageForm::Root,
        Some(last) if extension(last).is_some() && !url.path().ends_with('/') => PageForm::File,
        Some(_) => PageForm::Directory,
    }
}

/// Extension matching `\.[a-z0-9]+$`, case-insensitively.
fn extension(segment: &str) -> Option<&str> {
    let (_, ext) = segment.rsplit_once('.')?;
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resource_paths() {
        let cases = [
            ("http://example.com/logo.png", "assets/example.com/logo.png"),
            ("https://cdn.example.com/css/site.css?v=3#x", "assets/cdn.example.com/css/site.css"),
            ("http://example.com/", "assets/example.com/index"),
            ("http://example.com/fonts/", "assets/example.com/fonts/index"),
            ("http://example.com//a///b.js", "assets/example.com/a/b.js"),
            ("http://example.com:8080/x.js", "assets/example.com/x.js"),
        ];
        for (input, expected) in cases {
            assert_eq!(map_resource_path(&url(input)), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_resource_path_is_deterministic() {
        let u = url("https://example.com/img/a%20b.png?x=1");
        let first = map_resource_path(&u);
        assert_eq!(first, map_resource_path(&u));
        assert_eq!(
            first,
            format!("assets/example.com/img/{}", sanitize_segment("a%20b.png"))
        );
    }

    #[test]
    fn test_distinct_paths_map_to_distinct_files() {
        let pairs = [
            ("http://example.com/img/a:b.png", "http://example.com/img/a_b.png"),
            ("http://example.com/wiki/File:Foo", "http://example.com/wiki/File_Foo"),
            ("http://example.com/js/a*b.js", "http://example.com/js/a_b.js"),
            ("http://example.com/img/a%3Ab.png", "http://example.com/img/a:b.png"),
            ("http://example.com/a/b", "http://example.com/a_b"),
        ];
        for (a, b) in pairs {
            let (a, b) = (url(a), url(b));
            assert_ne!(map_resource_path(&a), map_resource_path(&b), "{} vs {}", a, b);
            assert_ne!(map_page_path(&a), map_page_path(&b), "{} vs {}", a, b);
            assert_ne!(page_key(&a), page_key(&b), "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_empty_segments_are_one_url() {
        let doubled = url("http://example.com/a//b.png");
        let single = url("http://example.com/a/b.png");
        assert_eq!(map_resource_path(&doubled), map_resource_path(&single));
        assert_eq!(map_page_path(&doubled), map_page_path(&single));
        assert_eq!(page_key(&doubled), page_key(&single));
    }

    #[test]
    fn test_page_paths() {
        let cases = [
            ("http://example.com", "index.html"),
            ("http://example.com/", "index.html"),
            ("http://example.com/about", "about/index.html"),
            ("http://example.com/about/", "about/index.html"),
            ("http://example.com/docs/intro.html", "docs/intro.html"),
            ("http://example.com/docs/INTRO.HTM", "docs/INTRO.HTM"),
            ("http://example.com/v1.2/", "v1.2/index.html"),
            ("http://example.com/search?q=rust", "search/index.html"),
        ];
        for (input, expected) in cases {
            assert_eq!(map_page_path(&url(input)), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_paths_never_escape_root() {
        // The parser already collapses dot segments; encoded forms must not survive either.
        for input in [
            "http://example.com/../../etc/passwd",
            "http://example.com/a/%2e%2e/%2e%2e/b",
            "http://example.com/a/..%2f..%2fb",
        ] {
            let u = url(input);
            for mapped in [map_page_path(&u), map_resource_path(&u)] {
                assert!(!mapped.starts_with('/'), "{} -> {}", input, mapped);
                assert!(mapped.split('/').all(|s| s != ".."), "{} -> {}", input, mapped);
            }
        }
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        assert_eq!(
            escape_reserved("a:b*c?d\"e<f>g|h\\i"),
            "a%3Ab%2Ac%3Fd%22e%3Cf%3Eg%7Ch%5Ci"
        );
        assert_eq!(escape_reserved("a%3Ab"), "a%253Ab");
        assert_eq!(escape_reserved("plain-name.js"), "plain-name.js");
        assert_ne!(escape_reserved("a:b"), escape_reserved("a_b"));
        assert_ne!(escape_reserved("a:b"), escape_reserved("a%3Ab"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_segments_are_kept_verbatim() {
        assert_eq!(sanitize_segment("File:Foo"), "File:Foo");
        assert_eq!(
            map_page_path(&url("http://example.com/wiki/File:Foo")),
            "wiki/File:Foo/index.html"
        );
    }

    #[test]
    fn test_page_href_matches_page_path() {
        let cases = [
            ("http://example.com/", "/"),
            ("http://example.com/contact", "/contact/"),
            ("http://example.com/contact/", "/contact/"),
            ("http://example.com/docs/intro.html", "/docs/intro.html"),
            ("http://example.com/about#team", "/about/#team"),
        ];
        for (input, expected) in cases {
            let u = url(input);
            let href = page_href(&u);
            assert_eq!(href, expected, "input: {}", input);

            let served = href.split('#').next().unwrap().trim_start_matches('/');
            let file = if served.is_empty() || served.ends_with('/') {
                format!("{}index.html", served)
            } else {
                served.to_string()
            };
            assert_eq!(file, map_page_path(&u));
        }
    }

    #[test]
    fn test_page_key_normalization() {
        let key = page_key(&url("http://example.com/about"));
        assert_eq!(key, "example.com/about/index.html");
        assert_eq!(page_key(&url("http://example.com/about/")), key);
        assert_eq!(page_key(&url("http://example.com/about?x=1#top")), key);
        assert_eq!(page_key(&url("http://example.com/about/index.html")), key);
        assert_eq!(page_key(&url("https://example.com:8443/about")), key);
        assert_eq!(page_key(&url("http://example.com")), "example.com/index.html");
        assert_eq!(page_key(&url("http://example.com/index.html")), "example.com/index.html");
        assert_ne!(page_key(&url("http://other.example.com/about")), key);
    }

    #[test]
    fn test_asset_detection() {
        assert!(is_asset_path("/static/app.JS"));
        assert!(is_asset_path("/fonts/a.woff2"));
        assert!(is_asset_path("/logo.png"));
        assert!(!is_asset_path("/about"));
        assert!(!is_asset_path("/docs/page.html"));
        assert!(!is_asset_path("/"));

        assert!(is_stylesheet(&url("http://example.com/a/Site.CSS?v=1")));
        assert!(!is_stylesheet(&url("http://example.com/a/site.css.map")));
    }
}
