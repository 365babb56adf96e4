//! Repair passes run once over the finished output tree.
//!
//! Both passes are best effort and idempotent: files that cannot be read or
//! written are skipped, and a missing directory means there is nothing to do.
//! They do blocking filesystem work and are meant for a blocking thread.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::html_parser::rewrite_css_urls;
use crate::path_mapper::{sanitize_segment, ASSETS_DIR};

/// Framework directories whose runtime bundles hard-code a `/<dir>/`
/// public path for lazily loaded chunks.
pub const RUNTIME_ASSET_DIRS: &[&str] = &["_nuxt", "_next"];

/// Points the hard-coded public path of runtime bundles under
/// `assets/<host>/<dir>/` at that directory. Returns the number of files
/// changed.
pub fn patch_runtime_public_path(root: &Path, host: &str) -> usize {
    let host_dir = sanitize_segment(host);
    let mut patched = 0;

    for dir_name in RUNTIME_ASSET_DIRS {
        let dir = root.join(ASSETS_DIR).join(&host_dir).join(dir_name);
        if !dir.is_dir() {
            continue;
        }
        let target = format!("/{}/{}/{}/", ASSETS_DIR, host_dir, dir_name);
        for file in files_with_extension(&dir, "js") {
            if patch_file(&file, |content| patch_public_path(content, dir_name, &target)) {
                patched += 1;
            }
        }
    }

    debug!(patched, "runtime public path patch finished");
    patched
}

/// Rewrites every relative `url(...)` left in stylesheets under `assets/`
/// to a root-absolute path resolved from the stylesheet's own location.
/// Returns the number of files changed.
pub fn patch_css_relative_urls(root: &Path) -> usize {
    let assets = root.join(ASSETS_DIR);
    if !assets.is_dir() {
        return 0;
    }
    let Ok(tree_root) = Url::parse("http://mirror.local/") else {
        return 0;
    };

    let mut patched = 0;
    for file in files_with_extension(&assets, "css") {
        let Some(file_url) = tree_url(&tree_root, root, &file) else {
            continue;
        };
        if patch_file(&file, |content| absolutize_css_urls(content, &file_url)) {
            patched += 1;
        }
    }

    debug!(patched, "relative CSS url patch finished");
    patched
}

pub fn patch_public_path(content: &str, dir_name: &str, target: &str) -> String {
    let mut patched = content.to_string();
    for quote in ['"', '\'', '`'] {
        patched = patched.replace(
            &format!("{quote}/{dir_name}/{quote}"),
            &format!("{quote}{target}{quote}"),
        );
    }
    patched.replace(&format!("//{dir_name}/"), target)
}

/// `file_url` is the stylesheet's location with the output root as `/`.
pub fn absolutize_css_urls(content: &str, file_url: &Url) -> String {
    rewrite_css_urls(content, |raw| {
        if raw.is_empty() || raw.starts_with('/') || raw.starts_with('#') || has_scheme(raw) {
            return None;
        }
        file_url.join(raw).ok().map(|resolved| resolved.path().to_string())
    })
}

fn has_scheme(raw: &str) -> bool {
    match raw.find(':') {
        Some(0) | None => false,
        Some(i) => raw[..i]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
    }
}

fn tree_url(tree_root: &Url, root: &Path, file: &Path) -> Option<Url> {
    let relative = file.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    tree_root.join(&segments.join("/")).ok()
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .map(|e| e.into_path())
        .collect()
}

fn patch_file<P>(path: &Path, patch: P) -> bool
where
    P: FnOnce(&str) -> String,
{
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = ?path, error = %e, "skipping unreadable file");
            return false;
        }
    };

    let patched = patch(&content);
    if patched == content {
        return false;
    }

    match fs::write(path, patched) {
        Ok(()) => true,
        Err(e) => {
            debug!(path = ?path, error = %e, "skipping unwritable file");
            false
        }
    }
}
