use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::patchers::RUNTIME_ASSET_DIRS;
use crate::path_mapper::ASSETS_DIR;

/// Maps a request path onto a file of the copied tree.
///
/// `/` serves `index.html`; an existing file is served as is; a miss under
/// a runtime directory (`/_nuxt/...`) is looked up under every
/// `assets/<host>/`; a directory serves its `index.html`. Paths are taken
/// as written, matching the percent-encoded names the copier writes.
pub fn resolve_request_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let path = request_path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let rejected = |s: &&str| {
        *s == "." || *s == ".." || s.contains('\\') || (cfg!(windows) && s.contains(':'))
    };
    if segments.iter().any(rejected) {
        return None;
    }

    let candidate = segments
        .iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));
    if !segments.is_empty() && candidate.is_file() {
        return Some(candidate);
    }

    if let Some(found) = runtime_fallback(root, &segments) {
        return Some(found);
    }

    let index = candidate.join("index.html");
    index.is_file().then_some(index)
}

fn runtime_fallback(root: &Path, segments: &[&str]) -> Option<PathBuf> {
    let first = segments.first()?;
    if !RUNTIME_ASSET_DIRS.contains(first) {
        return None;
    }

    let mut hosts: Vec<PathBuf> = fs::read_dir(root.join(ASSETS_DIR))
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    hosts.sort();

    hosts.into_iter().find_map(|host_dir| {
        let candidate = segments
            .iter()
            .fold(host_dir, |path, segment| path.join(segment));
        candidate.is_file().then_some(candidate)
    })
}

pub fn router(root: PathBuf) -> Router {
    Router::new()
        .fallback(serve_file)
        .with_state(Arc::new(root))
        .layer(TraceLayer::new_for_http())
}

/// Serves `root` on `127.0.0.1:<port>` until the process is stopped.
pub async fn serve(root: PathBuf, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Serving {:?} on http://{}/", root, addr);
    axum::serve(listener, router(root))
        .await
        .context("Static server stopped")
}

async fn serve_file(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let request_path = uri.path().to_string();
    let resolved =
        tokio::task::spawn_blocking(move || resolve_request_path(&root, &request_path)).await;
    let Ok(Some(path)) = resolved else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.essence_str().to_string())], bytes).into_response()
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "failed to read file");
            (StatusCode::INTERNAL_SERVER_ERROR, "Server Error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn site() -> TempDir {
        let temp_dir = tempdir().unwrap();
        for (path, content) in [
            ("index.html", "<h1>home</h1>"),
            ("about/index.html", "<h1>about</h1>"),
            ("docs/guide.html", "<h1>guide</h1>"),
            ("assets/example.com/logo.png", "png"),
            ("assets/example.com/_nuxt/app.js", "nuxt"),
            ("empty/.keep", ""),
        ] {
            let full = temp_dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_resolution_rules() {
        let site = site();
        let root = site.path();

        let cases = [
            ("/", Some("index.html")),
            ("", Some("index.html")),
            ("/?utm=1", Some("index.html")),
            ("/about", Some("about/index.html")),
            ("/about/", Some("about/index.html")),
            ("/docs/guide.html", Some("docs/guide.html")),
            ("/assets/example.com/logo.png", Some("assets/example.com/logo.png")),
            ("/_nuxt/app.js", Some("assets/example.com/_nuxt/app.js")),
            ("/_nuxt/missing.js", None),
            ("/empty", None),
            ("/nope", None),
            ("/../secret", None),
            ("/about/../../secret", None),
        ];

        for (request, expected) in cases {
            assert_eq!(
                resolve_request_path(root, request),
                expected.map(|p| root.join(p)),
                "request: {}",
                request
            );
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn test_reserved_characters_resolve_on_unix() {
        let site = site();
        let page = site.path().join("wiki/File:Foo/index.html");
        fs::create_dir_all(page.parent().unwrap()).unwrap();
        fs::write(&page, "<h1>file</h1>").unwrap();

        assert_eq!(resolve_request_path(site.path(), "/wiki/File:Foo/"), Some(page));
        assert_eq!(resolve_request_path(site.path(), "/wiki/File_Foo/"), None);
    }

    #[tokio::test]
    async fn test_serves_files_with_content_type() {
        let site = site();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(site.path().to_path_buf());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let response = reqwest::get(format!("http://{}/about", addr)).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/html"
        );
        assert_eq!(response.text().await.unwrap(), "<h1>about</h1>");

        let response = reqwest::get(format!("http://{}/_nuxt/app.js", addr)).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "nuxt");

        let response = reqwest::get(format!("http://{}/missing", addr)).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}
