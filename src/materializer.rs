use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::error::{MirrorError, Result};
use crate::fetcher::Fetch;
use crate::file_manager::FileManager;
use crate::html_parser::{extract_css_urls, rewrite_css_urls, ResourceReference};
use crate::path_mapper::{is_stylesheet, map_resource_path};

/// One download and every reference text that resolves to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub originals: Vec<String>,
    pub url: Url,
}

/// Outcome of one task in a materialization group, with the reference texts
/// that asked for it.
pub type Materialized = (Vec<String>, Result<String>);

/// Downloads resources into the output tree.
///
/// Outcomes are cached per local file for the lifetime of the materializer,
/// which is one crawl, so an asset shared by many pages is fetched once.
pub struct Materializer<'a, F> {
    fetcher: &'a F,
    files: &'a FileManager,
    max_concurrent: usize,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl<'a, F: Fetch + Sync> Materializer<'a, F> {
    pub fn new(fetcher: &'a F, files: &'a FileManager, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            files,
            max_concurrent: max_concurrent.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Downloads `url` and returns the relative path it was written to.
    /// Stylesheets have their own `url(...)` references downloaded and
    /// rewritten before they are written.
    pub async fn materialize(&self, url: &Url) -> Result<String> {
        self.materialize_within(url, &[]).await
    }

    /// Materializes every target with at most `max_concurrent` downloads in
    /// flight. Completion order is arbitrary.
    pub async fn materialize_all(&self, targets: Vec<Target>) -> Vec<Materialized> {
        self.materialize_group(targets, &[]).await
    }

    async fn materialize_group(
        &self,
        targets: Vec<Target>,
        ancestors: &[String],
    ) -> Vec<Materialized> {
        stream::iter(targets)
            .map(move |target| async move {
                let outcome = self.materialize_within(&target.url, ancestors).await;
                (target.originals, outcome)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    /// `ancestors` holds the stylesheets currently being rewritten above this
    /// one; a reference back to any of them is not fetched again.
    fn materialize_within<'s>(
        &'s self,
        url: &'s Url,
        ancestors: &'s [String],
    ) -> BoxFuture<'s, Result<String>> {
        async move {
            let mut target = url.clone();
            target.set_fragment(None);
            let key = map_resource_path(&target);

            if ancestors.contains(&key) {
                return Ok(key);
            }
            if let Some(cached) = self.cached(&key) {
                return cached.ok_or_else(|| MirrorError::Unavailable(target.to_string()));
            }

            let outcome = if is_stylesheet(&target) {
                self.materialize_stylesheet(&target, &key, ancestors).await
            } else {
                self.materialize_raw(&target, &key).await
            };

            match &outcome {
                Ok(path) => debug!(url = %target, path = %path, "resource saved"),
                Err(e) => debug!(url = %target, error = %e, "resource skipped"),
            }
            self.remember(key, outcome.as_ref().ok().cloned());
            outcome
        }
        .boxed()
    }

    async fn materialize_raw(&self, url: &Url, relative_path: &str) -> Result<String> {
        let fetched = self.fetcher.fetch(url).await?;
        self.files.write_file(relative_path, &fetched.bytes).await?;
        Ok(relative_path.to_string())
    }

    async fn materialize_stylesheet(
        &self,
        url: &Url,
        relative_path: &str,
        ancestors: &[String],
    ) -> Result<String> {
        let fetched = self.fetcher.fetch(url).await?;
        let css = String::from_utf8_lossy(&fetched.bytes).into_owned();

        let mut chain = ancestors.to_vec();
        chain.push(relative_path.to_string());
        let targets = unique_targets(extract_css_urls(&css, url));
        let rewrites = successful_rewrites(self.materialize_group(targets, &chain).await);

        let rewritten = rewrite_css_urls(&css, |raw| {
            rewrites.get(raw).map(|path| format!("/{}", path))
        });

        self.files
            .write_file(relative_path, rewritten.as_bytes())
            .await?;
        Ok(relative_path.to_string())
    }

    fn cached(&self, key: &str) -> Option<Option<String>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key).cloned()
    }

    fn remember(&self, key: String, outcome: Option<String>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, outcome);
    }
}

/// Groups references by the local file they map to, in discovery order.
/// Each reference text is listed once, under the first target it resolves to.
pub fn unique_targets(references: Vec<ResourceReference>) -> Vec<Target> {
    let mut targets: Vec<Target> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    let mut seen = HashSet::new();

    for reference in references {
        if !seen.insert(reference.original.clone()) {
            continue;
        }
        let path = map_resource_path(&reference.absolute);
        match by_path.get(&path) {
            Some(&index) => targets[index].originals.push(reference.original),
            None => {
                by_path.insert(path, targets.len());
                targets.push(Target {
                    originals: vec![reference.original],
                    url: reference.absolute,
                });
            }
        }
    }

    targets
}

/// Reference text to local path for every task that succeeded.
pub fn successful_rewrites(outcomes: Vec<Materialized>) -> HashMap<String, String> {
    outcomes
        .into_iter()
        .filter_map(|(originals, outcome)| outcome.ok().map(|path| (originals, path)))
        .flat_map(|(originals, path)| {
            originals
                .into_iter()
                .map(move |original| (original, path.clone()))
        })
        .collect()
}
