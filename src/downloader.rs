use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MirrorError, Result};
use crate::fetcher::{Fetch, FetchConfig, HttpFetcher};
use crate::file_manager::FileManager;
use crate::frontier::{Frontier, PageState, QueuedPage};
use crate::materializer::Materializer;
use crate::patchers::{patch_css_relative_urls, patch_runtime_public_path};
use crate::path_mapper::map_page_path;
use crate::progress::{emit, MirrorEvent, ProgressSink};
use crate::rewriter::PageRewriter;

#[derive(Clone)]
pub struct MirrorOptions {
    /// Link hops followed from the seed; 0 copies the seed page only.
    pub max_depth: usize,
    /// Resource downloads in flight per page.
    pub max_concurrent: usize,
    pub progress: Option<ProgressSink>,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            max_depth: 0,
            max_concurrent: 16,
            progress: None,
        }
    }
}

impl fmt::Debug for MirrorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorOptions")
            .field("max_depth", &self.max_depth)
            .field("max_concurrent", &self.max_concurrent)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl MirrorOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// File the seed page was written to.
    pub index_path: PathBuf,
    pub pages_saved: usize,
    pub pages_failed: usize,
}

pub struct WebsiteMirror<F = HttpFetcher> {
    seed: Url,
    host: String,
    file_manager: FileManager,
    fetcher: F,
    options: MirrorOptions,
}

impl WebsiteMirror<HttpFetcher> {
    pub fn new(
        base_url: &str,
        output_dir: &Path,
        options: MirrorOptions,
        fetch_config: &FetchConfig,
    ) -> Result<Self> {
        let fetcher = HttpFetcher::new(fetch_config).map_err(MirrorError::Client)?;
        Self::with_fetcher(base_url, output_dir, options, fetcher)
    }
}

impl<F: Fetch + Sync> WebsiteMirror<F> {
    pub fn with_fetcher(
        base_url: &str,
        output_dir: &Path,
        options: MirrorOptions,
        fetcher: F,
    ) -> Result<Self> {
        let invalid = |reason: String| MirrorError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let seed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", seed.scheme())));
        }
        let host = seed
            .host_str()
            .ok_or_else(|| invalid("URL has no host".to_string()))?
            .to_string();
        let file_manager = FileManager::new(output_dir)?;

        Ok(Self {
            seed,
            host,
            file_manager,
            fetcher,
            options,
        })
    }

    pub fn output_dir(&self) -> &Path {
        self.file_manager.base_dir()
    }

    /// Copies the site breadth-first from the seed, then runs the repair
    /// passes over the output tree.
    ///
    /// Only a failure on the seed page aborts the copy. Any other page that
    /// cannot be fetched or written is recorded as failed and skipped.
    pub async fn mirror_website(&self) -> Result<MirrorReport> {
        let progress = self.options.progress.as_ref();
        info!(
            url = %self.seed,
            output_dir = ?self.output_dir(),
            max_depth = self.options.max_depth,
            "starting copy"
        );
        emit(
            progress,
            MirrorEvent::Started {
                url: self.seed.to_string(),
                output_dir: self.output_dir().to_path_buf(),
                max_depth: self.options.max_depth,
            },
        );

        let materializer = Materializer::new(
            &self.fetcher,
            &self.file_manager,
            self.options.max_concurrent,
        );
        let rewriter = PageRewriter::new(&materializer, self.host.clone())
            .with_progress(self.options.progress.clone());

        let mut frontier = Frontier::new();
        frontier.push(self.seed.clone(), 0);
        let mut index_path = None;

        while let Some(page) = frontier.next() {
            match self.process_page(&page, &rewriter, &mut frontier).await {
                Ok(path) => {
                    frontier.complete(&page.key);
                    info!(url = %page.url, depth = page.depth, path = ?path, "page saved");
                    emit(
                        progress,
                        MirrorEvent::PageSaved {
                            url: page.url.to_string(),
                            path: path.clone(),
                            visited: frontier.visited_count(),
                            queued: frontier.queued_count(),
                        },
                    );
                    index_path.get_or_insert(path);
                }
                Err(e) if page.depth == 0 => {
                    return Err(MirrorError::Seed {
                        url: page.url.to_string(),
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    frontier.fail(&page.key);
                    warn!(url = %page.url, error = %e, "page skipped");
                    emit(
                        progress,
                        MirrorEvent::PageFailed {
                            url: page.url.to_string(),
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        self.run_patchers().await;

        let pages_saved = frontier.count(PageState::Done);
        let pages_failed = frontier.count(PageState::Failed);
        info!(pages_saved, pages_failed, "copy finished");
        emit(progress, MirrorEvent::Completed { pages: pages_saved });

        Ok(MirrorReport {
            index_path: index_path.unwrap_or_else(|| self.output_dir().join("index.html")),
            pages_saved,
            pages_failed,
        })
    }

    async fn run_patchers(&self) {
        let root = self.output_dir().to_path_buf();
        let host = self.host.clone();
        let patched = tokio::task::spawn_blocking(move || {
            (
                patch_runtime_public_path(&root, &host),
                patch_css_relative_urls(&root),
            )
        })
        .await;

        match patched {
            Ok((bundles, stylesheets)) => debug!(bundles, stylesheets, "output tree patched"),
            Err(e) => warn!(error = %e, "patching the output tree did not finish"),
        }
    }

    async fn process_page(
        &self,
        page: &QueuedPage,
        rewriter: &PageRewriter<'_, '_, F>,
        frontier: &mut Frontier,
    ) -> Result<PathBuf> {
        debug!(url = %page.url, depth = page.depth, "fetching page");
        let fetched = self.fetcher.fetch(&page.url).await?;
        let relative_path = map_page_path(&page.url);

        if !fetched.is_html() {
            debug!(url = %page.url, content_type = ?fetched.content_type, "saving non-HTML page as is");
            return self
                .file_manager
                .write_file(&relative_path, &fetched.bytes)
                .await;
        }

        let html = String::from_utf8_lossy(&fetched.bytes).into_owned();
        let rewritten = rewriter.rewrite_page(&html, &page.url).await;

        if page.depth < self.options.max_depth {
            for link in rewritten.links {
                frontier.push(link, page.depth + 1);
            }
        }

        self.file_manager
            .write_file(&relative_path, rewritten.html.as_bytes())
            .await
    }
}

/// Copies `seed_url` and everything reachable within `options.max_depth`
/// same-host hops into `output_dir` over HTTP.
pub async fn copy_website(
    seed_url: &str,
    output_dir: &Path,
    options: MirrorOptions,
) -> Result<MirrorReport> {
    WebsiteMirror::new(seed_url, output_dir, options, &FetchConfig::default())?
        .mirror_website()
        .await
}
