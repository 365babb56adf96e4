//! Lifecycle events emitted while a site is being copied.
//!
//! Events are a side channel only. Nothing in the crawl reads them back.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

pub type ProgressSink = Arc<dyn Fn(&MirrorEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MirrorEvent {
    Started {
        url: String,
        output_dir: PathBuf,
        max_depth: usize,
    },
    /// Resource and hyperlink counts of one page.
    LinksDiscovered {
        url: String,
        resources: usize,
        hyperlinks: usize,
    },
    ResourcesSaved {
        url: String,
        saved: usize,
        failed: usize,
    },
    PageSaved {
        url: String,
        path: PathBuf,
        visited: usize,
        queued: usize,
    },
    PageFailed {
        url: String,
        reason: String,
    },
    Completed {
        pages: usize,
    },
}

pub(crate) fn emit(sink: Option<&ProgressSink>, event: MirrorEvent) {
    tracing::trace!(?event, "progress");
    if let Some(sink) = sink {
        sink(&event);
    }
}
