pub mod cli;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod file_manager;
pub mod frontier;
pub mod html_parser;
pub mod materializer;
pub mod patchers;
pub mod path_mapper;
pub mod progress;
pub mod rewriter;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use cli::MirrorCommand;
pub use downloader::{copy_website, MirrorOptions, MirrorReport, WebsiteMirror};
pub use error::{FetchError, MirrorError};
pub use fetcher::{Fetch, FetchConfig, Fetched, HttpFetcher};
pub use file_manager::FileManager;
pub use html_parser::HtmlParser;
pub use progress::{MirrorEvent, ProgressSink};
