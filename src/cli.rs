use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::MirrorOptions;
use crate::fetcher::FetchConfig;

#[derive(Parser, Debug)]
#[command(
    name = "website-copier",
    about = "A CLI utility to copy a website to local storage",
    version,
    long_about = "Downloads a page of a website together with its stylesheets, scripts, images and media, rewrites every reference to the local copies, optionally follows same-host links to a bounded depth, and can serve the result locally."
)]
pub struct MirrorCommand {
    /// The URL of the website to copy
    #[arg(required = true)]
    pub url: String,

    /// Output directory for the copied website
    #[arg(short, long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Link hops to follow from the seed page (0 = seed page only)
    #[arg(short = 'd', long = "depth", default_value = "0")]
    pub max_depth: usize,

    /// Maximum concurrent resource downloads per page
    #[arg(short = 'c', long, default_value = "16", value_parser = parse_positive)]
    pub max_concurrent: usize,

    /// Serve the output directory once the copy is done
    #[arg(long)]
    pub serve: bool,

    /// Port for --serve
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// User agent string to use for requests
    #[arg(long, default_value = "WebsiteCopier/1.0")]
    pub user_agent: String,

    /// Timeout for requests in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Print progress as one JSON event per line
    #[arg(long)]
    pub json: bool,
}

impl MirrorCommand {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout),
            ..FetchConfig::default()
        }
    }

    pub fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions::default()
            .with_max_depth(self.max_depth)
            .with_max_concurrent(self.max_concurrent)
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
