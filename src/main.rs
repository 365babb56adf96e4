use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use website_copier::{server, MirrorCommand, MirrorEvent, ProgressSink, WebsiteMirror};

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let progress_bar = (!args.json).then(spinner);
    let sink: ProgressSink = match &progress_bar {
        Some(bar) => {
            let bar = bar.clone();
            Arc::new(move |event: &MirrorEvent| render(&bar, event))
        }
        None => Arc::new(print_json),
    };

    let mirror = WebsiteMirror::new(
        &args.url,
        &args.output_dir,
        args.mirror_options().with_progress(sink),
        &args.fetch_config(),
    )?;

    let result = mirror.mirror_website().await;
    if let Some(bar) = &progress_bar {
        bar.finish_and_clear();
    }
    let report = result.with_context(|| format!("Failed to copy {}", args.url))?;

    if !args.json {
        println!("✅ Website copy completed successfully!");
        println!(
            "📊 Pages saved: {}, failed: {}",
            report.pages_saved.to_string().green(),
            report.pages_failed.to_string().red()
        );
        println!("📄 Index: {:?}", report.index_path);
    }

    if args.serve {
        if !args.json {
            println!(
                "🌐 Serving {:?} at {}",
                mirror.output_dir(),
                format!("http://127.0.0.1:{}/", args.port).blue()
            );
        }
        server::serve(mirror.output_dir().to_path_buf(), args.port).await?;
    }

    Ok(())
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn render(bar: &ProgressBar, event: &MirrorEvent) {
    match event {
        MirrorEvent::Started {
            url,
            output_dir,
            max_depth,
        } => {
            bar.println(format!("🚀 Starting website copy for: {}", url.blue()));
            bar.println(format!("📁 Output directory: {:?}", output_dir));
            bar.println(format!("🔗 Max depth: {}", max_depth));
        }
        MirrorEvent::LinksDiscovered {
            url,
            resources,
            hyperlinks,
        } => bar.set_message(format!(
            "🔍 {} ({} resources, {} links)",
            url, resources, hyperlinks
        )),
        MirrorEvent::ResourcesSaved { url, saved, failed } => {
            bar.set_message(format!("📥 {} ({} saved)", url, saved));
            if *failed > 0 {
                bar.println(format!(
                    "⚠️  {} resources of {} could not be saved",
                    failed.to_string().yellow(),
                    url
                ));
            }
        }
        MirrorEvent::PageSaved {
            url,
            visited,
            queued,
            ..
        } => bar.println(format!(
            "✅ Saved: {} {}",
            url.green(),
            format!("[{} visited, {} queued]", visited, queued).dimmed()
        )),
        MirrorEvent::PageFailed { url, reason } => {
            bar.println(format!("❌ {}: {}", url.red(), reason))
        }
        MirrorEvent::Completed { pages } => {
            bar.println(format!("🏁 Done, {} pages copied", pages))
        }
    }
}

fn print_json(event: &MirrorEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "failed to encode progress event"),
    }
}
