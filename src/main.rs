use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use sitepack::cli::MirrorCommand;
use sitepack::control::CancelToken;
use sitepack::events::{self, ArchiveOutcome, RunSummary, StatusEvent};
use sitepack::logging;
use sitepack::mirror::Mirror;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = MirrorCommand::parse();
    logging::init(command.verbose);

    let request = command.to_request().context("could not assemble the run")?;
    let cancel = CancelToken::new();
    let (events, mut rx) = events::channel();

    // First Ctrl-C drains in-flight work, a second one aborts outright.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            eprintln!("\nfinishing in-flight work, press Ctrl-C again to abort");
            cancel.cancel();
            let _ = tokio::signal::ctrl_c().await;
            std::process::exit(130);
        });
    }

    let json = command.json;
    let runner = tokio::spawn(Mirror::new(request, cancel, events).run());

    let spinner = (!json).then(make_spinner);
    while let Some(event) = rx.recv().await {
        if let Some(spinner) = &spinner {
            render_event(spinner, &event);
        }
    }
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }

    let summary = runner.await.context("mirror task aborted")??;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    if let ArchiveOutcome::Failed(reason) = &summary.archive {
        eprintln!("{} {reason}", "archive failed:".red().bold());
        std::process::exit(1);
    }
    Ok(())
}

fn make_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn render_event(spinner: &ProgressBar, event: &StatusEvent) {
    match event {
        StatusEvent::Started { seeds, output_root } => {
            spinner.println(format!(
                "🌐 mirroring {} seed(s) into {}",
                seeds,
                output_root.display().to_string().bold()
            ));
            spinner.set_message("crawling...");
        }
        StatusEvent::PageFetched { url, discovered } => {
            spinner.set_message(format!("fetched {url}"));
            if *discovered > 0 {
                spinner.println(format!(
                    "📄 {} {}",
                    url.to_string().green(),
                    format!("(+{discovered} links)").dimmed()
                ));
            } else {
                spinner.println(format!("📄 {}", url.to_string().green()));
            }
        }
        StatusEvent::PageFailed { url, reason } => {
            spinner.println(format!("❌ {} {}", url.to_string().red(), reason.dimmed()));
        }
        StatusEvent::ResourceFailed { url, reason } => {
            spinner.println(format!(
                "⚠️  {} left remote {}",
                url.to_string().yellow(),
                reason.dimmed()
            ));
        }
        StatusEvent::Completed(summary) => {
            spinner.println(render_summary(summary));
        }
        StatusEvent::Archived { path } => {
            spinner.println(format!("📦 archived to {}", path.display().to_string().bold()));
        }
        StatusEvent::Fatal { reason } => {
            spinner.println(format!("{} {reason}", "fatal:".red().bold()));
        }
    }
}

fn render_summary(summary: &RunSummary) -> String {
    format!(
        "✅ {}\n   pages:     {} ok, {} failed\n   resources: {} ok, {} failed\n   elapsed:   {:.1?}",
        "mirror complete".bold(),
        summary.pages_ok.to_string().green(),
        if summary.pages_failed > 0 {
            summary.pages_failed.to_string().red().to_string()
        } else {
            summary.pages_failed.to_string()
        },
        summary.resources_ok.to_string().green(),
        if summary.resources_failed > 0 {
            summary.resources_failed.to_string().red().to_string()
        } else {
            summary.resources_failed.to_string()
        },
        summary.elapsed
    )
}
