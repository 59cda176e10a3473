use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use plainvoice::app::{RunSummary, run_cli};
use plainvoice::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    tracing::debug!(version = %plainvoice::version_string(), "starting");

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let quiet = cli.quiet;
    let input = cli.input.clone();
    let summary = run_cli(cli)
        .await
        .with_context(|| format!("could not process {}", input.display()))?;
    if !quiet {
        print_summary(&summary);
    }
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise the flags pick the level.
fn init_logging(quiet: bool, verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        EnvFilter::new(format!("plainvoice={level},warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(summary: &RunSummary) {
    if let Some(report) = &summary.text {
        println!("{} {}", "✓".green(), report);
        println!("  text:  {}", summary.paths.simplified_md.display());
    }
    if let Some(report) = &summary.speech {
        println!("{} {}", "✓".green(), report);
        let seconds = summary.audio_duration.map(|d| d.as_secs()).unwrap_or(0);
        println!(
            "  audio: {} ({}m{:02}s)",
            summary.paths.audio.display(),
            seconds / 60,
            seconds % 60
        );
    }
    if let Some(dir) = &summary.retained_dir {
        println!("  unit audio kept in {}", dir.display());
    }
}
