//! Wayfarer main entry point
//!
//! A thin command-line driver over the fetch-and-parse core: it fetches each
//! URL given on the command line and prints what the parser found.

use anyhow::Context;
use clap::Parser as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wayfarer::config::{load_config, Config};
use wayfarer::crawler::{FetchOutcome, FetchRequest, Fetcher, ParseOutcome, Parser};

/// Wayfarer: polite fetch-and-parse
///
/// Fetches each URL under a shared politeness delay, classifies the
/// response, and prints the outgoing links of every HTML page.
#[derive(clap::Parser, Debug)]
#[command(name = "wayfarer")]
#[command(version)]
#[command(about = "Polite fetch-and-parse", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// URLs to fetch
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    let fetcher = Arc::new(Fetcher::from_config(&config).context("failed to build fetcher")?);
    let parser = Arc::new(Parser::new(config.parser.clone()));

    let mut tasks = tokio::task::JoinSet::new();
    for (index, url) in cli.urls.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let parser = Arc::clone(&parser);
        tasks.spawn(async move {
            let request = FetchRequest::new(url);
            let outcome = fetcher.fetch(&request).await;
            (index, describe(&parser, &request, outcome))
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!("Fetch task failed: {}", e),
        }
    }

    // Print in command-line order, whatever order the fetches finished in
    reports.sort_by_key(|(index, _)| *index);
    for (_, report) in reports {
        println!("{}", report);
    }

    fetcher.shutdown().await;
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wayfarer=info,warn"),
            1 => EnvFilter::new("wayfarer=debug,info"),
            2 => EnvFilter::new("wayfarer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Renders one fetch (and parse, for successes) as printable lines
fn describe(parser: &Parser, request: &FetchRequest, outcome: FetchOutcome) -> String {
    match outcome {
        FetchOutcome::Success {
            fetched_url,
            content_type,
            charset_hint,
            payload,
            ..
        } => {
            let parsed = parser.parse(
                &payload,
                content_type.as_deref(),
                charset_hint.as_deref(),
                &fetched_url,
            );
            match parsed {
                Ok(ParseOutcome::Binary) => {
                    format!("{} 200 binary ({} bytes)", fetched_url, payload.len())
                }
                Ok(ParseOutcome::PlainText { text }) => {
                    format!("{} 200 text ({} chars)", fetched_url, text.chars().count())
                }
                Ok(ParseOutcome::Html {
                    title,
                    outgoing_links,
                    ..
                }) => {
                    let mut lines = vec![format!(
                        "{} 200 html {:?} ({} links)",
                        fetched_url,
                        title.unwrap_or_default(),
                        outgoing_links.len()
                    )];
                    for link in outgoing_links {
                        lines.push(format!("  -> {} {:?}", link.target_url, link.anchor_text));
                    }
                    lines.join("\n")
                }
                Err(e) => format!("{} 200 unparsed: {}", fetched_url, e),
            }
        }
        FetchOutcome::Redirect {
            status_code,
            target_url,
        } => format!(
            "{} {} redirect -> {}",
            request.url,
            status_code,
            target_url.as_deref().unwrap_or("(no location)")
        ),
        FetchOutcome::TooLarge { size } => {
            format!("{} too large ({} bytes)", request.url, size)
        }
        FetchOutcome::TransportError { kind, message } => {
            format!("{} transport error ({}): {}", request.url, kind, message)
        }
        FetchOutcome::UnknownError { message } => {
            format!("{} error: {}", request.url, message)
        }
        other => match other.status_code() {
            Some(code) => format!("{} {} {}", request.url, code, other.label()),
            None => format!("{} {}", request.url, other.label()),
        },
    }
}
