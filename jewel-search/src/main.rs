//! jewel-search - Multimodal jewelry search CLI
//!
//! One-shot: `jewel-search "gold jhumka"`, `jewel-search photo.jpg`,
//! `jewel-search "photo.jpg | in silver please"`, `jewel-search query.m4a`,
//! `jewel-search https://shop.example/item`.
//! Without a query argument, reads queries interactively until `exit`, EOF,
//! or Ctrl+C at the prompt. Ctrl+C during a search cancels only that search.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jewel_common::config::TomlConfig;
use jewel_search::cli::{render_table, resolve_query_input, InterruptAction, Interrupts};
use jewel_search::clients::web_image::WebImageFetcher;
use jewel_search::clients::{build_capabilities, http_client};
use jewel_search::{SearchError, SearchOutcome, SearchPipeline};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

/// Command-line arguments for jewel-search
#[derive(Parser, Debug)]
#[command(name = "jewel-search")]
#[command(about = "Search a jewelry catalog by text, image, audio, or image + text")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
))]
struct Args {
    /// Config file (default: $JEWEL_CONFIG, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Number of results to return
    #[arg(short = 'n', long)]
    top: Option<usize>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Query text, image/audio path, page URL, or "image_path | text"
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Configured logging needs the config; until then log to stderr
    let mut config = jewel_common::logging::with_startup_logging(|| {
        TomlConfig::load_or_default(args.config.as_deref())
    })
    .context("Failed to load configuration")?;
    if let Some(top) = args.top {
        anyhow::ensure!(top > 0, "--top must be at least 1");
        config.search.result_count = top;
    }

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(ExitCode::SUCCESS);
    }

    jewel_common::logging::init_tracing(&config.logging)
        .context("Failed to initialize logging")?;

    info!(
        "Starting jewel-search v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        index = %config.services.index_url,
        collection = %config.services.collection,
        inference = %config.services.inference_url,
        "Services configured"
    );

    let capabilities = build_capabilities(&config).context("Failed to initialize services")?;
    let session = Session {
        pipeline: SearchPipeline::new(capabilities, &config),
        fetcher: WebImageFetcher::new(http_client(&config.services)?)
            .context("Failed to initialize page image fetcher")?,
        interrupts: install_interrupt_watcher(),
        json: args.json,
    };

    if args.query.is_empty() {
        interactive(&session).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let raw = args.query.join(" ");
    match run_query(&session, &raw).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            report(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Everything one query needs, built once at startup
struct Session {
    pipeline: SearchPipeline,
    fetcher: WebImageFetcher,
    interrupts: Arc<Interrupts>,
    json: bool,
}

/// Route every Ctrl+C through one listener for the life of the process
fn install_interrupt_watcher() -> Arc<Interrupts> {
    let interrupts = Arc::new(Interrupts::default());

    let watcher = interrupts.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match watcher.interrupt() {
                InterruptAction::CancelSearch => info!("Received Ctrl+C, cancelling search"),
                InterruptAction::Exit => {
                    info!("Received Ctrl+C while idle, exiting");
                    eprintln!();
                    std::process::exit(130);
                }
            }
        }
    });

    interrupts
}

/// Parse, search and print one query; Ctrl+C cancels the search
async fn run_query(session: &Session, raw: &str) -> Result<(), SearchError> {
    let cancel = session.interrupts.begin();

    let result = async {
        let input = tokio::select! {
            input = resolve_query_input(raw, &session.fetcher) => input?,
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
        };
        session.pipeline.search_with_cancel(input, &cancel).await
    }
    .await;
    session.interrupts.finish();

    print_outcome(&result?, session.json);
    Ok(())
}

/// Read queries from stdin until `exit`, `quit`, EOF or Ctrl+C
async fn interactive(session: &Session) -> Result<()> {
    println!("Jewelry search. Text, image path, audio path, page URL, or \"image_path | text\". Type 'exit' or press Ctrl+C to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nsearch: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if let Err(e) = run_query(session, line).await {
            report(&e);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &SearchOutcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => eprintln!("error[io]: failed to render JSON: {}", e),
        }
    } else {
        print!("{}", render_table(outcome));
    }
}

fn report(e: &SearchError) {
    eprintln!("error[{}]: {}", e.kind(), e);
}
