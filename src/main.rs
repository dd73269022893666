//! # Knowbot CLI Application
//!
//! Command-line interface for the knowbot crawl pipeline.
//!
//! ## Subcommands
//!
//! - `crawl`: Fetch a list of URLs and fold their signals into storage
//! - `stats`: Counts over the crawl tables and the entity graph
//! - `query`: Contact summaries for crawled domains
//!
//! Storage handles are opened once here and handed to the library.

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use knowbot::crawler::{CrawlOrchestrator, CrawlerConfig, HttpFetcher, PageOutcome};
use knowbot::graph::{DisabledGraph, GraphStats, GraphStore, LibsqlGraph};
use knowbot::store::Database;
use tokio::sync::mpsc;
use tracing::{info, instrument};

/// Company websites crawled when no URLs are given
const DEFAULT_SEEDS: &[&str] = &[
    "https://www.tatasteel.com",
    "https://www.jsw.in",
    "https://www.mahindra.com",
    "https://www.infosys.com",
    "https://www.tcs.com",
    "https://www.wipro.com",
    "https://www.hcltech.com",
    "https://www.ril.com",
    "https://www.adani.com",
    "https://www.britannia.co.in",
];

#[derive(Parser)]
#[command(author, version, about = "Harvest contacts and entities from company websites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl a list of URLs and update the domain aggregates and entity graph
    Crawl(CrawlArgs),

    /// Show crawl and graph counts
    Stats(StatsArgs),

    /// List contact summaries for crawled domains
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Crawl database path
    #[arg(long, env = "KNOWBOT_DATABASE", default_value = "knowbot.db")]
    database: PathBuf,

    /// Entity graph database path
    #[arg(long, env = "KNOWBOT_GRAPH_DATABASE", default_value = "knowbot-graph.db")]
    graph_database: PathBuf,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// URLs to crawl (defaults to the built-in seed list)
    urls: Vec<String>,

    /// Read additional URLs from a file, one per line
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[command(flatten)]
    storage: StorageArgs,

    /// Skip the entity graph
    #[arg(long)]
    no_graph: bool,

    /// Number of fetches in flight
    #[arg(short, long, default_value = "1")]
    concurrency: usize,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "10")]
    timeout_secs: u64,

    /// User agent sent with every request
    #[arg(short, long, default_value = "KnowledgeBot/1.0")]
    user_agent: String,
}

#[derive(Args, Debug)]
struct StatsArgs {
    #[command(flatten)]
    storage: StorageArgs,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(flatten)]
    storage: StorageArgs,

    /// Maximum number of domains to return
    #[arg(short, long, default_value = "10")]
    max_results: usize,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _otel = telemetry::init_tracing_subscriber()?;

    match cli.command {
        Some(Commands::Crawl(args)) => {
            crawl_command(args).await?;
        }
        Some(Commands::Stats(args)) => {
            stats_command(args).await?;
        }
        Some(Commands::Query(args)) => {
            query_command(args).await?;
        }
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["knowbot", "--help"]);
        }
    }

    Ok(())
}

async fn open_database(path: &Path) -> anyhow::Result<Database> {
    Database::new_from_path(&path.to_string_lossy())
        .await
        .with_context(|| format!("Failed to open crawl database {}", path.display()))
}

async fn open_graph(path: &Path) -> anyhow::Result<LibsqlGraph> {
    LibsqlGraph::new_from_path(&path.to_string_lossy())
        .await
        .with_context(|| format!("Failed to open graph database {}", path.display()))
}

/// Collect URLs from the arguments and the optional file, falling back to the seed list
async fn collect_urls(urls: Vec<String>, file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut collected = urls;

    if let Some(file) = file {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read URL list {}", file.display()))?;
        collected.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    if collected.is_empty() {
        collected = DEFAULT_SEEDS.iter().map(|url| url.to_string()).collect();
    }

    Ok(collected)
}

#[instrument]
async fn crawl_command(args: CrawlArgs) -> anyhow::Result<()> {
    let urls = collect_urls(args.urls, args.file.as_deref()).await?;

    let config = CrawlerConfig::builder()
        .user_agent(args.user_agent)
        .timeout_secs(args.timeout_secs)
        .concurrency(args.concurrency)
        .build();

    let fetcher = HttpFetcher::new(&config)?;
    let db = open_database(&args.storage.database).await?;
    let graph: Arc<dyn GraphStore> = if args.no_graph {
        Arc::new(DisabledGraph)
    } else {
        Arc::new(open_graph(&args.storage.graph_database).await?)
    };

    println!("Crawling {} URLs...", urls.len());
    info!(urls = urls.len(), "Starting crawl");

    let progress_bar = ProgressBar::new(urls.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );

    let (progress_sender, mut progress_receiver) = mpsc::channel::<PageOutcome>(100);

    // Spawn a task to process progress updates
    let progress_handle = tokio::spawn({
        let progress_bar = progress_bar.clone();
        async move {
            while let Some(outcome) = progress_receiver.recv().await {
                progress_bar.inc(1);
                let mark = if outcome.succeeded { "ok" } else { "failed" };
                progress_bar.set_message(format!("{} {}", mark, outcome.url));
            }
            progress_bar.finish_with_message("Crawl completed");
        }
    });

    let start_time = std::time::Instant::now();
    let orchestrator = CrawlOrchestrator::new(fetcher, db, graph, config);
    let report = orchestrator
        .run_with_progress(&urls, Some(progress_sender))
        .await;

    // Ends once the orchestrator has dropped the sender
    let _ = progress_handle.await;

    println!(
        "Crawled {} of {} URLs in {:.2?}",
        report.succeeded,
        report.attempted,
        start_time.elapsed()
    );
    for failure in &report.failures {
        println!("  {:?} failed for {}: {}", failure.stage, failure.url, failure.error);
    }

    Ok(())
}

#[instrument]
async fn stats_command(args: StatsArgs) -> anyhow::Result<()> {
    let db = open_database(&args.storage.database).await?;
    let crawl = db.stats().await?;

    let graph = if args.storage.graph_database.exists() {
        open_graph(&args.storage.graph_database).await?.stats().await?
    } else {
        GraphStats::default()
    };

    match args.format.as_str() {
        "json" => {
            let json = serde_json::json!({
                "urls_crawled": crawl.urls_crawled,
                "domains_processed": crawl.domains_processed,
                "entities": graph.entities,
                "relationships": graph.relationships,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!("URLs crawled: {}", crawl.urls_crawled);
            println!("Domains processed: {}", crawl.domains_processed);
            println!("Entities: {}", graph.entities);
            println!("Relationships: {}", graph.relationships);
        }
    }

    Ok(())
}

#[instrument]
async fn query_command(args: QueryArgs) -> anyhow::Result<()> {
    let db = open_database(&args.storage.database).await?;
    let results = db.query_contacts(args.max_results).await?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => {
            println!("Found {} domains with contacts", results.len());
            for (i, result) in results.iter().enumerate() {
                println!("{}. {} ({})", i + 1, result.company_name, result.domain);
                println!("   Pages: {}  Confidence: {:.2}", result.url_count, result.confidence);
                for email in &result.contacts.emails {
                    println!("   Email: {}", email);
                }
                for phone in &result.contacts.phones {
                    println!("   Phone: {}", phone);
                }
                println!();
            }
        }
    }

    Ok(())
}
