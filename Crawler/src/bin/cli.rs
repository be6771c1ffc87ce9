//! Search Crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use search_crawler::{
    aggregator::{AcceptAll, Grouping, KeywordFilter, SearchGroup},
    cache::CrawlCache,
    config::{DEFAULT_CONFIG_FILE, load_config},
    error::Result,
    models::{CacheConfig, Config},
    pipeline::{self, SearchContext},
    sources::SourceRegistry,
};

/// Search Crawler - concurrent keyword search across configured sources
#[derive(Parser, Debug)]
#[command(
    name = "search-crawler",
    version,
    about = "Concurrent keyword search and detail crawler"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search every configured source
    Search {
        /// Search keywords
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Only query these sources (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// How results are grouped
        #[arg(short, long, value_enum, default_value_t = GroupBy::Name)]
        group_by: GroupBy,

        /// Keep results whose names do not match the keywords
        #[arg(long)]
        all: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured sources
    Sources,

    /// Validate the configuration file and compile every selector
    Validate,

    /// Inspect or reset the crawl cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show entry count and size
    Info,
    /// Delete every cached page
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GroupBy {
    Single,
    Name,
    Source,
    Uid,
    Hash,
}

impl From<GroupBy> for Grouping {
    fn from(value: GroupBy) -> Self {
        match value {
            GroupBy::Single => Grouping::Single,
            GroupBy::Name => Grouping::Name,
            GroupBy::Source => Grouping::Source,
            GroupBy::Uid => Grouping::Uid,
            GroupBy::Hash => Grouping::Hash,
        }
    }
}

/// Initialize logging from the verbosity flag or the configured level.
fn init_logging(verbose: bool, config: &Config) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(cli.verbose, &config);

    match cli.command {
        Command::Search {
            keywords,
            sources,
            group_by,
            all,
            json,
        } => {
            let keywords = keywords.join(" ");
            let ctx = SearchContext::from_config(config)?;

            let grouping = Grouping::from(group_by);
            let view = if all {
                ctx.table.view(AcceptAll::grouped_by(grouping))
            } else {
                ctx.table.view(KeywordFilter::new(&keywords, grouping)?)
            };

            let summary = pipeline::run_search(&ctx, &keywords, &sources).await?;
            let groups = view.results();

            if json {
                print_json(&groups)?;
            } else {
                print_groups(&groups);
            }

            log::info!(
                "{} result(s) in {} group(s), {} before filtering",
                view.num_results(),
                groups.len(),
                summary.total_results
            );
            for outcome in &summary.outcomes {
                log::info!(
                    "  {}: {} result(s), {} page(s), {} dropped{}{}",
                    outcome.source,
                    outcome.results_emitted,
                    outcome.pages_fetched,
                    outcome.candidates_dropped,
                    if outcome.blocked { ", blocked" } else { "" },
                    if outcome.timed_out { ", timed out" } else { "" }
                );
            }
        }

        Command::Sources => {
            if config.sources.is_empty() {
                log::warn!("No sources configured in {}", cli.config.display());
            }
            for source in &config.sources {
                let crawls = if source.detail.is_some() {
                    "detail crawl"
                } else {
                    "listing only"
                };
                println!(
                    "{}\t{} page(s)\t{}\t{}",
                    source.name, source.max_pages, crawls, source.query_url
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let registry = SourceRegistry::from_config(&config)?;
            log::info!("✓ Config OK ({} source(s))", registry.len());
        }

        Command::Cache { action } => {
            // Inspect the configured directory even when caching is switched off.
            let cache = CrawlCache::from_config(&CacheConfig {
                enabled: true,
                ..config.cache.clone()
            });
            let location = config
                .cache
                .dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "in-memory (no cache.dir configured)".to_string());

            match action {
                CacheAction::Info => {
                    log::info!("Cache location: {location}");
                    log::info!("Entries: {}", cache.num_entries().await);
                    log::info!("Size: {} bytes", cache.size_in_bytes().await);
                    log::info!("Eviction: {:?}", config.cache.eviction);
                }
                CacheAction::Clear => {
                    let before = cache.num_entries().await;
                    cache.clear().await;
                    log::info!("Removed {before} entries from {location}");
                }
            }
        }
    }

    Ok(())
}

fn print_groups(groups: &[SearchGroup]) {
    for group in groups {
        let label = if group.key().as_str().is_empty() {
            "(all)"
        } else {
            group.key().as_str()
        };
        println!("== {} ({})", label, group.len());
        for result in group.results() {
            println!(
                "   [{}] {}  {}  {}",
                result.source,
                result.display_name,
                format_size(result.size),
                result.locator
            );
        }
    }
}

fn print_json(groups: &[SearchGroup]) -> Result<()> {
    let value: Vec<serde_json::Value> = groups
        .iter()
        .map(|group| {
            let results: Vec<_> = group.results().iter().map(|r| r.as_ref()).collect();
            serde_json::json!({ "key": group.key().as_str(), "results": results })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
