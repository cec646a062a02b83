//! wikiseek CLI - Search pre-chunked documentation from the terminal.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use wikiseek_core::{
    Chunk, Embedder, IndexStatus, QueryRefiner, SearchRecord, SearchResult, WikiseekConfig,
};
use wikiseek_embed::OnnxEmbedder;
use wikiseek_engine::{Retriever, SearchOptions};
use wikiseek_index::{l2_normalize, VectorIndex};
use wikiseek_refine::{HttpRefiner, PassthroughRefiner};
use wikiseek_store::HistoryStore;

/// wikiseek - Vector search over pre-chunked documentation
#[derive(Parser)]
#[command(name = "wikiseek")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/wikiseek/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from a chunk corpus
    Build {
        /// JSON file holding the ordered chunk array
        chunks: PathBuf,

        /// Output directory (default: configured index directory)
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// Search the index
    Search {
        /// Search query (omit for interactive mode)
        query: Option<String>,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Enable query refinement
        #[arg(short, long)]
        refine: bool,

        /// Disable query refinement
        #[arg(long)]
        no_refine: bool,

        /// Show the original/refined query pair
        #[arg(long)]
        show_refinement: bool,

        /// Disable deduplication
        #[arg(long)]
        no_dedup: bool,

        /// Maximum content length to display
        #[arg(long, default_value = "300")]
        max_content: usize,

        /// Start interactive search mode
        #[arg(short, long)]
        interactive: bool,
    },

    /// Show index statistics
    Stats,

    /// Show search history
    History {
        /// Number of recent searches to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&PathBuf>) -> Result<WikiseekConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(WikiseekConfig::load(p)?),
        None => Ok(WikiseekConfig::load_default()?),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Build { chunks, index_dir } => {
            build(&config, &chunks, index_dir).await?;
        }
        Commands::Search {
            query,
            top_k,
            refine,
            no_refine,
            show_refinement,
            no_dedup,
            max_content,
            interactive,
        } => {
            let use_refine = if no_refine {
                false
            } else {
                refine || config.refiner.enabled
            };

            let opts = SearchOptions {
                top_k: top_k.unwrap_or(config.search.default_top_k),
                refine: use_refine,
                show_refinement,
                dedup: !no_dedup && config.search.dedup,
            };

            let (retriever, refiner) = make_retriever(&config, use_refine)?;
            let history = open_history(&config);

            if interactive || query.is_none() {
                search_interactive(&retriever, &refiner, history.as_ref(), opts, max_content).await;
            } else {
                let query = query.unwrap_or_default();
                search_once(&retriever, history.as_ref(), &query, opts, max_content).await?;
            }
        }
        Commands::Stats => {
            stats(&config)?;
        }
        Commands::History { limit } => {
            history(&config, limit)?;
        }
    }

    Ok(())
}

/// Read the chunk corpus, embed every passage, and persist the artifacts.
async fn build(
    config: &WikiseekConfig,
    chunks_path: &PathBuf,
    index_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = index_dir.unwrap_or_else(|| config.index.dir.clone());

    println!("Reading chunk corpus from {}...", chunks_path.display());
    let file = File::open(chunks_path)?;
    let chunks: Vec<Chunk> = serde_json::from_reader(BufReader::new(file))?;

    let total = chunks.len();
    let chunks: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| !c.content.trim().is_empty())
        .collect();
    if chunks.len() != total {
        warn!("Skipped {} chunks with empty content", total - chunks.len());
    }
    if chunks.is_empty() {
        return Err("chunk corpus is empty".into());
    }

    println!("Loading embedding model...");
    let embedder = OnnxEmbedder::new(&config.embedding)?;

    println!("Embedding {} chunks...", chunks.len());
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    let batch_size = config.embedding.batch_size.max(1);

    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<&str> = batch.iter().map(|c| c.embedding_text()).collect();
        let mut batch_vectors = embedder.embed_passages(&texts).await?;
        for v in &mut batch_vectors {
            l2_normalize(v);
        }
        vectors.extend(batch_vectors);

        let done = ((i + 1) * batch_size).min(chunks.len());
        println!("  {}/{} embedded", done, chunks.len());
    }

    let index = VectorIndex::build(vectors, chunks)?;
    let (index_path, metadata_path) = index.save(&out_dir)?;

    println!("Index written to {}", index_path.display());
    println!("Metadata written to {}", metadata_path.display());
    Ok(())
}

#[allow(clippy::type_complexity)]
fn make_retriever(
    config: &WikiseekConfig,
    use_refine: bool,
) -> Result<
    (Retriever<OnnxEmbedder, dyn QueryRefiner>, Arc<dyn QueryRefiner>),
    Box<dyn std::error::Error>,
> {
    println!("Loading embedding model...");
    let embedder = Arc::new(OnnxEmbedder::new(&config.embedding)?);

    let refiner: Arc<dyn QueryRefiner> = if use_refine {
        match HttpRefiner::new(&config.refiner) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                warn!("Could not build query refiner: {}; continuing without", e);
                Arc::new(PassthroughRefiner)
            }
        }
    } else {
        Arc::new(PassthroughRefiner)
    };

    Ok((Retriever::new(config, embedder, refiner.clone()), refiner))
}

fn open_history(config: &WikiseekConfig) -> Option<HistoryStore> {
    match HistoryStore::open(&config.history.path) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Search history disabled: {}", e);
            None
        }
    }
}

async fn search_once(
    retriever: &Retriever<OnnxEmbedder, dyn QueryRefiner>,
    history: Option<&HistoryStore>,
    query: &str,
    opts: SearchOptions,
    max_content: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Searching for: '{}'", query);

    let start = Instant::now();
    let results = retriever.search(query, opts.clone()).await?;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    log_history(history, query, &results, &opts, elapsed_ms);

    if results.is_empty() {
        println!("No results found.");
    } else {
        print_results(&results, max_content, opts.show_refinement);
        println!("\nSearch completed in {}ms", elapsed_ms);
    }

    Ok(())
}

async fn search_interactive(
    retriever: &Retriever<OnnxEmbedder, dyn QueryRefiner>,
    refiner: &Arc<dyn QueryRefiner>,
    history: Option<&HistoryStore>,
    opts: SearchOptions,
    max_content: usize,
) {
    let mut show_refinement = opts.show_refinement;

    println!("\n{}", "=".repeat(60));
    println!("WIKISEEK INTERACTIVE SEARCH");
    println!(
        "Query refinement: {}",
        if opts.refine { "ENABLED" } else { "DISABLED" }
    );
    println!("Enter queries to search (or 'quit' to exit)");
    println!("Showing top {} results per query", opts.top_k);
    print_interactive_help();
    println!("{}", "=".repeat(60));

    let stdin = std::io::stdin();
    loop {
        print!("\nQuery: ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!("\nGoodbye!");
                break;
            }
            Ok(_) => {}
        }
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "q" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_interactive_help();
                continue;
            }
            "stats" => {
                print_stats(&retriever.stats());
                continue;
            }
            "toggle" => {
                show_refinement = !show_refinement;
                println!(
                    "Query refinement display: {}",
                    if show_refinement { "ON" } else { "OFF" }
                );
                continue;
            }
            _ => {}
        }

        if let Some(rest) = input.strip_prefix("refine ") {
            let query = rest.trim();
            if !query.is_empty() {
                match refiner.refine(query).await {
                    Ok(refined) => {
                        println!("Original: {}", query);
                        println!("Refined:  {}", refined);
                    }
                    Err(e) => eprintln!("Refinement failed: {}", e),
                }
            }
            continue;
        }

        let query = input.to_string();
        let mut opts = opts.clone();
        opts.show_refinement = show_refinement;

        println!("\nSearching for: '{}'", query);
        let start = Instant::now();
        match retriever.search(&query, opts.clone()).await {
            Ok(results) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                log_history(history, &query, &results, &opts, elapsed_ms);

                if results.is_empty() {
                    println!("No results found.");
                } else {
                    print_results(&results, max_content, show_refinement);
                }
            }
            Err(e) => {
                eprintln!("Error during search: {}", e);
            }
        }
    }
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  'quit' or 'exit' - Exit the program");
    println!("  'help' - Show this help");
    println!("  'stats' - Show index statistics");
    println!("  'toggle' - Toggle query refinement display");
    println!("  'refine <query>' - Show refinement for a query without searching");
}

fn log_history(
    history: Option<&HistoryStore>,
    query: &str,
    results: &[SearchResult],
    opts: &SearchOptions,
    elapsed_ms: u64,
) {
    let Some(store) = history else {
        return;
    };

    let final_query = results
        .first()
        .map(|r| r.final_query.as_str())
        .unwrap_or(query);

    let record = SearchRecord::new(
        query,
        final_query,
        opts.top_k as u32,
        opts.refine,
        results.len() as u32,
        elapsed_ms,
    );

    if let Err(e) = store.log_search(&record) {
        warn!("Could not log search: {}", e);
    }
}

fn print_results(results: &[SearchResult], max_content: usize, show_queries: bool) {
    if show_queries {
        if let Some(first) = results.first() {
            println!("\nOriginal query: {}", first.original_query);
            if first.original_query != first.final_query {
                println!("Refined query:  {}", first.final_query);
            }
        }
    }

    for result in results {
        println!("\n{}", "=".repeat(60));
        println!("Rank {} | Score: {:.4}", result.rank, result.score);

        if result.aliases.len() > 1 {
            let others: Vec<&str> = result
                .aliases
                .iter()
                .filter(|a| **a != result.chunk.page_title)
                .map(|a| a.as_str())
                .collect();
            println!("Page: {}", result.chunk.page_title);
            println!("Aliases: {}", others.join(", "));
        } else {
            println!("Page: {}", result.chunk.page_title);
        }

        println!("Section: {}", result.chunk.section_path);
        println!("Type: {}", result.chunk.chunk_type);
        println!("URL: {}", result.chunk.url);
        println!("{}", "-".repeat(60));

        let content: String = result.chunk.content.chars().take(max_content).collect();
        if result.chunk.content.chars().count() > max_content {
            println!("{}...", content);
        } else {
            println!("{}", content);
        }
    }
}

fn stats(config: &WikiseekConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stats = match VectorIndex::load(&config.index.dir)? {
        Some(index) => index.stats(),
        None => {
            println!(
                "No index found in {}. Run 'wikiseek build' first.",
                config.index.dir.display()
            );
            return Ok(());
        }
    };

    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &wikiseek_core::IndexStats) {
    println!("\nIndex Statistics:");
    match stats.status {
        IndexStatus::Loaded => println!("  Status: loaded"),
        IndexStatus::NotLoaded => {
            println!("  Status: not loaded");
            return;
        }
    }
    println!("  Total vectors: {}", stats.total_vectors);
    println!("  Total chunks: {}", stats.total_chunks);
    println!("  Vector dimension: {}", stats.dimension);
    if let Some(checksum) = &stats.checksum {
        println!("  Checksum: {}", checksum);
    }
    println!("  Chunk type distribution:");
    for (chunk_type, count) in &stats.chunk_types {
        println!("    {}: {}", chunk_type, count);
    }
}

fn history(config: &WikiseekConfig, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let store = HistoryStore::open(&config.history.path)?;

    let stats = store.search_stats()?;
    println!("Search Statistics:");
    println!("  Total searches: {}", stats.total_searches);
    println!("  Average search time: {:.1}ms", stats.avg_elapsed_ms);
    println!("  Searches with refinement: {}", stats.refined_searches);
    if let Some(last) = stats.last_search {
        println!("  Last search: {}", last);
    }

    let recent = store.recent_searches(limit)?;
    if recent.is_empty() {
        return Ok(());
    }

    println!("\nRecent Searches (last {}):", recent.len());
    for record in recent {
        println!("  {}", record.timestamp);
        println!("    Query: {}", record.original_query);
        if record.refined && record.final_query != record.original_query {
            println!("    Refined: {}", record.final_query);
        }
        println!(
            "    Results: {}, Time: {}ms",
            record.result_count, record.elapsed_ms
        );
        println!();
    }

    Ok(())
}
