//! Feed-Trawl main entry point
//!
//! This is the command-line interface for the Feed-Trawl timeline crawler.

use anyhow::Context;
use clap::Parser;
use feed_trawl::config::{load_config_with_hash, validate, Config};
use feed_trawl::crawler::{
    build_http_client, CommandSigner, CrawlEngine, CrawlRequest, DedupSync, DiagnosticSink,
    PageFetcher, PassthroughSigner, ReqwestTransport, RetryScheduler, Signer,
};
use feed_trawl::endpoint::{resolve_target, EndpointKind, RequestVariantCatalog};
use feed_trawl::output::collect_sessions;
use feed_trawl::storage::{open_storage, DedupStore, SqliteStorage};
use feed_trawl::DedupScope;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Feed-Trawl: a resilient timeline crawler
///
/// Feed-Trawl walks paginated item timelines (a user's posts or likes, a
/// collection, a music track, a user's collections) and writes the collected
/// records as JSON. With the database enabled it remembers what it has seen, so
/// `--increase` stops as soon as it reaches already synchronized items.
#[derive(Parser, Debug)]
#[command(name = "feed-trawl")]
#[command(version = "1.0.0")]
#[command(about = "A resilient timeline crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Collection mode: post, like, mix, music or mix-list
    ///
    /// When omitted, the mode is inferred from each target URL (post for bare ids).
    #[arg(short, long)]
    mode: Option<EndpointKind>,

    /// Target: an id, a web URL or pasted share text; repeat for parallel sessions
    #[arg(short, long = "target", value_name = "TARGET", required_unless_present_any = ["dry_run", "stats"])]
    targets: Vec<String>,

    /// Stop at the first previously stored, non-pinned item
    #[arg(long)]
    increase: bool,

    /// Maximum records per target (0 = unbounded); overrides the config
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// First included day (YYYY-MM-DD or "now"); overrides the config
    #[arg(long, value_name = "DATE")]
    start: Option<String>,

    /// Last included day (YYYY-MM-DD or "now"); overrides the config
    #[arg(long, value_name = "DATE")]
    end: Option<String>,

    /// Forget stored items of the targeted scopes before crawling
    #[arg(long)]
    fresh: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the effective settings without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    apply_overrides(&mut config, &cli).context("Invalid command-line override")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, &cli, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("feed_trawl=info,warn"),
            1 => EnvFilter::new("feed_trawl=debug,info"),
            2 => EnvFilter::new("feed_trawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides and re-validates
fn apply_overrides(config: &mut Config, cli: &Cli) -> feed_trawl::ConfigResult<()> {
    if let Some(max_items) = cli.max_items {
        config.crawler.max_items = max_items;
    }
    if let Some(start) = &cli.start {
        config.window.start_date = Some(start.clone());
    }
    if let Some(end) = &cli.end {
        config.window.end_date = Some(end.clone());
    }
    validate(config)
}

/// Handles the --dry-run mode: validates config and shows the effective settings
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let policy = config.retry_policy();
    let limits = config.limits();
    let window = config.crawl_window()?;
    let mode = cli.mode.unwrap_or(EndpointKind::Post);
    let descriptor = config.descriptor(mode);

    println!("=== Feed-Trawl Dry Run ===\n");

    match cli.mode {
        Some(mode) => println!("Mode: {}", mode),
        None => println!("Mode: inferred per target (default {})", mode),
    }
    println!("  Endpoint: {}{}", config.client.base_url, descriptor.path);
    println!("  Page size: {}", descriptor.page_size);
    println!("  Targets ({}):", cli.targets.len());
    for target in &cli.targets {
        println!("    - {}", target);
    }

    println!("\nRetry:");
    println!("  Max attempts: {}", policy.max_attempts);
    println!(
        "  Timeout: {:?} + {:?} per attempt",
        policy.base_timeout, policy.timeout_step
    );
    println!("  Jitter: {:?} - {:?}", policy.jitter.min, policy.jitter.max);
    println!("  Penalty: {:?} - {:?}", policy.penalty.min, policy.penalty.max);

    println!("\nLimits:");
    if limits.max_items == 0 {
        println!("  Max items: unbounded");
    } else {
        println!("  Max items: {}", limits.max_items);
    }
    println!("  Max pages: {}", limits.max_pages);
    println!("  Max failure streak: {}", limits.max_failure_streak);

    println!("\nWindow:");
    if window.is_unbounded() {
        println!("  All dates");
    } else {
        println!("  {} to {}", window.start, window.end);
    }
    println!("  Time zone: {}", config.day_boundary()?);

    println!("\nOutput:");
    match config.database_path() {
        Some(path) => println!("  Database: {}", path.display()),
        None => println!("  Database: disabled"),
    }
    println!("  Records: {}", config.output.records_dir);
    println!("  Diagnostics: {}", config.output.diagnostics_dir);

    println!("\nSigner:");
    match &config.signer.command {
        Some(command) => println!("  {} {}", command, config.signer.args.join(" ")),
        None => println!("  none (queries sent unsigned)"),
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use feed_trawl::output::{load_statistics, print_statistics};

    let path = config
        .database_path()
        .context("The database is disabled in the configuration")?;

    println!("Database: {}\n", path.display());

    let storage = SqliteStorage::new(&path)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Opens the dedup store and clears targeted scopes when `--fresh` is set
fn prepare_store(
    config: &Config,
    cli: &Cli,
    targets: &[(EndpointKind, String)],
) -> anyhow::Result<Option<Arc<SqliteStorage>>> {
    let Some(path) = config.database_path() else {
        if cli.increase {
            tracing::warn!("--increase has no effect while the database is disabled");
        }
        return Ok(None);
    };

    let store = open_storage(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    if cli.fresh {
        for (mode, target) in targets {
            let scope = DedupScope::new(config.descriptor(*mode).scope_prefix, target.clone());
            let removed = store.clear_scope(&scope.key())?;
            tracing::info!("Cleared {} stored items of {}", removed, scope);
        }
    }

    Ok(Some(Arc::new(store)))
}

/// Resolves every `--target` into a mode and an id
async fn resolve_targets(
    client: &reqwest::Client,
    config: &Config,
    cli: &Cli,
) -> anyhow::Result<Vec<(EndpointKind, String)>> {
    let headers = RequestVariantCatalog::generate(config.client.base_url.clone())
        .variant(EndpointKind::Post, 0)
        .headers;
    let timeout = config.retry_policy().base_timeout;

    let mut resolved = Vec::with_capacity(cli.targets.len());
    for input in &cli.targets {
        let target = resolve_target(client, input, &headers, timeout)
            .await
            .with_context(|| format!("Cannot resolve target '{}'", input))?;
        let mode = target
            .mode(cli.mode)
            .with_context(|| format!("Cannot crawl target '{}'", input))?;

        if target.kind.is_some() {
            tracing::info!("Resolved {} to {} {}", input, mode, target.id);
        }
        resolved.push((mode, target.id));
    }

    Ok(resolved)
}

fn build_signer(config: &Config) -> Arc<dyn Signer> {
    match &config.signer.command {
        Some(command) => Arc::new(CommandSigner::new(command.clone(), config.signer.args.clone())),
        None => {
            tracing::warn!("No signer configured; queries will be sent unsigned");
            Arc::new(PassthroughSigner)
        }
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, cli: &Cli, config_hash: &str) -> anyhow::Result<()> {
    let window = config.crawl_window()?;
    let zone = config.day_boundary()?;

    let client = build_http_client(config.connect_timeout())?;
    let targets = resolve_targets(&client, &config, cli).await?;
    let store = prepare_store(&config, cli, &targets)?;

    let transport = Arc::new(ReqwestTransport::new(client));
    let fetcher = PageFetcher::new(transport, config.signal_rules()).with_diagnostics(
        DiagnosticSink::new(&config.output.diagnostics_dir, config.output.diagnostic_limit),
    );

    let mut engine = CrawlEngine::new(
        fetcher,
        RetryScheduler::new(config.retry_policy()),
        build_signer(&config),
        config.client.base_url.clone(),
    )
    .with_page_delay(config.page_delay())
    .with_degraded_step(config.crawler.degraded_cursor_step);

    if let Some(store) = &store {
        engine = engine.with_dedup(DedupSync::new(store.clone()));
    }
    let engine = Arc::new(engine);

    // Ctrl-C cancels every running session; each still reports what it collected
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling sessions");
                cancel.cancel();
            }
        });
    }

    tracing::info!("Starting {} session(s)", targets.len());

    let mut sessions = JoinSet::new();
    for (mode, target) in targets {
        let request = CrawlRequest::new(target, config.descriptor(mode))
            .with_window(window, zone)
            .with_limits(config.limits())
            .with_increase(cli.increase);

        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        sessions.spawn(async move { engine.run(request, &cancel).await });
    }

    let records_dir = Path::new(&config.output.records_dir);
    let summary = collect_sessions(&mut sessions, records_dir, config_hash).await;

    if let Some(store) = &store {
        tracing::info!("Store now holds {} items", store.count_total()?);
    }

    if summary.failed > 0 {
        anyhow::bail!("{} of {} sessions failed", summary.failed, summary.sessions);
    }

    Ok(())
}
