use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serendipity_discovery::{
    CancelFlag, DirectoryItemSource, DirectoryPeers, DiscoveryConfig, DiscoveryEngine,
    JsonlPathSink, MemorySink, Oracle, PathSink, RunReport,
};
use serendipity_protocol::AccountId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod oracle;
mod render;

use oracle::{HttpOracle, OfflineOracle, DEFAULT_MODEL, DEFAULT_ORACLE_URL};

#[derive(Parser)]
#[command(name = "serendipity")]
#[command(about = "Discover serendipitous paths between accounts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for output)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and persist paths for one or all accounts
    Run(RunArgs),

    /// Rank the best-matching peers of an account
    Peers(PeersArgs),

    /// Show the clusters built for one account pair
    Clusters(ClustersArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Directory holding one `<account>.json` file per account
    #[arg(long)]
    data_dir: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OracleKind {
    /// Answer every request with "no path"
    Offline,
    /// OpenAI-compatible chat-completions endpoint
    Http,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Account to process
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    account: Option<String>,

    /// Process every account in the data directory
    #[arg(long)]
    all: bool,

    /// JSON Lines file receiving resolved paths
    #[arg(long, default_value = "paths.jsonl")]
    out: PathBuf,

    #[arg(long, value_enum, default_value = "offline")]
    oracle: OracleKind,

    #[arg(long, default_value = DEFAULT_ORACLE_URL)]
    oracle_url: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Per-request oracle timeout in seconds
    #[arg(long, default_value_t = 120)]
    oracle_timeout_secs: u64,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args)]
struct PeersArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    account: String,

    #[arg(long)]
    top_k: Option<usize>,
}

#[derive(Args)]
struct ClustersArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    account: String,

    #[arg(long)]
    peer: String,

    #[arg(long)]
    max_items_per_cluster: Option<usize>,
}

/// Flags overriding configuration file values.
#[derive(Args, Default)]
struct Overrides {
    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long)]
    max_items_per_cluster: Option<usize>,

    /// Paths per match group
    #[arg(long)]
    quota: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut DiscoveryConfig) {
        if let Some(top_k) = self.top_k {
            config.top_k_peers = top_k;
        }
        if let Some(max_items) = self.max_items_per_cluster {
            config.max_items_per_cluster = Some(max_items);
            config.distance_threshold = None;
        }
        if let Some(quota) = self.quota {
            config.overall_path_quota = quota;
        }
    }
}

async fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<DiscoveryConfig> {
    let mut config = match path {
        Some(path) => DiscoveryConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DiscoveryConfig::default(),
    };
    overrides.apply(&mut config);
    Ok(config)
}

fn engine(
    config: DiscoveryConfig,
    data_dir: &Path,
    oracle: Arc<dyn Oracle>,
    sink: Arc<dyn PathSink>,
) -> Result<DiscoveryEngine> {
    if !data_dir.is_dir() {
        bail!("Data directory {} does not exist", data_dir.display());
    }
    DiscoveryEngine::new(
        config,
        Arc::new(DirectoryItemSource::new(data_dir)),
        Arc::new(DirectoryPeers::new(data_dir)),
        oracle,
        sink,
    )
    .context("Invalid configuration")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Peers(args) => peers(args).await,
        Commands::Clusters(args) => clusters(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.source.config.as_deref(), &args.overrides).await?;
    let oracle: Arc<dyn Oracle> = match args.oracle {
        OracleKind::Offline => Arc::new(OfflineOracle),
        OracleKind::Http => Arc::new(HttpOracle::new(
            &args.oracle_url,
            &args.model,
            Duration::from_secs(args.oracle_timeout_secs),
        )?),
    };
    let sink = Arc::new(JsonlPathSink::new(&args.out));
    let engine = engine(config, &args.source.data_dir, oracle, sink)?;

    let accounts = if args.all {
        DirectoryItemSource::new(&args.source.data_dir)
            .accounts()
            .await
            .context("Failed to list accounts")?
    } else {
        args.account.into_iter().map(AccountId::from).collect()
    };

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, stopping after the current iteration");
                cancel.cancel();
            }
        });
    }

    let results = engine.run_accounts(accounts, &cancel).await;
    let mut reports: Vec<RunReport> = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (account, result) in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => failures.push(render::AccountFailure {
                account,
                error: e.to_string(),
            }),
        }
    }

    if args.source.json {
        print_json(&render::RunOutput {
            reports: &reports,
            failures: &failures,
            out: &args.out,
        })?;
    } else {
        print!("{}", render::run_summary(&reports, &failures, &args.out));
    }

    if !failures.is_empty() {
        bail!("{} of {} account runs failed", failures.len(), reports.len() + failures.len());
    }
    Ok(())
}

async fn peers(args: PeersArgs) -> Result<()> {
    let overrides = Overrides {
        top_k: args.top_k,
        ..Default::default()
    };
    let config = load_config(args.source.config.as_deref(), &overrides).await?;
    let engine = engine(
        config,
        &args.source.data_dir,
        Arc::new(OfflineOracle),
        Arc::new(MemorySink::new()),
    )?;

    let account = AccountId::from(args.account);
    let Some(current) = engine.load_account(&account).await? else {
        bail!("Account {account} has no items with embeddings");
    };
    let ranked = engine.rank_peers(&current).await?;
    let rows: Vec<render::PeerRow> = ranked
        .iter()
        .map(|peer| render::PeerRow {
            account: peer.score.account.clone(),
            similarity: peer.score.similarity,
            items: peer.items.len(),
        })
        .collect();

    if args.source.json {
        print_json(&rows)?;
    } else {
        print!("{}", render::peer_table(&account, &rows));
    }
    Ok(())
}

async fn clusters(args: ClustersArgs) -> Result<()> {
    let overrides = Overrides {
        max_items_per_cluster: args.max_items_per_cluster,
        ..Default::default()
    };
    let config = load_config(args.source.config.as_deref(), &overrides).await?;
    let engine = engine(
        config,
        &args.source.data_dir,
        Arc::new(OfflineOracle),
        Arc::new(MemorySink::new()),
    )?;

    let account = AccountId::from(args.account);
    let peer = AccountId::from(args.peer);
    let Some(group) = engine.cluster_pair(&account, &peer).await? else {
        bail!("No cross-account clusters for {account} and {peer}");
    };
    let rows: Vec<render::ClusterRow> = group
        .clusters
        .iter()
        .map(|cluster| render::ClusterRow {
            cluster_id: cluster.id,
            category: cluster.category.clone(),
            current_items: cluster.current.len(),
            peer_items: cluster.peer.len(),
        })
        .collect();

    if args.source.json {
        print_json(&rows)?;
    } else {
        print!("{}", render::cluster_table(&account, &peer, &rows));
    }
    Ok(())
}
