//! The arkive command-line interface.

use anyhow::{bail, Context, Result};
use arkive_catalog::{actions, Catalog, Filter, FilterQuery};
use arkive_core::Config;
use arkive_engine::{discover_builds, find_new_filenames, run_sweep, Stats, SweepOptions};
use arkive_fetch::Fetcher;
use arkive_objects::ObjectStore;
use clap::{Args, Parser, Subcommand};
use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Batch size for headers-only runs: header fetches are tiny, the commit
/// dominates.
const HEADERS_BATCH: usize = 4096;
/// Batch size for content runs.
const CONTENT_BATCH: usize = 64;

/// arkive - archive build artifacts from deployment servers
#[derive(Parser)]
#[command(name = "arkive", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CatalogArgs {
    /// Path to the catalog database.
    catalog: PathBuf,

    /// Config file path; defaults to the catalog path with a .json
    /// extension.
    #[arg(short = 'c', long, env = "ARKIVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Number of worker tasks used when downloading files.
    #[arg(long, default_value_t = 32)]
    workers: usize,

    /// Allowed requests per second; a negative value means unlimited.
    /// Overrides the configured rate limit.
    #[arg(long)]
    rate_limit: Option<f64>,
}

#[derive(Args, Clone)]
struct SweepArgs {
    #[command(flatten)]
    fetch: FetchArgs,

    /// Also fetch files previously marked NotFound.
    #[arg(long)]
    recheck: bool,

    /// Number of files to fetch before committing them to the database.
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge configured servers into the catalog.
    MergeServers {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Merge configured file names into the catalog.
    MergeFilenames {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Discover new builds from each server's deploy history.
    FetchBuilds {
        #[command(flatten)]
        catalog: CatalogArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Generate combinations of builds and file names.
    GenerateFiles {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Download headers of unchecked files.
    FetchHeaders {
        #[command(flatten)]
        catalog: CatalogArgs,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Download content of unchecked files to the objects path.
    FetchFiles {
        #[command(flatten)]
        catalog: CatalogArgs,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Find file names in stored package manifests.
    FindFilenames {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::MergeServers { catalog } => {
            let config = load_config(&catalog)?;
            let db = open_catalog(&catalog).await?;
            let count = actions::merge_servers(db.pool(), &config.servers)
                .await
                .context("merge servers")?;
            println!("merged {count} new servers");
        }
        Commands::MergeFilenames { catalog } => {
            let config = load_config(&catalog)?;
            let db = open_catalog(&catalog).await?;
            let count = actions::merge_filenames(db.pool(), &config.build_files)
                .await
                .context("merge filenames")?;
            println!("merged {count} new filenames");
        }
        Commands::FetchBuilds { catalog, fetch } => {
            let config = load_config(&catalog)?;
            let db = open_catalog(&catalog).await?;
            let fetcher = Fetcher::new(fetch.workers, fetch.rate_limit.unwrap_or(config.rate_limit));
            discover_builds(&db, &fetcher, &cancel, &config.deploy_history)
                .await
                .context("fetch builds")?;
        }
        Commands::GenerateFiles { catalog } => {
            let db = open_catalog(&catalog).await?;
            let count = actions::generate_files(db.pool())
                .await
                .context("generate files")?;
            println!("generated {count} new files");
        }
        Commands::FetchHeaders { catalog, sweep } => {
            let config = load_config(&catalog)?;
            let query = load_filter(&config.filters, "headers")?;
            let db = open_catalog(&catalog).await?;
            let options = SweepOptions {
                objects: None,
                recheck: sweep.recheck,
                batch: sweep.batch_size.unwrap_or(HEADERS_BATCH),
            };
            run_batches(&db, &config, &sweep.fetch, &cancel, &query, &options).await?;
        }
        Commands::FetchFiles { catalog, sweep } => {
            let config = load_config(&catalog)?;
            let query = load_filter(&config.filters, "files")?;
            let db = open_catalog(&catalog).await?;
            let objects = match &config.objects_path {
                Some(path) => Some(ObjectStore::open(path).context("open object store")?),
                None => None,
            };
            let options = SweepOptions {
                objects,
                recheck: sweep.recheck,
                batch: sweep.batch_size.unwrap_or(CONTENT_BATCH),
            };
            run_batches(&db, &config, &sweep.fetch, &cancel, &query, &options).await?;
        }
        Commands::FindFilenames { catalog } => {
            let config = load_config(&catalog)?;
            let Some(path) = &config.objects_path else {
                bail!("unconfigured objects path");
            };
            let store = ObjectStore::open(path).context("open object store")?;
            let db = open_catalog(&catalog).await?;
            let novel = find_new_filenames(&db, &store)
                .await
                .context("find filenames")?;
            for name in novel {
                println!("{name}");
            }
        }
    }
    Ok(())
}

async fn open_catalog(args: &CatalogArgs) -> Result<Catalog> {
    Catalog::open(&args.catalog)
        .await
        .with_context(|| format!("open catalog {}", args.catalog.display()))
}

/// Layer the config: defaults, then the JSON file, then `ARKIVE_`
/// environment overrides. A missing default config file is fine; a missing
/// explicitly-given one is not.
fn load_config(args: &CatalogArgs) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => args.catalog.with_extension("json"),
    };
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if path.exists() {
        figment = figment.merge(Json::file(&path));
    } else if args.config.is_some() {
        bail!("config file {} not found", path.display());
    }
    figment
        .merge(Env::prefixed("ARKIVE_"))
        .extract()
        .with_context(|| format!("read config {}", path.display()))
}

fn load_filter(rules: &[String], domain: &str) -> Result<FilterQuery> {
    let mut filter = Filter::new();
    filter.allow_domain("files", &["server", "build", "file"]);
    filter.allow_domain("headers", &["server", "build", "file"]);
    for rule in rules {
        filter
            .append(rule)
            .with_context(|| format!("filter rule {rule:?}"))?;
    }
    Ok(filter.as_query(domain)?)
}

/// Run the fetch-commit loop, printing the status histogram even when a
/// batch fails partway.
async fn run_batches(
    db: &Catalog,
    config: &Config,
    fetch: &FetchArgs,
    cancel: &CancellationToken,
    query: &FilterQuery,
    options: &SweepOptions,
) -> Result<()> {
    let fetcher = Fetcher::new(fetch.workers, fetch.rate_limit.unwrap_or(config.rate_limit));
    let mut stats = Stats::new();
    let result = run_sweep(db, &fetcher, cancel, query, options, &mut stats).await;
    print!("{stats}");
    result.context("fetch content")
}
