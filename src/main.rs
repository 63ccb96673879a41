use anyhow::{bail, Context};
use clap::Parser;
use fallback_kv::cache::{spawn_sweeper, verify_round_trip, BackendKind, BackendSelector, Cache};
use fallback_kv::{CacheConfig, Command};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fallback-kv")]
#[command(about = "Pick Redis if it answers, an in-process store otherwise, and run a command")]
struct Cli {
    /// JSON config file, instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Never contact Redis
    #[arg(long)]
    local: bool,

    /// Command to run once the backend is chosen, e.g. `SET session:1 alice EX 60`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<CacheConfig> {
    let config = match &cli.config {
        Some(path) => CacheConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CacheConfig::from_env().context("reading environment")?,
    };
    Ok(config)
}

fn init_tracing(default_level: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Confirm the chosen backend works before handing it out
async fn self_check(cache: &Cache) -> anyhow::Result<()> {
    if cache.kind() == BackendKind::Remote && !cache.ping().await {
        bail!("remote cache did not answer PING");
    }
    // A failed ping above may have moved the handle to the local store
    if cache.kind() == BackendKind::Local {
        verify_round_trip(cache.local_store())
            .await
            .context("local store self-check")?;
    }
    Ok(())
}

async fn run(cli: Cli, config: CacheConfig) -> anyhow::Result<()> {
    let mut selector = BackendSelector::new(&config);
    if cli.local {
        selector = selector.local_only();
    }
    let cache = selector.select().await;

    let sweeper = config
        .sweep_interval()
        .map(|every| spawn_sweeper(cache.local_store().clone(), every));

    self_check(&cache).await?;
    info!("Cache ready, backend: {}", cache.kind());
    println!("backend: {}", cache.kind());

    if !cli.command.is_empty() {
        let command = Command::parse(cli.command.as_slice())?;
        let reply = command.execute(&cache).await;
        println!("{}", reply);
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fallback-kv: {:#}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    if let Err(e) = run(cli, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
