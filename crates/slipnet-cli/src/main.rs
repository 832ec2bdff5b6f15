//! SlipNet command line
//!
//! `slipnet scan` probes a resolver list, `slipnet profiles` checks a
//! profile file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use slipnet_scanner::{load_resolver_list, ResolverScanner, ScanConfig, ScanStatus};
use slipnet_tunnel::ProfileSet;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "slipnet", version, about = "SlipNet tunnel client tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe DNS resolvers for usability and tampering
    Scan(ScanArgs),
    /// Validate a TOML or JSON profile set
    Profiles {
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Resolver list, one `ip` or `ip:port` per line
    #[arg(long)]
    list: PathBuf,

    /// Base settings; flags below override them
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    domain: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    concurrency: Option<usize>,
}

impl ScanArgs {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_toml_file(path)?,
            None => ScanConfig::default(),
        };
        if let Some(domain) = &self.domain {
            config.test_domain = domain.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,slipnet=debug")),
        )
        .with_target(false)
        .compact()
        .init();

    match Cli::parse().command {
        Command::Scan(args) => scan(args).await,
        Command::Profiles { file } => profiles(file),
    }
}

async fn scan(args: ScanArgs) -> Result<()> {
    let config = args.scan_config()?;
    let list = load_resolver_list(&args.list, config.port)?;
    for rejected in &list.rejected {
        warn!("Skipping line {}: {:?}", rejected.line, rejected.content);
    }

    let started = Instant::now();
    let mut stream = ResolverScanner::new(config).scan(list.targets)?;
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();

    while let Some(result) = stream.next().await {
        println!("{}", result.format());
        *counts.entry(result.status.label()).or_default() += 1;
    }

    let summary: Vec<String> = counts.iter().map(|(label, n)| format!("{label}: {n}")).collect();
    println!("{}", summary.join(", "));
    info!(
        "Scan finished in {:.1}s, {} working",
        started.elapsed().as_secs_f64(),
        counts.get(ScanStatus::Working.label()).copied().unwrap_or(0)
    );
    Ok(())
}

fn profiles(file: PathBuf) -> Result<()> {
    let set = ProfileSet::from_file(&file)?;
    let mut invalid = 0;

    for profile in &set.profiles {
        match profile.validate() {
            Ok(()) => println!(
                "ok       {} ({} resolvers, listen {}:{})",
                profile.display_name(),
                profile.resolvers.len(),
                profile.listen_host,
                profile.listen_port
            ),
            Err(e) => {
                invalid += 1;
                println!("invalid  {}: {}", profile.display_name(), e);
            }
        }
    }

    info!("{} profiles, {} invalid", set.profiles.len(), invalid);
    if invalid > 0 {
        anyhow::bail!("{} of {} profiles failed validation", invalid, set.profiles.len());
    }
    Ok(())
}
