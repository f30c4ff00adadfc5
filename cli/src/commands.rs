pub mod status;
pub mod sweep;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use sweepr_common::address::{ScanRange, TOP_OF_SPACE, UNSPECIFIED};
use sweepr_common::config::{self, ScanConfig};

#[derive(Parser)]
#[command(name = "sweepr")]
#[command(about = "A resumable ICMP sweeper for the IPv4 space.")]
#[command(version, args_conflicts_with_subcommands = true)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Show debug output (-vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sweep the address range, resuming where the WAL left off (default)
    #[command(alias = "s")]
    Sweep(SweepArgs),
    /// Show where the next sweep resumes and what the result cache holds
    #[command(alias = "st")]
    Status(StorageArgs),
}

#[derive(Args, Clone)]
pub struct StorageArgs {
    /// Write-ahead log location
    #[arg(long = "wal", default_value = config::DEFAULT_WAL_PATH)]
    pub wal_path: PathBuf,

    /// Result cache location
    #[arg(long = "cache", default_value = config::DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,
}

#[derive(Args, Clone)]
pub struct SweepArgs {
    /// Maximum number of probes in flight
    #[arg(short, long, default_value_t = config::DEFAULT_MAX_WORKERS)]
    pub workers: usize,

    /// Per-probe timeout in milliseconds
    #[arg(short, long, default_value_t = config::DEFAULT_TIMEOUT.as_millis() as u64)]
    pub timeout: u64,

    /// First address of the sweep
    #[arg(long, default_value_t = UNSPECIFIED, conflicts_with = "range")]
    pub start: Ipv4Addr,

    /// Exclusive end of the sweep
    #[arg(long, default_value_t = TOP_OF_SPACE, conflicts_with = "range")]
    pub end: Ipv4Addr,

    /// Range as "start-end" or CIDR (e.g. "10.0.0.0-10.1.0.0", "10.0.0.0/16")
    #[arg(short, long)]
    pub range: Option<ScanRange>,

    /// Hide unreachable hosts (-qq hides every per-address line)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    #[command(flatten)]
    pub storage: StorageArgs,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Worker ceiling of the sweep that will run, if any.
    pub fn workers(&self) -> usize {
        match &self.command {
            Some(Commands::Sweep(args)) => args.workers,
            Some(Commands::Status(_)) => 1,
            None => self.sweep.workers,
        }
    }
}

impl SweepArgs {
    pub fn to_config(&self) -> anyhow::Result<ScanConfig> {
        let range = match self.range {
            Some(range) => range,
            None => ScanRange::new(self.start, self.end)?,
        };

        let cfg = ScanConfig {
            max_workers: self.workers,
            timeout: Duration::from_millis(self.timeout),
            wal_path: self.storage.wal_path.clone(),
            cache_path: self.storage.cache_path.clone(),
            range,
            quiet: self.quiet,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
