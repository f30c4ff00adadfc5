use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::address::ScanRange;

pub const DEFAULT_MAX_WORKERS: usize = 8 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_WAL_PATH: &str = "wal.log";
pub const DEFAULT_CACHE_PATH: &str = "cache/ping_results.txt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("probe timeout must be greater than zero")]
    ZeroTimeout,
    #[error("the WAL and the result cache cannot share a file: {0}")]
    SharedPath(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound on probes in flight at any moment.
    pub max_workers: usize,
    /// Deadline for a single echo request.
    pub timeout: Duration,
    pub wal_path: PathBuf,
    pub cache_path: PathBuf,
    pub range: ScanRange,
    /// 0 prints every result, 1 hides unreachable hosts, 2 hides all
    /// per-address lines.
    pub quiet: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            range: ScanRange::full(),
            quiet: 0,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.wal_path == self.cache_path {
            return Err(ConfigError::SharedPath(self.wal_path.clone()));
        }
        Ok(())
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
