//! Append-only audit trail of probe outcomes.
//!
//! One line per completed probe, `<address>: <true|false>, <latency>`.
//! Records are never deduplicated, so an address probed twice after a
//! resume simply appears twice.

use std::io::{self, ErrorKind};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::CacheError;

#[derive(Debug)]
pub struct ResultCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultCache {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let open_err = |source| CacheError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(open_err)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(
        &self,
        addr: Ipv4Addr,
        reachable: bool,
        latency: Option<Duration>,
    ) -> Result<(), CacheError> {
        let write_err = |source| CacheError::Write { addr, source };
        let line = format_record(addr, reachable, latency);

        let _guard = self.write_lock.lock().await;
        // The directory may have been removed underneath a long sweep.
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub records: u64,
    pub reachable: u64,
    /// Lines that do not follow the record format.
    pub malformed: u64,
}

/// Tallies the records in a cache file; a missing file is an empty cache.
pub async fn stats(path: &Path) -> io::Result<CacheStats> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CacheStats::default()),
        Err(e) => return Err(e),
    };

    let mut stats = CacheStats::default();
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_reachable(&line) {
            Some(reachable) => {
                stats.records += 1;
                if reachable {
                    stats.reachable += 1;
                }
            }
            None => stats.malformed += 1,
        }
    }
    Ok(stats)
}

fn parse_reachable(line: &str) -> Option<bool> {
    let (addr, rest) = line.split_once(": ")?;
    addr.parse::<Ipv4Addr>().ok()?;
    let (reachable, _latency) = rest.split_once(", ")?;
    reachable.parse::<bool>().ok()
}

pub fn format_record(addr: Ipv4Addr, reachable: bool, latency: Option<Duration>) -> String {
    format!("{addr}: {reachable}, {}\n", format_latency(latency))
}

pub fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(latency) => format!("{latency:?}"),
        None => String::from("0s"),
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
