//! # Write-Ahead Log
//!
//! Records every address *before* it is probed, one dotted-quad per line.
//! The last line is the resume marker: if the process dies mid-probe, the
//! address that was in flight is the one a restarted sweep begins with.
//!
//! The log never rewrites or drops entries. Operators reset a sweep by
//! truncating the file themselves.

use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use sweepr_common::address::UNSPECIFIED;

use crate::error::WalError;

#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Wal {
    /// Prepares the log at `path`, creating parent directories and the file
    /// itself so an unwritable location is caught before any probe is sent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, WalError> {
        let path = path.into();
        let open_err = |source| WalError::Open {
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

    /// Appends `addr` as a single line and flushes it.
    ///
    /// Appends from concurrent workers are serialized, so lines never
    /// interleave and appear in the order the lock was taken.
    pub async fn append(&self, addr: Ipv4Addr) -> Result<(), WalError> {
        let append_err = |source| WalError::Append { addr, source };
        let line = format!("{addr}\n");

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append_err)?;
        file.write_all(line.as_bytes()).await.map_err(append_err)?;
        file.flush().await.map_err(append_err)?;
        Ok(())
    }

    /// Returns the last address written, or `0.0.0.0` when the log is
    /// missing or holds no entries.
    pub async fn read_resume_point(&self) -> Result<Ipv4Addr, WalError> {
        read_resume_point(&self.path).await
    }
}

pub async fn read_resume_point(path: &Path) -> Result<Ipv4Addr, WalError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no WAL at {}, starting fresh", path.display());
            return Ok(UNSPECIFIED);
        }
        Err(source) => {
            return Err(WalError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let Some(last) = contents.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
        return Ok(UNSPECIFIED);
    };

    last.parse::<Ipv4Addr>().map_err(|_| WalError::Corrupt {
        line: last.to_string(),
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_log_resumes_from_zero() {
        let dir = tempdir().unwrap();
        let resume = read_resume_point(&dir.path().join("wal.log")).await.unwrap();
        assert_eq!(resume, Ipv4Addr::UNSPECIFIED);
    }

    #[tokio::test]
    async fn empty_log_resumes_from_zero() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log")).await.unwrap();
        assert_eq!(wal.read_resume_point().await.unwrap(), Ipv4Addr::UNSPECIFIED);
    }

    #[tokio::test]
    async fn resume_point_is_last_append() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log")).await.unwrap();
        for last in 1..=5 {
            wal.append(Ipv4Addr::new(10, 0, 0, last)).await.unwrap();
        }
        assert_eq!(
            wal.read_resume_point().await.unwrap(),
            Ipv4Addr::new(10, 0, 0, 5)
        );

        let contents = std::fs::read_to_string(wal.path()).unwrap();
        assert_eq!(contents.lines().count(), 5);
        assert_eq!(contents.lines().next(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn trailing_blank_lines_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, "1.2.3.4\n1.2.3.5\n\n  \n").unwrap();
        assert_eq!(
            read_resume_point(&path).await.unwrap(),
            Ipv4Addr::new(1, 2, 3, 5)
        );
    }

    #[tokio::test]
    async fn corrupt_last_entry_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, "1.2.3.4\n1.2.3.").unwrap();
        let err = read_resume_point(&path).await.unwrap_err();
        assert!(matches!(err, WalError::Corrupt { line } if line == "1.2.3."));
    }

    #[tokio::test]
    async fn unreadable_log_is_an_error() {
        let dir = tempdir().unwrap();
        // A directory where the file should be cannot be read as a log.
        let err = read_resume_point(dir.path()).await.unwrap_err();
        assert!(matches!(err, WalError::Read { .. }));
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/nested/wal.log");
        let wal = Wal::open(&path).await.unwrap();
        assert!(wal.path().exists());
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave() {
        let dir = tempdir().unwrap();
        let wal = Arc::new(Wal::open(dir.path().join("wal.log")).await.unwrap());

        let mut handles = Vec::new();
        for third in 0..8u8 {
            let wal = wal.clone();
            handles.push(tokio::spawn(async move {
                for fourth in 0..50u8 {
                    wal.append(Ipv4Addr::new(10, 0, third, fourth)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = std::fs::read_to_string(wal.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.parse::<Ipv4Addr>().is_ok()));
    }
}
