use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("cannot prepare WAL at {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot append {addr} to WAL: {source}")]
    Append { addr: Ipv4Addr, source: io::Error },
    #[error("cannot read WAL at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("last WAL entry '{line}' is not an IPv4 address")]
    Corrupt { line: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot prepare result cache at {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot record result for {addr}: {source}")]
    Write { addr: Ipv4Addr, source: io::Error },
}

#[derive(Debug, Error)]
#[error("worker pool is closed")]
pub struct PoolClosed;
