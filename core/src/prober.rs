//! The **abstraction** over a single reachability check.
//!
//! The engine depends only on [`Prober`]; the concrete [`icmp`] prober sends
//! real echo requests, while tests plug in stubs. A prober never fails: every
//! fault on the way (no route, permission denied, timeout) is folded into an
//! unreachable [`ProbeReply`], since a silent host and a broken probe look
//! the same to a sweep.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

pub mod icmp;

pub use icmp::IcmpProber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    pub reachable: bool,
    /// Round-trip time, present only when a reply arrived.
    pub latency: Option<Duration>,
}

impl ProbeReply {
    pub fn reachable(latency: Duration) -> Self {
        Self {
            reachable: true,
            latency: Some(latency),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            latency: None,
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Sends exactly one echo request to `addr` and waits at most `timeout`.
    async fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> ProbeReply;
}

