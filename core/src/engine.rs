//! # Scan Engine
//!
//! Drives a sweep through `Idle → Resuming → Scanning → Draining → Done`.
//!
//! 1. **Resuming**: the last WAL entry becomes the first address of this run.
//!    It is probed again, since it may have been in flight when the previous
//!    run died (at-least-once).
//! 2. **Scanning**: walks the range in successor order, skipping addresses
//!    that must never be probed. For every other address a worker slot is
//!    reserved, the address is appended to the WAL, and a unit is spawned
//!    on the [`WorkerPool`] that probes and records the outcome in the
//!    [`ResultCache`]. WAL appends happen on the dispatching task, so the
//!    log is always in dispatch order.
//! 3. **Draining**: waits for the units still in flight.
//!
//! Faults of a single unit never stop the sweep; they are counted in the
//! [`ScanSummary`]. Only an untrustworthy resume point aborts a run.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sweepr_common::address::{ScanRange, is_probeable};
use sweepr_common::config::ScanConfig;

use crate::cache::ResultCache;
use crate::error::WalError;
use crate::pool::WorkerPool;
use crate::prober::Prober;
use crate::wal::Wal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Resuming,
    Scanning,
    Draining,
    Done,
}

/// The outcome of one probe, as handed to the result callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub addr: Ipv4Addr,
    pub reachable: bool,
    pub latency: Option<Duration>,
}

/// What a single dispatched unit ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitReport {
    /// The probe ran; `cached` is false when the result could not be recorded.
    Probed { reachable: bool, cached: bool },
    /// The WAL append failed, so the address was never probed.
    WalFault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Address the sweep started from after consulting the WAL.
    pub resumed_from: Ipv4Addr,
    /// Last address this run recorded in the WAL, i.e. where the next run
    /// resumes.
    pub last_dispatched: Option<Ipv4Addr>,
    pub dispatched: u64,
    pub reachable: u64,
    pub unreachable: u64,
    pub wal_failures: u64,
    pub cache_failures: u64,
    pub skipped_invalid: u64,
    /// Set when the sweep stopped early on request.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl ScanSummary {
    fn new(resumed_from: Ipv4Addr) -> Self {
        Self {
            resumed_from,
            last_dispatched: None,
            dispatched: 0,
            reachable: 0,
            unreachable: 0,
            wal_failures: 0,
            cache_failures: 0,
            skipped_invalid: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    fn absorb(&mut self, report: UnitReport) {
        match report {
            UnitReport::Probed { reachable, cached } => {
                if reachable {
                    self.reachable += 1;
                } else {
                    self.unreachable += 1;
                }
                if !cached {
                    self.cache_failures += 1;
                }
            }
            UnitReport::WalFault => self.wal_failures += 1,
        }
    }

    /// Units that got as far as sending a probe.
    pub fn probed(&self) -> u64 {
        self.reachable + self.unreachable
    }
}

type ResultCallback = Arc<dyn Fn(&ProbeOutcome) + Send + Sync>;

/// Everything a unit needs, cheap to clone into each spawned task.
#[derive(Clone)]
struct UnitContext {
    cache: Arc<ResultCache>,
    prober: Arc<dyn Prober>,
    timeout: Duration,
    on_result: Option<ResultCallback>,
}

impl UnitContext {
    async fn run(self, addr: Ipv4Addr) -> UnitReport {
        let reply = self.prober.probe(addr, self.timeout).await;

        let cached = match self.cache.record(addr, reply.reachable, reply.latency).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                false
            }
        };

        if let Some(on_result) = &self.on_result {
            on_result(&ProbeOutcome {
                addr,
                reachable: reply.reachable,
                latency: reply.latency,
            });
        }

        UnitReport::Probed {
            reachable: reply.reachable,
            cached,
        }
    }
}

pub struct ScanEngine {
    wal: Wal,
    ctx: UnitContext,
    range: ScanRange,
    max_workers: usize,
    state: EngineState,
}

impl ScanEngine {
    pub fn new(cfg: &ScanConfig, wal: Wal, cache: ResultCache, prober: Arc<dyn Prober>) -> Self {
        Self {
            wal,
            ctx: UnitContext {
                cache: Arc::new(cache),
                prober,
                timeout: cfg.timeout,
                on_result: None,
            },
            range: cfg.range,
            max_workers: cfg.max_workers.max(1),
            state: EngineState::Idle,
        }
    }

    /// Registers a callback invoked from the worker once each probe's result
    /// has been recorded.
    pub fn with_reporter(mut self, on_result: Box<dyn Fn(&ProbeOutcome) + Send + Sync>) -> Self {
        self.ctx.on_result = Some(Arc::from(on_result));
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Runs the sweep to the end of the range, or until `cancel` fires.
    ///
    /// On cancellation no new unit is dispatched, the ones in flight are
    /// drained, and the summary is marked as cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ScanSummary, WalError> {
        let started = Instant::now();

        self.transition(EngineState::Resuming);
        let start = self.resume_point().await?;
        let mut summary = ScanSummary::new(start);

        self.transition(EngineState::Scanning);
        let mut pool: WorkerPool<UnitReport> = WorkerPool::new(self.max_workers);

        for addr in self.range.sweep_from(start) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if !is_probeable(addr) {
                summary.skipped_invalid += 1;
                continue;
            }

            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                reserved = pool.reserve() => match reserved {
                    Ok(slot) => slot,
                    Err(e) => {
                        warn!("{e}; stopping dispatch");
                        break;
                    }
                },
            };

            summary.dispatched += 1;
            if let Err(e) = self.wal.append(addr).await {
                warn!("{e}; skipping probe");
                summary.absorb(UnitReport::WalFault);
                continue;
            }
            summary.last_dispatched = Some(addr);
            pool.submit(slot, self.ctx.clone().run(addr));

            for report in pool.reap() {
                summary.absorb(report);
            }
        }

        self.transition(EngineState::Draining);
        debug!("waiting for {} units in flight", pool.in_flight());
        for report in pool.drain().await {
            summary.absorb(report);
        }

        self.transition(EngineState::Done);
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    async fn resume_point(&self) -> Result<Ipv4Addr, WalError> {
        let resume_point = self.wal.read_resume_point().await?;

        if resume_point == self.range.start {
            return Ok(resume_point);
        }
        if self.range.contains(resume_point) {
            info!("Resuming sweep at {resume_point}");
            return Ok(resume_point);
        }
        if resume_point != Ipv4Addr::UNSPECIFIED {
            warn!(
                "WAL resume point {resume_point} is outside {}-{}, starting at {}",
                self.range.start, self.range.end, self.range.start
            );
        }
        Ok(self.range.start)
    }

    fn transition(&mut self, next: EngineState) {
        debug!("engine state {:?} -> {:?}", self.state, next);
        self.state = next;
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
