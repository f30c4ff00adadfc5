use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use sweepr_common::address::ScanRange;
use sweepr_common::config::ScanConfig;
use sweepr_core::cache::{self, ResultCache};
use sweepr_core::prober::{ProbeReply, Prober};
use sweepr_core::wal::{self, Wal};
use sweepr_core::{EngineState, ScanEngine};

/*************************************************************
                         Stub probers
**************************************************************/

/// Remembers every address it was asked about. Even hosts answer.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Ipv4Addr>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Ipv4Addr> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for Recorder {
    async fn probe(&self, addr: Ipv4Addr, _timeout: Duration) -> ProbeReply {
        self.seen.lock().unwrap().push(addr);
        tokio::time::sleep(Duration::from_millis(1)).await;
        if u32::from(addr) % 2 == 0 {
            ProbeReply::reachable(Duration::from_micros(1500))
        } else {
            ProbeReply::unreachable()
        }
    }
}

/// Holds every probe long enough for the pool to saturate.
#[derive(Default)]
struct Overlap {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Prober for Overlap {
    async fn probe(&self, _addr: Ipv4Addr, _timeout: Duration) -> ProbeReply {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ProbeReply::unreachable()
    }
}

/*************************************************************
                            Helpers
**************************************************************/

fn config(dir: &Path, range: &str, max_workers: usize) -> ScanConfig {
    ScanConfig {
        max_workers,
        timeout: Duration::from_millis(50),
        wal_path: dir.join("wal.log"),
        cache_path: dir.join("cache/ping_results.txt"),
        range: range.parse::<ScanRange>().unwrap(),
        quiet: 0,
    }
}

async fn engine(cfg: &ScanConfig, prober: Arc<dyn Prober>) -> ScanEngine {
    let wal = Wal::open(&cfg.wal_path).await.unwrap();
    let cache = ResultCache::open(&cfg.cache_path).await.unwrap();
    ScanEngine::new(cfg, wal, cache, prober)
}

fn lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

fn addrs(range: ScanRange) -> Vec<Ipv4Addr> {
    range.sweep().collect()
}

/*************************************************************
                             Tests
**************************************************************/

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uninterrupted_sweep_logs_each_address_once() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path(), "10.0.0.0/23", 16);
    let prober = Arc::new(Recorder::default());

    let mut engine = engine(&cfg, prober.clone()).await;
    let summary = engine.run(CancellationToken::new()).await.unwrap();

    let expected = addrs(cfg.range);
    assert_eq!(summary.dispatched, 512);
    assert_eq!(summary.reachable, 256);
    assert_eq!(summary.unreachable, 256);
    assert!(!summary.cancelled);
    assert_eq!(engine.state(), EngineState::Done);

    // WAL is in dispatch order.
    let wal_lines = lines(&cfg.wal_path);
    let expected_lines: Vec<String> = expected.iter().map(|a| a.to_string()).collect();
    assert_eq!(wal_lines, expected_lines);

    let cached: BTreeSet<Ipv4Addr> = lines(&cfg.cache_path)
        .iter()
        .map(|l| l.split_once(": ").unwrap().0.parse().unwrap())
        .collect();
    assert_eq!(cached.len(), 512);
    assert_eq!(cached, expected.iter().copied().collect());

    let stats = cache::stats(&cfg.cache_path).await.unwrap();
    assert_eq!(stats.records, 512);
    assert_eq!(stats.reachable, 256);
    assert_eq!(stats.malformed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interrupted_sweep_resumes_without_gaps() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path(), "10.0.0.0-10.0.2.0", 8);

    // First run stops after a handful of results.
    let first = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let seen = Arc::new(AtomicUsize::new(0));
    let mut engine_a = engine(&cfg, first.clone()).await.with_reporter(Box::new(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) + 1 == 40 {
            trigger.cancel();
        }
    }));
    let summary_a = engine_a.run(cancel).await.unwrap();
    assert!(summary_a.cancelled);
    assert!(summary_a.dispatched < 512);

    let crash_point = wal::read_resume_point(&cfg.wal_path).await.unwrap();
    assert_eq!(Some(crash_point), summary_a.last_dispatched);

    // Second run picks up at the crash point, re-probing it.
    let second = Arc::new(Recorder::default());
    let mut engine_b = engine(&cfg, second.clone()).await;
    let summary_b = engine_b.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary_b.resumed_from, crash_point);
    assert!(!summary_b.cancelled);

    let remaining = u32::from(cfg.range.end) - u32::from(crash_point);
    assert_eq!(summary_b.dispatched, u64::from(remaining));
    assert_eq!(second.seen().into_iter().min(), Some(crash_point));

    // Together the two runs cover the range, overlapping only at the crash point.
    let mut covered: BTreeSet<Ipv4Addr> = first.seen().into_iter().collect();
    covered.extend(second.seen());
    assert_eq!(covered, addrs(cfg.range).into_iter().collect());
    assert_eq!(
        first.seen().len() + second.seen().len(),
        512 + 1,
        "only the crash point is probed twice"
    );
}

#[tokio::test]
async fn hand_written_wal_is_honoured() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path(), "192.168.7.0/24", 4);
    std::fs::write(&cfg.wal_path, "192.168.7.3\n192.168.7.250\n").unwrap();

    let prober = Arc::new(Recorder::default());
    let summary = engine(&cfg, prober.clone())
        .await
        .run(CancellationToken::new())
        .await
        .unwrap();

    let mut seen = prober.seen();
    seen.sort();
    let expected: Vec<Ipv4Addr> = (250..=255).map(|d| Ipv4Addr::new(192, 168, 7, d)).collect();
    assert_eq!(seen, expected);
    assert_eq!(summary.resumed_from, Ipv4Addr::new(192, 168, 7, 250));
    assert_eq!(summary.last_dispatched, Some(Ipv4Addr::new(192, 168, 7, 255)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ceiling_of_four_is_respected() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path(), "172.16.0.0/25", 4);
    let prober = Arc::new(Overlap::default());

    let summary = engine(&cfg, prober.clone())
        .await
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 128);
    assert!(prober.peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn garbage_wal_aborts_the_sweep() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path(), "10.9.0.0/30", 2);
    std::fs::write(&cfg.wal_path, "10.9.0.1\nnot-an-address\n").unwrap();

    let prober = Arc::new(Recorder::default());
    let mut engine = engine(&cfg, prober.clone()).await;
    assert!(engine.run(CancellationToken::new()).await.is_err());
    assert!(prober.seen().is_empty());
    assert_eq!(lines(&cfg.cache_path), Vec::<String>::new());
}
