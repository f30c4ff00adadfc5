use std::sync::Arc;

use anyhow::Context;
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sweepr_common::config::ScanConfig;
use sweepr_common::success;
use sweepr_core::cache::ResultCache;
use sweepr_core::prober::IcmpProber;
use sweepr_core::wal::Wal;
use sweepr_core::{ProbeOutcome, ScanEngine, ScanSummary};

use crate::terminal::{colors, print, spinner};

pub async fn sweep(cfg: ScanConfig) -> anyhow::Result<()> {
    let wal = Wal::open(&cfg.wal_path)
        .await
        .context("write-ahead log is unavailable")?;
    let cache = ResultCache::open(&cfg.cache_path)
        .await
        .context("result cache is unavailable")?;
    let prober = IcmpProber::new()?;

    if cfg.range.is_empty() {
        warn!("Range {}-{} holds no addresses", cfg.range.start, cfg.range.end);
    }
    info!(
        "Sweeping {} addresses from {} to {} with {} workers ({:?} sockets)",
        cfg.range.len(),
        cfg.range.start,
        cfg.range.end,
        cfg.max_workers,
        prober.kind()
    );

    let quiet = cfg.quiet;
    let mut engine = ScanEngine::new(&cfg, wal, cache, Arc::new(prober))
        .with_reporter(Box::new(move |outcome| report(outcome, quiet)));

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Interrupted, waiting for probes in flight...");
        cancel_clone.cancel();
    });

    spinner::start();
    let result = engine.run(cancel).await;
    spinner::finish();

    let summary = result.context("cannot determine where to resume")?;
    print_summary(&summary, &cfg);
    Ok(())
}

fn report(outcome: &ProbeOutcome, quiet: u8) {
    spinner::report_progress(outcome.reachable);

    match (quiet, outcome.reachable) {
        (0, _) | (1, true) => print::probe_result(outcome),
        _ => {}
    }
}

fn print_summary(summary: &ScanSummary, cfg: &ScanConfig) {
    print::header("Sweep Summary");
    print::aligned_line("Resumed at", summary.resumed_from.to_string());
    if let Some(last) = summary.last_dispatched {
        print::aligned_line("Last logged", last.to_string());
    }
    print::aligned_line("Probed", summary.probed().to_string());
    print::aligned_line(
        "Reachable",
        summary.reachable.to_string().color(colors::REACHABLE),
    );
    print::aligned_line("Skipped", summary.skipped_invalid.to_string());
    if summary.wal_failures > 0 {
        print::aligned_line("WAL faults", summary.wal_failures.to_string().red());
    }
    if summary.cache_failures > 0 {
        print::aligned_line("Cache faults", summary.cache_failures.to_string().red());
    }

    let total_time: ColoredString = format!("{:.2?}", summary.elapsed).bold().yellow();
    print::fat_separator();
    if summary.cancelled {
        let resume = summary.last_dispatched.unwrap_or(summary.resumed_from);
        warn!("Sweep stopped early after {total_time}; rerun to resume at {resume}");
    } else {
        print::centerln(&format!("Scan completed in {total_time}"));
        success!(
            "Results recorded in {}",
            cfg.cache_path.display().to_string().color(colors::PRIMARY)
        );
    }
}
