use anyhow::Context;
use colored::*;

use sweepr_common::address::UNSPECIFIED;
use sweepr_core::cache;
use sweepr_core::wal;

use crate::commands::StorageArgs;
use crate::terminal::{colors, print};

pub async fn status(args: StorageArgs) -> anyhow::Result<()> {
    let resume = wal::read_resume_point(&args.wal_path)
        .await
        .with_context(|| format!("cannot read {}", args.wal_path.display()))?;
    let stats = cache::stats(&args.cache_path)
        .await
        .with_context(|| format!("cannot read {}", args.cache_path.display()))?;

    print::header("Sweep Status");
    print::aligned_line("WAL", args.wal_path.display().to_string());
    if resume == UNSPECIFIED {
        print::aligned_line("Resumes at", "start of range".color(colors::ACCENT));
    } else {
        print::aligned_line("Resumes at", resume.to_string().color(colors::IPV4_ADDR));
    }

    print::aligned_line("Cache", args.cache_path.display().to_string());
    print::aligned_line("Records", stats.records.to_string());
    print::aligned_line(
        "Reachable",
        stats.reachable.to_string().color(colors::REACHABLE),
    );
    if stats.malformed > 0 {
        print::aligned_line("Malformed", stats.malformed.to_string().red());
    }
    print::fat_separator();
    Ok(())
}
