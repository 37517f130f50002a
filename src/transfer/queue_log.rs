//! Transfer queue snapshot
//!
//! Written before execution so an interrupted run can be resumed by hand.
//! One tab-separated line per hop:
//!     from  to  isBuffer(0/1)  value|-1  planIndex
//! `-1` marks a sweep hop. An empty queue still produces a file holding a
//! single newline.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::planner::TransferPlan;

pub fn queue_lines(plans: &[TransferPlan]) -> String {
    if plans.is_empty() {
        return "\n".to_string();
    }
    let mut out = String::new();
    for (plan_index, plan) in plans.iter().enumerate() {
        for hop in &plan.hops {
            let value = hop
                .value
                .map(|v| v.normalize().to_string())
                .unwrap_or_else(|| "-1".to_string());
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                hop.from.address(),
                hop.to,
                u8::from(hop.from_buffer),
                value,
                plan_index
            ));
        }
    }
    out
}

/// `<dir>/<prefix>-transfer-queue_<timestamp>.tsv`, colons avoided.
pub fn snapshot_path(dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    dir.join(format!("{}-transfer-queue_{}.tsv", prefix, stamp))
}

/// Append the snapshot for `plans` to a fresh file under `dir`.
pub fn write_snapshot(dir: &Path, prefix: &str, plans: &[TransferPlan]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
    let path = snapshot_path(dir, prefix);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open transfer queue file: {:?}", path))?;
    file.write_all(queue_lines(plans).as_bytes())?;
    Ok(path)
}
