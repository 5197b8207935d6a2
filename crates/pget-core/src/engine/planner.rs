// Decides which byte ranges still need fetching, honouring chunk files
// left behind by an interrupted run.

use std::path::{Path, PathBuf};

use crate::engine::layout;
use crate::engine::range::{self, Range};
use crate::types::PgetError;

/// Planner inputs for one download.
pub struct PlanConfig<'a> {
    pub procs: usize,
    pub task_size: u64,
    pub content_length: u64,
    pub urls: &'a [String],
    pub partial_dir: &'a Path,
    pub filename: &'a str,
}

/// One unit of work for a chunk worker.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub index: usize,
    pub url: String,
    pub range: Range,
    pub dest: PathBuf,
}

/// Planner output: the tasks that still have bytes to fetch, plus the
/// bytes already sitting in surviving chunk files. The caller seeds its
/// byte counter with `resumed_bytes` so a resumed task still reports
/// `downloaded == content_length` at the end.
#[derive(Debug)]
pub struct Plan {
    pub tasks: Vec<ChunkTask>,
    pub resumed_bytes: u64,
}

/// Walk the chunk slots in index order: fully downloaded chunks are
/// skipped, partially downloaded ones resume past their on-disk bytes,
/// and source URLs round-robin across the tasks that actually run.
pub fn assign_tasks(c: &PlanConfig<'_>) -> Result<Plan, PgetError> {
    if c.urls.is_empty() {
        return Err(PgetError::InvalidRequest("no source urls".to_string()));
    }
    if c.content_length == 0 {
        return Err(PgetError::InvalidRange);
    }

    let mut tasks = Vec::with_capacity(c.procs);
    let mut resumed_bytes = 0u64;
    let mut active = 0usize;

    for i in 0..c.procs {
        let mut r = range::make_range(i, c.procs, c.task_size, c.content_length);
        let dest = layout::chunk_path(c.partial_dir, c.filename, i);

        if let Ok(meta) = std::fs::metadata(&dest) {
            let have = meta.len();
            if have >= r.len() {
                // chunk is already fully downloaded
                resumed_bytes += r.len();
                continue;
            }
            // resume from the next unwritten byte
            resumed_bytes += have;
            r.low += have;
        }

        tasks.push(ChunkTask {
            index: i,
            url: c.urls[active % c.urls.len()].clone(),
            range: r,
            dest,
        });
        active += 1;
    }

    Ok(Plan {
        tasks,
        resumed_bytes,
    })
}
