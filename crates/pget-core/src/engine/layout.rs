// Deterministic on-disk layout for resumable chunk storage.

use std::path::{Path, PathBuf};

/// Directory holding one download's chunk files. The name encodes the
/// filename and worker count so distinct (file, N) pairs never collide.
pub fn partial_dir(output_dir: &Path, filename: &str, procs: usize) -> PathBuf {
    output_dir.join(format!("_{filename}.{procs}"))
}

/// Path of chunk `i` inside the partial directory.
pub fn chunk_path(partial_dir: &Path, filename: &str, i: usize) -> PathBuf {
    partial_dir.join(format!("{filename}.{i}.part"))
}
