// Parallel byte-range download engine with resume support.

pub mod layout;
pub mod planner;
pub mod range;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::PgetError;
use planner::ChunkTask;

/// Progress callback: `(downloaded, total, speed)` in bytes and bytes/s.
/// `speed == -1` marks a bytes-only tick from a chunk worker; `speed == 0`
/// marks the terminal frame.
pub type ProgressFn = Arc<dyn Fn(u64, u64, i64) + Send + Sync>;

/// Everything one download needs. `content_length` comes from the HEAD
/// probe; the caller owns `cancel` and may use it to abort the download.
pub struct DownloadConfig {
    pub urls: Vec<String>,
    pub filename: String,
    pub output_dir: PathBuf,
    pub content_length: u64,
    pub parallelism: usize,
    pub client: reqwest::Client,
    pub user_agent: String,
    pub referer: Option<String>,
    pub read_buffer: usize,
    pub sample_interval: Duration,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressFn>,
}

/// Download `urls` into `output_dir/filename` using parallel range
/// requests, then assemble the chunk files into the destination.
///
/// All workers run under one cancellation scope: the first error cancels
/// its siblings and is returned. Chunk files are append-only, so a rerun
/// with the same `(output_dir, filename, parallelism)` resumes where each
/// chunk stopped.
pub async fn download(cfg: DownloadConfig) -> Result<(), PgetError> {
    if cfg.content_length == 0 {
        return Err(PgetError::InvalidRange);
    }

    let procs = range::effective_procs(cfg.parallelism, cfg.content_length);
    let partial_dir = layout::partial_dir(&cfg.output_dir, &cfg.filename, procs);
    tokio::fs::create_dir_all(&partial_dir).await?;

    let plan = planner::assign_tasks(&planner::PlanConfig {
        procs,
        task_size: cfg.content_length / procs as u64,
        content_length: cfg.content_length,
        urls: &cfg.urls,
        partial_dir: &partial_dir,
        filename: &cfg.filename,
    })?;

    debug!(
        file = %cfg.filename,
        tasks = plan.tasks.len(),
        resumed = plan.resumed_bytes,
        "planned chunk downloads"
    );

    // Seeded with the bytes already on disk so resumed tasks still end at
    // downloaded == content_length.
    let counter = Arc::new(AtomicU64::new(plan.resumed_bytes));
    let cancel = cfg.cancel.child_token();
    let mut workers: JoinSet<Result<(), PgetError>> = JoinSet::new();

    if let Some(progress) = cfg.progress.clone() {
        let counter = counter.clone();
        let cancel = cancel.clone();
        let total = cfg.content_length;
        let every = cfg.sample_interval;
        workers.spawn(async move {
            sample_speed(counter, total, every, cancel, progress).await;
            Ok(())
        });
    }

    for task in plan.tasks {
        workers.spawn(fetch_chunk(
            cfg.client.clone(),
            task,
            cfg.user_agent.clone(),
            cfg.referer.clone(),
            cfg.read_buffer,
            counter.clone(),
            cfg.content_length,
            cancel.clone(),
            cfg.progress.clone(),
        ));
    }

    let mut first_err: Option<PgetError> = None;
    while let Some(joined) = workers.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Ok(()),
            Err(join_err) => Err(PgetError::Io(std::io::Error::other(join_err))),
        };
        if let Err(err) = result {
            if first_err.is_none() {
                cancel.cancel();
                first_err = Some(err);
            }
        }
    }

    // Unconditional terminal frame: subscribers always see a complete
    // {downloaded, total, speed=0} sample last, whatever the outcome.
    let cur = counter.load(Ordering::SeqCst);
    if let Some(progress) = &cfg.progress {
        progress(cur, cfg.content_length, 0);
    }

    if let Some(err) = first_err {
        return Err(err);
    }
    if cfg.cancel.is_cancelled() {
        return Err(PgetError::Cancelled);
    }

    bind_files(&cfg, procs, &partial_dir).await
}

/// Periodically read the shared byte counter and report the transfer rate.
/// Exits once the counter reaches the total or the scope is cancelled.
async fn sample_speed(
    counter: Arc<AtomicU64>,
    total: u64,
    every: Duration,
    cancel: CancellationToken,
    progress: ProgressFn,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last = counter.load(Ordering::SeqCst);
    // the first tick completes immediately; use it as the baseline
    let mut last_time = ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            now = ticker.tick() => {
                let cur = counter.load(Ordering::SeqCst);
                let delta = cur.saturating_sub(last);
                let elapsed = now.duration_since(last_time).as_secs_f64();
                let speed = if delta > 0 && elapsed > 0.0 {
                    (delta as f64 / elapsed) as i64
                } else {
                    0
                };
                progress(cur, total, speed);
                if cur >= total {
                    return;
                }
                last = cur;
                last_time = now;
            }
        }
    }
}

/// Fetch one byte range into its chunk file, bumping the shared counter
/// after every write. The chunk file is opened append+create, so a
/// resumed range continues exactly where the previous run stopped.
#[allow(clippy::too_many_arguments)]
async fn fetch_chunk(
    client: reqwest::Client,
    task: ChunkTask,
    user_agent: String,
    referer: Option<String>,
    read_buffer: usize,
    counter: Arc<AtomicU64>,
    total: u64,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
) -> Result<(), PgetError> {
    let mut request = client
        .get(&task.url)
        .header(header::RANGE, task.range.bytes_range())
        .header(header::USER_AGENT, user_agent);
    if let Some(referer) = referer {
        request = request.header(header::REFERER, referer);
    }

    let response = request.send().await?.error_for_status()?;

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&task.dest)
        .await?;

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);
    let mut buf = vec![0u8; read_buffer.max(1)];

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        let cur = counter.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
        if let Some(progress) = &progress {
            progress(cur, total, -1);
        }
    }

    file.flush().await?;
    Ok(())
}

/// Concatenate the chunk files into the destination in index order,
/// deleting each chunk after its copy, then remove the partial directory.
/// On error the surviving chunk files stay behind for the next attempt.
async fn bind_files(
    cfg: &DownloadConfig,
    procs: usize,
    partial_dir: &Path,
) -> Result<(), PgetError> {
    let dest = cfg.output_dir.join(&cfg.filename);
    let mut out = tokio::fs::File::create(&dest).await?;

    for i in 0..procs {
        let part = layout::chunk_path(partial_dir, &cfg.filename, i);
        let mut src = tokio::fs::File::open(&part).await?;
        tokio::io::copy(&mut src, &mut out).await?;
        tokio::fs::remove_file(&part).await?;
    }

    out.flush().await?;
    tokio::fs::remove_dir_all(partial_dir).await?;

    info!(file = %dest.display(), "download assembled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves slices of `body` for ranged GETs, the whole body otherwise.
    struct RangeResponder {
        body: Vec<u8>,
    }

    impl wiremock::Respond for RangeResponder {
        fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
            if let Some(range_header) = request.headers.get(&reqwest::header::RANGE) {
                let range = range_header.to_str().unwrap().trim_start_matches("bytes=");
                let (start, end) = range.split_once('-').unwrap();
                let start: usize = start.parse().unwrap();
                let end: usize = end.parse().unwrap();
                let slice = &self.body[start..=end];
                ResponseTemplate::new(206)
                    .set_body_bytes(slice.to_vec())
                    .insert_header(
                        "Content-Range",
                        format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
                    )
            } else {
                ResponseTemplate::new(200).set_body_bytes(self.body.clone())
            }
        }
    }

    fn test_body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn test_config(
        server: &MockServer,
        output_dir: &Path,
        body_len: u64,
        log: Arc<Mutex<Vec<(u64, u64, i64)>>>,
    ) -> DownloadConfig {
        DownloadConfig {
            urls: vec![format!("{}/file.bin", server.uri())],
            filename: "file.bin".to_string(),
            output_dir: output_dir.to_path_buf(),
            content_length: body_len,
            parallelism: 4,
            client: crate::network::build_client(4, None).unwrap(),
            user_agent: "Pget/test".to_string(),
            referer: None,
            read_buffer: 32 * 1024,
            sample_interval: Duration::from_millis(50),
            cancel: CancellationToken::new(),
            progress: Some(Arc::new(move |d, t, s| {
                log.lock().unwrap().push((d, t, s));
            })),
        }
    }

    #[tokio::test]
    async fn test_parallel_download_assembles_file() {
        let server = MockServer::start().await;
        let body = test_body(100_000);

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(RangeResponder { body: body.clone() })
            .expect(4)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = test_config(&server, tmp.path(), body.len() as u64, log.clone());

        download(cfg).await.unwrap();

        assert_eq!(std::fs::read(tmp.path().join("file.bin")).unwrap(), body);
        assert!(
            !tmp.path().join("_file.bin.4").exists(),
            "partial dir should be removed after assembly"
        );

        let log = log.lock().unwrap();
        assert_eq!(
            *log.last().unwrap(),
            (100_000, 100_000, 0),
            "terminal frame must be complete with speed 0"
        );
        assert!(
            log.iter().any(|&(_, _, s)| s > 0),
            "the sampler should have reported at least one measured speed"
        );

        // each worker asked for exactly its slice
        let requests = server.received_requests().await.unwrap();
        let mut ranges: Vec<String> = requests
            .iter()
            .filter_map(|r| r.headers.get(&reqwest::header::RANGE))
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        ranges.sort();
        assert_eq!(
            ranges,
            vec![
                "bytes=0-24999",
                "bytes=25000-49999",
                "bytes=50000-74999",
                "bytes=75000-99999",
            ]
        );
    }

    #[tokio::test]
    async fn test_resume_fetches_only_missing_bytes() {
        let server = MockServer::start().await;
        let body = test_body(1_000_000);

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(RangeResponder { body: body.clone() })
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        // chunk 0 half done, chunk 3 complete, from a previous run
        let partial = layout::partial_dir(tmp.path(), "file.bin", 4);
        std::fs::create_dir_all(&partial).unwrap();
        std::fs::write(
            layout::chunk_path(&partial, "file.bin", 0),
            &body[0..100_000],
        )
        .unwrap();
        std::fs::write(
            layout::chunk_path(&partial, "file.bin", 3),
            &body[750_000..],
        )
        .unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = test_config(&server, tmp.path(), body.len() as u64, log.clone());
        download(cfg).await.unwrap();

        assert_eq!(std::fs::read(tmp.path().join("file.bin")).unwrap(), body);
        assert!(!partial.exists());

        // only chunks 0 (resumed), 1 and 2 were requested
        let requests = server.received_requests().await.unwrap();
        let mut ranges: Vec<String> = requests
            .iter()
            .filter_map(|r| r.headers.get(&reqwest::header::RANGE))
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        ranges.sort();
        assert_eq!(
            ranges,
            vec![
                "bytes=100000-249999",
                "bytes=250000-499999",
                "bytes=500000-749999",
            ]
        );

        // resumed bytes count toward the terminal frame
        assert_eq!(*log.lock().unwrap().last().unwrap(), (1_000_000, 1_000_000, 0));
    }

    #[tokio::test]
    async fn test_worker_error_fails_task_and_keeps_partials() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = test_config(&server, tmp.path(), 100_000, log.clone());

        let err = download(cfg).await.unwrap_err();
        assert!(matches!(err, PgetError::Network(_)));

        assert!(!tmp.path().join("file.bin").exists());
        assert!(
            tmp.path().join("_file.bin.4").exists(),
            "partial dir must survive a failed task for the next attempt"
        );

        // the terminal frame is emitted even on failure
        assert_eq!(*log.lock().unwrap().last().unwrap(), (0, 100_000, 0));
    }

    #[tokio::test]
    async fn test_zero_content_length_rejected() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = test_config(&server, tmp.path(), 0, log);

        assert!(matches!(
            download(cfg).await,
            Err(PgetError::InvalidRange)
        ));
    }

    #[tokio::test]
    async fn test_small_file_clamps_workers() {
        let server = MockServer::start().await;
        let body = test_body(3);

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(RangeResponder { body: body.clone() })
            .expect(3)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = test_config(&server, tmp.path(), 3, log);

        download(cfg).await.unwrap();
        assert_eq!(std::fs::read(tmp.path().join("file.bin")).unwrap(), body);
    }

    #[tokio::test]
    async fn test_request_headers_are_forwarded() {
        let server = MockServer::start().await;
        let body = test_body(4096);

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(wiremock::matchers::header("User-Agent", "Pget/test"))
            .and(wiremock::matchers::header(
                "Referer",
                "https://example.com/page",
            ))
            .respond_with(RangeResponder { body: body.clone() })
            .expect(4)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut cfg = test_config(&server, tmp.path(), body.len() as u64, log);
        cfg.referer = Some("https://example.com/page".to_string());

        download(cfg).await.unwrap();
        assert_eq!(std::fs::read(tmp.path().join("file.bin")).unwrap(), body);
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let server = MockServer::start().await;
        let body = test_body(100_000);

        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(
                RangeResponder { body: body.clone() },
            )
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = test_config(&server, tmp.path(), body.len() as u64, log);
        cfg.cancel.cancel();

        let err = download(cfg).await.unwrap_err();
        assert!(matches!(err, PgetError::Cancelled));
        assert!(!tmp.path().join("file.bin").exists());
    }
}
