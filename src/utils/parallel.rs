// src/utils/parallel.rs: Bounded per-sample fan-out for the trimming and filtering stages

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::defs::PipelineError;
use crate::utils::file::make_folder;
use crate::utils::manifest::SampleManifest;


/// One unit of per-sample work handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleJob {
    pub sample: String,
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub threads: usize,
}

impl SampleJob {
    pub fn output(&self, ext: &str) -> PathBuf {
        self.out_dir.join(format!("{}{}", self.sample, ext))
    }
}


/// Threads handed to each worker: the total split evenly across concurrent workers, at least one.
/// Computed once per stage and never rebalanced.
pub fn per_worker_budget(total_threads: usize, max_concurrency: usize) -> usize {
    (total_threads / max_concurrency.max(1)).max(1)
}


/// Runs `unit_of_work` once per manifest entry with at most `max_concurrency` running at a time.
///
/// Jobs are queued in manifest order and admitted first come, first served. The first failure
/// wins: the remaining jobs are aborted (running tools are killed through kill-on-drop) and that
/// failure is returned. `Ok` means every sample finished.
///
/// # Arguments
///
/// * `manifest` - samples to process
/// * `out_dir` - output folder, created if missing
/// * `max_concurrency` - maximum number of jobs running at once
/// * `threads_per_worker` - resource budget passed unchanged to every job
/// * `unit_of_work` - async job, writes exactly one output per sample
///
/// # Returns
/// number of samples processed
pub async fn run_bounded<F, Fut>(
    manifest: &SampleManifest,
    out_dir: &Path,
    max_concurrency: usize,
    threads_per_worker: usize,
    unit_of_work: F,
) -> Result<usize, PipelineError>
where
    F: Fn(SampleJob) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    make_folder(out_dir)?;

    let max_concurrency = max_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let unit_of_work = Arc::new(unit_of_work);
    let mut tasks = JoinSet::new();

    debug!(
        "Dispatching {} samples, {} at a time, {} threads each",
        manifest.len(),
        max_concurrency,
        threads_per_worker
    );

    for (sample, input) in manifest {
        let job = SampleJob {
            sample: sample.clone(),
            input: input.clone(),
            out_dir: out_dir.to_path_buf(),
            threads: threads_per_worker,
        };
        let semaphore = semaphore.clone();
        let unit_of_work = unit_of_work.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Other(anyhow::anyhow!("Worker pool closed: {}", e)))?;
            info!("\t{}", job.sample);
            let sample = job.sample.clone();
            (*unit_of_work)(job).await.map_err(|e| {
                error!("Sample {} failed: {}", sample, e);
                e
            })
        });
    }

    let mut completed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => Err(PipelineError::Other(anyhow::anyhow!("Worker panicked: {}", e))),
        };
        if let Err(e) = outcome {
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(e);
        }
        completed += 1;
    }
    Ok(completed)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn manifest(n: usize) -> SampleManifest {
        (0..n)
            .map(|i| (format!("sample{:02}", i), PathBuf::from(format!("/in/sample{:02}.fastq.gz", i))))
            .collect()
    }

    #[test]
    fn test_per_worker_budget() {
        assert_eq!(per_worker_budget(8, 2), 4);
        assert_eq!(per_worker_budget(9, 2), 4);
        assert_eq!(per_worker_budget(1, 4), 1);
        assert_eq!(per_worker_budget(8, 0), 8);
    }

    #[tokio::test]
    async fn test_never_more_than_max_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let seen_threads = Arc::new(Mutex::new(Vec::new()));

        let (r, p, s) = (running.clone(), peak.clone(), seen_threads.clone());
        let done = run_bounded(&manifest(7), dir.path(), 2, per_worker_budget(8, 2), move |job| {
            let (running, peak, seen) = (r.clone(), p.clone(), s.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                seen.lock().unwrap().push(job.threads);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(done, 7);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(*seen_threads.lock().unwrap(), vec![4; 7]);
    }

    #[tokio::test]
    async fn test_creates_output_folder_and_passes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("3_trimmed");
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let j = jobs.clone();
        run_bounded(&manifest(2), &out, 4, 1, move |job| {
            let jobs = j.clone();
            async move {
                jobs.lock().unwrap().push(job);
                Ok(())
            }
        })
        .await
        .unwrap();

        assert!(out.is_dir());
        let mut jobs = jobs.lock().unwrap().clone();
        jobs.sort_by(|a, b| a.sample.cmp(&b.sample));
        assert_eq!(jobs[0].input, PathBuf::from("/in/sample00.fastq.gz"));
        assert_eq!(jobs[1].output(".fastq.gz"), out.join("sample01.fastq.gz"));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let started = std::time::Instant::now();

        let err = run_bounded(&manifest(6), dir.path(), 2, 1, move |job| {
            let finished = f.clone();
            async move {
                if job.sample == "sample00" {
                    return Err(PipelineError::ToolExecution {
                        tool: "porechop".to_string(),
                        error: "exited with exit status: 1".to_string(),
                    });
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::ToolExecution { .. }));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_empty_manifest_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let done = run_bounded(&SampleManifest::new(), dir.path(), 2, 1, |_job| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(done, 0);
    }
}
