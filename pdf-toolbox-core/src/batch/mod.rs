//! Batch processing for multiple PDF operations
//!
//! Two ways of running work over many files:
//!
//! - [`run_files`] and [`BackgroundTask`]: one file after the other, with
//!   progress before each file and cancellation between files. Every
//!   multi-file tool of the command line and the HTTP API uses these.
//! - [`BatchProcessor`]: independent [`BatchJob`]s spread over a
//!   [`WorkerPool`], with periodic progress callbacks and a
//!   [`BatchSummary`] at the end.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdf_toolbox::batch::{BatchJob, BatchOptions, BatchProcessor, Pipeline, PipelineStep};
//! use pdf_toolbox::operations::{CompressionLevel, RotationAngle};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # fn main() -> pdf_toolbox::Result<()> {
//! let pipeline = Arc::new(Pipeline::new(
//!     vec![
//!         PipelineStep::Rotate(RotationAngle::Clockwise90),
//!         PipelineStep::Compress(CompressionLevel::Medium),
//!     ],
//!     "processed",
//! )?);
//!
//! let options = BatchOptions::default()
//!     .with_parallelism(4)
//!     .with_progress_callback(|progress| {
//!         println!("Progress: {:.1}%", progress.percentage());
//!     });
//! let mut processor = BatchProcessor::new(options);
//! for file in ["doc1.pdf", "doc2.pdf", "doc3.pdf"] {
//!     processor.add_job(BatchJob::Pipeline {
//!         input: PathBuf::from(file),
//!         pipeline: Arc::clone(&pipeline),
//!     });
//! }
//!
//! let summary = processor.execute()?;
//! println!("{}", summary.format_report());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::Result;

pub mod job;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod task;
pub mod worker;

pub use job::{BatchJob, JobStatus, JobType};
pub use pipeline::{Pipeline, PipelineStep};
pub use progress::{BatchProgress, Progress, ProgressCallback, ProgressInfo};
pub use result::{summarize_outcomes, BatchSummary, FileOutcome, JobResult};
pub use task::{run_files, BackgroundTask, CancelToken, TaskEvent};
pub use worker::{WorkerOptions, WorkerPool};

/// Options for batch processing
#[derive(Clone)]
pub struct BatchOptions {
    pub parallelism: usize,
    /// How often the progress callback fires
    pub progress_interval: Duration,
    /// Cancel the remaining jobs after the first failure
    pub stop_on_error: bool,
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get().clamp(1, 8),
            progress_interval: Duration::from_millis(100),
            stop_on_error: false,
            progress_callback: None,
        }
    }
}

impl BatchOptions {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressInfo) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }
}

/// Batch processor for handling multiple PDF operations
pub struct BatchProcessor {
    options: BatchOptions,
    jobs: Vec<BatchJob>,
    cancelled: Arc<AtomicBool>,
    progress: Arc<BatchProgress>,
}

impl BatchProcessor {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            jobs: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(BatchProgress::new()),
        }
    }

    pub fn add_job(&mut self, job: BatchJob) {
        self.jobs.push(job);
        self.progress.add_job();
    }

    pub fn add_jobs(&mut self, jobs: impl IntoIterator<Item = BatchJob>) {
        for job in jobs {
            self.add_job(job);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Token that cancels this batch from another thread
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::from_flag(Arc::clone(&self.cancelled))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run every job on the worker pool
    pub fn execute(self) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let total_jobs = self.jobs.len();
        if total_jobs == 0 {
            return Ok(BatchSummary::empty());
        }

        let pool = WorkerPool::new(WorkerOptions {
            num_workers: self.options.parallelism.min(total_jobs),
        });

        let finished = Arc::new(AtomicBool::new(false));
        let progress_handle = self.options.progress_callback.as_ref().map(|callback| {
            let progress = Arc::clone(&self.progress);
            let callback = Arc::clone(callback);
            let interval = self.options.progress_interval;
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                while !finished.load(Ordering::SeqCst) {
                    let info = progress.snapshot();
                    if info.is_complete() {
                        break;
                    }
                    callback.on_progress(&info);
                    thread::sleep(interval);
                }
            })
        });

        let results = pool.process_jobs(
            self.jobs,
            Arc::clone(&self.progress),
            Arc::clone(&self.cancelled),
            self.options.stop_on_error,
        );

        finished.store(true, Ordering::SeqCst);
        if let Some(handle) = progress_handle {
            let _ = handle.join();
        }
        if let Some(callback) = &self.options.progress_callback {
            callback.on_progress(&self.progress.snapshot());
        }

        let successful = results.iter().filter(|r| r.is_success()).count();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        let summary = BatchSummary {
            total_jobs,
            successful,
            failed,
            cancelled: self.cancelled.load(Ordering::SeqCst),
            duration: start_time.elapsed(),
            results,
        };
        info!(
            "Batch finished: {} succeeded, {} failed in {:.2}s",
            summary.successful,
            summary.failed,
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    pub fn get_progress(&self) -> ProgressInfo {
        self.progress.snapshot()
    }
}

/// Run `pipeline` over every file in `files` on the worker pool
pub fn batch_process_files<P: AsRef<Path>>(
    files: &[P],
    pipeline: Pipeline,
    options: BatchOptions,
) -> Result<BatchSummary> {
    let pipeline = Arc::new(pipeline);
    let mut processor = BatchProcessor::new(options);
    processor.add_jobs(files.iter().map(|file| BatchJob::Pipeline {
        input: file.as_ref().to_path_buf(),
        pipeline: Arc::clone(&pipeline),
    }));
    processor.execute()
}

/// Merge each group of inputs into its output, one group per job
pub fn batch_merge_pdfs(
    merge_groups: Vec<(Vec<PathBuf>, PathBuf)>,
    options: BatchOptions,
) -> Result<BatchSummary> {
    let mut processor = BatchProcessor::new(options);
    for (inputs, output) in merge_groups {
        processor.add_job(BatchJob::Merge {
            inputs,
            output,
            options: Default::default(),
        });
    }
    processor.execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolboxError;
    use crate::operations::RotationAngle;
    use crate::test_support::write_sample;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[test]
    fn test_batch_options_builder() {
        let options = BatchOptions::default()
            .with_parallelism(0)
            .stop_on_error(true)
            .with_progress_interval(Duration::from_millis(5))
            .with_progress_callback(|_| {});

        assert_eq!(options.parallelism, 1);
        assert!(options.stop_on_error);
        assert_eq!(options.progress_interval, Duration::from_millis(5));
        assert!(options.progress_callback.is_some());
        assert!(BatchOptions::default().parallelism <= 8);
    }

    #[test]
    fn test_empty_batch_execution() {
        let processor = BatchProcessor::new(BatchOptions::default());
        assert!(processor.is_empty());
        let summary = processor.execute().unwrap();
        assert_eq!(summary.total_jobs, 0);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_cancel_before_execute() {
        let mut processor = BatchProcessor::new(BatchOptions::default().with_parallelism(2));
        processor.add_jobs((0..3).map(|i| BatchJob::Custom {
            name: format!("job{i}"),
            operation: Box::new(|| Ok(vec![])),
        }));
        processor.cancel_token().cancel();
        assert!(processor.is_cancelled());

        let summary = processor.execute().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.cancelled_jobs(), 3);
        assert_eq!(summary.successful, 0);
    }

    #[test]
    fn test_final_progress_is_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = BatchOptions::default()
            .with_parallelism(2)
            .with_progress_callback(move |info: &ProgressInfo| {
                sink.lock().unwrap().push(info.percentage())
            });

        let mut processor = BatchProcessor::new(options);
        processor.add_jobs((0..4).map(|i| BatchJob::Custom {
            name: format!("job{i}"),
            operation: Box::new(move || {
                if i == 2 {
                    Err(ToolboxError::NoPagesToProcess)
                } else {
                    Ok(vec![])
                }
            }),
        }));
        let summary = processor.execute().unwrap();

        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(seen.lock().unwrap().last().copied(), Some(100.0));
    }

    #[test]
    fn test_batch_process_files_with_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            write_sample(dir.path(), "a.pdf", 1),
            write_sample(dir.path(), "b.pdf", 2),
            dir.path().join("missing.pdf"),
        ];
        let pipeline = Pipeline::new(
            vec![PipelineStep::Rotate(RotationAngle::Clockwise90)],
            dir.path().join("out"),
        )
        .unwrap();

        let summary = batch_process_files(&inputs, pipeline, BatchOptions::default()).unwrap();
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.output_files(),
            vec![
                &dir.path().join("out").join("a_processed.pdf"),
                &dir.path().join("out").join("b_processed.pdf"),
            ]
        );
        assert!(summary.format_report().contains("missing.pdf"));
    }

    #[test]
    fn test_batch_merge() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sample(dir.path(), "a.pdf", 1);
        let b = write_sample(dir.path(), "b.pdf", 2);
        let out = dir.path().join("ab.pdf");

        let summary =
            batch_merge_pdfs(vec![(vec![a, b], out.clone())], BatchOptions::default()).unwrap();
        assert_eq!(summary.successful, 1);
        let doc = crate::document::load(&out, None).unwrap();
        assert_eq!(crate::document::page_count(&doc), 3);
    }
}
