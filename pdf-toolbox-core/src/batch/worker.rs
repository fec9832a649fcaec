//! Worker pool for parallel batch processing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::job::BatchJob;
use super::progress::BatchProgress;
use super::result::JobResult;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub num_workers: usize,
}

/// Shared state of one `process_jobs` run
struct RunContext {
    progress: Arc<BatchProgress>,
    cancelled: Arc<AtomicBool>,
    stop_on_error: bool,
    results: mpsc::Sender<(usize, JobResult)>,
}

enum WorkerMessage {
    Job(usize, BatchJob, Arc<RunContext>),
    Shutdown,
}

/// Fixed set of threads pulling jobs from one channel
pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: mpsc::Sender<WorkerMessage>,
}

impl WorkerPool {
    pub fn new(options: WorkerOptions) -> Self {
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..options.num_workers.max(1))
            .map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();

        Self { workers, sender }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Run every job and return the results in submission order
    pub fn process_jobs(
        self,
        jobs: Vec<BatchJob>,
        progress: Arc<BatchProgress>,
        cancelled: Arc<AtomicBool>,
        stop_on_error: bool,
    ) -> Vec<JobResult> {
        let num_jobs = jobs.len();
        let (result_sender, result_receiver) = mpsc::channel();
        let context = Arc::new(RunContext {
            progress,
            cancelled,
            stop_on_error,
            results: result_sender,
        });

        for (idx, job) in jobs.into_iter().enumerate() {
            if let Err(mpsc::SendError(WorkerMessage::Job(idx, job, context))) =
                self.sender
                    .send(WorkerMessage::Job(idx, job, Arc::clone(&context)))
            {
                // every worker is gone; nothing will pick this up
                context.progress.cancel_job();
                let _ = context.results.send((
                    idx,
                    JobResult::Cancelled {
                        job_name: job.display_name(),
                    },
                ));
            }
        }

        // workers hold the only other context clones
        drop(context);
        drop(self.sender);
        for worker in self.workers {
            worker.join();
        }

        let mut results: Vec<Option<JobResult>> = vec![None; num_jobs];
        for (idx, result) in result_receiver {
            results[idx] = Some(result);
        }
        results.into_iter().flatten().collect()
    }

    pub fn shutdown(self) {
        for _ in &self.workers {
            let _ = self.sender.send(WorkerMessage::Shutdown);
        }
        for worker in self.workers {
            worker.join();
        }
    }
}

fn run_job(idx: usize, job: BatchJob, context: &RunContext) {
    let job_name = job.display_name();
    if context.cancelled.load(Ordering::SeqCst) {
        context.progress.cancel_job();
        let _ = context
            .results
            .send((idx, JobResult::Cancelled { job_name }));
        return;
    }

    context.progress.start_job(&job_name);
    let start = Instant::now();
    let result = job.execute();
    let duration = start.elapsed();

    let result = match result {
        Ok(output_files) => {
            context.progress.finish_job(true);
            JobResult::Success {
                job_name,
                duration,
                output_files,
            }
        }
        Err(e) => {
            context.progress.finish_job(false);
            warn!("{} failed: {}", job_name, e);
            if context.stop_on_error {
                context.cancelled.store(true, Ordering::SeqCst);
            }
            JobResult::Failed {
                job_name,
                duration,
                error: e.to_string(),
            }
        }
    };
    let _ = context.results.send((idx, result));
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerMessage>>>) -> Self {
        let thread = thread::spawn(move || loop {
            let message = {
                // a panicking job never holds this lock, so the receiver is intact
                let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
                receiver.recv()
            };

            match message {
                Ok(WorkerMessage::Job(idx, job, context)) => run_job(idx, job, &context),
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            }
        });

        Self {
            id,
            thread: Some(thread),
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("Worker {} panicked", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolboxError;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn pool(num_workers: usize) -> WorkerPool {
        WorkerPool::new(WorkerOptions { num_workers })
    }

    fn custom(name: &str, ok: bool) -> BatchJob {
        let output = PathBuf::from(format!("{name}.pdf"));
        BatchJob::Custom {
            name: name.to_string(),
            operation: Box::new(move || {
                if ok {
                    Ok(vec![output])
                } else {
                    Err(ToolboxError::InvalidStructure("Test error".to_string()))
                }
            }),
        }
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = pool(2);
        assert_eq!(pool.size(), 2);
        pool.shutdown();
        assert_eq!(WorkerPool::new(WorkerOptions { num_workers: 0 }).size(), 1);
    }

    #[test]
    fn test_worker_pool_empty_jobs() {
        let results = pool(2).process_jobs(
            vec![],
            Arc::new(BatchProgress::new()),
            Arc::new(AtomicBool::new(false)),
            false,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_results_keep_submission_order() {
        let progress = Arc::new(BatchProgress::new());
        let jobs: Vec<BatchJob> = (0..8).map(|i| custom(&format!("job{i}"), true)).collect();
        for _ in &jobs {
            progress.add_job();
        }

        let results = pool(3).process_jobs(
            jobs,
            Arc::clone(&progress),
            Arc::new(AtomicBool::new(false)),
            false,
        );
        let names: Vec<&str> = results.iter().map(JobResult::job_name).collect();
        assert_eq!(
            names,
            vec!["job0", "job1", "job2", "job3", "job4", "job5", "job6", "job7"]
        );
        assert!(progress.snapshot().is_complete());
    }

    #[test]
    fn test_worker_pool_with_failures() {
        let progress = Arc::new(BatchProgress::new());
        progress.add_job();
        progress.add_job();

        let results = pool(1).process_jobs(
            vec![custom("Success Job", true), custom("Failing Job", false)],
            Arc::clone(&progress),
            Arc::new(AtomicBool::new(false)),
            false,
        );

        assert!(results[0].is_success());
        assert_eq!(results[1].error(), Some("Invalid PDF structure: Test error"));
        let info = progress.snapshot();
        assert_eq!(info.completed_jobs, 1);
        assert_eq!(info.failed_jobs, 1);
    }

    #[test]
    fn test_stop_on_error_cancels_the_rest() {
        let results = pool(1).process_jobs(
            vec![custom("a", false), custom("b", true), custom("c", true)],
            Arc::new(BatchProgress::new()),
            Arc::new(AtomicBool::new(false)),
            true,
        );
        assert!(results[0].is_failed());
        assert!(results[1].is_cancelled());
        assert!(results[2].is_cancelled());
    }

    #[test]
    fn test_worker_pool_cancellation() {
        let results = pool(1).process_jobs(
            vec![custom("Should be cancelled", true)],
            Arc::new(BatchProgress::new()),
            Arc::new(AtomicBool::new(true)),
            false,
        );
        assert_eq!(results.len(), 1);
        assert!(results[0].is_cancelled());
    }
}
