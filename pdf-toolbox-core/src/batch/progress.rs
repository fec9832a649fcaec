//! Progress tracking for batch operations

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Progress of a sequential file loop, reported before each file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// Files finished so far
    pub current: usize,
    pub total: usize,
    /// File about to be processed; `None` in the final report
    pub file: Option<PathBuf>,
    pub percent: f64,
}

impl Progress {
    pub fn new(current: usize, total: usize, file: Option<PathBuf>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            current as f64 / total as f64 * 100.0
        };
        Self {
            current,
            total,
            file,
            percent,
        }
    }

    pub fn finished(total: usize) -> Self {
        Self::new(total, total, None)
    }
}

/// Snapshot of a batch run
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    /// Jobs dropped after cancellation
    pub cancelled_jobs: usize,
    pub running_jobs: usize,
    /// Name of the most recently started job
    pub current_job: Option<String>,
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Jobs that will not run again, whatever their outcome
    pub fn processed(&self) -> usize {
        self.completed_jobs + self.failed_jobs + self.cancelled_jobs
    }

    pub fn percentage(&self) -> f64 {
        if self.total_jobs == 0 {
            100.0
        } else {
            self.processed() as f64 / self.total_jobs as f64 * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total_jobs
    }

    /// One status line, e.g. `3/10 (30%) 成功 2, 失败 1: scan.pdf`
    pub fn format_progress(&self) -> String {
        let mut line = format!(
            "{}/{} ({:.0}%) 成功 {}, 失败 {}",
            self.processed(),
            self.total_jobs,
            self.percentage(),
            self.completed_jobs,
            self.failed_jobs
        );
        if self.cancelled_jobs > 0 {
            line.push_str(&format!(", 取消 {}", self.cancelled_jobs));
        }
        if let (Some(job), false) = (&self.current_job, self.is_complete()) {
            line.push_str(": ");
            line.push_str(job);
        }
        line
    }
}

/// Counters shared by the workers of one run
pub struct BatchProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    running: AtomicUsize,
    current: Mutex<Option<String>>,
    started: Instant,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProgress {
    pub fn new() -> Self {
        Self {
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            current: Mutex::new(None),
            started: Instant::now(),
        }
    }

    pub fn add_job(&self) {
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn start_job(&self, name: &str) {
        self.running.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
    }

    pub fn finish_job(&self, success: bool) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        let counter = if success { &self.completed } else { &self.failed };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// A job that never started
    pub fn cancel_job(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressInfo {
        ProgressInfo {
            total_jobs: self.total.load(Ordering::SeqCst),
            completed_jobs: self.completed.load(Ordering::SeqCst),
            failed_jobs: self.failed.load(Ordering::SeqCst),
            cancelled_jobs: self.cancelled.load(Ordering::SeqCst),
            running_jobs: self.running.load(Ordering::SeqCst),
            current_job: self
                .current
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            elapsed: self.started.elapsed(),
        }
    }
}

pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);
}

impl<F> ProgressCallback for F
where
    F: Fn(&ProgressInfo) + Send + Sync,
{
    fn on_progress(&self, info: &ProgressInfo) {
        self(info)
    }
}
