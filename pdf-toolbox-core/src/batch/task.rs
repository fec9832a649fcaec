//! Sequential file loops and their background thread

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tracing::{debug, warn};

use super::progress::Progress;
use super::result::FileOutcome;
use crate::error::{Result, ToolboxError};

/// Shared cancellation flag, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ToolboxError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }
}

/// Run `f` over `files` on the calling thread.
///
/// `progress` is called before each file and once more at 100 %. A failing
/// file does not stop the loop; after cancellation every remaining file is
/// recorded as cancelled.
pub fn run_files<F, P>(files: &[PathBuf], token: &CancelToken, mut progress: P, mut f: F) -> Vec<FileOutcome>
where
    F: FnMut(&PathBuf) -> Result<FileOutcome>,
    P: FnMut(&Progress),
{
    let total = files.len();
    let mut outcomes = Vec::with_capacity(total);

    for (idx, file) in files.iter().enumerate() {
        if token.is_cancelled() {
            outcomes.push(FileOutcome::cancelled(file));
            continue;
        }
        progress(&Progress::new(idx, total, Some(file.clone())));

        let outcome = match f(file) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to process {}: {}", file.display(), e);
                FileOutcome::failure(file, &e)
            }
        };
        outcomes.push(outcome);
    }

    progress(&Progress::finished(total));
    outcomes
}

/// Messages from a background task
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress(Progress),
    Finished(Vec<FileOutcome>),
}

/// A file loop running on its own thread
pub struct BackgroundTask {
    token: CancelToken,
    events: mpsc::Receiver<TaskEvent>,
    handle: Option<thread::JoinHandle<()>>,
    outcomes: Option<Vec<FileOutcome>>,
}

impl BackgroundTask {
    /// Start [`run_files`] over `files` on one new thread
    pub fn spawn<F>(files: Vec<PathBuf>, f: F) -> Self
    where
        F: FnMut(&PathBuf) -> Result<FileOutcome> + Send + 'static,
    {
        let token = CancelToken::new();
        let (sender, events) = mpsc::channel();
        let worker_token = token.clone();

        let handle = thread::spawn(move || {
            let progress_sender = sender.clone();
            let outcomes = run_files(
                &files,
                &worker_token,
                |p| {
                    let _ = progress_sender.send(TaskEvent::Progress(p.clone()));
                },
                f,
            );
            debug!("Background task finished {} files", outcomes.len());
            let _ = sender.send(TaskEvent::Finished(outcomes));
        });

        Self {
            token,
            events,
            handle: Some(handle),
            outcomes: None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Events received so far, without blocking
    pub fn poll(&mut self) -> Vec<TaskEvent> {
        let events: Vec<TaskEvent> = self.events.try_iter().collect();
        for event in &events {
            if let TaskEvent::Finished(outcomes) = event {
                self.outcomes = Some(outcomes.clone());
            }
        }
        events
    }

    /// Wait for the thread and return every outcome
    pub fn join(mut self) -> Result<Vec<FileOutcome>> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| {
                ToolboxError::InvalidStructure("background task panicked".to_string())
            })?;
        }
        for event in self.events.try_iter() {
            if let TaskEvent::Finished(outcomes) = event {
                self.outcomes = Some(outcomes);
            }
        }
        self.outcomes.ok_or(ToolboxError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc::channel;

    fn files(n: usize) -> Vec<PathBuf> {
        (1..=n).map(|i| PathBuf::from(format!("f{i}.pdf"))).collect()
    }

    #[test]
    fn test_run_files_reports_progress() {
        let mut seen = Vec::new();
        let outcomes = run_files(
            &files(3),
            &CancelToken::new(),
            |p| seen.push((p.current, p.percent as u32, p.file.is_some())),
            |path| {
                if path.ends_with("f2.pdf") {
                    Err(ToolboxError::WrongPassword)
                } else {
                    Ok(FileOutcome::success(path, path))
                }
            },
        );

        assert_eq!(
            seen,
            vec![(0, 0, true), (1, 33, true), (2, 66, true), (3, 100, false)]
        );
        assert_eq!(
            outcomes.iter().map(|o| o.success).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_cancel_marks_remaining_files() {
        let token = CancelToken::new();
        let outcomes = run_files(&files(3), &token, |_| {}, |path| {
            token.cancel();
            Ok(FileOutcome::success(path, path))
        });

        assert!(outcomes[0].success);
        assert!(outcomes[1].is_cancelled());
        assert!(outcomes[2].is_cancelled());
        assert!(token.check().is_err());
    }

    #[test]
    fn test_background_task_delivers_events() {
        let mut task = BackgroundTask::spawn(files(2), |path| Ok(FileOutcome::success(path, path)));
        while !task.is_finished() {
            thread::yield_now();
        }
        let events = task.poll();
        assert!(matches!(events.first(), Some(TaskEvent::Progress(p)) if p.current == 0));
        assert!(matches!(events.last(), Some(TaskEvent::Finished(o)) if o.len() == 2));

        let outcomes = task.join().unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[test]
    fn test_background_task_cancel() {
        let (release, wait) = channel::<()>();
        let task = BackgroundTask::spawn(files(3), move |path| {
            let _ = wait.recv();
            Ok(FileOutcome::success(path, path))
        });
        task.cancel();
        drop(release);

        let outcomes = task.join().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().filter(|o| o.is_cancelled()).count() >= 2);
    }
}
