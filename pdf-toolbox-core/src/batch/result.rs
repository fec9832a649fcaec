//! Results and summaries for batch operations

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::ToolboxError;
use crate::files::{compression_ratio, format_file_size};

/// What happened to one input of a multi-file tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub success: bool,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Error text, or a short note on success
    pub message: String,
    pub original_size: Option<u64>,
    pub output_size: Option<u64>,
}

impl FileOutcome {
    pub fn success<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            success: true,
            input: input.into(),
            output: Some(output.into()),
            message: String::new(),
            original_size: None,
            output_size: None,
        }
    }

    pub fn failure<P: Into<PathBuf>>(input: P, error: &ToolboxError) -> Self {
        Self {
            success: false,
            input: input.into(),
            output: None,
            message: error.to_string(),
            original_size: None,
            output_size: None,
        }
    }

    pub fn cancelled<P: Into<PathBuf>>(input: P) -> Self {
        Self::failure(input, &ToolboxError::Cancelled)
    }

    pub fn with_sizes(mut self, original: u64, output: u64) -> Self {
        self.original_size = Some(original);
        self.output_size = Some(output);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        !self.success && self.message == ToolboxError::Cancelled.to_string()
    }

    fn name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.success {
            return write!(f, "✗ {}: {}", self.name(), self.message);
        }
        write!(f, "✓ {}", self.name())?;
        if let (Some(before), Some(after)) = (self.original_size, self.output_size) {
            write!(
                f,
                " ({} -> {}, {:.2}%)",
                format_file_size(before),
                format_file_size(after),
                compression_ratio(before, after)
            )?;
        }
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

/// Succeeded / failed counts and the failure lines shown after a run
pub fn summarize_outcomes(outcomes: &[FileOutcome]) -> String {
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    let mut text = format!(
        "处理完成: 成功 {} 个, 失败 {} 个",
        succeeded,
        outcomes.len() - succeeded
    );
    for outcome in outcomes.iter().filter(|o| !o.success) {
        text.push_str(&format!("\n{outcome}"));
    }
    text
}

/// Result of a single job in the batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobResult {
    Success {
        job_name: String,
        duration: Duration,
        output_files: Vec<PathBuf>,
    },
    Failed {
        job_name: String,
        duration: Duration,
        error: String,
    },
    Cancelled {
        job_name: String,
    },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobResult::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobResult::Cancelled { .. })
    }

    pub fn job_name(&self) -> &str {
        match self {
            JobResult::Success { job_name, .. }
            | JobResult::Failed { job_name, .. }
            | JobResult::Cancelled { job_name } => job_name,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            JobResult::Success { duration, .. } | JobResult::Failed { duration, .. } => {
                Some(*duration)
            }
            JobResult::Cancelled { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobResult::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn output_files(&self) -> Option<&[PathBuf]> {
        match self {
            JobResult::Success { output_files, .. } => Some(output_files),
            _ => None,
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobResult::Success {
                job_name,
                duration,
                output_files,
            } => write!(
                f,
                "✓ {} - completed in {:.2}s ({} files)",
                job_name,
                duration.as_secs_f64(),
                output_files.len()
            ),
            JobResult::Failed {
                job_name,
                duration,
                error,
            } => write!(
                f,
                "✗ {job_name} - failed after {:.2}s: {error}",
                duration.as_secs_f64()
            ),
            JobResult::Cancelled { job_name } => write!(f, "⚠ {job_name} - cancelled"),
        }
    }
}

/// Summary of a batch operation
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total_jobs: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration: Duration,
    /// In submission order
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn empty() -> Self {
        Self {
            total_jobs: 0,
            successful: 0,
            failed: 0,
            cancelled: false,
            duration: Duration::from_secs(0),
            results: Vec::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            100.0
        } else {
            (self.successful as f64 / self.total_jobs as f64) * 100.0
        }
    }

    pub fn cancelled_jobs(&self) -> usize {
        self.results.iter().filter(|r| r.is_cancelled()).count()
    }

    pub fn average_duration(&self) -> Option<Duration> {
        let durations: Vec<_> = self.results.iter().filter_map(|r| r.duration()).collect();
        if durations.is_empty() {
            None
        } else {
            let total: Duration = durations.iter().sum();
            Some(total / durations.len() as u32)
        }
    }

    pub fn output_files(&self) -> Vec<&PathBuf> {
        self.results
            .iter()
            .filter_map(|r| r.output_files())
            .flatten()
            .collect()
    }

    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| match r {
                JobResult::Failed {
                    job_name, error, ..
                } => Some((job_name.as_str(), error.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn format_report(&self) -> String {
        let mut report = format!(
            "Batch Processing Summary\n\
             ========================\n\
             Total Jobs: {}\n\
             Successful: {} ({:.1}%)\n\
             Failed: {}\n\
             Cancelled: {}\n\
             Duration: {:.2}s\n",
            self.total_jobs,
            self.successful,
            self.success_rate(),
            self.failed,
            self.cancelled_jobs(),
            self.duration.as_secs_f64()
        );

        let errors = self.errors();
        if !errors.is_empty() {
            report.push_str("\nErrors:\n");
            for (job, error) in errors {
                report.push_str(&format!("  - {job}: {error}\n"));
            }
        }
        report
    }
}
