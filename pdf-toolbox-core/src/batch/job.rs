//! Batch job definitions and types

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::pipeline::Pipeline;
use crate::encryption::{decrypt_pdf, encrypt_pdf, EncryptOptions};
use crate::error::Result;
use crate::operations::{
    add_watermark, apply_header_footer, compress_pdf, merge_pdf_files, rotate_pdf_pages, split_pdf,
    CompressOptions, HeaderFooterOptions, MergeInput, MergeOptions, RotateOptions, SplitOptions,
    WatermarkOptions,
};

/// Status of a batch job
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

/// Type of batch job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    Compress,
    Encrypt,
    Decrypt,
    Rotate,
    Watermark,
    HeaderFooter,
    Merge,
    Split,
    Pipeline,
    Custom(String),
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Compress => write!(f, "Compress"),
            JobType::Encrypt => write!(f, "Encrypt"),
            JobType::Decrypt => write!(f, "Decrypt"),
            JobType::Rotate => write!(f, "Rotate"),
            JobType::Watermark => write!(f, "Watermark"),
            JobType::HeaderFooter => write!(f, "Header/Footer"),
            JobType::Merge => write!(f, "Merge"),
            JobType::Split => write!(f, "Split"),
            JobType::Pipeline => write!(f, "Process"),
            JobType::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A batch job to be processed
pub enum BatchJob {
    Compress {
        input: PathBuf,
        output: PathBuf,
        options: CompressOptions,
    },
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        options: EncryptOptions,
    },
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        password: String,
    },
    Rotate {
        input: PathBuf,
        output: PathBuf,
        options: RotateOptions,
    },
    Watermark {
        input: PathBuf,
        output: PathBuf,
        options: WatermarkOptions,
    },
    HeaderFooter {
        input: PathBuf,
        output: PathBuf,
        options: HeaderFooterOptions,
    },
    Merge {
        inputs: Vec<PathBuf>,
        output: PathBuf,
        options: MergeOptions,
    },
    Split {
        input: PathBuf,
        options: SplitOptions,
    },
    /// Every step of a shared pipeline on one file
    Pipeline {
        input: PathBuf,
        pipeline: Arc<Pipeline>,
    },
    /// Any operation; returns the files it wrote
    Custom {
        name: String,
        operation: Box<dyn FnOnce() -> Result<Vec<PathBuf>> + Send>,
    },
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

impl BatchJob {
    pub fn job_type(&self) -> JobType {
        match self {
            BatchJob::Compress { .. } => JobType::Compress,
            BatchJob::Encrypt { .. } => JobType::Encrypt,
            BatchJob::Decrypt { .. } => JobType::Decrypt,
            BatchJob::Rotate { .. } => JobType::Rotate,
            BatchJob::Watermark { .. } => JobType::Watermark,
            BatchJob::HeaderFooter { .. } => JobType::HeaderFooter,
            BatchJob::Merge { .. } => JobType::Merge,
            BatchJob::Split { .. } => JobType::Split,
            BatchJob::Pipeline { .. } => JobType::Pipeline,
            BatchJob::Custom { name, .. } => JobType::Custom(name.clone()),
        }
    }

    /// Get a display name for the job
    pub fn display_name(&self) -> String {
        match self {
            BatchJob::Merge { inputs, output, .. } => {
                format!("Merge {} files to {}", inputs.len(), file_name(output))
            }
            BatchJob::Rotate { input, options, .. } => format!(
                "Rotate {} by {}°",
                file_name(input),
                options.angle.to_degrees()
            ),
            BatchJob::Compress { input, options, .. } => {
                format!("Compress {} ({})", file_name(input), options.level)
            }
            BatchJob::Custom { name, .. } => name.clone(),
            other => match other.input_files().first() {
                Some(input) => format!("{} {}", other.job_type(), file_name(input)),
                None => other.job_type().to_string(),
            },
        }
    }

    /// Get input files for the job
    pub fn input_files(&self) -> Vec<&PathBuf> {
        match self {
            BatchJob::Compress { input, .. }
            | BatchJob::Encrypt { input, .. }
            | BatchJob::Decrypt { input, .. }
            | BatchJob::Rotate { input, .. }
            | BatchJob::Watermark { input, .. }
            | BatchJob::HeaderFooter { input, .. }
            | BatchJob::Split { input, .. }
            | BatchJob::Pipeline { input, .. } => vec![input],
            BatchJob::Merge { inputs, .. } => inputs.iter().collect(),
            BatchJob::Custom { .. } => vec![],
        }
    }

    /// Get output file for the job, when known before it runs
    pub fn output_file(&self) -> Option<PathBuf> {
        match self {
            BatchJob::Compress { output, .. }
            | BatchJob::Encrypt { output, .. }
            | BatchJob::Decrypt { output, .. }
            | BatchJob::Rotate { output, .. }
            | BatchJob::Watermark { output, .. }
            | BatchJob::HeaderFooter { output, .. }
            | BatchJob::Merge { output, .. } => Some(output.clone()),
            BatchJob::Pipeline { input, pipeline } => Some(pipeline.output_for(input)),
            BatchJob::Split { .. } | BatchJob::Custom { .. } => None,
        }
    }

    /// Run the job, returning the files written
    pub fn execute(self) -> Result<Vec<PathBuf>> {
        match self {
            BatchJob::Compress {
                input,
                output,
                options,
            } => {
                compress_pdf(&input, &output, &options)?;
                Ok(vec![output])
            }
            BatchJob::Encrypt {
                input,
                output,
                options,
            } => {
                encrypt_pdf(&input, &output, &options)?;
                Ok(vec![output])
            }
            BatchJob::Decrypt {
                input,
                output,
                password,
            } => {
                decrypt_pdf(&input, &output, &password)?;
                Ok(vec![output])
            }
            BatchJob::Rotate {
                input,
                output,
                options,
            } => {
                rotate_pdf_pages(&input, &output, &options)?;
                Ok(vec![output])
            }
            BatchJob::Watermark {
                input,
                output,
                options,
            } => {
                add_watermark(&input, &output, &options)?;
                Ok(vec![output])
            }
            BatchJob::HeaderFooter {
                input,
                output,
                options,
            } => {
                apply_header_footer(&input, &output, &options)?;
                Ok(vec![output])
            }
            BatchJob::Merge {
                inputs,
                output,
                options,
            } => {
                let inputs = inputs.into_iter().map(MergeInput::new).collect();
                merge_pdf_files(inputs, &output, options)?;
                Ok(vec![output])
            }
            BatchJob::Split { input, options } => split_pdf(&input, options),
            BatchJob::Pipeline { input, pipeline } => Ok(vec![pipeline.process(&input)?]),
            BatchJob::Custom { operation, .. } => operation(),
        }
    }
}

impl fmt::Debug for BatchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchJob")
            .field("type", &self.job_type())
            .field("inputs", &self.input_files())
            .field("output", &self.output_file())
            .finish()
    }
}
