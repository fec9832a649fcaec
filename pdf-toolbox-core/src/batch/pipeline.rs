//! The same chain of operations applied to every file of a batch

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, info};

use crate::document;
use crate::encryption::{decrypt_document, encrypt_document, EncryptOptions};
use crate::error::{Result, ToolboxError};
use crate::files::{file_size, stem_of};
use crate::operations::compress::compress_document;
use crate::operations::header_footer::apply_header_footer_to;
use crate::operations::rotate::rotate_document;
use crate::operations::watermark::apply_watermark;
use crate::operations::{
    CompressionLevel, HeaderFooterOptions, PageSelection, RotationAngle, WatermarkContent,
    WatermarkOptions,
};

pub const OUTPUT_SUFFIX: &str = "_processed";
pub const DEFAULT_WATERMARK: &str = "水印";

/// One operation of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStep {
    Compress(CompressionLevel),
    Encrypt {
        user_password: String,
        owner_password: String,
    },
    Decrypt {
        password: String,
    },
    Rotate(RotationAngle),
    Watermark(String),
    HeaderFooter {
        header: String,
        footer: String,
    },
}

impl PipelineStep {
    /// Decryption has to come first and encryption last
    fn rank(&self) -> u8 {
        match self {
            PipelineStep::Decrypt { .. } => 0,
            PipelineStep::Encrypt { .. } => 2,
            _ => 1,
        }
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            PipelineStep::Compress(level) => {
                compress_document(doc, *level, None)?;
            }
            PipelineStep::Encrypt {
                user_password,
                owner_password,
            } => {
                let mut options = EncryptOptions::new(user_password.clone());
                options.owner_password = owner_password.clone();
                encrypt_document(doc, &options)?;
            }
            PipelineStep::Decrypt { password } => decrypt_document(doc, password)?,
            PipelineStep::Rotate(angle) => {
                rotate_document(doc, *angle, &PageSelection::All)?;
            }
            PipelineStep::Watermark(text) => {
                let text = if text.trim().is_empty() {
                    DEFAULT_WATERMARK
                } else {
                    text.as_str()
                };
                let options = WatermarkOptions {
                    content: WatermarkContent::text(text),
                    ..Default::default()
                };
                apply_watermark(doc, &options)?;
            }
            PipelineStep::HeaderFooter { header, footer } => {
                let options = HeaderFooterOptions {
                    header: header.clone(),
                    footer: footer.clone(),
                    page_number_format: String::new(),
                    ..Default::default()
                };
                apply_header_footer_to(doc, &options)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::Compress(level) => write!(f, "compress ({level})"),
            PipelineStep::Encrypt { .. } => f.write_str("encrypt"),
            PipelineStep::Decrypt { .. } => f.write_str("decrypt"),
            PipelineStep::Rotate(angle) => write!(f, "rotate {}°", angle.to_degrees()),
            PipelineStep::Watermark(_) => f.write_str("watermark"),
            PipelineStep::HeaderFooter { .. } => f.write_str("header/footer"),
        }
    }
}

/// Ordered steps and the directory results go to
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    pub output_dir: PathBuf,
}

impl Pipeline {
    /// Steps keep their order, except that a decrypt step moves to the front
    /// and an encrypt step to the back.
    pub fn new<P: Into<PathBuf>>(mut steps: Vec<PipelineStep>, output_dir: P) -> Result<Self> {
        if steps.is_empty() {
            return Err(ToolboxError::InvalidOption(
                "no batch operation selected".to_string(),
            ));
        }
        for step in &steps {
            match step {
                PipelineStep::Encrypt { user_password, .. } if user_password.is_empty() => {
                    return Err(ToolboxError::InvalidOption(
                        "encryption password must not be empty".to_string(),
                    ))
                }
                PipelineStep::Decrypt { password } if password.is_empty() => {
                    return Err(ToolboxError::InvalidOption(
                        "decryption password must not be empty".to_string(),
                    ))
                }
                _ => {}
            }
        }
        steps.sort_by_key(PipelineStep::rank);
        Ok(Self {
            steps,
            output_dir: output_dir.into(),
        })
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn output_for(&self, input: &Path) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.pdf", stem_of(input), OUTPUT_SUFFIX))
    }

    /// Load `input` once, run every step and write the result. Returns the
    /// output path.
    pub fn process(&self, input: &Path) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(ToolboxError::FileNotFound(input.to_path_buf()));
        }
        let decrypts = matches!(self.steps.first(), Some(PipelineStep::Decrypt { .. }));
        let mut doc = if decrypts {
            document::load_raw(input)?
        } else {
            document::load(input, None)?
        };

        for step in &self.steps {
            debug!("{}: {}", input.display(), step);
            step.apply(&mut doc)?;
        }

        fs::create_dir_all(&self.output_dir)?;
        let output = self.output_for(input);
        let size = document::save(&mut doc, &output)?;
        info!(
            "Processed {} -> {} ({} -> {} bytes)",
            input.display(),
            output.display(),
            file_size(input),
            size
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{decrypt_pdf, encrypt_pdf, is_encrypted};
    use crate::test_support::write_sample;
    use crate::text::extract_pages;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_steps_are_ordered() {
        let pipeline = Pipeline::new(
            vec![
                PipelineStep::Encrypt {
                    user_password: "u".to_string(),
                    owner_password: String::new(),
                },
                PipelineStep::Rotate(RotationAngle::Clockwise90),
                PipelineStep::Decrypt {
                    password: "p".to_string(),
                },
                PipelineStep::Compress(CompressionLevel::Low),
            ],
            "out",
        )
        .unwrap();
        let names: Vec<String> = pipeline.steps().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["decrypt", "rotate 90°", "compress (low)", "encrypt"]);
    }

    #[test]
    fn test_rejects_empty_pipeline_and_passwords() {
        assert!(Pipeline::new(vec![], "out").is_err());
        assert!(Pipeline::new(
            vec![PipelineStep::Decrypt {
                password: String::new()
            }],
            "out"
        )
        .is_err());
    }

    #[test]
    fn test_process_rotate_and_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "report.pdf", 2);
        let pipeline = Pipeline::new(
            vec![
                PipelineStep::Rotate(RotationAngle::Rotate180),
                PipelineStep::HeaderFooter {
                    header: "Quarterly".to_string(),
                    footer: String::new(),
                },
                PipelineStep::Watermark(String::new()),
                PipelineStep::Compress(CompressionLevel::Medium),
            ],
            dir.path().join("out"),
        )
        .unwrap();

        let output = pipeline.process(&input).unwrap();
        assert_eq!(output, dir.path().join("out").join("report_processed.pdf"));

        let doc = document::load(&output, None).unwrap();
        for id in document::page_ids(&doc) {
            assert_eq!(document::page_rotation(&doc, id), 180);
        }
        let text = extract_pages(&doc).unwrap().join("\n");
        assert!(text.contains("Quarterly"));
        assert!(text.contains("Page 2"));
    }

    #[test]
    fn test_process_reencrypts_with_new_password() {
        let dir = tempfile::tempdir().unwrap();
        let plain = write_sample(dir.path(), "plain.pdf", 1);
        let locked = dir.path().join("locked.pdf");
        encrypt_pdf(&plain, &locked, &EncryptOptions::new("old")).unwrap();

        let pipeline = Pipeline::new(
            vec![
                PipelineStep::Encrypt {
                    user_password: "new".to_string(),
                    owner_password: "owner".to_string(),
                },
                PipelineStep::Decrypt {
                    password: "old".to_string(),
                },
            ],
            dir.path(),
        )
        .unwrap();
        let output = pipeline.process(&locked).unwrap();
        assert!(is_encrypted(&output).unwrap());

        let reopened = dir.path().join("reopened.pdf");
        assert!(decrypt_pdf(&output, &reopened, "old").is_err());
        decrypt_pdf(&output, &reopened, "new").unwrap();
        let doc = document::load(&reopened, None).unwrap();
        assert_eq!(document::page_count(&doc), 1);
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline =
            Pipeline::new(vec![PipelineStep::Compress(CompressionLevel::Low)], dir.path()).unwrap();
        assert!(matches!(
            pipeline.process(&dir.path().join("gone.pdf")),
            Err(ToolboxError::FileNotFound(_))
        ));
    }
}
