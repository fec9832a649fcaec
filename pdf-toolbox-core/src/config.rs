//! Toolbox configuration
//!
//! Settings are read from a JSON file and then overridden by `PDFTOOLBOX_*`
//! environment variables. A missing file yields the defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::external::ExternalTools;
use crate::operations::CompressionLevel;

pub const ENV_CONFIG: &str = "PDFTOOLBOX_CONFIG";
pub const ENV_GS: &str = "PDFTOOLBOX_GS";
pub const ENV_SOFFICE: &str = "PDFTOOLBOX_SOFFICE";
pub const ENV_TESSERACT: &str = "PDFTOOLBOX_TESSERACT";
pub const ENV_OUTPUT_DIR: &str = "PDFTOOLBOX_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    /// Default directory for results; next to each input when unset
    pub output_dir: Option<PathBuf>,
    /// Replace existing output files
    pub overwrite: bool,
    pub ghostscript: Option<PathBuf>,
    pub soffice: Option<PathBuf>,
    pub tesseract: Option<PathBuf>,
    pub compression_level: CompressionLevel,
    pub ocr_language: String,
    /// Worker threads for batch runs
    pub parallelism: usize,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            overwrite: false,
            ghostscript: None,
            soffice: None,
            tesseract: None,
            compression_level: CompressionLevel::Medium,
            ocr_language: crate::ocr::DEFAULT_LANGUAGE.to_string(),
            parallelism: num_cpus::get().clamp(1, 8),
        }
    }
}

impl ToolboxConfig {
    /// Load from `path`, or from `$PDFTOOLBOX_CONFIG` when no path is given,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(ENV_CONFIG).map(PathBuf::from));

        let mut config = match path {
            Some(path) if path.exists() => {
                debug!("Reading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            Some(path) => {
                debug!("Configuration file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Override fields from the environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| env::var(key).ok());
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        let path_var = |key: &str| var(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        if let Some(gs) = path_var(ENV_GS) {
            self.ghostscript = Some(gs);
        }
        if let Some(soffice) = path_var(ENV_SOFFICE) {
            self.soffice = Some(soffice);
        }
        if let Some(tesseract) = path_var(ENV_TESSERACT) {
            self.tesseract = Some(tesseract);
        }
        if let Some(dir) = path_var(ENV_OUTPUT_DIR) {
            self.output_dir = Some(dir);
        }
    }

    /// External program locations with the configured overrides
    pub fn external_tools(&self) -> ExternalTools {
        let mut tools = ExternalTools::default();
        if let Some(gs) = &self.ghostscript {
            tools.ghostscript = gs.clone();
        }
        if let Some(soffice) = &self.soffice {
            tools.soffice = soffice.clone();
        }
        if let Some(tesseract) = &self.tesseract {
            tools.tesseract = tesseract.clone();
        }
        tools
    }
}
