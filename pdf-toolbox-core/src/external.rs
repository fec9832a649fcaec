//! Ghostscript, LibreOffice and Tesseract invoked as child processes

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{Result, ToolboxError};

#[cfg(windows)]
const GHOSTSCRIPT: &str = "gswin64c";
#[cfg(not(windows))]
const GHOSTSCRIPT: &str = "gs";

/// Program names or paths of the external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTools {
    pub ghostscript: PathBuf,
    pub soffice: PathBuf,
    pub tesseract: PathBuf,
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self {
            ghostscript: PathBuf::from(GHOSTSCRIPT),
            soffice: PathBuf::from("soffice"),
            tesseract: PathBuf::from("tesseract"),
        }
    }
}

impl ExternalTools {
    pub fn has_ghostscript(&self) -> bool {
        probe(&self.ghostscript, "--version")
    }

    pub fn has_soffice(&self) -> bool {
        probe(&self.soffice, "--version")
    }

    pub fn has_tesseract(&self) -> bool {
        probe(&self.tesseract, "--version")
    }
}

/// Whether `program <arg>` runs and exits successfully
pub fn probe(program: &Path, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a tool to completion, mapping a missing binary and a non-zero exit
/// status to errors. Returns the captured output on success.
pub fn run(program: &Path, args: &[&std::ffi::OsStr]) -> Result<Output> {
    let name = tool_name(program);
    debug!("Running {} {:?}", program.display(), args);

    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolboxError::ExternalToolMissing(name.clone())
        } else {
            ToolboxError::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("exited with an error")
            .trim()
            .to_string();
        return Err(ToolboxError::ExternalToolFailed {
            tool: name,
            message: format!("{message} ({})", output.status),
        });
    }
    Ok(output)
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_missing_program() {
        let program = Path::new("definitely-not-a-real-tool-4821");
        assert!(!probe(program, "--version"));
        match run(program, &[OsStr::new("--help")]) {
            Err(ToolboxError::ExternalToolMissing(name)) => {
                assert_eq!(name, "definitely-not-a-real-tool-4821")
            }
            other => panic!("expected ExternalToolMissing, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_status_is_reported() {
        match run(Path::new("sh"), &[OsStr::new("-c"), OsStr::new("echo boom >&2; exit 3")]) {
            Err(ToolboxError::ExternalToolFailed { tool, message }) => {
                assert_eq!(tool, "sh");
                assert!(message.starts_with("boom"));
            }
            other => panic!("expected ExternalToolFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let tools = ExternalTools::default();
        assert_eq!(tools.soffice, PathBuf::from("soffice"));
        assert_eq!(tools.tesseract, PathBuf::from("tesseract"));
    }
}
