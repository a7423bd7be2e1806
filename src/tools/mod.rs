pub mod archive;
pub mod backup;
pub mod checksum;
pub mod classify;
pub mod crypt;
pub mod dedup;
pub mod dns;
pub mod http;
pub mod json;
pub mod monitor;
pub mod ports;
pub mod rename;
pub mod search;
pub mod table;
pub mod watch;

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Outcome level of a single finding, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Error => "✗",
            Severity::Warning => "!",
            Severity::Info => "i",
            Severity::Ok => "✓",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "FAIL",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
            Severity::Ok => "OK",
        }
    }

    pub fn colored_label(&self) -> String {
        match self {
            Severity::Error => "FAIL".red().bold().to_string(),
            Severity::Warning => "WARN".yellow().bold().to_string(),
            Severity::Info => "INFO".blue().to_string(),
            Severity::Ok => "OK".green().to_string(),
        }
    }
}

/// A single line of tool output, grouped into report sections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Tool that produced this finding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl Finding {
    fn new(title: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            severity,
            detail: None,
            tool: None,
        }
    }

    pub fn ok(title: impl Into<String>) -> Self {
        Self::new(title, Severity::Ok)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(title, Severity::Info)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(title, Severity::Warning)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(title, Severity::Error)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

/// Validation failures shared by the tools
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid port specification `{0}`")]
    InvalidPortSpec(String),

    #[error("unsupported archive format: {} (only .zip is supported)", .0.display())]
    UnsupportedArchive(PathBuf),

    #[error("malformed checksum line {line}: {content}")]
    MalformedChecksumLine { line: usize, content: String },

    #[error("json path `{path}`: {reason}")]
    JsonPath { path: String, reason: String },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("cannot merge {}: headers differ from the first file", .file.display())]
    MergeMismatch { file: PathBuf },

    #[error("invalid sample size: {0}")]
    InvalidSample(String),

    #[error("not an encrypted toolkeep file: {}", .0.display())]
    NotEncrypted(PathBuf),

    #[error("cannot decrypt {}: wrong password or corrupted data", .0.display())]
    DecryptFailed(PathBuf),
}

/// Fail unless `path` is an existing directory
pub fn require_dir(path: &Path) -> Result<(), ToolError> {
    if !path.exists() {
        return Err(ToolError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ToolError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Copy a file and carry its modification time over to the copy
pub fn copy_preserving_mtime(from: &Path, to: &Path) -> std::io::Result<u64> {
    let bytes = std::fs::copy(from, to)?;
    let meta = std::fs::metadata(from)?;
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(to, mtime)?;
    Ok(bytes)
}

/// Human readable byte count: `0 B`, `1.5 KB`, `3.2 GB`
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".into();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Name component starting with a dot
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n != "." && n != "..")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_worst_last() {
        assert!(Severity::Ok < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Error.label(), "FAIL");
    }

    #[test]
    fn format_size_scales_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn require_dir_rejects_files_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(require_dir(dir.path()).is_ok());
        assert!(matches!(require_dir(&file), Err(ToolError::NotADirectory(_))));
        assert!(matches!(
            require_dir(&dir.path().join("missing")),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn copy_keeps_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, "hello").unwrap();
        let old = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, old).unwrap();

        copy_preserving_mtime(&src, &dst).unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn hidden_detection() {
        assert!(is_hidden(Path::new("/tmp/.git")));
        assert!(!is_hidden(Path::new("/tmp/src")));
        assert!(!is_hidden(Path::new(".")));
    }
}
