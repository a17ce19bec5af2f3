//! Shared deterministic types for the scaffolding pipeline.
//!
//! These types define stable contracts between components. They carry no I/O
//! handles and cross component boundaries by value.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The operator's request: what to build and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Free-form natural-language description, passed to the oracle verbatim.
    pub description: String,
    /// Absolute filesystem root of the generated project.
    pub root: PathBuf,
}

impl Task {
    pub fn new(description: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            description: description.into(),
            root: root.into(),
        }
    }
}

/// Classification of a layout leaf by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// `.py`
    Source,
    /// `.json`, `.ini`
    Data,
    /// `.md`
    Doc,
}

impl FileKind {
    /// Extensions accepted in a layout, without the leading dot.
    pub const ALLOWED_EXTENSIONS: [&'static str; 4] = ["py", "md", "json", "ini"];

    /// Classify a relative path by its extension. `None` if not whitelisted.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, ext) = path.rsplit_once('.')?;
        match ext {
            "py" => Some(Self::Source),
            "json" | "ini" => Some(Self::Data),
            "md" => Some(Self::Doc),
            _ => None,
        }
    }

    /// Whether leaves of this kind are filled by the oracle in phase C.
    pub fn is_generated(self) -> bool {
        !matches!(self, Self::Doc)
    }
}

/// A file written to disk. The content always matches the on-disk bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileArtifact {
    pub relative_path: String,
    pub content: String,
    pub kind: FileKind,
}

/// Runner's diagnosis of why a child run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "module", rename_all = "snake_case")]
pub enum DiagnosedCause {
    None,
    MissingExternalPackage(String),
    MissingLocalPackage(String),
    Other,
}

/// A bounded remedy the runner applied before relaunching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recovery {
    ExtendSearchPath { module: String, dir: PathBuf },
    InstallPackage { module: String, package: String, installed: bool },
}

/// Result of executing the entry file, after any recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Exit code of the last launch; `None` when killed by a signal or timeout.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub diagnosed_cause: DiagnosedCause,
    /// Recoveries applied, in order. At most one per category.
    pub recoveries: Vec<Recovery>,
}

/// Reviewer verdict from the self-validation phase. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved { reason: String },
    Rejected { reason: String },
    /// The reply did not start with YES or NO.
    Inconclusive { raw: String },
    /// The oracle could not be reached.
    Unavailable,
}
