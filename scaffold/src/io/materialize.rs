//! Project materializer: directories, files, and entry-file prelude injection.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::layout::{ENTRY_NAMES, LayoutTree, LeafSpec};
use crate::core::types::{FileArtifact, FileKind};

/// Prepended to entry files so sibling packages are importable when run directly.
pub const PRELUDE: &str = "import os\nimport sys\n\nsys.path.insert(0, os.path.dirname(os.path.abspath(__file__)))\n\n";

/// Writes the project tree under a fixed root.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of a `/`-separated project-relative path.
    pub fn path_of(&self, relative_path: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(relative_path.split('/'));
        path
    }

    /// Create every directory and leaf of `tree`, returning leaves in fill order.
    ///
    /// Leaves that already exist are left untouched, so running this twice yields the
    /// same tree. New leaves receive their seed content verbatim (entry leaves with a
    /// non-empty seed also get the prelude).
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn materialize(&self, tree: &LayoutTree) -> Result<Vec<LeafSpec>> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create project root {}", self.root.display()))?;
        for dir in tree.directories() {
            let path = self.path_of(&dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("create directory {}", path.display()))?;
        }

        let leaves = tree.leaves();
        for leaf in &leaves {
            let path = self.path_of(&leaf.relative_path);
            if path.exists() {
                debug!(path = %leaf.relative_path, "leaf exists, keeping");
                continue;
            }
            let contents = if leaf.is_entry() && !leaf.seed.trim().is_empty() {
                inject_prelude(&leaf.seed)
            } else {
                leaf.seed.clone()
            };
            write_text(&path, &contents)?;
        }
        debug!(leaves = leaves.len(), "layout materialized");
        Ok(leaves)
    }

    /// Write `text` to `relative_path`, injecting the prelude into entry files.
    ///
    /// Returns the artifact exactly as written to disk.
    pub fn write_file(&self, relative_path: &str, text: &str, kind: FileKind) -> Result<FileArtifact> {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        let content = if ENTRY_NAMES.contains(&file_name) {
            inject_prelude(text)
        } else {
            text.to_string()
        };
        let path = self.path_of(relative_path);
        write_text(&path, &content)?;
        debug!(path = %relative_path, bytes = content.len(), "file written");
        Ok(FileArtifact {
            relative_path: relative_path.to_string(),
            content,
            kind,
        })
    }

    /// Read a project file as UTF-8.
    pub fn read_file(&self, relative_path: &str) -> Result<String> {
        let path = self.path_of(relative_path);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

/// Prefix `text` with exactly one copy of [`PRELUDE`].
pub fn inject_prelude(text: &str) -> String {
    let body = text.replace(PRELUDE, "");
    format!("{PRELUDE}{body}")
}

/// `text` with a leading [`PRELUDE`] removed, if present.
pub fn strip_prelude(text: &str) -> &str {
    text.strip_prefix(PRELUDE).unwrap_or(text)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents.as_bytes()).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> LayoutTree {
        LayoutTree::from_value(&json!({
            "project_name": "demo",
            "structure": {
                "main.py": "",
                "utils": { "__init__.py": "", "helpers.py": "def f():\n    return 1\n" },
                "docs": { "README.md": "# Demo\n" },
                "empty": {}
            }
        }))
        .expect("layout")
    }

    #[test]
    fn materialize_creates_dirs_and_seeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("proj");
        let materializer = Materializer::new(&root);

        let leaves = materializer.materialize(&sample_tree()).expect("materialize");

        assert_eq!(leaves.len(), 4);
        assert!(root.join("empty").is_dir());
        assert_eq!(fs::read_to_string(root.join("main.py")).expect("main"), "");
        assert_eq!(
            fs::read_to_string(root.join("utils/helpers.py")).expect("helpers"),
            "def f():\n    return 1\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("docs/README.md")).expect("readme"),
            "# Demo\n"
        );
    }

    #[test]
    fn materialize_twice_does_not_truncate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let materializer = Materializer::new(temp.path());
        let tree = sample_tree();
        materializer.materialize(&tree).expect("first");
        materializer
            .write_file("utils/__init__.py", "VERSION = 1\n", FileKind::Source)
            .expect("write");

        let second = materializer.materialize(&tree).expect("second");

        assert_eq!(second, tree.leaves());
        assert_eq!(
            materializer.read_file("utils/__init__.py").expect("read"),
            "VERSION = 1\n"
        );
    }

    #[test]
    fn entry_files_get_prelude_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let materializer = Materializer::new(temp.path());

        let first = materializer
            .write_file("main.py", "print(\"hello\")\n", FileKind::Source)
            .expect("write");
        assert_eq!(first.content, format!("{PRELUDE}print(\"hello\")\n"));

        let again = materializer
            .write_file("main.py", &first.content, FileKind::Source)
            .expect("rewrite");
        assert_eq!(again.content, first.content);
        assert_eq!(again.content.matches(PRELUDE).count(), 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("main.py")).expect("read"),
            again.content
        );
    }

    #[test]
    fn nested_app_py_is_an_entry_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let materializer = Materializer::new(temp.path());
        let artifact = materializer
            .write_file("web/app.py", "x = 1\n", FileKind::Source)
            .expect("write");
        assert!(artifact.content.starts_with(PRELUDE));
        assert!(temp.path().join("web/app.py").is_file());
    }

    #[test]
    fn non_entry_files_are_written_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        let materializer = Materializer::new(temp.path());
        let artifact = materializer
            .write_file("config/settings.json", "{}\n", FileKind::Data)
            .expect("write");
        assert_eq!(artifact.content, "{}\n");
    }

    #[test]
    fn prelude_can_be_stripped() {
        let injected = inject_prelude("print(1)\n");
        assert_eq!(strip_prelude(&injected), "print(1)\n");
        assert_eq!(strip_prelude("print(1)\n"), "print(1)\n");
    }
}
