//! Generation context: files already written, in the order they were written.

use serde_json::{Map, Value};

use crate::core::types::FileArtifact;

/// Insertion-ordered, path-unique collection of written artifacts.
///
/// Grows monotonically during a run. Re-inserting a path replaces its content in
/// place without changing its position.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    artifacts: Vec<FileArtifact>,
}

/// JSON rendering of a context under a byte budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContext {
    /// Pretty-printed `{ path: content }` object.
    pub json: String,
    /// Paths left out because they did not fit.
    pub omitted: Vec<String>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: FileArtifact) {
        match self
            .artifacts
            .iter_mut()
            .find(|existing| existing.relative_path == artifact.relative_path)
        {
            Some(existing) => *existing = artifact,
            None => self.artifacts.push(artifact),
        }
    }

    /// Render as a `path -> content` JSON object no larger than `budget_bytes`.
    ///
    /// Files are considered in insertion order; one that would overflow the budget
    /// is skipped and later, smaller files may still be included.
    pub fn render(&self, budget_bytes: usize) -> RenderedContext {
        let mut map = Map::new();
        let mut omitted = Vec::new();
        let mut used = 2usize; // "{}"
        for artifact in &self.artifacts {
            let cost = entry_cost(artifact);
            if used + cost > budget_bytes {
                omitted.push(artifact.relative_path.clone());
                continue;
            }
            used += cost;
            map.insert(
                artifact.relative_path.clone(),
                Value::String(artifact.content.clone()),
            );
        }
        let json = serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_default();
        RenderedContext { json, omitted }
    }
}

/// Approximate serialized size of one `"path": "content",` entry.
fn entry_cost(artifact: &FileArtifact) -> usize {
    let key = Value::String(artifact.relative_path.clone()).to_string();
    let value = Value::String(artifact.content.clone()).to_string();
    key.len() + value.len() + 8
}
