//! Project layout tree: shape, invariants, and deterministic traversal.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::{Map, Value};

use crate::core::types::FileKind;

const LAYOUT_SCHEMA: &str = include_str!("../../schemas/layout.schema.json");

/// File names that mark the entry leaf, in order of preference.
pub const ENTRY_NAMES: [&str; 2] = ["main.py", "app.py"];
/// Maximum number of path components of any leaf.
pub const MAX_DEPTH: usize = 3;

/// Characters rejected anywhere in a layout name.
pub const FORBIDDEN_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// A node in the layout: a file with seed content or a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutNode {
    File { seed: String },
    Dir { children: Vec<(String, LayoutNode)> },
}

/// Validated project layout. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTree {
    pub project_name: String,
    pub children: Vec<(String, LayoutNode)>,
}

/// A file the materializer creates, addressed relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpec {
    /// `/`-separated path relative to the project root.
    pub relative_path: String,
    pub seed: String,
    pub kind: FileKind,
}

impl LeafSpec {
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    pub fn depth(&self) -> usize {
        self.relative_path.split('/').count()
    }

    pub fn is_entry(&self) -> bool {
        ENTRY_NAMES.contains(&self.file_name())
    }
}

impl LayoutTree {
    /// Build a layout from a parsed JSON document and check every invariant.
    pub fn from_value(value: &Value) -> Result<Self> {
        validate_schema(value)?;
        let project_name = value
            .get("project_name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("layout is missing project_name"))?
            .to_string();
        let structure = value
            .get("structure")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("layout structure must be an object"))?;
        let tree = Self {
            project_name,
            children: build_children(structure)?,
        };
        let errors = validate_invariants(&tree);
        if !errors.is_empty() {
            bail!("layout invariant violations:\n- {}", errors.join("\n- "));
        }
        Ok(tree)
    }

    /// All leaves in depth-first pre-order, following the order of the layout document.
    pub fn leaves(&self) -> Vec<LeafSpec> {
        let mut out = Vec::new();
        for (name, node) in &self.children {
            collect_leaves(name, node, &mut out);
        }
        out
    }

    /// All directories in depth-first pre-order (parents before children).
    pub fn directories(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, node) in &self.children {
            collect_dirs(name, node, &mut out);
        }
        out
    }

    /// The leaf the runner executes.
    ///
    /// Prefers the shallowest candidate, then `main.py` over `app.py`, then traversal order.
    pub fn entry_leaf(&self) -> Option<LeafSpec> {
        self.leaves()
            .into_iter()
            .filter(LeafSpec::is_entry)
            .min_by_key(|leaf| {
                let rank = ENTRY_NAMES
                    .iter()
                    .position(|name| *name == leaf.file_name())
                    .unwrap_or(ENTRY_NAMES.len());
                (leaf.depth(), rank)
            })
    }

    /// One leaf path per line, for prompts and reports.
    pub fn summary(&self) -> String {
        self.leaves()
            .iter()
            .map(|leaf| format!("- {}", leaf.relative_path))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(LAYOUT_SCHEMA).context("parse layout schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile layout schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("layout schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn build_children(map: &Map<String, Value>) -> Result<Vec<(String, LayoutNode)>> {
    let mut children = Vec::with_capacity(map.len());
    for (name, value) in map {
        let node = match value {
            Value::String(seed) => LayoutNode::File { seed: seed.clone() },
            Value::Null => LayoutNode::File {
                seed: String::new(),
            },
            Value::Object(inner) => LayoutNode::Dir {
                children: build_children(inner)?,
            },
            other => bail!("layout entry '{name}' has unsupported value {other}"),
        };
        children.push((name.clone(), node));
    }
    Ok(children)
}

fn collect_leaves(path: &str, node: &LayoutNode, out: &mut Vec<LeafSpec>) {
    match node {
        LayoutNode::File { seed } => {
            // Kind is checked by validate_invariants; unknown extensions never reach here.
            if let Some(kind) = FileKind::from_path(path) {
                out.push(LeafSpec {
                    relative_path: path.to_string(),
                    seed: seed.clone(),
                    kind,
                });
            }
        }
        LayoutNode::Dir { children } => {
            for (name, child) in children {
                collect_leaves(&format!("{path}/{name}"), child, out);
            }
        }
    }
}

fn collect_dirs(path: &str, node: &LayoutNode, out: &mut Vec<String>) {
    if let LayoutNode::Dir { children } = node {
        out.push(path.to_string());
        for (name, child) in children {
            collect_dirs(&format!("{path}/{name}"), child, out);
        }
    }
}

/// Check layout invariants:
/// - Every path component is a legal file name
/// - Every leaf extension is whitelisted
/// - No leaf is nested deeper than [`MAX_DEPTH`] components
/// - At least one leaf exists, and one of them is an entry leaf
pub fn validate_invariants(tree: &LayoutTree) -> Vec<String> {
    let mut errors = Vec::new();
    let mut tally = (0usize, false);
    for (name, node) in &tree.children {
        validate_node(name, name, node, 1, &mut errors, &mut tally);
    }
    let (leaf_count, has_entry) = tally;
    if leaf_count == 0 {
        errors.push("layout has no files".to_string());
    } else if !has_entry {
        errors.push(format!(
            "layout has no entry file (expected one of {})",
            ENTRY_NAMES.join(", ")
        ));
    }
    errors
}

/// `tally` accumulates `(leaf_count, has_entry)`.
fn validate_node(
    path: &str,
    name: &str,
    node: &LayoutNode,
    depth: usize,
    errors: &mut Vec<String>,
    tally: &mut (usize, bool),
) {
    if let Some(reason) = illegal_name_reason(name) {
        errors.push(format!("{path}: {reason}"));
    }
    if depth > MAX_DEPTH {
        errors.push(format!("{path}: nested deeper than {MAX_DEPTH} levels"));
    }
    match node {
        LayoutNode::File { .. } => {
            tally.0 += 1;
            if ENTRY_NAMES.contains(&name) {
                tally.1 = true;
            }
            if FileKind::from_path(name).is_none() {
                errors.push(format!(
                    "{path}: extension not in {{{}}}",
                    FileKind::ALLOWED_EXTENSIONS
                        .iter()
                        .map(|ext| format!(".{ext}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        LayoutNode::Dir { children } => {
            for (child_name, child) in children {
                validate_node(
                    &format!("{path}/{child_name}"),
                    child_name,
                    child,
                    depth + 1,
                    errors,
                    tally,
                );
            }
        }
    }
}

fn illegal_name_reason(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("empty name");
    }
    if name == "." || name == ".." {
        return Some("relative path component");
    }
    if name.chars().any(|c| FORBIDDEN_CHARS.contains(&c) || c.is_control()) {
        return Some("name contains a reserved character");
    }
    if name.ends_with(' ') || name.ends_with('.') {
        return Some("name ends with a space or dot");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout(structure: Value) -> Result<LayoutTree> {
        LayoutTree::from_value(&json!({ "project_name": "demo", "structure": structure }))
    }

    #[test]
    fn leaves_follow_document_order_depth_first() {
        let tree = layout(json!({
            "main.py": "",
            "utils": { "__init__.py": "", "helpers.py": "" },
            "README.md": "# demo",
            "config": { "settings.json": "{}" }
        }))
        .expect("layout");

        let paths: Vec<String> = tree.leaves().into_iter().map(|l| l.relative_path).collect();
        assert_eq!(
            paths,
            vec![
                "main.py",
                "utils/__init__.py",
                "utils/helpers.py",
                "README.md",
                "config/settings.json",
            ]
        );
        assert_eq!(tree.directories(), vec!["utils", "config"]);
    }

    #[test]
    fn entry_prefers_shallow_main() {
        let tree = layout(json!({
            "pkg": { "main.py": "" },
            "app.py": "",
            "main.py": ""
        }))
        .expect("layout");
        let entry = tree.entry_leaf().expect("entry");
        assert_eq!(entry.relative_path, "main.py");
    }

    #[test]
    fn entry_only_layout_is_accepted() {
        let tree = layout(json!({ "main.py": "" })).expect("layout");
        assert_eq!(tree.leaves().len(), 1);
        assert!(tree.entry_leaf().is_some());
    }

    #[test]
    fn empty_layout_is_rejected() {
        let err = layout(json!({})).unwrap_err();
        assert!(err.to_string().contains("no files"));
    }

    #[test]
    fn empty_directories_do_not_count_as_files() {
        let err = layout(json!({ "src": {} })).unwrap_err();
        assert!(err.to_string().contains("no files"));
    }

    #[test]
    fn missing_entry_is_rejected() {
        let err = layout(json!({ "lib.py": "" })).unwrap_err();
        assert!(err.to_string().contains("no entry file"));
    }

    #[test]
    fn disallowed_extension_is_rejected() {
        let err = layout(json!({ "main.py": "", "index.html": "" })).unwrap_err();
        assert!(err.to_string().contains("index.html"));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let err = layout(json!({
            "main.py": "",
            "a": { "b": { "c": { "d.py": "" } } }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("deeper than 3"));
    }

    #[test]
    fn illegal_names_are_rejected() {
        let err = layout(json!({ "main.py": "", "..": { "x.py": "" } })).unwrap_err();
        assert!(err.to_string().contains("relative path component"));

        let err = layout(json!({ "main.py": "", "a:b.py": "" })).unwrap_err();
        assert!(err.to_string().contains("reserved character"));
    }

    #[test]
    fn schema_rejects_wrong_shapes() {
        let err = LayoutTree::from_value(&json!({ "structure": { "main.py": "" } })).unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));

        let err = layout(json!({ "main.py": 3 })).unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn null_leaves_become_empty_seeds() {
        let tree = layout(json!({ "main.py": null })).expect("layout");
        assert_eq!(tree.leaves()[0].seed, "");
    }
}
