//! Diagnosis of child-process failures from their stderr.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::DiagnosedCause;

static MISSING_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No module named ['"]?([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)['"]?"#)
        .expect("missing-module pattern is valid")
});

/// Import names whose distribution on the package index is named differently.
const DISTRIBUTION_ALIASES: [(&str, &str); 8] = [
    ("PIL", "Pillow"),
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("jwt", "PyJWT"),
    ("sklearn", "scikit-learn"),
    ("yaml", "PyYAML"),
];

/// Extract the top-level module named by a "module not found" error.
///
/// Returns `None` when stderr has no such error, or when it names more than one
/// distinct top-level module (the cause is then ambiguous).
pub fn missing_module(stderr: &str) -> Option<String> {
    let names: BTreeSet<String> = MISSING_MODULE_RE
        .captures_iter(stderr)
        .filter_map(|caps| caps.get(1))
        .map(|m| top_level(m.as_str()).to_string())
        .collect();
    if names.len() != 1 {
        return None;
    }
    names.into_iter().next()
}

/// First component of a dotted module path.
pub fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// Classify a failed run.
///
/// `sibling_dir_exists` reports whether a directory named after the module sits next
/// to the entry file; that makes the module a local package rather than an external one.
pub fn classify(stderr: &str, sibling_dir_exists: impl Fn(&str) -> bool) -> DiagnosedCause {
    match missing_module(stderr) {
        Some(module) if sibling_dir_exists(&module) => DiagnosedCause::MissingLocalPackage(module),
        Some(module) => DiagnosedCause::MissingExternalPackage(module),
        None => DiagnosedCause::Other,
    }
}

/// Name to hand to the package installer for an import name.
pub fn distribution_name(module: &str) -> String {
    let module = top_level(module);
    DISTRIBUTION_ALIASES
        .iter()
        .find(|(import, _)| *import == module)
        .map_or_else(|| module.to_string(), |(_, dist)| (*dist).to_string())
}
