//! Syntax checks for generated files.
//!
//! Python sources are parsed with tree-sitter; a tree containing error or missing
//! nodes means the reply needs a retry. The grammar also accepts a few Python 2
//! statements and a module-level `return`, which `python3` refuses to compile, so
//! those are rejected too. JSON data files must parse as JSON.

use std::cell::RefCell;

use tree_sitter::Parser;

use crate::core::types::FileKind;

thread_local! {
    static PYTHON_PARSER: RefCell<Option<Parser>> = RefCell::new({
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .ok()
            .map(|()| parser)
    });
}

/// Result of checking a cleaned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    Valid,
    /// Parse failed; the caller may retry within its budget.
    NeedsRetry(String),
}

/// Check cleaned text destined for `relative_path`.
///
/// Empty text always needs a retry. Files without a checker are accepted as-is.
pub fn check(relative_path: &str, kind: FileKind, text: &str) -> SyntaxCheck {
    if text.trim().is_empty() {
        return SyntaxCheck::NeedsRetry("empty reply".to_string());
    }
    match kind {
        FileKind::Source => check_python(text),
        FileKind::Data if relative_path.ends_with(".json") => check_json(text),
        FileKind::Data | FileKind::Doc => SyntaxCheck::Valid,
    }
}

fn check_python(text: &str) -> SyntaxCheck {
    let tree = PYTHON_PARSER.with(|cell| {
        cell.borrow_mut()
            .as_mut()
            .and_then(|parser| parser.parse(text, None))
    });
    let Some(tree) = tree else {
        return SyntaxCheck::NeedsRetry("python parser unavailable".to_string());
    };
    let root = tree.root_node();
    if root.has_error() {
        let line =
            first_error_line(&root).map_or_else(String::new, |row| format!(" near line {row}"));
        return SyntaxCheck::NeedsRetry(format!("python syntax error{line}"));
    }
    match first_rejected_statement(&root, false) {
        Some((problem, row)) => SyntaxCheck::NeedsRetry(format!("{problem} near line {row}")),
        None => SyntaxCheck::Valid,
    }
}

/// First statement the grammar parses but `python3` rejects, with its 1-based line.
fn first_rejected_statement(
    node: &tree_sitter::Node,
    in_function: bool,
) -> Option<(&'static str, usize)> {
    let problem = match node.kind() {
        "print_statement" => Some("python 2 print statement"),
        "exec_statement" => Some("python 2 exec statement"),
        "return_statement" if !in_function => Some("'return' outside function"),
        _ => None,
    };
    if let Some(problem) = problem {
        return Some((problem, node.start_position().row + 1));
    }
    // a class body is its own scope, even inside a function
    let in_function = match node.kind() {
        "function_definition" => true,
        "class_definition" => false,
        _ => in_function,
    };
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(found) = first_rejected_statement(&child, in_function) {
            return Some(found);
        }
    }
    None
}

/// 1-based line of the first error or missing node, if one can be located.
fn first_error_line(node: &tree_sitter::Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(row) = first_error_line(&child)
        {
            return Some(row);
        }
    }
    None
}

fn check_json(text: &str) -> SyntaxCheck {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(_) => SyntaxCheck::Valid,
        Err(err) => SyntaxCheck::NeedsRetry(format!("invalid json: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python(src: &str) -> SyntaxCheck {
        check("main.py", FileKind::Source, src)
    }

    fn assert_retry(result: SyntaxCheck, expected: &str) {
        match result {
            SyntaxCheck::NeedsRetry(issue) => {
                assert!(issue.contains(expected), "unexpected issue: {issue}");
            }
            SyntaxCheck::Valid => panic!("expected a retry mentioning {expected:?}"),
        }
    }

    #[test]
    fn valid_python_passes() {
        let src = "import sys\n\ndef main():\n    print('hello')\n\nif __name__ == '__main__':\n    main()\n";
        assert_eq!(python(src), SyntaxCheck::Valid);
    }

    #[test]
    fn broken_python_needs_retry() {
        assert_retry(python("def main(:\n    print('x'\n"), "python syntax error");
    }

    #[test]
    fn prose_is_not_python() {
        assert_ne!(
            python("Here is the code you asked for, it prints hello.\n"),
            SyntaxCheck::Valid
        );
    }

    #[test]
    fn python2_print_statement_needs_retry() {
        assert_retry(python("import os\nprint \"hello\"\n"), "print statement near line 2");
    }

    #[test]
    fn python2_exec_statement_needs_retry() {
        assert_retry(python("exec \"x = 1\"\n"), "exec statement near line 1");
    }

    #[test]
    fn module_level_return_needs_retry() {
        assert_retry(python("x = 1\nreturn x\n"), "'return' outside function near line 2");
    }

    #[test]
    fn return_in_class_body_needs_retry() {
        let src = "def make():\n    class Inner:\n        return 1\n    return Inner\n";
        assert_retry(python(src), "'return' outside function near line 3");
    }

    #[test]
    fn return_inside_functions_and_methods_passes() {
        let src = "def f():\n    return 1\n\nclass A:\n    def g(self):\n        if True:\n            return f()\n        return None\n\n@staticmethod\ndef h():\n    def inner():\n        return 2\n    return inner()\n";
        assert_eq!(python(src), SyntaxCheck::Valid);
    }

    #[test]
    fn empty_text_needs_retry() {
        assert_eq!(
            check("config.ini", FileKind::Data, "  \n"),
            SyntaxCheck::NeedsRetry("empty reply".to_string())
        );
    }

    #[test]
    fn json_is_parsed() {
        assert_eq!(
            check("settings.json", FileKind::Data, "{\"debug\": true}\n"),
            SyntaxCheck::Valid
        );
        assert_retry(
            check("settings.json", FileKind::Data, "{debug: true}\n"),
            "invalid json",
        );
    }

    #[test]
    fn ini_is_accepted_when_non_empty() {
        assert_eq!(
            check("setup.ini", FileKind::Data, "[app]\nname = demo\n"),
            SyntaxCheck::Valid
        );
    }
}
