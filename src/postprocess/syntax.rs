use serde::Serialize;
use std::cell::RefCell;
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

const FRAGMENT_WRAPPER: &str = "def __fragment__():";
const MAX_SNIPPET: usize = 40;

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A missing grammar surfaces as a None tree at parse time
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyntaxCheckError {
    #[error("generated test code is empty")]
    EmptyInput,

    #[error("syntax error at line {line}, column {column}: {message}\n    {offending_text}")]
    SyntaxInvalid {
        message: String,
        line: usize,
        column: usize,
        offending_text: String,
    },
}

/// Check that `code` parses as Python. Code that only parses once wrapped in
/// a function body (indented fragments, bare `return`/`yield`) is accepted.
pub fn check(code: &str) -> Result<(), SyntaxCheckError> {
    if code.trim().is_empty() {
        return Err(SyntaxCheckError::EmptyInput);
    }

    let Some(tree) = parse(code) else {
        return Err(SyntaxCheckError::SyntaxInvalid {
            message: "python grammar unavailable".to_string(),
            line: 1,
            column: 1,
            offending_text: String::new(),
        });
    };
    if !tree.root_node().has_error() {
        return Ok(());
    }

    if let Some(wrapped) = parse(&wrap_in_function(code)) {
        if !wrapped.root_node().has_error() {
            return Ok(());
        }
    }

    Err(describe(&tree, code))
}

fn parse(code: &str) -> Option<Tree> {
    PYTHON_PARSER.with(|parser| parser.borrow_mut().parse(code, None))
}

fn wrap_in_function(code: &str) -> String {
    let mut wrapped = String::with_capacity(code.len() + code.lines().count() * 4 + 32);
    wrapped.push_str(FRAGMENT_WRAPPER);
    wrapped.push('\n');
    for line in code.lines() {
        if !line.trim().is_empty() {
            wrapped.push_str("    ");
            wrapped.push_str(line);
        }
        wrapped.push('\n');
    }
    wrapped
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

fn describe(tree: &Tree, code: &str) -> SyntaxCheckError {
    let root = tree.root_node();
    let node = first_error(root).unwrap_or(root);
    let position = node.start_position();

    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = node.utf8_text(code.as_bytes()).unwrap_or_default();
        let first_line = text.lines().next().unwrap_or_default().trim();
        let snippet: String = first_line.chars().take(MAX_SNIPPET).collect();
        if snippet.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near `{}`", snippet)
        }
    };

    SyntaxCheckError::SyntaxInvalid {
        message,
        line: position.row + 1,
        column: position.column + 1,
        offending_text: code
            .lines()
            .nth(position.row)
            .unwrap_or_default()
            .to_string(),
    }
}
