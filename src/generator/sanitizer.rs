//! Turns raw model output into one clean pytest module.
//!
//! Fenced code blocks are pulled out with a two-state scanner (prose outside
//! fences is dropped), concatenated, and then cleaned: top-level imports are
//! hoisted and de-duplicated, `@pytest.fixture` definitions are kept once per
//! name (first wins), and a baseline header is prepended.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Imports every generated module starts with.
pub const BASELINE_IMPORTS: &[&str] = &["import os", "import pytest", "import requests"];

/// Fixtures every generated module can rely on, as (name, source).
pub const BASELINE_FIXTURES: &[(&str, &str)] = &[(
    "base_url",
    "@pytest.fixture\ndef base_url():\n    return os.environ.get(\"API_BASE_URL\", \"http://localhost:8000\")",
)];

/// Fence tags whose contents are treated as test source.
const CODE_TAGS: &[&str] = &["", "python", "py", "python3", "pytest"];

static FIXTURE_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex")
});

#[derive(Debug)]
struct CodeBlock {
    lines: Vec<String>,
    is_code: bool,
}

impl CodeBlock {
    fn open(tag: &str) -> Self {
        Self {
            lines: Vec::new(),
            is_code: CODE_TAGS.contains(&tag.to_ascii_lowercase().as_str()),
        }
    }
}

#[derive(Debug)]
enum ScanState {
    OutsideBlock,
    InsideBlock(CodeBlock),
}

#[derive(Debug, Clone)]
struct Fixture {
    name: String,
    lines: Vec<String>,
}

/// Returns the tag of a fence marker line (```python -> "python", ``` -> "").
fn fence_tag(line: &str) -> Option<&str> {
    line.trim().strip_prefix("```").map(str::trim)
}

/// Extract source from fenced blocks, in order. Input without any fence is
/// treated as a single implicit block.
pub fn extract_code_blocks(raw: &str) -> Vec<String> {
    let mut state = ScanState::OutsideBlock;
    let mut blocks: Vec<CodeBlock> = Vec::new();
    let mut saw_fence = false;

    for line in raw.lines() {
        state = match state {
            ScanState::OutsideBlock => match fence_tag(line) {
                Some(tag) => {
                    saw_fence = true;
                    ScanState::InsideBlock(CodeBlock::open(tag))
                }
                None => ScanState::OutsideBlock,
            },
            ScanState::InsideBlock(mut block) => match fence_tag(line) {
                Some("") => {
                    blocks.push(block);
                    ScanState::OutsideBlock
                }
                // A tagged fence while open: the model never closed the previous block
                Some(tag) => {
                    blocks.push(block);
                    ScanState::InsideBlock(CodeBlock::open(tag))
                }
                None => {
                    block.lines.push(line.to_string());
                    ScanState::InsideBlock(block)
                }
            },
        };
    }

    if let ScanState::InsideBlock(block) = state {
        blocks.push(block);
    }

    if !saw_fence {
        return vec![raw.to_string()];
    }

    blocks
        .into_iter()
        .filter(|b| b.is_code)
        .map(|b| b.lines.join("\n"))
        .collect()
}

/// Scan a line outside string literals: returns the net bracket depth
/// change and the byte offset of a trailing `#` comment, if any.
fn scan_line(line: &str) -> (i32, Option<usize>) {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '#' => return (depth, Some(idx)),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            },
        }
    }
    (depth, None)
}

/// The statement part of a line, without a trailing comment.
fn strip_comment(line: &str) -> &str {
    match scan_line(line).1 {
        Some(idx) => line[..idx].trim_end(),
        None => line.trim_end(),
    }
}

fn is_top_level_import(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let statement = strip_comment(line);
    // Multi-line parenthesized or continued imports stay in the body untouched
    if statement.ends_with('\\') || scan_line(statement).0 != 0 {
        return false;
    }
    statement.starts_with("import ")
        || (statement.starts_with("from ") && statement.contains(" import "))
}

fn is_fixture_marker(line: &str) -> bool {
    line.starts_with("@pytest.fixture") || line.starts_with("@fixture")
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Index just past the line where the brackets opened at `start` close.
fn bracketed_end(lines: &[String], start: usize) -> Option<usize> {
    let mut depth = 0;
    for (offset, line) in lines[start..].iter().enumerate() {
        depth += scan_line(line).0;
        if depth <= 0 {
            return Some(start + offset + 1);
        }
    }
    None
}

/// Read a decorated definition starting at an `@` line. Decorators may span
/// several lines and be separated from the `def` by blank or comment lines.
/// Returns the fixture and the index just past it, or None when the
/// decorators carry no fixture marker or no `def` follows them.
fn read_fixture(lines: &[String], start: usize) -> Option<(Fixture, usize)> {
    let mut i = start;
    let mut collected = Vec::new();
    let mut is_fixture = false;

    loop {
        let line = lines.get(i)?;
        if line.starts_with('@') {
            is_fixture |= is_fixture_marker(line);
            let end = bracketed_end(lines, i)?;
            collected.extend_from_slice(&lines[i..end]);
            i = end;
        } else if is_blank_or_comment(line) {
            collected.push(line.clone());
            i += 1;
        } else {
            break;
        }
    }
    if !is_fixture {
        return None;
    }

    let name = FIXTURE_DEF.captures(&lines[i])?[1].to_string();
    let end = bracketed_end(lines, i)?;
    collected.extend_from_slice(&lines[i..end]);
    i = end;

    // Body: indented or blank lines; two blank lines in a row end the definition
    let mut blank_run = 0;
    while i < lines.len() {
        let line = &lines[i];
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run >= 2 {
                break;
            }
        } else if line.starts_with(char::is_whitespace) {
            blank_run = 0;
        } else {
            break;
        }
        collected.push(line.clone());
        i += 1;
    }

    while collected.last().is_some_and(|l| l.trim().is_empty()) {
        collected.pop();
    }

    Some((
        Fixture {
            name,
            lines: collected,
        },
        i,
    ))
}

fn normalize_body(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut blank_run = 0;
    for line in lines {
        if line.trim().is_empty() {
            blank_run += 1;
            if out.is_empty() || blank_run > 2 {
                continue;
            }
            out.push(String::new());
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}

/// Clean a candidate source unit: hoist and de-duplicate imports, keep the
/// first definition of each fixture, and prepend the baseline header.
pub fn clean_source(source: &str) -> String {
    let lines: Vec<String> = source.lines().map(|l| l.trim_end().to_string()).collect();

    // Hoist imports first; fixtures are detected on the remaining lines
    let mut imports: Vec<String> = Vec::new();
    let mut rest: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if is_top_level_import(&line) {
            let statement = strip_comment(&line);
            if !imports.iter().any(|imp| strip_comment(imp) == statement) {
                imports.push(line);
            }
        } else {
            rest.push(line);
        }
    }

    let mut fixtures: Vec<Fixture> = Vec::new();
    let mut body: Vec<String> = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        if rest[i].starts_with('@') {
            if let Some((fixture, next)) = read_fixture(&rest, i) {
                if fixtures.iter().any(|f| f.name == fixture.name) {
                    debug!("Dropping duplicate fixture definition: {}", fixture.name);
                } else {
                    fixtures.push(fixture);
                }
                i = next;
                continue;
            }
        }

        body.push(rest[i].clone());
        i += 1;
    }

    let body = normalize_body(body);
    if imports.is_empty() && fixtures.is_empty() && body.is_empty() {
        return String::new();
    }

    let mut header: Vec<String> = BASELINE_IMPORTS.iter().map(|s| s.to_string()).collect();
    header.extend(
        imports
            .into_iter()
            .filter(|imp| !BASELINE_IMPORTS.contains(&strip_comment(imp))),
    );

    let mut all_fixtures: Vec<Fixture> = BASELINE_FIXTURES
        .iter()
        .filter(|(name, _)| !fixtures.iter().any(|f| f.name == *name))
        .map(|(name, src)| Fixture {
            name: name.to_string(),
            lines: src.lines().map(str::to_string).collect(),
        })
        .collect();
    all_fixtures.extend(fixtures);

    let mut out = header.join("\n");
    for fixture in &all_fixtures {
        out.push_str("\n\n\n");
        out.push_str(&fixture.lines.join("\n"));
    }
    if !body.is_empty() {
        out.push_str("\n\n\n");
        out.push_str(&body.join("\n"));
    }
    out.push('\n');
    out
}

/// Full sanitization: fence extraction followed by cleanup.
pub fn sanitize(raw: &str) -> String {
    let blocks = extract_code_blocks(raw);
    debug!("Extracted {} code block(s) from model output", blocks.len());
    clean_source(&blocks.join("\n\n"))
}
