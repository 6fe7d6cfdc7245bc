//! Splitting UDF source files into definitions and test statements

use crate::matcher;

/// Statements found in a single UDF source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    /// `CREATE TEMP FUNCTION` statements, in file order
    pub definitions: Vec<String>,
    /// Every other statement (usually assertions exercising the function)
    pub tests: Vec<String>,
}

/// Parse the text of a UDF source file.
pub fn parse_source(text: &str) -> ParsedSource {
    let mut parsed = ParsedSource::default();

    for statement in split_statements(text) {
        if matcher::is_temp_function(strip_leading_comments(statement)) {
            parsed.definitions.push(statement.to_string());
        } else {
            parsed.tests.push(statement.to_string());
        }
    }

    parsed
}

/// Split SQL text on top-level `;`.
///
/// Quoted strings (including `"""` / `'''` blocks), backtick identifiers and
/// comments are skipped so a `;` inside them does not end a statement. The
/// returned slices are trimmed; statements containing only comments are dropped.
pub fn split_statements(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i + 2),
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b';' => {
                push_statement(&text[start..i], &mut statements);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    push_statement(&text[start..], &mut statements);

    statements
}

fn push_statement<'a>(raw: &'a str, statements: &mut Vec<&'a str>) {
    let statement = raw.trim();
    if !strip_leading_comments(statement).is_empty() {
        statements.push(statement);
    }
}

/// Remove leading whitespace and comments from a statement.
pub fn strip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    loop {
        if rest.starts_with("--") || rest.starts_with('#') {
            rest = match rest.find('\n') {
                Some(end) => rest[end + 1..].trim_start(),
                None => "",
            };
        } else if let Some(body) = rest.strip_prefix("/*") {
            rest = match body.find("*/") {
                Some(end) => body[end + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset + 1)
}

fn skip_block_comment(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |offset| from + offset + 2)
}

fn skip_quoted(bytes: &[u8], from: usize, quote: u8) -> usize {
    let triple = [quote; 3];
    let (mut i, closing): (usize, &[u8]) =
        if quote != b'`' && bytes[from..].starts_with(&triple) {
            (from + 3, &triple[..])
        } else {
            (from + 1, &triple[..1])
        };

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
        } else if bytes[i..].starts_with(closing) {
            return i + closing.len();
        } else {
            i += 1;
        }
    }
    bytes.len()
}
