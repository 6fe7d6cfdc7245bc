//! Detection of cross-function references and library options in UDF bodies
//!
//! A reference is a namespace tag (`udf`, `udf_js` or `assert`) joined to a
//! local name by either `.` or `_`, e.g. `udf.mode_last` or `udf_js_decode`.
//! A library option is `library = "gs://<bucket>/<path>/<file>"`; only the
//! trailing file segment is captured. References that fall inside a library
//! option are not reported, so the two match kinds never overlap.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Namespace tags recognised as prefixes of a function reference
pub const NAMESPACE_TAGS: [&str; 3] = ["udf_js", "udf", "assert"];

// `udf_js` must come before `udf` so that `udf_js.foo` keeps the longer tag.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(udf_js|udf|assert)[._]([a-zA-Z0-9_]+)").expect("reference pattern is valid")
});

static LIBRARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"library = "gs://[^"]+/([^"]+)""#).expect("library pattern is valid")
});

static TEMP_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCREATE\s+(?:OR\s+REPLACE\s+)?TEMP(?:ORARY)?\s+FUNCTION\b")
        .expect("temp function pattern is valid")
});

/// A single occurrence of a call to another user-defined function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Byte range of the whole occurrence in the body
    pub span: (usize, usize),
    /// Namespace tag exactly as written
    pub tag: &'a str,
    /// Local function name exactly as written
    pub name: &'a str,
}

impl Reference<'_> {
    /// Registry key this reference resolves to
    pub fn logical_name(&self) -> String {
        format!("{}.{}", self.tag, self.name)
    }

    pub fn range(&self) -> Range<usize> {
        self.span.0..self.span.1
    }
}

/// A `library = "gs://..."` option assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryPath<'a> {
    /// Byte range of the whole `library = "..."` assignment
    pub span: (usize, usize),
    /// Path segment after the last `/` of the original location
    pub file: &'a str,
}

impl LibraryPath<'_> {
    pub fn range(&self) -> Range<usize> {
        self.span.0..self.span.1
    }
}

/// Iterate over every function reference in `body`, in text order.
pub fn references(body: &str) -> impl Iterator<Item = Reference<'_>> + '_ {
    let libraries: Vec<Range<usize>> = library_paths(body).map(|lib| lib.range()).collect();

    REFERENCE_RE.captures_iter(body).filter_map(move |caps| {
        let whole = caps.get(0)?;
        if libraries
            .iter()
            .any(|lib| whole.start() < lib.end && lib.start < whole.end())
        {
            tracing::trace!("ignoring reference inside library option: {}", whole.as_str());
            return None;
        }
        Some(Reference {
            span: (whole.start(), whole.end()),
            tag: caps.get(1)?.as_str(),
            name: caps.get(2)?.as_str(),
        })
    })
}

/// Iterate over every library option in `body`, in text order.
pub fn library_paths(body: &str) -> impl Iterator<Item = LibraryPath<'_>> + '_ {
    LIBRARY_RE.captures_iter(body).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(LibraryPath {
            span: (whole.start(), whole.end()),
            file: caps.get(1)?.as_str(),
        })
    })
}

/// Byte range of the first `CREATE [OR REPLACE] TEMP[ORARY] FUNCTION` head.
pub fn temp_function_head(body: &str) -> Option<Range<usize>> {
    TEMP_FUNCTION_RE.find(body).map(|m| m.range())
}

/// Whether `statement` (already stripped of leading comments) declares a
/// temporary function.
pub fn is_temp_function(statement: &str) -> bool {
    temp_function_head(statement).is_some_and(|head| head.start == 0)
}
