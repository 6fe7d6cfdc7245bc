//! Rewriting temporary function definitions into their persistent form
//!
//! Both passes work on structured matches from [`crate::matcher`] and rebuild
//! the text rather than editing it in place. Rewriting is not idempotent:
//! applying it twice qualifies references twice.

use std::ops::Range;

use crate::matcher;
use crate::parse;

/// Statement head that replaces `CREATE TEMP FUNCTION`
pub const PERSISTENT_HEAD: &str = "CREATE OR REPLACE FUNCTION";

/// Rewrites definitions for one target project and dependency location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewriter {
    project_id: String,
    bucket: String,
    path_prefix: String,
}

impl Rewriter {
    pub fn new(
        project_id: impl Into<String>,
        bucket: impl Into<String>,
        path_prefix: impl Into<String>,
    ) -> Self {
        let mut path_prefix = path_prefix.into();
        if !path_prefix.is_empty() && !path_prefix.ends_with('/') {
            path_prefix.push('/');
        }
        Self {
            project_id: project_id.into(),
            bucket: bucket.into(),
            path_prefix,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Prefix inside the bucket, empty or ending in `/`
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Qualify references, then relocate library paths.
    pub fn rewrite(&self, definition: &str) -> String {
        let qualified = self.qualify_references(definition);
        self.relocate_libraries(&qualified)
    }

    /// Replace each `tag.name` / `tag_name` with `` `project`.tag.name ``.
    pub fn qualify_references(&self, text: &str) -> String {
        splice(
            text,
            matcher::references(text)
                .map(|reference| {
                    (
                        reference.range(),
                        self.qualified_name(reference.tag, reference.name),
                    )
                })
                .collect(),
        )
    }

    /// Point each `library = "gs://..."` option at the staged copy of its file.
    pub fn relocate_libraries(&self, text: &str) -> String {
        splice(
            text,
            matcher::library_paths(text)
                .map(|library| {
                    (
                        library.range(),
                        format!("library = \"{}\"", self.library_location(library.file)),
                    )
                })
                .collect(),
        )
    }

    pub fn qualified_name(&self, dataset: &str, name: &str) -> String {
        format!(
            "`{}`.{}.{}",
            self.project_id.replace('`', "\\`"),
            dataset,
            name
        )
    }

    pub fn library_location(&self, file: &str) -> String {
        format!("gs://{}/{}{}", self.bucket, self.path_prefix, file)
    }
}

/// Rewrite one definition for `project_id`, relocating libraries under
/// `gs://<gcs_bucket>/<gcs_path>`.
pub fn rewrite(definition: &str, project_id: &str, gcs_bucket: &str, gcs_path: &str) -> String {
    Rewriter::new(project_id, gcs_bucket, gcs_path).rewrite(definition)
}

/// Turn the temporary-function head into `CREATE OR REPLACE FUNCTION`.
///
/// The head must open the statement once leading comments are skipped; text
/// inside those comments is left alone.
pub fn to_persistent(definition: &str) -> String {
    let body = parse::strip_leading_comments(definition);
    let offset = definition.len() - body.len();

    match matcher::temp_function_head(body).filter(|head| head.start == 0) {
        Some(head) => splice(
            definition,
            vec![(offset + head.start..offset + head.end, PERSISTENT_HEAD.to_string())],
        ),
        None => definition.to_string(),
    }
}

/// Rebuild `text` with each range replaced. Ranges must be ordered and disjoint.
fn splice(text: &str, replacements: Vec<(Range<usize>, String)>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in replacements {
        out.push_str(&text[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_qualifies_reference() {
        let out = rewrite("SELECT udf.foo_bar(x)", "p", "b", "");
        assert_eq!(out, "SELECT `p`.udf.foo_bar(x)");
    }

    #[test]
    fn test_underscore_separator_becomes_dot() {
        let out = rewrite("SELECT udf_js_decode(x), assert_true(y)", "p", "b", "");
        assert_eq!(out, "SELECT `p`.udf_js.decode(x), `p`.assert.true(y)");
    }

    #[test]
    fn test_relocates_library() {
        let out = rewrite(
            r#"OPTIONS (library = "gs://some-bucket/lib/a.js")"#,
            "p",
            "dest-bucket",
            "out/",
        );
        assert_eq!(out, r#"OPTIONS (library = "gs://dest-bucket/out/a.js")"#);
    }

    #[test]
    fn test_path_prefix_gets_trailing_slash() {
        let rewriter = Rewriter::new("p", "dest-bucket", "out");
        assert_eq!(rewriter.library_location("a.js"), "gs://dest-bucket/out/a.js");
        let rewriter = Rewriter::new("p", "dest-bucket", "");
        assert_eq!(rewriter.library_location("a.js"), "gs://dest-bucket/a.js");
    }

    #[test]
    fn test_full_js_definition() {
        let definition = r#"CREATE TEMP FUNCTION udf_js.decode(raw STRING)
RETURNS STRING
LANGUAGE js AS """return decode(raw);"""
OPTIONS (library = "gs://old-bucket/udf_js_lib/decoder.js")"#;

        let out = to_persistent(&rewrite(definition, "my-project", "new-bucket", "libs/"));
        assert_eq!(
            out,
            r#"CREATE OR REPLACE FUNCTION `my-project`.udf_js.decode(raw STRING)
RETURNS STRING
LANGUAGE js AS """return decode(raw);"""
OPTIONS (library = "gs://new-bucket/libs/decoder.js")"#
        );
    }

    #[test]
    fn test_rewrite_is_not_idempotent() {
        let once = rewrite("udf.a()", "p", "b", "");
        let twice = rewrite(&once, "p", "b", "");
        assert_ne!(once, twice);
    }

    #[test]
    fn test_to_persistent_keeps_leading_comment() {
        let out = to_persistent("/* doc */\ncreate temporary function `p`.udf.a() AS (1)");
        assert_eq!(out, "/* doc */\nCREATE OR REPLACE FUNCTION `p`.udf.a() AS (1)");
        assert_eq!(to_persistent("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_to_persistent_ignores_head_inside_comment() {
        let text = "/* Wraps CREATE TEMP FUNCTION semantics */
                    -- create temp function in a line comment
                    CREATE TEMP FUNCTION udf.a() AS (1)";
        let out = to_persistent(&rewrite(text, "p", "b", ""));
        assert_eq!(
            out,
            "/* Wraps CREATE TEMP FUNCTION semantics */
             -- create temp function in a line comment
             CREATE OR REPLACE FUNCTION `p`.udf.a() AS (1)"
        );
    }

    #[test]
    fn test_to_persistent_needs_head_at_statement_start() {
        let text = "SELECT 'CREATE TEMP FUNCTION udf.a() AS (1)'";
        assert_eq!(to_persistent(text), text);
    }
}
