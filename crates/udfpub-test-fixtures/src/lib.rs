//! Test fixtures for udfpub
//!
//! Builds throwaway UDF source trees on disk, laid out the way a real
//! repository is: one directory per namespace, one `udf.sql` per function,
//! plus a directory of JavaScript libraries to stage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Name of the dependency directory inside every fixture tree
pub const DEPENDENCY_DIR: &str = "udf_js_lib";

/// Preset fixture trees
pub enum FixtureType {
    /// Cross-namespace references, overloads, a JS library and a skip-listed file
    Standard,
    /// `udf.ping` and `udf.pong` call each other
    Cycle,
    /// `udf.broken` calls a function that does not exist
    Unresolved,
}

/// A temporary directory holding UDF sources
pub struct UdfTree {
    dir: TempDir,
}

impl UdfTree {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn fixture(fixture_type: FixtureType) -> io::Result<Self> {
        let tree = Self::new()?;
        match fixture_type {
            FixtureType::Standard => tree.setup_standard()?,
            FixtureType::Cycle => tree.setup_cycle()?,
            FixtureType::Unresolved => tree.setup_unresolved()?,
        }
        Ok(tree)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory for `namespace`, which may itself be a relative path such as `a/udf`
    pub fn source_dir(&self, namespace: &str) -> PathBuf {
        self.root().join(namespace)
    }

    pub fn source_dirs(&self, namespaces: &[&str]) -> Vec<PathBuf> {
        namespaces.iter().map(|ns| self.source_dir(ns)).collect()
    }

    pub fn dependency_dir(&self) -> PathBuf {
        self.root().join(DEPENDENCY_DIR)
    }

    /// Write `<namespace>/<name>/udf.sql`.
    pub fn add_function(&self, namespace: &str, name: &str, sql: &str) -> io::Result<PathBuf> {
        let dir = self.source_dir(namespace).join(name);
        fs::create_dir_all(&dir)?;
        let path = dir.join("udf.sql");
        fs::write(&path, sql)?;
        Ok(path)
    }

    /// Write `<namespace>/<name>.sql`.
    pub fn add_flat_function(&self, namespace: &str, name: &str, sql: &str) -> io::Result<PathBuf> {
        let dir = self.source_dir(namespace);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.sql", name));
        fs::write(&path, sql)?;
        Ok(path)
    }

    /// Write a file below the dependency directory.
    pub fn add_dependency(&self, relative: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dependency_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn setup_standard(&self) -> io::Result<()> {
        self.add_function(
            "assert",
            "equals",
            r#"CREATE TEMP FUNCTION assert.equals(expected ANY TYPE, actual ANY TYPE) AS (
  IF(expected = actual, TRUE, ERROR(FORMAT('Expected %T but got %T', expected, actual)))
);"#,
        )?;

        self.add_function(
            "udf",
            "mode_last",
            r#"/*
Returns the most frequently occuring element in an array.
In the case of multiple values tied for the highest count, it returns the value
that appears latest in the array.
*/
CREATE TEMP FUNCTION udf.mode_last(list ANY TYPE) AS (
  (
    SELECT
      _value
    FROM
      UNNEST(list) AS _value
      WITH OFFSET AS _offset
    GROUP BY
      _value
    ORDER BY
      COUNT(_value) DESC,
      MAX(_offset) DESC
    LIMIT
      1
  )
);

-- Tests
SELECT
  assert.equals(1, udf.mode_last([1, 2, 1]));"#,
        )?;

        self.add_function(
            "udf",
            "get_key",
            r#"CREATE TEMP FUNCTION udf.get_key(map ANY TYPE, k ANY TYPE) AS (
  (SELECT key_value.value FROM UNNEST(map) AS key_value WHERE key_value.key = k LIMIT 1)
);"#,
        )?;

        self.add_function(
            "udf",
            "search_counts",
            r#"CREATE TEMP FUNCTION udf_search_counts(map ANY TYPE) AS (
  udf_mode_last(ARRAY(SELECT udf.get_key(map, 'sap') FROM UNNEST([1])))
);
CREATE TEMP FUNCTION udf_search_counts(map ANY TYPE, engine STRING) AS (
  udf.get_key(map, engine)
);"#,
        )?;

        self.add_function(
            "udf",
            "main_summary_scalars",
            r#"CREATE TEMP FUNCTION udf.main_summary_scalars(payload ANY TYPE) AS (
  payload.scalars
);"#,
        )?;

        self.add_function(
            "udf",
            "bucket_scalars",
            r#"CREATE TEMP FUNCTION udf.bucket_scalars(payload ANY TYPE) AS (
  ARRAY_LENGTH(udf.main_summary_scalars(payload))
);"#,
        )?;

        self.add_function(
            "udf_js",
            "decode_uri",
            r#"CREATE TEMP FUNCTION udf_js.decode_uri(input STRING)
RETURNS STRING
LANGUAGE js AS """
  return decodeURIComponent(input);
"""
OPTIONS (library = "gs://old-bucket/udf_js_lib/uri.js");"#,
        )?;

        self.add_function(
            "udf",
            "parse_query",
            r#"CREATE TEMP FUNCTION udf.parse_query(query STRING) AS (
  udf.get_key(
    ARRAY(SELECT AS STRUCT SPLIT(kv, '=')[OFFSET(0)] AS key, udf_js.decode_uri(SPLIT(kv, '=')[OFFSET(1)]) AS value
          FROM UNNEST(SPLIT(query, '&')) AS kv),
    'q'
  )
);"#,
        )?;

        self.add_dependency("uri.js", "function decodeAll(s) { return decodeURIComponent(s); }\n")?;
        self.add_dependency("vendor/pako.min.js", "/* pako */\n")?;
        Ok(())
    }

    fn setup_cycle(&self) -> io::Result<()> {
        self.add_function(
            "udf",
            "ping",
            "CREATE TEMP FUNCTION udf.ping(n INT64) AS (IF(n <= 0, 0, udf.pong(n - 1)));",
        )?;
        self.add_function(
            "udf",
            "pong",
            "CREATE TEMP FUNCTION udf.pong(n INT64) AS (IF(n <= 0, 1, udf.ping(n - 1)));",
        )?;
        Ok(())
    }

    fn setup_unresolved(&self) -> io::Result<()> {
        self.add_function("udf", "ok", "CREATE TEMP FUNCTION udf.ok() AS (1);")?;
        self.add_function(
            "udf",
            "broken",
            "CREATE TEMP FUNCTION udf.broken() AS (udf.ok() + udf.does_not_exist());",
        )?;
        Ok(())
    }
}
