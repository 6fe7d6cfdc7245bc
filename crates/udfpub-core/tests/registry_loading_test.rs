//! Loading UDF source trees from disk into a registry

use std::path::PathBuf;

use udfpub_core::{LoadError, Registry};
use udfpub_test_fixtures::{FixtureType, UdfTree};

#[test]
fn test_load_standard_tree() -> Result<(), Box<dyn std::error::Error>> {
    let tree = UdfTree::fixture(FixtureType::Standard)?;
    let registry = Registry::load(&tree.source_dirs(&["assert", "udf", "udf_js"]))?;

    let names: Vec<&str> = registry.names().collect();
    assert_eq!(
        names,
        vec![
            "assert.equals",
            "udf.bucket_scalars",
            "udf.get_key",
            "udf.main_summary_scalars",
            "udf.mode_last",
            "udf.parse_query",
            "udf.search_counts",
            "udf_js.decode_uri",
        ]
    );

    let mode_last = registry.get("udf.mode_last").ok_or("missing udf.mode_last")?;
    assert_eq!(mode_last.namespace, "udf");
    assert_eq!(mode_last.relative_path, "udf/mode_last/udf.sql");
    assert_eq!(mode_last.definitions.len(), 1);
    assert_eq!(mode_last.tests.len(), 1);
    assert!(mode_last.dependencies().is_empty());

    let search_counts = registry
        .get("udf.search_counts")
        .ok_or("missing udf.search_counts")?;
    assert_eq!(search_counts.definitions.len(), 2);
    assert_eq!(
        search_counts.dependencies(),
        vec!["udf.mode_last", "udf.get_key"]
    );
    Ok(())
}

#[test]
fn test_flat_layout_and_non_sql_files() -> Result<(), Box<dyn std::error::Error>> {
    let tree = UdfTree::new()?;
    tree.add_flat_function("udf", "one", "CREATE TEMP FUNCTION udf.one() AS (1);")?;
    std::fs::write(tree.source_dir("udf").join("README.md"), "# udf.readme\n")?;

    let registry = Registry::load(&[tree.source_dir("udf")])?;
    assert_eq!(registry.len(), 1);
    let one = registry.get("udf.one").ok_or("missing udf.one")?;
    assert_eq!(one.relative_path, "udf/one.sql");
    Ok(())
}

#[test]
fn test_trailing_slash_keeps_namespace() -> Result<(), Box<dyn std::error::Error>> {
    let tree = UdfTree::new()?;
    tree.add_function("udf_js", "noop", "CREATE TEMP FUNCTION udf_js.noop() AS (NULL);")?;

    let dir = PathBuf::from(format!("{}/", tree.source_dir("udf_js").display()));
    let registry = Registry::load(&[dir])?;
    assert!(registry.contains("udf_js.noop"));
    Ok(())
}

#[test]
fn test_duplicate_names_across_directories_fail() -> Result<(), Box<dyn std::error::Error>> {
    let tree = UdfTree::new()?;
    tree.add_function("a/udf", "dup", "CREATE TEMP FUNCTION udf.dup() AS (1);")?;
    tree.add_function("b/udf", "dup", "CREATE TEMP FUNCTION udf.dup() AS (2);")?;

    let err = Registry::load(&tree.source_dirs(&["a/udf", "b/udf"]))
        .err()
        .ok_or("expected duplicate error")?;
    match err {
        LoadError::DuplicateFunction { name, first, second } => {
            assert_eq!(name, "udf.dup");
            assert!(first.starts_with(tree.source_dir("a/udf")));
            assert!(second.starts_with(tree.source_dir("b/udf")));
        }
        other => return Err(format!("unexpected error: {other}").into()),
    }
    Ok(())
}

#[test]
fn test_file_without_definition_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tree = UdfTree::new()?;
    tree.add_function("udf", "empty", "SELECT 1;")?;

    let err = Registry::load(&[tree.source_dir("udf")])
        .err()
        .ok_or("expected load error")?;
    assert!(matches!(err, LoadError::NoDefinitions(_)));
    Ok(())
}

#[test]
fn test_missing_directory_fails() {
    let result = Registry::load(&[PathBuf::from("/definitely/not/here/udf")]);
    assert!(matches!(result, Err(LoadError::Walk(_))));
}
