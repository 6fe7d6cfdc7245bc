//! Merging `udfpub.toml` with command-line flags

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use udfpub::config::{FileConfig, Settings, SourceArgs, TargetArgs};
use udfpub_core::FailurePolicy;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("udfpub.toml");
    fs::write(&path, content).expect("write config");
    path
}

#[test]
fn test_file_config_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        &dir,
        r#"
project_id = "moz-fx-data-shared-prod"
source_dirs = ["sql/udf", "sql/udf_js"]
gcs_bucket = "moz-fx-data-prod-bigquery-etl"
gcs_path = "udf_js_lib"
dependency_dir = "udf_js_lib"
skip = ["udf/legacy/udf.sql"]
failure_policy = "continue"
"#,
    );

    let file = FileConfig::from_file(&path)?;
    assert_eq!(file.project_id.as_deref(), Some("moz-fx-data-shared-prod"));
    assert_eq!(file.source_dirs.len(), 2);
    assert_eq!(file.failure_policy, Some(FailurePolicy::Continue));

    let settings = Settings::resolve(&file, &SourceArgs::default(), &TargetArgs::default())?;
    assert_eq!(
        settings.source_dirs,
        vec![PathBuf::from("sql/udf"), PathBuf::from("sql/udf_js")]
    );
    assert_eq!(settings.options.project_id, "moz-fx-data-shared-prod");
    assert_eq!(settings.options.bucket, "moz-fx-data-prod-bigquery-etl");
    assert_eq!(settings.options.path_prefix, "udf_js_lib");
    assert_eq!(settings.options.dependency_dir, Some(PathBuf::from("udf_js_lib")));
    assert!(settings.options.skip.contains("udf/legacy/udf.sql"));
    assert!(settings.options.skip.contains("udf/main_summary_scalars/udf.sql"));
    assert_eq!(settings.options.failure_policy, FailurePolicy::Continue);
    Ok(())
}

#[test]
fn test_flags_override_file() -> anyhow::Result<()> {
    let file = FileConfig {
        project_id: Some("from-file".to_string()),
        gcs_bucket: Some("file-bucket".to_string()),
        dependency_dir: Some(PathBuf::from("libs")),
        ..Default::default()
    };
    let target = TargetArgs {
        project_id: Some("from-flag".to_string()),
        dependency_dir: Some(PathBuf::new()),
        skip: vec!["udf/extra/udf.sql".to_string()],
        keep_going: true,
        ..Default::default()
    };

    let settings = Settings::resolve(&file, &SourceArgs::default(), &target)?;
    assert_eq!(settings.options.project_id, "from-flag");
    assert_eq!(settings.options.bucket, "file-bucket");
    // an empty directory disables staging
    assert_eq!(settings.options.dependency_dir, None);
    assert!(settings.options.skip.contains("udf/extra/udf.sql"));
    assert_eq!(settings.options.failure_policy, FailurePolicy::Continue);
    assert_eq!(
        settings.source_dirs,
        vec![PathBuf::from("udf"), PathBuf::from("udf_js")]
    );
    Ok(())
}

#[test]
fn test_missing_project_id_is_an_error() {
    let target = TargetArgs {
        gcs_bucket: Some("bucket".to_string()),
        ..Default::default()
    };
    let err = Settings::resolve(&FileConfig::default(), &SourceArgs::default(), &target)
        .expect_err("project id is required");
    assert!(err.to_string().contains("--project-id"));
}

#[test]
fn test_unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_config(&dir, "project = \"typo\"\n");
    assert!(FileConfig::from_file(&path).is_err());
}

#[test]
fn test_explicit_missing_config_fails() {
    let result = FileConfig::discover(Some(std::path::Path::new("/no/such/udfpub.toml")));
    assert!(result.is_err());
}
