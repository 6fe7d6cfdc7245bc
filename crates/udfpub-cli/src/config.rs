//! Publish settings: `udfpub.toml` merged with command-line flags

use anyhow::{Context, Result};
use clap::builder::{OsStringValueParser, TypedValueParser};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use udfpub_core::{FailurePolicy, PublishOptions};

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "udfpub.toml";

/// Source directories scanned when neither flags nor the file name any
pub const DEFAULT_SOURCE_DIRS: &[&str] = &["udf", "udf_js"];

/// Contents of `udfpub.toml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub project_id: Option<String>,
    pub source_dirs: Vec<PathBuf>,
    pub gcs_bucket: Option<String>,
    pub gcs_path: Option<String>,

    /// An empty string disables staging
    pub dependency_dir: Option<PathBuf>,

    /// Relative paths added to the built-in skip-list
    pub skip: Vec<String>,
    pub failure_policy: Option<FailurePolicy>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `explicit` (which must exist), else `udfpub.toml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            debug!("Using {}", default.display());
            return Self::from_file(default);
        }
        Ok(Self::default())
    }
}

/// Where to look for UDF sources
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Directory of UDF sources; repeat for several namespaces
    #[arg(long = "source-dir", value_name = "DIR")]
    pub source_dirs: Vec<PathBuf>,
}

impl SourceArgs {
    /// Flags win over the config file, which wins over the built-in defaults.
    pub fn resolve(&self, file: &FileConfig) -> Vec<PathBuf> {
        if !self.source_dirs.is_empty() {
            self.source_dirs.clone()
        } else if !file.source_dirs.is_empty() {
            file.source_dirs.clone()
        } else {
            DEFAULT_SOURCE_DIRS.iter().map(PathBuf::from).collect()
        }
    }
}

/// Where functions and their libraries end up
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Project that receives the persistent functions
    #[arg(long, env = "UDFPUB_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Bucket that receives the JavaScript libraries
    #[arg(long, env = "UDFPUB_GCS_BUCKET")]
    pub gcs_bucket: Option<String>,

    /// Object-name prefix inside the bucket
    #[arg(long, env = "UDFPUB_GCS_PATH")]
    pub gcs_path: Option<String>,

    /// Local directory of libraries to stage; pass "" to skip staging
    #[arg(
        long,
        env = "UDFPUB_DEPENDENCY_DIR",
        value_parser = OsStringValueParser::new().map(PathBuf::from)
    )]
    pub dependency_dir: Option<PathBuf>,

    /// Additional file to leave out, relative to the sources' parent
    #[arg(long = "skip", value_name = "PATH")]
    pub skip: Vec<String>,

    /// Record failed functions and keep publishing the rest
    #[arg(long)]
    pub keep_going: bool,
}

/// Fully merged settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_dirs: Vec<PathBuf>,
    pub options: PublishOptions,
}

impl Settings {
    pub fn resolve(file: &FileConfig, sources: &SourceArgs, target: &TargetArgs) -> Result<Self> {
        let project_id = target
            .project_id
            .clone()
            .or_else(|| file.project_id.clone())
            .context("No project id: pass --project-id or set project_id in udfpub.toml")?;
        let bucket = target
            .gcs_bucket
            .clone()
            .or_else(|| file.gcs_bucket.clone())
            .context("No bucket: pass --gcs-bucket or set gcs_bucket in udfpub.toml")?;

        let mut options = PublishOptions::new(project_id, bucket);
        if let Some(prefix) = target.gcs_path.as_ref().or(file.gcs_path.as_ref()) {
            options = options.with_path_prefix(prefix.as_str());
        }

        options.dependency_dir = target
            .dependency_dir
            .as_ref()
            .or(file.dependency_dir.as_ref())
            .filter(|dir| !dir.as_os_str().is_empty())
            .cloned();

        for path in file.skip.iter().chain(&target.skip) {
            options = options.with_skip(path.as_str());
        }

        let policy = if target.keep_going {
            FailurePolicy::Continue
        } else {
            file.failure_policy.unwrap_or_default()
        };
        options = options.with_failure_policy(policy);

        Ok(Self {
            source_dirs: sources.resolve(file),
            options,
        })
    }
}
