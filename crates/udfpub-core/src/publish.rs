//! Publish driver: staging, closure resolution and exactly-once submission
//!
//! Remote services are reached only through [`Warehouse`] and [`ObjectStore`],
//! so the driver can be exercised against in-memory implementations.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{LoadError, PublishError, RemoteError};
use crate::registry::Registry;
use crate::resolver::DependencyResolver;
use crate::rewriter::{self, Rewriter};

/// Files that are never published, relative to the source directories' parent
pub const DEFAULT_SKIP: &[&str] = &["udf/main_summary_scalars/udf.sql"];

/// Executes a complete function-creation statement
pub trait Warehouse {
    fn submit(&mut self, statement: &str) -> Result<(), RemoteError>;
}

/// Uploads a local file to `gs://<bucket>/<destination>`
pub trait ObjectStore {
    fn upload(&mut self, bucket: &str, destination: &str, local: &Path)
        -> Result<(), RemoteError>;
}

/// What to do when one requested function cannot be published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the run at the first failure
    #[default]
    Abort,
    /// Record the failure and move on to the next requested function
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!(
                "unknown failure policy '{}', expected 'abort' or 'continue'",
                other
            )),
        }
    }
}

/// Stage of a publish run; runs only ever move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Scanning,
    RegistryBuilt,
    Staging,
    Publishing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Scanning => "scanning",
            RunState::RegistryBuilt => "registry-built",
            RunState::Staging => "staging",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub project_id: String,
    pub bucket: String,
    pub path_prefix: String,
    /// Local files to stage before publishing; `None` disables staging
    pub dependency_dir: Option<PathBuf>,
    /// Relative file paths never submitted
    pub skip: HashSet<String>,
    pub failure_policy: FailurePolicy,
}

impl PublishOptions {
    pub fn new(project_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            bucket: bucket.into(),
            path_prefix: String::new(),
            dependency_dir: None,
            skip: DEFAULT_SKIP.iter().map(|path| path.to_string()).collect(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = path_prefix.into();
        self
    }

    pub fn with_dependency_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dependency_dir = Some(dir.into());
        self
    }

    pub fn with_skip(mut self, relative_path: impl Into<String>) -> Self {
        self.skip.insert(relative_path.into());
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedFunction {
    pub name: String,
    /// Number of creation statements submitted (one per overload)
    pub statements: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub function: String,
    pub error: String,
}

/// Outcome of a publish run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Object names uploaded during staging
    pub staged: Vec<String>,
    /// Functions in submission order
    pub published: Vec<PublishedFunction>,
    /// Functions left out because their file is on the skip-list
    pub skipped: Vec<String>,
    pub failures: Vec<Failure>,
}

impl PublishReport {
    pub fn published_names(&self) -> Vec<&str> {
        self.published.iter().map(|p| p.name.as_str()).collect()
    }

    /// Turn recorded failures into a [`PublishError::Batch`].
    pub fn into_result(self) -> Result<Self, PublishError> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        let summary = self
            .failures
            .iter()
            .map(|failure| format!("  {}: {}", failure.function, failure.error))
            .collect::<Vec<_>>()
            .join("\n");
        Err(PublishError::Batch {
            count: self.failures.len(),
            summary,
        })
    }
}

/// Drives one publish run over a registry
pub struct Publisher<'a> {
    registry: &'a Registry,
    options: PublishOptions,
    rewriter: Rewriter,
    published: HashSet<String>,
    report: PublishReport,
    state: RunState,
}

impl<'a> Publisher<'a> {
    pub fn new(registry: &'a Registry, options: PublishOptions) -> Self {
        let rewriter = Rewriter::new(
            options.project_id.clone(),
            options.bucket.clone(),
            options.path_prefix.clone(),
        );
        Self {
            registry,
            options,
            rewriter,
            published: HashSet::new(),
            report: PublishReport::default(),
            state: RunState::RegistryBuilt,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Names submitted so far in this run
    pub fn published(&self) -> &HashSet<String> {
        &self.published
    }

    pub fn report(&self) -> &PublishReport {
        &self.report
    }

    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    fn advance(&mut self, next: RunState) {
        if next > self.state {
            info!("{} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Stage then publish `requested` (every registry function when empty).
    pub fn run(
        mut self,
        requested: &[String],
        warehouse: &mut dyn Warehouse,
        store: &mut dyn ObjectStore,
    ) -> Result<PublishReport, PublishError> {
        self.stage(store)?;
        self.publish_all(requested, warehouse)?;
        Ok(self.report)
    }

    /// Upload every file under the dependency directory, preserving file names.
    ///
    /// Objects are named by file name alone, so two files with the same name
    /// in different subdirectories are rejected before anything is uploaded.
    pub fn stage(&mut self, store: &mut dyn ObjectStore) -> Result<Vec<String>, PublishError> {
        let Some(dir) = self
            .options
            .dependency_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
        else {
            debug!("No dependency directory configured, skipping staging");
            return Ok(Vec::new());
        };

        self.advance(RunState::Staging);

        let mut sources: HashMap<String, PathBuf> = HashMap::new();
        let mut planned = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(LoadError::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let destination = format!(
                "{}{}",
                self.rewriter.path_prefix(),
                entry.file_name().to_string_lossy()
            );
            if let Some(first) = sources.get(&destination) {
                return Err(PublishError::StagingCollision {
                    destination,
                    first: first.clone(),
                    second: entry.into_path(),
                });
            }
            sources.insert(destination.clone(), entry.path().to_path_buf());
            planned.push((entry.into_path(), destination));
        }

        let mut staged = Vec::new();
        for (file, destination) in planned {
            debug!("Uploading {:?} to gs://{}/{}", file, self.options.bucket, destination);

            store
                .upload(&self.options.bucket, &destination, &file)
                .map_err(|source| PublishError::Staging {
                    file,
                    bucket: self.options.bucket.clone(),
                    destination: destination.clone(),
                    source,
                })?;
            staged.push(destination);
        }

        info!("Staged {} dependency files from {:?}", staged.len(), dir);
        self.report.staged.extend(staged.iter().cloned());
        Ok(staged)
    }

    /// Publish each requested function with its closure, applying the failure policy.
    pub fn publish_all(
        &mut self,
        requested: &[String],
        warehouse: &mut dyn Warehouse,
    ) -> Result<&PublishReport, PublishError> {
        self.advance(RunState::Publishing);

        let requested: Vec<String> = if requested.is_empty() {
            self.registry.names().map(str::to_string).collect()
        } else {
            requested.to_vec()
        };

        for name in &requested {
            if let Err(err) = self.publish_function(name, warehouse) {
                match self.options.failure_policy {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::Continue => {
                        warn!("Failed to publish {}: {}", name, err);
                        self.report.failures.push(Failure {
                            function: name.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        self.advance(RunState::Done);
        info!(
            "Published {} functions ({} skipped, {} failed)",
            self.report.published.len(),
            self.report.skipped.len(),
            self.report.failures.len()
        );
        Ok(&self.report)
    }

    /// Publish `name` and every function it depends on that is not yet
    /// published; returns the names submitted by this call.
    pub fn publish_function(
        &mut self,
        name: &str,
        warehouse: &mut dyn Warehouse,
    ) -> Result<Vec<String>, PublishError> {
        if self.published.contains(name) {
            debug!("{} already published in this run", name);
            return Ok(Vec::new());
        }

        let closure = DependencyResolver::new(self.registry).resolve(&self.published, name)?;
        debug!("Closure of {}: {:?}", name, closure);

        let mut submitted = Vec::new();
        for member in closure {
            let Some(function) = self.registry.get(&member) else {
                continue;
            };

            if self.options.skip.contains(&function.relative_path) {
                info!("Skipping {} ({})", member, function.relative_path);
                if !self.report.skipped.contains(&member) {
                    self.report.skipped.push(member);
                }
                continue;
            }

            for definition in &function.definitions {
                let statement = rewriter::to_persistent(&self.rewriter.rewrite(definition));
                warehouse
                    .submit(&statement)
                    .map_err(|source| PublishError::Submission {
                        function: member.clone(),
                        source,
                    })?;
            }

            info!(
                "Published {} as {}",
                member,
                self.rewriter
                    .qualified_name(&function.namespace, function_local_name(&member))
            );
            self.report.published.push(PublishedFunction {
                name: member.clone(),
                statements: function.definitions.len(),
            });
            self.published.insert(member.clone());
            submitted.push(member);
        }

        Ok(submitted)
    }
}

fn function_local_name(logical_name: &str) -> &str {
    logical_name
        .split_once('.')
        .map_or(logical_name, |(_, local)| local)
}
