//! In-memory registry of raw UDF definitions keyed by logical name

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::LoadError;
use crate::matcher::{self, Reference};
use crate::parse;

/// File name used by the nested `<namespace>/<function>/udf.sql` layout
pub const NESTED_FILE_NAME: &str = "udf.sql";

/// One user-authored function as found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawFunction {
    /// Logical name, `<namespace>.<function>`
    pub name: String,
    /// Namespace (source directory name), used as the target dataset
    pub namespace: String,
    /// Where the function was read from
    pub filepath: PathBuf,
    /// `filepath` relative to the source directory's parent, `/`-separated
    pub relative_path: String,
    /// Body texts; more than one means an overload set
    pub definitions: Vec<String>,
    /// Non-definition statements from the same file
    pub tests: Vec<String>,
}

impl RawFunction {
    pub fn new(
        namespace: impl Into<String>,
        function: impl Into<String>,
        definitions: Vec<String>,
    ) -> Self {
        let namespace = namespace.into();
        let function = function.into();
        let relative_path = format!("{}/{}.sql", namespace, function);
        Self {
            name: format!("{}.{}", namespace, function),
            namespace,
            filepath: PathBuf::from(&relative_path),
            relative_path,
            definitions,
            tests: Vec::new(),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = relative_path.into();
        self.filepath = PathBuf::from(&self.relative_path);
        self
    }

    /// Read a function from `path`, a file somewhere below `source_dir`.
    pub fn from_file(namespace: &str, source_dir: &Path, path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let relative = path.strip_prefix(source_dir).unwrap_or(path);
        let function = function_name(relative)
            .ok_or_else(|| LoadError::InvalidDirectory(path.to_path_buf()))?;

        let parsed = parse::parse_source(&text);
        if parsed.definitions.is_empty() {
            return Err(LoadError::NoDefinitions(path.to_path_buf()));
        }

        let mut relative_path = namespace.to_string();
        for component in relative.components() {
            relative_path.push('/');
            relative_path.push_str(&component.as_os_str().to_string_lossy());
        }

        Ok(Self {
            name: format!("{}.{}", namespace, function),
            namespace: namespace.to_string(),
            filepath: path.to_path_buf(),
            relative_path,
            definitions: parsed.definitions,
            tests: parsed.tests,
        })
    }

    /// Every reference across all definitions, in definition then text order.
    pub fn references(&self) -> impl Iterator<Item = Reference<'_>> + '_ {
        self.definitions
            .iter()
            .flat_map(|definition| matcher::references(definition))
    }

    /// Distinct logical names this function calls, excluding itself, in the
    /// order they first appear.
    pub fn dependencies(&self) -> Vec<String> {
        let mut dependencies: Vec<String> = Vec::new();
        for reference in self.references() {
            let name = reference.logical_name();
            if name != self.name && !dependencies.contains(&name) {
                dependencies.push(name);
            }
        }
        dependencies
    }
}

/// Function name for a file path relative to its source directory.
fn function_name(relative: &Path) -> Option<String> {
    let nested = relative.components().count() > 1
        && relative.file_name().is_some_and(|name| name == NESTED_FILE_NAME);

    let name = if nested {
        relative.parent()?.file_name()?
    } else {
        relative.file_stem()?
    };
    Some(name.to_string_lossy().into_owned())
}

/// Mapping from logical name to [`RawFunction`], built once per run
#[derive(Debug, Clone, Default)]
pub struct Registry {
    functions: IndexMap<String, RawFunction>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-parsed functions.
    pub fn from_functions<I>(functions: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = RawFunction>,
    {
        let mut registry = Self::new();
        for function in functions {
            registry.insert(function)?;
        }
        Ok(registry)
    }

    /// Build a registry from a set of source directories.
    ///
    /// Directories are read in the order given and files in path order, which
    /// fixes the registry's iteration order.
    pub fn load<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, LoadError> {
        let mut registry = Self::new();
        for dir in dirs {
            registry.load_dir(dir.as_ref())?;
        }
        info!(
            "Loaded {} functions from {} directories",
            registry.len(),
            dirs.len()
        );
        Ok(registry)
    }

    /// Add every `.sql` file under `dir`; returns the number of functions added.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, LoadError> {
        let namespace = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LoadError::InvalidDirectory(dir.to_path_buf()))?;

        debug!("Scanning {:?} as namespace {}", dir, namespace);

        let mut added = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "sql") {
                continue;
            }

            let function = RawFunction::from_file(&namespace, dir, path)?;
            debug!(
                "Found {} with {} definition(s) in {:?}",
                function.name,
                function.definitions.len(),
                path
            );
            self.insert(function)?;
            added += 1;
        }

        Ok(added)
    }

    /// Add a function; a second function with the same logical name is an error.
    pub fn insert(&mut self, function: RawFunction) -> Result<(), LoadError> {
        if let Some(existing) = self.functions.get(&function.name) {
            return Err(LoadError::DuplicateFunction {
                name: function.name,
                first: existing.filepath.clone(),
                second: function.filepath,
            });
        }
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RawFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Logical names in registry order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawFunction> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_name_layouts() {
        assert_eq!(function_name(Path::new("mode_last.sql")).as_deref(), Some("mode_last"));
        assert_eq!(
            function_name(Path::new("mode_last/udf.sql")).as_deref(),
            Some("mode_last")
        );
        assert_eq!(function_name(Path::new("udf.sql")).as_deref(), Some("udf"));
    }

    #[test]
    fn test_dependencies_exclude_self_and_repeat() {
        let function = RawFunction::new(
            "udf",
            "a",
            vec![
                "CREATE TEMP FUNCTION udf.a() AS (udf.b() + udf_c())".to_string(),
                "CREATE TEMP FUNCTION udf_a(x INT64) AS (udf.b() + x)".to_string(),
            ],
        );
        assert_eq!(function.dependencies(), vec!["udf.b", "udf.c"]);
    }

    #[test]
    fn test_duplicate_insert_is_error() {
        let mut registry = Registry::new();
        registry
            .insert(RawFunction::new("udf", "a", vec![]).with_relative_path("x/udf/a.sql"))
            .unwrap();
        let err = registry
            .insert(RawFunction::new("udf", "a", vec![]).with_relative_path("y/udf/a.sql"))
            .unwrap_err();
        match err {
            LoadError::DuplicateFunction { name, first, second } => {
                assert_eq!(name, "udf.a");
                assert_eq!(first, PathBuf::from("x/udf/a.sql"));
                assert_eq!(second, PathBuf::from("y/udf/a.sql"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.len(), 1);
    }
}
