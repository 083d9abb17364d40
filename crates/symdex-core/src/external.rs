//! # External Modules
//!
//! Clang modules and precompiled headers referenced from debug information
//! (`DW_TAG_module`) are separate files found through module search paths.
//! The [`ExternalModuleTable`] resolves each module name at most once and
//! remembers misses as well as hits.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

/// A located external module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalModule
{
    /// Module name as referenced from debug information
    pub name: String,
    /// File the module was found in
    pub path: PathBuf,
}

/// Finds external modules by name.
pub trait ModuleResolver: Send + Sync
{
    /// Locate module `name`, searching `search_paths` in order.
    fn resolve_module(&self, name: &str, search_paths: &[PathBuf]) -> Option<Arc<ExternalModule>>;
}

/// Looks for `<dir>/<name>`, `<dir>/<name>.pcm` and `<dir>/<name>.dwo` in
/// every search directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemModuleResolver;

const MODULE_EXTENSIONS: [&str; 2] = ["pcm", "dwo"];

impl FileSystemModuleResolver
{
    /// Candidate paths for `name` under `dir`, in search order.
    #[must_use]
    pub fn candidates(dir: &Path, name: &str) -> Vec<PathBuf>
    {
        let mut candidates = vec![dir.join(name)];
        candidates.extend(MODULE_EXTENSIONS.iter().map(|ext| dir.join(format!("{name}.{ext}"))));
        candidates
    }
}

impl ModuleResolver for FileSystemModuleResolver
{
    fn resolve_module(&self, name: &str, search_paths: &[PathBuf]) -> Option<Arc<ExternalModule>>
    {
        search_paths
            .iter()
            .flat_map(|dir| Self::candidates(dir, name))
            .find(|path| path.is_file())
            .map(|path| {
                Arc::new(ExternalModule {
                    name: name.to_string(),
                    path,
                })
            })
    }
}

/// Memoised module lookups of one symbol file.
pub struct ExternalModuleTable
{
    resolver: Arc<dyn ModuleResolver>,
    search_paths: Vec<PathBuf>,
    entries: BTreeMap<String, Option<Arc<ExternalModule>>>,
}

impl ExternalModuleTable
{
    /// Create an empty table.
    #[must_use]
    pub fn new(resolver: Arc<dyn ModuleResolver>, search_paths: Vec<PathBuf>) -> Self
    {
        Self {
            resolver,
            search_paths,
            entries: BTreeMap::new(),
        }
    }

    /// Module `name`, resolved on first request. A module that was not found
    /// stays not found without searching again.
    pub fn module_for(&mut self, name: &str) -> Option<Arc<ExternalModule>>
    {
        if let Some(entry) = self.entries.get(name) {
            return entry.clone();
        }
        let found = self.resolver.resolve_module(name, &self.search_paths);
        match &found {
            Some(module) => debug!(name, path = %module.path.display(), "resolved external module"),
            None => warn!(name, "external module not found in search paths"),
        }
        self.entries.insert(name.to_string(), found.clone());
        found
    }

    /// Whether `name` has been looked up before.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool
    {
        self.entries.contains_key(name)
    }

    /// Snapshot of every lookup made so far, misses included.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Option<Arc<ExternalModule>>)>
    {
        self.entries
            .iter()
            .map(|(name, module)| (name.clone(), module.clone()))
            .collect()
    }
}

impl fmt::Debug for ExternalModuleTable
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ExternalModuleTable")
            .field("search_paths", &self.search_paths)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
