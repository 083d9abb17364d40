//! # Configuration
//!
//! [`SymbolFileOptions`] carries everything a module needs from its host:
//! where to look for companion (`.dwo`) files and packages, where to look for
//! external type modules, and whether accelerator tables may be used.
//!
//! Options are built fluently or read from the environment:
//!
//! - `SYMDEX_DEBUG_FILE_SEARCH_PATHS`: companion file search paths
//! - `SYMDEX_MODULE_SEARCH_PATHS`: external module search paths
//! - `SYMDEX_DWP_PATH`: explicit package file
//! - `SYMDEX_DISABLE_ACCELERATOR_TABLES`: `1`, `true` or `yes` to force name scans
//!
//! Path lists use the platform separator (`:` on Unix, `;` on Windows).

use std::env;
use std::path::PathBuf;

use tracing::debug;

/// Environment variable holding companion file search paths.
pub const DEBUG_FILE_SEARCH_PATHS_ENV: &str = "SYMDEX_DEBUG_FILE_SEARCH_PATHS";

/// Environment variable holding external module search paths.
pub const MODULE_SEARCH_PATHS_ENV: &str = "SYMDEX_MODULE_SEARCH_PATHS";

/// Environment variable naming the package (`.dwp`) file.
pub const DWP_PATH_ENV: &str = "SYMDEX_DWP_PATH";

/// Environment variable that disables accelerator tables.
pub const DISABLE_ACCELERATOR_TABLES_ENV: &str = "SYMDEX_DISABLE_ACCELERATOR_TABLES";

/// Host-provided settings for one module.
#[derive(Debug, Clone)]
pub struct SymbolFileOptions
{
    debug_file_search_paths: Vec<PathBuf>,
    module_search_paths: Vec<PathBuf>,
    dwp_path: Option<PathBuf>,
    use_accelerator_tables: bool,
}

impl Default for SymbolFileOptions
{
    fn default() -> Self
    {
        Self {
            debug_file_search_paths: Vec::new(),
            module_search_paths: Vec::new(),
            dwp_path: None,
            use_accelerator_tables: true,
        }
    }
}

impl SymbolFileOptions
{
    /// Default options: no search paths, accelerator tables enabled.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Options read from the `SYMDEX_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self
    {
        let mut options = Self::default();
        if let Some(paths) = env::var_os(DEBUG_FILE_SEARCH_PATHS_ENV) {
            options.debug_file_search_paths = env::split_paths(&paths).collect();
        }
        if let Some(paths) = env::var_os(MODULE_SEARCH_PATHS_ENV) {
            options.module_search_paths = env::split_paths(&paths).collect();
        }
        if let Some(path) = env::var_os(DWP_PATH_ENV).filter(|path| !path.is_empty()) {
            options.dwp_path = Some(PathBuf::from(path));
        }
        if let Ok(value) = env::var(DISABLE_ACCELERATOR_TABLES_ENV) {
            options.use_accelerator_tables = !parse_switch(&value);
        }
        debug!(?options, "options from environment");
        options
    }

    /// Add a directory searched for companion files.
    #[must_use]
    pub fn with_debug_file_search_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.debug_file_search_paths.push(path.into());
        self
    }

    /// Add a directory searched for external modules.
    #[must_use]
    pub fn with_module_search_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.module_search_paths.push(path.into());
        self
    }

    /// Use an explicit package file instead of `<binary>.dwp`.
    #[must_use]
    pub fn with_dwp_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.dwp_path = Some(path.into());
        self
    }

    /// Enable or disable accelerator tables for exact-name lookups.
    #[must_use]
    pub fn with_accelerator_tables(mut self, enabled: bool) -> Self
    {
        self.use_accelerator_tables = enabled;
        self
    }

    /// Companion file search paths.
    #[must_use]
    pub fn debug_file_search_paths(&self) -> &[PathBuf]
    {
        &self.debug_file_search_paths
    }

    /// External module search paths.
    #[must_use]
    pub fn module_search_paths(&self) -> &[PathBuf]
    {
        &self.module_search_paths
    }

    /// Explicit package file.
    #[must_use]
    pub fn dwp_path(&self) -> Option<&PathBuf>
    {
        self.dwp_path.as_ref()
    }

    /// Whether accelerator tables may serve exact-name lookups.
    #[must_use]
    pub fn use_accelerator_tables(&self) -> bool
    {
        self.use_accelerator_tables
    }
}

fn parse_switch(value: &str) -> bool
{
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_defaults()
    {
        let options = SymbolFileOptions::new();
        assert!(options.use_accelerator_tables());
        assert!(options.debug_file_search_paths().is_empty());
        assert!(options.dwp_path().is_none());
    }

    #[test]
    fn test_builder()
    {
        let options = SymbolFileOptions::new()
            .with_debug_file_search_path("/debug")
            .with_module_search_path("/modules")
            .with_dwp_path("/app.dwp")
            .with_accelerator_tables(false);
        assert_eq!(options.debug_file_search_paths(), [PathBuf::from("/debug")]);
        assert_eq!(options.module_search_paths(), [PathBuf::from("/modules")]);
        assert_eq!(options.dwp_path(), Some(&PathBuf::from("/app.dwp")));
        assert!(!options.use_accelerator_tables());
    }

    #[test]
    fn test_parse_switch()
    {
        assert!(parse_switch("1"));
        assert!(parse_switch("TRUE"));
        assert!(parse_switch(" yes "));
        assert!(!parse_switch("0"));
        assert!(!parse_switch("off"));
    }
}
