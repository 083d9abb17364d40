//! Companion files of split-DWARF skeleton units.
//!
//! A skeleton unit in the main file names a companion (`.dwo`) file and a
//! DWO id. The companion is looked up once per skeleton: first in a `.dwp`
//! package by DWO id, then as a loose file through a [`CompanionResolver`].
//! The outcome, found or missing, is cached per skeleton for the lifetime of
//! the module.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{DwarfPackage, DwoId, EndianArcSlice};
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use super::sections::{ObjectFile, SectionFlavour, SectionProvider, SectionStore};
use super::unit::{CompileUnit, FileUnits, UnitRole};
use super::{OwnedDwarf, OwnedReader};
use crate::error::{DiagnosticLog, ErrorCategory, Result, SymbolError};
use crate::types::FileSelector;

/// Locates companion files on behalf of the reader.
pub trait CompanionResolver: Send + Sync
{
    /// Open the companion named `dwo_name` for a unit compiled in `comp_dir`.
    fn open_companion(&self, dwo_name: &str, comp_dir: Option<&str>) -> Option<Arc<dyn SectionProvider>>;

    /// Open the package (`.dwp`) file of the module, if there is one.
    fn open_package(&self) -> Option<Arc<dyn SectionProvider>>;
}

/// Resolver that looks for companion files on disk.
///
/// Candidates for `dwo_name`, in order:
///
/// 1. `dwo_name` itself when it is absolute
/// 2. `comp_dir/dwo_name`
/// 3. `search_path/dwo_name` for every search path
/// 4. `search_path/<base name of dwo_name>` for every search path
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver
{
    search_paths: Vec<PathBuf>,
    package: Option<PathBuf>,
}

impl SearchPathResolver
{
    /// Resolver with the given search paths and no package.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self
    {
        Self {
            search_paths,
            package: None,
        }
    }

    /// Use `path` as the package file.
    #[must_use]
    pub fn with_package(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.package = Some(path.into());
        self
    }

    /// Use `<binary>.dwp` as the package file unless one is already set.
    #[must_use]
    pub fn with_default_package_for(mut self, binary: &Path) -> Self
    {
        if self.package.is_none() {
            let mut name = binary.as_os_str().to_os_string();
            name.push(".dwp");
            self.package = Some(PathBuf::from(name));
        }
        self
    }

    /// Every path tried for `dwo_name`, in order.
    #[must_use]
    pub fn candidates(&self, dwo_name: &str, comp_dir: Option<&str>) -> Vec<PathBuf>
    {
        let name = Path::new(dwo_name);
        let mut candidates = Vec::new();
        if name.is_absolute() {
            candidates.push(name.to_path_buf());
        }
        if let Some(dir) = comp_dir {
            candidates.push(Path::new(dir).join(name));
        }
        for dir in &self.search_paths {
            candidates.push(dir.join(name));
        }
        if let Some(base) = name.file_name() {
            for dir in &self.search_paths {
                candidates.push(dir.join(base));
            }
        }
        candidates.dedup();
        candidates
    }
}

impl CompanionResolver for SearchPathResolver
{
    fn open_companion(&self, dwo_name: &str, comp_dir: Option<&str>) -> Option<Arc<dyn SectionProvider>>
    {
        for candidate in self.candidates(dwo_name, comp_dir) {
            if !candidate.is_file() {
                trace!(path = %candidate.display(), "no companion here");
                continue;
            }
            match ObjectFile::open(&candidate) {
                Ok(file) => {
                    debug!(path = %candidate.display(), "opened companion file");
                    return Some(Arc::new(file));
                }
                Err(err) => debug!(path = %candidate.display(), "unreadable companion candidate: {err}"),
            }
        }
        None
    }

    fn open_package(&self) -> Option<Arc<dyn SectionProvider>>
    {
        let path = self.package.as_ref()?;
        if !path.is_file() {
            return None;
        }
        match ObjectFile::open(path) {
            Ok(file) => Some(Arc::new(file)),
            Err(err) => {
                debug!(path = %path.display(), "unreadable package file: {err}");
                None
            }
        }
    }
}

/// A loaded companion: all of its units plus the split unit paired with the skeleton.
#[derive(Debug)]
pub struct Companion
{
    units: Arc<FileUnits>,
    unit: Arc<CompileUnit>,
}

impl Companion
{
    /// Every unit of the companion file.
    #[must_use]
    pub fn units(&self) -> &Arc<FileUnits>
    {
        &self.units
    }

    /// The split unit holding the skeleton's DIEs.
    #[must_use]
    pub fn unit(&self) -> &Arc<CompileUnit>
    {
        &self.unit
    }
}

/// Cached outcome of a companion lookup.
#[derive(Debug, Clone)]
pub enum CompanionState
{
    /// The companion was found and paired
    Loaded(Arc<Companion>),
    /// Lookup failed; the string says why
    Missing(String),
}

/// One companion slot per main-file unit, each resolved at most once.
pub struct CompanionTable
{
    resolver: Arc<dyn CompanionResolver>,
    main: Arc<OwnedDwarf>,
    diagnostics: Arc<DiagnosticLog>,
    package: OnceCell<Option<Arc<DwarfPackage<OwnedReader>>>>,
    slots: Vec<OnceCell<CompanionState>>,
}

impl CompanionTable
{
    pub(crate) fn new(
        resolver: Arc<dyn CompanionResolver>,
        main: Arc<OwnedDwarf>,
        unit_count: usize,
        diagnostics: Arc<DiagnosticLog>,
    ) -> Self
    {
        Self {
            resolver,
            main,
            diagnostics,
            package: OnceCell::new(),
            slots: (0..unit_count).map(|_| OnceCell::new()).collect(),
        }
    }

    /// State of the companion of `skeleton` if it has been resolved already.
    #[must_use]
    pub fn cached(&self, skeleton: &CompileUnit) -> Option<&CompanionState>
    {
        self.slots.get(skeleton.index()).and_then(OnceCell::get)
    }

    /// Companion of `skeleton`, loading it on first use.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::MissingCompanion`] if no companion could be found,
    /// now or on an earlier call.
    pub fn companion(&self, skeleton: &Arc<CompileUnit>) -> Result<Arc<Companion>>
    {
        let Some(slot) = self.slots.get(skeleton.index()) else {
            return Err(SymbolError::UnitNotFound(u64::from(skeleton.offset())));
        };
        match slot.get_or_init(|| self.load(skeleton)) {
            CompanionState::Loaded(companion) => Ok(Arc::clone(companion)),
            CompanionState::Missing(dwo_name) => Err(SymbolError::MissingCompanion {
                unit: skeleton.index(),
                dwo_name: dwo_name.clone(),
            }),
        }
    }

    fn load(&self, skeleton: &Arc<CompileUnit>) -> CompanionState
    {
        let info = skeleton.info().ok();
        let dwo_name = info
            .and_then(|info| info.dwo_name.clone())
            .unwrap_or_else(|| "<unnamed>".to_string());
        let comp_dir = info.and_then(|info| info.comp_dir.clone());
        let missing = |reason: &str| {
            self.diagnostics.record(&SymbolError::MissingCompanion {
                unit: skeleton.index(),
                dwo_name: dwo_name.clone(),
            });
            debug!(unit = skeleton.index(), "companion unavailable: {reason}");
            CompanionState::Missing(dwo_name.clone())
        };

        let Some(dwo_id) = skeleton.dwo_id() else {
            return missing("skeleton has no DWO id");
        };
        let Ok(selector) = u32::try_from(skeleton.index()).map(FileSelector::Companion) else {
            return missing("unit index does not fit a file selector");
        };

        let dwarf = match self.from_package(dwo_id) {
            Some(dwarf) => dwarf,
            None => match self.resolver.open_companion(&dwo_name, comp_dir.as_deref()) {
                Some(provider) => {
                    let mut dwarf = SectionStore::new(provider, SectionFlavour::Split).load_dwarf();
                    dwarf.make_dwo(&self.main);
                    dwarf
                }
                None => return missing("not found in package or search paths"),
            },
        };

        let units = Arc::new(FileUnits::discover(selector, Arc::new(dwarf), &self.diagnostics));
        let split = units
            .units()
            .iter()
            .filter(|unit| unit.role() != UnitRole::Type)
            .find(|unit| unit.peek_dwo_id() == Some(dwo_id))
            .or_else(|| {
                units
                    .units()
                    .iter()
                    .find(|unit| unit.role() != UnitRole::Type)
            })
            .cloned();
        let Some(unit) = split else {
            return missing("companion holds no compile unit");
        };
        if unit.peek_dwo_id().is_some_and(|id| id != dwo_id) {
            self.diagnostics.record_message(
                ErrorCategory::Reference,
                format!("companion {dwo_name} has DWO id mismatch for unit {}", skeleton.index()),
            );
        }
        if let Err(err) = unit.adopt_skeleton(skeleton) {
            self.diagnostics.record(&err);
            return missing("split unit could not adopt the skeleton");
        }
        debug!(unit = skeleton.index(), dwo = %dwo_name, "loaded companion");
        CompanionState::Loaded(Arc::new(Companion { units, unit }))
    }

    fn from_package(&self, dwo_id: u64) -> Option<OwnedDwarf>
    {
        let package = self
            .package
            .get_or_init(|| {
                let provider = self.resolver.open_package()?;
                let store = SectionStore::new(provider, SectionFlavour::Split);
                let empty = EndianArcSlice::new(Arc::from(Vec::new()), store.endian());
                match DwarfPackage::load(|id| Ok::<_, gimli::Error>(store.reader(id)), empty) {
                    Ok(package) => Some(Arc::new(package)),
                    Err(err) => {
                        self.diagnostics.record_message(ErrorCategory::Format, format!("unreadable package file: {err}"));
                        None
                    }
                }
            })
            .as_ref()?;
        match package.find_cu(DwoId(dwo_id), &self.main) {
            Ok(found) => found,
            Err(err) => {
                self.diagnostics
                    .record_message(ErrorCategory::Format, format!("package lookup for 0x{dwo_id:016x} failed: {err}"));
                None
            }
        }
    }
}

impl fmt::Debug for CompanionTable
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let resolved = self.slots.iter().filter(|slot| slot.get().is_some()).count();
        f.debug_struct("CompanionTable")
            .field("slots", &self.slots.len())
            .field("resolved", &resolved)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_candidate_order()
    {
        let resolver = SearchPathResolver::new(vec![PathBuf::from("/debug")]);
        let candidates = resolver.candidates("obj/foo.dwo", Some("/build"));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/build/obj/foo.dwo"),
                PathBuf::from("/debug/obj/foo.dwo"),
                PathBuf::from("/debug/foo.dwo"),
            ]
        );
    }

    #[test]
    fn test_absolute_name_first()
    {
        let resolver = SearchPathResolver::default();
        let candidates = resolver.candidates("/abs/foo.dwo", None);
        assert_eq!(candidates.first(), Some(&PathBuf::from("/abs/foo.dwo")));
    }

    #[test]
    fn test_default_package_path()
    {
        let resolver = SearchPathResolver::default().with_default_package_for(Path::new("/bin/app"));
        assert_eq!(resolver.package, Some(PathBuf::from("/bin/app.dwp")));

        let explicit = SearchPathResolver::default()
            .with_package("/pkg/app.dwp")
            .with_default_package_for(Path::new("/bin/app"));
        assert_eq!(explicit.package, Some(PathBuf::from("/pkg/app.dwp")));
    }
}
