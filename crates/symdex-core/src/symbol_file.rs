//! # Symbol File
//!
//! [`SymbolFile`] is the query surface of one module: it owns the unit store,
//! the name index and every resolver cache, and answers the consumer-facing
//! queries (types, variables, functions, names, addresses and source lines).
//!
//! ## Locking
//!
//! Resolver caches sit behind one re-entrant mutex: resolving a DIE often
//! resolves others on the same thread. Section bytes, unit discovery, DIE
//! forests and name tables live in write-once cells outside that lock, so
//! building them never blocks unrelated cache lookups.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use symdex_core::index::NameQuery;
//! use symdex_core::symbol_file::SymbolFile;
//! use symdex_core::config::SymbolFileOptions;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let file = SymbolFile::open("/path/to/binary", SymbolFileOptions::from_env())?;
//!     for function in file.find_functions(&NameQuery::Exact("main"), false, None)? {
//!         println!("{} at {:?}", function.display_name(), function.entry_address());
//!     }
//!     Ok(())
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;
use tracing::{debug, info};

use crate::config::SymbolFileOptions;
use crate::dwarf::identity::{CompanionResolver, SearchPathResolver};
use crate::dwarf::line::{path_matches, LineRow, LineTable};
use crate::dwarf::sections::{ObjectFile, SectionProvider, SectionStore};
use crate::dwarf::store::UnitStore;
use crate::dwarf::unit::{CompileUnit, Die};
use crate::error::{map_dwarf_error, DiagnosticLog, Result};
use crate::external::{ExternalModule, ExternalModuleTable, FileSystemModuleResolver, ModuleResolver};
use crate::index::{NameIndex, NameKind, NameQuery};
use crate::resolve::decl;
use crate::resolve::type_system::{BasicTypeSystem, TypeSystem};
use crate::resolve::ResolverState;
use crate::types::{
    Address, AddressRange, DieRef, Function, SectionKind, SymbolContext, SymbolLanguage, Type, UserId, Variable,
};

/// A module's debug information and every cache built from it.
pub struct SymbolFile
{
    pub(crate) options: SymbolFileOptions,
    pub(crate) store: UnitStore,
    pub(crate) index: NameIndex,
    pub(crate) state: ReentrantMutex<RefCell<ResolverState>>,
    pub(crate) type_system: Arc<dyn TypeSystem>,
    pub(crate) diagnostics: Arc<DiagnosticLog>,
    /// Code ranges → logical unit index, from `.debug_aranges` or unit ranges
    address_map: OnceCell<Vec<(AddressRange, usize)>>,
}

/// Builder for a [`SymbolFile`] over an arbitrary section provider.
pub struct SymbolFileBuilder
{
    provider: Arc<dyn SectionProvider>,
    options: SymbolFileOptions,
    companion_resolver: Option<Arc<dyn CompanionResolver>>,
    module_resolver: Option<Arc<dyn ModuleResolver>>,
    type_system: Option<Arc<dyn TypeSystem>>,
}

impl SymbolFileBuilder
{
    /// Use `options` instead of the defaults.
    #[must_use]
    pub fn options(mut self, options: SymbolFileOptions) -> Self
    {
        self.options = options;
        self
    }

    /// Locate companion files with `resolver` instead of the search-path resolver.
    #[must_use]
    pub fn companion_resolver(mut self, resolver: Arc<dyn CompanionResolver>) -> Self
    {
        self.companion_resolver = Some(resolver);
        self
    }

    /// Locate external modules with `resolver` instead of the file system.
    #[must_use]
    pub fn module_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self
    {
        self.module_resolver = Some(resolver);
        self
    }

    /// Create language types through `type_system` instead of [`BasicTypeSystem`].
    #[must_use]
    pub fn type_system(mut self, type_system: Arc<dyn TypeSystem>) -> Self
    {
        self.type_system = Some(type_system);
        self
    }

    /// Create the symbol file. Nothing is read until the first query.
    #[must_use]
    pub fn build(self) -> SymbolFile
    {
        let sections = SectionStore::detect(self.provider);
        let companion_resolver = self.companion_resolver.unwrap_or_else(|| {
            let mut resolver = SearchPathResolver::new(self.options.debug_file_search_paths().to_vec());
            if let Some(dwp) = self.options.dwp_path() {
                resolver = resolver.with_package(dwp.clone());
            }
            if let Some(path) = sections.path() {
                resolver = resolver.with_default_package_for(path);
            }
            Arc::new(resolver)
        });
        let module_resolver = self
            .module_resolver
            .unwrap_or_else(|| Arc::new(FileSystemModuleResolver));
        let type_system = self
            .type_system
            .unwrap_or_else(|| Arc::new(BasicTypeSystem::new()));

        let diagnostics = Arc::new(DiagnosticLog::default());
        let modules = ExternalModuleTable::new(module_resolver, self.options.module_search_paths().to_vec());
        SymbolFile {
            index: NameIndex::new(self.options.use_accelerator_tables()),
            store: UnitStore::new(sections, companion_resolver, Arc::clone(&diagnostics)),
            state: ReentrantMutex::new(RefCell::new(ResolverState::new(modules))),
            type_system,
            diagnostics,
            options: self.options,
            address_map: OnceCell::new(),
        }
    }
}

impl SymbolFile
{
    /// Open the object file at `path`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or is not an object file.
    pub fn open(path: impl AsRef<Path>, options: SymbolFileOptions) -> Result<Self>
    {
        let path = path.as_ref();
        let object = ObjectFile::open(path)?;
        info!(path = %path.display(), "opened symbol file");
        Ok(Self::builder(Arc::new(object)).options(options).build())
    }

    /// Start building a symbol file over `provider`.
    #[must_use]
    pub fn builder(provider: Arc<dyn SectionProvider>) -> SymbolFileBuilder
    {
        SymbolFileBuilder {
            provider,
            options: SymbolFileOptions::default(),
            companion_resolver: None,
            module_resolver: None,
            type_system: None,
        }
    }

    /// Options the file was opened with.
    #[must_use]
    pub fn options(&self) -> &SymbolFileOptions
    {
        &self.options
    }

    /// The unit store.
    #[must_use]
    pub fn store(&self) -> &UnitStore
    {
        &self.store
    }

    /// The language type system.
    #[must_use]
    pub fn type_system(&self) -> &Arc<dyn TypeSystem>
    {
        &self.type_system
    }

    /// Non-fatal problems recorded so far.
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticLog
    {
        &self.diagnostics
    }

    /// Number of user-addressable compile units (type units excluded).
    #[must_use]
    pub fn num_compile_units(&self) -> usize
    {
        self.store.num_compile_units()
    }

    /// Compile unit with logical index `index`.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::UnitIndexOutOfRange`](crate::error::SymbolError::UnitIndexOutOfRange)
    /// for an index past the last unit.
    pub fn compile_unit(&self, index: usize) -> Result<Arc<CompileUnit>>
    {
        self.store.unit_at_index(index)
    }

    /// Identifier handed to consumers for `die`.
    #[must_use]
    pub fn identifier_for(&self, die: DieRef) -> UserId
    {
        UserId::from(die)
    }

    /// Reference named by an identifier.
    #[must_use]
    pub fn reference_for(&self, uid: UserId) -> DieRef
    {
        DieRef::from(uid)
    }

    /// DIE named by `uid`, loading the companion file it lives in if needed.
    ///
    /// ## Errors
    ///
    /// Returns an error if `uid` does not name a DIE.
    pub fn die_for_uid(&self, uid: UserId) -> Result<Die>
    {
        self.store.die_for_ref(DieRef::from(uid))
    }

    /// Whether exact lookups are answered from `.debug_pubnames`/`.debug_pubtypes`.
    #[must_use]
    pub fn has_accelerator_tables(&self) -> bool
    {
        self.index.has_accelerator(&self.store)
    }

    /// Functions matching `query`. Inlined calls are included only when
    /// `include_inlines` is set.
    ///
    /// ## Errors
    ///
    /// Returns an error if a matching function cannot be resolved.
    pub fn find_functions(
        &self,
        query: &NameQuery<'_>,
        include_inlines: bool,
        max_results: Option<usize>,
    ) -> Result<Vec<Arc<Function>>>
    {
        let mut functions: Vec<Arc<Function>> = Vec::new();
        let mut seen = HashSet::new();
        for hit in self.index.find(&self.store, query, NameKind::FUNCTION, None) {
            if hit.tag == gimli::DW_TAG_inlined_subroutine && !include_inlines {
                continue;
            }
            let Some(die) = self.hit_die(hit.die) else {
                continue;
            };
            let function = self.resolve_function(&die)?;
            if seen.insert(function.uid()) {
                functions.push(function);
            }
            if max_results.is_some_and(|max| functions.len() >= max) {
                break;
            }
        }
        debug!(query = ?query, found = functions.len(), "find_functions");
        Ok(functions)
    }

    /// Variables with static storage matching `query`.
    ///
    /// ## Errors
    ///
    /// Returns an error if a matching variable cannot be resolved.
    pub fn find_globals(&self, query: &NameQuery<'_>, max_results: Option<usize>) -> Result<Vec<Arc<Variable>>>
    {
        let mut globals: Vec<Arc<Variable>> = Vec::new();
        for hit in self.index.find(&self.store, query, NameKind::GLOBAL, None) {
            let Some(die) = self.hit_die(hit.die) else {
                continue;
            };
            let variable = self.resolve_variable(&die, None)?;
            if !globals.iter().any(|known| Arc::ptr_eq(known, &variable)) {
                globals.push(variable);
            }
            if max_results.is_some_and(|max| globals.len() >= max) {
                break;
            }
        }
        debug!(query = ?query, found = globals.len(), "find_globals");
        Ok(globals)
    }

    /// Types matching `query`. Definitions shared by several units are
    /// reported once.
    ///
    /// ## Errors
    ///
    /// Returns an error if a matching type cannot be resolved.
    pub fn find_types(&self, query: &NameQuery<'_>, max_results: Option<usize>) -> Result<Vec<Arc<Type>>>
    {
        let mut types: Vec<Arc<Type>> = Vec::new();
        for hit in self.index.find(&self.store, query, NameKind::TYPE, None) {
            let Some(die) = self.hit_die(hit.die) else {
                continue;
            };
            let resolved = self.resolve_type(&die)?;
            if !types.iter().any(|known| Arc::ptr_eq(known, &resolved)) {
                types.push(resolved);
            }
            if max_results.is_some_and(|max| types.len() >= max) {
                break;
            }
        }
        debug!(query = ?query, found = types.len(), "find_types");
        Ok(types)
    }

    /// DIE behind an index hit; failures are recorded and skipped.
    fn hit_die(&self, die: DieRef) -> Option<Die>
    {
        match self.store.die_for_ref(die) {
            Ok(die) => Some(die),
            Err(err) => {
                self.diagnostics.record(&err);
                None
            }
        }
    }

    fn address_map(&self) -> &[(AddressRange, usize)]
    {
        self.address_map.get_or_init(|| {
            let mut map = self.aranges();
            if map.is_empty() {
                for unit in self.store.compile_units() {
                    let Some(logical) = self.store.logical_index_of(&unit) else {
                        continue;
                    };
                    match unit.info() {
                        Ok(info) => map.extend(info.ranges.iter().map(|range| (*range, logical))),
                        Err(err) => self.diagnostics.record(&err),
                    }
                }
            }
            map.retain(|(range, _)| !range.is_empty());
            map.sort_by_key(|(range, _)| range.begin);
            debug!(ranges = map.len(), "built address map");
            map
        })
    }

    fn aranges(&self) -> Vec<(AddressRange, usize)>
    {
        let mut map = Vec::new();
        let main = self.store.main_units();
        let mut headers = self.store.dwarf().debug_aranges.headers();
        loop {
            let header = match headers.next() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(err) => {
                    self.diagnostics
                        .record(&map_dwarf_error("reading .debug_aranges", err));
                    break;
                }
            };
            let Ok(offset) = u32::try_from(header.debug_info_offset().0) else {
                continue;
            };
            let Some(logical) = main
                .unit_containing(SectionKind::DebugInfo, offset)
                .and_then(|unit| self.store.logical_index_of(unit))
            else {
                continue;
            };
            let mut entries = header.entries();
            loop {
                match entries.next() {
                    Ok(Some(entry)) => map.push((AddressRange::from(entry.range()), logical)),
                    Ok(None) => break,
                    Err(err) => {
                        self.diagnostics
                            .record(&map_dwarf_error("reading .debug_aranges entries", err));
                        break;
                    }
                }
            }
        }
        map
    }

    /// Logical index of the unit whose code covers `address`.
    #[must_use]
    pub fn unit_for_address(&self, address: Address) -> Option<usize>
    {
        self.address_map()
            .iter()
            .find(|(range, _)| range.contains(address))
            .map(|(_, unit)| *unit)
    }

    /// Everything known about `address`: unit, function, innermost block and
    /// line-table row. Fields stay `None` where nothing covers the address.
    ///
    /// ## Errors
    ///
    /// Returns an error if the owning function cannot be resolved.
    pub fn resolve_address(&self, address: Address) -> Result<SymbolContext>
    {
        let Some(index) = self.unit_for_address(address) else {
            return Ok(SymbolContext::default());
        };
        let unit = self.store.unit_at_index(index)?;
        let row = match unit.line_table() {
            Ok(Some(table)) => table.find_row(address).map(|row| table.entry(row)),
            Ok(None) => None,
            Err(err) => {
                self.diagnostics.record(&err);
                None
            }
        };
        let mut context = self.context_in_unit(index, &unit, address)?;
        context.line = row;
        Ok(context)
    }

    fn context_in_unit(&self, index: usize, unit: &Arc<CompileUnit>, address: Address) -> Result<SymbolContext>
    {
        let mut context = SymbolContext {
            unit: Some(index),
            ..SymbolContext::default()
        };
        let dies = match self.store.dies_unit(unit) {
            Ok(dies) => dies,
            Err(err) => {
                self.diagnostics.record(&err);
                return Ok(context);
            }
        };
        let found = dies.dies()?.find(|die| {
            die.tag() == gimli::DW_TAG_subprogram
                && !die.entry().is_declaration()
                && die.entry().ranges().iter().any(|range| range.contains(address))
        });
        if let Some(die) = found {
            let function = self.resolve_function(&die)?;
            context.block = function
                .block()
                .innermost_containing(address)
                .map(|block| block.uid);
            context.function = Some(function);
        }
        Ok(context)
    }

    /// Symbol contexts for source line `line` of `file`. `file` matches a full
    /// path or any trailing path components. Without `check_inlines` only
    /// units whose primary source file is `file` are searched; with it, every
    /// unit whose line table mentions `file` (headers, inlined code).
    ///
    /// When no statement row is on `line` exactly, the rows of the nearest
    /// following line are returned instead.
    ///
    /// ## Errors
    ///
    /// Returns an error if a containing function cannot be resolved.
    pub fn resolve_file_line(&self, file: &str, line: u32, check_inlines: bool) -> Result<Vec<SymbolContext>>
    {
        let mut candidates: Vec<(usize, Arc<CompileUnit>, Arc<LineTable>, LineRow)> = Vec::new();
        for index in 0..self.num_compile_units() {
            let unit = self.store.unit_at_index(index)?;
            if !check_inlines {
                let primary = unit.info().ok().and_then(|info| info.name.clone());
                if !primary.is_some_and(|name| path_matches(&name, file)) {
                    continue;
                }
            }
            let table = match unit.line_table() {
                Ok(Some(table)) => table,
                Ok(None) => continue,
                Err(err) => {
                    self.diagnostics.record(&err);
                    continue;
                }
            };
            let files = table.matching_files(file);
            if files.is_empty() {
                continue;
            }
            for row in table.rows() {
                if row.is_stmt && !row.end_sequence && row.line >= line && files.contains(&row.file) {
                    candidates.push((index, Arc::clone(&unit), Arc::clone(&table), *row));
                }
            }
        }

        let Some(best) = candidates.iter().map(|(_, _, _, row)| row.line).min() else {
            return Ok(Vec::new());
        };
        let mut contexts = Vec::new();
        let mut seen = HashSet::new();
        for (index, unit, table, row) in candidates.into_iter().filter(|(_, _, _, row)| row.line == best) {
            if !seen.insert((index, row.address)) {
                continue;
            }
            let address = Address::new(row.address);
            let mut context = self.context_in_unit(index, &unit, address)?;
            context.line = Some(table.entry(&row));
            contexts.push(context);
        }
        debug!(file, line, matched_line = best, found = contexts.len(), "resolve_file_line");
        Ok(contexts)
    }

    /// Source language of unit `unit`, read from the split unit when there is one.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range.
    pub fn parse_language(&self, unit: usize) -> Result<Option<SymbolLanguage>>
    {
        let unit = self.store.unit_at_index(unit)?;
        let split = self.store.dies_unit(&unit).ok();
        Ok(split
            .and_then(|split| split.language())
            .or_else(|| unit.language()))
    }

    /// Whether unit `unit` was compiled with optimisation (`DW_AT_APPLE_optimized`).
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range or its root cannot be decoded.
    pub fn parse_is_optimized(&self, unit: usize) -> Result<bool>
    {
        let unit = self.store.unit_at_index(unit)?;
        Ok(unit.info()?.is_optimized)
    }

    /// Line table of unit `unit`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range or the line program is malformed.
    pub fn parse_line_table(&self, unit: usize) -> Result<Option<Arc<LineTable>>>
    {
        self.store.unit_at_index(unit)?.line_table()
    }

    /// Support files of unit `unit`, in file-table order.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range or the line program is malformed.
    pub fn parse_support_files(&self, unit: usize) -> Result<Vec<String>>
    {
        Ok(self
            .parse_line_table(unit)?
            .map(|table| {
                table
                    .support_files()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Modules referenced by unit `unit`: `DW_TAG_module` names and the
    /// targets of `DW_TAG_imported_module`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range or its DIEs are unavailable.
    pub fn parse_imported_modules(&self, unit: usize) -> Result<Vec<String>>
    {
        let unit = self.store.dies_unit(&self.store.unit_at_index(unit)?)?;
        let mut modules: Vec<String> = Vec::new();
        for die in unit.dies()? {
            let name = match die.tag() {
                gimli::DW_TAG_module => decl::qualified_name(&self.store, &die),
                gimli::DW_TAG_imported_module => die
                    .entry()
                    .reference(gimli::DW_AT_import)
                    .and_then(|target| self.store.resolve_target(&die, target).ok())
                    .and_then(|target| decl::qualified_name(&self.store, &target)),
                _ => None,
            };
            if let Some(name) = name {
                if !modules.contains(&name) {
                    modules.push(name);
                }
            }
        }
        Ok(modules)
    }

    /// Linkage names of every function whose qualified name is `qualified_name`.
    ///
    /// ## Errors
    ///
    /// Returns an error if a matching function cannot be resolved.
    pub fn mangled_names_for_function(&self, qualified_name: &str) -> Result<Vec<String>>
    {
        let mut names = Vec::new();
        for function in self.find_functions(&NameQuery::Exact(qualified_name), false, None)? {
            if function.qualified_name() != Some(qualified_name) {
                continue;
            }
            if let Some(linkage) = function.linkage_name() {
                let raw = linkage.raw().to_string();
                if !names.contains(&raw) {
                    names.push(raw);
                }
            }
        }
        Ok(names)
    }

    /// Discover every unit and build every name table now.
    pub fn preload_symbols(&self)
    {
        let units = self.store.num_compile_units();
        self.index.preload(&self.store);
        info!(units, "preloaded symbols");
    }

    /// External module `name`, located through the module search paths once.
    #[must_use]
    pub fn external_module(&self, name: &str) -> Option<Arc<ExternalModule>>
    {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.modules.module_for(name)
    }

    /// Every module referenced through `DW_TAG_module`, each looked up in the
    /// external module table, as a snapshot of that table.
    pub fn external_type_modules(&self) -> Vec<(String, Option<Arc<ExternalModule>>)>
    {
        for index in 0..self.num_compile_units() {
            let Ok(unit) = self
                .store
                .unit_at_index(index)
                .and_then(|unit| self.store.dies_unit(&unit))
            else {
                continue;
            };
            let dies = match unit.dies() {
                Ok(dies) => dies,
                Err(err) => {
                    self.diagnostics.record(&err);
                    continue;
                }
            };
            for die in dies.filter(|die| die.tag() == gimli::DW_TAG_module) {
                if let Some(name) = decl::qualified_name(&self.store, &die) {
                    self.external_module(&name);
                }
            }
        }
        let guard = self.state.lock();
        let entries = guard.borrow().modules.entries();
        entries
    }
}

impl fmt::Debug for SymbolFile
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("SymbolFile")
            .field("options", &self.options)
            .field("store", &self.store)
            .field("index_built", &self.index.is_built())
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}
