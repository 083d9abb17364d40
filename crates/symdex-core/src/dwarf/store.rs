//! The compile unit store of a module.
//!
//! Owns the main file's sections and units plus the companion table, and
//! answers every "which DIE is this" question. Skeleton units are transparent
//! here: asking for a skeleton's root DIE yields the root of its split unit in
//! the companion file.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::decoder::DieTarget;
use super::identity::{Companion, CompanionResolver, CompanionState, CompanionTable};
use super::sections::SectionStore;
use super::unit::{CompileUnit, Die, FileUnits, UnitRole};
use super::OwnedDwarf;
use crate::error::{DiagnosticLog, Result, SymbolError};
use crate::types::{DieRef, FileSelector};

struct MainUnits
{
    dwarf: Arc<OwnedDwarf>,
    units: Arc<FileUnits>,
    /// Physical indices of the compile (non-type) units, in order
    logical: Vec<usize>,
    companions: CompanionTable,
}

/// Units of the main file and, behind skeletons, of its companion files.
pub struct UnitStore
{
    sections: SectionStore,
    resolver: Arc<dyn CompanionResolver>,
    diagnostics: Arc<DiagnosticLog>,
    main: OnceCell<MainUnits>,
}

impl UnitStore
{
    pub(crate) fn new(
        sections: SectionStore,
        resolver: Arc<dyn CompanionResolver>,
        diagnostics: Arc<DiagnosticLog>,
    ) -> Self
    {
        Self {
            sections,
            resolver,
            diagnostics,
            main: OnceCell::new(),
        }
    }

    fn main(&self) -> &MainUnits
    {
        self.main.get_or_init(|| {
            let dwarf = Arc::new(self.sections.load_dwarf());
            let units = Arc::new(FileUnits::discover(FileSelector::Main, Arc::clone(&dwarf), &self.diagnostics));
            let logical: Vec<usize> = units
                .units()
                .iter()
                .filter(|unit| unit.role() != UnitRole::Type)
                .map(|unit| unit.index())
                .collect();
            debug!(units = units.units().len(), compile_units = logical.len(), "indexed main file units");
            let companions = CompanionTable::new(
                Arc::clone(&self.resolver),
                Arc::clone(&dwarf),
                units.units().len(),
                Arc::clone(&self.diagnostics),
            );
            MainUnits {
                dwarf,
                units,
                logical,
                companions,
            }
        })
    }

    /// Section store of the main file.
    #[must_use]
    pub fn sections(&self) -> &SectionStore
    {
        &self.sections
    }

    /// Whether unit discovery has run.
    #[must_use]
    pub fn is_discovered(&self) -> bool
    {
        self.main.get().is_some()
    }

    /// gimli's section bundle for the main file.
    #[must_use]
    pub fn dwarf(&self) -> &Arc<OwnedDwarf>
    {
        &self.main().dwarf
    }

    /// Every unit of the main file, type units included.
    #[must_use]
    pub fn main_units(&self) -> &Arc<FileUnits>
    {
        &self.main().units
    }

    /// Number of logical compile units (type units excluded).
    #[must_use]
    pub fn num_compile_units(&self) -> usize
    {
        self.main().logical.len()
    }

    /// Compile unit with logical index `index`.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::UnitIndexOutOfRange`] past the last unit.
    pub fn unit_at_index(&self, index: usize) -> Result<Arc<CompileUnit>>
    {
        let main = self.main();
        main.logical
            .get(index)
            .and_then(|physical| main.units.get(*physical))
            .cloned()
            .ok_or(SymbolError::UnitIndexOutOfRange {
                index,
                count: main.logical.len(),
            })
    }

    /// Every logical compile unit in order.
    #[must_use]
    pub fn compile_units(&self) -> Vec<Arc<CompileUnit>>
    {
        let main = self.main();
        main.logical
            .iter()
            .filter_map(|physical| main.units.get(*physical).cloned())
            .collect()
    }

    /// Logical index of `unit`. A companion unit maps to its skeleton's index.
    #[must_use]
    pub fn logical_index_of(&self, unit: &CompileUnit) -> Option<usize>
    {
        let physical = match unit.file() {
            FileSelector::Main => unit.index(),
            FileSelector::Companion(skeleton) => skeleton as usize,
        };
        self.main().logical.binary_search(&physical).ok()
    }

    /// Units of the file named by `file`, loading a companion if needed.
    ///
    /// ## Errors
    ///
    /// Returns an error if `file` names a companion that cannot be loaded.
    pub fn file_units(&self, file: FileSelector) -> Result<Arc<FileUnits>>
    {
        match file {
            FileSelector::Main => Ok(Arc::clone(self.main_units())),
            FileSelector::Companion(skeleton) => {
                let unit = self
                    .main_units()
                    .get(skeleton as usize)
                    .cloned()
                    .ok_or(SymbolError::UnitNotFound(u64::from(skeleton)))?;
                Ok(Arc::clone(self.companion(&unit)?.units()))
            }
        }
    }

    /// Companion of a skeleton unit, loading it on first use.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::MissingCompanion`] if it cannot be found.
    pub fn companion(&self, skeleton: &Arc<CompileUnit>) -> Result<Arc<Companion>>
    {
        self.main().companions.companion(skeleton)
    }

    /// The unit whose forest holds `unit`'s DIEs: its split unit for a
    /// skeleton, the unit itself otherwise.
    ///
    /// ## Errors
    ///
    /// Returns an error if `unit` is a skeleton whose companion is missing.
    pub fn dies_unit(&self, unit: &Arc<CompileUnit>) -> Result<Arc<CompileUnit>>
    {
        if unit.file() == FileSelector::Main && unit.role() == UnitRole::Skeleton {
            Ok(Arc::clone(self.companion(unit)?.unit()))
        } else {
            Ok(Arc::clone(unit))
        }
    }

    /// Unit covering the referenced DIE.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::UnitNotFound`] if no unit covers the offset.
    pub fn unit_containing(&self, die: DieRef) -> Result<Arc<CompileUnit>>
    {
        self.file_units(die.file)?
            .unit_containing(die.section, die.offset)
            .cloned()
            .ok_or(SymbolError::UnitNotFound(u64::from(die.offset)))
    }

    /// DIE named by a reference.
    ///
    /// ## Errors
    ///
    /// Returns an error if the reference does not name a DIE.
    pub fn die_for_ref(&self, die: DieRef) -> Result<Die>
    {
        let unit = self.unit_containing(die)?;
        self.die_at_offset(&unit, die.offset)
    }

    /// DIE at section offset `offset` of `unit`, following a skeleton root to
    /// the root of its split unit.
    ///
    /// ## Errors
    ///
    /// Returns an error if no DIE starts there or a needed companion is missing.
    pub fn die_at_offset(&self, unit: &Arc<CompileUnit>, offset: u32) -> Result<Die>
    {
        let die = unit.die_at(offset)?;
        if die.is_root() && unit.file() == FileSelector::Main && unit.role() == UnitRole::Skeleton {
            return self.companion(unit)?.unit().root();
        }
        Ok(die)
    }

    /// Like [`die_at_offset`](Self::die_at_offset), but never loads a companion.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::CompanionNotYetResolved`] when the DIE lives in a
    /// companion that has not been loaded yet.
    pub fn cached_die_at_offset(&self, unit: &Arc<CompileUnit>, offset: u32) -> Result<Die>
    {
        let die = unit.die_at(offset)?;
        if !(die.is_root() && unit.file() == FileSelector::Main && unit.role() == UnitRole::Skeleton) {
            return Ok(die);
        }
        match self.main().companions.cached(unit) {
            None => Err(SymbolError::CompanionNotYetResolved(unit.index())),
            Some(CompanionState::Missing(dwo_name)) => Err(SymbolError::MissingCompanion {
                unit: unit.index(),
                dwo_name: dwo_name.clone(),
            }),
            Some(CompanionState::Loaded(companion)) => companion.unit().root(),
        }
    }

    /// Type unit carrying `signature`, looked up in `file` and then in the main file.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::UnresolvedSignature`] if no such type unit exists.
    pub fn type_unit_for_signature(&self, signature: u64, file: FileSelector) -> Result<Arc<CompileUnit>>
    {
        if file != FileSelector::Main {
            if let Some(unit) = self.file_units(file)?.type_unit_for_signature(signature) {
                return Ok(Arc::clone(unit));
            }
        }
        self.main_units()
            .type_unit_for_signature(signature)
            .cloned()
            .ok_or(SymbolError::UnresolvedSignature(signature))
    }

    /// Follow a reference attribute of `from`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the target does not exist.
    pub fn resolve_target(&self, from: &Die, target: DieTarget) -> Result<Die>
    {
        match target {
            DieTarget::Offset { section, offset } => {
                let offset = u32::try_from(offset).map_err(|_| SymbolError::OffsetOutOfRange(offset))?;
                let die = DieRef {
                    file: from.unit().file(),
                    section,
                    offset,
                };
                if from.unit().contains_offset(section, offset) {
                    return from.unit().die_at(offset);
                }
                self.die_for_ref(die)
            }
            DieTarget::Signature(signature) => {
                let unit = self.type_unit_for_signature(signature, from.unit().file())?;
                let (_, type_offset) = unit
                    .type_signature()
                    .ok_or(SymbolError::UnresolvedSignature(signature))?;
                unit.die_at(type_offset)
            }
        }
    }

    /// Every companion that is loaded or loadable, paired with its skeleton.
    /// Missing companions are recorded once and skipped.
    #[must_use]
    pub fn companions(&self) -> Vec<(Arc<CompileUnit>, Arc<Companion>)>
    {
        self.compile_units()
            .into_iter()
            .filter(|unit| unit.role() == UnitRole::Skeleton)
            .filter_map(|unit| {
                let companion = self.companion(&unit).ok()?;
                Some((unit, companion))
            })
            .collect()
    }

    /// Shared diagnostics log.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<DiagnosticLog>
    {
        &self.diagnostics
    }
}

impl std::fmt::Debug for UnitStore
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("UnitStore")
            .field("sections", &self.sections)
            .field("discovered", &self.is_discovered())
            .finish_non_exhaustive()
    }
}
