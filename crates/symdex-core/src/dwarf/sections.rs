//! Section loading.
//!
//! [`SectionProvider`] is the object-file collaborator: it hands out the bytes
//! of a named section. [`SectionStore`] sits in front of a provider and loads
//! every section at most once, with a one-shot cell per section so that a
//! slow load of one section never blocks access to another.
//!
//! A missing section is an empty byte range, not an error.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection};
use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::OwnedReader;
use crate::error::{Result, SymbolError};

/// Source of raw section bytes.
pub trait SectionProvider: Send + Sync
{
    /// Bytes of the section named `name` (ELF spelling, e.g. `.debug_info`).
    fn section_data(&self, name: &str) -> Option<Arc<[u8]>>;

    /// Whether the section exists, without necessarily reading it.
    fn has_section(&self, name: &str) -> bool
    {
        self.section_data(name).is_some()
    }

    /// Byte order of the file.
    fn endian(&self) -> RunTimeEndian;

    /// Path the data was read from, when there is one.
    fn path(&self) -> Option<&Path>
    {
        None
    }
}

/// Mach-O spells `.debug_info` as `__debug_info` and truncates names to 16 bytes.
fn candidate_names(name: &str) -> SmallVec<[String; 2]>
{
    let mut names = SmallVec::new();
    names.push(name.to_string());
    if let Some(stripped) = name.strip_prefix('.') {
        let mut macho = format!("__{stripped}");
        macho.truncate(16);
        names.push(macho);
    }
    names
}

/// Section provider over an ELF, Mach-O or PE image parsed with `object`.
pub struct ObjectFile
{
    path: Option<PathBuf>,
    data: Arc<[u8]>,
    endian: RunTimeEndian,
}

impl ObjectFile
{
    /// Read and parse the object file at `path`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or is not an object file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let mut file = Self::parse(Arc::from(bytes)).map_err(|err| match err {
            SymbolError::Object(message) => SymbolError::Object(format!("failed to parse {}: {message}", path.display())),
            other => other,
        })?;
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Parse an object file already in memory.
    ///
    /// ## Errors
    ///
    /// Returns an error if the bytes are not a recognized object file.
    pub fn parse(data: Arc<[u8]>) -> Result<Self>
    {
        let file = object::File::parse(&*data).map_err(|err| SymbolError::Object(err.to_string()))?;
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        Ok(Self {
            path: None,
            data,
            endian,
        })
    }
}

impl SectionProvider for ObjectFile
{
    fn section_data(&self, name: &str) -> Option<Arc<[u8]>>
    {
        let file = object::File::parse(&*self.data).ok()?;
        for candidate in candidate_names(name) {
            let Some(section) = file.section_by_name(&candidate) else {
                continue;
            };
            return match section.uncompressed_data() {
                Ok(Cow::Borrowed(bytes)) => Some(Arc::from(bytes)),
                Ok(Cow::Owned(bytes)) => Some(bytes.into()),
                Err(err) => {
                    warn!(section = %candidate, "failed to read section: {err}");
                    None
                }
            };
        }
        None
    }

    fn has_section(&self, name: &str) -> bool
    {
        object::File::parse(&*self.data).is_ok_and(|file| {
            candidate_names(name)
                .iter()
                .any(|candidate| file.section_by_name(candidate).is_some())
        })
    }

    fn endian(&self) -> RunTimeEndian
    {
        self.endian
    }

    fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }
}

impl fmt::Debug for ObjectFile
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ObjectFile")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .field("endian", &self.endian)
            .finish()
    }
}

/// Section provider over named in-memory byte ranges.
#[derive(Debug, Clone)]
pub struct MemorySections
{
    path: Option<PathBuf>,
    endian: RunTimeEndian,
    sections: HashMap<String, Arc<[u8]>>,
}

impl MemorySections
{
    /// Empty provider with the given byte order.
    #[must_use]
    pub fn new(endian: RunTimeEndian) -> Self
    {
        Self {
            path: None,
            endian,
            sections: HashMap::new(),
        }
    }

    /// Add (or replace) a section.
    #[must_use]
    pub fn with_section(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self
    {
        self.insert(name, bytes);
        self
    }

    /// Pretend the sections were read from `path` (used to locate `<path>.dwp`).
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.path = Some(path.into());
        self
    }

    /// Add (or replace) a section in place.
    pub fn insert(&mut self, name: &str, bytes: impl Into<Vec<u8>>)
    {
        self.sections.insert(name.to_string(), Arc::from(bytes.into()));
    }
}

impl SectionProvider for MemorySections
{
    fn section_data(&self, name: &str) -> Option<Arc<[u8]>>
    {
        self.sections.get(name).cloned()
    }

    fn has_section(&self, name: &str) -> bool
    {
        self.sections.contains_key(name)
    }

    fn endian(&self) -> RunTimeEndian
    {
        self.endian
    }

    fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }
}

/// Which spelling of the DWARF section names a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionFlavour
{
    /// `.debug_info`, `.debug_abbrev`, ...
    Standard,
    /// `.debug_info.dwo`, `.debug_abbrev.dwo`, ... (companion files and packages)
    Split,
}

const STORED_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugAranges,
    SectionId::DebugCuIndex,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugLoc,
    SectionId::DebugLocLists,
    SectionId::DebugMacinfo,
    SectionId::DebugMacro,
    SectionId::DebugPubNames,
    SectionId::DebugPubTypes,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
    SectionId::DebugTuIndex,
    SectionId::DebugTypes,
];

/// Lazily loaded, write-once section bytes of one file.
pub struct SectionStore
{
    provider: Arc<dyn SectionProvider>,
    flavour: SectionFlavour,
    slots: Vec<(SectionId, OnceCell<Arc<[u8]>>)>,
}

impl SectionStore
{
    /// Store over `provider` using the given section spelling.
    #[must_use]
    pub fn new(provider: Arc<dyn SectionProvider>, flavour: SectionFlavour) -> Self
    {
        let slots = STORED_SECTIONS.iter().map(|id| (*id, OnceCell::new())).collect();
        Self {
            provider,
            flavour,
            slots,
        }
    }

    /// Pick the flavour from the sections present: a file with `.debug_info.dwo`
    /// but no `.debug_info` is a companion file.
    #[must_use]
    pub fn detect(provider: Arc<dyn SectionProvider>) -> Self
    {
        let flavour = if !provider.has_section(".debug_info") && provider.has_section(".debug_info.dwo") {
            SectionFlavour::Split
        } else {
            SectionFlavour::Standard
        };
        Self::new(provider, flavour)
    }

    /// Section spelling of this store.
    #[must_use]
    pub fn flavour(&self) -> SectionFlavour
    {
        self.flavour
    }

    /// Byte order of the underlying file.
    #[must_use]
    pub fn endian(&self) -> RunTimeEndian
    {
        self.provider.endian()
    }

    /// Path of the underlying file, if known.
    #[must_use]
    pub fn path(&self) -> Option<&Path>
    {
        self.provider.path()
    }

    fn name_for(&self, id: SectionId) -> Option<&'static str>
    {
        match self.flavour {
            SectionFlavour::Standard => Some(id.name()),
            SectionFlavour::Split => id.dwo_name(),
        }
    }

    /// Bytes of section `id`, loading them on first use.
    ///
    /// Concurrent first calls for the same section perform a single load; the
    /// other callers wait for it. Absent sections yield an empty range.
    pub fn get(&self, id: SectionId) -> Arc<[u8]>
    {
        let Some((_, cell)) = self.slots.iter().find(|(slot, _)| *slot == id) else {
            trace!(section = id.name(), "section not stored");
            return Arc::from(Vec::new());
        };
        cell.get_or_init(|| {
            let Some(name) = self.name_for(id) else {
                return Arc::from(Vec::new());
            };
            match self.provider.section_data(name) {
                Some(bytes) => {
                    debug!(section = name, len = bytes.len(), "loaded section");
                    bytes
                }
                None => {
                    trace!(section = name, "section absent");
                    Arc::from(Vec::new())
                }
            }
        })
        .clone()
    }

    /// Section `id` wrapped in a gimli reader.
    pub fn reader(&self, id: SectionId) -> OwnedReader
    {
        EndianArcSlice::new(self.get(id), self.endian())
    }

    /// Whether section `id` has been loaded already.
    #[must_use]
    pub fn is_loaded(&self, id: SectionId) -> bool
    {
        self.slots
            .iter()
            .any(|(slot, cell)| *slot == id && cell.get().is_some())
    }

    /// Build gimli's section bundle. Every section it names is loaded through the store.
    pub(crate) fn load_dwarf(&self) -> super::OwnedDwarf
    {
        let loaded: std::result::Result<_, std::convert::Infallible> = gimli::Dwarf::load(|id| Ok(self.reader(id)));
        match loaded {
            Ok(dwarf) => dwarf,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for SectionStore
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let loaded: Vec<&'static str> = self
            .slots
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(id, _)| id.name())
            .collect();
        f.debug_struct("SectionStore")
            .field("flavour", &self.flavour)
            .field("path", &self.path())
            .field("loaded", &loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_macho_aliases_are_truncated()
    {
        let names = candidate_names(".debug_str_offsets");
        assert_eq!(names[0], ".debug_str_offsets");
        assert_eq!(names[1], "__debug_str_offs");
    }

    #[test]
    fn test_split_flavour_uses_dwo_names()
    {
        let provider = MemorySections::new(RunTimeEndian::Little).with_section(".debug_info.dwo", vec![1, 2, 3]);
        let store = SectionStore::detect(Arc::new(provider));
        assert_eq!(store.flavour(), SectionFlavour::Split);
        assert_eq!(&*store.get(SectionId::DebugInfo), &[1, 2, 3]);
        // No .dwo spelling exists for .debug_aranges
        assert!(store.get(SectionId::DebugAranges).is_empty());
    }

    #[test]
    fn test_absent_section_is_empty_and_loaded_once()
    {
        let store = SectionStore::new(Arc::new(MemorySections::new(RunTimeEndian::Big)), SectionFlavour::Standard);
        assert!(!store.is_loaded(SectionId::DebugLine));
        assert!(store.get(SectionId::DebugLine).is_empty());
        assert!(store.is_loaded(SectionId::DebugLine));
    }
}
