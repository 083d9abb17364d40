//! Compile units and their DIE forests.
//!
//! [`FileUnits::discover`] walks the unit headers of one file (`.debug_info`
//! first, then `.debug_types`) without decoding any DIE. A header that fails to
//! parse is recorded and skipped using its initial length, so one bad unit
//! never hides the units after it.
//!
//! Each [`CompileUnit`] decodes its whole DIE stream into a [`DieForest`] on
//! first access and keeps it for the rest of the module's lifetime. A decode
//! error keeps every DIE read before it and marks the unit as partially parsed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gimli::{DebugInfoOffset, DwarfFileType, DwTag, Reader, Section, Unit, UnitHeader, UnitSectionOffset, UnitType};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use super::decoder::{AttrValue, DecodedEntry, EntryDecoder};
use super::line::LineTable;
use super::{supported_version, OwnedDwarf, OwnedReader};
use crate::error::{map_dwarf_error, DiagnosticLog, Result, SymbolError};
use crate::types::{AddressRange, DieRef, FileSelector, SectionKind, SymbolLanguage, UserId};

/// How a unit takes part in split DWARF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitRole
{
    /// An ordinary unit holding its own DIEs
    Standalone,
    /// A skeleton whose DIEs live in a companion file
    Skeleton,
    /// The companion-file half of a skeleton
    Split,
    /// A type unit (`DW_UT_type` or `.debug_types`)
    Type,
}

/// Attributes of a unit's root DIE.
#[derive(Debug, Clone, Default)]
pub struct UnitInfo
{
    /// `DW_AT_name`
    pub name: Option<String>,
    /// `DW_AT_producer`
    pub producer: Option<String>,
    /// `DW_AT_comp_dir`
    pub comp_dir: Option<String>,
    /// `DW_AT_language`
    pub language: Option<gimli::DwLang>,
    /// `DW_AT_low_pc`
    pub low_pc: Option<u64>,
    /// Code ranges of the unit
    pub ranges: Vec<AddressRange>,
    /// `DW_AT_stmt_list`
    pub line_offset: Option<u64>,
    /// `DW_AT_macros`, `DW_AT_GNU_macros` or `DW_AT_macro_info`
    pub macro_offset: Option<u64>,
    /// `DW_AT_APPLE_optimized`
    pub is_optimized: bool,
    /// `DW_AT_dwo_name` or `DW_AT_GNU_dwo_name`
    pub dwo_name: Option<String>,
    /// `DW_AT_GNU_dwo_id` (DWARF 5 carries the id in the header)
    pub dwo_id: Option<u64>,
}

impl UnitInfo
{
    fn from_root(root: &DecodedEntry) -> Self
    {
        let text = |name| root.string(name).map(str::to_string);
        let section_offset = |name| match root.attr(name) {
            Some(AttrValue::SectionOffset(offset) | AttrValue::Unsigned(offset)) => Some(*offset),
            _ => None,
        };
        let language = match root.attr(gimli::DW_AT_language) {
            Some(AttrValue::Language(language)) => Some(*language),
            #[allow(clippy::cast_possible_truncation)]
            Some(AttrValue::Unsigned(value)) => Some(gimli::DwLang(*value as u16)),
            _ => None,
        };
        let low_pc = match root.attr(gimli::DW_AT_low_pc) {
            Some(AttrValue::Address(address)) => Some(*address),
            _ => None,
        };
        let dwo_id = match root.attr(gimli::DW_AT_GNU_dwo_id) {
            Some(AttrValue::DwoId(id) | AttrValue::Unsigned(id)) => Some(*id),
            _ => None,
        };
        Self {
            name: text(gimli::DW_AT_name),
            producer: text(gimli::DW_AT_producer),
            comp_dir: text(gimli::DW_AT_comp_dir),
            language,
            low_pc,
            ranges: root.ranges(),
            line_offset: section_offset(gimli::DW_AT_stmt_list),
            macro_offset: section_offset(gimli::DW_AT_macros)
                .or_else(|| section_offset(gimli::DW_AT_GNU_macros))
                .or_else(|| section_offset(gimli::DW_AT_macro_info)),
            is_optimized: root.flag(gimli::DW_AT_APPLE_optimized),
            dwo_name: text(gimli::DW_AT_dwo_name).or_else(|| text(gimli::DW_AT_GNU_dwo_name)),
            dwo_id,
        }
    }
}

/// One unit header and everything lazily derived from it.
pub struct CompileUnit
{
    index: usize,
    file: FileSelector,
    section: SectionKind,
    offset: u32,
    length: u64,
    header: UnitHeader<OwnedReader>,
    dwarf: Arc<OwnedDwarf>,
    diagnostics: Arc<DiagnosticLog>,
    gimli_unit: OnceCell<Unit<OwnedReader>>,
    info: OnceCell<UnitInfo>,
    forest: OnceCell<Arc<DieForest>>,
    line_table: OnceCell<Option<Arc<LineTable>>>,
}

impl CompileUnit
{
    /// Physical index of the unit within its file.
    #[must_use]
    pub fn index(&self) -> usize
    {
        self.index
    }

    /// File the unit was read from.
    #[must_use]
    pub fn file(&self) -> FileSelector
    {
        self.file
    }

    /// Section the unit was read from.
    #[must_use]
    pub fn section(&self) -> SectionKind
    {
        self.section
    }

    /// Section offset of the unit header.
    #[must_use]
    pub fn offset(&self) -> u32
    {
        self.offset
    }

    /// Length of the unit including its initial length field.
    #[must_use]
    pub fn length(&self) -> u64
    {
        self.length
    }

    /// Whether `offset` lies inside this unit.
    #[must_use]
    pub fn contains_offset(&self, section: SectionKind, offset: u32) -> bool
    {
        section == self.section && offset >= self.offset && u64::from(offset - self.offset) < self.length
    }

    /// DWARF version from the header.
    #[must_use]
    pub fn version(&self) -> u16
    {
        self.header.version()
    }

    /// Address size in bytes from the header.
    #[must_use]
    pub fn address_size(&self) -> u8
    {
        self.header.address_size()
    }

    /// The DWARF sections this unit decodes against.
    #[must_use]
    pub fn dwarf(&self) -> &Arc<OwnedDwarf>
    {
        &self.dwarf
    }

    /// Split-DWARF role of the unit.
    #[must_use]
    pub fn role(&self) -> UnitRole
    {
        match self.header.type_() {
            UnitType::Type { .. } | UnitType::SplitType { .. } => UnitRole::Type,
            UnitType::Skeleton(_) => UnitRole::Skeleton,
            UnitType::SplitCompilation(_) => UnitRole::Split,
            _ if self.section == SectionKind::DebugTypes => UnitRole::Type,
            _ if self.dwarf.file_type == DwarfFileType::Dwo => UnitRole::Split,
            _ if self.dwo_id().is_some() => UnitRole::Skeleton,
            _ => UnitRole::Standalone,
        }
    }

    /// Split-DWARF id linking a skeleton to its companion unit.
    #[must_use]
    pub fn dwo_id(&self) -> Option<u64>
    {
        match self.header.type_() {
            UnitType::Skeleton(id) | UnitType::SplitCompilation(id) => Some(id.0),
            UnitType::Type { .. } | UnitType::SplitType { .. } => None,
            _ => self.info().ok().and_then(|info| info.dwo_id),
        }
    }

    /// Split-DWARF id read without initialising any cached state, so that a
    /// companion unit can still adopt its skeleton's bases afterwards.
    pub(crate) fn peek_dwo_id(&self) -> Option<u64>
    {
        if let UnitType::Skeleton(id) | UnitType::SplitCompilation(id) = self.header.type_() {
            return Some(id.0);
        }
        let unit = Unit::new(&self.dwarf, self.header.clone()).ok()?;
        if let Some(id) = unit.dwo_id {
            return Some(id.0);
        }
        let mut decoder = EntryDecoder::new(&self.dwarf, &unit, self.section, u64::from(self.offset), None).ok()?;
        let root = decoder.decode_next().ok()??;
        UnitInfo::from_root(&root).dwo_id
    }

    /// Signature and type-DIE offset of a type unit.
    #[must_use]
    pub fn type_signature(&self) -> Option<(u64, u32)>
    {
        match self.header.type_() {
            UnitType::Type {
                type_signature,
                type_offset,
            }
            | UnitType::SplitType {
                type_signature,
                type_offset,
            } => {
                let offset = u64::from(self.offset) + type_offset.0 as u64;
                Some((type_signature.0, u32::try_from(offset).ok()?))
            }
            _ => None,
        }
    }

    /// gimli's view of the unit (abbreviations, bases, line program header).
    ///
    /// ## Errors
    ///
    /// Returns an error if the abbreviation table or root attributes are malformed.
    pub fn gimli_unit(&self) -> Result<&Unit<OwnedReader>>
    {
        self.gimli_unit.get_or_try_init(|| {
            Unit::new(&self.dwarf, self.header.clone()).map_err(|err| map_dwarf_error("parsing unit abbreviations", err))
        })
    }

    /// Attach a split unit to its skeleton: inherit the skeleton's address,
    /// range and string-offset bases. Must run before the unit is first used.
    pub(crate) fn adopt_skeleton(&self, skeleton: &CompileUnit) -> Result<()>
    {
        let mut unit =
            Unit::new(&self.dwarf, self.header.clone()).map_err(|err| map_dwarf_error("parsing split unit", err))?;
        unit.copy_relocated_attributes(skeleton.gimli_unit()?);
        if self.gimli_unit.set(unit).is_err() {
            debug!(unit = self.index, "split unit already initialised");
        }
        Ok(())
    }

    /// Attributes of the root DIE.
    ///
    /// ## Errors
    ///
    /// Returns an error if the root DIE cannot be decoded.
    pub fn info(&self) -> Result<&UnitInfo>
    {
        self.info.get_or_try_init(|| {
            if let Some(forest) = self.forest.get() {
                if let Some(root) = forest.nodes.first() {
                    return Ok(UnitInfo::from_root(&root.entry));
                }
            }
            let unit = self.gimli_unit()?;
            let mut decoder = EntryDecoder::new(&self.dwarf, unit, self.section, u64::from(self.offset), None)?;
            let root = decoder.decode_next()?;
            Ok(root.as_ref().map(UnitInfo::from_root).unwrap_or_default())
        })
    }

    /// Source language of the unit.
    #[must_use]
    pub fn language(&self) -> Option<SymbolLanguage>
    {
        self.info()
            .ok()
            .and_then(|info| info.language)
            .map(SymbolLanguage::from_dwarf)
    }

    /// The decoded DIE forest, built on first access.
    ///
    /// ## Errors
    ///
    /// Returns an error only if the unit cannot be opened at all; decode errors
    /// past the root produce a partial forest instead.
    pub fn forest(&self) -> Result<Arc<DieForest>>
    {
        self.forest
            .get_or_try_init(|| {
                let unit = self.gimli_unit()?;
                let mut decoder = EntryDecoder::new(&self.dwarf, unit, self.section, u64::from(self.offset), None)?;
                let forest = DieForest::build(&mut decoder);
                debug!(unit = self.index, file = ?self.file, dies = forest.len(), "decoded unit");
                if let Some(reason) = forest.error() {
                    self.diagnostics.record(&SymbolError::PartialUnit {
                        unit: self.index,
                        reason: reason.to_string(),
                    });
                }
                Ok(Arc::new(forest))
            })
            .cloned()
    }

    /// Whether the forest has been decoded.
    #[must_use]
    pub fn is_decoded(&self) -> bool
    {
        self.forest.get().is_some()
    }

    /// Reason decoding stopped early, if it did.
    #[must_use]
    pub fn partial_error(&self) -> Option<String>
    {
        self.forest.get().and_then(|forest| forest.error().map(str::to_string))
    }

    /// The unit's line table (`None` when the unit has no `DW_AT_stmt_list`).
    ///
    /// ## Errors
    ///
    /// Returns an error if the line program is malformed.
    pub fn line_table(&self) -> Result<Option<Arc<LineTable>>>
    {
        self.line_table
            .get_or_try_init(|| {
                let unit = self.gimli_unit()?;
                let Some(program) = unit.line_program.clone() else {
                    return Ok(None);
                };
                LineTable::build(&self.dwarf, unit, program).map(|table| Some(Arc::new(table)))
            })
            .cloned()
    }

    /// Root DIE of the unit.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit cannot be decoded or is empty.
    pub fn root(self: &Arc<Self>) -> Result<Die>
    {
        let forest = self.forest()?;
        if forest.is_empty() {
            return Err(SymbolError::DieNotFound(self.die_ref(self.offset)));
        }
        Ok(Die {
            unit: Arc::clone(self),
            forest,
            index: 0,
        })
    }

    /// DIE at section offset `offset` inside this unit (decoding the unit if needed).
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::DieNotFound`] if no DIE starts at `offset`.
    pub fn die_at(self: &Arc<Self>, offset: u32) -> Result<Die>
    {
        let forest = self.forest()?;
        let index = forest
            .index_of(offset)
            .ok_or_else(|| SymbolError::DieNotFound(self.die_ref(offset)))?;
        Ok(Die {
            unit: Arc::clone(self),
            forest,
            index,
        })
    }

    /// Every DIE of the unit in offset order (decoding the unit if needed).
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit cannot be opened.
    pub fn dies(self: &Arc<Self>) -> Result<impl Iterator<Item = Die>>
    {
        let forest = self.forest()?;
        let unit = Arc::clone(self);
        let count = u32::try_from(forest.len()).unwrap_or(u32::MAX);
        Ok((0..count).map(move |index| Die {
            unit: Arc::clone(&unit),
            forest: Arc::clone(&forest),
            index,
        }))
    }

    /// DIE at `offset` only if the forest is already decoded.
    #[must_use]
    pub fn cached_die_at(self: &Arc<Self>, offset: u32) -> Option<Die>
    {
        let forest = self.forest.get()?.clone();
        let index = forest.index_of(offset)?;
        Some(Die {
            unit: Arc::clone(self),
            forest,
            index,
        })
    }

    /// Reference to a DIE of this unit.
    #[must_use]
    pub fn die_ref(&self, offset: u32) -> DieRef
    {
        DieRef {
            file: self.file,
            section: self.section,
            offset,
        }
    }
}

impl fmt::Debug for CompileUnit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("CompileUnit")
            .field("index", &self.index)
            .field("file", &self.file)
            .field("section", &self.section)
            .field("offset", &format_args!("0x{:x}", self.offset))
            .field("version", &self.version())
            .field("decoded", &self.is_decoded())
            .finish_non_exhaustive()
    }
}

/// Every unit of one DWARF file.
#[derive(Debug)]
pub struct FileUnits
{
    file: FileSelector,
    dwarf: Arc<OwnedDwarf>,
    units: Vec<Arc<CompileUnit>>,
    signatures: HashMap<u64, usize>,
}

impl FileUnits
{
    /// Walk the unit headers of `dwarf`. Never fails: problems are recorded in
    /// `diagnostics` and the offending unit is skipped.
    pub(crate) fn discover(file: FileSelector, dwarf: Arc<OwnedDwarf>, diagnostics: &Arc<DiagnosticLog>) -> Self
    {
        let mut headers = Vec::new();
        walk_info_headers(&dwarf, diagnostics, &mut headers);

        let mut type_headers = dwarf.type_units();
        loop {
            match type_headers.next() {
                Ok(Some(header)) => headers.push((SectionKind::DebugTypes, header)),
                Ok(None) => break,
                Err(err) => {
                    diagnostics.record(&map_dwarf_error("reading .debug_types unit header", err));
                    break;
                }
            }
        }

        let mut units = Vec::with_capacity(headers.len());
        let mut signatures = HashMap::new();
        for (section, header) in headers {
            let offset = match header.offset() {
                UnitSectionOffset::DebugInfoOffset(offset) => offset.0,
                UnitSectionOffset::DebugTypesOffset(offset) => offset.0,
            };
            let length = header.length_including_self() as u64;
            let Ok(offset) = u32::try_from(offset) else {
                diagnostics.record(&SymbolError::OffsetOutOfRange(offset as u64));
                continue;
            };
            if u64::from(offset) + length > u64::from(u32::MAX) + 1 {
                diagnostics.record(&SymbolError::OffsetOutOfRange(u64::from(offset) + length));
                continue;
            }
            let unit = Arc::new(CompileUnit {
                index: units.len(),
                file,
                section,
                offset,
                length,
                header,
                dwarf: Arc::clone(&dwarf),
                diagnostics: Arc::clone(diagnostics),
                gimli_unit: OnceCell::new(),
                info: OnceCell::new(),
                forest: OnceCell::new(),
                line_table: OnceCell::new(),
            });
            if let Some((signature, _)) = unit.type_signature() {
                signatures.entry(signature).or_insert(unit.index);
            }
            units.push(unit);
        }
        debug!(file = ?file, units = units.len(), "discovered units");

        Self {
            file,
            dwarf,
            units,
            signatures,
        }
    }

    /// File these units belong to.
    #[must_use]
    pub fn file(&self) -> FileSelector
    {
        self.file
    }

    /// The file's sections.
    #[must_use]
    pub fn dwarf(&self) -> &Arc<OwnedDwarf>
    {
        &self.dwarf
    }

    /// Every unit in physical order.
    #[must_use]
    pub fn units(&self) -> &[Arc<CompileUnit>]
    {
        &self.units
    }

    /// Unit with physical index `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<CompileUnit>>
    {
        self.units.get(index)
    }

    /// Unit whose byte range covers `offset` in `section`.
    #[must_use]
    pub fn unit_containing(&self, section: SectionKind, offset: u32) -> Option<&Arc<CompileUnit>>
    {
        let index = self
            .units
            .partition_point(|unit| (unit.section, unit.offset) <= (section, offset));
        let unit = self.units.get(index.checked_sub(1)?)?;
        unit.contains_offset(section, offset).then_some(unit)
    }

    /// Type unit carrying `signature`.
    #[must_use]
    pub fn type_unit_for_signature(&self, signature: u64) -> Option<&Arc<CompileUnit>>
    {
        self.signatures.get(&signature).and_then(|index| self.units.get(*index))
    }
}

fn walk_info_headers(
    dwarf: &OwnedDwarf,
    diagnostics: &DiagnosticLog,
    headers: &mut Vec<(SectionKind, UnitHeader<OwnedReader>)>,
)
{
    let section = dwarf.debug_info.reader().clone();
    let end = section.len();
    let mut offset = 0usize;
    while offset < end {
        match dwarf.debug_info.header_from_offset(DebugInfoOffset(offset)) {
            Ok(header) => {
                let next = offset + header.length_including_self();
                if supported_version(header.version()) {
                    headers.push((SectionKind::DebugInfo, header));
                } else {
                    diagnostics.record(&SymbolError::UnsupportedVersion {
                        offset: offset as u64,
                        version: header.version(),
                    });
                }
                offset = next;
            }
            Err(err) => {
                let Some((next, version)) = peek_unit(&section, offset) else {
                    diagnostics.record(&map_dwarf_error(&format!("reading unit header at 0x{offset:x}"), err));
                    break;
                };
                if supported_version(version) {
                    diagnostics.record(&map_dwarf_error(&format!("reading unit header at 0x{offset:x}"), err));
                } else {
                    diagnostics.record(&SymbolError::UnsupportedVersion {
                        offset: offset as u64,
                        version,
                    });
                }
                if next > end {
                    warn!(offset, "unit length runs past the end of .debug_info");
                    break;
                }
                offset = next;
            }
        }
    }
}

/// Read just the initial length and version of the unit at `offset`.
fn peek_unit(section: &OwnedReader, offset: usize) -> Option<(usize, u16)>
{
    let mut reader = section.clone();
    reader.skip(offset).ok()?;
    let (length, format) = reader.read_initial_length().ok()?;
    let version = reader.read_u16().ok()?;
    let next = offset
        .checked_add(length)?
        .checked_add(usize::from(format.initial_length_size()))?;
    Some((next, version))
}

/// One DIE of a forest plus its tree links.
#[derive(Debug, Clone)]
pub struct DieNode
{
    /// The decoded entry
    pub entry: DecodedEntry,
    /// Index of the parent node
    pub parent: Option<u32>,
    /// Index of the first child
    pub first_child: Option<u32>,
    /// Index of the next sibling
    pub next_sibling: Option<u32>,
}

/// Decoded DIEs of one unit in offset order, with tree links.
#[derive(Debug, Default)]
pub struct DieForest
{
    nodes: Vec<DieNode>,
    error: Option<String>,
}

impl DieForest
{
    /// Decode everything `decoder` yields, linking nodes by depth.
    pub(crate) fn build(decoder: &mut EntryDecoder<'_>) -> Self
    {
        let mut nodes: Vec<DieNode> = Vec::new();
        let mut last_child: Vec<Option<u32>> = Vec::new();
        // (depth of the children, index of the parent) for every open parent
        let mut open: Vec<(isize, u32)> = Vec::new();
        let mut last_top: Option<u32> = None;
        let mut error = None;

        loop {
            let entry = match decoder.decode_next() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    error = Some(err.to_string());
                    break;
                }
            };
            let Ok(index) = u32::try_from(nodes.len()) else {
                error = Some("too many DIEs in one unit".to_string());
                break;
            };
            while open.last().is_some_and(|(depth, _)| *depth > entry.depth) {
                open.pop();
            }
            let parent = open
                .last()
                .and_then(|(depth, parent)| (*depth == entry.depth).then_some(*parent));

            let previous = match parent {
                Some(parent) => last_child[parent as usize].replace(index),
                None => last_top.replace(index),
            };
            match (previous, parent) {
                (Some(previous), _) => nodes[previous as usize].next_sibling = Some(index),
                (None, Some(parent)) => nodes[parent as usize].first_child = Some(index),
                (None, None) => {}
            }
            if entry.has_children {
                open.push((entry.depth + 1, index));
            }
            nodes.push(DieNode {
                entry,
                parent,
                first_child: None,
                next_sibling: None,
            });
            last_child.push(None);
        }

        Self { nodes, error }
    }

    /// Number of decoded DIEs.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    /// Whether nothing was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.nodes.is_empty()
    }

    /// Why decoding stopped early, if it did.
    #[must_use]
    pub fn error(&self) -> Option<&str>
    {
        self.error.as_deref()
    }

    /// Node at `index`.
    #[must_use]
    pub fn node(&self, index: u32) -> Option<&DieNode>
    {
        self.nodes.get(index as usize)
    }

    /// Every node in offset order.
    #[must_use]
    pub fn nodes(&self) -> &[DieNode]
    {
        &self.nodes
    }

    /// Index of the DIE starting at section offset `offset`.
    #[must_use]
    pub fn index_of(&self, offset: u32) -> Option<u32>
    {
        let index = self
            .nodes
            .binary_search_by_key(&offset, |node| node.entry.offset)
            .ok()?;
        u32::try_from(index).ok()
    }
}

/// Handle to one DIE: the owning unit, its forest, and a node index.
#[derive(Clone)]
pub struct Die
{
    unit: Arc<CompileUnit>,
    forest: Arc<DieForest>,
    index: u32,
}

impl Die
{
    fn node(&self) -> &DieNode
    {
        &self.forest.nodes[self.index as usize]
    }

    fn at(&self, index: u32) -> Die
    {
        Die {
            unit: Arc::clone(&self.unit),
            forest: Arc::clone(&self.forest),
            index,
        }
    }

    /// Owning unit.
    #[must_use]
    pub fn unit(&self) -> &Arc<CompileUnit>
    {
        &self.unit
    }

    /// Decoded tag and attributes.
    #[must_use]
    pub fn entry(&self) -> &DecodedEntry
    {
        &self.node().entry
    }

    /// DIE tag.
    #[must_use]
    pub fn tag(&self) -> DwTag
    {
        self.node().entry.tag
    }

    /// Section offset of the DIE.
    #[must_use]
    pub fn offset(&self) -> u32
    {
        self.node().entry.offset
    }

    /// Canonical reference to the DIE.
    #[must_use]
    pub fn die_ref(&self) -> DieRef
    {
        self.unit.die_ref(self.offset())
    }

    /// Opaque identifier of the DIE.
    #[must_use]
    pub fn uid(&self) -> UserId
    {
        UserId::from(self.die_ref())
    }

    /// `DW_AT_name`
    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.node().entry.name()
    }

    /// Parent DIE (`None` for the unit root).
    #[must_use]
    pub fn parent(&self) -> Option<Die>
    {
        self.node().parent.map(|index| self.at(index))
    }

    /// Direct children in order.
    #[must_use]
    pub fn children(&self) -> Children
    {
        Children {
            die: self.clone(),
            next: self.node().first_child,
        }
    }

    /// Whether this is the unit's root DIE.
    #[must_use]
    pub fn is_root(&self) -> bool
    {
        self.index == 0
    }
}

impl PartialEq for Die
{
    fn eq(&self, other: &Self) -> bool
    {
        self.die_ref() == other.die_ref()
    }
}

impl Eq for Die {}

impl fmt::Debug for Die
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Die")
            .field("at", &self.die_ref())
            .field("tag", &self.tag())
            .field("name", &self.name())
            .finish()
    }
}

/// Iterator over the children of a DIE.
pub struct Children
{
    die: Die,
    next: Option<u32>,
}

impl Iterator for Children
{
    type Item = Die;

    fn next(&mut self) -> Option<Die>
    {
        let index = self.next?;
        let child = self.die.at(index);
        self.next = child.node().next_sibling;
        Some(child)
    }
}
