//! Entry decoding.
//!
//! [`EntryDecoder`] walks a unit's DIE stream one entry at a time with gimli's
//! raw cursor: it reads the abbreviation code, looks the abbreviation up in
//! the unit's table (parsed once, when the unit is first opened) and decodes
//! every attribute by its form. It never builds a tree; the caller does that
//! from the depth reported with each entry.
//!
//! Attribute values are converted to the owned [`AttrValue`] so that decoded
//! entries outlive the cursor: strings are resolved through the string
//! sections, indexed addresses through `.debug_addr`, range lists are read
//! into address ranges and references become section offsets.

use std::sync::Arc;

use gimli::{Attribute, AttributeValue, DwAt, DwTag, EntriesRaw, Reader, Unit, UnitOffset};
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::{OwnedDwarf, OwnedReader};
use crate::error::{map_dwarf_error, Result, SymbolError};
use crate::types::{AddressRange, SectionKind};

/// Where a reference attribute points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DieTarget
{
    /// A DIE at a section offset in the same file as the referencing DIE
    Offset
    {
        /// Section holding the DIE
        section: SectionKind,
        /// Offset from the start of that section
        offset: u64,
    },
    /// The type DIE of the type unit with this signature (`DW_FORM_ref_sig8`)
    Signature(u64),
}

/// Owned attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue
{
    /// Target address (`DW_FORM_addr`, `DW_FORM_addrx*`)
    Address(u64),
    /// Unsigned or untyped constant
    Unsigned(u64),
    /// `DW_FORM_sdata`
    Signed(i64),
    /// Flag forms
    Flag(bool),
    /// Any string form, resolved
    String(Arc<str>),
    /// Reference to another DIE
    Reference(DieTarget),
    /// `DW_FORM_exprloc` bytes
    Expression(Arc<[u8]>),
    /// Block forms
    Block(Arc<[u8]>),
    /// Offset into some other section (line program, macros, bases)
    SectionOffset(u64),
    /// Address ranges read from the range list
    Ranges(Arc<[AddressRange]>),
    /// Offset of a location list
    LocationList(u64),
    /// `DW_AT_language`
    Language(gimli::DwLang),
    /// `DW_AT_encoding`
    Encoding(gimli::DwAte),
    /// Index into the line program's file table
    FileIndex(u64),
    /// Split-DWARF unit id
    DwoId(u64),
}

/// One decoded DIE.
#[derive(Debug, Clone)]
pub struct DecodedEntry
{
    /// Offset of the DIE from the start of its section
    pub offset: u32,
    /// Nesting depth relative to the entry decoding started at
    pub depth: isize,
    /// Tag from the abbreviation
    pub tag: DwTag,
    /// Whether children follow the entry
    pub has_children: bool,
    /// Attributes in abbreviation order
    pub attrs: SmallVec<[(DwAt, AttrValue); 8]>,
}

impl DecodedEntry
{
    /// Value of attribute `name`.
    #[must_use]
    pub fn attr(&self, name: DwAt) -> Option<&AttrValue>
    {
        self.attrs
            .iter()
            .find_map(|(attr, value)| (*attr == name).then_some(value))
    }

    /// String value of attribute `name`.
    #[must_use]
    pub fn string(&self, name: DwAt) -> Option<&str>
    {
        match self.attr(name)? {
            AttrValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Constant value of attribute `name` as unsigned.
    #[must_use]
    pub fn unsigned(&self, name: DwAt) -> Option<u64>
    {
        match self.attr(name)? {
            AttrValue::Unsigned(value) | AttrValue::FileIndex(value) => Some(*value),
            AttrValue::Signed(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Constant value of attribute `name` as signed.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn signed(&self, name: DwAt) -> Option<i64>
    {
        match self.attr(name)? {
            AttrValue::Signed(value) => Some(*value),
            AttrValue::Unsigned(value) => Some(*value as i64),
            _ => None,
        }
    }

    /// Whether flag attribute `name` is present and set.
    #[must_use]
    pub fn flag(&self, name: DwAt) -> bool
    {
        matches!(self.attr(name), Some(AttrValue::Flag(true)))
    }

    /// Target of reference attribute `name`.
    #[must_use]
    pub fn reference(&self, name: DwAt) -> Option<DieTarget>
    {
        match self.attr(name)? {
            AttrValue::Reference(target) => Some(*target),
            _ => None,
        }
    }

    /// `DW_AT_name`
    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.string(gimli::DW_AT_name)
    }

    /// `DW_AT_linkage_name`, falling back to the pre-standard MIPS spelling.
    #[must_use]
    pub fn linkage_name(&self) -> Option<&str>
    {
        self.string(gimli::DW_AT_linkage_name)
            .or_else(|| self.string(gimli::DW_AT_MIPS_linkage_name))
    }

    /// `DW_AT_declaration`
    #[must_use]
    pub fn is_declaration(&self) -> bool
    {
        self.flag(gimli::DW_AT_declaration)
    }

    /// Code ranges from `DW_AT_low_pc`/`DW_AT_high_pc` or `DW_AT_ranges`.
    #[must_use]
    pub fn ranges(&self) -> Vec<AddressRange>
    {
        if let Some(AttrValue::Ranges(ranges)) = self.attr(gimli::DW_AT_ranges) {
            return ranges.iter().copied().filter(|range| !range.is_empty()).collect();
        }
        let Some(AttrValue::Address(low)) = self.attr(gimli::DW_AT_low_pc) else {
            return Vec::new();
        };
        let high = match self.attr(gimli::DW_AT_high_pc) {
            Some(AttrValue::Address(high)) => *high,
            Some(AttrValue::Unsigned(length)) => low.saturating_add(*length),
            _ => return Vec::new(),
        };
        let range = AddressRange::new(*low, high);
        if range.is_empty() {
            Vec::new()
        } else {
            vec![range]
        }
    }
}

/// Sequential DIE decoder over one unit.
pub struct EntryDecoder<'unit>
{
    dwarf: &'unit OwnedDwarf,
    unit: &'unit Unit<OwnedReader>,
    section: SectionKind,
    base: u64,
    entries: EntriesRaw<'unit, 'unit, OwnedReader>,
}

impl<'unit> EntryDecoder<'unit>
{
    /// Start decoding `unit` (whose header sits at section offset `base`) at
    /// unit offset `start`, or at the root DIE when `start` is `None`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `start` lies outside the unit.
    pub fn new(
        dwarf: &'unit OwnedDwarf,
        unit: &'unit Unit<OwnedReader>,
        section: SectionKind,
        base: u64,
        start: Option<UnitOffset<usize>>,
    ) -> Result<Self>
    {
        let entries = unit
            .entries_raw(start)
            .map_err(|err| map_dwarf_error("positioning DIE cursor", err))?;
        Ok(Self {
            dwarf,
            unit,
            section,
            base,
            entries,
        })
    }

    /// Decode the next DIE, skipping end-of-children markers.
    ///
    /// Returns `Ok(None)` at the end of the unit.
    ///
    /// ## Errors
    ///
    /// Returns an error for an unknown abbreviation code, an unknown form or
    /// truncated data. The cursor is unusable afterwards.
    pub fn decode_next(&mut self) -> Result<Option<DecodedEntry>>
    {
        loop {
            if self.entries.is_empty() {
                return Ok(None);
            }
            let unit_offset = self.entries.next_offset();
            let depth = self.entries.next_depth();
            let abbrev = self
                .entries
                .read_abbreviation()
                .map_err(|err| map_dwarf_error(&format!("reading abbreviation at unit offset 0x{:x}", unit_offset.0), err))?;
            let Some(abbrev) = abbrev else {
                continue;
            };

            let mut attrs = SmallVec::new();
            for spec in abbrev.attributes() {
                let attr = self
                    .entries
                    .read_attribute(*spec)
                    .map_err(|err| map_dwarf_error("reading attribute value", err))?;
                if let Some(value) = self.convert(&attr) {
                    attrs.push((attr.name(), value));
                }
            }

            let section_offset = self.base + unit_offset.0 as u64;
            let offset = u32::try_from(section_offset).map_err(|_| SymbolError::OffsetOutOfRange(section_offset))?;
            trace!(offset, tag = %abbrev.tag(), depth, "decoded entry");
            return Ok(Some(DecodedEntry {
                offset,
                depth,
                tag: abbrev.tag(),
                has_children: abbrev.has_children(),
                attrs,
            }));
        }
    }

    fn convert(&self, attr: &Attribute<OwnedReader>) -> Option<AttrValue>
    {
        let value = attr.value();
        let converted = match value {
            AttributeValue::Addr(address) => AttrValue::Address(address),
            AttributeValue::DebugAddrIndex(_) => match self.dwarf.attr_address(self.unit, value) {
                Ok(Some(address)) => AttrValue::Address(address),
                Ok(None) => return None,
                Err(err) => return self.skip(attr.name(), "indexed address", &err),
            },
            AttributeValue::Data1(data) => AttrValue::Unsigned(data.into()),
            AttributeValue::Data2(data) => AttrValue::Unsigned(data.into()),
            AttributeValue::Data4(data) => AttrValue::Unsigned(data.into()),
            AttributeValue::Data8(data) | AttributeValue::Udata(data) => AttrValue::Unsigned(data),
            AttributeValue::Sdata(data) => AttrValue::Signed(data),
            AttributeValue::Flag(flag) => AttrValue::Flag(flag),
            AttributeValue::Block(block) => AttrValue::Block(owned_bytes(&block)?),
            AttributeValue::Exprloc(expression) => AttrValue::Expression(owned_bytes(&expression.0)?),
            AttributeValue::String(_)
            | AttributeValue::DebugStrRef(_)
            | AttributeValue::DebugStrOffsetsIndex(_)
            | AttributeValue::DebugLineStrRef(_)
            | AttributeValue::DebugStrRefSup(_) => match self.dwarf.attr_string(self.unit, value) {
                Ok(string) => match string.to_string_lossy() {
                    Ok(text) => AttrValue::String(Arc::from(text.as_ref())),
                    Err(err) => return self.skip(attr.name(), "string", &err),
                },
                Err(err) => return self.skip(attr.name(), "string", &err),
            },
            AttributeValue::UnitRef(offset) => AttrValue::Reference(DieTarget::Offset {
                section: self.section,
                offset: self.base + offset.0 as u64,
            }),
            AttributeValue::DebugInfoRef(offset) => AttrValue::Reference(DieTarget::Offset {
                section: SectionKind::DebugInfo,
                offset: offset.0 as u64,
            }),
            AttributeValue::DebugTypesRef(signature) => AttrValue::Reference(DieTarget::Signature(signature.0)),
            AttributeValue::RangeListsRef(_) | AttributeValue::DebugRngListsIndex(_) => {
                match self.read_ranges(value) {
                    Ok(ranges) => AttrValue::Ranges(ranges),
                    Err(err) => return self.skip(attr.name(), "range list", &err),
                }
            }
            AttributeValue::LocationListsRef(offset) => AttrValue::LocationList(offset.0 as u64),
            AttributeValue::DebugLocListsIndex(_) => match self.dwarf.attr_locations_offset(self.unit, value) {
                Ok(Some(offset)) => AttrValue::LocationList(offset.0 as u64),
                Ok(None) => return None,
                Err(err) => return self.skip(attr.name(), "location list index", &err),
            },
            AttributeValue::SecOffset(offset) => AttrValue::SectionOffset(offset as u64),
            AttributeValue::DebugLineRef(offset) => AttrValue::SectionOffset(offset.0 as u64),
            AttributeValue::DebugMacroRef(offset) => AttrValue::SectionOffset(offset.0 as u64),
            AttributeValue::DebugMacinfoRef(offset) => AttrValue::SectionOffset(offset.0 as u64),
            AttributeValue::DebugAddrBase(base) => AttrValue::SectionOffset(base.0 as u64),
            AttributeValue::DebugLocListsBase(base) => AttrValue::SectionOffset(base.0 as u64),
            AttributeValue::DebugRngListsBase(base) => AttrValue::SectionOffset(base.0 as u64),
            AttributeValue::DebugStrOffsetsBase(base) => AttrValue::SectionOffset(base.0 as u64),
            AttributeValue::Language(language) => AttrValue::Language(language),
            AttributeValue::Encoding(encoding) => AttrValue::Encoding(encoding),
            AttributeValue::FileIndex(index) => AttrValue::FileIndex(index),
            AttributeValue::DwoId(id) => AttrValue::DwoId(id.0),
            AttributeValue::Accessibility(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::Visibility(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::Virtuality(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::Inline(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::CallingConvention(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::Ordering(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::IdentifierCase(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::DecimalSign(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::Endianity(value) => AttrValue::Unsigned(value.0.into()),
            AttributeValue::AddressClass(value) => AttrValue::Unsigned(value.0),
            other => {
                trace!(attr = %attr.name(), "ignoring attribute value {other:?}");
                return None;
            }
        };
        Some(converted)
    }

    fn read_ranges(&self, value: AttributeValue<OwnedReader>) -> gimli::Result<Arc<[AddressRange]>>
    {
        let mut ranges = Vec::new();
        if let Some(mut iter) = self.dwarf.attr_ranges(self.unit, value)? {
            while let Some(range) = iter.next()? {
                ranges.push(AddressRange::from(range));
            }
        }
        Ok(ranges.into())
    }

    fn skip(&self, name: DwAt, what: &str, err: &gimli::Error) -> Option<AttrValue>
    {
        warn!(attr = %name, base = self.base, "skipping unreadable {what}: {err}");
        None
    }
}

fn owned_bytes(reader: &OwnedReader) -> Option<Arc<[u8]>>
{
    reader.to_slice().ok().map(|bytes| Arc::from(bytes.as_ref()))
}

/// Decode the single DIE at unit offset `offset`.
///
/// ## Errors
///
/// Returns an error if the offset is outside the unit or the DIE is malformed.
pub fn decode_entry_at(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    section: SectionKind,
    base: u64,
    offset: UnitOffset<usize>,
) -> Result<Option<DecodedEntry>>
{
    let mut decoder = EntryDecoder::new(dwarf, unit, section, base, Some(offset))?;
    decoder.decode_next()
}
