//! DIE references and the opaque user identifiers derived from them.
//!
//! A [`DieRef`] names one DIE anywhere in a module, companion files included:
//! which file, which section, and the byte offset inside that section. A
//! [`UserId`] packs the same triple into a `u64`:
//!
//! ```text
//!  63      62 ........... 32  31 ............. 0
//! [section][ file selector  ][   DIE offset    ]
//! ```
//!
//! File selector `0` is the main file; `n + 1` is the companion file of the
//! skeleton unit with physical index `n`. Offsets are limited to 32 bits.
//! Both conversions are total and inverse to each other for every reference
//! the reader hands out.

use std::fmt;

const SECTION_BIT: u64 = 1 << 63;
const FILE_SHIFT: u32 = 32;
const FILE_MASK: u64 = (1 << 31) - 1;
const OFFSET_MASK: u64 = u32::MAX as u64;

/// Section a DIE lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionKind
{
    /// `.debug_info` (or `.debug_info.dwo` in a companion file)
    DebugInfo,
    /// `.debug_types` (DWARF 4 type units)
    DebugTypes,
}

/// File a DIE lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileSelector
{
    /// The module's own object file
    Main,
    /// The companion file attached to the skeleton unit with this physical index
    Companion(u32),
}

/// Canonical cross-referencing key for a DIE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DieRef
{
    /// Owning file
    pub file: FileSelector,
    /// Owning section
    pub section: SectionKind,
    /// Byte offset of the DIE from the start of the section
    pub offset: u32,
}

impl DieRef
{
    /// Reference to a DIE in the main file's `.debug_info`.
    #[must_use]
    pub const fn main(offset: u32) -> Self
    {
        Self {
            file: FileSelector::Main,
            section: SectionKind::DebugInfo,
            offset,
        }
    }
}

impl fmt::Display for DieRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let section = match self.section {
            SectionKind::DebugInfo => ".debug_info",
            SectionKind::DebugTypes => ".debug_types",
        };
        match self.file {
            FileSelector::Main => write!(f, "{section}+0x{:x}", self.offset),
            FileSelector::Companion(unit) => write!(f, "companion[{unit}]:{section}+0x{:x}", self.offset),
        }
    }
}

/// Opaque numeric identifier handed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(u64);

impl UserId
{
    /// Wrap a raw identifier value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self
    {
        UserId(raw)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for UserId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{{0x{:016x}}}", self.0)
    }
}

impl From<DieRef> for UserId
{
    fn from(die: DieRef) -> Self
    {
        let section = match die.section {
            SectionKind::DebugInfo => 0,
            SectionKind::DebugTypes => SECTION_BIT,
        };
        // Physical unit indices stay far below 2^31 - 1: every unit header takes
        // at least 11 bytes of a section addressed with 32-bit offsets.
        let file = match die.file {
            FileSelector::Main => 0,
            FileSelector::Companion(unit) => (u64::from(unit) + 1) & FILE_MASK,
        };
        UserId(section | (file << FILE_SHIFT) | u64::from(die.offset))
    }
}

impl From<UserId> for DieRef
{
    fn from(id: UserId) -> Self
    {
        let section = if id.0 & SECTION_BIT == 0 {
            SectionKind::DebugInfo
        } else {
            SectionKind::DebugTypes
        };
        let file = match (id.0 >> FILE_SHIFT) & FILE_MASK {
            0 => FileSelector::Main,
            #[allow(clippy::cast_possible_truncation)]
            n => FileSelector::Companion((n - 1) as u32),
        };
        #[allow(clippy::cast_possible_truncation)]
        let offset = (id.0 & OFFSET_MASK) as u32;
        DieRef { file, section, offset }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_main_reference_round_trips()
    {
        let die = DieRef::main(0x2d);
        let id = UserId::from(die);
        assert_eq!(id.raw(), 0x2d);
        assert_eq!(DieRef::from(id), die);
    }

    #[test]
    fn test_companion_and_type_section_bits()
    {
        let die = DieRef {
            file: FileSelector::Companion(3),
            section: SectionKind::DebugTypes,
            offset: u32::MAX,
        };
        let id = UserId::from(die);
        assert_eq!(id.raw() >> 63, 1);
        assert_eq!((id.raw() >> 32) & FILE_MASK, 4);
        assert_eq!(DieRef::from(id), die);
    }

    #[test]
    fn test_distinct_references_get_distinct_ids()
    {
        let a = UserId::from(DieRef::main(0x10));
        let b = UserId::from(DieRef {
            file: FileSelector::Companion(0),
            section: SectionKind::DebugInfo,
            offset: 0x10,
        });
        let c = UserId::from(DieRef {
            file: FileSelector::Main,
            section: SectionKind::DebugTypes,
            offset: 0x10,
        });
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }
}
