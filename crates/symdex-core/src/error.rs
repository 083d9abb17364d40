//! # Error Types
//!
//! Error handling for the DWARF reader.
//!
//! We use `thiserror` to generate the `Error` trait implementations. Every
//! variant belongs to one [`ErrorCategory`], which mirrors how the reader
//! recovers from it:
//!
//! 1. **Format**: malformed sections, bad abbreviation codes, truncated data.
//!    Scoped to the offending unit, which keeps what decoded before the failure.
//! 2. **Reference**: a DIE reference or companion file that cannot be found.
//!    Only the query touching it fails.
//! 3. **Cycle**: circular type definitions. The type stays incomplete.
//! 4. **Unsupported**: DWARF versions or constructs the reader does not handle.
//!    The unit is skipped.
//! 5. **Usage**: caller mistakes (bad unit index, invalid regex, wrong DIE kind).
//! 6. **Io**: reading or parsing the object file itself.
//!
//! Nothing here is fatal for a module. Non-fatal failures discovered while
//! indexing are also recorded as [`Diagnostic`] values in a [`DiagnosticLog`].

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::types::ids::DieRef;

/// Main error type for symbol file operations
#[derive(Error, Debug)]
pub enum SymbolError
{
    /// gimli rejected some DWARF data
    ///
    /// `context` names what was being read when the error occurred.
    #[error("{context}: {message}")]
    Dwarf
    {
        /// What was being read (e.g. "reading .debug_info unit header")
        context: String,
        /// gimli's description of the failure
        message: String,
    },

    /// A unit header carries a DWARF version outside the supported set
    #[error("unsupported DWARF version {version} in unit at offset 0x{offset:x}")]
    UnsupportedVersion
    {
        /// Section offset of the unit header
        offset: u64,
        /// Version field from the header
        version: u16,
    },

    /// A DIE offset does not fit the 32-bit identifier scheme
    #[error("DIE offset 0x{0:x} does not fit in 32 bits")]
    OffsetOutOfRange(u64),

    /// A unit decoded only partially
    ///
    /// DIEs decoded before the failure remain usable.
    #[error("unit {unit} is only partially parsed: {reason}")]
    PartialUnit
    {
        /// Physical unit index
        unit: usize,
        /// Why decoding stopped
        reason: String,
    },

    /// No DIE exists at the referenced location
    #[error("no DIE at {0}")]
    DieNotFound(DieRef),

    /// No unit covers the referenced section offset
    #[error("no unit contains offset 0x{0:x}")]
    UnitNotFound(u64),

    /// The companion file of a skeleton unit could not be located
    #[error("missing companion file {dwo_name} for unit {unit}")]
    MissingCompanion
    {
        /// Physical index of the skeleton unit
        unit: usize,
        /// Companion base name from the skeleton unit
        dwo_name: String,
    },

    /// The companion of a skeleton unit has not been loaded yet
    ///
    /// Returned by lookups that are not allowed to trigger a load.
    #[error("companion of unit {0} is not resolved yet")]
    CompanionNotYetResolved(usize),

    /// No type unit carries the referenced signature
    #[error("no type unit with signature 0x{0:016x}")]
    UnresolvedSignature(u64),

    /// A type definition refers back to itself without a pointer in between
    #[error("circular type definition at {0}")]
    CircularDefinition(DieRef),

    /// An earlier resolution of this DIE failed; the failure is cached
    #[error("resolution of {die} failed earlier: {reason}")]
    ResolutionFailed
    {
        /// The DIE whose resolution failed
        die: DieRef,
        /// The original failure
        reason: String,
    },

    /// A DIE of one kind was used where another kind was expected
    #[error("DIE at {die} is a {tag}, not a {expected}")]
    WrongKind
    {
        /// The offending DIE
        die: DieRef,
        /// Its tag
        tag: String,
        /// What the caller asked for
        expected: &'static str,
    },

    /// Logical compile unit index out of range
    #[error("compile unit index {index} out of range (module has {count})")]
    UnitIndexOutOfRange
    {
        /// Requested index
        index: usize,
        /// Number of logical compile units
        count: usize,
    },

    /// Invalid regular expression in a name query
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// The object file could not be parsed
    #[error("object file error: {0}")]
    Object(String),

    /// I/O error while reading an object file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recovery class of a [`SymbolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory
{
    /// Malformed input, scoped to one unit
    Format,
    /// Unresolvable reference or missing companion
    Reference,
    /// Circular type definition
    Cycle,
    /// Unsupported version or construct
    Unsupported,
    /// Caller error
    Usage,
    /// Object file or I/O failure
    Io,
}

impl fmt::Display for ErrorCategory
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            ErrorCategory::Format => "format",
            ErrorCategory::Reference => "reference",
            ErrorCategory::Cycle => "cycle",
            ErrorCategory::Unsupported => "unsupported",
            ErrorCategory::Usage => "usage",
            ErrorCategory::Io => "io",
        };
        write!(f, "{label}")
    }
}

impl SymbolError
{
    /// The recovery class of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory
    {
        match self {
            SymbolError::Dwarf { .. }
            | SymbolError::OffsetOutOfRange(_)
            | SymbolError::PartialUnit { .. }
            | SymbolError::ResolutionFailed { .. } => ErrorCategory::Format,
            SymbolError::DieNotFound(_)
            | SymbolError::UnitNotFound(_)
            | SymbolError::MissingCompanion { .. }
            | SymbolError::CompanionNotYetResolved(_)
            | SymbolError::UnresolvedSignature(_) => ErrorCategory::Reference,
            SymbolError::CircularDefinition(_) => ErrorCategory::Cycle,
            SymbolError::UnsupportedVersion { .. } => ErrorCategory::Unsupported,
            SymbolError::WrongKind { .. } | SymbolError::UnitIndexOutOfRange { .. } | SymbolError::InvalidRegex(_) => {
                ErrorCategory::Usage
            }
            SymbolError::Object(_) | SymbolError::Io(_) => ErrorCategory::Io,
        }
    }
}

/// Convenience type alias for `Result<T, SymbolError>`
///
/// ```rust
/// use symdex_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SymbolError>;

/// Map a gimli error to a `SymbolError` with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> SymbolError
{
    SymbolError::Dwarf {
        context: context.to_string(),
        message: err.to_string(),
    }
}

/// A non-fatal problem recorded while reading a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic
{
    /// Recovery class
    pub category: ErrorCategory,
    /// Human-readable description
    pub message: String,
}

impl fmt::Display for Diagnostic
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Append-only log of non-fatal problems, shared by every part of a module.
#[derive(Debug, Default)]
pub struct DiagnosticLog
{
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticLog
{
    /// Record an error that was recovered from.
    pub fn record(&self, error: &SymbolError)
    {
        self.record_message(error.category(), error.to_string());
    }

    /// Record a message under an explicit category.
    pub fn record_message(&self, category: ErrorCategory, message: String)
    {
        warn!(%category, "{message}");
        self.entries.lock().push(Diagnostic { category, message });
    }

    /// Copy of every diagnostic recorded so far, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Diagnostic>
    {
        self.entries.lock().clone()
    }

    /// Number of recorded diagnostics.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.lock().is_empty()
    }
}
