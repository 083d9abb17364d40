//! # DWARF Reading
//!
//! Everything between raw section bytes and a navigable DIE forest.
//!
//! ## Sections
//!
//! - [`sections`]: the object-file collaborator and the one-shot section store
//! - [`decoder`]: one DIE at a time, attribute values converted to owned form
//! - [`unit`]: unit discovery, per-unit DIE forests, offset lookups
//! - [`identity`]: companion (split DWARF) files behind skeleton units
//! - [`store`]: the module's unit store, DIE lookup by reference
//! - [`line`]: line tables and support files
//!
//! All readers are `EndianArcSlice` over reference-counted section bytes, so a
//! unit, its forest and every handle derived from them can be shared across
//! threads without borrowing from the object file.

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian};

pub mod decoder;
pub(crate) mod demangle;
pub mod identity;
pub mod line;
pub mod sections;
pub mod store;
pub mod unit;

/// Reader type used for every section.
pub type OwnedReader = EndianArcSlice<RunTimeEndian>;

/// gimli's section bundle over owned readers.
pub type OwnedDwarf = Dwarf<OwnedReader>;

/// DWARF versions the reader accepts (2 through 5).
#[must_use]
pub fn supported_version(version: u16) -> bool
{
    (2..=5).contains(&version)
}
