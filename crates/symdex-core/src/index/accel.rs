//! Accelerator tables: `.debug_pubnames` and `.debug_pubtypes`.
//!
//! Each entry names a DIE by unit header offset plus unit-relative offset.
//! The DIE is decoded to classify it and to compute the same keys the scan
//! would, so both paths answer exact queries identically.
//!
//! Producers list only some names (pubnames usually holds external symbols
//! only), so a table answers for the kinds its sections cover and a miss is
//! never final.

use gimli::{DebugPubNames, DebugPubTypes, SectionId};
use tracing::debug;

use super::scan::index_die;
use super::{NameKind, NameTable};
use crate::dwarf::store::UnitStore;
use crate::error::{map_dwarf_error, SymbolError};
use crate::types::DieRef;

/// Names read from the accelerator sections.
#[derive(Debug)]
pub(crate) struct Accelerator
{
    /// Keys of every listed DIE
    pub(crate) table: NameTable,
    /// Kinds the present sections list: functions and globals for
    /// `.debug_pubnames`, types for `.debug_pubtypes`
    pub(crate) covers: NameKind,
}

/// Build the accelerator table, or `None` when the file has neither section.
pub(crate) fn build(store: &UnitStore) -> Option<Accelerator>
{
    let names = store.sections().reader(SectionId::DebugPubNames);
    let types = store.sections().reader(SectionId::DebugPubTypes);
    let mut covers = NameKind::empty();
    if !names.is_empty() {
        covers |= NameKind::FUNCTION | NameKind::GLOBAL;
    }
    if !types.is_empty() {
        covers |= NameKind::TYPE;
    }
    if covers.is_empty() {
        return None;
    }

    let mut targets = Vec::new();
    let mut entries = DebugPubNames::from(names).items();
    loop {
        match entries.next() {
            Ok(Some(entry)) => targets.push(entry.unit_header_offset().0 + entry.die_offset().0),
            Ok(None) => break,
            Err(err) => {
                store.diagnostics().record(&map_dwarf_error("reading .debug_pubnames", err));
                break;
            }
        }
    }
    let mut entries = DebugPubTypes::from(types).items();
    loop {
        match entries.next() {
            Ok(Some(entry)) => targets.push(entry.unit_header_offset().0 + entry.die_offset().0),
            Ok(None) => break,
            Err(err) => {
                store.diagnostics().record(&map_dwarf_error("reading .debug_pubtypes", err));
                break;
            }
        }
    }
    targets.sort_unstable();
    targets.dedup();

    let mut table = NameTable::default();
    for offset in &targets {
        let Ok(offset) = u32::try_from(*offset) else {
            store.diagnostics().record(&SymbolError::OffsetOutOfRange(*offset as u64));
            continue;
        };
        match store.die_for_ref(DieRef::main(offset)) {
            Ok(die) if !die.is_root() => index_die(store, &die, &mut table),
            Ok(_) => {}
            Err(err) => debug!(offset, "accelerator entry does not name a DIE: {err}"),
        }
    }
    debug!(entries = targets.len(), keys = table.len(), ?covers, "built accelerator name index");
    Some(Accelerator { table, covers })
}
