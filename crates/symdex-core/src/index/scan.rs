//! Linear scan of every DIE.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use super::{NameHit, NameKind, NameTable};
use crate::dwarf::demangle::demangle;
use crate::dwarf::store::UnitStore;
use crate::dwarf::unit::{CompileUnit, Die, UnitRole};
use crate::resolve::decl;
use crate::types::{DeclContextKind, FileSelector, TypeKind};

/// What an indexed DIE denotes, or `None` if it is not indexed.
pub(crate) fn classify(die: &Die) -> Option<NameKind>
{
    let entry = die.entry();
    match die.tag() {
        gimli::DW_TAG_subprogram => (!entry.is_declaration() && !entry.ranges().is_empty()).then_some(NameKind::FUNCTION),
        gimli::DW_TAG_inlined_subroutine => Some(NameKind::FUNCTION),
        gimli::DW_TAG_variable | gimli::DW_TAG_constant => {
            match die.parent().and_then(|parent| decl::context_kind(parent.tag())) {
                Some(DeclContextKind::TranslationUnit | DeclContextKind::Namespace) => {
                    let defined = entry.attr(gimli::DW_AT_location).is_some()
                        || entry.attr(gimli::DW_AT_const_value).is_some();
                    defined.then_some(NameKind::GLOBAL)
                }
                Some(DeclContextKind::Aggregate) => Some(NameKind::GLOBAL),
                _ => None,
            }
        }
        gimli::DW_TAG_member => {
            (entry.is_declaration() && entry.flag(gimli::DW_AT_external)).then_some(NameKind::GLOBAL)
        }
        gimli::DW_TAG_namespace => Some(NameKind::NAMESPACE),
        tag => TypeKind::from_tag(tag).map(|_| NameKind::TYPE),
    }
}

/// Every key `die` is found under: base, qualified, linkage and demangled names.
pub(crate) fn keys(store: &UnitStore, die: &Die) -> SmallVec<[String; 4]>
{
    let mut keys: SmallVec<[String; 4]> = SmallVec::new();
    let mut push = |key: String| {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    };
    if let Some(name) = decl::die_name(store, die) {
        push(name);
    }
    if let Some(qualified) = decl::qualified_name(store, die) {
        push(qualified);
    }
    if let Some(linkage) = decl::die_linkage_name(store, die) {
        if let Some(demangled) = demangle(&linkage) {
            push(demangled);
        }
        push(linkage);
    }
    keys
}

/// Add `die` to `table` under every key, if it is an indexed kind.
pub(crate) fn index_die(store: &UnitStore, die: &Die, table: &mut NameTable)
{
    let Some(kind) = classify(die) else {
        return;
    };
    let hit = NameHit {
        kind,
        tag: die.tag(),
        die: die.die_ref(),
    };
    for key in keys(store, die) {
        table.insert(key, hit);
    }
}

fn scan_unit(store: &UnitStore, unit: &Arc<CompileUnit>, table: &mut NameTable)
{
    let dies = match unit.dies() {
        Ok(dies) => dies,
        Err(err) => {
            store.diagnostics().record(&err);
            return;
        }
    };
    let mut count = 0usize;
    for die in dies {
        index_die(store, &die, table);
        count += 1;
    }
    trace!(unit = unit.index(), file = ?unit.file(), dies = count, "scanned unit");
}

/// Scan every main-file unit except skeletons, whose DIEs live elsewhere.
pub(crate) fn scan_main(store: &UnitStore) -> NameTable
{
    let mut table = NameTable::default();
    for unit in store.main_units().units() {
        if unit.role() == UnitRole::Skeleton && unit.file() == FileSelector::Main {
            continue;
        }
        scan_unit(store, unit, &mut table);
    }
    table
}

/// Scan every unit of every companion file. Missing companions are recorded
/// by the companion table and skipped.
pub(crate) fn scan_companions(store: &UnitStore) -> NameTable
{
    let mut table = NameTable::default();
    for (_, companion) in store.companions() {
        for unit in companion.units().units() {
            scan_unit(store, unit, &mut table);
        }
    }
    table
}
