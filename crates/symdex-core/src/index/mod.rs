//! # Name Index
//!
//! Maps names to DIEs, partitioned by [`NameKind`].
//!
//! Three tables are built lazily, each in its own write-once cell:
//!
//! - the accelerator table, from `.debug_pubnames` and `.debug_pubtypes` of
//!   the main file (exact-name lookups only)
//! - the scan of every DIE of the main file's units
//! - the scan of every companion file behind a skeleton unit
//!
//! Exact lookups try the accelerator table first when the module has one and
//! it is enabled. It answers only for the kinds its sections list, and a kind
//! it has no hit for is looked up in the main-file scan. Regex lookups always
//! use the scans. Both are merged with the companion scan, so symbols that
//! only live in a companion file are found through the main module.
//!
//! Building a table never takes the module lock: concurrent first queries
//! wait on the cell and see the same finished table.
//!
//! ## Keys and regex semantics
//!
//! Each DIE is keyed by its base name, its `::`-qualified name, its linkage
//! name and the demangled linkage name. A regex query matches a DIE when
//! [`Regex::is_match`] (unanchored, case-sensitive) accepts any of its keys.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;
use gimli::DwTag;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::dwarf::store::UnitStore;
use crate::types::DieRef;

pub(crate) mod accel;
pub(crate) mod scan;

bitflags! {
    /// Kinds of named entities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NameKind: u8
    {
        /// Code-bearing subprograms and inlined calls
        const FUNCTION = 1 << 0;
        /// Variables with static storage
        const GLOBAL = 1 << 1;
        /// Named types
        const TYPE = 1 << 2;
        /// Namespaces
        const NAMESPACE = 1 << 3;
    }
}

/// A name lookup.
#[derive(Debug, Clone, Copy)]
pub enum NameQuery<'a>
{
    /// Any key equal to the string
    Exact(&'a str),
    /// Any key matched by the regex
    Regex(&'a Regex),
}

impl NameQuery<'_>
{
    fn matches(&self, key: &str) -> bool
    {
        match self {
            NameQuery::Exact(name) => *name == key,
            NameQuery::Regex(regex) => regex.is_match(key),
        }
    }
}

/// One indexed DIE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameHit
{
    /// What the DIE denotes
    pub kind: NameKind,
    /// Tag of the DIE
    pub tag: DwTag,
    /// The DIE
    pub die: DieRef,
}

/// Name → DIE table.
#[derive(Debug, Default)]
pub struct NameTable
{
    entries: HashMap<String, Vec<NameHit>>,
}

impl NameTable
{
    pub(crate) fn insert(&mut self, key: String, hit: NameHit)
    {
        let hits = self.entries.entry(key).or_default();
        if !hits.contains(&hit) {
            hits.push(hit);
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether the table holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    fn lookup(&self, query: &NameQuery<'_>, kinds: NameKind, out: &mut Vec<NameHit>, seen: &mut HashSet<DieRef>)
    {
        let mut push = |hits: &[NameHit]| {
            for hit in hits {
                if kinds.intersects(hit.kind) && seen.insert(hit.die) {
                    out.push(*hit);
                }
            }
        };
        match query {
            NameQuery::Exact(name) => {
                if let Some(hits) = self.entries.get(*name) {
                    push(hits);
                }
            }
            NameQuery::Regex(_) => {
                let mut keys: Vec<&String> = self.entries.keys().filter(|key| query.matches(key)).collect();
                keys.sort();
                for key in keys {
                    push(&self.entries[key]);
                }
            }
        }
    }
}

/// The module's name index.
#[derive(Debug)]
pub struct NameIndex
{
    use_accelerator: bool,
    accelerator: OnceCell<Option<accel::Accelerator>>,
    main: OnceCell<NameTable>,
    companions: OnceCell<NameTable>,
}

impl NameIndex
{
    /// Empty index; `use_accelerator` allows exact lookups through pubnames/pubtypes.
    #[must_use]
    pub fn new(use_accelerator: bool) -> Self
    {
        Self {
            use_accelerator,
            accelerator: OnceCell::new(),
            main: OnceCell::new(),
            companions: OnceCell::new(),
        }
    }

    fn accelerator(&self, store: &UnitStore) -> Option<&accel::Accelerator>
    {
        if !self.use_accelerator {
            return None;
        }
        self.accelerator
            .get_or_init(|| accel::build(store))
            .as_ref()
    }

    fn main(&self, store: &UnitStore) -> &NameTable
    {
        self.main.get_or_init(|| {
            let table = scan::scan_main(store);
            debug!(keys = table.len(), "built main-file name index");
            table
        })
    }

    fn companions(&self, store: &UnitStore) -> &NameTable
    {
        self.companions.get_or_init(|| {
            let table = scan::scan_companions(store);
            debug!(keys = table.len(), "built companion name index");
            table
        })
    }

    /// Whether the module has a usable accelerator table.
    #[must_use]
    pub fn has_accelerator(&self, store: &UnitStore) -> bool
    {
        self.accelerator(store).is_some()
    }

    /// DIEs of the given kinds matching `query`, deduplicated, at most `max_results`.
    #[must_use]
    pub fn find(
        &self,
        store: &UnitStore,
        query: &NameQuery<'_>,
        kinds: NameKind,
        max_results: Option<usize>,
    ) -> Vec<NameHit>
    {
        let mut hits = Vec::new();
        let mut seen = HashSet::new();
        match (query, self.accelerator(store)) {
            (NameQuery::Exact(_), Some(accelerator)) => {
                for kind in kinds.iter() {
                    let before = hits.len();
                    if accelerator.covers.contains(kind) {
                        accelerator.table.lookup(query, kind, &mut hits, &mut seen);
                    }
                    if hits.len() == before {
                        self.main(store).lookup(query, kind, &mut hits, &mut seen);
                    }
                }
            }
            _ => self.main(store).lookup(query, kinds, &mut hits, &mut seen),
        }
        self.companions(store)
            .lookup(query, kinds, &mut hits, &mut seen);
        if let Some(max) = max_results {
            hits.truncate(max);
        }
        hits
    }

    /// Build every table now instead of on first query.
    pub fn preload(&self, store: &UnitStore)
    {
        self.accelerator(store);
        self.main(store);
        self.companions(store);
    }

    /// Whether the scan tables have been built.
    #[must_use]
    pub fn is_built(&self) -> bool
    {
        self.main.get().is_some() && self.companions.get().is_some()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn hit(kind: NameKind, offset: u32) -> NameHit
    {
        NameHit {
            kind,
            tag: gimli::DW_TAG_variable,
            die: DieRef::main(offset),
        }
    }

    #[test]
    fn test_exact_lookup_filters_kinds()
    {
        let mut table = NameTable::default();
        table.insert("head".to_string(), hit(NameKind::GLOBAL, 0x40));
        table.insert("head".to_string(), hit(NameKind::FUNCTION, 0x80));

        let mut out = Vec::new();
        table.lookup(&NameQuery::Exact("head"), NameKind::GLOBAL, &mut out, &mut HashSet::new());
        assert_eq!(out, vec![hit(NameKind::GLOBAL, 0x40)]);
    }

    #[test]
    fn test_regex_lookup_dedups_across_keys()
    {
        let mut table = NameTable::default();
        table.insert("make_node".to_string(), hit(NameKind::FUNCTION, 0x40));
        table.insert("list::make_node".to_string(), hit(NameKind::FUNCTION, 0x40));
        table.insert("free_node".to_string(), hit(NameKind::FUNCTION, 0x90));

        let regex = Regex::new("make_").unwrap();
        let mut out = Vec::new();
        table.lookup(&NameQuery::Regex(&regex), NameKind::all(), &mut out, &mut HashSet::new());
        assert_eq!(out, vec![hit(NameKind::FUNCTION, 0x40)]);
    }

    #[test]
    fn test_insert_ignores_duplicates()
    {
        let mut table = NameTable::default();
        table.insert("Node".to_string(), hit(NameKind::TYPE, 0x10));
        table.insert("Node".to_string(), hit(NameKind::TYPE, 0x10));
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries["Node"].len(), 1);
    }
}
