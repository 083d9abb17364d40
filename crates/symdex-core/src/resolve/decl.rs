//! Qualified names and declaration contexts.
//!
//! The free functions here only walk DIE trees and never take the module
//! lock, so the name index can use them while it is being built.

use gimli::DwTag;

use super::type_system::DeclContextDescriptor;
use crate::dwarf::store::UnitStore;
use crate::dwarf::unit::Die;
use crate::error::{Result, SymbolError};
use crate::symbol_file::SymbolFile;
use crate::types::{DeclContext, DeclContextKind, Declaration, UserId};

/// How many `DW_AT_specification`/`DW_AT_abstract_origin` links are followed.
const MAX_ORIGIN_DEPTH: usize = 8;

/// Kind of scope a tag establishes, if any.
pub(crate) fn context_kind(tag: DwTag) -> Option<DeclContextKind>
{
    match tag {
        gimli::DW_TAG_compile_unit
        | gimli::DW_TAG_partial_unit
        | gimli::DW_TAG_type_unit
        | gimli::DW_TAG_skeleton_unit => Some(DeclContextKind::TranslationUnit),
        gimli::DW_TAG_namespace => Some(DeclContextKind::Namespace),
        gimli::DW_TAG_structure_type
        | gimli::DW_TAG_class_type
        | gimli::DW_TAG_union_type
        | gimli::DW_TAG_enumeration_type => Some(DeclContextKind::Aggregate),
        gimli::DW_TAG_subprogram => Some(DeclContextKind::Function),
        gimli::DW_TAG_lexical_block | gimli::DW_TAG_inlined_subroutine => Some(DeclContextKind::Block),
        _ => None,
    }
}

/// The DIE at the end of the `DW_AT_specification`/`DW_AT_abstract_origin`
/// chain of `die` (`die` itself when it has neither).
pub(crate) fn origin_die(store: &UnitStore, die: &Die) -> Die
{
    let mut current = die.clone();
    for _ in 0..MAX_ORIGIN_DEPTH {
        let entry = current.entry();
        let Some(target) = entry
            .reference(gimli::DW_AT_specification)
            .or_else(|| entry.reference(gimli::DW_AT_abstract_origin))
        else {
            break;
        };
        match store.resolve_target(&current, target) {
            Ok(next) => current = next,
            Err(_) => break,
        }
    }
    current
}

/// `DW_AT_name` of `die`, or of its specification or abstract origin.
pub(crate) fn die_name(store: &UnitStore, die: &Die) -> Option<String>
{
    if let Some(name) = die.name() {
        return Some(name.to_string());
    }
    origin_die(store, die).name().map(str::to_string)
}

/// Linkage name of `die`, or of its specification or abstract origin.
pub(crate) fn die_linkage_name(store: &UnitStore, die: &Die) -> Option<String>
{
    if let Some(name) = die.entry().linkage_name() {
        return Some(name.to_string());
    }
    origin_die(store, die).entry().linkage_name().map(str::to_string)
}

fn scope_label(scope: &Die) -> Option<String>
{
    if let Some(name) = scope.name() {
        return Some(name.to_string());
    }
    let label = match scope.tag() {
        gimli::DW_TAG_namespace => "(anonymous namespace)",
        gimli::DW_TAG_structure_type => "(anonymous struct)",
        gimli::DW_TAG_class_type => "(anonymous class)",
        gimli::DW_TAG_union_type => "(anonymous union)",
        gimli::DW_TAG_enumeration_type => "(anonymous enum)",
        _ => return None,
    };
    Some(label.to_string())
}

/// Names of the namespaces and aggregates enclosing `die`, outermost first.
/// Qualification stops at function and block scopes.
pub(crate) fn enclosing_scopes(store: &UnitStore, die: &Die) -> Vec<String>
{
    let mut scopes = Vec::new();
    let mut parent = origin_die(store, die).parent();
    while let Some(scope) = parent {
        match context_kind(scope.tag()) {
            Some(DeclContextKind::Namespace | DeclContextKind::Aggregate) => {
                scopes.extend(scope_label(&scope));
            }
            Some(_) => break,
            None => {}
        }
        parent = scope.parent();
    }
    scopes.reverse();
    scopes
}

/// `::`-joined name of `die` including its enclosing namespaces and aggregates.
pub(crate) fn qualified_name(store: &UnitStore, die: &Die) -> Option<String>
{
    let name = die_name(store, die).or_else(|| {
        matches!(context_kind(die.tag()), Some(DeclContextKind::Namespace | DeclContextKind::Aggregate))
            .then(|| scope_label(die))
            .flatten()
    })?;
    let mut scopes = enclosing_scopes(store, die);
    scopes.push(name);
    Some(scopes.join("::"))
}

/// Nearest enclosing DIE that establishes a declaration context.
pub(crate) fn containing_context_die(store: &UnitStore, die: &Die) -> Option<Die>
{
    let mut parent = origin_die(store, die).parent();
    while let Some(scope) = parent {
        if context_kind(scope.tag()).is_some() {
            return Some(scope);
        }
        parent = scope.parent();
    }
    None
}

/// `DW_AT_decl_file`/`DW_AT_decl_line`/`DW_AT_decl_column` of `die`, falling
/// back to its specification or abstract origin.
pub(crate) fn declaration(store: &UnitStore, die: &Die) -> Option<Declaration>
{
    let own = declaration_of(die);
    if own.is_some() {
        return own;
    }
    declaration_of(&origin_die(store, die))
}

fn declaration_of(die: &Die) -> Option<Declaration>
{
    let entry = die.entry();
    let file = entry.unsigned(gimli::DW_AT_decl_file).and_then(|index| {
        let table = die.unit().line_table().ok()??;
        table.file(index).map(str::to_string)
    });
    let declaration = Declaration {
        file,
        line: entry
            .unsigned(gimli::DW_AT_decl_line)
            .and_then(|line| u32::try_from(line).ok()),
        column: entry
            .unsigned(gimli::DW_AT_decl_column)
            .and_then(|column| u32::try_from(column).ok()),
    };
    (!declaration.is_empty()).then_some(declaration)
}

impl SymbolFile
{
    /// Declaration context established by the DIE `uid`.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::WrongKind`] if the DIE does not open a scope.
    pub fn decl_context_for_uid(&self, uid: UserId) -> Result<DeclContext>
    {
        let die = self.die_for_uid(uid)?;
        self.decl_context_for_die(&die)
    }

    /// Declaration context enclosing the DIE `uid` (`None` for a unit root).
    ///
    /// ## Errors
    ///
    /// Returns an error if `uid` does not name a DIE.
    pub fn decl_context_containing_uid(&self, uid: UserId) -> Result<Option<DeclContext>>
    {
        let die = self.die_for_uid(uid)?;
        match containing_context_die(&self.store, &die) {
            Some(scope) => self.decl_context_for_die(&scope).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn decl_context_for_die(&self, die: &Die) -> Result<DeclContext>
    {
        let guard = self.state.lock();
        let key = die.die_ref();
        if let Some(context) = guard.borrow().decl_contexts.get(&key) {
            return Ok(context.clone());
        }

        let kind = context_kind(die.tag()).ok_or_else(|| SymbolError::WrongKind {
            die: key,
            tag: die.tag().to_string(),
            expected: "declaration context",
        })?;
        let parent = match kind {
            DeclContextKind::TranslationUnit => None,
            _ => match containing_context_die(&self.store, die) {
                Some(scope) => Some(self.decl_context_for_die(&scope)?),
                None => None,
            },
        };
        let name = match kind {
            DeclContextKind::TranslationUnit => None,
            _ => die_name(&self.store, die),
        };
        let qualified_name = match kind {
            DeclContextKind::TranslationUnit => String::new(),
            DeclContextKind::Namespace | DeclContextKind::Aggregate | DeclContextKind::Function => {
                qualified_name(&self.store, die).unwrap_or_default()
            }
            DeclContextKind::Block => parent
                .as_ref()
                .map(|parent| parent.qualified_name.clone())
                .unwrap_or_default(),
        };
        let compiler_context = self.type_system.decl_context(&DeclContextDescriptor {
            uid: die.uid(),
            kind,
            name: name.as_deref(),
            qualified_name: &qualified_name,
            parent: parent.as_ref().map(|parent| parent.compiler_context),
        });
        let context = DeclContext {
            uid: die.uid(),
            kind,
            name,
            qualified_name,
            parent: parent.map(|parent| parent.uid),
            compiler_context,
        };
        guard
            .borrow_mut()
            .decl_contexts
            .insert(key, context.clone());
        Ok(context)
    }

    /// Namespace named `name` (base or qualified name) directly inside `parent`,
    /// or anywhere when `parent` is `None`.
    ///
    /// ## Errors
    ///
    /// Returns an error if a matching DIE cannot be turned into a context.
    pub fn find_namespace(&self, name: &str, parent: Option<&DeclContext>) -> Result<Option<DeclContext>>
    {
        let hits = self.index.find(
            &self.store,
            &crate::index::NameQuery::Exact(name),
            crate::index::NameKind::NAMESPACE,
            None,
        );
        for hit in hits {
            let Ok(die) = self.store.die_for_ref(hit.die) else {
                continue;
            };
            let context = self.decl_context_for_die(&die)?;
            let matches_parent = match parent {
                None => true,
                Some(parent) => match context.parent {
                    Some(uid) => uid == parent.uid || (parent.kind == DeclContextKind::TranslationUnit && self.is_unit_root(uid)),
                    None => false,
                },
            };
            if matches_parent {
                return Ok(Some(context));
            }
        }
        Ok(None)
    }

    fn is_unit_root(&self, uid: UserId) -> bool
    {
        self.die_for_uid(uid).is_ok_and(|die| die.is_root())
    }
}
