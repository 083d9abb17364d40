//! # Type & Variable Resolution
//!
//! Turns DIEs into the symbol model: [`Type`], [`Variable`], [`Function`] and
//! [`DeclContext`](crate::types::DeclContext). Every resolution runs under the
//! module's re-entrant lock and goes through a cache keyed by [`DieRef`], so a
//! DIE resolves to the same `Arc` handle for the lifetime of the module.
//!
//! ## Sections
//!
//! - [`types`](self::types): the type cache, cycle guard, unique-type map and
//!   two-phase aggregate completion
//! - [`variable`]: variables and functions with their block trees
//! - [`decl`]: qualified names and declaration contexts
//! - [`type_system`]: the language type system collaborator
//!
//! ## Cycle guard
//!
//! A cache slot is [`Slot::Pending`] while its DIE is being resolved. Meeting a
//! pending slot again on the same call stack means the definition refers back
//! to itself: pointer-shaped types tolerate that, anything else becomes an
//! incomplete type and a recorded cycle diagnostic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gimli::DwTag;

use crate::external::ExternalModuleTable;
use crate::types::{CompilerType, DeclContext, Declaration, DieRef, Function, Type, UserId, Variable};

pub(crate) mod decl;
pub mod type_system;
pub(crate) mod types;
pub(crate) mod variable;

/// Cache slot of one DIE.
#[derive(Debug, Clone)]
pub(crate) enum Slot<T>
{
    /// Resolution of the DIE is on the current call stack
    Pending,
    /// Final handle
    Ready(T),
    /// Resolution failed; the failure is not retried
    Failed(String),
}

/// Structural identity of an aggregate or enumeration definition.
///
/// Two definitions with the same key denote the same logical type, whichever
/// unit they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct UniqueTypeKey
{
    pub tag: DwTag,
    pub qualified_name: Option<String>,
    pub byte_size: Option<u64>,
    pub declaration: Option<Declaration>,
    pub members: Vec<(Option<String>, Option<u64>)>,
}

/// Every cache guarded by the module lock.
#[derive(Debug)]
pub(crate) struct ResolverState
{
    pub types: HashMap<DieRef, Slot<Arc<Type>>>,
    pub variables: HashMap<DieRef, Arc<Variable>>,
    pub functions: HashMap<DieRef, Arc<Function>>,
    pub decl_contexts: HashMap<DieRef, DeclContext>,
    /// Incomplete aggregate → the DIE that completes it
    pub forward: HashMap<CompilerType, DieRef>,
    /// Reverse of `forward`
    pub forward_dies: HashMap<DieRef, CompilerType>,
    pub unique: HashMap<UniqueTypeKey, Arc<Type>>,
    /// Aggregates whose layout is being built on the current call stack
    pub completing: HashSet<UserId>,
    pub modules: ExternalModuleTable,
}

impl ResolverState
{
    pub(crate) fn new(modules: ExternalModuleTable) -> Self
    {
        Self {
            types: HashMap::new(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            decl_contexts: HashMap::new(),
            forward: HashMap::new(),
            forward_dies: HashMap::new(),
            unique: HashMap::new(),
            completing: HashSet::new(),
            modules,
        }
    }
}
