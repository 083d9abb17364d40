//! The language type system collaborator.
//!
//! The resolver never builds language-level types itself. It hands a
//! [`TypeDescriptor`] with the raw DWARF attributes to a [`TypeSystem`] and
//! keeps the opaque [`CompilerType`] it gets back. Aggregates are created
//! first and completed later with their [`TypeLayout`].

use std::sync::atomic::{AtomicU64, Ordering};

use gimli::DwAt;
use parking_lot::Mutex;

use crate::dwarf::decoder::AttrValue;
use crate::types::{CompilerDeclContext, CompilerType, DeclContextKind, TypeKind, TypeLayout, UserId};

/// What the resolver knows about a type when asking for a compiler type.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor<'a>
{
    /// DIE the type comes from
    pub uid: UserId,
    /// Shape of the type
    pub kind: TypeKind,
    /// Unqualified name
    pub name: Option<&'a str>,
    /// Name including enclosing scopes
    pub qualified_name: Option<&'a str>,
    /// Size in bytes
    pub byte_size: Option<u64>,
    /// Compiler type of the target (pointee, alias, element, return type)
    pub target: Option<CompilerType>,
    /// Whether only a declaration was found
    pub is_declaration: bool,
    /// Raw attributes of the DIE
    pub attributes: &'a [(DwAt, AttrValue)],
}

/// What the resolver knows about a declaration context.
#[derive(Debug, Clone, Copy)]
pub struct DeclContextDescriptor<'a>
{
    /// DIE establishing the scope
    pub uid: UserId,
    /// Kind of scope
    pub kind: DeclContextKind,
    /// Unqualified name
    pub name: Option<&'a str>,
    /// Fully qualified name
    pub qualified_name: &'a str,
    /// Compiler handle of the enclosing scope
    pub parent: Option<CompilerDeclContext>,
}

/// Produces and completes language types for resolved DWARF types.
///
/// Called with the module lock held, so implementations must not call back
/// into the module from another thread and wait for it.
pub trait TypeSystem: Send + Sync
{
    /// Create the language type for `descriptor`.
    fn create_type(&self, descriptor: &TypeDescriptor<'_>) -> CompilerType;

    /// Fill in the members of an aggregate created earlier. Returns whether the
    /// type is complete afterwards.
    fn complete_type(&self, compiler_type: CompilerType, layout: &TypeLayout) -> bool;

    /// Create the language handle for a declaration context.
    fn decl_context(&self, descriptor: &DeclContextDescriptor<'_>) -> CompilerDeclContext;
}

/// A type system that hands out sequential handles and records what it was asked.
#[derive(Debug)]
pub struct BasicTypeSystem
{
    next: AtomicU64,
    created: Mutex<Vec<(CompilerType, UserId, TypeKind)>>,
    completed: Mutex<Vec<CompilerType>>,
}

impl Default for BasicTypeSystem
{
    fn default() -> Self
    {
        Self {
            next: AtomicU64::new(1),
            created: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }
}

impl BasicTypeSystem
{
    /// Fresh type system.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Number of types created so far.
    #[must_use]
    pub fn created_count(&self) -> usize
    {
        self.created.lock().len()
    }

    /// Types created for `uid`.
    #[must_use]
    pub fn created_for(&self, uid: UserId) -> Vec<CompilerType>
    {
        self.created
            .lock()
            .iter()
            .filter(|(_, created, _)| *created == uid)
            .map(|(compiler_type, _, _)| *compiler_type)
            .collect()
    }

    /// How often `compiler_type` was completed.
    #[must_use]
    pub fn completion_count(&self, compiler_type: CompilerType) -> usize
    {
        self.completed
            .lock()
            .iter()
            .filter(|completed| **completed == compiler_type)
            .count()
    }

    fn allocate(&self) -> u64
    {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl TypeSystem for BasicTypeSystem
{
    fn create_type(&self, descriptor: &TypeDescriptor<'_>) -> CompilerType
    {
        let compiler_type = CompilerType(self.allocate());
        self.created
            .lock()
            .push((compiler_type, descriptor.uid, descriptor.kind));
        compiler_type
    }

    fn complete_type(&self, compiler_type: CompilerType, _layout: &TypeLayout) -> bool
    {
        self.completed.lock().push(compiler_type);
        true
    }

    fn decl_context(&self, _descriptor: &DeclContextDescriptor<'_>) -> CompilerDeclContext
    {
        CompilerDeclContext(self.allocate())
    }
}
