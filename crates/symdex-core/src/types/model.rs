//! The resolved symbol model handed to consumers.
//!
//! Records refer to each other by [`UserId`], never by owning pointers, so a
//! self-referential type is just a pointer whose target id equals the id of
//! the aggregate containing it. Handles are shared through `Arc` and never
//! replaced once returned; aggregates are completed in place through a
//! write-once layout cell.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::address::{Address, AddressRange};
use super::ids::UserId;
use super::symbols::{Declaration, SymbolName};

/// Opaque handle to a type materialized by the language type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompilerType(pub u64);

/// Opaque handle to a declaration context materialized by the language type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompilerDeclContext(pub u64);

/// Shape of a resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    /// `DW_TAG_base_type`
    Base,
    /// `DW_TAG_unspecified_type` (e.g. `decltype(nullptr)`, `void` stand-ins)
    Unspecified,
    /// `DW_TAG_pointer_type`
    Pointer,
    /// `DW_TAG_reference_type`
    Reference,
    /// `DW_TAG_rvalue_reference_type`
    RvalueReference,
    /// `DW_TAG_ptr_to_member_type`
    PointerToMember,
    /// `DW_TAG_const_type`
    Const,
    /// `DW_TAG_volatile_type`
    Volatile,
    /// `DW_TAG_restrict_type`
    Restrict,
    /// `DW_TAG_atomic_type`
    Atomic,
    /// `DW_TAG_typedef`
    Typedef,
    /// `DW_TAG_array_type`
    Array,
    /// `DW_TAG_structure_type`
    Struct,
    /// `DW_TAG_class_type`
    Class,
    /// `DW_TAG_union_type`
    Union,
    /// `DW_TAG_enumeration_type`
    Enum,
    /// `DW_TAG_subroutine_type`
    Subroutine,
}

impl TypeKind
{
    /// Map a DIE tag to a type kind; `None` for tags that are not types.
    #[must_use]
    pub fn from_tag(tag: gimli::DwTag) -> Option<Self>
    {
        let kind = match tag {
            gimli::DW_TAG_base_type => TypeKind::Base,
            gimli::DW_TAG_unspecified_type => TypeKind::Unspecified,
            gimli::DW_TAG_pointer_type => TypeKind::Pointer,
            gimli::DW_TAG_reference_type => TypeKind::Reference,
            gimli::DW_TAG_rvalue_reference_type => TypeKind::RvalueReference,
            gimli::DW_TAG_ptr_to_member_type => TypeKind::PointerToMember,
            gimli::DW_TAG_const_type => TypeKind::Const,
            gimli::DW_TAG_volatile_type => TypeKind::Volatile,
            gimli::DW_TAG_restrict_type => TypeKind::Restrict,
            gimli::DW_TAG_atomic_type => TypeKind::Atomic,
            gimli::DW_TAG_typedef => TypeKind::Typedef,
            gimli::DW_TAG_array_type => TypeKind::Array,
            gimli::DW_TAG_structure_type => TypeKind::Struct,
            gimli::DW_TAG_class_type => TypeKind::Class,
            gimli::DW_TAG_union_type => TypeKind::Union,
            gimli::DW_TAG_enumeration_type => TypeKind::Enum,
            gimli::DW_TAG_subroutine_type => TypeKind::Subroutine,
            _ => return None,
        };
        Some(kind)
    }

    /// Struct, class or union: resolved in two phases.
    #[must_use]
    pub fn is_aggregate(self) -> bool
    {
        matches!(self, TypeKind::Struct | TypeKind::Class | TypeKind::Union)
    }

    /// Pointer-shaped kinds, which do not need a complete target to exist.
    #[must_use]
    pub fn is_indirection(self) -> bool
    {
        matches!(
            self,
            TypeKind::Pointer | TypeKind::Reference | TypeKind::RvalueReference | TypeKind::PointerToMember
        )
    }

    /// Kinds that only wrap their target (`const`, `typedef`, ...).
    #[must_use]
    pub fn is_wrapper(self) -> bool
    {
        matches!(
            self,
            TypeKind::Const | TypeKind::Volatile | TypeKind::Restrict | TypeKind::Atomic | TypeKind::Typedef
        )
    }
}

impl fmt::Display for TypeKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            TypeKind::Base => "base",
            TypeKind::Unspecified => "unspecified",
            TypeKind::Pointer => "pointer",
            TypeKind::Reference => "reference",
            TypeKind::RvalueReference => "rvalue-reference",
            TypeKind::PointerToMember => "pointer-to-member",
            TypeKind::Const => "const",
            TypeKind::Volatile => "volatile",
            TypeKind::Restrict => "restrict",
            TypeKind::Atomic => "atomic",
            TypeKind::Typedef => "typedef",
            TypeKind::Array => "array",
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::Subroutine => "subroutine",
        };
        write!(f, "{label}")
    }
}

/// One dimension of an array type (`DW_TAG_subrange_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDimension
{
    /// Lower bound (0 for C-family languages)
    pub lower_bound: i64,
    /// Element count, `None` for flexible or unknown bounds
    pub count: Option<u64>,
}

/// One enumerator of an enumeration type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator
{
    /// Enumerator name
    pub name: String,
    /// Constant value
    pub value: i64,
}

/// A data member of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member
{
    /// Member name (`None` for anonymous members)
    pub name: Option<String>,
    /// Member type
    pub type_uid: Option<UserId>,
    /// Byte offset from the start of the aggregate
    pub byte_offset: Option<u64>,
    /// Size of the member's type in bytes
    pub byte_size: Option<u64>,
    /// Width in bits for bit fields
    pub bit_size: Option<u64>,
    /// Offset in bits from the start of the aggregate for bit fields
    pub bit_offset: Option<u64>,
}

/// A base class of an aggregate (`DW_TAG_inheritance`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseClass
{
    /// Base class type
    pub type_uid: Option<UserId>,
    /// Byte offset of the base subobject
    pub byte_offset: Option<u64>,
    /// Whether the inheritance is virtual
    pub is_virtual: bool,
}

/// Member layout of a completed aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeLayout
{
    /// Total size in bytes
    pub byte_size: Option<u64>,
    /// Data members in declaration order
    pub members: Vec<Member>,
    /// Base classes in declaration order
    pub bases: Vec<BaseClass>,
}

/// A resolved type.
///
/// Aggregates start out with an empty layout; [`crate::SymbolFile::complete_type`]
/// fills it exactly once. The handle itself never changes.
#[derive(Debug)]
pub struct Type
{
    pub(crate) uid: UserId,
    pub(crate) kind: TypeKind,
    pub(crate) name: Option<String>,
    pub(crate) qualified_name: Option<String>,
    pub(crate) byte_size: Option<u64>,
    pub(crate) encoding: Option<gimli::DwAte>,
    pub(crate) target: Option<UserId>,
    pub(crate) compiler_type: CompilerType,
    pub(crate) declaration: Option<Declaration>,
    pub(crate) is_forward_declaration: bool,
    pub(crate) incomplete: bool,
    pub(crate) dimensions: Vec<ArrayDimension>,
    pub(crate) enumerators: Vec<Enumerator>,
    pub(crate) parameters: Vec<Option<UserId>>,
    pub(crate) is_variadic: bool,
    pub(crate) layout: OnceCell<TypeLayout>,
}

impl Type
{
    /// Identifier of the DIE this handle was created from.
    #[must_use]
    pub fn uid(&self) -> UserId
    {
        self.uid
    }

    /// Shape of the type.
    #[must_use]
    pub fn kind(&self) -> TypeKind
    {
        self.kind
    }

    /// Unqualified name, if the type is named.
    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref()
    }

    /// Name including enclosing namespaces and aggregates.
    #[must_use]
    pub fn qualified_name(&self) -> Option<&str>
    {
        self.qualified_name.as_deref()
    }

    /// Size in bytes, when the DIE (or the address size, for pointers) gives one.
    #[must_use]
    pub fn byte_size(&self) -> Option<u64>
    {
        self.byte_size
    }

    /// `DW_AT_encoding` of a base type.
    #[must_use]
    pub fn encoding(&self) -> Option<gimli::DwAte>
    {
        self.encoding
    }

    /// Pointee, aliased, element, return or underlying type.
    #[must_use]
    pub fn target(&self) -> Option<UserId>
    {
        self.target
    }

    /// Handle produced by the language type system.
    #[must_use]
    pub fn compiler_type(&self) -> CompilerType
    {
        self.compiler_type
    }

    /// Source declaration, if recorded.
    #[must_use]
    pub fn declaration(&self) -> Option<&Declaration>
    {
        self.declaration.as_ref()
    }

    /// Whether this is a declaration with no definition anywhere in the module.
    #[must_use]
    pub fn is_forward_declaration(&self) -> bool
    {
        self.is_forward_declaration
    }

    /// Whether the type could be fully described.
    ///
    /// Aggregates are complete once their layout is filled in. Other types are
    /// incomplete only when resolving their target hit a cycle or a broken
    /// reference.
    #[must_use]
    pub fn is_complete(&self) -> bool
    {
        if self.kind.is_aggregate() {
            self.layout.get().is_some()
        } else {
            !self.incomplete
        }
    }

    /// Array dimensions, outermost first.
    #[must_use]
    pub fn dimensions(&self) -> &[ArrayDimension]
    {
        &self.dimensions
    }

    /// Enumerators of an enumeration type.
    #[must_use]
    pub fn enumerators(&self) -> &[Enumerator]
    {
        &self.enumerators
    }

    /// Parameter types of a subroutine type (`None` for untyped parameters).
    #[must_use]
    pub fn parameters(&self) -> &[Option<UserId>]
    {
        &self.parameters
    }

    /// Whether a subroutine type accepts trailing variadic arguments.
    #[must_use]
    pub fn is_variadic(&self) -> bool
    {
        self.is_variadic
    }

    /// Layout of a completed aggregate.
    #[must_use]
    pub fn layout(&self) -> Option<&TypeLayout>
    {
        self.layout.get()
    }
}

impl fmt::Display for Type
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.qualified_name.as_deref().or(self.name.as_deref()) {
            Some(name) => write!(f, "{} {name}", self.kind),
            None => write!(f, "{} <anonymous>", self.kind),
        }
    }
}

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableScope
{
    /// Externally visible variable at file or namespace scope
    Global,
    /// File-local or function-local static variable
    Static,
    /// Local variable of a function or block
    Local,
    /// Formal parameter
    Parameter,
}

/// A constant attached to a variable (`DW_AT_const_value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue
{
    /// Unsigned or untyped data form
    Unsigned(u64),
    /// `DW_FORM_sdata`
    Signed(i64),
    /// Block forms
    Bytes(Arc<[u8]>),
    /// String forms
    String(Arc<str>),
}

/// How to find a variable's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableLocation
{
    /// Single DWARF location expression
    Expression(Arc<[u8]>),
    /// Offset of a location list
    LocationList(u64),
    /// Compile-time constant
    Constant(ConstValue),
}

/// A resolved variable.
#[derive(Debug, Clone)]
pub struct Variable
{
    pub(crate) uid: UserId,
    pub(crate) name: Option<String>,
    pub(crate) qualified_name: Option<String>,
    pub(crate) linkage_name: Option<SymbolName>,
    pub(crate) type_uid: Option<UserId>,
    pub(crate) scope: VariableScope,
    pub(crate) location: Option<VariableLocation>,
    pub(crate) declaration: Option<Declaration>,
    pub(crate) is_external: bool,
    pub(crate) is_artificial: bool,
    pub(crate) context: Option<UserId>,
}

impl Variable
{
    /// Identifier of the variable's DIE.
    #[must_use]
    pub fn uid(&self) -> UserId
    {
        self.uid
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref()
    }

    /// Name including enclosing namespaces and aggregates.
    #[must_use]
    pub fn qualified_name(&self) -> Option<&str>
    {
        self.qualified_name.as_deref()
    }

    /// Linkage (mangled) name with its demangled form.
    #[must_use]
    pub fn linkage_name(&self) -> Option<&SymbolName>
    {
        self.linkage_name.as_ref()
    }

    /// Type of the variable.
    #[must_use]
    pub fn type_uid(&self) -> Option<UserId>
    {
        self.type_uid
    }

    /// Storage class.
    #[must_use]
    pub fn scope(&self) -> VariableScope
    {
        self.scope
    }

    /// Location description.
    #[must_use]
    pub fn location(&self) -> Option<&VariableLocation>
    {
        self.location.as_ref()
    }

    /// Source declaration.
    #[must_use]
    pub fn declaration(&self) -> Option<&Declaration>
    {
        self.declaration.as_ref()
    }

    /// `DW_AT_external`
    #[must_use]
    pub fn is_external(&self) -> bool
    {
        self.is_external
    }

    /// `DW_AT_artificial` (e.g. `this`)
    #[must_use]
    pub fn is_artificial(&self) -> bool
    {
        self.is_artificial
    }

    /// Function or block that owns a local variable or parameter.
    #[must_use]
    pub fn context(&self) -> Option<UserId>
    {
        self.context
    }
}

/// Call site of an inlined function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineInfo
{
    /// Name of the inlined function
    pub name: Option<String>,
    /// Where the call was made
    pub call_site: Declaration,
}

/// A lexical block or inlined call inside a function.
#[derive(Debug, Clone)]
pub struct Block
{
    /// Identifier of the block's DIE (the function's own DIE for the root block)
    pub uid: UserId,
    /// Code covered by the block
    pub ranges: Vec<AddressRange>,
    /// Set when the block is an inlined call
    pub inline: Option<InlineInfo>,
    /// Variables and parameters declared directly in the block
    pub variables: Vec<UserId>,
    /// Nested blocks
    pub children: Vec<Block>,
}

impl Block
{
    /// Whether the block covers `address`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        self.ranges.iter().any(|range| range.contains(address))
    }

    /// Deepest block (this one included) covering `address`.
    #[must_use]
    pub fn innermost_containing(&self, address: Address) -> Option<&Block>
    {
        if !self.contains(address) {
            return None;
        }
        let deeper = self
            .children
            .iter()
            .find_map(|child| child.innermost_containing(address));
        Some(deeper.unwrap_or(self))
    }

    /// Find a block by identifier anywhere in this subtree.
    #[must_use]
    pub fn find(&self, uid: UserId) -> Option<&Block>
    {
        if self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(uid))
    }
}

/// A resolved function (a code-bearing `DW_TAG_subprogram`).
#[derive(Debug, Clone)]
pub struct Function
{
    pub(crate) uid: UserId,
    pub(crate) name: Option<String>,
    pub(crate) qualified_name: Option<String>,
    pub(crate) linkage_name: Option<SymbolName>,
    pub(crate) return_type: Option<UserId>,
    pub(crate) declaration: Option<Declaration>,
    pub(crate) is_external: bool,
    pub(crate) block: Block,
}

impl Function
{
    /// Identifier of the function's DIE.
    #[must_use]
    pub fn uid(&self) -> UserId
    {
        self.uid
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref()
    }

    /// Name including enclosing namespaces and classes.
    #[must_use]
    pub fn qualified_name(&self) -> Option<&str>
    {
        self.qualified_name.as_deref()
    }

    /// Linkage (mangled) name with its demangled form.
    #[must_use]
    pub fn linkage_name(&self) -> Option<&SymbolName>
    {
        self.linkage_name.as_ref()
    }

    /// Best name for display: demangled linkage name, then qualified name.
    #[must_use]
    pub fn display_name(&self) -> &str
    {
        self.linkage_name
            .as_ref()
            .and_then(SymbolName::demangled)
            .or(self.qualified_name.as_deref())
            .or(self.name.as_deref())
            .unwrap_or("<anonymous>")
    }

    /// Return type (`None` for `void`).
    #[must_use]
    pub fn return_type(&self) -> Option<UserId>
    {
        self.return_type
    }

    /// Source declaration.
    #[must_use]
    pub fn declaration(&self) -> Option<&Declaration>
    {
        self.declaration.as_ref()
    }

    /// `DW_AT_external`
    #[must_use]
    pub fn is_external(&self) -> bool
    {
        self.is_external
    }

    /// Code ranges of the function.
    #[must_use]
    pub fn ranges(&self) -> &[AddressRange]
    {
        &self.block.ranges
    }

    /// Lowest address of the function's code.
    #[must_use]
    pub fn entry_address(&self) -> Option<Address>
    {
        self.block.ranges.iter().map(|range| range.begin).min()
    }

    /// Root block (covers the whole function, holds the parameters).
    #[must_use]
    pub fn block(&self) -> &Block
    {
        &self.block
    }
}

/// One row of a line table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry
{
    /// First address of the row
    pub address: Address,
    /// Source file path
    pub file: String,
    /// Line number (0 for compiler-generated code)
    pub line: u32,
    /// Column number (0 when unknown)
    pub column: u32,
    /// Whether the row is a recommended breakpoint location
    pub is_stmt: bool,
}

/// Everything known about one code address.
#[derive(Debug, Clone, Default)]
pub struct SymbolContext
{
    /// Logical index of the owning compile unit
    pub unit: Option<usize>,
    /// Function containing the address
    pub function: Option<Arc<Function>>,
    /// Deepest block containing the address
    pub block: Option<UserId>,
    /// Line-table row for the address
    pub line: Option<LineEntry>,
}

/// What kind of scope a declaration context is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclContextKind
{
    /// A compile unit's top level
    TranslationUnit,
    /// `DW_TAG_namespace`
    Namespace,
    /// Struct, class, union or enumeration
    Aggregate,
    /// `DW_TAG_subprogram`
    Function,
    /// Lexical block or inlined call
    Block,
}

/// A scope that can contain declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclContext
{
    /// Identifier of the DIE establishing the scope
    pub uid: UserId,
    /// Kind of scope
    pub kind: DeclContextKind,
    /// Unqualified name (`None` for anonymous scopes and translation units)
    pub name: Option<String>,
    /// Fully qualified name (empty for translation units)
    pub qualified_name: String,
    /// Enclosing scope (`None` for translation units)
    pub parent: Option<UserId>,
    /// Handle produced by the language type system
    pub compiler_context: CompilerDeclContext,
}
