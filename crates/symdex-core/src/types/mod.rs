//! # Types
//!
//! Identifiers, addresses, names, and the resolved symbol model.

pub mod address;
pub mod ids;
pub mod model;
pub mod symbols;

// Re-export all public types
pub use address::{Address, AddressRange};
pub use ids::{DieRef, FileSelector, SectionKind, UserId};
pub use model::{
    ArrayDimension, BaseClass, Block, CompilerDeclContext, CompilerType, ConstValue, DeclContext, DeclContextKind,
    Enumerator, Function, InlineInfo, LineEntry, Member, SymbolContext, Type, TypeKind, TypeLayout, Variable,
    VariableLocation, VariableScope,
};
pub use symbols::{Declaration, SymbolLanguage, SymbolName};
