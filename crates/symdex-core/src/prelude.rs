//! Common module for library exports

pub use crate::config::SymbolFileOptions;
pub use crate::dwarf::identity::{CompanionResolver, SearchPathResolver};
pub use crate::dwarf::sections::{MemorySections, ObjectFile, SectionProvider};
pub use crate::error::{Diagnostic, ErrorCategory, Result, SymbolError};
pub use crate::external::{ExternalModule, ModuleResolver};
pub use crate::index::{NameKind, NameQuery};
pub use crate::resolve::type_system::{BasicTypeSystem, TypeSystem};
pub use crate::symbol_file::SymbolFile;
pub use crate::types::{
    Address, AddressRange, DeclContext, DieRef, FileSelector, Function, SectionKind, SymbolContext, Type, TypeKind,
    UserId, Variable, VariableScope,
};
