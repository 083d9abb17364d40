//! Linkage-name demangling.
//!
//! Compilers "mangle" symbol names to encode namespaces and signatures:
//!
//! - **Rust**: legacy (`_ZN...E`) and v0 (`_R...`) schemes
//! - **C++**: Itanium ABI (`_Z...`)
//! - **C**: unmangled
//!
//! Rust names are demangled with `rustc-demangle` (without the trailing hash,
//! so `foo::bar` rather than `foo::bar::h0123...`). Itanium names are kept raw;
//! their source names are available from `DW_AT_name` anyway.

use rustc_demangle::try_demangle;

use crate::types::{SymbolLanguage, SymbolName};

/// Create a `SymbolName` from a raw linkage name.
///
/// `unit_language` breaks ties for names whose mangling is ambiguous: legacy
/// Rust names use the Itanium `_ZN` prefix too.
pub(crate) fn make_symbol_name(raw: String, unit_language: Option<SymbolLanguage>) -> SymbolName
{
    let demangled = demangle(&raw);
    let language = if raw.starts_with("_R") || (demangled.is_some() && unit_language != Some(SymbolLanguage::Cpp)) {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else {
        unit_language.unwrap_or(SymbolLanguage::Unknown)
    };

    SymbolName::new(raw, demangled, language)
}

/// Demangle a Rust linkage name; `None` when the name is not Rust-mangled.
pub(crate) fn demangle(raw: &str) -> Option<String>
{
    if !(raw.starts_with("_R") || raw.starts_with("_ZN") || raw.starts_with("__ZN") || raw.starts_with("__R")) {
        return None;
    }
    try_demangle(raw).ok().map(|demangled| format!("{demangled:#}"))
}
