//! Variables, functions and block trees.

use std::sync::Arc;

use gimli::DwTag;
use tracing::trace;

use super::decl;
use crate::dwarf::decoder::{AttrValue, DecodedEntry};
use crate::dwarf::demangle::make_symbol_name;
use crate::dwarf::unit::Die;
use crate::error::{Result, SymbolError};
use crate::symbol_file::SymbolFile;
use crate::types::{
    Block, ConstValue, DeclContextKind, Declaration, Function, InlineInfo, SymbolName, UserId, Variable,
    VariableLocation, VariableScope,
};

/// `DW_OP_addr`, `DW_OP_addrx` and `DW_OP_GNU_addr_index`: a location at a fixed address.
const STATIC_ADDRESS_OPS: [u8; 3] = [0x03, 0xa1, 0xfb];

fn is_variable_tag(tag: DwTag) -> bool
{
    matches!(
        tag,
        gimli::DW_TAG_variable | gimli::DW_TAG_formal_parameter | gimli::DW_TAG_constant | gimli::DW_TAG_member
    )
}

fn const_value(entry: &DecodedEntry) -> Option<ConstValue>
{
    let value = match entry.attr(gimli::DW_AT_const_value)? {
        AttrValue::Unsigned(value) => ConstValue::Unsigned(*value),
        AttrValue::Signed(value) => ConstValue::Signed(*value),
        AttrValue::Block(bytes) | AttrValue::Expression(bytes) => ConstValue::Bytes(Arc::clone(bytes)),
        AttrValue::String(text) => ConstValue::String(Arc::clone(text)),
        _ => return None,
    };
    Some(value)
}

fn location(entry: &DecodedEntry) -> Option<VariableLocation>
{
    match entry.attr(gimli::DW_AT_location)? {
        AttrValue::Expression(bytes) | AttrValue::Block(bytes) => Some(VariableLocation::Expression(Arc::clone(bytes))),
        AttrValue::LocationList(offset) | AttrValue::SectionOffset(offset) => Some(VariableLocation::LocationList(*offset)),
        _ => None,
    }
}

fn has_static_address(location: Option<&VariableLocation>) -> bool
{
    matches!(location, Some(VariableLocation::Expression(bytes)) if bytes.first().is_some_and(|op| STATIC_ADDRESS_OPS.contains(op)))
}

impl SymbolFile
{
    /// Resolve the variable whose DIE is identified by `uid`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `uid` does not name a variable DIE.
    pub fn resolve_variable_uid(&self, uid: UserId) -> Result<Arc<Variable>>
    {
        let die = self.die_for_uid(uid)?;
        self.resolve_variable(&die, None)
    }

    /// Resolve a variable or parameter DIE. `context` overrides the enclosing
    /// declaration context otherwise derived from the DIE tree. The same DIE
    /// always yields the same handle, so `context` only takes effect on the
    /// first resolution of the DIE; later calls get the cached variable with
    /// the context it was first built with.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::WrongKind`] for DIEs that are not variables.
    pub fn resolve_variable(&self, die: &Die, context: Option<UserId>) -> Result<Arc<Variable>>
    {
        let key = die.die_ref();
        if !is_variable_tag(die.tag()) {
            return Err(SymbolError::WrongKind {
                die: key,
                tag: die.tag().to_string(),
                expected: "variable",
            });
        }
        let guard = self.state.lock();
        if let Some(variable) = guard.borrow().variables.get(&key) {
            return Ok(Arc::clone(variable));
        }

        let origin = decl::origin_die(&self.store, die);
        let entry = die.entry();
        let is_external = entry.flag(gimli::DW_AT_external) || origin.entry().flag(gimli::DW_AT_external);
        let location = location(entry).or_else(|| {
            const_value(entry)
                .or_else(|| const_value(origin.entry()))
                .map(VariableLocation::Constant)
        });
        let scope = if die.tag() == gimli::DW_TAG_formal_parameter {
            VariableScope::Parameter
        } else {
            match die.parent().and_then(|parent| decl::context_kind(parent.tag())) {
                None | Some(DeclContextKind::TranslationUnit | DeclContextKind::Namespace) if is_external => {
                    VariableScope::Global
                }
                None | Some(DeclContextKind::TranslationUnit | DeclContextKind::Namespace) => VariableScope::Static,
                Some(DeclContextKind::Aggregate) => VariableScope::Global,
                Some(DeclContextKind::Function | DeclContextKind::Block) => {
                    if has_static_address(location.as_ref()) {
                        VariableScope::Static
                    } else {
                        VariableScope::Local
                    }
                }
            }
        };

        let variable = Arc::new(Variable {
            uid: die.uid(),
            name: decl::die_name(&self.store, die),
            qualified_name: decl::qualified_name(&self.store, die),
            linkage_name: self.linkage_name(die),
            type_uid: self.type_of(die, &origin),
            scope,
            location,
            declaration: decl::declaration(&self.store, die),
            is_external,
            is_artificial: entry.flag(gimli::DW_AT_artificial),
            context: context.or_else(|| decl::containing_context_die(&self.store, die).map(|scope| scope.uid())),
        });
        trace!(die = %key, name = ?variable.name(), "resolved variable");
        guard
            .borrow_mut()
            .variables
            .insert(key, Arc::clone(&variable));
        Ok(variable)
    }

    /// Resolve the function whose DIE is identified by `uid`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `uid` does not name a subprogram or inlined call.
    pub fn resolve_function_uid(&self, uid: UserId) -> Result<Arc<Function>>
    {
        let die = self.die_for_uid(uid)?;
        self.resolve_function(&die)
    }

    /// Resolve a subprogram or inlined-subroutine DIE with its block tree.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::WrongKind`] for other DIEs.
    pub fn resolve_function(&self, die: &Die) -> Result<Arc<Function>>
    {
        let key = die.die_ref();
        if !matches!(die.tag(), gimli::DW_TAG_subprogram | gimli::DW_TAG_inlined_subroutine) {
            return Err(SymbolError::WrongKind {
                die: key,
                tag: die.tag().to_string(),
                expected: "function",
            });
        }
        let guard = self.state.lock();
        if let Some(function) = guard.borrow().functions.get(&key) {
            return Ok(Arc::clone(function));
        }

        let origin = decl::origin_die(&self.store, die);
        let function = Arc::new(Function {
            uid: die.uid(),
            name: decl::die_name(&self.store, die),
            qualified_name: decl::qualified_name(&self.store, die),
            linkage_name: self.linkage_name(die),
            return_type: self.type_of(die, &origin),
            declaration: decl::declaration(&self.store, die),
            is_external: die.entry().flag(gimli::DW_AT_external) || origin.entry().flag(gimli::DW_AT_external),
            block: self.build_block(die),
        });
        trace!(die = %key, name = function.display_name(), "resolved function");
        guard
            .borrow_mut()
            .functions
            .insert(key, Arc::clone(&function));
        Ok(function)
    }

    /// Every function defined in the compile unit with logical index `unit`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range or its DIEs are unavailable.
    pub fn parse_functions(&self, unit: usize) -> Result<Vec<Arc<Function>>>
    {
        let unit = self.store.dies_unit(&self.store.unit_at_index(unit)?)?;
        let mut functions = Vec::new();
        for die in unit.dies()? {
            let entry = die.entry();
            if entry.tag != gimli::DW_TAG_subprogram || entry.is_declaration() || entry.ranges().is_empty() {
                continue;
            }
            functions.push(self.resolve_function(&die)?);
        }
        Ok(functions)
    }

    /// Variables declared directly in the scope identified by `context`: a
    /// unit or namespace yields its globals (nested namespaces included), a
    /// function or block its parameters and locals, an aggregate its static
    /// members.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::WrongKind`] if `context` does not open a scope.
    pub fn parse_variables_for_context(&self, context: UserId) -> Result<Vec<Arc<Variable>>>
    {
        let die = self.die_for_uid(context)?;
        let kind = decl::context_kind(die.tag()).ok_or_else(|| SymbolError::WrongKind {
            die: die.die_ref(),
            tag: die.tag().to_string(),
            expected: "declaration context",
        })?;
        let mut found = Vec::new();
        match kind {
            DeclContextKind::TranslationUnit | DeclContextKind::Namespace => collect_globals(&die, &mut found),
            DeclContextKind::Function | DeclContextKind::Block => collect_locals(&die, &mut found),
            DeclContextKind::Aggregate => found.extend(die.children().filter(|child| {
                child.tag() == gimli::DW_TAG_variable
                    || (child.tag() == gimli::DW_TAG_member && child.entry().is_declaration())
            })),
        }
        found
            .iter()
            .map(|variable| self.resolve_variable(variable, Some(die.uid())))
            .collect()
    }

    fn linkage_name(&self, die: &Die) -> Option<SymbolName>
    {
        let raw = decl::die_linkage_name(&self.store, die)?;
        Some(make_symbol_name(raw, die.unit().language()))
    }

    /// `DW_AT_type` of `die` or of its origin, resolved to the canonical type id.
    fn type_of(&self, die: &Die, origin: &Die) -> Option<UserId>
    {
        let (from, reference) = match die.entry().reference(gimli::DW_AT_type) {
            Some(reference) => (die, reference),
            None => (origin, origin.entry().reference(gimli::DW_AT_type)?),
        };
        let target = match self.store.resolve_target(from, reference) {
            Ok(target) => target,
            Err(err) => {
                self.diagnostics.record(&err);
                return None;
            }
        };
        match self.resolve_type(&target) {
            Ok(resolved) => Some(resolved.uid()),
            Err(err) => {
                self.diagnostics.record(&err);
                Some(target.uid())
            }
        }
    }

    fn build_block(&self, die: &Die) -> Block
    {
        let inline = (die.tag() == gimli::DW_TAG_inlined_subroutine).then(|| {
            let entry = die.entry();
            let file = entry.unsigned(gimli::DW_AT_call_file).and_then(|index| {
                let table = die.unit().line_table().ok()??;
                table.file(index).map(str::to_string)
            });
            InlineInfo {
                name: decl::die_name(&self.store, die),
                call_site: Declaration {
                    file,
                    line: entry
                        .unsigned(gimli::DW_AT_call_line)
                        .and_then(|line| u32::try_from(line).ok()),
                    column: entry
                        .unsigned(gimli::DW_AT_call_column)
                        .and_then(|column| u32::try_from(column).ok()),
                },
            }
        });
        let mut block = Block {
            uid: die.uid(),
            ranges: die.entry().ranges(),
            inline,
            variables: Vec::new(),
            children: Vec::new(),
        };
        self.fill_block(die, &mut block);
        block
    }

    /// Attach the variables and nested blocks under `die` to `block`. Blocks
    /// without code ranges are transparent: their contents join the parent.
    fn fill_block(&self, die: &Die, block: &mut Block)
    {
        for child in die.children() {
            match child.tag() {
                gimli::DW_TAG_formal_parameter | gimli::DW_TAG_variable => block.variables.push(child.uid()),
                gimli::DW_TAG_lexical_block | gimli::DW_TAG_inlined_subroutine => {
                    if child.entry().ranges().is_empty() {
                        self.fill_block(&child, block);
                    } else {
                        block.children.push(self.build_block(&child));
                    }
                }
                _ => {}
            }
        }
    }
}

fn collect_globals(scope: &Die, found: &mut Vec<Die>)
{
    for child in scope.children() {
        match child.tag() {
            gimli::DW_TAG_variable | gimli::DW_TAG_constant => found.push(child),
            gimli::DW_TAG_namespace => collect_globals(&child, found),
            _ => {}
        }
    }
}

fn collect_locals(scope: &Die, found: &mut Vec<Die>)
{
    for child in scope.children() {
        match child.tag() {
            gimli::DW_TAG_formal_parameter | gimli::DW_TAG_variable => found.push(child),
            gimli::DW_TAG_lexical_block | gimli::DW_TAG_inlined_subroutine if child.entry().ranges().is_empty() => {
                collect_locals(&child, found);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_static_address_detection()
    {
        let fixed = VariableLocation::Expression(Arc::from(vec![0x03, 0, 0x10, 0, 0, 0, 0, 0, 0]));
        let frame = VariableLocation::Expression(Arc::from(vec![0x91, 0x7c]));
        assert!(has_static_address(Some(&fixed)));
        assert!(!has_static_address(Some(&frame)));
        assert!(!has_static_address(Some(&VariableLocation::LocationList(0))));
        assert!(!has_static_address(None));
    }
}
