//! Type resolution.
//!
//! Non-aggregate types are built in one step: the target (pointee, alias,
//! element, return or underlying type) is resolved first and the handle is
//! created from it. Aggregates are built in two phases: resolution only
//! allocates the handle and records it in the forward-declaration table;
//! [`SymbolFile::complete_type`] later decodes the members and fills the
//! layout in place. A struct holding a pointer to itself therefore never
//! meets its own pending slot.

use std::sync::Arc;

use gimli::{EndianSlice, RunTimeEndian};
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use super::type_system::TypeDescriptor;
use super::{decl, Slot, UniqueTypeKey};
use crate::dwarf::decoder::{AttrValue, DecodedEntry};
use crate::dwarf::unit::Die;
use crate::error::{Result, SymbolError};
use crate::index::{NameKind, NameQuery};
use crate::symbol_file::SymbolFile;
use crate::types::{
    ArrayDimension, BaseClass, CompilerType, Enumerator, Member, Type, TypeKind, TypeLayout, UserId,
};

/// Outcome of resolving the `DW_AT_type` of a DIE.
#[derive(Default)]
struct TargetInfo
{
    uid: Option<UserId>,
    compiler_type: Option<CompilerType>,
    byte_size: Option<u64>,
    incomplete: bool,
}

impl SymbolFile
{
    /// Resolve the type whose DIE is identified by `uid`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `uid` does not name a type DIE or its resolution failed.
    pub fn resolve_type_uid(&self, uid: UserId) -> Result<Arc<Type>>
    {
        let die = self.die_for_uid(uid)?;
        self.resolve_type(&die)
    }

    /// Resolve a type DIE. The same DIE always yields the same handle.
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::WrongKind`] for non-type DIEs,
    /// [`SymbolError::CircularDefinition`] when called for a DIE whose
    /// resolution is already on the call stack, and
    /// [`SymbolError::ResolutionFailed`] for a DIE that failed before.
    pub fn resolve_type(&self, die: &Die) -> Result<Arc<Type>>
    {
        let guard = self.state.lock();
        let key = die.die_ref();
        match guard.borrow().types.get(&key) {
            Some(Slot::Ready(resolved)) => return Ok(Arc::clone(resolved)),
            Some(Slot::Pending) => return Err(SymbolError::CircularDefinition(key)),
            Some(Slot::Failed(reason)) => {
                return Err(SymbolError::ResolutionFailed {
                    die: key,
                    reason: reason.clone(),
                })
            }
            None => {}
        }
        let kind = TypeKind::from_tag(die.tag()).ok_or_else(|| SymbolError::WrongKind {
            die: key,
            tag: die.tag().to_string(),
            expected: "type",
        })?;

        guard.borrow_mut().types.insert(key, Slot::Pending);
        let result = self.build_type(die, kind);
        let mut state = guard.borrow_mut();
        match result {
            Ok(resolved) => {
                state.types.insert(key, Slot::Ready(Arc::clone(&resolved)));
                Ok(resolved)
            }
            Err(err) => {
                state.types.insert(key, Slot::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn build_type(&self, die: &Die, kind: TypeKind) -> Result<Arc<Type>>
    {
        let entry = die.entry();
        let qualified_name = decl::qualified_name(&self.store, die);
        let declaration = decl::declaration(&self.store, die);
        let is_declaration = entry.is_declaration();
        let completes_later = kind.is_aggregate() || kind == TypeKind::Enum;

        if is_declaration && completes_later {
            if let Some(definition) = self.find_definition(die, kind, qualified_name.as_deref()) {
                trace!(declaration = %die.die_ref(), definition = %definition.die_ref(), "declaration resolved to definition");
                return self.resolve_type(&definition);
            }
        }

        let unique_key = (completes_later && !is_declaration).then(|| UniqueTypeKey {
            tag: die.tag(),
            qualified_name: qualified_name.clone(),
            byte_size: entry.unsigned(gimli::DW_AT_byte_size),
            declaration: declaration.clone(),
            members: die
                .children()
                .filter(|child| matches!(child.tag(), gimli::DW_TAG_member | gimli::DW_TAG_enumerator))
                .map(|child| {
                    let position = member_offset(child.entry()).or_else(|| child.entry().unsigned(gimli::DW_AT_const_value));
                    (child.name().map(str::to_string), position)
                })
                .collect(),
        });
        if let Some(unique_key) = &unique_key {
            let guard = self.state.lock();
            let existing = guard.borrow().unique.get(unique_key).cloned();
            if let Some(existing) = existing {
                debug!(die = %die.die_ref(), existing = %existing.uid(), "reusing equivalent type");
                return Ok(existing);
            }
        }

        let target = self.resolve_target_type(die, kind);
        let mut byte_size = entry.unsigned(gimli::DW_AT_byte_size).or_else(|| {
            if kind.is_indirection() {
                Some(u64::from(die.unit().address_size()))
            } else if kind.is_wrapper() || kind == TypeKind::Enum {
                target.byte_size
            } else {
                None
            }
        });

        let mut dimensions = Vec::new();
        let mut enumerators = Vec::new();
        let mut parameters = Vec::new();
        let mut is_variadic = false;
        for child in die.children() {
            match (kind, child.tag()) {
                (TypeKind::Array, gimli::DW_TAG_subrange_type) => dimensions.push(array_dimension(child.entry())),
                (TypeKind::Enum, gimli::DW_TAG_enumerator) => {
                    if let (Some(name), Some(value)) = (child.name(), child.entry().signed(gimli::DW_AT_const_value)) {
                        enumerators.push(Enumerator {
                            name: name.to_string(),
                            value,
                        });
                    }
                }
                (TypeKind::Subroutine, gimli::DW_TAG_formal_parameter) => {
                    parameters.push(self.resolve_target_type(&child, TypeKind::Pointer).uid);
                }
                (TypeKind::Subroutine, gimli::DW_TAG_unspecified_parameters) => is_variadic = true,
                _ => {}
            }
        }
        if kind == TypeKind::Array && byte_size.is_none() {
            byte_size = target.byte_size.and_then(|element| {
                dimensions
                    .iter()
                    .try_fold(element, |size, dimension| size.checked_mul(dimension.count?))
            });
        }

        let encoding = match entry.attr(gimli::DW_AT_encoding) {
            Some(AttrValue::Encoding(encoding)) => Some(*encoding),
            Some(AttrValue::Unsigned(value)) => u8::try_from(*value).ok().map(gimli::DwAte),
            _ => None,
        };
        let name = entry.name().map(str::to_string);
        let compiler_type = self.type_system.create_type(&TypeDescriptor {
            uid: die.uid(),
            kind,
            name: name.as_deref(),
            qualified_name: qualified_name.as_deref(),
            byte_size,
            target: target.compiler_type,
            is_declaration,
            attributes: &entry.attrs,
        });

        let resolved = Arc::new(Type {
            uid: die.uid(),
            kind,
            name,
            qualified_name,
            byte_size,
            encoding,
            target: target.uid,
            compiler_type,
            declaration,
            is_forward_declaration: is_declaration && completes_later,
            incomplete: target.incomplete,
            dimensions,
            enumerators,
            parameters,
            is_variadic,
            layout: OnceCell::new(),
        });

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if kind.is_aggregate() && !is_declaration {
            state.forward.insert(compiler_type, die.die_ref());
            state.forward_dies.insert(die.die_ref(), compiler_type);
        }
        if let Some(unique_key) = unique_key {
            state.unique.insert(unique_key, Arc::clone(&resolved));
        }
        trace!(die = %die.die_ref(), %resolved, "resolved type");
        Ok(resolved)
    }

    /// Resolve `DW_AT_type` of `die` for a type of kind `kind`. Cycles are
    /// tolerated by pointer-shaped kinds and turn anything else incomplete.
    fn resolve_target_type(&self, die: &Die, kind: TypeKind) -> TargetInfo
    {
        let Some(reference) = die.entry().reference(gimli::DW_AT_type) else {
            return TargetInfo::default();
        };
        let target_die = match self.store.resolve_target(die, reference) {
            Ok(target_die) => target_die,
            Err(err) => {
                self.diagnostics.record(&err);
                return TargetInfo {
                    incomplete: true,
                    ..TargetInfo::default()
                };
            }
        };
        match self.resolve_type(&target_die) {
            Ok(target) => TargetInfo {
                uid: Some(target.uid()),
                compiler_type: Some(target.compiler_type()),
                byte_size: target.byte_size(),
                incomplete: false,
            },
            Err(SymbolError::CircularDefinition(at)) if kind.is_indirection() => {
                trace!(die = %die.die_ref(), target = %at, "cycle broken by indirection");
                TargetInfo {
                    uid: Some(target_die.uid()),
                    ..TargetInfo::default()
                }
            }
            Err(err) => {
                self.diagnostics.record(&err);
                TargetInfo {
                    uid: Some(target_die.uid()),
                    incomplete: true,
                    ..TargetInfo::default()
                }
            }
        }
    }

    /// A definition with the same qualified name and a compatible tag, found
    /// through the name index.
    fn find_definition(&self, die: &Die, kind: TypeKind, qualified_name: Option<&str>) -> Option<Die>
    {
        let name = qualified_name?;
        let hits = self.index.find(&self.store, &NameQuery::Exact(name), NameKind::TYPE, None);
        hits.into_iter()
            .filter(|hit| hit.die != die.die_ref())
            .filter_map(|hit| self.store.die_for_ref(hit.die).ok())
            .find(|candidate| {
                let compatible = match (kind, TypeKind::from_tag(candidate.tag())) {
                    (TypeKind::Struct | TypeKind::Class, Some(TypeKind::Struct | TypeKind::Class)) => true,
                    (expected, Some(found)) => expected == found,
                    (_, None) => false,
                };
                compatible
                    && !candidate.entry().is_declaration()
                    && decl::qualified_name(&self.store, candidate).as_deref() == Some(name)
            })
    }

    /// Fill in the layout of an aggregate. Returns whether the type is complete.
    ///
    /// Completing an already complete type is a no-op. Forward declarations
    /// without a definition stay incomplete.
    ///
    /// ## Errors
    ///
    /// Returns an error if the aggregate's DIE can no longer be found.
    pub fn complete_type(&self, resolved: &Type) -> Result<bool>
    {
        if !resolved.kind().is_aggregate() || resolved.layout().is_some() {
            return Ok(resolved.is_complete());
        }
        if resolved.is_forward_declaration() {
            return Ok(false);
        }
        let guard = self.state.lock();
        if resolved.layout().is_some() {
            return Ok(true);
        }
        if !guard.borrow_mut().completing.insert(resolved.uid()) {
            trace!(uid = %resolved.uid(), "completion already in progress");
            return Ok(false);
        }
        let layout = self
            .die_for_uid(resolved.uid())
            .map(|die| self.build_layout(&die, resolved));
        guard.borrow_mut().completing.remove(&resolved.uid());
        let layout = layout?;

        let completed = self.type_system.complete_type(resolved.compiler_type(), &layout);
        if resolved.layout.set(layout).is_err() {
            trace!(uid = %resolved.uid(), "layout already set");
        }
        let mut state = guard.borrow_mut();
        if let Some(die) = state.forward.remove(&resolved.compiler_type()) {
            state.forward_dies.remove(&die);
        }
        debug!(uid = %resolved.uid(), %resolved, completed, "completed aggregate");
        Ok(completed)
    }

    /// Complete the aggregate behind a compiler type handed out earlier.
    ///
    /// ## Errors
    ///
    /// Returns an error if the aggregate's DIE can no longer be resolved.
    pub fn complete_compiler_type(&self, compiler_type: CompilerType) -> Result<bool>
    {
        let guard = self.state.lock();
        let pending = guard.borrow().forward.get(&compiler_type).copied();
        let Some(die) = pending else {
            let state = guard.borrow();
            let known = state.types.values().find_map(|slot| match slot {
                Slot::Ready(resolved) if resolved.compiler_type() == compiler_type => Some(resolved.is_complete()),
                _ => None,
            });
            return Ok(known.unwrap_or(false));
        };
        let resolved = self.resolve_type(&self.store.die_for_ref(die)?)?;
        self.complete_type(&resolved)
    }

    /// Whether `compiler_type` is an aggregate still waiting for completion.
    #[must_use]
    pub fn has_forward_declaration(&self, compiler_type: CompilerType) -> bool
    {
        self.state.lock().borrow().forward.contains_key(&compiler_type)
    }

    /// Resolve every type DIE of the compile unit with logical index `unit`.
    ///
    /// Types that fail to resolve are skipped; the failure is in the diagnostics.
    ///
    /// ## Errors
    ///
    /// Returns an error if the unit index is out of range or its DIEs are unavailable.
    pub fn parse_types(&self, unit: usize) -> Result<Vec<Arc<Type>>>
    {
        let unit = self.store.dies_unit(&self.store.unit_at_index(unit)?)?;
        let mut types: Vec<Arc<Type>> = Vec::new();
        for die in unit.dies()? {
            if TypeKind::from_tag(die.tag()).is_none() {
                continue;
            }
            match self.resolve_type(&die) {
                Ok(resolved) => {
                    if !types.iter().any(|known| Arc::ptr_eq(known, &resolved)) {
                        types.push(resolved);
                    }
                }
                Err(err) => trace!(die = %die.die_ref(), "skipping type: {err}"),
            }
        }
        Ok(types)
    }

    fn build_layout(&self, die: &Die, resolved: &Type) -> TypeLayout
    {
        let is_union = resolved.kind() == TypeKind::Union;
        let little_endian = matches!(self.store.sections().endian(), RunTimeEndian::Little);
        let mut layout = TypeLayout {
            byte_size: resolved.byte_size(),
            ..TypeLayout::default()
        };
        for child in die.children() {
            let entry = child.entry();
            match child.tag() {
                gimli::DW_TAG_member => {
                    if entry.is_declaration() || entry.flag(gimli::DW_AT_external) {
                        continue;
                    }
                    let member_type = self.member_type(&child);
                    let byte_offset = member_offset(entry).or(is_union.then_some(0));
                    let byte_size = entry
                        .unsigned(gimli::DW_AT_byte_size)
                        .or_else(|| member_type.as_ref().and_then(|member| member.byte_size()));
                    let bit_size = entry.unsigned(gimli::DW_AT_bit_size);
                    let bit_offset = bit_size.and_then(|bits| {
                        if let Some(offset) = entry.unsigned(gimli::DW_AT_data_bit_offset) {
                            return Some(offset);
                        }
                        let legacy = entry.unsigned(gimli::DW_AT_bit_offset)?;
                        let base = byte_offset.unwrap_or(0).checked_mul(8)?;
                        if little_endian {
                            let storage = byte_size?.checked_mul(8)?;
                            base.checked_add(storage.checked_sub(legacy)?.checked_sub(bits)?)
                        } else {
                            base.checked_add(legacy)
                        }
                    });
                    layout.members.push(Member {
                        name: child.name().map(str::to_string),
                        type_uid: member_type.map(|member| member.uid()),
                        byte_offset,
                        byte_size,
                        bit_size,
                        bit_offset,
                    });
                }
                gimli::DW_TAG_inheritance => {
                    layout.bases.push(BaseClass {
                        type_uid: self.member_type(&child).map(|base| base.uid()),
                        byte_offset: member_offset(entry),
                        is_virtual: entry
                            .unsigned(gimli::DW_AT_virtuality)
                            .is_some_and(|virtuality| virtuality != 0),
                    });
                }
                _ => {}
            }
        }
        layout
    }

    fn member_type(&self, member: &Die) -> Option<Arc<Type>>
    {
        let reference = member.entry().reference(gimli::DW_AT_type)?;
        let resolved = self
            .store
            .resolve_target(member, reference)
            .and_then(|target| self.resolve_type(&target));
        match resolved {
            Ok(resolved) => Some(resolved),
            Err(err) => {
                self.diagnostics.record(&err);
                None
            }
        }
    }
}

fn array_dimension(entry: &DecodedEntry) -> ArrayDimension
{
    let lower_bound = entry.signed(gimli::DW_AT_lower_bound).unwrap_or(0);
    let count = entry.unsigned(gimli::DW_AT_count).or_else(|| {
        let upper = entry.signed(gimli::DW_AT_upper_bound)?;
        let count = upper.checked_sub(lower_bound)?.checked_add(1)?;
        u64::try_from(count).ok()
    });
    ArrayDimension { lower_bound, count }
}

/// `DW_AT_data_member_location` as a constant, or as the single-operation
/// expressions compilers emit for it.
fn member_offset(entry: &DecodedEntry) -> Option<u64>
{
    match entry.attr(gimli::DW_AT_data_member_location)? {
        AttrValue::Unsigned(offset) => Some(*offset),
        AttrValue::Signed(offset) => u64::try_from(*offset).ok(),
        AttrValue::Expression(bytes) | AttrValue::Block(bytes) => constant_expression(bytes),
        _ => None,
    }
}

fn constant_expression(bytes: &[u8]) -> Option<u64>
{
    let (&op, rest) = bytes.split_first()?;
    let mut operand = EndianSlice::new(rest, RunTimeEndian::Little);
    let value = gimli::leb128::read::unsigned(&mut operand).ok()?;
    match gimli::DwOp(op) {
        gimli::DW_OP_plus_uconst => Some(value),
        gimli::DW_OP_constu if operand.is_empty() || operand.slice() == [gimli::DW_OP_plus.0] => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_constant_expression()
    {
        assert_eq!(constant_expression(&[0x23, 0x08]), Some(8));
        assert_eq!(constant_expression(&[0x23, 0x80, 0x01]), Some(128));
        assert_eq!(constant_expression(&[0x10, 0x04, 0x22]), Some(4));
        assert_eq!(constant_expression(&[0x91, 0x08]), None);
        assert_eq!(constant_expression(&[]), None);
    }
}
