//! Type resolution over a self-referential struct:
//!
//! ```c
//! struct Node { struct Node *next; int v; };
//! struct Node head;
//! ```

mod common;

use std::sync::Arc;

use common::{base_type, build, compile_unit, member, Entry, Image, UnitSpec, Value};
use symdex_core::index::NameQuery;
use symdex_core::types::{TypeKind, VariableScope};

fn node_unit(name: &str, node: &'static str, pointer: &'static str, int: &'static str, head: &'static str) -> Entry
{
    compile_unit(name)
        .child(base_type(int, "int", 4))
        .child(
            Entry::new(gimli::DW_TAG_structure_type)
                .label(node)
                .name("Node")
                .attr(gimli::DW_AT_byte_size, Value::Data1(16))
                .child(member("next", pointer, 0))
                .child(member("v", int, 8)),
        )
        .child(
            Entry::new(gimli::DW_TAG_pointer_type)
                .label(pointer)
                .type_ref(node)
                .attr(gimli::DW_AT_byte_size, Value::Data1(8)),
        )
        .child(
            Entry::new(gimli::DW_TAG_variable)
                .label(head)
                .name("head")
                .type_ref(node)
                .attr(gimli::DW_AT_external, Value::Flag)
                .static_location(0x4000),
        )
}

fn node_image() -> Image
{
    build(&[UnitSpec::v4(node_unit("node.c", "Node", "Node*", "int", "head"))])
}

#[test]
fn test_self_referential_struct_resolves()
{
    let file = common::open(node_image().sections());

    let globals = file.find_globals(&NameQuery::Exact("head"), None).unwrap();
    assert_eq!(globals.len(), 1);
    let head = &globals[0];
    assert_eq!(head.scope(), VariableScope::Global);
    assert!(head.is_external());

    let node = file.resolve_type_uid(head.type_uid().unwrap()).unwrap();
    assert_eq!(node.kind(), TypeKind::Struct);
    assert_eq!(node.name(), Some("Node"));
    assert_eq!(node.byte_size(), Some(16));
    assert!(node.layout().is_none());

    assert!(file.complete_type(&node).unwrap());
    let layout = node.layout().unwrap();
    assert_eq!(layout.members.len(), 2);

    let next = &layout.members[0];
    assert_eq!(next.name.as_deref(), Some("next"));
    assert_eq!(next.byte_offset, Some(0));
    assert_eq!(next.byte_size, Some(8));
    let pointer = file.resolve_type_uid(next.type_uid.unwrap()).unwrap();
    assert_eq!(pointer.kind(), TypeKind::Pointer);
    assert_eq!(pointer.target(), Some(node.uid()));
    assert!(pointer.is_complete());

    let pointee = file.resolve_type_uid(pointer.target().unwrap()).unwrap();
    assert!(Arc::ptr_eq(&pointee, &node));

    let v = &layout.members[1];
    assert_eq!(v.name.as_deref(), Some("v"));
    assert_eq!(v.byte_offset, Some(8));
    assert_eq!(v.byte_size, Some(4));
}

#[test]
fn test_same_die_yields_same_handle()
{
    let image = node_image();
    let file = common::open(image.sections());
    let uid = file.identifier_for(symdex_core::DieRef::main(image.offset("Node")));

    let first = file.resolve_type_uid(uid).unwrap();
    let second = file.resolve_type_uid(uid).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let compiler_type = first.compiler_type();
    assert!(file.has_forward_declaration(compiler_type));
    assert!(file.complete_compiler_type(compiler_type).unwrap());
    assert!(!file.has_forward_declaration(compiler_type));
    // Completing again is a no-op
    assert!(file.complete_type(&first).unwrap());
}

#[test]
fn test_equivalent_definitions_are_shared()
{
    let image = build(&[
        UnitSpec::v4(node_unit("a.c", "a.Node", "a.Node*", "a.int", "a.head")),
        UnitSpec::v4(node_unit("b.c", "b.Node", "b.Node*", "b.int", "b.head")),
    ]);
    let file = common::open(image.sections());
    assert_eq!(file.num_compile_units(), 2);

    let types = file.find_types(&NameQuery::Exact("Node"), None).unwrap();
    assert_eq!(types.len(), 1);

    let from_b = file
        .resolve_type_uid(file.identifier_for(symdex_core::DieRef::main(image.offset("b.Node"))))
        .unwrap();
    assert!(Arc::ptr_eq(&from_b, &types[0]));
}

#[test]
fn test_parse_types_covers_unit()
{
    let file = common::open(node_image().sections());
    let types = file.parse_types(0).unwrap();
    let kinds: Vec<TypeKind> = types.iter().map(|resolved| resolved.kind()).collect();
    assert_eq!(kinds, vec![TypeKind::Base, TypeKind::Struct, TypeKind::Pointer]);
}

#[test]
fn test_wrong_kind_is_rejected()
{
    let image = node_image();
    let file = common::open(image.sections());
    let head = file.identifier_for(symdex_core::DieRef::main(image.offset("head")));
    assert!(file.resolve_type_uid(head).is_err());
}
