//! Identifier round trips and handle identity under concurrent queries.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use common::{base_type, build, compile_unit, member, Entry, Image, UnitSpec, Value};
use symdex_core::index::NameQuery;
use symdex_core::resolve::type_system::BasicTypeSystem;
use symdex_core::types::Type;
use symdex_core::{DieRef, SymbolFile};

const THREADS: usize = 8;

fn image() -> Image
{
    let first = compile_unit("list.c")
        .child(base_type("int", "int", 4))
        .child(
            Entry::new(gimli::DW_TAG_structure_type)
                .label("List")
                .name("List")
                .attr(gimli::DW_AT_byte_size, Value::Data1(16))
                .child(member("next", "List*", 0))
                .child(member("len", "int", 8)),
        )
        .child(Entry::new(gimli::DW_TAG_pointer_type).label("List*").type_ref("List"))
        .child(
            Entry::new(gimli::DW_TAG_subprogram)
                .name("push")
                .attr(gimli::DW_AT_external, Value::Flag)
                .code_range(0x1000, 0x20)
                .child(
                    Entry::new(gimli::DW_TAG_formal_parameter)
                        .name("list")
                        .type_ref("List*"),
                ),
        );
    let second = compile_unit("main.c")
        .child(base_type("long", "long", 8))
        .child(
            Entry::new(gimli::DW_TAG_variable)
                .label("total")
                .name("total")
                .type_ref("long")
                .static_location(0x5000),
        );
    build(&[UnitSpec::v4(first), UnitSpec::v4(second)])
}

#[test]
fn test_identifiers_round_trip_for_every_die()
{
    let file = common::open(image().sections());
    let mut seen = HashSet::new();
    let mut count = 0;
    for index in 0..file.num_compile_units() {
        let unit = file.compile_unit(index).unwrap();
        for die in unit.dies().unwrap() {
            let uid = file.identifier_for(die.die_ref());
            assert_eq!(file.reference_for(uid), die.die_ref());
            assert_eq!(uid, die.uid());

            let found = file.die_for_uid(uid).unwrap();
            assert_eq!(found.offset(), die.offset());
            assert_eq!(found.tag(), die.tag());

            seen.insert(uid);
            count += 1;
        }
    }
    assert_eq!(seen.len(), count);
}

#[test]
fn test_unknown_identifier_is_an_error()
{
    let image = image();
    let file = common::open(image.sections());
    let past_end = u32::try_from(image.info.len()).unwrap() + 0x100;
    assert!(file.die_for_uid(file.identifier_for(DieRef::main(past_end))).is_err());
}

#[test]
fn test_units_are_indexed_in_order()
{
    let image = image();
    let file = common::open(image.sections());
    assert_eq!(file.num_compile_units(), 2);
    for (index, offset) in image.unit_offsets.iter().enumerate() {
        let unit = file.compile_unit(index).unwrap();
        assert_eq!(unit.offset(), *offset);
        assert_eq!(file.store().logical_index_of(&unit), Some(index));
    }
    assert!(file.compile_unit(2).is_err());
}

#[test]
fn test_concurrent_resolution_shares_handles()
{
    let image = image();
    let type_system = Arc::new(BasicTypeSystem::new());
    let file = SymbolFile::builder(Arc::new(image.sections()))
        .type_system(type_system.clone())
        .build();
    let barrier = Barrier::new(THREADS);

    let resolved: Vec<Arc<Type>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let functions = file.find_functions(&NameQuery::Exact("push"), false, None).unwrap();
                    assert_eq!(functions.len(), 1);
                    let types = file.find_types(&NameQuery::Exact("List"), None).unwrap();
                    assert_eq!(types.len(), 1);
                    file.complete_type(&types[0]).unwrap();
                    Arc::clone(&types[0])
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for other in &resolved[1..] {
        assert!(Arc::ptr_eq(&resolved[0], other));
    }
    let list = &resolved[0];
    assert_eq!(type_system.created_for(list.uid()).len(), 1);
    assert_eq!(type_system.completion_count(list.compiler_type()), 1);
}

#[test]
fn test_concurrent_variable_resolution()
{
    let file = common::open(image().sections());
    let barrier = Barrier::new(THREADS);
    let uids: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    file.find_globals(&NameQuery::Exact("total"), None).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    for found in &uids {
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &uids[0][0]));
    }
}

#[test]
fn test_variable_context_is_fixed_on_first_resolution()
{
    let image = image();
    let file = common::open(image.sections());
    let uid = file.identifier_for(DieRef::main(image.offset("total")));
    let die = file.die_for_uid(uid).unwrap();
    let list = file.identifier_for(DieRef::main(image.offset("List")));

    let first = file.resolve_variable(&die, Some(list)).unwrap();
    assert_eq!(first.context(), Some(list));

    // Later calls get the cached handle whatever context they pass
    let again = file.resolve_variable(&die, None).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(again.context(), Some(list));
    assert!(Arc::ptr_eq(&first, &file.resolve_variable_uid(uid).unwrap()));
}
