//! Name index: keys, regex queries, inlined calls, accelerator tables and
//! namespaces.
//!
//! ```cpp
//! namespace ns {
//!     int g;
//!     struct Point { int x; int y; };
//!     int area() { ... }
//! }
//! static inline int helper() { ... }
//! int main() { helper(); }
//! ```

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{base_type, build, compile_unit, member, pub_table, Entry, Image, UnitSpec, Value};
use gimli::SectionId;
use regex::Regex;
use symdex_core::index::NameQuery;
use symdex_core::types::{DeclContextKind, VariableScope};
use symdex_core::{SymbolFile, SymbolFileOptions};

fn image() -> Image
{
    let namespace = Entry::new(gimli::DW_TAG_namespace)
        .label("ns")
        .name("ns")
        .child(
            Entry::new(gimli::DW_TAG_variable)
                .label("g")
                .name("g")
                .type_ref("int")
                .attr(gimli::DW_AT_external, Value::Flag)
                .static_location(0x8000),
        )
        .child(
            Entry::new(gimli::DW_TAG_structure_type)
                .label("Point")
                .name("Point")
                .attr(gimli::DW_AT_byte_size, Value::Data1(8))
                .child(member("x", "int", 0))
                .child(member("y", "int", 4)),
        )
        .child(
            Entry::new(gimli::DW_TAG_subprogram)
                .label("area")
                .name("area")
                .attr(gimli::DW_AT_linkage_name, Value::Str("_ZN2ns4areaEv".to_string()))
                .attr(gimli::DW_AT_external, Value::Flag)
                .type_ref("int")
                .code_range(0x1000, 0x20),
        );
    let helper = Entry::new(gimli::DW_TAG_subprogram)
        .label("helper")
        .name("helper")
        .type_ref("int")
        .attr(gimli::DW_AT_inline, Value::Data1(1));
    let main = Entry::new(gimli::DW_TAG_subprogram)
        .label("main")
        .name("main")
        .attr(gimli::DW_AT_external, Value::Flag)
        .type_ref("int")
        .code_range(0x1100, 0x40)
        .child(
            Entry::new(gimli::DW_TAG_inlined_subroutine)
                .label("helper.inlined")
                .attr(gimli::DW_AT_abstract_origin, Value::Ref("helper"))
                .code_range(0x1110, 0x10),
        );
    let root = compile_unit("main.cpp")
        .child(base_type("int", "int", 4))
        .child(namespace)
        .child(helper)
        .child(main);
    build(&[UnitSpec::v4(root)])
}

/// The same image plus pubnames/pubtypes naming every indexed entity.
fn with_accelerator(image: &Image) -> symdex_core::dwarf::sections::MemorySections
{
    let length = u32::try_from(image.info.len()).unwrap();
    let names = pub_table(
        0,
        length,
        &[
            (image.offset("g"), "ns::g"),
            (image.offset("area"), "ns::area"),
            (image.offset("main"), "main"),
        ],
    );
    let types = pub_table(0, length, &[(image.offset("int"), "int"), (image.offset("Point"), "ns::Point")]);
    image
        .sections()
        .with_section(".debug_pubnames", names)
        .with_section(".debug_pubtypes", types)
}

fn function_names(file: &SymbolFile, query: &NameQuery<'_>, inlines: bool) -> Vec<String>
{
    file.find_functions(query, inlines, None)
        .unwrap()
        .iter()
        .map(|function| function.display_name().to_string())
        .collect()
}

#[test]
fn test_base_and_qualified_names()
{
    let file = common::open(image().sections());

    let by_base = file.find_globals(&NameQuery::Exact("g"), None).unwrap();
    let by_qualified = file.find_globals(&NameQuery::Exact("ns::g"), None).unwrap();
    assert_eq!(by_base.len(), 1);
    assert!(Arc::ptr_eq(&by_base[0], &by_qualified[0]));
    assert_eq!(by_base[0].qualified_name(), Some("ns::g"));
    assert_eq!(by_base[0].scope(), VariableScope::Global);

    assert_eq!(function_names(&file, &NameQuery::Exact("ns::area"), false), vec!["ns::area"]);
    assert_eq!(function_names(&file, &NameQuery::Exact("_ZN2ns4areaEv"), false), vec!["ns::area"]);
    assert_eq!(file.find_types(&NameQuery::Exact("ns::Point"), None).unwrap().len(), 1);

    // Names of one kind are not found through another
    assert!(file.find_types(&NameQuery::Exact("g"), None).unwrap().is_empty());
    assert!(file.find_globals(&NameQuery::Exact("area"), None).unwrap().is_empty());
}

#[test]
fn test_mangled_names_for_function()
{
    let file = common::open(image().sections());
    assert_eq!(file.mangled_names_for_function("ns::area").unwrap(), vec!["_ZN2ns4areaEv"]);
    assert!(file.mangled_names_for_function("main").unwrap().is_empty());
}

#[test]
fn test_regex_queries()
{
    let file = common::open(image().sections());

    let in_namespace = Regex::new("^ns::").unwrap();
    assert_eq!(function_names(&file, &NameQuery::Regex(&in_namespace), false), vec!["ns::area"]);
    assert_eq!(file.find_globals(&NameQuery::Regex(&in_namespace), None).unwrap().len(), 1);
    assert_eq!(file.find_types(&NameQuery::Regex(&in_namespace), None).unwrap().len(), 1);

    // Unanchored and case-sensitive
    let partial = Regex::new("ai").unwrap();
    assert_eq!(function_names(&file, &NameQuery::Regex(&partial), false), vec!["main"]);
    let upper = Regex::new("MAIN").unwrap();
    assert!(function_names(&file, &NameQuery::Regex(&upper), false).is_empty());

    let any = Regex::new(".").unwrap();
    assert_eq!(file.find_functions(&NameQuery::Regex(&any), false, Some(1)).unwrap().len(), 1);
}

#[test]
fn test_inlined_calls_need_opt_in()
{
    let file = common::open(image().sections());

    // The abstract instance has no code; only the inlined call is indexed
    assert!(function_names(&file, &NameQuery::Exact("helper"), false).is_empty());
    let inlined = file.find_functions(&NameQuery::Exact("helper"), true, None).unwrap();
    assert_eq!(inlined.len(), 1);
    assert_eq!(inlined[0].display_name(), "helper");
    assert!(inlined[0].block().inline.is_some());

    let main = file.find_functions(&NameQuery::Exact("main"), false, None).unwrap();
    assert_eq!(main[0].block().children.len(), 1);
    assert_eq!(main[0].block().children[0].uid, inlined[0].uid());
}

#[test]
fn test_concurrent_first_queries()
{
    let file = common::open(image().sections());
    let barrier = Barrier::new(4);
    let results: Vec<Vec<String>> = thread::scope(|scope| {
        let handles: Vec<_> = ["main", "ns::area", "main", "ns::area"]
            .into_iter()
            .map(|name| {
                let file = &file;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    function_names(file, &NameQuery::Exact(name), false)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert_eq!(results[0], results[2]);
    assert_eq!(results[1], results[3]);
    assert_eq!(results[0], vec!["main"]);
}

#[test]
fn test_accelerator_agrees_with_scan()
{
    let image = image();
    let accelerated = common::open(with_accelerator(&image));
    let scanned = common::open_with(
        with_accelerator(&image),
        SymbolFileOptions::new().with_accelerator_tables(false),
    );
    assert!(accelerated.has_accelerator_tables());
    assert!(!scanned.has_accelerator_tables());

    for name in ["g", "ns::g"] {
        let fast: Vec<_> = accelerated
            .find_globals(&NameQuery::Exact(name), None)
            .unwrap()
            .iter()
            .map(|variable| variable.uid())
            .collect();
        let slow: Vec<_> = scanned
            .find_globals(&NameQuery::Exact(name), None)
            .unwrap()
            .iter()
            .map(|variable| variable.uid())
            .collect();
        assert_eq!(fast, slow, "{name}");
    }
    for name in ["area", "ns::area", "main"] {
        assert_eq!(
            function_names(&accelerated, &NameQuery::Exact(name), false),
            function_names(&scanned, &NameQuery::Exact(name), false),
            "{name}"
        );
    }
    assert_eq!(
        accelerated.find_types(&NameQuery::Exact("Point"), None).unwrap().len(),
        scanned.find_types(&NameQuery::Exact("Point"), None).unwrap().len()
    );

    assert!(accelerated.store().sections().is_loaded(SectionId::DebugPubNames));
    assert!(!scanned.store().sections().is_loaded(SectionId::DebugPubNames));
}

#[test]
fn test_partial_accelerator_falls_back_to_scan()
{
    // Only `main` is listed and there is no .debug_pubtypes
    let image = image();
    let length = u32::try_from(image.info.len()).unwrap();
    let names = pub_table(0, length, &[(image.offset("main"), "main")]);
    let file = common::open(image.sections().with_section(".debug_pubnames", names));
    assert!(file.has_accelerator_tables());

    assert_eq!(function_names(&file, &NameQuery::Exact("main"), false), vec!["main"]);
    assert_eq!(function_names(&file, &NameQuery::Exact("ns::area"), false), vec!["ns::area"]);
    assert_eq!(function_names(&file, &NameQuery::Exact("_ZN2ns4areaEv"), false), vec!["ns::area"]);
    assert_eq!(file.find_globals(&NameQuery::Exact("g"), None).unwrap().len(), 1);

    let exact = file.find_types(&NameQuery::Exact("Point"), None).unwrap();
    let pattern = Regex::new("^Point$").unwrap();
    let by_regex = file.find_types(&NameQuery::Regex(&pattern), None).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(by_regex.len(), 1);
    assert!(Arc::ptr_eq(&exact[0], &by_regex[0]));
}

#[test]
fn test_preload_builds_everything()
{
    let file = common::open(image().sections());
    file.preload_symbols();
    assert!(format!("{file:?}").contains("index_built: true"));
    assert!(file.compile_unit(0).unwrap().is_decoded());
}

#[test]
fn test_namespace_contexts()
{
    let image = image();
    let file = common::open(image.sections());

    let ns = file.find_namespace("ns", None).unwrap().unwrap();
    assert_eq!(ns.kind, DeclContextKind::Namespace);
    assert_eq!(ns.qualified_name, "ns");
    assert!(file.find_namespace("missing", None).unwrap().is_none());

    let g = &file.find_globals(&NameQuery::Exact("g"), None).unwrap()[0];
    let containing = file.decl_context_containing_uid(g.uid()).unwrap().unwrap();
    assert_eq!(containing.uid, ns.uid);
    assert_eq!(g.context(), Some(ns.uid));

    let unit = file.decl_context_containing_uid(ns.uid).unwrap().unwrap();
    assert_eq!(unit.kind, DeclContextKind::TranslationUnit);
    assert_eq!(file.find_namespace("ns", Some(&unit)).unwrap().map(|found| found.uid), Some(ns.uid));

    let variables = file.parse_variables_for_context(ns.uid).unwrap();
    assert_eq!(variables.len(), 1);
    assert!(Arc::ptr_eq(&variables[0], g));
}
