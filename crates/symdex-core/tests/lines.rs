//! Address and source-line lookups.
//!
//! ```c
//! // main.c
//! 10 int main() {
//! 11     int x = 0;
//! 13     { int y = util(); }     // lexical block, calls into util.h
//! 20 }
//! ```

mod common;

use common::{base_type, build, compile_unit, Entry, Image, LineProgram, UnitSpec, Value};
use symdex_core::types::Address;
use symdex_core::SymbolFile;

fn image() -> (Image, Vec<u8>)
{
    let program = LineProgram {
        files: vec!["main.c", "util.h"],
        rows: vec![
            (0x1000, 1, 10),
            (0x1008, 1, 11),
            (0x1010, 1, 13),
            (0x1020, 2, 5),
            (0x1030, 1, 20),
        ],
        end: 0x1040,
    };
    let root = compile_unit("main.c")
        .attr(gimli::DW_AT_stmt_list, Value::SecOffset(0))
        .code_range(0x1000, 0x40)
        .child(base_type("int", "int", 4))
        .child(
            Entry::new(gimli::DW_TAG_subprogram)
                .label("main")
                .name("main")
                .attr(gimli::DW_AT_external, Value::Flag)
                .type_ref("int")
                .code_range(0x1000, 0x40)
                .child(Entry::new(gimli::DW_TAG_variable).name("x").type_ref("int"))
                .child(
                    Entry::new(gimli::DW_TAG_lexical_block)
                        .label("block")
                        .code_range(0x1010, 0x20)
                        .child(Entry::new(gimli::DW_TAG_variable).name("y").type_ref("int")),
                ),
        );
    (build(&[UnitSpec::v4(root)]), program.encode())
}

fn open() -> (Image, SymbolFile)
{
    let (image, line) = image();
    let file = common::open(image.sections().with_section(".debug_line", line));
    (image, file)
}

#[test]
fn test_resolve_address()
{
    let (image, file) = open();

    let context = file.resolve_address(Address::new(0x1012)).unwrap();
    assert_eq!(context.unit, Some(0));
    let function = context.function.unwrap();
    assert_eq!(function.display_name(), "main");
    assert_eq!(context.block, Some(file.identifier_for(symdex_core::DieRef::main(image.offset("block")))));
    let line = context.line.unwrap();
    assert_eq!(line.line, 13);
    assert_eq!(line.file, "/src/main.c");
    assert_eq!(line.address, Address::new(0x1010));

    let outside = file.resolve_address(Address::new(0x1008)).unwrap();
    assert_eq!(outside.block, Some(function.uid()));
    assert_eq!(outside.line.unwrap().line, 11);

    let nothing = file.resolve_address(Address::new(0x9000)).unwrap();
    assert!(nothing.unit.is_none());
    assert!(nothing.function.is_none());
    assert!(nothing.line.is_none());
}

#[test]
fn test_resolve_file_line_exact_and_next()
{
    let (_, file) = open();

    let exact = file.resolve_file_line("main.c", 11, false).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].line.as_ref().unwrap().address, Address::new(0x1008));
    assert_eq!(exact[0].function.as_ref().unwrap().display_name(), "main");

    // Line 12 has no code: the next line with code is used
    let next = file.resolve_file_line("main.c", 12, false).unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].line.as_ref().unwrap().line, 13);

    assert!(file.resolve_file_line("main.c", 21, false).unwrap().is_empty());
    assert!(file.resolve_file_line("other.c", 10, false).unwrap().is_empty());
}

#[test]
fn test_resolve_file_line_in_header_needs_inlines()
{
    let (_, file) = open();

    assert!(file.resolve_file_line("util.h", 5, false).unwrap().is_empty());
    let found = file.resolve_file_line("util.h", 5, true).unwrap();
    assert_eq!(found.len(), 1);
    let line = found[0].line.as_ref().unwrap();
    assert_eq!(line.file, "/src/util.h");
    assert_eq!(line.address, Address::new(0x1020));
}

#[test]
fn test_unit_level_parsers()
{
    let (_, file) = open();

    assert_eq!(file.parse_support_files(0).unwrap(), vec!["/src/main.c", "/src/util.h"]);
    assert!(!file.parse_is_optimized(0).unwrap());
    assert!(file.parse_imported_modules(0).unwrap().is_empty());

    let table = file.parse_line_table(0).unwrap().unwrap();
    assert_eq!(table.rows().iter().filter(|row| !row.end_sequence).count(), 5);

    let functions = file.parse_functions(0).unwrap();
    assert_eq!(functions.len(), 1);
    let locals = file.parse_variables_for_context(functions[0].uid()).unwrap();
    let names: Vec<_> = locals.iter().filter_map(|variable| variable.name()).collect();
    assert_eq!(names, vec!["x"]);
}

#[test]
fn test_unit_without_line_table()
{
    let file = common::open(build(&[UnitSpec::v4(compile_unit("bare.c"))]).sections());
    assert!(file.parse_line_table(0).unwrap().is_none());
    assert!(file.parse_support_files(0).unwrap().is_empty());
    assert!(file.resolve_file_line("bare.c", 1, false).unwrap().is_empty());
}
