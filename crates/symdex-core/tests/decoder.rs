//! Entry decoding and unit discovery over hand-built sections.

mod common;

use common::{base_type, build, compile_unit, Entry, UnitSpec, Value};
use gimli::UnitOffset;
use symdex_core::dwarf::decoder::{decode_entry_at, AttrValue, DieTarget, EntryDecoder};
use symdex_core::dwarf::supported_version;
use symdex_core::dwarf::unit::UnitRole;
use symdex_core::types::{AddressRange, SectionKind, SymbolLanguage};

fn image() -> common::Image
{
    let root = compile_unit("decode.c")
        .attr(gimli::DW_AT_producer, Value::Str("cc 1.0".to_string()))
        .code_range(0x1000, 0x100)
        .child(base_type("int", "int", 4))
        .child(
            Entry::new(gimli::DW_TAG_subprogram)
                .label("f")
                .name("f")
                .type_ref("int")
                .attr(gimli::DW_AT_external, Value::Flag)
                .attr(gimli::DW_AT_decl_line, Value::Udata(300))
                .code_range(0x1000, 0x10)
                .child(
                    Entry::new(gimli::DW_TAG_variable)
                        .label("local")
                        .name("local")
                        .type_ref("int")
                        .attr(gimli::DW_AT_const_value, Value::Sdata(-7)),
                ),
        );
    build(&[UnitSpec::v4(root)])
}

#[test]
fn test_supported_versions()
{
    assert!(!supported_version(1));
    for version in 2..=5 {
        assert!(supported_version(version));
    }
    assert!(!supported_version(6));
}

#[test]
fn test_decode_single_entry()
{
    let image = image();
    let file = common::open(image.sections());
    let unit = file.compile_unit(0).unwrap();
    let base = u64::from(unit.offset());
    let offset = (image.offset("f") - unit.offset()) as usize;

    let entry = decode_entry_at(unit.dwarf(), unit.gimli_unit().unwrap(), unit.section(), base, UnitOffset(offset))
        .unwrap()
        .unwrap();
    assert_eq!(entry.tag, gimli::DW_TAG_subprogram);
    assert_eq!(entry.offset, image.offset("f"));
    assert!(entry.has_children);
    assert_eq!(entry.name(), Some("f"));
    assert!(entry.flag(gimli::DW_AT_external));
    assert!(!entry.is_declaration());
    assert_eq!(entry.unsigned(gimli::DW_AT_decl_line), Some(300));
    assert_eq!(entry.ranges(), vec![AddressRange::new(0x1000, 0x1010)]);
    assert_eq!(
        entry.reference(gimli::DW_AT_type),
        Some(DieTarget::Offset {
            section: SectionKind::DebugInfo,
            offset: u64::from(image.offset("int")),
        })
    );
}

#[test]
fn test_decoder_walks_in_order()
{
    let image = image();
    let file = common::open(image.sections());
    let unit = file.compile_unit(0).unwrap();
    let gimli_unit = unit.gimli_unit().unwrap();
    let mut decoder =
        EntryDecoder::new(unit.dwarf(), gimli_unit, unit.section(), u64::from(unit.offset()), None).unwrap();

    let mut tags = Vec::new();
    while let Some(entry) = decoder.decode_next().unwrap() {
        if entry.tag == gimli::DW_TAG_variable {
            assert_eq!(entry.offset, image.offset("local"));
            assert_eq!(entry.attr(gimli::DW_AT_const_value), Some(&AttrValue::Signed(-7)));
            assert_eq!(entry.signed(gimli::DW_AT_const_value), Some(-7));
            assert_eq!(entry.unsigned(gimli::DW_AT_const_value), None);
        }
        tags.push(entry.tag);
    }
    assert_eq!(
        tags,
        vec![
            gimli::DW_TAG_compile_unit,
            gimli::DW_TAG_base_type,
            gimli::DW_TAG_subprogram,
            gimli::DW_TAG_variable,
        ]
    );
}

#[test]
fn test_unit_metadata()
{
    let file = common::open(image().sections());
    let unit = file.compile_unit(0).unwrap();
    assert_eq!(unit.version(), 4);
    assert_eq!(unit.address_size(), 8);
    assert_eq!(unit.role(), UnitRole::Standalone);
    assert_eq!(unit.dwo_id(), None);
    assert_eq!(unit.language(), Some(SymbolLanguage::Cpp));

    let info = unit.info().unwrap();
    assert_eq!(info.name.as_deref(), Some("decode.c"));
    assert_eq!(info.producer.as_deref(), Some("cc 1.0"));
    assert_eq!(info.comp_dir.as_deref(), Some("/src"));
    assert_eq!(info.low_pc, Some(0x1000));
    assert_eq!(info.ranges, vec![AddressRange::new(0x1000, 0x1100)]);
    assert!(!info.is_optimized);
    assert!(!unit.is_decoded());

    let root = unit.root().unwrap();
    assert!(unit.is_decoded());
    let children: Vec<_> = root.children().map(|child| child.tag()).collect();
    assert_eq!(children, vec![gimli::DW_TAG_base_type, gimli::DW_TAG_subprogram]);
    let f = root.children().nth(1).unwrap();
    assert_eq!(f.children().next().unwrap().parent().unwrap().offset(), f.offset());
}
