//! DWARF fixture writer shared by the integration tests.
//!
//! Builds `.debug_info` / `.debug_abbrev` images from a DIE tree, plus line
//! programs and pubnames tables, so tests never need toolchain output. Every
//! DIE gets its own abbreviation; strings are inline and references are
//! `DW_FORM_ref4` (same unit) or `DW_FORM_ref_addr` (any unit).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gimli::{DwAt, DwTag, RunTimeEndian};
use symdex_core::dwarf::identity::CompanionResolver;
use symdex_core::dwarf::sections::{MemorySections, SectionProvider};
use symdex_core::{SymbolFile, SymbolFileOptions};

pub const ADDRESS_SIZE: u8 = 8;

/// Attribute value with its form implied.
#[derive(Debug, Clone)]
pub enum Value
{
    Str(String),
    Data1(u8),
    Data2(u16),
    Data4(u32),
    Data8(u64),
    Udata(u64),
    Sdata(i64),
    Addr(u64),
    Flag,
    Ref(&'static str),
    RefAddr(&'static str),
    Expr(Vec<u8>),
    SecOffset(u32),
}

impl Value
{
    fn form(&self) -> u16
    {
        match self {
            Value::Str(_) => 0x08,
            Value::Data1(_) => 0x0b,
            Value::Data2(_) => 0x05,
            Value::Data4(_) => 0x06,
            Value::Data8(_) => 0x07,
            Value::Udata(_) => 0x0f,
            Value::Sdata(_) => 0x0d,
            Value::Addr(_) => 0x01,
            Value::Flag => 0x19,
            Value::Ref(_) => 0x13,
            Value::RefAddr(_) => 0x10,
            Value::Expr(_) => 0x18,
            Value::SecOffset(_) => 0x17,
        }
    }
}

/// One DIE of a fixture tree.
#[derive(Debug, Clone)]
pub struct Entry
{
    tag: DwTag,
    label: Option<&'static str>,
    attrs: Vec<(DwAt, Value)>,
    children: Vec<Entry>,
    code: Option<u64>,
}

impl Entry
{
    pub fn new(tag: DwTag) -> Self
    {
        Self {
            tag,
            label: None,
            attrs: Vec::new(),
            children: Vec::new(),
            code: None,
        }
    }

    /// Name the DIE so its offset can be looked up and referenced.
    pub fn label(mut self, label: &'static str) -> Self
    {
        self.label = Some(label);
        self
    }

    pub fn attr(mut self, name: DwAt, value: Value) -> Self
    {
        self.attrs.push((name, value));
        self
    }

    pub fn name(self, name: &str) -> Self
    {
        self.attr(gimli::DW_AT_name, Value::Str(name.to_string()))
    }

    pub fn type_ref(self, label: &'static str) -> Self
    {
        self.attr(gimli::DW_AT_type, Value::Ref(label))
    }

    pub fn code_range(self, low: u64, len: u64) -> Self
    {
        self.attr(gimli::DW_AT_low_pc, Value::Addr(low))
            .attr(gimli::DW_AT_high_pc, Value::Data8(len))
    }

    /// `DW_AT_location` holding `DW_OP_addr address`.
    pub fn static_location(self, address: u64) -> Self
    {
        let mut expr = vec![0x03];
        expr.extend_from_slice(&address.to_le_bytes());
        self.attr(gimli::DW_AT_location, Value::Expr(expr))
    }

    pub fn child(mut self, child: Entry) -> Self
    {
        self.children.push(child);
        self
    }

    /// Emit `code` instead of the DIE's own abbreviation code.
    pub fn with_code(mut self, code: u64) -> Self
    {
        self.code = Some(code);
        self
    }
}

/// A compile-unit root of the given language and name.
pub fn compile_unit(name: &str) -> Entry
{
    Entry::new(gimli::DW_TAG_compile_unit)
        .name(name)
        .attr(gimli::DW_AT_language, Value::Data2(gimli::DW_LANG_C_plus_plus.0))
        .attr(gimli::DW_AT_comp_dir, Value::Str("/src".to_string()))
}

pub fn base_type(label: &'static str, name: &str, size: u8) -> Entry
{
    Entry::new(gimli::DW_TAG_base_type)
        .label(label)
        .name(name)
        .attr(gimli::DW_AT_byte_size, Value::Data1(size))
        .attr(gimli::DW_AT_encoding, Value::Data1(gimli::DW_ATE_signed.0))
}

pub fn member(name: &str, type_label: &'static str, offset: u8) -> Entry
{
    Entry::new(gimli::DW_TAG_member)
        .name(name)
        .type_ref(type_label)
        .attr(gimli::DW_AT_data_member_location, Value::Data1(offset))
}

/// A compile unit to be written.
#[derive(Debug, Clone)]
pub struct UnitSpec
{
    version: u16,
    root: Entry,
}

impl UnitSpec
{
    pub fn v4(root: Entry) -> Self
    {
        Self { version: 4, root }
    }

    /// A DWARF 4 shaped unit header carrying an arbitrary version number.
    pub fn with_version(version: u16, root: Entry) -> Self
    {
        Self { version, root }
    }
}

/// Written sections plus where every labelled DIE ended up.
#[derive(Debug, Clone, Default)]
pub struct Image
{
    pub info: Vec<u8>,
    pub abbrev: Vec<u8>,
    pub labels: HashMap<&'static str, u32>,
    pub unit_offsets: Vec<u32>,
}

impl Image
{
    /// Section offset of the DIE labelled `label`.
    pub fn offset(&self, label: &str) -> u32
    {
        *self
            .labels
            .get(label)
            .unwrap_or_else(|| panic!("no DIE labelled {label}"))
    }

    /// Sections of an ordinary object file.
    pub fn sections(&self) -> MemorySections
    {
        MemorySections::new(RunTimeEndian::Little)
            .with_section(".debug_info", self.info.clone())
            .with_section(".debug_abbrev", self.abbrev.clone())
    }

    /// Sections of a `.dwo` companion file.
    pub fn dwo_sections(&self) -> MemorySections
    {
        MemorySections::new(RunTimeEndian::Little)
            .with_section(".debug_info.dwo", self.info.clone())
            .with_section(".debug_abbrev.dwo", self.abbrev.clone())
    }
}

enum Patch
{
    Unit
    {
        at: usize,
        unit_start: usize,
        label: &'static str,
    },
    Section
    {
        at: usize, label: &'static str
    },
}

/// Write `units` back to back into one `.debug_info` / `.debug_abbrev` pair.
pub fn build(units: &[UnitSpec]) -> Image
{
    let mut image = Image::default();
    let mut patches = Vec::new();
    for spec in units {
        let unit_start = image.info.len();
        image.unit_offsets.push(unit_start as u32);
        let abbrev_offset = image.abbrev.len() as u32;

        let mut next_code = 1;
        write_abbrevs(&spec.root, &mut image.abbrev, &mut next_code);
        image.abbrev.push(0);

        image.info.extend_from_slice(&0u32.to_le_bytes());
        image.info.extend_from_slice(&spec.version.to_le_bytes());
        image.info.extend_from_slice(&abbrev_offset.to_le_bytes());
        image.info.push(ADDRESS_SIZE);

        let mut next_code = 1;
        write_entry(&spec.root, unit_start, &mut image, &mut patches, &mut next_code);

        let length = (image.info.len() - unit_start - 4) as u32;
        image.info[unit_start..unit_start + 4].copy_from_slice(&length.to_le_bytes());
    }
    for patch in patches {
        let (at, value) = match patch {
            Patch::Unit { at, unit_start, label } => (at, image.offset(label) - unit_start as u32),
            Patch::Section { at, label } => (at, image.offset(label)),
        };
        image.info[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    image
}

fn write_abbrevs(entry: &Entry, out: &mut Vec<u8>, next_code: &mut u64)
{
    uleb(out, *next_code);
    *next_code += 1;
    uleb(out, u64::from(entry.tag.0));
    out.push(u8::from(!entry.children.is_empty()));
    for (name, value) in &entry.attrs {
        uleb(out, u64::from(name.0));
        uleb(out, u64::from(value.form()));
    }
    out.extend_from_slice(&[0, 0]);
    for child in &entry.children {
        write_abbrevs(child, out, next_code);
    }
}

fn write_entry(entry: &Entry, unit_start: usize, image: &mut Image, patches: &mut Vec<Patch>, next_code: &mut u64)
{
    if let Some(label) = entry.label {
        image.labels.insert(label, image.info.len() as u32);
    }
    let code = entry.code.unwrap_or(*next_code);
    *next_code += 1;
    let out = &mut image.info;
    uleb(out, code);
    for (_, value) in &entry.attrs {
        match value {
            Value::Str(text) => {
                out.extend_from_slice(text.as_bytes());
                out.push(0);
            }
            Value::Data1(v) => out.push(*v),
            Value::Data2(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Data4(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Data8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Udata(v) => uleb(out, *v),
            Value::Sdata(v) => sleb(out, *v),
            Value::Addr(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Flag => {}
            Value::Ref(label) => {
                patches.push(Patch::Unit {
                    at: out.len(),
                    unit_start,
                    label,
                });
                out.extend_from_slice(&[0; 4]);
            }
            Value::RefAddr(label) => {
                patches.push(Patch::Section { at: out.len(), label });
                out.extend_from_slice(&[0; 4]);
            }
            Value::Expr(bytes) => {
                uleb(out, bytes.len() as u64);
                out.extend_from_slice(bytes);
            }
            Value::SecOffset(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    if !entry.children.is_empty() {
        for child in &entry.children {
            write_entry(child, unit_start, image, patches, next_code);
        }
        image.info.push(0);
    }
}

pub fn uleb(out: &mut Vec<u8>, mut value: u64)
{
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(out: &mut Vec<u8>, mut value: i64)
{
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// A single-sequence DWARF 4 line program.
#[derive(Debug, Clone)]
pub struct LineProgram
{
    /// File names, relative to the unit's comp dir; file `n` is `files[n - 1]`
    pub files: Vec<&'static str>,
    /// `(address, file, line)` in address order
    pub rows: Vec<(u64, u64, u32)>,
    /// End address of the sequence
    pub end: u64,
}

impl LineProgram
{
    pub fn encode(&self) -> Vec<u8>
    {
        let mut header = vec![
            1,   // minimum_instruction_length
            1,   // maximum_operations_per_instruction
            1,   // default_is_stmt
            0xfb, // line_base = -5
            14,  // line_range
            13,  // opcode_base
        ];
        header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        header.push(0); // no include directories
        for file in &self.files {
            header.extend_from_slice(file.as_bytes());
            header.extend_from_slice(&[0, 0, 0, 0]);
        }
        header.push(0);

        let mut program = Vec::new();
        let mut address = self.rows.first().map_or(self.end, |row| row.0);
        program.extend_from_slice(&[0, 9, 2]);
        program.extend_from_slice(&address.to_le_bytes());
        let mut file = 1;
        let mut line: i64 = 1;
        for &(row_address, row_file, row_line) in &self.rows {
            if row_file != file {
                program.push(4);
                uleb(&mut program, row_file);
                file = row_file;
            }
            if i64::from(row_line) != line {
                program.push(3);
                sleb(&mut program, i64::from(row_line) - line);
                line = i64::from(row_line);
            }
            if row_address != address {
                program.push(2);
                uleb(&mut program, row_address - address);
                address = row_address;
            }
            program.push(1);
        }
        if self.end != address {
            program.push(2);
            uleb(&mut program, self.end - address);
        }
        program.extend_from_slice(&[0, 1, 1]);

        let mut out = Vec::new();
        let unit_length = (2 + 4 + header.len() + program.len()) as u32;
        out.extend_from_slice(&unit_length.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&program);
        out
    }
}

/// A `.debug_pubnames` / `.debug_pubtypes` set for the unit at `unit_offset`.
pub fn pub_table(unit_offset: u32, unit_length: u32, names: &[(u32, &str)]) -> Vec<u8>
{
    let mut body = Vec::new();
    body.extend_from_slice(&2u16.to_le_bytes());
    body.extend_from_slice(&unit_offset.to_le_bytes());
    body.extend_from_slice(&unit_length.to_le_bytes());
    for (offset, name) in names {
        body.extend_from_slice(&offset.to_le_bytes());
        body.extend_from_slice(name.as_bytes());
        body.push(0);
    }
    body.extend_from_slice(&0u32.to_le_bytes());
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

/// Companion files served from memory, counting every open.
#[derive(Default)]
pub struct MemoryCompanions
{
    files: HashMap<String, Arc<MemorySections>>,
    pub opens: AtomicUsize,
}

impl MemoryCompanions
{
    pub fn with_file(mut self, dwo_name: &str, sections: MemorySections) -> Self
    {
        self.files.insert(dwo_name.to_string(), Arc::new(sections));
        self
    }

    pub fn open_count(&self) -> usize
    {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CompanionResolver for MemoryCompanions
{
    fn open_companion(&self, dwo_name: &str, _comp_dir: Option<&str>) -> Option<Arc<dyn SectionProvider>>
    {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let file = self.files.get(dwo_name)?;
        Some(Arc::clone(file) as Arc<dyn SectionProvider>)
    }

    fn open_package(&self) -> Option<Arc<dyn SectionProvider>>
    {
        None
    }
}

/// A symbol file over `sections` with default options.
pub fn open(sections: MemorySections) -> SymbolFile
{
    SymbolFile::builder(Arc::new(sections)).build()
}

/// A symbol file over `sections` with the given options.
pub fn open_with(sections: MemorySections, options: SymbolFileOptions) -> SymbolFile
{
    SymbolFile::builder(Arc::new(sections)).options(options).build()
}
