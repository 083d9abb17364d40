//! Line tables and support files.
//!
//! A [`LineTable`] is the fully executed line program of one unit: rows sorted
//! by address (sequence by sequence) plus the file table with every path made
//! absolute against the include directories and the unit's `DW_AT_comp_dir`.

use gimli::{AttributeValue, ColumnType, FileEntry, IncompleteLineProgram, LineProgramHeader, Reader, Unit};
use tracing::debug;

use super::{OwnedDwarf, OwnedReader};
use crate::error::{map_dwarf_error, Result};
use crate::types::{Address, LineEntry};

/// One row of the line-number matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRow
{
    /// Address of the first instruction of the row
    pub address: u64,
    /// File index into the table's file list
    pub file: u64,
    /// Line number, 0 for code with no source line
    pub line: u32,
    /// Column number, 0 for "left edge"
    pub column: u32,
    /// Recommended breakpoint location
    pub is_stmt: bool,
    /// First address past the end of a sequence; not a real row
    pub end_sequence: bool,
}

/// Executed line program of one unit.
#[derive(Debug, Clone, Default)]
pub struct LineTable
{
    files: Vec<Option<String>>,
    rows: Vec<LineRow>,
}

impl LineTable
{
    /// Execute `program` and resolve its file table.
    ///
    /// ## Errors
    ///
    /// Returns an error if the line program is malformed.
    pub(crate) fn build(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>, program: IncompleteLineProgram<OwnedReader>) -> Result<Self>
    {
        let comp_dir = unit
            .comp_dir
            .as_ref()
            .and_then(|dir| dir.to_string_lossy().ok().map(|dir| dir.into_owned()));

        let header = program.header();
        let count = header.file_names().len() as u64;
        // DWARF 5 file tables are 0-based, earlier versions 1-based
        let first = u64::from(header.version() < 5);
        let mut files = vec![None; usize::try_from(count + first).unwrap_or(0)];
        for index in first..count + first {
            if let Some(entry) = header.file(index) {
                let path = file_path(dwarf, unit, header, entry, comp_dir.as_deref());
                if let Some(slot) = usize::try_from(index).ok().and_then(|index| files.get_mut(index)) {
                    *slot = path;
                }
            }
        }

        let mut sequences: Vec<Vec<LineRow>> = Vec::new();
        let mut current = Vec::new();
        let mut rows = program.rows();
        while let Some((_, row)) = rows.next_row().map_err(|err| map_dwarf_error("executing line program", err))? {
            let line = row.line().map_or(0, |line| u32::try_from(line.get()).unwrap_or(u32::MAX));
            let column = match row.column() {
                ColumnType::LeftEdge => 0,
                ColumnType::Column(column) => u32::try_from(column.get()).unwrap_or(u32::MAX),
            };
            current.push(LineRow {
                address: row.address(),
                file: row.file_index(),
                line,
                column,
                is_stmt: row.is_stmt(),
                end_sequence: row.end_sequence(),
            });
            if row.end_sequence() {
                sequences.push(std::mem::take(&mut current));
            }
        }
        sequences.sort_by_key(|sequence| sequence.first().map_or(0, |row| row.address));
        let rows: Vec<LineRow> = sequences.into_iter().flatten().collect();
        debug!(rows = rows.len(), files = files.len(), "executed line program");

        Ok(Self { files, rows })
    }

    /// Every row, sorted by sequence start address.
    #[must_use]
    pub fn rows(&self) -> &[LineRow]
    {
        &self.rows
    }

    /// Resolved path of file `index`.
    #[must_use]
    pub fn file(&self, index: u64) -> Option<&str>
    {
        self.files.get(usize::try_from(index).ok()?)?.as_deref()
    }

    /// Support files in file-table order.
    #[must_use]
    pub fn support_files(&self) -> Vec<&str>
    {
        self.files.iter().filter_map(Option::as_deref).collect()
    }

    /// Indices of files matching `query` (see [`path_matches`]).
    #[must_use]
    pub fn matching_files(&self, query: &str) -> Vec<u64>
    {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, path)| path.as_deref().is_some_and(|path| path_matches(path, query)))
            .map(|(index, _)| index as u64)
            .collect()
    }

    /// Row covering `address`, if any.
    #[must_use]
    pub fn find_row(&self, address: Address) -> Option<&LineRow>
    {
        let index = self.rows.partition_point(|row| row.address <= address.value());
        let row = self.rows.get(index.checked_sub(1)?)?;
        if row.end_sequence {
            return None;
        }
        Some(row)
    }

    /// Convert a row to a consumer-facing entry.
    #[must_use]
    pub fn entry(&self, row: &LineRow) -> LineEntry
    {
        LineEntry {
            address: Address::new(row.address),
            file: self.file(row.file).unwrap_or_default().to_string(),
            line: row.line,
            column: row.column,
            is_stmt: row.is_stmt,
        }
    }
}

fn file_path(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    header: &LineProgramHeader<OwnedReader>,
    entry: &FileEntry<OwnedReader>,
    comp_dir: Option<&str>,
) -> Option<String>
{
    let name = attr_text(dwarf, unit, entry.path_name())?;
    if is_absolute(&name) {
        return Some(name);
    }
    let directory = entry
        .directory(header)
        .and_then(|directory| attr_text(dwarf, unit, directory));
    let base = match directory {
        Some(directory) if is_absolute(&directory) => directory,
        Some(directory) => join_path(comp_dir.unwrap_or_default(), &directory),
        None => comp_dir.unwrap_or_default().to_string(),
    };
    Some(join_path(&base, &name))
}

fn attr_text(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Option<String>
{
    let reader = dwarf.attr_string(unit, value).ok()?;
    reader.to_string_lossy().ok().map(|text| text.into_owned())
}

fn is_absolute(path: &str) -> bool
{
    path.starts_with('/') || path.starts_with('\\') || path.as_bytes().get(1) == Some(&b':')
}

fn join_path(base: &str, relative: &str) -> String
{
    if base.is_empty() || relative.is_empty() {
        return format!("{base}{relative}");
    }
    format!("{}/{relative}", base.trim_end_matches(['/', '\\']))
}

/// Whether `path` names the file `query`.
///
/// A query with a directory part must match a trailing run of whole path
/// components; a bare file name only has to match the last component.
#[must_use]
pub fn path_matches(path: &str, query: &str) -> bool
{
    if path == query {
        return true;
    }
    let query = query.trim_start_matches("./");
    path.strip_suffix(query)
        .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('/') || prefix.ends_with('\\'))
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn row(address: u64, line: u32, end_sequence: bool) -> LineRow
    {
        LineRow {
            address,
            file: 1,
            line,
            column: 0,
            is_stmt: true,
            end_sequence,
        }
    }

    #[test]
    fn test_find_row_respects_sequence_ends()
    {
        let table = LineTable {
            files: vec![None, Some("/src/main.c".to_string())],
            rows: vec![row(0x1000, 3, false), row(0x1008, 4, false), row(0x1010, 0, true), row(0x2000, 9, false), row(0x2004, 0, true)],
        };
        assert_eq!(table.find_row(Address::new(0x1004)).map(|row| row.line), Some(3));
        assert_eq!(table.find_row(Address::new(0x1008)).map(|row| row.line), Some(4));
        assert!(table.find_row(Address::new(0x1800)).is_none());
        assert!(table.find_row(Address::new(0x0fff)).is_none());
        assert_eq!(table.entry(&table.rows[3]).file, "/src/main.c");
    }

    #[test]
    fn test_path_matching()
    {
        assert!(path_matches("/src/lib/main.c", "main.c"));
        assert!(path_matches("/src/lib/main.c", "lib/main.c"));
        assert!(!path_matches("/src/lib/domain.c", "main.c"));
        assert!(!path_matches("/src/lib/main.c", "ib/main.c"));
        assert_eq!(join_path("/work/", "src"), "/work/src");
        assert_eq!(join_path("", "a.c"), "a.c");
    }
}
