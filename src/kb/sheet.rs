//! Reading tabular knowledge base files into rows of strings.

use std::path::Path;

use calamine::{open_workbook_auto, Reader};

use super::columns::normalize_header;
use super::KbError;

/// Sheet names preferred over the first sheet of a workbook.
const PREFERRED_SHEETS: &[&str] = &["cwemapping", "cwe", "vulnerabilitymapping", "kb"];

/// One sheet of cells. The first row holds the headers. Rows whose cells are
/// all blank are already removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
            .collect();
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn records(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }
}

/// Read `path`, choosing the parser from its extension: `csv` and `tsv` are
/// delimited text, anything else is opened as a workbook.
pub fn read(path: &Path) -> Result<Sheet, KbError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_delimited(path, b','),
        "tsv" => read_delimited(path, b'\t'),
        _ => read_workbook(path),
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Sheet, KbError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    if let Some(first) = rows.first_mut().and_then(|r| r.first_mut()) {
        *first = first.trim_start_matches('\u{feff}').to_string();
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Sheet::new(name, rows))
}

fn read_workbook(path: &Path) -> Result<Sheet, KbError> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_vec();
    let name = pick_sheet(&names).ok_or(KbError::EmptySheet)?;

    let range = workbook.worksheet_range(&name)?;
    let rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    Ok(Sheet::new(name, rows))
}

/// A sheet named like a mapping sheet, else the first one.
pub fn pick_sheet(names: &[String]) -> Option<String> {
    names
        .iter()
        .find(|n| PREFERRED_SHEETS.contains(&normalize_header(n).as_str()))
        .or_else(|| names.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn prefers_mapping_sheet() {
        let names = vec!["Readme".to_string(), "CWE_Mapping".to_string()];
        assert_eq!(pick_sheet(&names).as_deref(), Some("CWE_Mapping"));
        let names = vec!["Sheet1".to_string(), "Other".to_string()];
        assert_eq!(pick_sheet(&names).as_deref(), Some("Sheet1"));
        assert_eq!(pick_sheet(&[]), None);
    }

    #[test]
    fn blank_rows_are_dropped() {
        let sheet = Sheet::new(
            "s",
            vec![
                vec!["Code".into()],
                vec!["".into(), " ".into()],
                vec!["CWE-1".into()],
            ],
        );
        assert_eq!(sheet.headers(), &["Code".to_string()]);
        assert_eq!(sheet.records().len(), 1);
    }

    #[test]
    fn reads_csv_with_bom_and_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "\u{feff}Incident Type,CWE Code,Title\n\"A; B\",X-1,Thing\nC,X-2\n").unwrap();

        let sheet = read(&path).unwrap();
        assert_eq!(sheet.name, "kb");
        assert_eq!(sheet.headers()[0], "Incident Type");
        assert_eq!(sheet.records()[0][0], "A; B");
        assert_eq!(sheet.records()[1].len(), 2);
    }

    #[test]
    fn reads_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.TSV");
        std::fs::write(&path, "Code\tTitle\nCWE-400\tUncontrolled\n").unwrap();
        let sheet = read(&path).unwrap();
        assert_eq!(sheet.records()[0], vec!["CWE-400".to_string(), "Uncontrolled".to_string()]);
    }

    #[test]
    fn workbook_reads_mapping_sheet_and_numeric_cells() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cwe_mapping.xlsx");
        let sheet = read(&path).unwrap();

        assert_eq!(sheet.name, "CWE_Mapping");
        assert_eq!(sheet.headers()[1], "CWE-ID");
        // The empty third row is gone.
        assert_eq!(sheet.records().len(), 3);
        assert_eq!(sheet.records()[1][0], "CPU Spike");
        assert_eq!(sheet.records()[1][1], "400");
    }

    #[test]
    fn corrupt_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(read(&path).is_err());
    }
}
