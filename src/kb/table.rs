//! Building a [`KnowledgeBaseTable`] from sheet rows.

use tracing::debug;

use super::columns::ColumnMap;
use super::sheet::Sheet;
use super::{Classification, KbError, KnowledgeBaseTable, Provenance};
use crate::detect::UNKNOWN_INCIDENT;

/// Split a multi-value cell on commas, semicolons, pipes and newlines.
pub fn split_list(cell: &str) -> Vec<String> {
    cell.split(|c| matches!(c, ',' | ';' | '|' | '\n' | '\r'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_blank_code(code: &str) -> bool {
    code.is_empty() || code.eq_ignore_ascii_case("nan")
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
}

fn or_na(s: &str) -> String {
    if s.is_empty() {
        "N/A".to_string()
    } else {
        s.to_string()
    }
}

/// Classification filed under [`UNKNOWN_INCIDENT`] when a sheet has none.
pub fn synthesized_unknown(source: &str) -> Classification {
    Classification {
        code: "CWE-1059".to_string(),
        title: "Insufficient Technical Impact Assessment".to_string(),
        description: "Unable to classify incident type with available evidence.".to_string(),
        example_references: Vec::new(),
        keywords: Vec::new(),
        provenance: Provenance::KnowledgeBase,
        source: Some(source.to_string()),
    }
}

/// Turn a sheet into a table.
///
/// Fails only when the sheet is empty or has no code column. Rows with a
/// blank code are skipped. A row listing several incident types is filed
/// under each of them; a row listing none is filed under the unknown key.
pub fn build_table(sheet: &Sheet, file_label: &str) -> Result<KnowledgeBaseTable, KbError> {
    if sheet.rows.is_empty() {
        return Err(KbError::EmptySheet);
    }
    let headers = sheet.headers();
    let columns = ColumnMap::resolve(headers).ok_or_else(|| KbError::MissingCodeColumn {
        sheet: sheet.name.clone(),
        columns: headers.to_vec(),
    })?;

    let source = format!("{}::{}", file_label, sheet.name);
    let mut table = KnowledgeBaseTable::new(source.clone());
    let mut skipped = 0usize;

    for row in sheet.records() {
        let code = cell(row, Some(columns.code));
        if is_blank_code(code) {
            skipped += 1;
            continue;
        }

        let classification = Classification {
            code: code.to_string(),
            title: or_na(cell(row, columns.title)),
            description: or_na(cell(row, columns.description)),
            example_references: split_list(cell(row, columns.example_references)),
            keywords: split_list(cell(row, columns.keywords)),
            provenance: Provenance::KnowledgeBase,
            source: Some(source.clone()),
        };

        let mut incident_types = split_list(cell(row, columns.incident_type));
        if incident_types.is_empty() {
            incident_types.push(UNKNOWN_INCIDENT.to_string());
        }
        for key in incident_types {
            table.insert(key, classification.clone());
        }
    }

    if !table.contains(UNKNOWN_INCIDENT) {
        table.insert(UNKNOWN_INCIDENT.to_string(), synthesized_unknown(&source));
    }

    debug!(%source, entries = table.len(), skipped, "knowledge base table built");
    Ok(table)
}
