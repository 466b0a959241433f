//! Header matching for knowledge base sheets.
//!
//! Sheets come from hand-maintained spreadsheets, so each logical field
//! accepts several header spellings. Headers are compared after
//! [`normalize_header`], which makes the match case and punctuation
//! insensitive ("CWE-ID", "cwe id" and "CWE_ID" are the same header).

/// Logical fields of a knowledge base row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    IncidentType,
    Keywords,
    Code,
    Title,
    Description,
    ExampleReferences,
}

/// Accepted header spellings per field, in order of preference.
pub const HEADER_ALIASES: &[(Field, &[&str])] = &[
    (
        Field::IncidentType,
        &["Incident Type", "Incident Types", "Incident", "Signal Type", "Type"],
    ),
    (
        Field::Keywords,
        &["Keywords", "Keyword", "Match Keywords", "Matching Keywords"],
    ),
    (
        Field::Code,
        &["CWE Code", "CWE", "CWE-ID", "CWE ID", "Code", "Classification Code"],
    ),
    (Field::Title, &["CWE Title", "Title", "CWE Name", "Name"]),
    (
        Field::Description,
        &["Description", "Meaning", "CWE Meaning", "Details", "Summary"],
    ),
    (
        Field::ExampleReferences,
        &[
            "Example CVEs",
            "CVEs",
            "CVE Examples",
            "Example References",
            "References",
        ],
    ),
];

/// Lowercase and drop everything that is not an ASCII letter or digit.
pub fn normalize_header(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

pub fn aliases(field: Field) -> &'static [&'static str] {
    HEADER_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, a)| *a)
        .unwrap_or(&[])
}

/// Index of the column serving `field`. Aliases are tried in preference
/// order; for each alias the leftmost matching header wins.
pub fn find_column(headers: &[String], field: Field) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    aliases(field).iter().find_map(|alias| {
        let key = normalize_header(alias);
        normalized.iter().position(|h| !h.is_empty() && *h == key)
    })
}

/// Column positions of a sheet. Only `code` is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub incident_type: Option<usize>,
    pub keywords: Option<usize>,
    pub code: usize,
    pub title: Option<usize>,
    pub description: Option<usize>,
    pub example_references: Option<usize>,
}

impl ColumnMap {
    /// Map `headers` to fields. `None` when no code column exists.
    pub fn resolve(headers: &[String]) -> Option<Self> {
        Some(Self {
            code: find_column(headers, Field::Code)?,
            incident_type: find_column(headers, Field::IncidentType),
            keywords: find_column(headers, Field::Keywords),
            title: find_column(headers, Field::Title),
            description: find_column(headers, Field::Description),
            example_references: find_column(headers, Field::ExampleReferences),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(h: &[&str]) -> Vec<String> {
        h.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(normalize_header(" CWE-ID "), "cweid");
        assert_eq!(normalize_header("cwe_id"), "cweid");
        assert_eq!(normalize_header("Example CVEs"), "examplecves");
        assert_eq!(normalize_header("---"), "");
    }

    #[test]
    fn every_field_has_aliases() {
        for field in [
            Field::IncidentType,
            Field::Keywords,
            Field::Code,
            Field::Title,
            Field::Description,
            Field::ExampleReferences,
        ] {
            assert!(!aliases(field).is_empty(), "{field:?} has no aliases");
        }
    }

    #[test]
    fn aliases_do_not_collide_across_fields() {
        let mut seen = std::collections::HashMap::new();
        for (field, names) in HEADER_ALIASES {
            for name in *names {
                let owner = seen.entry(normalize_header(name)).or_insert(*field);
                assert_eq!(*owner, *field, "alias {name} claimed by two fields");
            }
        }
    }

    #[test]
    fn resolves_loose_spellings() {
        let h = headers(&["incident_types", "cwe id", "CWE NAME", "meaning", "cve-examples", "keyword"]);
        let map = ColumnMap::resolve(&h).unwrap();
        assert_eq!(map.incident_type, Some(0));
        assert_eq!(map.code, 1);
        assert_eq!(map.title, Some(2));
        assert_eq!(map.description, Some(3));
        assert_eq!(map.example_references, Some(4));
        assert_eq!(map.keywords, Some(5));
    }

    #[test]
    fn preferred_alias_wins_over_column_order() {
        // "Title" is listed before "Name" for the title field.
        let h = headers(&["Name", "Title", "Code"]);
        assert_eq!(find_column(&h, Field::Title), Some(1));
    }

    #[test]
    fn missing_code_column() {
        let h = headers(&["Incident Type", "Title"]);
        assert!(ColumnMap::resolve(&h).is_none());
    }
}
