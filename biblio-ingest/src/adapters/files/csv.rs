//! Column-mapped CSV/TSV reader
//!
//! The source header is matched against a fixed set of target columns, each
//! with an alias list (`Issue|Number`, `Source title|Journal|Venue`, ...).
//! Header cells are normalized before matching: BOM stripped, lower-cased,
//! inner whitespace collapsed. The delimiter (comma, semicolon or tab) is
//! detected from the header line.

use std::collections::HashMap;
use tracing::{debug, warn};

use super::{split_list, RecordDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsvColumn {
    Type,
    Title,
    Subtitle,
    Authors,
    Affiliations,
    Editors,
    Year,
    Date,
    SourceTitle,
    Volume,
    Number,
    StartPage,
    EndPage,
    Pages,
    PageCount,
    Publisher,
    Doi,
    Isbn,
    Issn,
    Link,
    Abstract,
    Keywords,
    Language,
    Conference,
    ConferenceLocation,
}

/// Target column and its accepted (normalized) header spellings
const COLUMN_ALIASES: &[(CsvColumn, &[&str])] = &[
    (CsvColumn::Type, &["type", "document type", "publication type", "item type"]),
    (CsvColumn::Title, &["title", "article title", "document title"]),
    (CsvColumn::Subtitle, &["subtitle"]),
    (CsvColumn::Authors, &["authors", "author", "author full names", "author(s)"]),
    (CsvColumn::Affiliations, &["affiliations", "affiliation", "addresses"]),
    (CsvColumn::Editors, &["editors", "editor"]),
    (CsvColumn::Year, &["year", "publication year", "pub year"]),
    (CsvColumn::Date, &["date", "publication date"]),
    (
        CsvColumn::SourceTitle,
        &["source title", "journal", "source", "venue", "publication title", "journal title"],
    ),
    (CsvColumn::Volume, &["volume"]),
    (CsvColumn::Number, &["issue", "number"]),
    (CsvColumn::StartPage, &["page start", "start page", "first page", "beginning page"]),
    (CsvColumn::EndPage, &["page end", "end page", "last page", "ending page"]),
    (CsvColumn::Pages, &["pages", "page range"]),
    (CsvColumn::PageCount, &["page count", "number of pages", "num pages"]),
    (CsvColumn::Publisher, &["publisher"]),
    (CsvColumn::Doi, &["doi", "digital object identifier"]),
    (CsvColumn::Isbn, &["isbn"]),
    (CsvColumn::Issn, &["issn", "eissn"]),
    (CsvColumn::Link, &["link", "url"]),
    (CsvColumn::Abstract, &["abstract"]),
    (CsvColumn::Keywords, &["keywords", "author keywords", "index keywords"]),
    (CsvColumn::Language, &["language", "language of original document"]),
    (CsvColumn::Conference, &["conference", "conference name", "conference title"]),
    (CsvColumn::ConferenceLocation, &["conference location", "conference place"]),
];

/// Normalize one header cell for alias matching
pub fn normalize_header(cell: &str) -> String {
    cell.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Target column for a raw header cell
pub fn column_for(cell: &str) -> Option<CsvColumn> {
    let normalized = normalize_header(cell);
    COLUMN_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&normalized.as_str()))
        .map(|(column, _)| *column)
}

fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    [b'\t', b';', b',']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.bytes().any(|b| b == *d))
        .unwrap_or(b',')
}

pub fn parse(content: &str) -> Vec<RecordDraft> {
    let delimiter = detect_delimiter(content);
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let columns: HashMap<usize, CsvColumn> = match reader.headers() {
        Ok(headers) => headers
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| column_for(cell).map(|c| (i, c)))
            .collect(),
        Err(e) => {
            warn!(error = %e, "Unreadable CSV header");
            return Vec::new();
        }
    };
    if !columns.values().any(|c| *c == CsvColumn::Title) {
        warn!("CSV upload has no title column");
        return Vec::new();
    }

    let mut drafts = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row = row + 1, error = %e, "Skipping unreadable CSV row");
                continue;
            }
        };
        let mut draft = RecordDraft::default();
        for (i, cell) in record.iter().enumerate() {
            if let Some(column) = columns.get(&i) {
                apply_cell(&mut draft, *column, cell.trim());
            }
        }
        if draft.is_empty() {
            debug!(row = row + 1, "Skipping empty CSV row");
            continue;
        }
        drafts.push(draft);
    }
    drafts
}

fn apply_cell(draft: &mut RecordDraft, column: CsvColumn, value: &str) {
    if value.is_empty() {
        return;
    }
    match column {
        CsvColumn::Type => RecordDraft::set(&mut draft.type_label, value),
        CsvColumn::Title => RecordDraft::push(&mut draft.titles, value),
        CsvColumn::Subtitle => RecordDraft::set(&mut draft.subtitle, value),
        CsvColumn::Authors => draft.authors.extend(split_list(value, &[";", " and "])),
        CsvColumn::Affiliations => draft.affiliations.extend(split_list(value, &[";"])),
        CsvColumn::Editors => draft.editors.extend(split_list(value, &[";", " and "])),
        CsvColumn::Year => draft.set_year(value),
        CsvColumn::Date => RecordDraft::set(&mut draft.date, value),
        CsvColumn::SourceTitle => RecordDraft::set(&mut draft.venue, value),
        CsvColumn::Volume => RecordDraft::set(&mut draft.volume, value),
        CsvColumn::Number => RecordDraft::set(&mut draft.issue, value),
        CsvColumn::StartPage => RecordDraft::set(&mut draft.start_page, value),
        CsvColumn::EndPage => RecordDraft::set(&mut draft.end_page, value),
        CsvColumn::Pages => draft.set_pages(value),
        CsvColumn::PageCount => draft.number_of_pages = value.parse().ok(),
        CsvColumn::Publisher => RecordDraft::set(&mut draft.publisher, value),
        CsvColumn::Doi => RecordDraft::set(&mut draft.doi, value),
        CsvColumn::Isbn => draft.isbn = split_list(value, &[";"]).into_iter().next(),
        CsvColumn::Issn => RecordDraft::set(&mut draft.issn, value),
        CsvColumn::Link => RecordDraft::push(&mut draft.urls, value),
        CsvColumn::Abstract => RecordDraft::push(&mut draft.abstracts, value),
        CsvColumn::Keywords => draft.keywords.extend(split_list(value, &[";"])),
        CsvColumn::Language => RecordDraft::set(&mut draft.language, value),
        CsvColumn::Conference => RecordDraft::set(&mut draft.conference, value),
        CsvColumn::ConferenceLocation => RecordDraft::set(&mut draft.conference_place, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::files::{parse_file, FileFormat};

    #[test]
    fn test_header_normalization() {
        assert_eq!(column_for("\u{feff}Title"), Some(CsvColumn::Title));
        assert_eq!(column_for("  SOURCE   Title "), Some(CsvColumn::SourceTitle));
        assert_eq!(column_for("Issue"), Some(CsvColumn::Number));
        assert_eq!(column_for("Number"), Some(CsvColumn::Number));
        assert_eq!(column_for("Cited by"), None);
    }

    #[test]
    fn test_semicolon_and_tab_detection() {
        assert_eq!(detect_delimiter("Title;Year;Issue\nA;2020;1"), b';');
        assert_eq!(detect_delimiter("Title\tYear\nA\t2020"), b'\t');
        assert_eq!(detect_delimiter("Title\nA"), b',');
    }

    #[test]
    fn test_issue_alias_maps_to_number_column() {
        let content = "\u{feff}Title,Authors,Year,Source title,Volume,Issue,Page start,Page end,DOI\n\
            \"Aliased headers, handled\",Doe J.; Roe R.,2022,Journal of CSV,3,7,11,19,10.1/CSV.7\n";
        let drafts = parse(content);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].issue.as_deref(), Some("7"));
        assert_eq!(drafts[0].titles, vec!["Aliased headers, handled"]);
        assert_eq!(drafts[0].authors, vec!["Doe J.", "Roe R."]);

        let records = parse_file(FileFormat::Csv, content);
        assert_eq!(records[0].issue.as_deref(), Some("7"));
        assert_eq!(records[0].identifier, "CSV:10.1/csv.7");
    }

    #[test]
    fn test_tsv_rows_without_title_skipped() {
        let content = "Title\tYear\tNumber\nFirst\t2020\t2\n\t2021\t3\n";
        let records = parse_file(FileFormat::Csv, content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].issue.as_deref(), Some("2"));
    }

    #[test]
    fn test_missing_title_column_yields_nothing() {
        assert!(parse("Name,Year\nA,2020\n").is_empty());
    }
}
