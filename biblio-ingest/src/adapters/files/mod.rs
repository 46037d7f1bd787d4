//! Bibliography file adapters
//!
//! Line-oriented formats (BibTeX, RIS, EndNote) accumulate tag/value pairs
//! into a [`RecordDraft`] until their record terminator, then flush it. CSV
//! rows map onto the same draft through header aliases. Drafts become
//! import records in one place so every format shares the skip rules,
//! positional affiliation assignment and identifier derivation.

pub mod bibtex;
pub mod csv;
pub mod endnote;
pub mod ris;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{assign_affiliations_positionally, multilingual, split_page_range};
use crate::models::{
    normalize_doi, Contribution, ContributionRole, EventStub, ImportRecord, InstitutionStub,
    PersonStub, PublicationType, RecordSource,
};

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Bibtex,
    Ris,
    Endnote,
    Csv,
}

impl FileFormat {
    pub fn record_source(&self) -> RecordSource {
        match self {
            FileFormat::Bibtex => RecordSource::Bibtex,
            FileFormat::Ris => RecordSource::Ris,
            FileFormat::Endnote => RecordSource::Endnote,
            FileFormat::Csv => RecordSource::Csv,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_source().as_str())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bibtex" | "bib" => Ok(FileFormat::Bibtex),
            "ris" => Ok(FileFormat::Ris),
            "endnote" | "enw" => Ok(FileFormat::Endnote),
            "csv" | "tsv" => Ok(FileFormat::Csv),
            other => Err(format!("Unsupported file format: {}", other)),
        }
    }
}

/// Parse every record of an uploaded file
///
/// Unusable entries are skipped and logged; the result may be empty.
pub fn parse_file(format: FileFormat, content: &str) -> Vec<ImportRecord> {
    let content = content.trim_start_matches('\u{feff}');
    let drafts = match format {
        FileFormat::Bibtex => bibtex::parse(content),
        FileFormat::Ris => ris::parse(content),
        FileFormat::Endnote => endnote::parse(content),
        FileFormat::Csv => csv::parse(content),
    };
    let source = format.record_source();
    drafts
        .into_iter()
        .filter_map(|draft| draft.finish(source))
        .collect()
}

/// Fields collected for one record before conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    pub type_label: Option<String>,
    pub titles: Vec<String>,
    pub subtitle: Option<String>,
    pub abstracts: Vec<String>,
    pub keywords: Vec<String>,
    pub authors: Vec<String>,
    pub editors: Vec<String>,
    pub affiliations: Vec<String>,
    pub venue: Option<String>,
    pub conference: Option<String>,
    pub conference_place: Option<String>,
    pub date: Option<String>,
    pub year: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub start_page: Option<String>,
    pub end_page: Option<String>,
    pub number_of_pages: Option<u32>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub issn: Option<String>,
    pub urls: Vec<String>,
}

impl RecordDraft {
    pub fn is_empty(&self) -> bool {
        *self == RecordDraft::default()
    }

    /// Set an optional scalar only once; later duplicates are ignored
    pub fn set(slot: &mut Option<String>, value: &str) {
        let value = value.trim();
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }

    pub fn push(list: &mut Vec<String>, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            list.push(value.to_string());
        }
    }

    /// "12-19" or a lone start page
    pub fn set_pages(&mut self, value: &str) {
        let (start, end) = split_page_range(value);
        if self.start_page.is_none() {
            self.start_page = start;
        }
        if self.end_page.is_none() {
            self.end_page = end;
        }
    }

    /// ISSN when it has eight significant characters, ISBN otherwise
    pub fn set_standard_number(&mut self, value: &str) {
        let significant = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .count();
        if significant == 8 {
            RecordDraft::set(&mut self.issn, value);
        } else {
            RecordDraft::set(&mut self.isbn, value);
        }
    }

    /// First four-digit run of "2020///" style year fields
    pub fn set_year(&mut self, value: &str) {
        if let Some(year) = biblio_common::time::extract_year(value) {
            RecordDraft::set(&mut self.year, &year.to_string());
        }
    }

    /// Convert into an import record, or `None` when there is no title
    pub fn finish(self, source: RecordSource) -> Option<ImportRecord> {
        if !self.titles.iter().any(|t| !t.trim().is_empty()) {
            if !self.is_empty() {
                debug!(source = %source, "Skipping file entry without title");
            }
            return None;
        }

        let publication_type = self
            .type_label
            .as_deref()
            .map(PublicationType::from_label)
            .unwrap_or(PublicationType::Other);

        let mut record = ImportRecord::new(String::new(), source, publication_type);
        record.title = multilingual("EN", self.titles.iter().map(String::as_str));
        record.subtitle = multilingual("EN", self.subtitle.as_deref());
        record.description = multilingual("EN", self.abstracts.iter().map(String::as_str));
        record.keywords = multilingual("EN", self.keywords.iter().map(String::as_str));
        record.published_in = multilingual("EN", self.venue.as_deref());
        record.document_date = self.date.or(self.year);
        record.volume = self.volume;
        record.issue = self.issue;
        record.start_page = self.start_page;
        record.end_page = self.end_page;
        record.number_of_pages = self.number_of_pages;
        record.publisher = self.publisher;
        record.language = self.language;
        record.doi = self.doi.as_deref().and_then(normalize_doi);
        record.isbn = self.isbn;
        record.print_issn = self.issn;
        record.uris = self.urls.into_iter().collect();

        let mut contributions: Vec<Contribution> = self
            .authors
            .iter()
            .enumerate()
            .map(|(i, name)| Contribution::author(PersonStub::named(name), i as u32 + 1))
            .collect();
        assign_affiliations_positionally(
            &mut contributions,
            self.affiliations
                .iter()
                .map(|a| InstitutionStub::named(a))
                .collect(),
        );
        let offset = contributions.len() as u32;
        contributions.extend(self.editors.iter().enumerate().map(|(i, name)| {
            let mut editor = Contribution::author(PersonStub::named(name), offset + i as u32 + 1);
            editor.role = ContributionRole::Editor;
            editor
        }));
        record.contributions = contributions;

        if publication_type == PublicationType::ProceedingsPublication {
            let event_name = self.conference.as_deref().or(record.published_in.first().map(|v| v.content.as_str()));
            record.event = event_name.map(|name| EventStub {
                name: multilingual("EN", [name]),
                place: self.conference_place.clone(),
                ..Default::default()
            });
        }

        record.identifier = file_record_identifier(&record);
        Some(record)
    }
}

/// `<FORMAT>:<doi>` or `<FORMAT>:<sha256 of the metadata key>`
///
/// Uploading the same file twice therefore yields the same identifiers.
pub fn file_record_identifier(record: &ImportRecord) -> String {
    if let Some(doi) = &record.doi {
        return format!("{}:{}", record.source, doi);
    }
    let key = record.metadata_key().unwrap_or_else(|| {
        let title = record.primary_title().unwrap_or_default();
        crate::models::normalize_text(title)
    });
    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    format!("{}:{}", record.source, &digest[..32])
}

/// Split a delimited author/keyword cell ("A; B" or "A and B")
pub(crate) fn split_list(value: &str, separators: &[&str]) -> Vec<String> {
    let mut parts = vec![value.to_string()];
    for separator in separators {
        parts = parts
            .iter()
            .flat_map(|p| p.split(separator).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RecordDraft {
        RecordDraft {
            type_label: Some("JOUR".to_string()),
            titles: vec!["Tagged formats revisited".to_string()],
            authors: vec!["Doe, Jane".to_string(), "Roe, Richard".to_string()],
            affiliations: vec!["Uni A".to_string(), "Uni B".to_string()],
            venue: Some("Journal of Formats".to_string()),
            year: Some("2020".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_finish_assigns_affiliations_positionally() {
        let record = draft().finish(RecordSource::Ris).unwrap();
        assert_eq!(record.contributions[0].institutions[0].display_name(), Some("Uni A"));
        assert_eq!(record.contributions[1].institutions[0].display_name(), Some("Uni B"));
        assert_eq!(record.publication_type, PublicationType::JournalPublication);
    }

    #[test]
    fn test_mismatched_affiliations_left_unset() {
        let mut mismatched = draft();
        mismatched.affiliations.pop();
        let record = mismatched.finish(RecordSource::Ris).unwrap();
        assert!(record.contributions.iter().all(|c| c.institutions.is_empty()));
    }

    #[test]
    fn test_identifier_prefers_doi_then_stable_hash() {
        let mut with_doi = draft();
        with_doi.doi = Some("https://doi.org/10.1/XYZ".to_string());
        assert_eq!(with_doi.finish(RecordSource::Bibtex).unwrap().identifier, "BIBTEX:10.1/xyz");

        let first = draft().finish(RecordSource::Csv).unwrap();
        let second = draft().finish(RecordSource::Csv).unwrap();
        assert!(first.identifier.starts_with("CSV:"));
        assert_eq!(first.identifier, second.identifier);
    }

    #[test]
    fn test_untitled_draft_skipped() {
        let mut untitled = draft();
        untitled.titles.clear();
        assert!(untitled.finish(RecordSource::Endnote).is_none());
    }

    #[test]
    fn test_format_names() {
        assert_eq!("BIB".parse::<FileFormat>().unwrap(), FileFormat::Bibtex);
        assert_eq!("tsv".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert!("docx".parse::<FileFormat>().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("A; B and C", &[";", " and "]), vec!["A", "B", "C"]);
    }
}
