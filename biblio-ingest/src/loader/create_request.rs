//! Type-specific create requests
//!
//! A record under review is shown as the create request the primary domain
//! would receive for its publication type, together with the ids of
//! referenced entities that already exist.

use serde::Serialize;
use std::collections::BTreeSet;

use super::JournalStub;
use crate::models::{
    ContributionRole, EventStub, ImportRecord, InstitutionStub, MultilingualContent, PersonStub,
    PublicationType,
};

/// Fields every document type shares
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFields {
    pub title: Vec<MultilingualContent>,
    pub subtitle: Vec<MultilingualContent>,
    pub description: Vec<MultilingualContent>,
    pub keywords: Vec<MultilingualContent>,
    pub document_date: Option<String>,
    pub language: Option<String>,
    pub doi: Option<String>,
    pub scopus_id: Option<String>,
    pub open_alex_id: Option<String>,
    pub web_of_science_id: Option<String>,
    pub uris: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateRequest {
    JournalPublication {
        #[serde(flatten)]
        document: DocumentFields,
        journal: JournalStub,
        journal_id: Option<i64>,
        volume: Option<String>,
        issue: Option<String>,
        start_page: Option<String>,
        end_page: Option<String>,
        number_of_pages: Option<u32>,
    },
    ProceedingsPublication {
        #[serde(flatten)]
        document: DocumentFields,
        proceedings_title: Vec<MultilingualContent>,
        event: Option<EventStub>,
        event_id: Option<i64>,
        isbn: Option<String>,
        publisher: Option<String>,
        start_page: Option<String>,
        end_page: Option<String>,
        number_of_pages: Option<u32>,
    },
    Monograph {
        #[serde(flatten)]
        document: DocumentFields,
        isbn: Option<String>,
        publisher: Option<String>,
        number_of_pages: Option<u32>,
    },
    /// Theses, datasets and anything without a dedicated shape
    Generic {
        #[serde(flatten)]
        document: DocumentFields,
        publication_type: PublicationType,
        published_in: Vec<MultilingualContent>,
        publisher: Option<String>,
        isbn: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionPreview {
    pub stub: InstitutionStub,
    pub institution_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionPreview {
    pub order_number: u32,
    pub role: ContributionRole,
    pub is_corresponding: bool,
    pub person: PersonStub,
    pub person_id: Option<i64>,
    pub institutions: Vec<InstitutionPreview>,
}

/// What `next` hands the reviewer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadPreview {
    pub identifier: String,
    pub request: CreateRequest,
    pub contributions: Vec<ContributionPreview>,
}

/// Journal a journal publication appeared in, when anything identifies it
pub fn journal_stub(record: &ImportRecord) -> Option<JournalStub> {
    let title = record
        .published_in
        .first()
        .map(|v| v.content.clone())
        .unwrap_or_default();
    if title.is_empty() && record.e_issn.is_none() && record.print_issn.is_none() {
        return None;
    }
    Some(JournalStub {
        title,
        e_issn: record.e_issn.clone(),
        print_issn: record.print_issn.clone(),
    })
}

/// Create request for the record's publication type, entity ids unresolved
pub fn build_create_request(record: &ImportRecord) -> CreateRequest {
    let document = DocumentFields {
        title: record.title.clone(),
        subtitle: record.subtitle.clone(),
        description: record.description.clone(),
        keywords: record.keywords.clone(),
        document_date: record.document_date.clone(),
        language: record.language.clone(),
        doi: record.doi.clone(),
        scopus_id: record.scopus_id.clone(),
        open_alex_id: record.open_alex_id.clone(),
        web_of_science_id: record.web_of_science_id.clone(),
        uris: record.uris.clone(),
    };

    match record.publication_type {
        PublicationType::JournalPublication => CreateRequest::JournalPublication {
            document,
            journal: journal_stub(record).unwrap_or_default(),
            journal_id: None,
            volume: record.volume.clone(),
            issue: record.issue.clone(),
            start_page: record.start_page.clone(),
            end_page: record.end_page.clone(),
            number_of_pages: record.number_of_pages,
        },
        PublicationType::ProceedingsPublication => CreateRequest::ProceedingsPublication {
            document,
            proceedings_title: record.published_in.clone(),
            event: record.event.clone(),
            event_id: None,
            isbn: record.isbn.clone(),
            publisher: record.publisher.clone(),
            start_page: record.start_page.clone(),
            end_page: record.end_page.clone(),
            number_of_pages: record.number_of_pages,
        },
        PublicationType::Monograph => CreateRequest::Monograph {
            document,
            isbn: record.isbn.clone(),
            publisher: record.publisher.clone(),
            number_of_pages: record.number_of_pages,
        },
        other => CreateRequest::Generic {
            document,
            publication_type: other,
            published_in: record.published_in.clone(),
            publisher: record.publisher.clone(),
            isbn: record.isbn.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordSource;

    fn record(publication_type: PublicationType) -> ImportRecord {
        let mut record = ImportRecord::new("SCOPUS:1", RecordSource::Scopus, publication_type);
        record.title = vec![MultilingualContent::new("EN", "T", 1)];
        record.published_in = vec![MultilingualContent::new("EN", "Venue", 1)];
        record.print_issn = Some("1234-5678".to_string());
        record.volume = Some("4".to_string());
        record
    }

    #[test]
    fn test_journal_publication_shape() {
        match build_create_request(&record(PublicationType::JournalPublication)) {
            CreateRequest::JournalPublication { journal, volume, journal_id, .. } => {
                assert_eq!(journal.title, "Venue");
                assert_eq!(journal.print_issn.as_deref(), Some("1234-5678"));
                assert_eq!(volume.as_deref(), Some("4"));
                assert_eq!(journal_id, None);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_thesis_is_generic_and_serializes_tagged() {
        let request = build_create_request(&record(PublicationType::Thesis));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "GENERIC");
        assert_eq!(json["publication_type"], "THESIS");
        assert_eq!(json["title"][0]["content"], "T");
    }

    #[test]
    fn test_journal_stub_requires_identification() {
        let mut bare = record(PublicationType::JournalPublication);
        bare.published_in.clear();
        bare.print_issn = None;
        assert_eq!(journal_stub(&bare), None);
    }
}
