//! Web of Science Starter API adapter
//!
//! The Starter API exposes no affiliations, so contributions carry only
//! names and researcher ids; attribution later falls back to name search.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{json_payload, multilingual, non_blank, NativePayload};
use crate::models::{
    normalize_doi, Contribution, ImportRecord, PersonStub, PublicationType, SourceKind,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WosDocument {
    /// `WOS:000...`
    pub uid: String,
    pub title: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    pub source: Option<WosSource>,
    pub names: Option<WosNames>,
    pub identifiers: Option<WosIdentifiers>,
    pub keywords: Option<WosKeywords>,
    pub links: Option<WosLinks>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WosSource {
    pub source_title: Option<String>,
    pub publish_year: Option<i32>,
    pub publish_month: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<WosPages>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WosPages {
    pub begin: Option<String>,
    pub end: Option<String>,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WosNames {
    #[serde(default)]
    pub authors: Vec<WosAuthor>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WosAuthor {
    pub display_name: Option<String>,
    pub wos_standard: Option<String>,
    pub researcher_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WosIdentifiers {
    pub doi: Option<String>,
    pub issn: Option<String>,
    pub eissn: Option<String>,
    pub isbn: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WosKeywords {
    #[serde(default)]
    pub author_keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WosLinks {
    pub record: Option<String>,
}

pub fn to_import_record(payload: &NativePayload) -> Option<ImportRecord> {
    let document: WosDocument = json_payload(payload, SourceKind::WebOfScience)?;
    convert(document)
}

fn convert(document: WosDocument) -> Option<ImportRecord> {
    if document
        .types
        .iter()
        .any(|t| t.to_ascii_lowercase().contains("retract"))
    {
        debug!(uid = %document.uid, "Skipping retracted Web of Science document");
        return None;
    }
    let Some(title) = non_blank(document.title.as_deref()) else {
        debug!(uid = %document.uid, "Skipping Web of Science document without title");
        return None;
    };

    let publication_type = document
        .types
        .first()
        .map(|t| PublicationType::from_label(t))
        .unwrap_or(PublicationType::Other);

    let mut record = ImportRecord::new(
        document.uid.clone(),
        SourceKind::WebOfScience.record_source(),
        publication_type,
    );
    record.title = multilingual("EN", [title.as_str()]);
    record.web_of_science_id = Some(document.uid.trim_start_matches("WOS:").to_string());

    if let Some(source) = &document.source {
        record.published_in = multilingual("EN", source.source_title.as_deref());
        record.document_date = source.publish_year.map(|y| y.to_string());
        record.volume = non_blank(source.volume.as_deref());
        record.issue = non_blank(source.issue.as_deref());
        if let Some(pages) = &source.pages {
            record.start_page = non_blank(pages.begin.as_deref());
            record.end_page = non_blank(pages.end.as_deref());
            record.number_of_pages = pages.count;
        }
    }
    if let Some(ids) = &document.identifiers {
        record.doi = ids.doi.as_deref().and_then(normalize_doi);
        record.print_issn = non_blank(ids.issn.as_deref());
        record.e_issn = non_blank(ids.eissn.as_deref());
        record.isbn = non_blank(ids.isbn.as_deref());
    }
    if let Some(keywords) = &document.keywords {
        record.keywords = multilingual("EN", keywords.author_keywords.iter().map(String::as_str));
    }
    if let Some(url) = document.links.as_ref().and_then(|l| non_blank(l.record.as_deref())) {
        record.uris.insert(url);
    }

    record.contributions = document
        .names
        .iter()
        .flat_map(|n| n.authors.iter())
        .enumerate()
        .map(|(i, author)| {
            let name = author
                .wos_standard
                .as_deref()
                .or(author.display_name.as_deref())
                .unwrap_or_default();
            let person = PersonStub {
                web_of_science_id: non_blank(author.researcher_id.as_deref()),
                ..PersonStub::named(name)
            };
            Contribution::author(person, i as u32 + 1)
        })
        .collect();

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converts_document() {
        let payload = NativePayload::Json(json!({
            "uid": "WOS:000270372400005",
            "title": "Deduplication at scale",
            "types": ["Article"],
            "source": {"sourceTitle": "DATA SCIENCE JOURNAL", "publishYear": 2009, "volume": "8", "issue": "2", "pages": {"begin": "15", "end": "29", "count": 15}},
            "names": {"authors": [{"displayName": "Jovanovic, Ana", "wosStandard": "Jovanovic, A", "researcherId": "B-1234-2011"}]},
            "identifiers": {"doi": "10.2481/DSJ.8.15", "issn": "1683-1470"},
            "keywords": {"authorKeywords": ["dedup", "scale"]}
        }));
        let record = to_import_record(&payload).unwrap();
        assert_eq!(record.identifier, "WOS:000270372400005");
        assert_eq!(record.web_of_science_id.as_deref(), Some("000270372400005"));
        assert_eq!(record.publication_type, PublicationType::JournalPublication);
        assert_eq!(record.doi.as_deref(), Some("10.2481/dsj.8.15"));
        assert_eq!(record.number_of_pages, Some(15));
        assert_eq!(record.contributions[0].person.name.last_name, "Jovanovic");
        assert_eq!(
            record.contributions[0].person.web_of_science_id.as_deref(),
            Some("B-1234-2011")
        );
        assert!(record.contributions[0].institutions.is_empty());
    }

    #[test]
    fn test_retraction_notice_skipped() {
        let payload = NativePayload::Json(json!({
            "uid": "WOS:1", "title": "Retracted: something", "types": ["Retracted Publication"]
        }));
        assert!(to_import_record(&payload).is_none());
    }
}
