//! Scopus Search API adapter
//!
//! Converts one `search-results.entry` object (COMPLETE view) into an
//! import record. Authors carry their Scopus author id and affiliation ids
//! (`afid`), which are joined against the entry-level `affiliation` list,
//! so no positional guessing is needed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{json_payload, multilingual, non_blank, split_keywords, split_page_range, NativePayload};
use crate::models::{
    normalize_doi, Contribution, EventStub, ImportRecord, InstitutionStub, PersonName, PersonStub,
    PublicationType, SourceKind,
};

/// Scopus document subtype for retracted items
const RETRACTED_SUBTYPE: &str = "tb";

/// `{"$": "..."}` value wrapper used throughout the Scopus JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopusValue {
    #[serde(rename = "$")]
    pub value: String,
}

/// One Scopus search entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopusEntry {
    /// Electronic identifier, e.g. `2-s2.0-85000000000`
    pub eid: Option<String>,
    #[serde(rename = "dc:identifier")]
    pub dc_identifier: Option<String>,
    #[serde(rename = "dc:title")]
    pub title: Option<String>,
    /// Abstract (COMPLETE view only)
    #[serde(rename = "dc:description")]
    pub description: Option<String>,
    #[serde(rename = "prism:publicationName")]
    pub publication_name: Option<String>,
    #[serde(rename = "prism:issn")]
    pub issn: Option<String>,
    #[serde(rename = "prism:eIssn")]
    pub e_issn: Option<String>,
    #[serde(rename = "prism:isbn", default)]
    pub isbn: Vec<ScopusValue>,
    #[serde(rename = "prism:volume")]
    pub volume: Option<String>,
    #[serde(rename = "prism:issueIdentifier")]
    pub issue: Option<String>,
    #[serde(rename = "prism:pageRange")]
    pub page_range: Option<String>,
    #[serde(rename = "prism:coverDate")]
    pub cover_date: Option<String>,
    #[serde(rename = "prism:doi")]
    pub doi: Option<String>,
    /// Two-letter document type code (`ar`, `cp`, `bk`, `tb`, ...)
    pub subtype: Option<String>,
    #[serde(rename = "subtypeDescription")]
    pub subtype_description: Option<String>,
    /// Author keywords separated by `|`
    pub authkeywords: Option<String>,
    #[serde(default)]
    pub author: Vec<ScopusAuthor>,
    #[serde(default)]
    pub affiliation: Vec<ScopusAffiliation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopusAuthor {
    #[serde(rename = "@seq")]
    pub seq: Option<String>,
    pub authid: Option<String>,
    pub authname: Option<String>,
    pub surname: Option<String>,
    #[serde(rename = "given-name")]
    pub given_name: Option<String>,
    #[serde(default)]
    pub afid: Vec<ScopusValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopusAffiliation {
    pub afid: Option<String>,
    pub affilname: Option<String>,
}

/// Registry entry point
pub fn to_import_record(payload: &NativePayload) -> Option<ImportRecord> {
    let entry: ScopusEntry = json_payload(payload, SourceKind::Scopus)?;
    convert(entry)
}

fn convert(entry: ScopusEntry) -> Option<ImportRecord> {
    let eid = non_blank(entry.eid.as_deref())?;

    if entry.subtype.as_deref() == Some(RETRACTED_SUBTYPE) {
        debug!(eid = %eid, "Skipping retracted Scopus item");
        return None;
    }

    let Some(title) = non_blank(entry.title.as_deref()) else {
        debug!(eid = %eid, "Skipping Scopus item without title");
        return None;
    };

    let type_label = entry
        .subtype
        .as_deref()
        .or(entry.subtype_description.as_deref())
        .unwrap_or_default();
    let publication_type = PublicationType::from_label(type_label);

    let mut record = ImportRecord::new(
        format!("SCOPUS:{}", eid),
        SourceKind::Scopus.record_source(),
        publication_type,
    );
    record.title = multilingual("EN", [title.as_str()]);
    record.description = multilingual("EN", entry.description.as_deref());
    record.keywords = entry
        .authkeywords
        .as_deref()
        .map(|k| multilingual("EN", split_keywords(k)))
        .unwrap_or_default();
    record.published_in = multilingual("EN", entry.publication_name.as_deref());
    record.document_date = non_blank(entry.cover_date.as_deref());
    record.volume = non_blank(entry.volume.as_deref());
    record.issue = non_blank(entry.issue.as_deref());
    if let Some(range) = entry.page_range.as_deref() {
        let (start, end) = split_page_range(range);
        record.start_page = start;
        record.end_page = end;
    }
    record.doi = entry.doi.as_deref().and_then(normalize_doi);
    record.print_issn = non_blank(entry.issn.as_deref());
    record.e_issn = non_blank(entry.e_issn.as_deref());
    record.isbn = entry.isbn.first().and_then(|i| non_blank(Some(i.value.as_str())));
    record.scopus_id = entry
        .dc_identifier
        .as_deref()
        .map(|id| id.trim_start_matches("SCOPUS_ID:").to_string())
        .or(Some(eid.clone()));

    record.contributions = entry
        .author
        .iter()
        .enumerate()
        .map(|(i, author)| {
            let order = author
                .seq
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(i as u32 + 1);
            let name = match (author.given_name.as_deref(), author.surname.as_deref()) {
                (given, Some(surname)) => {
                    let mut name = PersonName::parse(given.unwrap_or_default());
                    if name.first_name.is_empty() {
                        name.first_name = std::mem::take(&mut name.last_name);
                    } else {
                        let last = std::mem::take(&mut name.last_name);
                        name.middle_name = match name.middle_name.take() {
                            Some(middle) => Some(format!("{} {}", middle, last)),
                            None => non_blank(Some(last.as_str())),
                        };
                    }
                    name.last_name = surname.trim().to_string();
                    name
                }
                (_, None) => PersonName::parse(author.authname.as_deref().unwrap_or_default()),
            };
            let person = PersonStub {
                name,
                scopus_author_id: non_blank(author.authid.as_deref()),
                ..Default::default()
            };
            let mut contribution = Contribution::author(person, order);
            contribution.institutions = author
                .afid
                .iter()
                .filter_map(|afid| institution_for(&entry.affiliation, &afid.value))
                .collect();
            contribution
        })
        .collect();

    if record.publication_type == PublicationType::ProceedingsPublication {
        record.event = entry.publication_name.as_deref().and_then(|venue| {
            let name = multilingual("EN", [venue]);
            (!name.is_empty()).then(|| EventStub {
                name,
                ..Default::default()
            })
        });
    }

    Some(record)
}

fn institution_for(affiliations: &[ScopusAffiliation], afid: &str) -> Option<InstitutionStub> {
    let afid = afid.trim();
    if afid.is_empty() {
        return None;
    }
    let name = affiliations
        .iter()
        .find(|a| a.afid.as_deref() == Some(afid))
        .and_then(|a| a.affilname.as_deref())
        .unwrap_or_default();
    let mut stub = InstitutionStub::named(name);
    stub.scopus_afid = Some(afid.to_string());
    Some(stub)
}
