//! OAI-PMH adapter
//!
//! **Parsing:** `ListRecords` responses are read with a streaming
//! `quick-xml` reader into [`OaiRecord`] values (header plus `oai_dc`
//! Dublin Core metadata) and the optional `resumptionToken`. An empty or
//! absent token ends the harvest. The protocol error `noRecordsMatch` is an
//! empty final page; every other protocol error is a parse failure.
//!
//! **Conversion:** deleted records (`<header status="deleted">`) are skipped,
//! titles keep their `xml:lang`, DOIs/ISBNs/ISSNs/URLs are picked out of the
//! `dc:identifier` list.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{language_tag, multilingual, non_blank, NativePayload};
use crate::models::{
    normalize_doi, Contribution, ContributionRole, EventStub, HarvestError, ImportRecord,
    MultilingualContent, PersonStub, PublicationType, SourceKind,
};

/// Text value with its optional `xml:lang`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OaiText {
    pub lang: Option<String>,
    pub value: String,
}

/// One record of a `ListRecords` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OaiRecord {
    pub identifier: String,
    pub datestamp: Option<String>,
    pub deleted: bool,
    pub set_specs: Vec<String>,
    pub titles: Vec<OaiText>,
    pub descriptions: Vec<OaiText>,
    pub creators: Vec<String>,
    pub contributors: Vec<String>,
    pub subjects: Vec<String>,
    pub publishers: Vec<String>,
    pub dates: Vec<String>,
    pub types: Vec<String>,
    pub identifiers: Vec<String>,
    pub languages: Vec<String>,
    pub sources: Vec<String>,
}

/// One parsed response page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaiPage {
    pub records: Vec<OaiRecord>,
    pub resumption_token: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Header,
    Metadata,
}

/// Parse a `ListRecords` response body
pub fn parse_list_records(xml: &str) -> Result<OaiPage, HarvestError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = OaiPage::default();
    let mut buf = Vec::new();
    let mut current: Option<OaiRecord> = None;
    let mut section = Section::Outside;
    let mut text = String::new();
    let mut lang: Option<String> = None;
    let mut error_code: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"record" => current = Some(OaiRecord::default()),
                    b"header" => {
                        section = Section::Header;
                        if let Some(record) = current.as_mut() {
                            record.deleted = attribute(&e, b"status").as_deref() == Some("deleted");
                        }
                    }
                    b"metadata" => section = Section::Metadata,
                    b"error" => error_code = attribute(&e, b"code"),
                    _ => lang = attribute(&e, b"lang"),
                }
            }
            Ok(Event::Empty(e)) => {
                // <resumptionToken completeListSize="..."/> marks the last page
                if e.local_name().as_ref() == b"resumptionToken" {
                    page.resumption_token = None;
                }
            }
            Ok(Event::Text(e)) => {
                let raw = std::str::from_utf8(e.as_ref())
                    .map_err(|err| HarvestError::Parse(format!("Invalid UTF-8 in OAI-PMH body: {}", err)))?;
                let unescaped = quick_xml::escape::unescape(raw)
                    .map_err(|err| HarvestError::Parse(format!("Bad XML escape: {}", err)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(e)) => {
                let value = text.trim().to_string();
                text.clear();
                match e.local_name().as_ref() {
                    b"record" => {
                        if let Some(record) = current.take() {
                            page.records.push(record);
                        }
                    }
                    b"header" | b"metadata" => section = Section::Outside,
                    b"resumptionToken" => page.resumption_token = non_blank(Some(value.as_str())),
                    b"error" => {
                        let code = error_code.take().unwrap_or_default();
                        if code == "noRecordsMatch" {
                            return Ok(OaiPage::default());
                        }
                        return Err(HarvestError::Parse(format!(
                            "OAI-PMH error {}: {}",
                            code, value
                        )));
                    }
                    name => {
                        if let Some(record) = current.as_mut() {
                            store_field(record, section, name, value, lang.take());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(HarvestError::Parse(format!(
                    "Malformed OAI-PMH response at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(page)
}

fn attribute(element: &BytesStart<'_>, local_name: &[u8]) -> Option<String> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == local_name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn store_field(
    record: &mut OaiRecord,
    section: Section,
    name: &[u8],
    value: String,
    lang: Option<String>,
) {
    if value.is_empty() {
        return;
    }
    match (section, name) {
        (Section::Header, b"identifier") => record.identifier = value,
        (Section::Header, b"datestamp") => record.datestamp = Some(value),
        (Section::Header, b"setSpec") => record.set_specs.push(value),
        (Section::Metadata, b"title") => record.titles.push(OaiText { lang, value }),
        (Section::Metadata, b"description") => record.descriptions.push(OaiText { lang, value }),
        (Section::Metadata, b"creator") => record.creators.push(value),
        (Section::Metadata, b"contributor") => record.contributors.push(value),
        (Section::Metadata, b"subject") => record.subjects.push(value),
        (Section::Metadata, b"publisher") => record.publishers.push(value),
        (Section::Metadata, b"date") => record.dates.push(value),
        (Section::Metadata, b"type") => record.types.push(value),
        (Section::Metadata, b"identifier") => record.identifiers.push(value),
        (Section::Metadata, b"language") => record.languages.push(value),
        (Section::Metadata, b"source") => record.sources.push(value),
        _ => {}
    }
}

pub fn to_import_record(payload: &NativePayload) -> Option<ImportRecord> {
    match payload {
        NativePayload::OaiPmh(record) => convert(record),
        NativePayload::Json(_) => {
            debug!("Skipping JSON payload handed to the OAI-PMH adapter");
            None
        }
    }
}

fn convert(oai: &OaiRecord) -> Option<ImportRecord> {
    if oai.deleted {
        debug!(identifier = %oai.identifier, "Skipping deleted OAI-PMH record");
        return None;
    }
    if oai.identifier.is_empty() {
        warn!(
            datestamp = oai.datestamp.as_deref().unwrap_or("-"),
            title = oai.titles.first().map_or("-", |t| t.value.as_str()),
            "Skipping OAI-PMH record without header identifier"
        );
        return None;
    }

    let language = language_tag(oai.languages.first().map(String::as_str));
    let title: Vec<MultilingualContent> = oai
        .titles
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let tag = t.lang.as_deref().map_or_else(|| language.clone(), |l| language_tag(Some(l)));
            MultilingualContent::new(tag, t.value.trim(), i as i32 + 1)
        })
        .filter(|t| !t.content.is_empty())
        .collect();
    if title.is_empty() {
        debug!(identifier = %oai.identifier, "Skipping OAI-PMH record without title");
        return None;
    }

    let publication_type = oai
        .types
        .iter()
        .map(|t| type_from_dc(t))
        .find(|t| *t != PublicationType::Other)
        .unwrap_or(PublicationType::Other);

    let mut record = ImportRecord::new(
        format!("OAI:{}", oai.identifier),
        SourceKind::OaiPmh.record_source(),
        publication_type,
    );
    record.title = title;
    record.description = oai
        .descriptions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let tag = d.lang.as_deref().map_or_else(|| language.clone(), |l| language_tag(Some(l)));
            MultilingualContent::new(tag, d.value.trim(), i as i32 + 1)
        })
        .collect();
    record.keywords = multilingual(&language, oai.subjects.iter().map(String::as_str));
    record.published_in = multilingual(&language, oai.sources.first().map(String::as_str));
    record.publisher = oai.publishers.first().cloned();
    record.language = oai.languages.first().cloned();
    record.document_date = oai.dates.first().cloned().or_else(|| oai.datestamp.clone());

    for identifier in &oai.identifiers {
        let lowered = identifier.to_ascii_lowercase();
        if let Some(doi) = normalize_doi(lowered.trim_start_matches("info:doi/")) {
            record.doi.get_or_insert(doi);
        } else if let Some(isbn) = lowered.strip_prefix("urn:isbn:") {
            record.isbn.get_or_insert(isbn.to_string());
        } else if let Some(issn) = lowered.strip_prefix("urn:issn:") {
            record.print_issn.get_or_insert(issn.to_string());
        } else if lowered.starts_with("http://") || lowered.starts_with("https://") {
            record.uris.insert(identifier.clone());
        }
    }

    let mut contributions: Vec<Contribution> = oai
        .creators
        .iter()
        .enumerate()
        .map(|(i, name)| Contribution::author(PersonStub::named(name), i as u32 + 1))
        .collect();
    if publication_type == PublicationType::Thesis {
        let offset = contributions.len() as u32;
        contributions.extend(oai.contributors.iter().enumerate().map(|(i, name)| {
            let mut advisor = Contribution::author(PersonStub::named(name), offset + i as u32 + 1);
            advisor.role = ContributionRole::Advisor;
            advisor
        }));
    }
    record.contributions = contributions;

    if publication_type == PublicationType::ProceedingsPublication {
        record.event = oai.sources.first().map(|venue| EventStub {
            name: multilingual(&language, [venue.as_str()]),
            ..Default::default()
        });
    }

    Some(record)
}

/// `info:eu-repo/semantics/conferenceObject` style type to publication type
fn type_from_dc(dc_type: &str) -> PublicationType {
    let label = dc_type
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(dc_type)
        .to_ascii_lowercase();
    if label.contains("thesis") {
        PublicationType::Thesis
    } else if label.contains("conference") || label.contains("proceedings") {
        PublicationType::ProceedingsPublication
    } else if label.contains("book") {
        PublicationType::Monograph
    } else if label.contains("dataset") {
        PublicationType::Dataset
    } else {
        PublicationType::from_label(&label)
    }
}
