//! SKG-IF (Scientific Knowledge Graph Interoperability Framework) adapter
//!
//! Converts one research `product` entity. Multilingual fields are maps of
//! language code to value lists; identifiers are `{scheme, value}` pairs.
//! Only the first manifestation is used for bibliographic details.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::{json_payload, language_tag, multilingual, non_blank, NativePayload};
use crate::models::{
    normalize_doi, Contribution, ContributionRole, EventStub, ImportRecord, InstitutionStub,
    MultilingualContent, PersonName, PersonStub, PublicationType, SourceKind,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgIdentifier {
    pub scheme: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgProduct {
    pub local_identifier: String,
    #[serde(default)]
    pub identifiers: Vec<SkgIdentifier>,
    #[serde(default)]
    pub titles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub abstracts: BTreeMap<String, Vec<String>>,
    /// `literature`, `research data`, `research software`, `other`
    pub product_type: Option<String>,
    #[serde(default)]
    pub topics: Vec<SkgTopic>,
    #[serde(default)]
    pub contributions: Vec<SkgContribution>,
    #[serde(default)]
    pub manifestations: Vec<SkgManifestation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgTopic {
    /// Either a bare label or a topic entity with `labels`
    pub term: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgContribution {
    pub by: SkgAgent,
    #[serde(default)]
    pub declared_affiliations: Vec<SkgOrganisation>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgAgent {
    pub local_identifier: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<SkgIdentifier>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgOrganisation {
    pub local_identifier: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<SkgIdentifier>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgManifestation {
    #[serde(rename = "type")]
    pub manifestation_type: Option<SkgManifestationType>,
    pub dates: Option<SkgDates>,
    pub biblio: Option<SkgBiblio>,
    #[serde(default)]
    pub identifiers: Vec<SkgIdentifier>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgManifestationType {
    pub class: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgDates {
    #[serde(default)]
    pub publication: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgBiblio {
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<SkgPages>,
    #[serde(rename = "in")]
    pub venue: Option<SkgVenue>,
    pub edition: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgPages {
    pub first: Option<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkgVenue {
    pub name: Option<String>,
    /// `journal`, `conference`, `book`, ...
    #[serde(rename = "type")]
    pub venue_type: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<SkgIdentifier>,
}

pub fn to_import_record(payload: &NativePayload) -> Option<ImportRecord> {
    let product: SkgProduct = json_payload(payload, SourceKind::SkgIf)?;
    convert(product)
}

fn convert(product: SkgProduct) -> Option<ImportRecord> {
    let title = language_map(&product.titles);
    if title.is_empty() {
        debug!(product = %product.local_identifier, "Skipping SKG-IF product without title");
        return None;
    }

    let manifestation = product.manifestations.first();
    let venue = manifestation
        .and_then(|m| m.biblio.as_ref())
        .and_then(|b| b.venue.as_ref());
    let type_label = manifestation
        .and_then(|m| m.manifestation_type.as_ref())
        .and_then(|t| t.labels.get("en").cloned().or_else(|| t.class.clone()));

    let publication_type = match (product.product_type.as_deref(), venue.and_then(|v| v.venue_type.as_deref())) {
        (Some("research data"), _) => PublicationType::Dataset,
        (_, Some(venue_type)) if venue_type.eq_ignore_ascii_case("conference") => {
            PublicationType::ProceedingsPublication
        }
        _ => type_label
            .as_deref()
            .map(PublicationType::from_label)
            .unwrap_or(PublicationType::Other),
    };

    let mut record = ImportRecord::new(
        format!("SKGIF:{}", product.local_identifier),
        SourceKind::SkgIf.record_source(),
        publication_type,
    );
    record.title = title;
    record.description = language_map(&product.abstracts);
    record.keywords = multilingual(
        "EN",
        product.topics.iter().filter_map(|t| topic_label(&t.term)),
    );

    let all_identifiers = product
        .identifiers
        .iter()
        .chain(manifestation.into_iter().flat_map(|m| m.identifiers.iter()));
    for id in all_identifiers {
        match id.scheme.to_ascii_lowercase().as_str() {
            "doi" => {
                if record.doi.is_none() {
                    record.doi = normalize_doi(&id.value);
                }
            }
            "isbn" => {
                record.isbn.get_or_insert_with(|| id.value.clone());
            }
            "url" => {
                record.uris.insert(id.value.clone());
            }
            _ => {}
        }
    }

    if let Some(manifestation) = manifestation {
        record.document_date = manifestation
            .dates
            .as_ref()
            .and_then(|d| d.publication.first().cloned());
        if let Some(biblio) = &manifestation.biblio {
            record.volume = non_blank(biblio.volume.as_deref());
            record.issue = non_blank(biblio.issue.as_deref());
            if let Some(pages) = &biblio.pages {
                record.start_page = non_blank(pages.first.as_deref());
                record.end_page = non_blank(pages.last.as_deref());
            }
        }
    }
    if let Some(venue) = venue {
        record.published_in = multilingual("EN", venue.name.as_deref());
        for id in &venue.identifiers {
            match id.scheme.to_ascii_lowercase().as_str() {
                "issn" | "pissn" => {
                    record.print_issn.get_or_insert_with(|| id.value.clone());
                }
                "eissn" => {
                    record.e_issn.get_or_insert_with(|| id.value.clone());
                }
                _ => {}
            }
        }
        if publication_type == PublicationType::ProceedingsPublication {
            record.event = venue.name.as_deref().map(|name| EventStub {
                name: multilingual("EN", [name]),
                ..Default::default()
            });
        }
    }

    let mut contributions: Vec<&SkgContribution> = product.contributions.iter().collect();
    contributions.sort_by_key(|c| c.rank.unwrap_or(u32::MAX));
    record.contributions = contributions
        .into_iter()
        .enumerate()
        .map(|(i, c)| to_contribution(c, i as u32 + 1))
        .collect();

    Some(record)
}

fn to_contribution(contribution: &SkgContribution, order: u32) -> Contribution {
    let agent = &contribution.by;
    let name = match (agent.given_name.as_deref(), agent.family_name.as_deref()) {
        (Some(given), Some(family)) => PersonName {
            first_name: given.trim().to_string(),
            middle_name: None,
            last_name: family.trim().to_string(),
        },
        _ => PersonName::parse(agent.name.as_deref().unwrap_or_default()),
    };
    let mut person = PersonStub {
        name,
        ..Default::default()
    };
    for id in &agent.identifiers {
        if id.scheme.eq_ignore_ascii_case("orcid") {
            person.orcid = Some(id.value.trim_start_matches("https://orcid.org/").to_string());
        }
    }

    let mut result = Contribution::author(person, order);
    if contribution
        .roles
        .iter()
        .any(|r| r.eq_ignore_ascii_case("editor"))
    {
        result.role = ContributionRole::Editor;
    }
    result.institutions = contribution
        .declared_affiliations
        .iter()
        .map(|org| {
            let mut stub = InstitutionStub::named(org.name.as_deref().unwrap_or_default());
            stub.ror = org
                .identifiers
                .iter()
                .find(|id| id.scheme.eq_ignore_ascii_case("ror"))
                .map(|id| id.value.clone());
            stub
        })
        .collect();
    result
}

/// Language-keyed value lists, English first
fn language_map(values: &BTreeMap<String, Vec<String>>) -> Vec<MultilingualContent> {
    let mut entries: Vec<(String, &str)> = values
        .iter()
        .flat_map(|(lang, texts)| {
            let tag = language_tag(Some(lang));
            texts.iter().map(move |t| (tag.clone(), t.as_str()))
        })
        .filter(|(_, t)| !t.trim().is_empty())
        .collect();
    entries.sort_by_key(|(tag, _)| tag != "EN");
    entries
        .into_iter()
        .enumerate()
        .map(|(i, (tag, text))| MultilingualContent::new(tag, text.trim(), i as i32 + 1))
        .collect()
}

fn topic_label(term: &Value) -> Option<&str> {
    match term {
        Value::String(label) => Some(label.as_str()),
        Value::Object(map) => map
            .get("labels")
            .and_then(|labels| labels.get("en").or_else(|| labels.as_object()?.values().next()))
            .or_else(|| map.get("name"))
            .and_then(Value::as_str),
        _ => None,
    }
}
