//! OpenAlex works adapter
//!
//! Converts one `results[]` work object. Abstracts arrive as an inverted
//! index (`word -> [positions]`) and are rebuilt into plain text. Authorship
//! institutions are explicit per author.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{json_payload, language_tag, multilingual, non_blank, NativePayload};
use crate::models::{
    normalize_doi, Contribution, EventStub, ImportRecord, InstitutionStub, PersonStub,
    PublicationType, SourceKind,
};

const OPENALEX_ID_PREFIX: &str = "https://openalex.org/";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexWork {
    /// `https://openalex.org/W...`
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_date: Option<String>,
    pub publication_year: Option<i32>,
    /// `article`, `book`, `book-chapter`, `dissertation`, `dataset`, ...
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub is_retracted: bool,
    pub primary_location: Option<OpenAlexLocation>,
    pub biblio: Option<OpenAlexBiblio>,
    #[serde(default)]
    pub authorships: Vec<OpenAlexAuthorship>,
    #[serde(default)]
    pub keywords: Vec<OpenAlexKeyword>,
    pub abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexLocation {
    pub source: Option<OpenAlexSource>,
    pub landing_page_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexSource {
    pub display_name: Option<String>,
    pub issn_l: Option<String>,
    #[serde(default)]
    pub issn: Option<Vec<String>>,
    /// `journal`, `conference`, `repository`, `book series`
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub host_organization_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexBiblio {
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    pub last_page: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexAuthorship {
    pub author: OpenAlexAuthor,
    #[serde(default)]
    pub institutions: Vec<OpenAlexInstitution>,
    #[serde(default)]
    pub is_corresponding: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexAuthor {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexInstitution {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub ror: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexKeyword {
    pub display_name: String,
}

pub fn to_import_record(payload: &NativePayload) -> Option<ImportRecord> {
    let work: OpenAlexWork = json_payload(payload, SourceKind::OpenAlex)?;
    convert(work)
}

fn convert(work: OpenAlexWork) -> Option<ImportRecord> {
    let work_id = short_id(&work.id);

    if work.is_retracted {
        debug!(work = %work_id, "Skipping retracted OpenAlex work");
        return None;
    }

    let Some(title) = non_blank(work.title.as_deref().or(work.display_name.as_deref())) else {
        debug!(work = %work_id, "Skipping OpenAlex work without title");
        return None;
    };

    let source = work.primary_location.as_ref().and_then(|l| l.source.as_ref());
    let venue_is_conference = source
        .and_then(|s| s.source_type.as_deref())
        .is_some_and(|t| t.eq_ignore_ascii_case("conference"));

    let publication_type = match work.work_type.as_deref() {
        Some("article") if venue_is_conference => PublicationType::ProceedingsPublication,
        Some("dissertation") => PublicationType::Thesis,
        Some(label) => PublicationType::from_label(label),
        None => PublicationType::Other,
    };

    let language = language_tag(work.language.as_deref());
    let mut record = ImportRecord::new(
        format!("OPENALEX:{}", work_id),
        SourceKind::OpenAlex.record_source(),
        publication_type,
    );
    record.title = multilingual(&language, [title.as_str()]);
    record.description = work
        .abstract_inverted_index
        .as_ref()
        .map(rebuild_abstract)
        .map(|text| multilingual(&language, [text.as_str()]))
        .unwrap_or_default();
    record.keywords = multilingual(
        &language,
        work.keywords.iter().map(|k| k.display_name.as_str()),
    );
    record.language = non_blank(work.language.as_deref());
    record.document_date = non_blank(work.publication_date.as_deref())
        .or_else(|| work.publication_year.map(|y| y.to_string()));
    record.open_alex_id = Some(work_id.to_string());
    record.doi = work.doi.as_deref().and_then(normalize_doi);

    if let Some(source) = source {
        record.published_in = multilingual(&language, source.display_name.as_deref());
        record.publisher = non_blank(source.host_organization_name.as_deref());
        let mut issns: Vec<String> = Vec::new();
        for issn in source.issn.iter().flatten().map(String::as_str).chain(source.issn_l.as_deref()) {
            if !issns.iter().any(|known| known == issn) {
                issns.push(issn.to_string());
            }
        }
        let mut issns = issns.into_iter();
        record.print_issn = issns.next();
        record.e_issn = issns.next();
        if publication_type == PublicationType::ProceedingsPublication {
            record.event = source.display_name.as_deref().and_then(|venue| {
                let name = multilingual("EN", [venue]);
                (!name.is_empty()).then(|| EventStub {
                    name,
                    ..Default::default()
                })
            });
        }
    }
    if let Some(url) = work
        .primary_location
        .as_ref()
        .and_then(|l| non_blank(l.landing_page_url.as_deref()))
    {
        record.uris.insert(url);
    }
    if let Some(biblio) = &work.biblio {
        record.volume = non_blank(biblio.volume.as_deref());
        record.issue = non_blank(biblio.issue.as_deref());
        record.start_page = non_blank(biblio.first_page.as_deref());
        record.end_page = non_blank(biblio.last_page.as_deref());
    }

    record.contributions = work
        .authorships
        .iter()
        .enumerate()
        .map(|(i, authorship)| {
            let person = PersonStub {
                open_alex_id: authorship.author.id.as_deref().map(|id| short_id(id).to_string()),
                orcid: authorship.author.orcid.as_deref().map(strip_orcid_url),
                ..PersonStub::named(authorship.author.display_name.as_deref().unwrap_or_default())
            };
            let mut contribution = Contribution::author(person, i as u32 + 1);
            contribution.is_corresponding = authorship.is_corresponding.unwrap_or(false);
            contribution.institutions = authorship
                .institutions
                .iter()
                .map(|inst| InstitutionStub {
                    open_alex_id: inst.id.as_deref().map(|id| short_id(id).to_string()),
                    ror: inst.ror.clone(),
                    ..InstitutionStub::named(inst.display_name.as_deref().unwrap_or_default())
                })
                .collect();
            contribution
        })
        .collect();

    Some(record)
}

/// `https://openalex.org/W123` -> `W123`
fn short_id(id: &str) -> &str {
    id.strip_prefix(OPENALEX_ID_PREFIX).unwrap_or(id)
}

fn strip_orcid_url(orcid: &str) -> String {
    orcid
        .trim()
        .trim_start_matches("https://orcid.org/")
        .trim_start_matches("http://orcid.org/")
        .to_string()
}

/// Rebuild plain text from an inverted index
pub fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    positioned.sort_unstable_by_key(|(position, _)| *position);
    positioned
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}
