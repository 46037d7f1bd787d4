//! Source adapters
//!
//! Each adapter converts one source's native payload into zero-or-one
//! canonical [`ImportRecord`]. Adapters never fail on malformed-but-parseable
//! input: they return `None` to mean "skip this item" (retracted, no title,
//! shape mismatch) and log why.
//!
//! Network adapters are reached through [`ConverterRegistry`], an explicit
//! source → converter-function table built once at startup. File adapters
//! live under [`files`].

pub mod files;
pub mod oai_pmh;
pub mod openalex;
pub mod scopus;
pub mod skg_if;
pub mod web_of_science;

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::warn;

use crate::models::{
    Contribution, HarvestError, ImportRecord, InstitutionStub, MultilingualContent, SourceKind,
};

/// Native item as delivered by a harvest source
#[derive(Debug, Clone)]
pub enum NativePayload {
    /// One result object of a JSON API
    Json(serde_json::Value),
    /// One parsed OAI-PMH record
    OaiPmh(oai_pmh::OaiRecord),
}

/// JSON keys holding a source-native id, in lookup order
const JSON_ID_KEYS: [&str; 6] = ["id", "eid", "dc:identifier", "uid", "local_identifier", "doi"];

impl NativePayload {
    /// Source-native id of the item, for logs
    pub fn describe(&self) -> String {
        let id = match self {
            NativePayload::Json(value) => JSON_ID_KEYS
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string),
            NativePayload::OaiPmh(record) => {
                Some(record.identifier.clone()).filter(|id| !id.is_empty())
            }
        };
        id.unwrap_or_else(|| "<no identifier>".to_string())
    }
}

/// Converter signature shared by all network adapters
pub type ConverterFn = fn(&NativePayload) -> Option<ImportRecord>;

/// Source → converter table
pub struct ConverterRegistry {
    converters: HashMap<SourceKind, ConverterFn>,
}

impl ConverterRegistry {
    /// Registry with every built-in network adapter
    pub fn standard() -> Self {
        let mut converters: HashMap<SourceKind, ConverterFn> = HashMap::new();
        converters.insert(SourceKind::Scopus, scopus::to_import_record);
        converters.insert(SourceKind::OpenAlex, openalex::to_import_record);
        converters.insert(SourceKind::WebOfScience, web_of_science::to_import_record);
        converters.insert(SourceKind::OaiPmh, oai_pmh::to_import_record);
        converters.insert(SourceKind::SkgIf, skg_if::to_import_record);
        Self { converters }
    }

    /// Empty registry, for tests wiring a single converter
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: SourceKind, converter: ConverterFn) {
        self.converters.insert(kind, converter);
    }

    pub fn converter(&self, kind: SourceKind) -> Result<ConverterFn, HarvestError> {
        self.converters
            .get(&kind)
            .copied()
            .ok_or_else(|| HarvestError::UnknownSource(kind.to_string()))
    }

    /// Resolve a source by name; unknown names are a configuration error
    pub fn resolve(&self, name: &str) -> Result<(SourceKind, ConverterFn), HarvestError> {
        let kind: SourceKind = name.parse()?;
        Ok((kind, self.converter(kind)?))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Deserialize a JSON payload into an adapter's native type
///
/// Shape mismatches are record-level problems: logged, item skipped.
pub(crate) fn json_payload<T: DeserializeOwned>(
    payload: &NativePayload,
    source: SourceKind,
) -> Option<T> {
    match payload {
        NativePayload::Json(value) => match serde_json::from_value(value.clone()) {
            Ok(native) => Some(native),
            Err(e) => {
                warn!(source = %source, error = %e, "Skipping item with unexpected shape");
                None
            }
        },
        NativePayload::OaiPmh(_) => {
            warn!(source = %source, "Skipping OAI-PMH payload handed to a JSON adapter");
            None
        }
    }
}

/// Trimmed non-empty string
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Map ISO 639 codes ("en", "eng", "sr-Latn") to the two-letter upper-case tag
pub(crate) fn language_tag(code: Option<&str>) -> String {
    let code = code.map(str::trim).unwrap_or_default().to_ascii_lowercase();
    let primary = code.split(['-', '_']).next().unwrap_or_default();
    match primary {
        "" | "en" | "eng" | "english" => "EN".to_string(),
        "sr" | "srp" | "serbian" => "SR".to_string(),
        "de" | "deu" | "ger" | "german" => "DE".to_string(),
        "fr" | "fra" | "fre" | "french" => "FR".to_string(),
        "ru" | "rus" | "russian" => "RU".to_string(),
        other if other.len() == 2 => other.to_ascii_uppercase(),
        other => other.chars().take(2).collect::<String>().to_ascii_uppercase(),
    }
}

/// Ordered multilingual list from plain strings, priority by position
pub(crate) fn multilingual<'a>(
    language: &str,
    values: impl IntoIterator<Item = &'a str>,
) -> Vec<MultilingualContent> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .enumerate()
        .map(|(i, v)| MultilingualContent::new(language, v, i as i32 + 1))
        .collect()
}

/// Split "a; b | c" style keyword strings
pub(crate) fn split_keywords(raw: &str) -> Vec<&str> {
    raw.split(|c| c == ';' || c == '|' || c == '\n')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect()
}

/// Assign institutions to contributions positionally
///
/// Only when the counts match (1:1 or N:N); otherwise affiliations are left
/// unset because there is no reliable way to pair them.
pub(crate) fn assign_affiliations_positionally(
    contributions: &mut [Contribution],
    institutions: Vec<InstitutionStub>,
) {
    if institutions.is_empty() || institutions.len() != contributions.len() {
        return;
    }
    for (contribution, institution) in contributions.iter_mut().zip(institutions) {
        contribution.institutions = vec![institution];
    }
}

/// Split "12-19" / "12–19" page ranges
pub(crate) fn split_page_range(range: &str) -> (Option<String>, Option<String>) {
    let mut parts = range.split(['-', '–', '—']).map(str::trim);
    let start = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
    let end = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
    (start, end)
}
