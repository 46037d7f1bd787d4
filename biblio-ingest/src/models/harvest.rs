//! Harvest task parameters, outcomes and errors
//!
//! Error taxonomy:
//! - Fatal configuration (unknown source, missing filter): raised before any state is written
//! - Transient network: retried up to the configured bound
//! - Parse: malformed page body, aborts immediately
//! - Record-level failures never surface here; adapters skip them

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{DatasetKey, Owner, RecordSource};

/// Network harvest sources known to the converter registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Scopus,
    OpenAlex,
    WebOfScience,
    OaiPmh,
    SkgIf,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Scopus,
        SourceKind::OpenAlex,
        SourceKind::WebOfScience,
        SourceKind::OaiPmh,
        SourceKind::SkgIf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Scopus => "SCOPUS",
            SourceKind::OpenAlex => "OPEN_ALEX",
            SourceKind::WebOfScience => "WEB_OF_SCIENCE",
            SourceKind::OaiPmh => "OAI_PMH",
            SourceKind::SkgIf => "SKG_IF",
        }
    }

    pub fn record_source(&self) -> RecordSource {
        match self {
            SourceKind::Scopus => RecordSource::Scopus,
            SourceKind::OpenAlex => RecordSource::OpenAlex,
            SourceKind::WebOfScience => RecordSource::WebOfScience,
            SourceKind::OaiPmh => RecordSource::OaiPmh,
            SourceKind::SkgIf => RecordSource::SkgIf,
        }
    }

    /// Repository protocols harvest a named endpoint rather than a keyed API
    pub fn needs_endpoint(&self) -> bool {
        matches!(self, SourceKind::OaiPmh | SourceKind::SkgIf)
    }

    /// Citation-database APIs must be narrowed by an identifier filter
    pub fn needs_identifier_filter(&self) -> bool {
        !matches!(self, SourceKind::OaiPmh)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = HarvestError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized = name.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "SCOPUS" => Ok(SourceKind::Scopus),
            "OPEN_ALEX" | "OPENALEX" => Ok(SourceKind::OpenAlex),
            "WEB_OF_SCIENCE" | "WOS" => Ok(SourceKind::WebOfScience),
            "OAI_PMH" | "OAI" => Ok(SourceKind::OaiPmh),
            "SKG_IF" | "SKGIF" => Ok(SourceKind::SkgIf),
            _ => Err(HarvestError::UnknownSource(name.to_string())),
        }
    }
}

/// Everything needed to (re)start one harvest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestTaskParameters {
    pub source: SourceKind,
    /// Named OAI-PMH / SKG-IF endpoint from configuration
    #[serde(default)]
    pub endpoint: Option<String>,
    /// OAI-PMH set, or the identifier filter of an API source
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub requester: Option<Owner>,
}

impl HarvestTaskParameters {
    /// Fatal-configuration checks, run before any progress is written
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.source.needs_endpoint()
            && self.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            return Err(HarvestError::EndpointNotConfigured(format!(
                "{} harvest requires an endpoint name",
                self.source
            )));
        }

        if self.source.needs_identifier_filter()
            && self.dataset.as_deref().map_or(true, |d| d.trim().is_empty())
        {
            return Err(HarvestError::MissingIdentifierFilter(self.source.to_string()));
        }

        if let (Some(from), Some(until)) = (self.from, self.until) {
            if from > until {
                return Err(HarvestError::InvalidParameters(format!(
                    "from {} is after until {}",
                    from, until
                )));
            }
        }

        Ok(())
    }

    pub fn dataset_key(&self) -> DatasetKey {
        let scope = match (&self.endpoint, &self.dataset) {
            (Some(endpoint), Some(dataset)) => format!("{}:{}", endpoint, dataset),
            (Some(endpoint), None) => endpoint.clone(),
            (None, Some(dataset)) => dataset.clone(),
            (None, None) => "*".to_string(),
        };
        DatasetKey::harvest(self.source.as_str(), &scope)
    }
}

/// Counters returned when a harvest finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestReport {
    pub pages: usize,
    pub fetched: usize,
    pub created: usize,
    pub merged: usize,
    pub duplicates: usize,
    /// Items the adapter rejected (no title, retracted, unparseable)
    pub skipped: usize,
    /// Records with nobody to attribute them to
    pub discarded: usize,
    pub restarts: u32,
}

impl HarvestReport {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Merged { .. } => self.merged += 1,
            RecordOutcome::Duplicate | RecordOutcome::SimilarDuplicate { .. } => {
                self.duplicates += 1
            }
            RecordOutcome::Discarded => self.discarded += 1,
        }
    }
}

/// What the record pipeline did with one converted record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordOutcome {
    /// Persisted as a new unloaded record
    Created,
    /// Enriched an existing record matched by DOI or metadata key
    Merged { into: String },
    /// Same identifier already stored
    Duplicate,
    /// Embedding similarity above threshold against a stored record
    SimilarDuplicate { of: String, similarity: f32 },
    /// No user or institution to attribute the record to
    Discarded,
}

/// Harvest errors
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Unknown harvest source: {0}")]
    UnknownSource(String),

    #[error("Harvest from {0} requires an identifier filter")]
    MissingIdentifierFilter(String),

    #[error("Source endpoint not configured: {0}")]
    EndpointNotConfigured(String),

    #[error("Invalid harvest parameters: {0}")]
    InvalidParameters(String),

    #[error("Transient network failure: {0}")]
    Transient(String),

    #[error("Harvest aborted after {attempts} consecutive network failures: {last_error}")]
    NetworkExhausted { attempts: u32, last_error: String },

    #[error("Malformed source response: {0}")]
    Parse(String),

    #[error(transparent)]
    Storage(#[from] biblio_common::Error),
}

impl HarvestError {
    /// Only transient failures are retried by the coordinator
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::Transient(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarvestError::UnknownSource(_)
                | HarvestError::MissingIdentifierFilter(_)
                | HarvestError::EndpointNotConfigured(_)
                | HarvestError::InvalidParameters(_)
        )
    }
}

impl From<sqlx::Error> for HarvestError {
    fn from(err: sqlx::Error) -> Self {
        HarvestError::Storage(biblio_common::Error::Database(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(source: SourceKind) -> HarvestTaskParameters {
        HarvestTaskParameters {
            source,
            endpoint: None,
            dataset: None,
            from: None,
            until: None,
            requester: None,
        }
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("open-alex".parse::<SourceKind>().unwrap(), SourceKind::OpenAlex);
        assert_eq!("WoS".parse::<SourceKind>().unwrap(), SourceKind::WebOfScience);
        let err = "crossref".parse::<SourceKind>().unwrap_err();
        assert!(matches!(err, HarvestError::UnknownSource(ref name) if name == "crossref"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_api_source_requires_filter() {
        let err = params(SourceKind::Scopus).validate().unwrap_err();
        assert!(matches!(err, HarvestError::MissingIdentifierFilter(_)));

        let mut ok = params(SourceKind::Scopus);
        ok.dataset = Some("AF-ID(60068801)".to_string());
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_oai_requires_endpoint_but_not_set() {
        let err = params(SourceKind::OaiPmh).validate().unwrap_err();
        assert!(matches!(err, HarvestError::EndpointNotConfigured(_)));

        let mut ok = params(SourceKind::OaiPmh);
        ok.endpoint = Some("repo".to_string());
        assert!(ok.validate().is_ok());
        assert_eq!(ok.dataset_key().as_str(), "HARVEST:OAI_PMH:repo");
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let mut p = params(SourceKind::OpenAlex);
        p.dataset = Some("authorships.institutions.id:I1".to_string());
        p.from = NaiveDate::from_ymd_opt(2024, 5, 1);
        p.until = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(matches!(p.validate(), Err(HarvestError::InvalidParameters(_))));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(HarvestError::Transient("refused".into()).is_transient());
        assert!(!HarvestError::Parse("bad xml".into()).is_transient());
        assert!(!HarvestError::NetworkExhausted { attempts: 3, last_error: "x".into() }.is_transient());
    }
}
