//! Canonical import record
//!
//! The normalized in-flight shape of one harvested or uploaded item. Every
//! source adapter produces this; the deduplicator, deep merge and loader
//! wizard consume it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::Owner;

/// Publication type tag selecting the create-request shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationType {
    JournalPublication,
    ProceedingsPublication,
    Monograph,
    Thesis,
    Dataset,
    Other,
}

impl PublicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationType::JournalPublication => "JOURNAL_PUBLICATION",
            PublicationType::ProceedingsPublication => "PROCEEDINGS_PUBLICATION",
            PublicationType::Monograph => "MONOGRAPH",
            PublicationType::Thesis => "THESIS",
            PublicationType::Dataset => "DATASET",
            PublicationType::Other => "OTHER",
        }
    }

    /// Map a free-form source type label ("Journal Article", "conference-paper", "JOUR")
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        let label = label.replace(['-', '_'], " ");
        match label.as_str() {
            "ar" | "re" | "jour" | "ejour" | "article" | "journal article" | "journal"
            | "review" | "letter" | "editorial" | "journal publication" => {
                PublicationType::JournalPublication
            }
            "cp" | "conf" | "cpaper" | "inproceedings" | "conference paper"
            | "conference proceedings" | "proceedings article" | "proceedings"
            | "proceedings publication" | "conference" => PublicationType::ProceedingsPublication,
            "bk" | "book" | "monograph" | "ch" | "chap" | "book chapter" | "book section"
            | "incollection" => PublicationType::Monograph,
            "thes" | "thesis" | "phdthesis" | "mastersthesis" | "dissertation" => {
                PublicationType::Thesis
            }
            "data" | "dataset" => PublicationType::Dataset,
            other if other.contains("conference") || other.contains("proceedings") => {
                PublicationType::ProceedingsPublication
            }
            other if other.contains("journal") || other.contains("article") => {
                PublicationType::JournalPublication
            }
            _ => PublicationType::Other,
        }
    }
}

/// Origin of an import record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordSource {
    Scopus,
    OpenAlex,
    WebOfScience,
    OaiPmh,
    SkgIf,
    Bibtex,
    Ris,
    Endnote,
    Csv,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Scopus => "SCOPUS",
            RecordSource::OpenAlex => "OPEN_ALEX",
            RecordSource::WebOfScience => "WEB_OF_SCIENCE",
            RecordSource::OaiPmh => "OAI_PMH",
            RecordSource::SkgIf => "SKG_IF",
            RecordSource::Bibtex => "BIBTEX",
            RecordSource::Ris => "RIS",
            RecordSource::Endnote => "ENDNOTE",
            RecordSource::Csv => "CSV",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (language, text, priority) tuple of multilingual content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilingualContent {
    pub language_tag: String,
    pub content: String,
    pub priority: i32,
}

impl MultilingualContent {
    pub fn new(language_tag: impl Into<String>, content: impl Into<String>, priority: i32) -> Self {
        Self {
            language_tag: language_tag.into(),
            content: content.into(),
            priority,
        }
    }

    /// Single English entry at priority 1, or `None` for blank text
    pub fn english(content: &str) -> Option<Self> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::new("EN", trimmed, 1))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
}

impl PersonName {
    /// Parse "Last, First Middle" or "First Middle Last"
    pub fn parse(full_name: &str) -> Self {
        let full_name = full_name.trim();
        if let Some((last, rest)) = full_name.split_once(',') {
            let mut given = rest.split_whitespace();
            let first_name = given.next().unwrap_or_default().to_string();
            let middle: Vec<&str> = given.collect();
            return Self {
                first_name,
                middle_name: (!middle.is_empty()).then(|| middle.join(" ")),
                last_name: last.trim().to_string(),
            };
        }

        let parts: Vec<&str> = full_name.split_whitespace().collect();
        match parts.as_slice() {
            [] => Self::default(),
            [single] => Self {
                first_name: String::new(),
                middle_name: None,
                last_name: single.to_string(),
            },
            [first, middle @ .., last] => Self {
                first_name: first.to_string(),
                middle_name: (!middle.is_empty()).then(|| middle.join(" ")),
                last_name: last.to_string(),
            },
        }
    }

    pub fn display_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Enough of a person to resolve or create the real entity later
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonStub {
    pub name: PersonName,
    pub scopus_author_id: Option<String>,
    pub open_alex_id: Option<String>,
    pub orcid: Option<String>,
    pub web_of_science_id: Option<String>,
}

impl PersonStub {
    pub fn named(full_name: &str) -> Self {
        Self {
            name: PersonName::parse(full_name),
            ..Default::default()
        }
    }

    pub fn has_external_id(&self) -> bool {
        self.scopus_author_id.is_some()
            || self.open_alex_id.is_some()
            || self.orcid.is_some()
            || self.web_of_science_id.is_some()
    }
}

/// Enough of an institution to resolve or create the real entity later
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionStub {
    pub name: Vec<MultilingualContent>,
    pub scopus_afid: Option<String>,
    pub open_alex_id: Option<String>,
    pub ror: Option<String>,
}

impl InstitutionStub {
    pub fn named(name: &str) -> Self {
        Self {
            name: MultilingualContent::english(name).into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.first().map(|n| n.content.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionRole {
    Author,
    Editor,
    Advisor,
    BoardMember,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub person: PersonStub,
    pub institutions: Vec<InstitutionStub>,
    pub role: ContributionRole,
    pub order_number: u32,
    #[serde(default)]
    pub is_corresponding: bool,
}

impl Contribution {
    pub fn author(person: PersonStub, order_number: u32) -> Self {
        Self {
            person,
            institutions: Vec::new(),
            role: ContributionRole::Author,
            order_number,
            is_corresponding: false,
        }
    }
}

/// Conference stub for proceedings-type records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStub {
    pub name: Vec<MultilingualContent>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub place: Option<String>,
}

/// Canonical import record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Source-stable key, unique per record
    pub identifier: String,
    pub source: RecordSource,
    pub publication_type: PublicationType,

    #[serde(default)]
    pub title: Vec<MultilingualContent>,
    #[serde(default)]
    pub subtitle: Vec<MultilingualContent>,
    #[serde(default)]
    pub description: Vec<MultilingualContent>,
    #[serde(default)]
    pub keywords: Vec<MultilingualContent>,
    #[serde(default)]
    pub published_in: Vec<MultilingualContent>,

    pub document_date: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub start_page: Option<String>,
    pub end_page: Option<String>,
    pub number_of_pages: Option<u32>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub uris: BTreeSet<String>,

    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub e_issn: Option<String>,
    pub print_issn: Option<String>,
    pub scopus_id: Option<String>,
    pub open_alex_id: Option<String>,
    pub web_of_science_id: Option<String>,

    #[serde(default)]
    pub contributions: Vec<Contribution>,
    pub event: Option<EventStub>,

    /// Stored in its own column, never part of the flattened document
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub import_users_id: BTreeSet<i64>,
    #[serde(default)]
    pub import_institutions_id: BTreeSet<i64>,
    #[serde(default)]
    pub loaded: bool,
}

impl ImportRecord {
    pub fn new(
        identifier: impl Into<String>,
        source: RecordSource,
        publication_type: PublicationType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            source,
            publication_type,
            title: Vec::new(),
            subtitle: Vec::new(),
            description: Vec::new(),
            keywords: Vec::new(),
            published_in: Vec::new(),
            document_date: None,
            volume: None,
            issue: None,
            start_page: None,
            end_page: None,
            number_of_pages: None,
            publisher: None,
            language: None,
            uris: BTreeSet::new(),
            doi: None,
            isbn: None,
            e_issn: None,
            print_issn: None,
            scopus_id: None,
            open_alex_id: None,
            web_of_science_id: None,
            contributions: Vec::new(),
            event: None,
            embedding: None,
            import_users_id: BTreeSet::new(),
            import_institutions_id: BTreeSet::new(),
            loaded: false,
        }
    }

    pub fn primary_title(&self) -> Option<&str> {
        self.title
            .iter()
            .min_by_key(|t| t.priority)
            .map(|t| t.content.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn publication_year(&self) -> Option<i32> {
        self.document_date
            .as_deref()
            .and_then(biblio_common::time::extract_year)
    }

    /// Normalized title + year + venue key for cross-source matching
    ///
    /// `None` when title or year is missing: a title alone is too weak.
    pub fn metadata_key(&self) -> Option<String> {
        let title = normalize_text(self.primary_title()?);
        if title.is_empty() {
            return None;
        }
        let year = self.publication_year()?;
        let venue = self
            .published_in
            .first()
            .map(|v| normalize_text(&v.content))
            .unwrap_or_default();
        Some(format!("{}|{}|{}", title, year, venue))
    }

    /// Content-only JSON used as embedding input
    ///
    /// Identifier, ownership and load state are excluded so the same work
    /// from two sources flattens to near-identical text.
    pub fn flatten_for_embedding(&self) -> String {
        let mut value = match serde_json::to_value(self) {
            Ok(value) => value,
            Err(_) => return String::new(),
        };
        if let Some(map) = value.as_object_mut() {
            for key in [
                "identifier",
                "source",
                "import_users_id",
                "import_institutions_id",
                "loaded",
                "scopus_id",
                "open_alex_id",
                "web_of_science_id",
                "uris",
            ] {
                map.remove(key);
            }
        }
        value.to_string()
    }

    pub fn owners(&self) -> Vec<Owner> {
        self.import_users_id
            .iter()
            .map(|id| Owner::User(*id))
            .chain(self.import_institutions_id.iter().map(|id| Owner::Institution(*id)))
            .collect()
    }

    pub fn add_owner(&mut self, owner: Owner) {
        match owner {
            Owner::User(id) => {
                self.import_users_id.insert(id);
            }
            Owner::Institution(id) => {
                self.import_institutions_id.insert(id);
            }
            Owner::System => {}
        }
    }

    pub fn has_owners(&self) -> bool {
        !self.import_users_id.is_empty() || !self.import_institutions_id.is_empty()
    }
}

/// Normalize a DOI to its bare lower-case `10.x/y` form
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let bare = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "doi:",
    ]
    .iter()
    .find_map(|prefix| lowered.strip_prefix(prefix))
    .unwrap_or(&lowered)
    .trim();

    bare.starts_with("10.").then(|| bare.to_string())
}

/// Lower-case alphanumeric words separated by single spaces
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImportRecord {
        let mut record = ImportRecord::new(
            "SCOPUS:2-s2.0-1",
            RecordSource::Scopus,
            PublicationType::JournalPublication,
        );
        record.title.push(MultilingualContent::new("EN", "Deep  Learning: A Survey", 1));
        record.published_in.push(MultilingualContent::new("EN", "Journal of AI", 1));
        record.document_date = Some("2021-03-04".to_string());
        record
    }

    #[test]
    fn test_normalize_doi_strips_prefixes() {
        assert_eq!(normalize_doi("https://doi.org/10.1/ABC"), Some("10.1/abc".to_string()));
        assert_eq!(normalize_doi("doi:10.1/abc "), Some("10.1/abc".to_string()));
        assert_eq!(normalize_doi("10.1/ABC"), Some("10.1/abc".to_string()));
        assert_eq!(normalize_doi("not-a-doi"), None);
    }

    #[test]
    fn test_metadata_key_requires_title_and_year() {
        let record = sample();
        assert_eq!(
            record.metadata_key().as_deref(),
            Some("deep learning a survey|2021|journal of ai")
        );

        let mut undated = sample();
        undated.document_date = None;
        assert_eq!(undated.metadata_key(), None);
    }

    #[test]
    fn test_person_name_parsing() {
        let comma = PersonName::parse("Curie, Marie Salomea");
        assert_eq!(comma.last_name, "Curie");
        assert_eq!(comma.first_name, "Marie");
        assert_eq!(comma.middle_name.as_deref(), Some("Salomea"));

        let spaced = PersonName::parse("Ada King Lovelace");
        assert_eq!(spaced.first_name, "Ada");
        assert_eq!(spaced.last_name, "Lovelace");
        assert_eq!(spaced.display_name(), "Ada King Lovelace");
    }

    #[test]
    fn test_publication_type_labels() {
        assert_eq!(PublicationType::from_label("Journal Article"), PublicationType::JournalPublication);
        assert_eq!(PublicationType::from_label("cp"), PublicationType::ProceedingsPublication);
        assert_eq!(PublicationType::from_label("inproceedings"), PublicationType::ProceedingsPublication);
        assert_eq!(PublicationType::from_label("THES"), PublicationType::Thesis);
        assert_eq!(PublicationType::from_label("poster"), PublicationType::Other);
    }

    #[test]
    fn test_flatten_excludes_ownership_and_identifier() {
        let mut a = sample();
        a.add_owner(Owner::User(1));
        let mut b = sample();
        b.identifier = "OPEN_ALEX:W1".to_string();
        b.source = RecordSource::OpenAlex;
        b.loaded = true;

        assert_eq!(a.flatten_for_embedding(), b.flatten_for_embedding());
        assert!(!a.flatten_for_embedding().contains("SCOPUS:2-s2.0-1"));
    }

    #[test]
    fn test_owners_listing() {
        let mut record = sample();
        record.add_owner(Owner::User(5));
        record.add_owner(Owner::Institution(2));
        record.add_owner(Owner::System);
        assert_eq!(record.owners(), vec![Owner::User(5), Owner::Institution(2)]);
    }
}
