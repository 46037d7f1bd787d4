//! Record attribution
//!
//! Binds a harvested record to the internal users and institutions it
//! should be visible to. Per contribution:
//! 1. External author id (Scopus, OpenAlex, ORCID, WoS) matches a user:
//!    bind the user and their employment institutions
//! 2. Otherwise a fuzzy name match: bind only the matched user's
//!    institutions, so the record is at least visible institution-wide
//!
//! The requester of the harvest or upload is always bound.

use async_trait::async_trait;
use biblio_common::Result;
use tracing::debug;

use crate::models::{normalize_text, ImportRecord, Owner, PersonName, PersonStub};

/// Minimum Jaro-Winkler similarity for a name-only match
pub const NAME_MATCH_THRESHOLD: f64 = 0.92;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMatch {
    pub user_id: i64,
    pub institution_ids: Vec<i64>,
}

/// Known users of the primary domain
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// User carrying any of the person's external author ids
    async fn find_by_external_author_id(&self, person: &PersonStub) -> Result<Option<UserMatch>>;

    /// Best fuzzy name match at or above [`NAME_MATCH_THRESHOLD`]
    async fn search_by_name(&self, name: &PersonName) -> Result<Option<UserMatch>>;
}

/// Jaro-Winkler similarity of two normalized display names
pub fn name_similarity(a: &PersonName, b: &PersonName) -> f64 {
    strsim::jaro_winkler(
        &normalize_text(&a.display_name()),
        &normalize_text(&b.display_name()),
    )
}

/// Add owners to `record` from its contributions and the requester
pub async fn attribute(
    directory: &dyn UserDirectory,
    record: &mut ImportRecord,
    requester: Option<Owner>,
) -> Result<()> {
    if let Some(owner) = requester {
        record.add_owner(owner);
    }

    let mut owners = Vec::new();
    for contribution in &record.contributions {
        let person = &contribution.person;
        if person.has_external_id() {
            if let Some(user) = directory.find_by_external_author_id(person).await? {
                owners.push(Owner::User(user.user_id));
                owners.extend(user.institution_ids.into_iter().map(Owner::Institution));
                continue;
            }
        }
        if person.name.last_name.is_empty() {
            continue;
        }
        if let Some(user) = directory.search_by_name(&person.name).await? {
            debug!(
                record = %record.identifier,
                author = %person.name.display_name(),
                user_id = user.user_id,
                "Name-only match, binding employment institutions"
            );
            owners.extend(user.institution_ids.into_iter().map(Owner::Institution));
        }
    }

    for owner in owners {
        record.add_owner(owner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contribution, PublicationType, RecordSource};

    struct FakeDirectory;

    #[async_trait]
    impl UserDirectory for FakeDirectory {
        async fn find_by_external_author_id(&self, person: &PersonStub) -> Result<Option<UserMatch>> {
            Ok((person.orcid.as_deref() == Some("0000-0001")).then(|| UserMatch {
                user_id: 7,
                institution_ids: vec![70],
            }))
        }

        async fn search_by_name(&self, name: &PersonName) -> Result<Option<UserMatch>> {
            let known = PersonName::parse("Ana Jovanović");
            Ok((name_similarity(name, &known) >= NAME_MATCH_THRESHOLD).then(|| UserMatch {
                user_id: 8,
                institution_ids: vec![80],
            }))
        }
    }

    fn record_with(persons: Vec<PersonStub>) -> ImportRecord {
        let mut record = ImportRecord::new("R", RecordSource::OpenAlex, PublicationType::Other);
        record.contributions = persons
            .into_iter()
            .enumerate()
            .map(|(i, p)| Contribution::author(p, i as u32 + 1))
            .collect();
        record
    }

    #[tokio::test]
    async fn test_external_id_binds_user_and_institutions() {
        let mut record = record_with(vec![PersonStub {
            orcid: Some("0000-0001".to_string()),
            ..PersonStub::named("Someone Else")
        }]);
        attribute(&FakeDirectory, &mut record, None).await.unwrap();
        assert_eq!(record.owners(), vec![Owner::User(7), Owner::Institution(70)]);
    }

    #[tokio::test]
    async fn test_name_match_binds_only_institutions() {
        let mut record = record_with(vec![PersonStub::named("Ana Jovanovic")]);
        attribute(&FakeDirectory, &mut record, None).await.unwrap();
        assert_eq!(record.owners(), vec![Owner::Institution(80)]);
    }

    #[tokio::test]
    async fn test_unknown_authors_leave_only_requester() {
        let mut record = record_with(vec![PersonStub::named("Zed Unknown")]);
        attribute(&FakeDirectory, &mut record, None).await.unwrap();
        assert!(!record.has_owners());

        attribute(&FakeDirectory, &mut record, Some(Owner::User(1))).await.unwrap();
        assert_eq!(record.owners(), vec![Owner::User(1)]);
    }

    #[test]
    fn test_name_similarity_tolerates_diacritics_and_order() {
        let a = PersonName::parse("Jovanović, Ana");
        let b = PersonName::parse("Ana Jovanovic");
        assert!(name_similarity(&a, &b) >= NAME_MATCH_THRESHOLD);
        let c = PersonName::parse("Marko Petrović");
        assert!(name_similarity(&a, &c) < NAME_MATCH_THRESHOLD);
    }
}
