//! Deep merge
//!
//! Enriches a stored record with what a later, lower-priority record adds.
//!
//! **Rules:**
//! - Scalars are copied only into absent or blank target fields
//! - Multilingual lists gain entries for languages the target lacks
//!   (keywords are unioned by normalized text instead)
//! - URIs, owners and contributions are unioned; a contribution matching an
//!   existing one by external id or normalized name only fills its gaps
//! - Nothing is ever removed from the target; identifier, source and the
//!   loaded flag are never touched

use crate::models::{
    normalize_text, Contribution, EventStub, ImportRecord, InstitutionStub, MultilingualContent,
    PersonStub, PublicationType,
};

/// Merge `source` into `target`; returns whether `target` changed
pub fn deep_merge(target: &mut ImportRecord, source: &ImportRecord) -> bool {
    let before = target.clone();

    if target.publication_type == PublicationType::Other {
        target.publication_type = source.publication_type;
    }

    merge_by_language(&mut target.title, &source.title);
    merge_by_language(&mut target.subtitle, &source.subtitle);
    merge_by_language(&mut target.description, &source.description);
    merge_by_language(&mut target.published_in, &source.published_in);
    merge_by_content(&mut target.keywords, &source.keywords);

    fill(&mut target.document_date, &source.document_date);
    fill(&mut target.volume, &source.volume);
    fill(&mut target.issue, &source.issue);
    fill(&mut target.start_page, &source.start_page);
    fill(&mut target.end_page, &source.end_page);
    fill(&mut target.publisher, &source.publisher);
    fill(&mut target.language, &source.language);
    fill(&mut target.doi, &source.doi);
    fill(&mut target.isbn, &source.isbn);
    fill(&mut target.e_issn, &source.e_issn);
    fill(&mut target.print_issn, &source.print_issn);
    fill(&mut target.scopus_id, &source.scopus_id);
    fill(&mut target.open_alex_id, &source.open_alex_id);
    fill(&mut target.web_of_science_id, &source.web_of_science_id);
    if target.number_of_pages.is_none() {
        target.number_of_pages = source.number_of_pages;
    }
    if target.embedding.is_none() {
        target.embedding = source.embedding.clone();
    }

    target.uris.extend(source.uris.iter().cloned());
    target.import_users_id.extend(source.import_users_id.iter().copied());
    target
        .import_institutions_id
        .extend(source.import_institutions_id.iter().copied());

    merge_event(&mut target.event, &source.event);
    merge_contributions(&mut target.contributions, &source.contributions);

    *target != before
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn fill(target: &mut Option<String>, source: &Option<String>) {
    if is_blank(target) && !is_blank(source) {
        *target = source.clone();
    }
}

fn merge_by_language(target: &mut Vec<MultilingualContent>, source: &[MultilingualContent]) {
    for entry in source {
        if entry.content.trim().is_empty() {
            continue;
        }
        let same_language = target
            .iter_mut()
            .find(|t| t.language_tag.eq_ignore_ascii_case(&entry.language_tag));
        match same_language {
            Some(existing) if existing.content.trim().is_empty() => {
                existing.content = entry.content.clone();
            }
            Some(_) => {}
            None => {
                let priority = target.iter().map(|t| t.priority).max().unwrap_or(0) + 1;
                target.push(MultilingualContent::new(
                    entry.language_tag.clone(),
                    entry.content.clone(),
                    priority,
                ));
            }
        }
    }
}

fn merge_by_content(target: &mut Vec<MultilingualContent>, source: &[MultilingualContent]) {
    for entry in source {
        let key = normalize_text(&entry.content);
        if key.is_empty() {
            continue;
        }
        if !target.iter().any(|t| normalize_text(&t.content) == key) {
            target.push(entry.clone());
        }
    }
}

fn merge_event(target: &mut Option<EventStub>, source: &Option<EventStub>) {
    let Some(source) = source else {
        return;
    };
    match target {
        None => *target = Some(source.clone()),
        Some(event) => {
            merge_by_language(&mut event.name, &source.name);
            fill(&mut event.date_from, &source.date_from);
            fill(&mut event.date_to, &source.date_to);
            fill(&mut event.place, &source.place);
        }
    }
}

fn same_external_id(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
}

fn same_person(a: &PersonStub, b: &PersonStub) -> bool {
    if same_external_id(&a.orcid, &b.orcid)
        || same_external_id(&a.scopus_author_id, &b.scopus_author_id)
        || same_external_id(&a.open_alex_id, &b.open_alex_id)
        || same_external_id(&a.web_of_science_id, &b.web_of_science_id)
    {
        return true;
    }
    let name_a = normalize_text(&a.name.display_name());
    !name_a.is_empty() && name_a == normalize_text(&b.name.display_name())
}

fn same_institution(a: &InstitutionStub, b: &InstitutionStub) -> bool {
    if same_external_id(&a.scopus_afid, &b.scopus_afid)
        || same_external_id(&a.open_alex_id, &b.open_alex_id)
        || same_external_id(&a.ror, &b.ror)
    {
        return true;
    }
    match (a.display_name(), b.display_name()) {
        (Some(a), Some(b)) => normalize_text(a) == normalize_text(b),
        _ => false,
    }
}

fn merge_person(target: &mut PersonStub, source: &PersonStub) {
    fill(&mut target.orcid, &source.orcid);
    fill(&mut target.scopus_author_id, &source.scopus_author_id);
    fill(&mut target.open_alex_id, &source.open_alex_id);
    fill(&mut target.web_of_science_id, &source.web_of_science_id);
    if target.name.first_name.trim().is_empty() {
        target.name.first_name = source.name.first_name.clone();
    }
    fill(&mut target.name.middle_name, &source.name.middle_name);
}

fn merge_institutions(target: &mut Vec<InstitutionStub>, source: &[InstitutionStub]) {
    for institution in source {
        match target.iter_mut().find(|t| same_institution(t, institution)) {
            Some(existing) => {
                fill(&mut existing.scopus_afid, &institution.scopus_afid);
                fill(&mut existing.open_alex_id, &institution.open_alex_id);
                fill(&mut existing.ror, &institution.ror);
                merge_by_language(&mut existing.name, &institution.name);
            }
            None => target.push(institution.clone()),
        }
    }
}

fn merge_contributions(target: &mut Vec<Contribution>, source: &[Contribution]) {
    for contribution in source {
        let existing = target
            .iter_mut()
            .find(|t| t.role == contribution.role && same_person(&t.person, &contribution.person));
        match existing {
            Some(existing) => {
                merge_person(&mut existing.person, &contribution.person);
                merge_institutions(&mut existing.institutions, &contribution.institutions);
                existing.is_corresponding |= contribution.is_corresponding;
            }
            None => {
                let order_number = target
                    .iter()
                    .filter(|t| t.role == contribution.role)
                    .map(|t| t.order_number)
                    .max()
                    .map_or(1, |max| max + 1);
                let mut added = contribution.clone();
                added.order_number = order_number;
                target.push(added);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Owner, RecordSource};

    fn base() -> ImportRecord {
        let mut record = ImportRecord::new(
            "SCOPUS:2-s2.0-1",
            RecordSource::Scopus,
            PublicationType::JournalPublication,
        );
        record.title.push(MultilingualContent::new("EN", "Trusted title", 1));
        record.doi = Some("10.1/abc".to_string());
        record.volume = Some("12".to_string());
        record.add_owner(Owner::User(1));
        record
    }

    #[test]
    fn test_fills_gaps_without_overwriting() {
        let mut target = base();
        let mut source = ImportRecord::new(
            "OPENALEX:W1",
            RecordSource::OpenAlex,
            PublicationType::ProceedingsPublication,
        );
        source.title.push(MultilingualContent::new("EN", "Other title", 1));
        source.description.push(MultilingualContent::new("EN", "An abstract", 1));
        source.volume = Some("99".to_string());
        source.issue = Some("3".to_string());
        source.add_owner(Owner::Institution(5));

        assert!(deep_merge(&mut target, &source));
        assert_eq!(target.identifier, "SCOPUS:2-s2.0-1");
        assert_eq!(target.source, RecordSource::Scopus);
        assert_eq!(target.publication_type, PublicationType::JournalPublication);
        assert_eq!(target.primary_title(), Some("Trusted title"));
        assert_eq!(target.description[0].content, "An abstract");
        assert_eq!(target.volume.as_deref(), Some("12"));
        assert_eq!(target.issue.as_deref(), Some("3"));
        assert_eq!(target.owners(), vec![Owner::User(1), Owner::Institution(5)]);
    }

    #[test]
    fn test_blank_scalar_counts_as_absent() {
        let mut target = base();
        target.publisher = Some("  ".to_string());
        let mut source = base();
        source.publisher = Some("Elsevier".to_string());
        deep_merge(&mut target, &source);
        assert_eq!(target.publisher.as_deref(), Some("Elsevier"));
    }

    #[test]
    fn test_contributions_union_and_enrich() {
        let mut target = base();
        target.contributions.push(Contribution::author(PersonStub::named("Ana Kovač"), 1));

        let mut source = base();
        let mut same = PersonStub::named("Ana Kovač");
        same.orcid = Some("0000-0002-0000-0001".to_string());
        let mut with_affiliation = Contribution::author(same, 1);
        with_affiliation.institutions.push(InstitutionStub::named("FTN"));
        source.contributions.push(with_affiliation);
        source.contributions.push(Contribution::author(PersonStub::named("Ivan Ilić"), 2));

        deep_merge(&mut target, &source);
        assert_eq!(target.contributions.len(), 2);
        let first = &target.contributions[0];
        assert_eq!(first.person.orcid.as_deref(), Some("0000-0002-0000-0001"));
        assert_eq!(first.institutions.len(), 1);
        assert_eq!(target.contributions[1].order_number, 2);
    }

    #[test]
    fn test_keywords_unioned_by_normalized_text() {
        let mut target = base();
        target.keywords.push(MultilingualContent::new("EN", "Machine Learning", 1));
        let mut source = base();
        source.keywords.push(MultilingualContent::new("EN", "machine learning", 1));
        source.keywords.push(MultilingualContent::new("EN", "Graphs", 2));
        deep_merge(&mut target, &source);
        let keywords: Vec<&str> = target.keywords.iter().map(|k| k.content.as_str()).collect();
        assert_eq!(keywords, vec!["Machine Learning", "Graphs"]);
    }

    #[test]
    fn test_merging_identical_record_changes_nothing() {
        let mut target = base();
        assert!(!deep_merge(&mut target, &base()));
    }
}
