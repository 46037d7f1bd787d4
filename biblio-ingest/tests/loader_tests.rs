//! Loader wizard integration tests
//!
//! Per-owner review over a real store: next / skip / mark-loaded / reset,
//! visibility by owner, and entity ids surfaced in previews.

mod helpers;

use biblio_ingest::db::entities::SqliteEntityStore;
use biblio_ingest::db::import_records;
use biblio_ingest::loader::{CreateRequest, EntityResolver, JournalStub, LoaderError, LoaderWizard};
use biblio_ingest::models::{MultilingualContent, Owner};
use helpers::{create_test_db, owned_record};
use sqlx::SqlitePool;
use std::sync::Arc;

const ALICE: Owner = Owner::User(1);
const BOB: Owner = Owner::User(2);

fn wizard(pool: &SqlitePool) -> LoaderWizard {
    let resolver = EntityResolver::new(Arc::new(SqliteEntityStore::new(pool.clone())));
    LoaderWizard::new(pool.clone(), Arc::new(resolver))
}

/// R1..R3 owned by Alice, R2 also owned by Bob
async fn seed(pool: &SqlitePool) {
    for identifier in ["R1", "R2", "R3"] {
        let mut record = owned_record(identifier, &format!("Paper {}", identifier), ALICE);
        if identifier == "R2" {
            record.add_owner(BOB);
        }
        assert!(import_records::insert_record(pool, &record).await.unwrap());
    }
}

#[tokio::test]
async fn test_next_is_stable_until_skipped() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R1");
    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R1");

    assert_eq!(wizard.skip(&ALICE).await.unwrap(), Some("R2".to_string()));
    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R2");
}

#[tokio::test]
async fn test_mark_loaded_twice_conflicts() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    wizard.next(&ALICE).await.unwrap();
    assert_eq!(wizard.mark_loaded(&ALICE).await.unwrap(), "R1");

    let err = wizard.mark_loaded(&ALICE).await.unwrap_err();
    assert!(matches!(err, LoaderError::AlreadyLoaded(ref id) if id == "R1"));

    assert_eq!(wizard.remaining(&ALICE).await.unwrap(), 2);
    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R2");
}

#[tokio::test]
async fn test_skip_without_active_record() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    assert!(matches!(wizard.skip(&ALICE).await, Err(LoaderError::NoActiveRecord)));
    assert!(matches!(wizard.mark_loaded(&ALICE).await, Err(LoaderError::NoActiveRecord)));
}

#[tokio::test]
async fn test_skip_past_end_wraps_around() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    wizard.next(&ALICE).await.unwrap();
    wizard.skip(&ALICE).await.unwrap();
    wizard.skip(&ALICE).await.unwrap();
    assert_eq!(wizard.skip(&ALICE).await.unwrap(), None);

    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R1");
}

#[tokio::test]
async fn test_owners_have_independent_cursors() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    wizard.next(&ALICE).await.unwrap();
    wizard.skip(&ALICE).await.unwrap();

    assert_eq!(wizard.next(&BOB).await.unwrap().unwrap().identifier, "R2");
    assert_eq!(wizard.remaining(&BOB).await.unwrap(), 1);
    wizard.mark_loaded(&BOB).await.unwrap();

    assert_eq!(wizard.next(&BOB).await.unwrap(), None);
    // Alice's cursor pointed at R2, which is gone now
    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R3");
}

#[tokio::test]
async fn test_system_sees_every_record() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    assert_eq!(wizard.remaining(&Owner::System).await.unwrap(), 3);
    assert_eq!(wizard.remaining(&Owner::Institution(77)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reset_returns_to_first_record() {
    let pool = create_test_db().await;
    seed(&pool).await;
    let wizard = wizard(&pool);

    wizard.next(&ALICE).await.unwrap();
    wizard.skip(&ALICE).await.unwrap();
    wizard.reset(&ALICE).await.unwrap();

    assert_eq!(wizard.next(&ALICE).await.unwrap().unwrap().identifier, "R1");
}

#[tokio::test]
async fn test_preview_reports_existing_journal() {
    let pool = create_test_db().await;
    let mut record = owned_record("R1", "Paper", ALICE);
    record.published_in = MultilingualContent::english("Journal of Graphs").into_iter().collect();
    record.e_issn = Some("1234-5678".to_string());
    import_records::insert_record(&pool, &record).await.unwrap();
    let wizard = wizard(&pool);

    let preview = wizard.next(&ALICE).await.unwrap().unwrap();
    match preview.request {
        CreateRequest::JournalPublication { journal_id, .. } => assert_eq!(journal_id, None),
        other => panic!("expected journal publication, got {:?}", other),
    }

    let journal_id = wizard
        .resolver()
        .resolve_or_create_journal(&JournalStub {
            title: "J. Graphs".to_string(),
            e_issn: Some("1234-5678".to_string()),
            print_issn: None,
        })
        .await
        .unwrap();

    let preview = wizard.next(&ALICE).await.unwrap().unwrap();
    match preview.request {
        CreateRequest::JournalPublication { journal_id: found, .. } => {
            assert_eq!(found, Some(journal_id))
        }
        other => panic!("expected journal publication, got {:?}", other),
    }
}
