//! Entity resolver concurrency tests
//!
//! Concurrent loads referencing the same new entity must create it once.

mod helpers;

use biblio_ingest::db::entities::SqliteEntityStore;
use biblio_ingest::loader::EntityResolver;
use biblio_ingest::models::{EventStub, InstitutionStub, MultilingualContent, PersonStub};
use helpers::create_test_db;
use sqlx::SqlitePool;
use std::sync::Arc;

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_institution_resolution_creates_once() {
    let pool = create_test_db().await;
    let resolver = Arc::new(EntityResolver::new(Arc::new(SqliteEntityStore::new(pool.clone()))));

    let mut stub = InstitutionStub::named("University of Novi Sad");
    stub.ror = Some("https://ror.org/00xa57a59".to_string());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let stub = stub.clone();
            tokio::spawn(async move { resolver.resolve_or_create_institution(&stub).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(count(&pool, "institutions").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_person_resolution_by_name_creates_once() {
    let pool = create_test_db().await;
    let resolver = Arc::new(EntityResolver::new(Arc::new(SqliteEntityStore::new(pool.clone()))));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let resolver = Arc::clone(&resolver);
            // Case differences still resolve to the same person
            let name = if i % 2 == 0 { "Marie Curie" } else { "MARIE CURIE" };
            tokio::spawn(async move {
                resolver
                    .resolve_or_create_person(&PersonStub::named(name))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(count(&pool, "persons").await, 1);
}

#[tokio::test]
async fn test_different_kinds_do_not_collide() {
    let pool = create_test_db().await;
    let resolver = EntityResolver::new(Arc::new(SqliteEntityStore::new(pool.clone())));

    let institution = resolver
        .resolve_or_create_institution(&InstitutionStub::named("ICSE"))
        .await
        .unwrap();
    let event = EventStub {
        name: MultilingualContent::english("ICSE").into_iter().collect(),
        date_from: Some("2024-04-14".to_string()),
        ..Default::default()
    };
    let event_id = resolver.resolve_or_create_event(&event).await.unwrap();

    assert_eq!(count(&pool, "institutions").await, 1);
    assert_eq!(count(&pool, "events").await, 1);
    assert_eq!(resolver.resolve_or_create_event(&event).await.unwrap(), event_id);
    assert_eq!(
        resolver
            .resolve_or_create_institution(&InstitutionStub::named("icse"))
            .await
            .unwrap(),
        institution
    );
}

#[tokio::test]
async fn test_same_event_name_different_dates_are_distinct() {
    let pool = create_test_db().await;
    let resolver = EntityResolver::new(Arc::new(SqliteEntityStore::new(pool.clone())));

    let edition = |date: &str| EventStub {
        name: MultilingualContent::english("SIGMOD").into_iter().collect(),
        date_from: Some(date.to_string()),
        ..Default::default()
    };

    let first = resolver.resolve_or_create_event(&edition("2023-06-18")).await.unwrap();
    let second = resolver.resolve_or_create_event(&edition("2024-06-09")).await.unwrap();

    assert_ne!(first, second);
}
