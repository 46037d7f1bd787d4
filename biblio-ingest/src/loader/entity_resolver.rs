//! Entity resolver
//!
//! Looks up or creates the shared entities a record refers to: institutions,
//! persons, journals and conference events.
//!
//! **Check-then-create:**
//! 1. Lookup without any lock (fast path for entities that already exist)
//! 2. Absent: take the lock for that entity kind
//! 3. Lookup again, since a concurrent caller may have created it meanwhile
//! 4. Create only if still absent
//!
//! There is one lock per entity kind, owned by the resolver instance, so
//! creating a journal never waits on a person being created.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::LoaderError;
use crate::models::{EventStub, InstitutionStub, PersonStub};

/// Enough of a journal to find or create it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalStub {
    pub title: String,
    pub e_issn: Option<String>,
    pub print_issn: Option<String>,
}

/// Primary-domain storage for shared entities
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_institution(&self, stub: &InstitutionStub) -> biblio_common::Result<Option<i64>>;
    async fn create_institution(&self, stub: &InstitutionStub) -> biblio_common::Result<i64>;

    async fn find_person(&self, stub: &PersonStub) -> biblio_common::Result<Option<i64>>;
    async fn create_person(&self, stub: &PersonStub) -> biblio_common::Result<i64>;

    async fn find_journal(&self, stub: &JournalStub) -> biblio_common::Result<Option<i64>>;
    async fn create_journal(&self, stub: &JournalStub) -> biblio_common::Result<i64>;

    async fn find_event(&self, stub: &EventStub) -> biblio_common::Result<Option<i64>>;
    async fn create_event(&self, stub: &EventStub) -> biblio_common::Result<i64>;
}

pub struct EntityResolver {
    store: Arc<dyn EntityStore>,
    institution_lock: Mutex<()>,
    person_lock: Mutex<()>,
    journal_lock: Mutex<()>,
    event_lock: Mutex<()>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            institution_lock: Mutex::new(()),
            person_lock: Mutex::new(()),
            journal_lock: Mutex::new(()),
            event_lock: Mutex::new(()),
        }
    }

    pub async fn resolve_or_create_institution(&self, stub: &InstitutionStub) -> Result<i64, LoaderError> {
        if stub.display_name().is_none()
            && stub.scopus_afid.is_none()
            && stub.open_alex_id.is_none()
            && stub.ror.is_none()
        {
            return Err(LoaderError::InvalidRequest(
                "institution needs a name or an external id".to_string(),
            ));
        }
        resolve_or_create(
            &self.institution_lock,
            "institution",
            || self.store.find_institution(stub),
            || self.store.create_institution(stub),
        )
        .await
    }

    pub async fn resolve_or_create_person(&self, stub: &PersonStub) -> Result<i64, LoaderError> {
        if stub.name.last_name.trim().is_empty() && !stub.has_external_id() {
            return Err(LoaderError::InvalidRequest(
                "person needs a last name or an external id".to_string(),
            ));
        }
        resolve_or_create(
            &self.person_lock,
            "person",
            || self.store.find_person(stub),
            || self.store.create_person(stub),
        )
        .await
    }

    pub async fn resolve_or_create_journal(&self, stub: &JournalStub) -> Result<i64, LoaderError> {
        if stub.title.trim().is_empty() && stub.e_issn.is_none() && stub.print_issn.is_none() {
            return Err(LoaderError::InvalidRequest(
                "journal needs a title or an ISSN".to_string(),
            ));
        }
        resolve_or_create(
            &self.journal_lock,
            "journal",
            || self.store.find_journal(stub),
            || self.store.create_journal(stub),
        )
        .await
    }

    pub async fn resolve_or_create_event(&self, stub: &EventStub) -> Result<i64, LoaderError> {
        if stub.name.iter().all(|n| n.content.trim().is_empty()) {
            return Err(LoaderError::InvalidRequest("event needs a name".to_string()));
        }
        resolve_or_create(
            &self.event_lock,
            "event",
            || self.store.find_event(stub),
            || self.store.create_event(stub),
        )
        .await
    }

    /// Lookup only, for previews; never creates
    pub async fn find_institution(&self, stub: &InstitutionStub) -> Result<Option<i64>, LoaderError> {
        Ok(self.store.find_institution(stub).await?)
    }

    pub async fn find_person(&self, stub: &PersonStub) -> Result<Option<i64>, LoaderError> {
        Ok(self.store.find_person(stub).await?)
    }

    pub async fn find_journal(&self, stub: &JournalStub) -> Result<Option<i64>, LoaderError> {
        Ok(self.store.find_journal(stub).await?)
    }

    pub async fn find_event(&self, stub: &EventStub) -> Result<Option<i64>, LoaderError> {
        Ok(self.store.find_event(stub).await?)
    }
}

async fn resolve_or_create<F, FindFut, C, CreateFut>(
    lock: &Mutex<()>,
    kind: &'static str,
    find: F,
    create: C,
) -> Result<i64, LoaderError>
where
    F: Fn() -> FindFut,
    FindFut: Future<Output = biblio_common::Result<Option<i64>>>,
    C: FnOnce() -> CreateFut,
    CreateFut: Future<Output = biblio_common::Result<i64>>,
{
    if let Some(id) = find().await? {
        return Ok(id);
    }

    let _guard = lock.lock().await;
    if let Some(id) = find().await? {
        debug!(kind, id, "Entity appeared while waiting for the lock");
        return Ok(id);
    }

    let id = create().await?;
    info!(kind, id, "Created entity");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Store whose lookups are slow enough for callers to race
    #[derive(Default)]
    struct SlowStore {
        institutions: StdMutex<Vec<(String, i64)>>,
        next_id: AtomicI64,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl EntityStore for SlowStore {
        async fn find_institution(&self, stub: &InstitutionStub) -> biblio_common::Result<Option<i64>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let key = stub.scopus_afid.clone().unwrap_or_default();
            Ok(self
                .institutions
                .lock()
                .unwrap()
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, id)| *id))
        }

        async fn create_institution(&self, stub: &InstitutionStub) -> biblio_common::Result<i64> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.creates.fetch_add(1, Ordering::SeqCst);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.institutions
                .lock()
                .unwrap()
                .push((stub.scopus_afid.clone().unwrap_or_default(), id));
            Ok(id)
        }

        async fn find_person(&self, _: &PersonStub) -> biblio_common::Result<Option<i64>> {
            Ok(None)
        }
        async fn create_person(&self, _: &PersonStub) -> biblio_common::Result<i64> {
            Ok(1)
        }
        async fn find_journal(&self, _: &JournalStub) -> biblio_common::Result<Option<i64>> {
            Ok(None)
        }
        async fn create_journal(&self, _: &JournalStub) -> biblio_common::Result<i64> {
            Ok(1)
        }
        async fn find_event(&self, _: &EventStub) -> biblio_common::Result<Option<i64>> {
            Ok(None)
        }
        async fn create_event(&self, _: &EventStub) -> biblio_common::Result<i64> {
            Ok(1)
        }
    }

    fn afid(id: &str) -> InstitutionStub {
        InstitutionStub {
            scopus_afid: Some(id.to_string()),
            ..InstitutionStub::named("University")
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolution_creates_once() {
        let store = Arc::new(SlowStore::default());
        let resolver = Arc::new(EntityResolver::new(store.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            tasks.spawn(async move { resolver.resolve_or_create_institution(&afid("60000001")).await });
        }

        let mut ids = Vec::new();
        while let Some(result) = tasks.join_next().await {
            ids.push(result.unwrap().unwrap());
        }

        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn test_existing_entity_takes_fast_path() {
        let store = Arc::new(SlowStore::default());
        let resolver = EntityResolver::new(store.clone());

        let first = resolver.resolve_or_create_institution(&afid("1")).await.unwrap();
        let again = resolver.resolve_or_create_institution(&afid("1")).await.unwrap();
        let other = resolver.resolve_or_create_institution(&afid("2")).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unidentifiable_stubs_rejected() {
        let resolver = EntityResolver::new(Arc::new(SlowStore::default()));
        assert!(matches!(
            resolver.resolve_or_create_institution(&InstitutionStub::default()).await,
            Err(LoaderError::InvalidRequest(_))
        ));
        assert!(matches!(
            resolver.resolve_or_create_journal(&JournalStub::default()).await,
            Err(LoaderError::InvalidRequest(_))
        ));
        assert!(matches!(
            resolver.resolve_or_create_event(&EventStub::default()).await,
            Err(LoaderError::InvalidRequest(_))
        ));
    }
}
