//! Scripted harvest source and converter for coordinator tests

use async_trait::async_trait;
use biblio_ingest::adapters::NativePayload;
use biblio_ingest::models::{
    DatasetKey, HarvestError, ImportRecord, MultilingualContent, PublicationType, RecordSource,
    SourceKind,
};
use biblio_ingest::services::{FetchedPage, HarvestSource, PageCursor};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Harvest source replaying a fixed sequence of page results
///
/// Every cursor it is asked for is recorded, in order.
pub struct ScriptedSource {
    dataset: String,
    responses: Mutex<VecDeque<Result<FetchedPage, HarvestError>>>,
    requested: Mutex<Vec<PageCursor>>,
}

impl ScriptedSource {
    pub fn new(dataset: &str, responses: Vec<Result<FetchedPage, HarvestError>>) -> Self {
        Self {
            dataset: dataset.to_string(),
            responses: Mutex::new(responses.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<PageCursor> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HarvestSource for ScriptedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenAlex
    }

    fn dataset_key(&self) -> DatasetKey {
        DatasetKey::harvest(SourceKind::OpenAlex.as_str(), &self.dataset)
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<FetchedPage, HarvestError> {
        self.requested.lock().unwrap().push(cursor.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HarvestError::Parse("script exhausted".to_string())))
    }
}

/// `{"id", "title", "doi"?}` item
pub fn item(id: &str, title: &str) -> Value {
    json!({ "id": id, "title": title })
}

pub fn page(items: Vec<Value>, next: Option<&str>) -> Result<FetchedPage, HarvestError> {
    Ok(FetchedPage {
        items: items.into_iter().map(NativePayload::Json).collect(),
        next: next.map(|token| PageCursor::Token(token.to_string())),
    })
}

pub fn network_failure() -> Result<FetchedPage, HarvestError> {
    Err(HarvestError::Transient("connection refused".to_string()))
}

/// Converter for [`item`] payloads; items without a title are skipped
pub fn convert_test_item(payload: &NativePayload) -> Option<ImportRecord> {
    let NativePayload::Json(value) = payload else {
        return None;
    };
    let id = value.get("id")?.as_str()?;
    let title = value.get("title")?.as_str()?;
    let mut record = ImportRecord::new(
        format!("OPEN_ALEX:{}", id),
        RecordSource::OpenAlex,
        PublicationType::JournalPublication,
    );
    record.title = MultilingualContent::english(title).into_iter().collect();
    record.doi = value.get("doi").and_then(Value::as_str).map(str::to_string);
    Some(record)
}
