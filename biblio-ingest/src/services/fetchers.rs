//! Harvest sources
//!
//! A [`HarvestSource`] fetches one page of native items for a cursor and
//! says where the next page starts. Two HTTP implementations:
//! - [`OaiPmhSource`]: `ListRecords` with resumption tokens; an absent or
//!   empty token ends the harvest
//! - [`JsonApiSource`]: offset-paginated (page shorter than the page size
//!   ends the harvest) or cursor-token paginated JSON APIs, results located
//!   with a JSON pointer
//!
//! Connection failures and non-2xx statuses are `Transient`; a body that
//! does not parse is `Parse`. Both wait on a per-source `governor` limiter
//! before every request.

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::adapters::oai_pmh::parse_list_records;
use crate::adapters::NativePayload;
use crate::models::{DatasetKey, HarvestError, SourceKind};

const USER_AGENT: &str = concat!("biblio-ingest/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Where a page starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Start,
    /// Opaque token handed back by the source
    Token(String),
    /// 1-based page number
    Offset { page: u32, page_size: u32 },
}

/// Stored-token tag; offsets are stored untagged as `page:pageSize`
const TOKEN_TAG: &str = "token:";

impl PageCursor {
    /// Progress Store form; `Start` is never stored
    ///
    /// Tokens are tagged so one shaped like `500:100` never reads back as an
    /// offset.
    pub fn to_progress(&self) -> Option<String> {
        match self {
            PageCursor::Start => None,
            PageCursor::Token(token) => Some(format!("{}{}", TOKEN_TAG, token)),
            PageCursor::Offset { page, page_size } => Some(format!("{}:{}", page, page_size)),
        }
    }

    /// Inverse of [`PageCursor::to_progress`]
    ///
    /// An untagged value that is not a `page:pageSize` pair is taken as a
    /// token, which keeps cursors written without the tag readable.
    pub fn from_progress(stored: &str) -> Self {
        if let Some(token) = stored.strip_prefix(TOKEN_TAG) {
            return if token.is_empty() {
                PageCursor::Start
            } else {
                PageCursor::Token(token.to_string())
            };
        }
        if let Some((page, page_size)) = stored.split_once(':') {
            if let (Ok(page), Ok(page_size)) = (page.parse::<u32>(), page_size.parse::<u32>()) {
                if page > 0 && page_size > 0 {
                    return PageCursor::Offset { page, page_size };
                }
            }
        }
        if stored.is_empty() {
            PageCursor::Start
        } else {
            PageCursor::Token(stored.to_string())
        }
    }
}

/// One fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub items: Vec<NativePayload>,
    /// `None` when this was the last page
    pub next: Option<PageCursor>,
}

#[async_trait]
pub trait HarvestSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn dataset_key(&self) -> DatasetKey;

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<FetchedPage, HarvestError>;
}

fn http_client() -> Result<Client, HarvestError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| HarvestError::InvalidParameters(format!("HTTP client: {}", e)))
}

fn limiter(requests_per_second: u32) -> DirectLimiter {
    let quota = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(quota))
}

/// Send and read the body, classifying failures
async fn send(request: RequestBuilder) -> Result<String, HarvestError> {
    let response = request
        .send()
        .await
        .map_err(|e| HarvestError::Transient(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::Transient(format!("HTTP {}", status.as_u16())));
    }

    response
        .text()
        .await
        .map_err(|e| HarvestError::Transient(e.to_string()))
}

/// OAI-PMH repository, Dublin Core records
pub struct OaiPmhSource {
    client: Client,
    limiter: DirectLimiter,
    endpoint_name: String,
    base_url: String,
    metadata_prefix: String,
    set: Option<String>,
    from: Option<NaiveDate>,
    until: Option<NaiveDate>,
}

impl OaiPmhSource {
    pub fn new(
        endpoint_name: impl Into<String>,
        base_url: impl Into<String>,
        metadata_prefix: impl Into<String>,
        requests_per_second: u32,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            client: http_client()?,
            limiter: limiter(requests_per_second),
            endpoint_name: endpoint_name.into(),
            base_url: base_url.into(),
            metadata_prefix: metadata_prefix.into(),
            set: None,
            from: None,
            until: None,
        })
    }

    pub fn with_set(mut self, set: Option<String>) -> Self {
        self.set = set.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.from = from;
        self.until = until;
        self
    }

    fn request(&self, cursor: &PageCursor) -> RequestBuilder {
        let mut query: Vec<(&str, String)> = vec![("verb", "ListRecords".to_string())];
        match cursor {
            PageCursor::Token(token) => query.push(("resumptionToken", token.clone())),
            PageCursor::Start | PageCursor::Offset { .. } => {
                query.push(("metadataPrefix", self.metadata_prefix.clone()));
                if let Some(set) = &self.set {
                    query.push(("set", set.clone()));
                }
                if let Some(from) = self.from {
                    query.push(("from", from.format("%Y-%m-%d").to_string()));
                }
                if let Some(until) = self.until {
                    query.push(("until", until.format("%Y-%m-%d").to_string()));
                }
            }
        }
        self.client.get(&self.base_url).query(&query)
    }
}

#[async_trait]
impl HarvestSource for OaiPmhSource {
    fn kind(&self) -> SourceKind {
        SourceKind::OaiPmh
    }

    fn dataset_key(&self) -> DatasetKey {
        let scope = match &self.set {
            Some(set) => format!("{}:{}", self.endpoint_name, set),
            None => self.endpoint_name.clone(),
        };
        DatasetKey::harvest(SourceKind::OaiPmh.as_str(), &scope)
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<FetchedPage, HarvestError> {
        self.limiter.until_ready().await;
        debug!(endpoint = %self.endpoint_name, cursor = ?cursor, "Fetching OAI-PMH page");

        let body = send(self.request(cursor)).await?;
        let page = parse_list_records(&body)?;

        Ok(FetchedPage {
            items: page.records.into_iter().map(NativePayload::OaiPmh).collect(),
            next: page.resumption_token.map(PageCursor::Token),
        })
    }
}

/// How a JSON API pages its results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// `page=<n>&page_size=<m>` style, 1-based
    PageNumber { page_param: String, size_param: String },
    /// `start=<item offset>&count=<m>` style
    ItemOffset { start_param: String, count_param: String },
    /// Opaque cursor: `cursor=*` first, next value read at `next_pointer`
    CursorToken { cursor_param: String, size_param: String, next_pointer: String },
}

/// How date bounds reach a JSON API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateBounds {
    Unsupported,
    /// Separate query parameters
    Params { from: String, until: String },
    /// Extra `key:value` clauses appended to the filter expression
    FilterClauses { from: String, until: String },
}

/// How the API key is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyPlacement {
    Header(String),
    Query(String),
}

/// Everything that distinguishes one JSON API from another
#[derive(Debug, Clone)]
pub struct JsonApiProfile {
    pub kind: SourceKind,
    /// Resource path appended to the base URL
    pub resource: String,
    pub filter_param: String,
    pub results_pointer: String,
    pub pagination: Pagination,
    pub dates: DateBounds,
    pub api_key: ApiKeyPlacement,
}

impl JsonApiProfile {
    pub fn for_source(kind: SourceKind) -> Result<Self, HarvestError> {
        let profile = match kind {
            SourceKind::Scopus => Self {
                kind,
                resource: "/content/search/scopus".to_string(),
                filter_param: "query".to_string(),
                results_pointer: "/search-results/entry".to_string(),
                pagination: Pagination::ItemOffset {
                    start_param: "start".to_string(),
                    count_param: "count".to_string(),
                },
                dates: DateBounds::Unsupported,
                api_key: ApiKeyPlacement::Header("X-ELS-APIKey".to_string()),
            },
            SourceKind::OpenAlex => Self {
                kind,
                resource: "/works".to_string(),
                filter_param: "filter".to_string(),
                results_pointer: "/results".to_string(),
                pagination: Pagination::CursorToken {
                    cursor_param: "cursor".to_string(),
                    size_param: "per-page".to_string(),
                    next_pointer: "/meta/next_cursor".to_string(),
                },
                dates: DateBounds::FilterClauses {
                    from: "from_publication_date".to_string(),
                    until: "to_publication_date".to_string(),
                },
                api_key: ApiKeyPlacement::Query("api_key".to_string()),
            },
            SourceKind::WebOfScience => Self {
                kind,
                resource: "/documents".to_string(),
                filter_param: "q".to_string(),
                results_pointer: "/hits".to_string(),
                pagination: Pagination::PageNumber {
                    page_param: "page".to_string(),
                    size_param: "limit".to_string(),
                },
                dates: DateBounds::Unsupported,
                api_key: ApiKeyPlacement::Header("X-ApiKey".to_string()),
            },
            SourceKind::SkgIf => Self {
                kind,
                resource: "/products".to_string(),
                filter_param: "filter".to_string(),
                results_pointer: "/results".to_string(),
                pagination: Pagination::PageNumber {
                    page_param: "page".to_string(),
                    size_param: "page_size".to_string(),
                },
                dates: DateBounds::Params {
                    from: "from".to_string(),
                    until: "to".to_string(),
                },
                api_key: ApiKeyPlacement::Header("Authorization".to_string()),
            },
            SourceKind::OaiPmh => {
                return Err(HarvestError::InvalidParameters(
                    "OAI-PMH is not a JSON API".to_string(),
                ))
            }
        };
        Ok(profile)
    }
}

pub struct JsonApiSource {
    client: Client,
    limiter: DirectLimiter,
    profile: JsonApiProfile,
    base_url: String,
    api_key: Option<String>,
    scope: String,
    filter: Option<String>,
    from: Option<NaiveDate>,
    until: Option<NaiveDate>,
    page_size: u32,
}

impl JsonApiSource {
    pub fn new(
        profile: JsonApiProfile,
        base_url: impl Into<String>,
        page_size: u32,
        requests_per_second: u32,
    ) -> Result<Self, HarvestError> {
        let base_url: String = base_url.into();
        Ok(Self {
            client: http_client()?,
            limiter: limiter(requests_per_second),
            profile,
            scope: base_url.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            filter: None,
            from: None,
            until: None,
            page_size: page_size.max(1),
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Identifier filter; also names the dataset for progress tracking
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        if let Some(filter) = &filter {
            self.scope = filter.clone();
        }
        self.filter = filter;
        self
    }

    /// Progress scope; defaults to the filter, else the base URL
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.from = from;
        self.until = until;
        self
    }

    fn filter_expression(&self) -> Option<String> {
        let mut clauses: Vec<String> = self.filter.iter().cloned().collect();
        if let DateBounds::FilterClauses { from, until } = &self.profile.dates {
            if let Some(date) = self.from {
                clauses.push(format!("{}:{}", from, date.format("%Y-%m-%d")));
            }
            if let Some(date) = self.until {
                clauses.push(format!("{}:{}", until, date.format("%Y-%m-%d")));
            }
        }
        (!clauses.is_empty()).then(|| clauses.join(","))
    }

    fn request(&self, cursor: &PageCursor) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, self.profile.resource);
        let mut query: Vec<(String, String)> = Vec::new();

        if let Some(filter) = self.filter_expression() {
            query.push((self.profile.filter_param.clone(), filter));
        }
        if let DateBounds::Params { from, until } = &self.profile.dates {
            if let Some(date) = self.from {
                query.push((from.clone(), date.format("%Y-%m-%d").to_string()));
            }
            if let Some(date) = self.until {
                query.push((until.clone(), date.format("%Y-%m-%d").to_string()));
            }
        }

        let (page, page_size) = match cursor {
            PageCursor::Offset { page, page_size } => (*page, *page_size),
            _ => (1, self.page_size),
        };
        match &self.profile.pagination {
            Pagination::PageNumber { page_param, size_param } => {
                query.push((page_param.clone(), page.to_string()));
                query.push((size_param.clone(), page_size.to_string()));
            }
            Pagination::ItemOffset { start_param, count_param } => {
                let start = (page.saturating_sub(1)) as u64 * page_size as u64;
                query.push((start_param.clone(), start.to_string()));
                query.push((count_param.clone(), page_size.to_string()));
            }
            Pagination::CursorToken { cursor_param, size_param, .. } => {
                let token = match cursor {
                    PageCursor::Token(token) => token.clone(),
                    _ => "*".to_string(),
                };
                query.push((cursor_param.clone(), token));
                query.push((size_param.clone(), self.page_size.to_string()));
            }
        }

        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            match &self.profile.api_key {
                ApiKeyPlacement::Header(name) => request = request.header(name.as_str(), key.as_str()),
                ApiKeyPlacement::Query(name) => query.push((name.clone(), key.clone())),
            }
        }
        request.query(&query)
    }

    fn next_cursor(&self, cursor: &PageCursor, body: &Value, item_count: usize) -> Option<PageCursor> {
        match &self.profile.pagination {
            Pagination::CursorToken { next_pointer, .. } => {
                if item_count == 0 {
                    return None;
                }
                body.pointer(next_pointer)
                    .and_then(Value::as_str)
                    .filter(|token| !token.is_empty())
                    .map(|token| PageCursor::Token(token.to_string()))
            }
            _ => {
                let (page, page_size) = match cursor {
                    PageCursor::Offset { page, page_size } => (*page, *page_size),
                    _ => (1, self.page_size),
                };
                (item_count >= page_size as usize).then(|| PageCursor::Offset {
                    page: page + 1,
                    page_size,
                })
            }
        }
    }
}

#[async_trait]
impl HarvestSource for JsonApiSource {
    fn kind(&self) -> SourceKind {
        self.profile.kind
    }

    fn dataset_key(&self) -> DatasetKey {
        DatasetKey::harvest(self.profile.kind.as_str(), &self.scope)
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<FetchedPage, HarvestError> {
        self.limiter.until_ready().await;
        debug!(source = %self.profile.kind, cursor = ?cursor, "Fetching JSON page");

        let body = send(self.request(cursor)).await?;
        let body: Value = serde_json::from_str(&body)
            .map_err(|e| HarvestError::Parse(format!("{} response: {}", self.profile.kind, e)))?;

        let items = match body.pointer(&self.profile.results_pointer) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(HarvestError::Parse(format!(
                    "{} results at {} are not an array: {}",
                    self.profile.kind,
                    self.profile.results_pointer,
                    other
                )))
            }
        };

        let next = self.next_cursor(cursor, &body, items.len());
        Ok(FetchedPage {
            items: items.into_iter().map(NativePayload::Json).collect(),
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_of(request: RequestBuilder) -> String {
        let request = request.build().unwrap();
        request.url().query().unwrap_or_default().to_string()
    }

    #[test]
    fn test_cursor_progress_form() {
        let offset = PageCursor::Offset { page: 3, page_size: 50 };
        assert_eq!(offset.to_progress().as_deref(), Some("3:50"));
        assert_eq!(PageCursor::from_progress("3:50"), offset);

        let token = PageCursor::Token("oai:token:xyz".to_string());
        assert_eq!(token.to_progress().as_deref(), Some("token:oai:token:xyz"));
        assert_eq!(PageCursor::from_progress("token:oai:token:xyz"), token);
        assert_eq!(PageCursor::from_progress("oai:token:xyz"), token);

        assert_eq!(PageCursor::Start.to_progress(), None);
        assert_eq!(PageCursor::from_progress(""), PageCursor::Start);
    }

    #[test]
    fn test_numeric_resumption_token_stays_a_token() {
        let token = PageCursor::Token("500:100".to_string());
        let stored = token.to_progress().unwrap();
        let restored = PageCursor::from_progress(&stored);
        assert_eq!(restored, token);

        let source = OaiPmhSource::new("repo", "https://repo.example.org/oai", "oai_dc", 5).unwrap();
        assert_eq!(
            query_of(source.request(&restored)),
            "verb=ListRecords&resumptionToken=500%3A100"
        );
    }

    #[test]
    fn test_oai_first_page_and_token_requests() {
        let source = OaiPmhSource::new("repo", "https://repo.example.org/oai", "oai_dc", 5)
            .unwrap()
            .with_set(Some("theses".to_string()))
            .with_dates(NaiveDate::from_ymd_opt(2024, 1, 1), None);

        let first = query_of(source.request(&PageCursor::Start));
        assert_eq!(first, "verb=ListRecords&metadataPrefix=oai_dc&set=theses&from=2024-01-01");

        let next = query_of(source.request(&PageCursor::Token("abc".to_string())));
        assert_eq!(next, "verb=ListRecords&resumptionToken=abc");
        assert_eq!(source.dataset_key().as_str(), "HARVEST:OAI_PMH:repo:theses");
    }

    #[test]
    fn test_offset_request_and_short_page_ends() {
        let profile = JsonApiProfile::for_source(SourceKind::SkgIf).unwrap();
        let source = JsonApiSource::new(profile, "https://graph.example.org/", 2, 5)
            .unwrap()
            .with_filter(Some("relevant_organisations:ror:1".to_string()));

        let cursor = PageCursor::Offset { page: 2, page_size: 2 };
        let query = query_of(source.request(&cursor));
        assert!(query.contains("page=2&page_size=2"));

        let full = source.next_cursor(&cursor, &json!({}), 2);
        assert_eq!(full, Some(PageCursor::Offset { page: 3, page_size: 2 }));
        assert_eq!(source.next_cursor(&cursor, &json!({}), 1), None);
    }

    #[test]
    fn test_scopus_item_offset_and_key_header() {
        let profile = JsonApiProfile::for_source(SourceKind::Scopus).unwrap();
        let source = JsonApiSource::new(profile, "https://api.elsevier.com", 25, 5)
            .unwrap()
            .with_api_key(Some("secret".to_string()))
            .with_filter(Some("AF-ID(60068801)".to_string()));

        let request = source
            .request(&PageCursor::Offset { page: 3, page_size: 25 })
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/content/search/scopus");
        assert!(request.url().query().unwrap().contains("start=50&count=25"));
        assert_eq!(request.headers()["X-ELS-APIKey"], "secret");
    }

    #[test]
    fn test_openalex_cursor_tokens_and_date_clauses() {
        let profile = JsonApiProfile::for_source(SourceKind::OpenAlex).unwrap();
        let source = JsonApiSource::new(profile, "https://api.openalex.org", 100, 5)
            .unwrap()
            .with_filter(Some("authorships.institutions.id:I1".to_string()))
            .with_dates(NaiveDate::from_ymd_opt(2023, 1, 1), None);

        assert_eq!(
            source.filter_expression().as_deref(),
            Some("authorships.institutions.id:I1,from_publication_date:2023-01-01")
        );
        assert!(query_of(source.request(&PageCursor::Start)).contains("cursor=*"));

        let body = json!({"meta": {"next_cursor": "IlsxN"}});
        assert_eq!(
            source.next_cursor(&PageCursor::Start, &body, 100),
            Some(PageCursor::Token("IlsxN".to_string()))
        );
        assert_eq!(source.next_cursor(&PageCursor::Start, &json!({"meta": {"next_cursor": null}}), 3), None);
        assert_eq!(source.dataset_key().as_str(), "HARVEST:OPEN_ALEX:authorships.institutions.id:I1");
    }
}
