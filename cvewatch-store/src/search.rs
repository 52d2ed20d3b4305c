//! Search index repository
//!
//! Talks to an Elasticsearch-compatible REST API. Documents are the typed
//! JSON form of [`Indicator`], keyed by indicator id. Writes request a
//! synchronous refresh so a lookup issued right after `add` sees the new
//! document.
//!
//! The queries need exact `keyword` fields and a sortable creation date, which
//! dynamic mapping does not give: string fields would be analysed as `text`
//! and term filters would stop matching. Create the index with
//! [`index_mapping`] (or [`SearchRepository::create_index`]); `connect`
//! refuses an index whose mapping differs on the fields it relies on.
//!
//! Cancellation is the caller's: drop the future (for example through
//! `tokio::time::timeout`) and the request is abandoned. Nothing is retried
//! here; transport failures surface as `BackendUnavailable`.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use cvewatch_core::{Indicator, IndicatorCollection, Mention};

use crate::{IndicatorRepository, RepositoryError};

/// Search backend configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Base URL of the cluster (default: http://127.0.0.1:9200)
    pub base_url: String,
    /// Index holding indicator documents
    pub index: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Hits fetched per request when paging mention results
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9200".to_string(),
            index: "indicators".to_string(),
            timeout_secs: 30,
            page_size: 500,
        }
    }
}

impl SearchConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_index(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Index body (settings-free) with the field types the queries depend on:
///
/// | field | type |
/// |---|---|
/// | `id`, `link`, `source`, `sourceId` | `keyword` |
/// | `createdDate`, `accessedDate` | `date` |
/// | `mentions.topicName`, `mentions.mention` | `keyword` |
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "link": { "type": "keyword" },
                "source": { "type": "keyword" },
                "sourceId": { "type": "keyword" },
                "createdDate": { "type": "date" },
                "accessedDate": { "type": "date" },
                "mentions": {
                    "properties": {
                        "topicName": { "type": "keyword" },
                        "mention": { "type": "keyword" }
                    }
                }
            }
        }
    })
}

/// (field, pointer below `mappings.properties`, required type)
const REQUIRED_FIELDS: &[(&str, &str, &str)] = &[
    ("id", "/id/type", "keyword"),
    ("link", "/link/type", "keyword"),
    ("createdDate", "/createdDate/type", "date"),
    ("mentions.topicName", "/mentions/properties/topicName/type", "keyword"),
    ("mentions.mention", "/mentions/properties/mention/type", "keyword"),
];

/// Check a `GET /{index}` response body against [`REQUIRED_FIELDS`]
fn check_mapping(index: &str, body: &Value) -> Result<(), RepositoryError> {
    // keyed by the concrete index name, which differs from `index` for aliases
    let properties = body
        .as_object()
        .and_then(|indices| indices.values().next())
        .and_then(|settings| settings.pointer("/mappings/properties"))
        .unwrap_or(&Value::Null);

    for (field, pointer, expected) in REQUIRED_FIELDS {
        let actual = properties.pointer(pointer).and_then(Value::as_str);
        if actual != Some(*expected) {
            return Err(RepositoryError::BackendUnavailable(format!(
                "Index {} maps {} as {}, expected {}",
                index,
                field,
                actual.unwrap_or("nothing"),
                expected
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    found: bool,
    #[serde(rename = "_source")]
    source: Option<Indicator>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: Indicator,
    /// Sort values, fed back as `search_after` for the next page
    #[serde(default)]
    sort: Vec<Value>,
}

/// Newest document with exactly this link. Equal creation dates fall back to
/// the larger id, the same order the memory adapter uses.
pub(crate) fn link_query(link: &str) -> Value {
    json!({
        "query": {
            "constant_score": {
                "filter": {
                    "term": { "link": link }
                }
            }
        },
        "sort": [{ "createdDate": "desc" }, { "id": "desc" }],
        "size": 1
    })
}

/// One page of the conjunctive exact-term filter on a mention's topic and
/// text, oldest first
pub(crate) fn mention_query(
    mention: &Mention,
    size: usize,
    search_after: Option<&[Value]>,
) -> Value {
    let mut query = json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "mentions.topicName": mention.topic_name } },
                    { "term": { "mentions.mention": mention.mention } }
                ]
            }
        },
        "sort": [{ "createdDate": "asc" }, { "id": "asc" }],
        "size": size
    });
    if let Some(after) = search_after {
        query["search_after"] = Value::from(after.to_vec());
    }
    query
}

/// Repository backed by a remote search index
#[derive(Debug, Clone)]
pub struct SearchRepository {
    client: Client,
    config: SearchConfig,
}

impl SearchRepository {
    /// Build the client without contacting the cluster
    pub fn new(config: SearchConfig) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                RepositoryError::BackendUnavailable(format!("Failed to build client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Build the client and check that the index exists
    pub async fn connect(config: SearchConfig) -> Result<Self, RepositoryError> {
        let repo = Self::new(config)?;
        repo.check_index().await?;
        info!(
            "Connected to search index {} at {}",
            repo.config.index, repo.config.base_url
        );
        Ok(repo)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Check the configured index is reachable and mapped for exact lookups
    pub async fn check_index(&self) -> Result<(), RepositoryError> {
        let url = self.endpoint(&[])?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let reason = error_reason(response).await;
            return Err(RepositoryError::BackendUnavailable(format!(
                "Index {} not available ({}): {}",
                self.config.index, status, reason
            )));
        }

        let body = response.text().await?;
        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            RepositoryError::BackendUnavailable(format!(
                "Index {} description unreadable: {}",
                self.config.index, e
            ))
        })?;
        check_mapping(&self.config.index, &parsed)
    }

    /// Create the configured index with [`index_mapping`]
    pub async fn create_index(&self) -> Result<(), RepositoryError> {
        let url = self.endpoint(&[])?;
        info!("Creating search index {}", self.config.index);

        let response = self.client.put(url).json(&index_mapping()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => {
                // resource_already_exists_exception
                let reason = error_reason(response).await;
                if reason.contains("already exists") {
                    Err(RepositoryError::AlreadyExists(self.config.index.clone()))
                } else {
                    Err(RepositoryError::Rejected { status: 400, reason })
                }
            }
            _ => Err(rejected(response).await),
        }
    }

    /// `{base_url}/{index}/{segments...}`
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RepositoryError> {
        let invalid = || {
            RepositoryError::BackendUnavailable(format!(
                "Invalid base URL: {}",
                self.config.base_url
            ))
        };

        let mut url = Url::parse(&self.config.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(&self.config.index)
            .extend(segments);
        Ok(url)
    }

    async fn search_with_query(&self, query: Value) -> Result<Vec<SearchHit>, RepositoryError> {
        let url = self.endpoint(&["_search"])?;
        debug!("Searching {} with {}", self.config.index, query);

        let response = self.client.post(url).json(&query).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body = response.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| RepositoryError::MalformedRecord(format!("search response: {}", e)))?;

        debug!("Search returned {} hits", parsed.hits.hits.len());
        Ok(parsed.hits.hits)
    }
}

/// Best-effort reason extracted from an error response body
async fn error_reason(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

    parsed["error"]["root_cause"][0]["reason"]
        .as_str()
        .or_else(|| parsed["error"]["reason"].as_str())
        .or_else(|| parsed["error"].as_str())
        .map(str::to_string)
        .unwrap_or(body)
}

async fn rejected(response: Response) -> RepositoryError {
    let status = response.status().as_u16();
    let reason = error_reason(response).await;
    warn!("Search backend rejected request ({}): {}", status, reason);
    RepositoryError::Rejected { status, reason }
}

#[async_trait]
impl IndicatorRepository for SearchRepository {
    async fn add(&self, indicator: Indicator) -> Result<(), RepositoryError> {
        let url = self.endpoint(&["_create", indicator.id()])?;
        debug!("Indexing indicator {}", indicator.id());

        let response = self
            .client
            .put(url)
            .query(&[("refresh", "true")])
            .json(&indicator)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(RepositoryError::AlreadyExists(indicator.id().to_string())),
            _ => Err(rejected(response).await),
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Indicator, RepositoryError> {
        let url = self.endpoint(&["_doc", id])?;
        debug!("Fetching indicator {}", id);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(rejected(response).await);
        }

        let body = response.text().await?;
        let parsed: GetResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            // a 404 without a document envelope means the index itself is gone
            Err(_) if status == StatusCode::NOT_FOUND => {
                return Err(RepositoryError::Rejected {
                    status: status.as_u16(),
                    reason: body,
                })
            }
            Err(e) => {
                return Err(RepositoryError::MalformedRecord(format!(
                    "get response: {}",
                    e
                )))
            }
        };

        match parsed {
            GetResponse {
                found: true,
                source: Some(indicator),
            } => Ok(indicator),
            GetResponse { found: true, .. } => Err(RepositoryError::MalformedRecord(format!(
                "document {} has no source",
                id
            ))),
            GetResponse { found: false, .. } => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn get_by_link(&self, link: &str) -> Result<Option<Indicator>, RepositoryError> {
        let hits = self.search_with_query(link_query(link)).await?;
        Ok(hits.into_iter().next().map(|hit| hit.source))
    }

    async fn get_by_mention(
        &self,
        mention: &Mention,
    ) -> Result<IndicatorCollection, RepositoryError> {
        let page_size = self.config.page_size.max(1);
        let mut found = IndicatorCollection::new();
        let mut after: Option<Vec<Value>> = None;

        loop {
            let query = mention_query(mention, page_size, after.as_deref());
            let hits = self.search_with_query(query).await?;
            let last_page = hits.len() < page_size;

            after = match hits.last() {
                Some(hit) if hit.sort.is_empty() => {
                    return Err(RepositoryError::MalformedRecord(
                        "search hit without sort values".to_string(),
                    ))
                }
                Some(hit) => Some(hit.sort.clone()),
                None => None,
            };
            for hit in hits {
                found.append(hit.source);
            }

            if last_page {
                break;
            }
        }

        debug!("Mention {} matched {} indicators", mention.mention, found.len());
        Ok(found)
    }
}
