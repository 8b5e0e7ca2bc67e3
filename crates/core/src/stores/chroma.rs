use crate::embeddings::Embedder;
use crate::models::{ChunkMetadata, MetadataFilter, ProgrammeChunk, RawMatch};
use crate::traits::VectorBackend;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::info;
use url::Url;

/// HTTP adapter for a Chroma server. Embeddings are computed client-side so
/// the query and index vectors always come from the same model.
pub struct ChromaBackend<E: Embedder> {
    endpoint: Url,
    collection: String,
    client: Client,
    embedder: Arc<E>,
    collection_id: OnceLock<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<ChunkMetadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<ChunkMetadata>>>,
}

impl<E: Embedder> ChromaBackend<E> {
    pub fn new(endpoint: &str, collection: impl Into<String>, embedder: Arc<E>) -> Result<Self, SearchError> {
        let endpoint = Url::parse(endpoint)?;
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(SearchError::Configuration(
                "collection name is required".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            collection,
            client: Client::new(),
            embedder,
            collection_id: OnceLock::new(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, SearchError> {
        Ok(self.endpoint.join(path)?)
    }

    fn collection_id(&self) -> Result<&str, SearchError> {
        self.collection_id
            .get()
            .map(String::as_str)
            .ok_or_else(|| SearchError::NotReady(format!("collection {} not ensured", self.collection)))
    }

    /// Gets or creates the collection in cosine space and remembers its id.
    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        if self.collection_id.get().is_some() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.url("api/v1/collections")?)
            .json(&json!({
                "name": self.collection,
                "metadata": {"hnsw:space": "cosine"},
                "get_or_create": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: CollectionResponse = response.json().await?;
        info!(collection = %self.collection, id = %parsed.id, "chroma collection ready");
        let _ = self.collection_id.set(parsed.id);
        Ok(())
    }

    async fn post(&self, action: &str, body: Value) -> Result<reqwest::Response, SearchError> {
        let id = self.collection_id()?;
        let response = self
            .client
            .post(self.url(&format!("api/v1/collections/{id}/{action}"))?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: format!("{action} returned {status}: {body}"),
            });
        }

        Ok(response)
    }
}

/// Chroma `where` clause: a single term stands alone, several are joined
/// under `$and`, an empty filter produces no clause at all.
pub fn where_clause(filter: &MetadataFilter) -> Option<Value> {
    let mut terms = Vec::new();
    if let Some(section) = filter.section {
        terms.push(json!({"section": {"$eq": section.as_str()}}));
    }
    if let Some(year) = filter.year {
        terms.push(json!({"year": {"$eq": year}}));
    }
    if let Some(programme) = &filter.programme_name {
        terms.push(json!({"programme_name": {"$eq": programme}}));
    }

    match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(json!({"$and": terms})),
    }
}

fn malformed(details: impl Into<String>) -> SearchError {
    SearchError::BackendResponse {
        backend: "chroma".to_string(),
        details: details.into(),
    }
}

#[async_trait]
impl<E: Embedder> VectorBackend for ChromaBackend<E> {
    async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<RawMatch>, SearchError> {
        let query_vector = self.embedder.embed(text);
        if query_vector.len() != self.embedder.dimensions() {
            return Err(SearchError::Configuration(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.embedder.dimensions()
            )));
        }

        let mut body = json!({
            "query_embeddings": [query_vector],
            "n_results": limit,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = filter.and_then(where_clause) {
            body["where"] = clause;
        }

        let parsed: QueryResponse = self.post("query", body).await?.json().await?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed
            .documents
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default();
        let metadatas = parsed
            .metadatas
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default();

        if documents.len() != ids.len() || metadatas.len() != ids.len() || distances.len() != ids.len() {
            return Err(malformed("query columns have mismatched lengths"));
        }

        ids.into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, text), metadata), distance)| {
                let metadata = metadata.ok_or_else(|| malformed(format!("{id} has no metadata")))?;
                Ok(RawMatch {
                    id,
                    text: text.unwrap_or_default(),
                    distance,
                    metadata,
                })
            })
            .collect()
    }

    async fn upsert(&self, chunks: &[ProgrammeChunk]) -> Result<(), SearchError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed_batch(&texts);
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != self.embedder.dimensions()) {
            return Err(SearchError::Configuration(format!(
                "embedding dimension {} != {}",
                bad.len(),
                self.embedder.dimensions()
            )));
        }

        let body = json!({
            "ids": chunks.iter().map(|chunk| &chunk.id).collect::<Vec<_>>(),
            "embeddings": embeddings,
            "documents": texts,
            "metadatas": chunks.iter().map(|chunk| &chunk.metadata).collect::<Vec<_>>(),
        });

        self.post("upsert", body).await?;
        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ProgrammeChunk>, SearchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "ids": ids,
            "include": ["documents", "metadatas"],
        });
        let parsed: GetResponse = self.post("get", body).await?.json().await?;

        let documents = parsed.documents.unwrap_or_default();
        let metadatas = parsed.metadatas.unwrap_or_default();
        if documents.len() != parsed.ids.len() || metadatas.len() != parsed.ids.len() {
            return Err(malformed("get columns have mismatched lengths"));
        }

        let mut found = parsed
            .ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .map(|((id, text), metadata)| {
                let metadata = metadata.ok_or_else(|| malformed(format!("{id} has no metadata")))?;
                Ok(ProgrammeChunk {
                    id,
                    text: text.unwrap_or_default(),
                    metadata,
                })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        // Chroma does not promise request order.
        found.sort_by_key(|chunk| ids.iter().position(|id| id == &chunk.id));
        Ok(found)
    }
}
