use crate::embeddings::{cosine_similarity, Embedder};
use crate::models::{MetadataFilter, ProgrammeChunk, RawMatch};
use crate::traits::VectorBackend;
use crate::SearchError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

struct StoredChunk {
    chunk: ProgrammeChunk,
    embedding: Vec<f32>,
}

/// In-process store with brute-force cosine search. Distances are reported as
/// `1 - cosine`, the same space a cosine-configured vector database uses.
pub struct MemoryBackend<E: Embedder> {
    embedder: Arc<E>,
    entries: RwLock<BTreeMap<String, StoredChunk>>,
}

impl<E: Embedder> MemoryBackend<E> {
    pub fn new(embedder: Arc<E>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SearchError {
    SearchError::BackendResponse {
        backend: "memory".to_string(),
        details: "store lock poisoned".to_string(),
    }
}

#[async_trait]
impl<E: Embedder> VectorBackend for MemoryBackend<E> {
    async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<RawMatch>, SearchError> {
        let query_vector = self.embedder.embed(text);
        let entries = self.entries.read().map_err(|_| poisoned())?;

        let mut matches = entries
            .values()
            .filter(|entry| filter.map_or(true, |filter| filter.matches(&entry.chunk.metadata)))
            .map(|entry| RawMatch {
                id: entry.chunk.id.clone(),
                text: entry.chunk.text.clone(),
                distance: 1.0 - f64::from(cosine_similarity(&query_vector, &entry.embedding)),
                metadata: entry.chunk.metadata.clone(),
            })
            .collect::<Vec<_>>();

        matches.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn upsert(&self, chunks: &[ProgrammeChunk]) -> Result<(), SearchError> {
        let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed_batch(&texts);

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            entries.insert(
                chunk.id.clone(),
                StoredChunk {
                    chunk: chunk.clone(),
                    embedding,
                },
            );
        }
        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ProgrammeChunk>, SearchError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id))
            .map(|entry| entry.chunk.clone())
            .collect())
    }
}
