use crate::models::{MetadataFilter, ProgrammeChunk, RawMatch};
use crate::SearchError;
use async_trait::async_trait;

/// Vector store holding programme chunks. The store owns query embedding so
/// callers pass plain text.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Nearest neighbours of `text`, closest first, at most `limit` of them.
    async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<RawMatch>, SearchError>;

    /// Replace-by-id; re-upserting an unchanged chunk is a no-op in effect.
    async fn upsert(&self, chunks: &[ProgrammeChunk]) -> Result<(), SearchError>;

    /// Stored chunks for the ids that exist, in request order. Unknown ids are
    /// left out.
    async fn get(&self, ids: &[String]) -> Result<Vec<ProgrammeChunk>, SearchError>;
}

#[async_trait]
impl<T> VectorBackend for Box<T>
where
    T: VectorBackend + ?Sized,
{
    async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<RawMatch>, SearchError> {
        (**self).query(text, filter, limit).await
    }

    async fn upsert(&self, chunks: &[ProgrammeChunk]) -> Result<(), SearchError> {
        (**self).upsert(chunks).await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ProgrammeChunk>, SearchError> {
        (**self).get(ids).await
    }
}
