use crate::embeddings::{cosine_similarity, Embedder};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type NameLoader = Box<dyn Fn() -> Vec<String> + Send + Sync>;

struct NameIndex {
    names: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// Maps a free-text query to the closest known programme name.
///
/// Names and their embeddings are loaded on first use and shared by every
/// later call. Concurrent first callers block on the same initialisation, so
/// the corpus is read and embedded exactly once.
pub struct ProgrammeResolver<E: Embedder> {
    embedder: Arc<E>,
    threshold: f32,
    loader: NameLoader,
    index: OnceLock<NameIndex>,
}

impl<E: Embedder> ProgrammeResolver<E> {
    pub fn new<F>(embedder: Arc<E>, threshold: f32, loader: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            embedder,
            threshold,
            loader: Box::new(loader),
            index: OnceLock::new(),
        }
    }

    pub fn with_names(embedder: Arc<E>, threshold: f32, names: Vec<String>) -> Self {
        Self::new(embedder, threshold, move || names.clone())
    }

    fn index(&self) -> &NameIndex {
        self.index.get_or_init(|| {
            let names = dedupe_names((self.loader)());
            let refs = names.iter().map(String::as_str).collect::<Vec<_>>();
            let vectors = self.embedder.embed_batch(&refs);
            debug!(programmes = names.len(), "programme name cache initialised");
            NameIndex { names, vectors }
        })
    }

    pub fn names(&self) -> &[String] {
        &self.index().names
    }

    /// Returns the best-matching name when its cosine similarity reaches the
    /// threshold. On exact ties the earlier name wins.
    pub fn resolve(&self, query: &str) -> Option<String> {
        let index = self.index();
        if index.names.is_empty() {
            return None;
        }

        let query_vector = self.embedder.embed(query);
        let mut best: Option<(usize, f32)> = None;
        for (position, vector) in index.vectors.iter().enumerate() {
            let similarity = cosine_similarity(&query_vector, vector);
            if best.map_or(true, |(_, top)| similarity > top) {
                best = Some((position, similarity));
            }
        }

        let (position, similarity) = best?;
        debug!(
            candidate = %index.names[position],
            similarity,
            threshold = self.threshold,
            "programme resolution"
        );

        (similarity >= self.threshold).then(|| index.names[position].clone())
    }
}

/// Trims names, drops blanks and keeps the first spelling of each
/// case-insensitive duplicate.
pub fn dedupe_names<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}
