use crate::embeddings::Embedder;
use crate::intent::classify;
use crate::models::{Candidate, Intent, MetadataFilter, ProgrammeChunk, RawMatch, RetrievalConfig, SearchResponse};
use crate::rerank::Reranker;
use crate::resolver::ProgrammeResolver;
use crate::traits::VectorBackend;
use crate::SearchError;
use tracing::{debug, info};

/// Filter hints derived from the query before retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryHints {
    pub intent: Intent,
    pub programme: Option<String>,
}

/// One step of filter relaxation. Stages run in [`BackoffStage::ORDER`] until
/// one returns results; the programme match is trusted more than the
/// section/year guess, so it is the last thing dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStage {
    Full,
    ProgrammeOnly,
    Unfiltered,
}

impl BackoffStage {
    pub const ORDER: [BackoffStage; 3] = [
        BackoffStage::Full,
        BackoffStage::ProgrammeOnly,
        BackoffStage::Unfiltered,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackoffStage::Full => "full-filter",
            BackoffStage::ProgrammeOnly => "programme-only",
            BackoffStage::Unfiltered => "unfiltered",
        }
    }

    /// `None` means no filter at all.
    pub fn filter(self, hints: &QueryHints) -> Option<MetadataFilter> {
        let filter = match self {
            BackoffStage::Full => MetadataFilter {
                section: hints.intent.section,
                year: hints.intent.year,
                programme_name: hints.programme.clone(),
            },
            BackoffStage::ProgrammeOnly => MetadataFilter {
                programme_name: hints.programme.clone(),
                ..Default::default()
            },
            BackoffStage::Unfiltered => MetadataFilter::default(),
        };

        (!filter.is_empty()).then_some(filter)
    }
}

pub struct RetrievalOrchestrator<B, E>
where
    B: VectorBackend,
    E: Embedder,
{
    backend: B,
    resolver: ProgrammeResolver<E>,
    reranker: Reranker,
    config: RetrievalConfig,
}

impl<B, E> RetrievalOrchestrator<B, E>
where
    B: VectorBackend,
    E: Embedder,
{
    pub fn new(backend: B, resolver: ProgrammeResolver<E>, reranker: Reranker) -> Self {
        Self::with_config(backend, resolver, reranker, RetrievalConfig::default())
    }

    pub fn with_config(
        backend: B,
        resolver: ProgrammeResolver<E>,
        reranker: Reranker,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            backend,
            resolver,
            reranker,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn hints(&self, query: &str) -> QueryHints {
        QueryHints {
            intent: classify(query),
            programme: self.resolver.resolve(query),
        }
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        let hints = self.hints(query);
        let n_pre = top_k.max(self.config.overfetch_floor);
        let (stage, matches) = self.query_with_backoff(query, n_pre, &hints).await?;

        let mut candidates = matches.into_iter().map(Candidate::from).collect::<Vec<_>>();
        if let Some(programme) = &hints.programme {
            apply_programme_bump(&mut candidates, programme, self.config.programme_bump);
        }

        let mut candidates = self.reranker.rerank(query, candidates).await?;
        candidates.truncate(top_k);

        info!(
            query,
            top_k,
            section = ?hints.intent.section,
            year = ?hints.intent.year,
            programme = ?hints.programme,
            stage = stage.name(),
            results = candidates.len(),
            "search complete"
        );

        Ok(SearchResponse {
            results: candidates,
        })
    }

    /// Runs the backoff stages in order and returns the first non-empty hit
    /// list together with the stage that produced it. A stage whose filter was
    /// already tried is skipped. A backend failure ends the search.
    pub async fn query_with_backoff(
        &self,
        query: &str,
        n_pre: usize,
        hints: &QueryHints,
    ) -> Result<(BackoffStage, Vec<RawMatch>), SearchError> {
        let mut tried: Vec<Option<MetadataFilter>> = Vec::new();
        let mut last = (BackoffStage::Unfiltered, Vec::new());

        for stage in BackoffStage::ORDER {
            let filter = stage.filter(hints);
            if tried.contains(&filter) {
                continue;
            }

            let matches = self
                .backend
                .query(query, filter.as_ref(), n_pre)
                .await
                .map_err(|error| SearchError::Stage {
                    operation: format!("{} query", stage.name()),
                    source: Box::new(error),
                })?;

            debug!(stage = stage.name(), filter = ?filter, hits = matches.len(), "backoff stage");

            if !matches.is_empty() {
                return Ok((stage, matches));
            }
            tried.push(filter);
            last = (stage, matches);
        }

        Ok(last)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ProgrammeChunk, SearchError> {
        self.backend
            .get(&[id.to_string()])
            .await?
            .into_iter()
            .find(|chunk| chunk.id == id)
            .ok_or_else(|| SearchError::NotFound { id: id.to_string() })
    }
}

/// Adds `bump` to every candidate whose programme name equals `programme`,
/// ignoring case, whatever backoff stage produced it.
pub fn apply_programme_bump(candidates: &mut [Candidate], programme: &str, bump: f64) {
    let wanted = programme.to_lowercase();
    for candidate in candidates {
        if candidate.metadata.programme_name.to_lowercase() == wanted {
            candidate.score += bump;
        }
    }
}
