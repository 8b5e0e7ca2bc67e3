//! Second-stage reranking.
//!
//! A [`Reranker`] is chosen once at startup. With a scorer present every
//! (query, text) pair is scored and the list is stably sorted by that score;
//! without one the candidates pass through untouched.

use crate::models::Candidate;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Pairwise relevance model. Higher is better, no fixed range. Returns one
/// score per text, in input order.
#[async_trait]
pub trait PairScorer: Send + Sync {
    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f64>, SearchError>;
}

pub enum Reranker {
    Present(Box<dyn PairScorer>),
    Absent,
}

impl Reranker {
    pub fn from_scorer(scorer: Option<Box<dyn PairScorer>>) -> Self {
        match scorer {
            Some(scorer) => Reranker::Present(scorer),
            None => Reranker::Absent,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Reranker::Present(_))
    }

    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
    ) -> Result<Vec<Candidate>, SearchError> {
        let scorer = match self {
            Reranker::Present(scorer) => scorer,
            Reranker::Absent => return Ok(candidates),
        };
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts = candidates
            .iter()
            .map(|candidate| candidate.text.as_str())
            .collect::<Vec<_>>();
        let scores = scorer.score(query, &texts).await?;
        if scores.len() != candidates.len() {
            return Err(SearchError::BackendResponse {
                backend: "reranker".to_string(),
                details: format!("{} scores for {} candidates", scores.len(), candidates.len()),
            });
        }

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(score);
        }

        // sort_by is stable: equal scores keep their retrieval order.
        candidates.sort_by(|left, right| {
            let left = left.rerank_score.unwrap_or(f64::NEG_INFINITY);
            let right = right.rerank_score.unwrap_or(f64::NEG_INFINITY);
            right.total_cmp(&left)
        });

        Ok(candidates)
    }
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    score: f64,
}

/// Cross-encoder served over HTTP with a text-embeddings-inference style
/// `POST /rerank` endpoint.
pub struct HttpCrossEncoder {
    endpoint: Url,
    client: Client,
}

impl HttpCrossEncoder {
    pub fn new(endpoint: &str) -> Result<Self, SearchError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl PairScorer for HttpCrossEncoder {
    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f64>, SearchError> {
        let response = self
            .client
            .post(self.endpoint.join("rerank")?)
            .json(&json!({
                "query": query,
                "texts": texts,
                "raw_scores": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }

        let hits: Vec<RerankHit> = response.json().await?;
        let mut scores = vec![None; texts.len()];
        for hit in hits {
            match scores.get_mut(hit.index) {
                Some(slot) => *slot = Some(hit.score),
                None => {
                    return Err(SearchError::BackendResponse {
                        backend: "reranker".to_string(),
                        details: format!("score index {} out of range", hit.index),
                    })
                }
            }
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| {
                score.ok_or_else(|| SearchError::BackendResponse {
                    backend: "reranker".to_string(),
                    details: format!("no score returned for text {index}"),
                })
            })
            .collect()
    }
}
