use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;

/// One degree programme as produced by ingestion. This is the source of truth
/// that chunks and index entries are derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProgrammeRecord {
    pub id: String,
    pub programme_name: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub intakes: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub overview_text: String,
    #[serde(default)]
    pub structure: Vec<YearStructure>,
    #[serde(default)]
    pub fees: FeeBreakdown,
    #[serde(default)]
    pub career_prospects: Vec<String>,
    #[serde(default)]
    pub last_fetched: Option<NaiveDate>,
    #[serde(default)]
    pub source_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct YearStructure {
    pub year: u32,
    #[serde(default)]
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FeeBreakdown {
    #[serde(default)]
    pub malaysian_rm: Option<u64>,
    #[serde(default)]
    pub international_usd: Option<u64>,
    #[serde(default)]
    pub notes: String,
}

impl FeeBreakdown {
    pub fn has_figures(&self) -> bool {
        self.malaysian_rm.is_some() || self.international_usd.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Fees,
    Structure,
    Overview,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Fees => "fees",
            Section::Structure => "structure",
            Section::Overview => "overview",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored alongside every chunk. Null values are dropped on the wire
/// because vector stores reject them in metadata maps.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub programme_name: String,
    pub section: Section,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub last_fetched: String,
}

/// One indexable fragment of a programme, keyed `{programme_id}#{section_key}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgrammeChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Conjunctive equality filter over chunk metadata. Unset fields do not constrain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct MetadataFilter {
    pub section: Option<Section>,
    pub year: Option<u32>,
    pub programme_name: Option<String>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.section.is_none() && self.year.is_none() && self.programme_name.is_none()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(section) = self.section {
            if metadata.section != section {
                return false;
            }
        }
        if let Some(year) = self.year {
            if metadata.year != Some(year) {
                return false;
            }
        }
        if let Some(programme) = &self.programme_name {
            if &metadata.programme_name != programme {
                return false;
            }
        }
        true
    }
}

/// A raw nearest-neighbour hit as reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub id: String,
    pub text: String,
    pub distance: f64,
    pub metadata: ChunkMetadata,
}

/// A query-scoped retrieval result. `rerank_score` is only set after reranking
/// with a scoring model.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
    #[serde(default)]
    pub rerank_score: Option<f64>,
}

impl From<RawMatch> for Candidate {
    fn from(value: RawMatch) -> Self {
        Self {
            id: value.id,
            text: value.text,
            score: 1.0 - value.distance,
            metadata: value.metadata,
            rerank_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResponse {
    pub results: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Intent {
    pub section: Option<Section>,
    pub year: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub overfetch_floor: usize,
    pub programme_bump: f64,
    pub resolver_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
            overfetch_floor: 20,
            programme_bump: 0.05,
            resolver_threshold: 0.35,
        }
    }
}
