pub mod chunking;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod intent;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod rerank;
pub mod resolver;
pub mod stores;
pub mod traits;

pub use chunking::build_chunks;
pub use corpus::{
    discover_record_files, load_corpus, read_record, validate_record, CorpusReport, SkippedRecord,
};
pub use embeddings::{cosine_similarity, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use ingest::{index_records, IndexReport};
pub use intent::classify;
pub use models::{
    Candidate, ChunkMetadata, FeeBreakdown, Intent, MetadataFilter, ProgrammeChunk,
    ProgrammeRecord, RawMatch, RetrievalConfig, SearchResponse, Section, YearStructure,
};
pub use normalize::{
    build_programme_record, content_hash, derive_programme_id, parse_fees, ParsedProgramme,
    ProgrammeMeta,
};
pub use orchestrator::{apply_programme_bump, BackoffStage, QueryHints, RetrievalOrchestrator};
pub use rerank::{HttpCrossEncoder, PairScorer, Reranker};
pub use resolver::{dedupe_names, ProgrammeResolver};
pub use stores::{ChromaBackend, MemoryBackend};
pub use traits::VectorBackend;
