pub mod chroma;
pub mod memory;

pub use chroma::{where_clause, ChromaBackend};
pub use memory::MemoryBackend;
