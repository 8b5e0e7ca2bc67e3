use crate::chunking::build_chunks;
use crate::models::ProgrammeRecord;
use crate::traits::VectorBackend;
use crate::SearchError;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexReport {
    pub programmes: usize,
    pub chunks: usize,
}

/// Last `:`-separated segment of a selector such as `sunway:soe:bsc-cs`.
fn selector_suffix(selector: &str) -> &str {
    selector.rsplit(':').next().unwrap_or(selector)
}

/// Builds chunks for each record and upserts them programme by programme.
/// With `only`, records whose id does not end with the selector's last
/// segment are left alone.
pub async fn index_records<B>(
    backend: &B,
    records: &[ProgrammeRecord],
    only: Option<&str>,
) -> Result<IndexReport, SearchError>
where
    B: VectorBackend + ?Sized,
{
    let suffix = only.map(selector_suffix);
    let mut report = IndexReport::default();

    for record in records {
        if let Some(suffix) = suffix {
            if !record.id.ends_with(suffix) {
                continue;
            }
        }

        let chunks = build_chunks(record);
        backend.upsert(&chunks).await.map_err(|error| SearchError::Stage {
            operation: format!("upsert of {}", record.id),
            source: Box::new(error),
        })?;

        debug!(programme = %record.id, chunks = chunks.len(), "programme indexed");
        report.programmes += 1;
        report.chunks += chunks.len();
    }

    info!(programmes = report.programmes, chunks = report.chunks, "index build complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::YearStructure;
    use crate::stores::MemoryBackend;
    use std::sync::Arc;

    fn records() -> Vec<ProgrammeRecord> {
        vec![
            ProgrammeRecord {
                id: "sunway:soe:bsc-computer-science".to_string(),
                programme_name: "BSc Computer Science".to_string(),
                url: "https://example.edu/cs".to_string(),
                overview_text: "Software and systems.".to_string(),
                structure: vec![YearStructure {
                    year: 1,
                    modules: vec!["Programming".to_string()],
                }],
                ..Default::default()
            },
            ProgrammeRecord {
                id: "sunway:sob:ba-business".to_string(),
                programme_name: "BA Business".to_string(),
                url: "https://example.edu/business".to_string(),
                ..Default::default()
            },
        ]
    }

    #[tokio::test]
    async fn indexes_every_record() -> Result<(), SearchError> {
        let backend = MemoryBackend::new(Arc::new(CharacterNgramEmbedder::default()));
        let report = index_records(&backend, &records(), None).await?;

        assert_eq!(report, IndexReport { programmes: 2, chunks: 4 });
        assert_eq!(backend.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn reindexing_replaces_instead_of_duplicating() -> Result<(), SearchError> {
        let backend = MemoryBackend::new(Arc::new(CharacterNgramEmbedder::default()));
        index_records(&backend, &records(), None).await?;
        index_records(&backend, &records(), None).await?;
        assert_eq!(backend.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn selector_limits_to_matching_programme() -> Result<(), SearchError> {
        let backend = MemoryBackend::new(Arc::new(CharacterNgramEmbedder::default()));
        let report = index_records(&backend, &records(), Some("sunway:sob:ba-business")).await?;

        assert_eq!(report, IndexReport { programmes: 1, chunks: 1 });
        let stored = backend.get(&["sunway:sob:ba-business#fees".to_string()]).await?;
        assert_eq!(stored.len(), 1);
        Ok(())
    }

    #[test]
    fn selector_suffix_takes_last_segment() {
        assert_eq!(selector_suffix("a:b:c"), "c");
        assert_eq!(selector_suffix("plain"), "plain");
    }
}
