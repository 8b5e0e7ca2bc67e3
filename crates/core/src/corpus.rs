use crate::error::IngestError;
use crate::models::ProgrammeRecord;
use crate::normalize::content_hash;
use crate::resolver::dedupe_names;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;
use walkdir::WalkDir;

pub fn discover_record_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn validate_record(record: &ProgrammeRecord) -> Result<(), IngestError> {
    let invalid = |field: &'static str, reason: String| IngestError::InvalidRecord {
        id: record.id.clone(),
        field,
        reason,
    };

    if record.id.trim().is_empty() {
        return Err(invalid("id", "is empty".to_string()));
    }
    if record.programme_name.trim().is_empty() {
        return Err(invalid("programme_name", "is empty".to_string()));
    }
    Url::parse(record.url.trim()).map_err(|error| invalid("url", error.to_string()))?;

    let mut years = HashSet::new();
    for entry in &record.structure {
        if entry.year == 0 {
            return Err(invalid("structure", "year numbers start at 1".to_string()));
        }
        if !years.insert(entry.year) {
            return Err(invalid("structure", format!("year {} listed twice", entry.year)));
        }
    }

    if let Some(stored) = &record.source_hash {
        let computed = content_hash(record)?;
        if stored != &computed {
            return Err(invalid(
                "source_hash",
                format!("does not match content (expected {computed})"),
            ));
        }
    }

    Ok(())
}

pub fn read_record(path: &Path) -> Result<ProgrammeRecord, IngestError> {
    let bytes = fs::read(path)?;
    let record: ProgrammeRecord = serde_json::from_slice(&bytes)?;
    validate_record(&record)?;
    Ok(record)
}

pub struct SkippedRecord {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Default)]
pub struct CorpusReport {
    pub records: Vec<ProgrammeRecord>,
    pub skipped_files: Vec<SkippedRecord>,
}

impl CorpusReport {
    /// Display names in corpus order, case-insensitively deduplicated.
    pub fn programme_names(&self) -> Vec<String> {
        dedupe_names(self.records.iter().map(|record| record.programme_name.clone()))
    }
}

/// Loads every `*.json` record under `folder`, skipping files that fail to
/// decode or validate. Records come back sorted by id so name resolution does
/// not depend on directory listing order. A missing folder is an empty corpus.
pub fn load_corpus(folder: &Path) -> CorpusReport {
    let mut report = CorpusReport::default();
    let mut seen_ids = HashSet::new();

    for path in discover_record_files(folder) {
        match read_record(&path) {
            Ok(record) if !seen_ids.insert(record.id.clone()) => {
                warn!(path = %path.display(), id = %record.id, "duplicate programme id");
                report.skipped_files.push(SkippedRecord {
                    path,
                    reason: format!("duplicate programme id {}", record.id),
                });
            }
            Ok(record) => report.records.push(record),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped programme record");
                report.skipped_files.push(SkippedRecord {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    report.records.sort_by(|left, right| left.id.cmp(&right.id));
    report
}
