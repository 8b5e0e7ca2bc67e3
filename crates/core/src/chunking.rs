use crate::models::{ChunkMetadata, ProgrammeChunk, ProgrammeRecord, Section};

const FEE_SYNONYMS: &str =
    "(synonyms: tuition, per year, annual fee, yearly cost, programme cost, price)";

fn fees_line(record: &ProgrammeRecord) -> String {
    let fees = &record.fees;
    let mut parts = Vec::new();
    if let Some(rm) = fees.malaysian_rm {
        parts.push(format!("RM{rm} (Malaysian)"));
    }
    if let Some(usd) = fees.international_usd {
        parts.push(format!("USD{usd} (International)"));
    }

    // Leads with the separator that follows the programme name in the chunk.
    let mut line = if parts.is_empty() {
        " \u{2014} Fees unavailable on source page. ".to_string()
    } else {
        format!(" \u{2014} Estimated Annual Course Fee: {}. ", parts.join("; "))
    };

    if !fees.notes.is_empty() {
        line.push_str(&format!("Note: {}. ", fees.notes));
    }

    line
}

/// Splits one programme into its retrieval units: a fees chunk (always), an
/// overview chunk when there is overview text, and one structure chunk per
/// year that lists at least one module.
///
/// Identifiers depend only on the programme id and the section, so rebuilding
/// an unchanged record yields the same ids and text. Module names are only
/// trimmed; inner spacing is kept as scraped.
pub fn build_chunks(record: &ProgrammeRecord) -> Vec<ProgrammeChunk> {
    let programme_name = record.programme_name.trim();
    let url = record.url.trim();
    let last_fetched = record
        .last_fetched
        .map(|date| date.to_string())
        .unwrap_or_default();

    let metadata = |section: Section, year: Option<u32>| ChunkMetadata {
        programme_name: programme_name.to_string(),
        section,
        year,
        url: url.to_string(),
        last_fetched: last_fetched.clone(),
    };

    let mut chunks = Vec::with_capacity(2 + record.structure.len());

    chunks.push(ProgrammeChunk {
        id: make_chunk_id(&record.id, "fees"),
        text: format!(
            "Programme: {programme_name}{}Source: {url}. {FEE_SYNONYMS}",
            fees_line(record)
        ),
        metadata: metadata(Section::Fees, None),
    });

    let overview = record.overview_text.trim();
    if !overview.is_empty() {
        chunks.push(ProgrammeChunk {
            id: make_chunk_id(&record.id, "overview"),
            text: overview.to_string(),
            metadata: metadata(Section::Overview, None),
        });
    }

    for entry in &record.structure {
        let modules = entry
            .modules
            .iter()
            .map(|module| module.trim())
            .filter(|module| !module.is_empty())
            .collect::<Vec<_>>();

        if modules.is_empty() {
            continue;
        }

        chunks.push(ProgrammeChunk {
            id: make_chunk_id(&record.id, &format!("y{}", entry.year)),
            text: format!("Year {}: {}", entry.year, modules.join("; ")),
            metadata: metadata(Section::Structure, Some(entry.year)),
        });
    }

    chunks
}

fn make_chunk_id(programme_id: &str, section_key: &str) -> String {
    format!("{programme_id}#{section_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeeBreakdown, YearStructure};
    use chrono::NaiveDate;

    fn record() -> ProgrammeRecord {
        ProgrammeRecord {
            id: "sunway:soe:bsc-computer-science".to_string(),
            programme_name: " BSc Computer Science ".to_string(),
            url: "https://example.edu/cs".to_string(),
            overview_text: "  Learn to build software.  ".to_string(),
            structure: vec![
                YearStructure {
                    year: 1,
                    modules: vec![" Programming  Principles ".to_string(), "Discrete Maths".to_string()],
                },
                YearStructure {
                    year: 2,
                    modules: vec!["   ".to_string(), String::new()],
                },
                YearStructure {
                    year: 3,
                    modules: vec!["Capstone Project".to_string()],
                },
            ],
            fees: FeeBreakdown {
                malaysian_rm: Some(38_500),
                international_usd: Some(8_900),
                notes: "Indicative only".to_string(),
            },
            last_fetched: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        }
    }

    #[test]
    fn builds_one_chunk_per_section_and_populated_year() {
        let chunks = build_chunks(&record());
        let ids = chunks.iter().map(|chunk| chunk.id.as_str()).collect::<Vec<_>>();

        assert_eq!(
            ids,
            vec![
                "sunway:soe:bsc-computer-science#fees",
                "sunway:soe:bsc-computer-science#overview",
                "sunway:soe:bsc-computer-science#y1",
                "sunway:soe:bsc-computer-science#y3",
            ]
        );
        assert_eq!(chunks[1].text, "Learn to build software.");
        assert_eq!(chunks[2].text, "Year 1: Programming  Principles; Discrete Maths");
        assert_eq!(chunks[2].metadata.section, Section::Structure);
        assert_eq!(chunks[2].metadata.year, Some(1));
        assert_eq!(chunks[0].metadata.programme_name, "BSc Computer Science");
        assert_eq!(chunks[0].metadata.last_fetched, "2024-05-01");
    }

    #[test]
    fn fees_chunk_carries_figures_and_note() {
        let chunks = build_chunks(&record());
        let fees = &chunks[0];

        assert_eq!(fees.metadata.section, Section::Fees);
        assert_eq!(fees.metadata.year, None);
        assert!(fees
            .text
            .contains("Estimated Annual Course Fee: RM38500 (Malaysian); USD8900 (International)."));
        assert!(fees.text.contains("Note: Indicative only."));
        assert!(fees.text.contains("Source: https://example.edu/cs."));
    }

    #[test]
    fn fees_chunk_text_is_stable_across_reindexing() {
        let chunks = build_chunks(&record());
        assert_eq!(
            chunks[0].text,
            "Programme: BSc Computer Science \u{2014} Estimated Annual Course Fee: \
             RM38500 (Malaysian); USD8900 (International). Note: Indicative only. \
             Source: https://example.edu/cs. \
             (synonyms: tuition, per year, annual fee, yearly cost, programme cost, price)"
        );

        let sparse = ProgrammeRecord {
            id: "x:y:z".to_string(),
            programme_name: "Diploma in Design".to_string(),
            url: "https://example.edu/design".to_string(),
            ..Default::default()
        };
        assert!(build_chunks(&sparse)[0]
            .text
            .starts_with("Programme: Diploma in Design \u{2014} Fees unavailable on source page. Source:"));
    }

    #[test]
    fn sparse_record_still_gets_a_fees_chunk() {
        let sparse = ProgrammeRecord {
            id: "x:y:z".to_string(),
            programme_name: "Diploma in Design".to_string(),
            url: "https://example.edu/design".to_string(),
            ..Default::default()
        };

        let chunks = build_chunks(&sparse);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "x:y:z#fees");
        assert!(chunks[0].text.contains("Fees unavailable on source page."));
        assert_eq!(chunks[0].metadata.last_fetched, "");
    }

    #[test]
    fn rebuilding_an_unchanged_record_is_idempotent() {
        let source = record();
        assert_eq!(build_chunks(&source), build_chunks(&source.clone()));
    }
}
