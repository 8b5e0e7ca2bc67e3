use crate::error::IngestError;
use crate::models::{FeeBreakdown, ProgrammeRecord, YearStructure};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io;

static FEE_RM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)RM\s*([0-9][0-9.,]*)").unwrap());
static FEE_USD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)USD\s*([0-9][0-9.,]*)").unwrap());

const USD_INDICATIVE_NOTE: &str =
    "International students pay RM equivalent; USD is indicative based on exchange rate.";

/// Fields lifted out of a programme page by the scraper.
#[derive(Debug, Clone, Default)]
pub struct ParsedProgramme {
    pub overview_text: String,
    pub structure: Vec<YearStructure>,
    pub fees_text: String,
    pub fees_note: String,
    pub duration: Option<String>,
    pub intakes: Option<String>,
    pub career_prospects: Vec<String>,
}

/// Catalogue defaults used when the page itself does not carry a value.
#[derive(Debug, Clone, Default)]
pub struct ProgrammeMeta {
    pub programme_name: String,
    pub school: String,
    pub level: Option<String>,
    pub duration: String,
    pub intakes: Vec<String>,
}

fn first_amount(text: &str, pattern: &Regex) -> Option<u64> {
    let raw = pattern.captures(text)?.get(1)?.as_str();
    raw.replace([',', '.'], "").parse().ok()
}

pub fn parse_fees(fees_text: &str, fees_note: &str) -> FeeBreakdown {
    let malaysian_rm = first_amount(fees_text, &FEE_RM);
    let international_usd = first_amount(fees_text, &FEE_USD);

    let notes = if !fees_note.is_empty() {
        fees_note.to_string()
    } else if international_usd.is_some() {
        USD_INDICATIVE_NOTE.to_string()
    } else {
        String::new()
    };

    FeeBreakdown {
        malaysian_rm,
        international_usd,
        notes,
    }
}

/// Compact JSON with `", "` and `": "` separators, the layout the scraper
/// pipeline hashes. Stored `source_hash` values are only comparable when the
/// bytes match exactly.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// SHA-256 over the semantically meaningful fields only. Bookkeeping fields
/// (id, name, url, fetch date) never influence the result.
pub fn content_hash(record: &ProgrammeRecord) -> Result<String, IngestError> {
    // serde_json::Value objects serialize with sorted keys.
    let canonical = json!({
        "overview_text": record.overview_text,
        "structure": record.structure,
        "fees": record.fees,
        "duration": record.duration,
        "intakes": record.intakes,
        "career_prospects": record.career_prospects,
    });

    let mut encoded = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut encoded, SpacedFormatter);
    canonical.serialize(&mut serializer)?;

    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

pub fn derive_programme_id(institution: &str, school: &str, programme_name: &str) -> String {
    format!(
        "{}:{}:{}",
        slugify(institution),
        slugify(school),
        slugify(programme_name)
    )
}

pub fn build_programme_record(
    parsed: ParsedProgramme,
    meta: ProgrammeMeta,
    url: &str,
    programme_id: &str,
    fetched_on: NaiveDate,
) -> Result<ProgrammeRecord, IngestError> {
    if programme_id.trim().is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "programme id is required for {url}"
        )));
    }

    let fees = parse_fees(&parsed.fees_text, &parsed.fees_note);

    let duration = parsed
        .duration
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(meta.duration);

    let intakes = match parsed.intakes {
        Some(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        _ => meta.intakes,
    };

    let mut record = ProgrammeRecord {
        id: programme_id.to_string(),
        programme_name: meta.programme_name,
        school: meta.school,
        level: meta.level.unwrap_or_else(|| "Undergraduate".to_string()),
        duration,
        intakes,
        url: url.to_string(),
        overview_text: parsed.overview_text,
        structure: parsed.structure,
        fees,
        career_prospects: parsed.career_prospects,
        last_fetched: Some(fetched_on),
        source_hash: None,
    };
    record.source_hash = Some(content_hash(&record)?);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ProgrammeRecord {
        ProgrammeRecord {
            id: "sunway:soe:bsc-computer-science".to_string(),
            programme_name: "BSc Computer Science".to_string(),
            url: "https://example.edu/cs".to_string(),
            overview_text: "A computing degree.".to_string(),
            duration: "3 years".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn fees_are_parsed_with_separators_stripped() {
        let fees = parse_fees("Estimated annual fee RM 38,500 / USD 8,900", "");
        assert_eq!(fees.malaysian_rm, Some(38_500));
        assert_eq!(fees.international_usd, Some(8_900));
        assert_eq!(fees.notes, USD_INDICATIVE_NOTE);
    }

    #[test]
    fn fee_note_is_kept_and_missing_figures_stay_empty() {
        let fees = parse_fees("Contact admissions", "Subject to change");
        assert_eq!(fees.malaysian_rm, None);
        assert_eq!(fees.international_usd, None);
        assert_eq!(fees.notes, "Subject to change");
    }

    fn hash(record: &ProgrammeRecord) -> String {
        content_hash(record).expect("hashable record")
    }

    #[test]
    fn content_hash_matches_scraper_digests() {
        let record = ProgrammeRecord {
            overview_text: "Computer Science at Sunway \u{2014} software & \"systems\".".to_string(),
            structure: vec![
                YearStructure {
                    year: 1,
                    modules: vec![
                        "Programming Principles".to_string(),
                        "Computer Organisation".to_string(),
                    ],
                },
                YearStructure {
                    year: 2,
                    modules: vec!["Operating Systems".to_string()],
                },
            ],
            fees: FeeBreakdown {
                malaysian_rm: Some(38_500),
                international_usd: Some(8_900),
                notes: USD_INDICATIVE_NOTE.to_string(),
            },
            duration: "3 years".to_string(),
            intakes: vec!["January".to_string(), "March".to_string()],
            career_prospects: vec!["Software Engineer".to_string()],
            ..sample_record()
        };
        assert_eq!(
            hash(&record),
            "4d664ef0f4eff87c41bd8d5284da5c08fae63c603eea4e25c7ab6c941041ba5a"
        );

        let empty = ProgrammeRecord::default();
        assert_eq!(
            hash(&empty),
            "408a778bf2a13ee91b60f6d5b5695c1598b99085003d015fbffa99381f6cd313"
        );
    }

    #[test]
    fn content_hash_ignores_bookkeeping_fields() {
        let original = sample_record();
        let mut renamed = original.clone();
        renamed.programme_name = "Renamed".to_string();
        renamed.url = "https://example.edu/other".to_string();
        renamed.last_fetched = NaiveDate::from_ymd_opt(2030, 1, 1);
        renamed.source_hash = Some("stale".to_string());

        assert_eq!(hash(&original), hash(&renamed));
    }

    #[test]
    fn content_hash_tracks_meaningful_fields() {
        let original = sample_record();
        let mut changed = original.clone();
        changed.intakes.push("March".to_string());
        assert_ne!(hash(&original), hash(&changed));

        let mut changed = original.clone();
        changed.fees.malaysian_rm = Some(1);
        assert_ne!(hash(&original), hash(&changed));
    }

    #[test]
    fn programme_ids_are_slugged() {
        assert_eq!(
            derive_programme_id("Sunway", "School of Engineering & Technology", "BSc (Hons) Computer Science"),
            "sunway:school-of-engineering-technology:bsc-hons-computer-science"
        );
    }

    #[test]
    fn record_prefers_page_values_over_catalogue_defaults() {
        let parsed = ParsedProgramme {
            overview_text: "Overview".to_string(),
            fees_text: "RM40,000".to_string(),
            intakes: Some("January, March , ,August".to_string()),
            ..Default::default()
        };
        let meta = ProgrammeMeta {
            programme_name: "BSc Computer Science".to_string(),
            school: "Engineering".to_string(),
            duration: "3 years".to_string(),
            intakes: vec!["September".to_string()],
            ..Default::default()
        };
        let fetched = NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date");

        let record = build_programme_record(parsed, meta, "https://example.edu/cs", "x:y:z", fetched)
            .expect("record builds");

        assert_eq!(record.intakes, vec!["January", "March", "August"]);
        assert_eq!(record.duration, "3 years");
        assert_eq!(record.level, "Undergraduate");
        assert_eq!(record.fees.malaysian_rm, Some(40_000));
        assert_eq!(record.source_hash, Some(hash(&record)));
    }

    #[test]
    fn record_without_an_id_is_rejected() {
        let fetched = NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date");
        let result = build_programme_record(
            ParsedProgramme::default(),
            ProgrammeMeta::default(),
            "https://example.edu/cs",
            "  ",
            fetched,
        );
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }
}
