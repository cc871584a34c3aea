use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::ClassifiedRegion;
use crate::error::{Result, ScanError};
use crate::signatures::ContainerFormat;
use crate::validate::{CheckOutcome, VerdictKind, VerdictReport};

/// Scan-wide context stamped into every record.
#[derive(Debug, Clone)]
pub struct FindingContext {
    pub source_image: String,
    pub image_sha256: String,
    pub scanned_at: DateTime<Utc>,
}

/// One fully-attributed finding: where the region is, what it was labeled,
/// how the label was verified, and which image it came from. This is the
/// engine's externally visible unit of output.
#[derive(Debug, Clone, Serialize)]
pub struct FindingRecord {
    pub start: u64,
    pub end: u64,
    pub length: u64,
    pub format: ContainerFormat,
    pub confidence: f64,
    pub verdict: VerdictKind,
    pub checks: Vec<CheckOutcome>,
    pub notes: Vec<String>,
    pub source_image: String,
    pub image_sha256: String,
    pub scanned_at: DateTime<Utc>,
}

/// Joins classified regions with their verdict reports into finding records,
/// ordered by ascending start offset.
///
/// Every region must have exactly one verdict; a missing or duplicate verdict
/// means the pipeline stages disagree about what was scanned, which is an
/// internal defect rather than a property of the image.
pub fn build_findings(
    regions: Vec<ClassifiedRegion>,
    verdicts: Vec<VerdictReport>,
    context: &FindingContext,
) -> Result<Vec<FindingRecord>> {
    let mut by_start: BTreeMap<u64, VerdictReport> = BTreeMap::new();
    for report in verdicts {
        let start = report.region_start;
        if by_start.insert(start, report).is_some() {
            return Err(ScanError::InternalConsistency(format!(
                "duplicate verdict for region at {start}"
            )));
        }
    }

    let mut records = Vec::with_capacity(regions.len());
    for classified in regions {
        let region = &classified.region;
        let report = by_start.remove(&region.start).ok_or_else(|| {
            ScanError::InternalConsistency(format!(
                "no verdict produced for region at {}",
                region.start
            ))
        })?;

        // The record's offset is the container start pinned by the anchored
        // hits; entropy-only regions report the region boundary itself.
        let start = classified.container_start;

        let mut notes = Vec::new();
        if start != region.start {
            notes.push(format!(
                "container header at {} inside region opening at {}",
                start, region.start
            ));
        }
        if !region.hits.is_empty() {
            let mut summary: Vec<String> = region
                .hits
                .iter()
                .map(|h| format!("{} at {}", h.pattern_id, h.offset))
                .collect();
            summary.dedup();
            notes.push(format!("signature hits: {}", summary.join(", ")));
        }
        notes.push(format!(
            "mean entropy {:.3}, peak {:.3}",
            region.mean_entropy, region.peak_entropy
        ));
        if region.truncated {
            notes.push("region reaches the end of the image".to_owned());
        }

        records.push(FindingRecord {
            start,
            end: region.end,
            length: region.end - start,
            format: classified.label.format,
            confidence: classified.label.confidence,
            verdict: report.verdict.kind,
            checks: report.verdict.checks,
            notes,
            source_image: context.source_image.clone(),
            image_sha256: context.image_sha256.clone(),
            scanned_at: context.scanned_at,
        });
    }

    if let Some((start, _)) = by_start.into_iter().next() {
        return Err(ScanError::InternalConsistency(format!(
            "verdict for region at {start} has no matching region"
        )));
    }

    records.sort_by_key(|r| r.start);
    Ok(records)
}
