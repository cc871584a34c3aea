use std::collections::HashSet;

use serde::Serialize;

use crate::aggregate::CandidateRegion;
use crate::signatures::{Anchor, ContainerFormat, FormatSpec, SignatureRegistry};

const SIGNATURE_WEIGHT: f64 = 0.5;
const ENTROPY_WEIGHT: f64 = 0.3;
const SIZE_WEIGHT: f64 = 0.2;

/// Entropy distance at which the closeness component bottoms out.
const ENTROPY_TOLERANCE: f64 = 0.25;

/// Format assignment with its confidence in [0, 1]. Every region gets exactly
/// one label; sub-floor regions become `Unknown` but keep their best score so
/// they survive for manual review.
#[derive(Debug, Clone, Serialize)]
pub struct FormatLabel {
    pub format: ContainerFormat,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct ClassifiedRegion {
    pub region: CandidateRegion,
    pub label: FormatLabel,
    /// First byte of the container itself. Signature hits anchor it exactly
    /// (a header need not sit on an analysis block boundary); entropy-only
    /// regions fall back to the region start.
    pub container_start: u64,
}

/// Scores each candidate region against every registered format.
///
/// The score is a weighted sum of signature evidence (fraction of the
/// format's patterns observed, plus an anchor bonus when the hits agree on
/// a corroborated container start), entropy-profile closeness, and size
/// compatibility. Ties resolve to the registry's declaration order, which
/// keeps labeling deterministic.
pub struct FormatClassifier<'r> {
    registry: &'r SignatureRegistry,
    confidence_floor: f64,
}

impl<'r> FormatClassifier<'r> {
    pub fn new(registry: &'r SignatureRegistry, confidence_floor: f64) -> Self {
        Self {
            registry,
            confidence_floor,
        }
    }

    pub fn classify(&self, region: CandidateRegion) -> ClassifiedRegion {
        let mut best_spec: Option<&FormatSpec> = None;
        let mut best_score = 0.0f64;

        for spec in self.registry.specs() {
            let score = self.score(spec, &region);
            if score > best_score {
                best_score = score;
                best_spec = Some(spec);
            }
        }

        let (label, container_start) = match best_spec {
            Some(spec) if best_score >= self.confidence_floor => (
                FormatLabel {
                    format: spec.format,
                    confidence: best_score,
                },
                implied_start(spec, &region)
                    .map(|(start, _)| start)
                    .unwrap_or(region.start),
            ),
            _ => (
                FormatLabel {
                    format: ContainerFormat::Unknown,
                    confidence: best_score,
                },
                region.start,
            ),
        };

        ClassifiedRegion {
            region,
            label,
            container_start,
        }
    }

    fn score(&self, spec: &FormatSpec, region: &CandidateRegion) -> f64 {
        let signature = signature_evidence(spec, region);
        let entropy = entropy_closeness(spec.expected_entropy, region.mean_entropy);
        let size = size_compatibility(spec, region.len());

        (SIGNATURE_WEIGHT * signature + ENTROPY_WEIGHT * entropy + SIZE_WEIGHT * size).min(1.0)
    }
}

fn signature_evidence(spec: &FormatSpec, region: &CandidateRegion) -> f64 {
    if spec.patterns.is_empty() {
        return 0.0;
    }

    let matched: HashSet<&str> = region
        .hits
        .iter()
        .filter(|h| h.format == spec.format)
        .map(|h| h.pattern_id)
        .collect();
    if matched.is_empty() {
        return 0.0;
    }

    let fraction = matched.len() as f64 / spec.patterns.len() as f64;

    // Structural corroboration: the hits pin down one container start,
    // confirmed either by the region boundary or by a second independent
    // hit agreeing on the same start.
    let anchored = match implied_start(spec, region) {
        Some((start, votes)) => start == region.start || votes >= 2,
        None => false,
    };

    0.75 * fraction + if anchored { 0.25 } else { 0.0 }
}

/// Container start implied by the region's hits: every hit whose pattern is
/// anchored to the container's first byte predicts one, and the predictions
/// must agree. Disagreement means the hits describe different things, so no
/// start is implied. Returns the start and the number of agreeing hits.
fn implied_start(spec: &FormatSpec, region: &CandidateRegion) -> Option<(u64, usize)> {
    let mut implied: Option<u64> = None;
    let mut votes = 0usize;
    for hit in region.hits.iter().filter(|h| h.format == spec.format) {
        let Some(pattern) = spec.patterns.iter().find(|p| p.id == hit.pattern_id) else {
            continue;
        };
        let Anchor::RegionStart(delta) = pattern.anchor else {
            continue;
        };
        let Some(start) = hit.offset.checked_sub(delta) else {
            continue;
        };
        match implied {
            None => {
                implied = Some(start);
                votes = 1;
            }
            Some(prev) if prev == start => votes += 1,
            Some(_) => return None,
        }
    }
    implied.map(|start| (start, votes))
}

fn entropy_closeness(expected: f64, observed: f64) -> f64 {
    (1.0 - (expected - observed).abs() / ENTROPY_TOLERANCE).clamp(0.0, 1.0)
}

fn size_compatibility(spec: &FormatSpec, len: u64) -> f64 {
    if len < spec.min_region_len {
        len as f64 / spec.min_region_len as f64
    } else if len > spec.max_region_len {
        spec.max_region_len as f64 / len as f64
    } else {
        1.0
    }
}
