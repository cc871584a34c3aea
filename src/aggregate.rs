use crate::entropy::EntropySmoother;
use crate::error::{Result, ScanError};
use crate::signatures::SignatureHit;

/// Per-block analysis result, produced by workers and consumed strictly in
/// offset order.
#[derive(Debug, Clone)]
pub struct BlockAnalysis {
    pub offset: u64,
    pub len: usize,
    /// Normalized entropy of this block's bytes.
    pub entropy: f64,
    pub hits: Vec<SignatureHit>,
}

/// A span of the image suspected of holding a container. Frozen once the
/// aggregator finalizes it.
#[derive(Debug, Clone)]
pub struct CandidateRegion {
    pub start: u64,
    pub end: u64,
    /// Length-weighted mean of the normalized entropy of covered blocks.
    pub mean_entropy: f64,
    pub peak_entropy: f64,
    pub hits: Vec<SignatureHit>,
    /// Region runs into the end of the image; format structures may be cut off.
    pub truncated: bool,
}

impl CandidateRegion {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

struct OpenRegion {
    start: u64,
    end: u64,
    weighted_entropy: f64,
    covered: u64,
    peak: f64,
    hits: Vec<SignatureHit>,
}

impl OpenRegion {
    fn absorb(&mut self, block: &BlockAnalysis) {
        self.end = block.offset + block.len as u64;
        self.weighted_entropy += block.entropy * block.len as f64;
        self.covered += block.len as u64;
        self.peak = self.peak.max(block.entropy);
        self.hits.extend(block.hits.iter().cloned());
    }
}

/// Merges ordered per-block analyses into candidate regions.
///
/// A block seeds a candidate when its raw or smoothed entropy clears the
/// threshold, or when it contains any signature hit. Seeds separated by at
/// most `gap_tolerance` non-seeded blocks merge into one region; bridged gap
/// blocks become part of the region. Finalized regions shorter than the
/// minimum plausible container are discarded as noise.
///
/// Input order is a hard precondition: the engine's reorder buffer delivers
/// blocks in ascending offset order regardless of worker completion order,
/// which makes aggregation deterministic.
pub struct CandidateAggregator {
    entropy_threshold: f64,
    gap_tolerance: u32,
    min_region_len: u64,
    image_len: u64,
    smoother: EntropySmoother,
    open: Option<OpenRegion>,
    gap_run: u32,
    pending_gap: Vec<BlockAnalysis>,
    next_offset: u64,
    regions: Vec<CandidateRegion>,
}

impl CandidateAggregator {
    pub fn new(
        entropy_threshold: f64,
        gap_tolerance: u32,
        smoothing_window: usize,
        min_region_len: u64,
        image_len: u64,
    ) -> Self {
        Self {
            entropy_threshold,
            gap_tolerance,
            min_region_len,
            image_len,
            smoother: EntropySmoother::new(smoothing_window),
            open: None,
            gap_run: 0,
            pending_gap: Vec::new(),
            next_offset: 0,
            regions: Vec::new(),
        }
    }

    pub fn push(&mut self, block: BlockAnalysis) -> Result<()> {
        if block.offset != self.next_offset {
            return Err(ScanError::InternalConsistency(format!(
                "aggregator fed out of order: expected offset {}, got {}",
                self.next_offset, block.offset
            )));
        }
        self.next_offset = block.offset + block.len as u64;

        let smoothed = self.smoother.push(block.entropy);
        let seeded = block.entropy >= self.entropy_threshold
            || smoothed >= self.entropy_threshold
            || !block.hits.is_empty();

        if seeded {
            match self.open.as_mut() {
                Some(open) => {
                    // Bridge the gap: blocks inside a merged span belong to
                    // the region.
                    for gap_block in self.pending_gap.drain(..) {
                        open.absorb(&gap_block);
                    }
                    open.absorb(&block);
                }
                None => {
                    self.open = Some(OpenRegion {
                        start: block.offset,
                        end: block.offset + block.len as u64,
                        weighted_entropy: block.entropy * block.len as f64,
                        covered: block.len as u64,
                        peak: block.entropy,
                        hits: block.hits,
                    });
                }
            }
            self.gap_run = 0;
        } else if self.open.is_some() {
            self.gap_run += 1;
            if self.gap_run > self.gap_tolerance {
                self.finalize_open();
            } else {
                self.pending_gap.push(block);
            }
        }
        Ok(())
    }

    /// Closes any open region and returns all finalized regions in ascending
    /// offset order.
    pub fn finish(mut self) -> Vec<CandidateRegion> {
        self.finalize_open();
        self.regions
    }

    fn finalize_open(&mut self) {
        self.pending_gap.clear();
        self.gap_run = 0;

        let Some(open) = self.open.take() else {
            return;
        };
        if open.end - open.start < self.min_region_len {
            return;
        }

        self.regions.push(CandidateRegion {
            start: open.start,
            end: open.end,
            mean_entropy: open.weighted_entropy / open.covered as f64,
            peak_entropy: open.peak,
            hits: open.hits,
            truncated: open.end >= self.image_len,
        });
    }
}
