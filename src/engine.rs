use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{BlockAnalysis, CandidateAggregator};
use crate::classify::FormatClassifier;
use crate::config::ScanConfig;
use crate::entropy::normalized_entropy;
use crate::error::Result;
use crate::findings::{FindingContext, FindingRecord, build_findings};
use crate::io::{BlockReader, hash_image};
use crate::signatures::SignatureRegistry;
use crate::validate::Validator;

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub source_image: String,
    pub image_sha256: String,
    pub config: ScanConfig,
    pub blocks_scanned: u64,
    pub records: Vec<FindingRecord>,
}

/// A cancelled scan is an outcome, not an error: nothing went wrong, the
/// operator asked for a stop and partial results are deliberately withheld.
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(Box<ScanReport>),
    Cancelled,
}

/// Heap entry ordered by block offset so worker results drain back into
/// offset order regardless of completion order.
struct Sequenced(BlockAnalysis);

impl PartialEq for Sequenced {
    fn eq(&self, other: &Self) -> bool {
        self.0.offset == other.0.offset
    }
}

impl Eq for Sequenced {}

impl PartialOrd for Sequenced {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sequenced {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.offset.cmp(&other.0.offset)
    }
}

/// Drives the whole pipeline: sequential block reads, parallel per-block
/// analysis, ordered aggregation, then classification and validation of the
/// surviving regions.
///
/// Reads stay sequential on one thread; only the CPU-bound entropy and
/// signature work fans out. Results are re-sequenced through a min-heap
/// before aggregation, so the output is identical for any worker count.
pub struct Engine {
    config: ScanConfig,
    registry: Arc<SignatureRegistry>,
}

impl Engine {
    pub fn new(config: ScanConfig) -> Result<Self> {
        let registry = SignatureRegistry::builtin()?;
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: ScanConfig, registry: SignatureRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Scans one image. `source_id` overrides the image path as the evidence
    /// identifier stamped into records. `running` follows the convention that
    /// `true` means keep going; flipping it to `false` stops the scan at the
    /// next block boundary.
    pub fn scan(
        &self,
        image: &Path,
        source_id: Option<&str>,
        running: &Arc<AtomicBool>,
    ) -> Result<ScanOutcome> {
        let image_sha256 = hash_image(image)?;
        let mut reader = BlockReader::open(image, self.config.block_size)?;
        info!(
            image = %image.display(),
            size = reader.len(),
            sha256 = %image_sha256,
            "scan started"
        );

        let mut aggregator = CandidateAggregator::new(
            self.config.entropy_threshold,
            self.config.gap_tolerance,
            self.config.smoothing_window,
            self.registry.min_region_len(),
            reader.len(),
        );

        let max_in_flight = self.config.effective_workers();
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(BlockAnalysis, Vec<u8>)>(max_in_flight * 2);
        let mut buffer_pool: Vec<Vec<u8>> = Vec::with_capacity(max_in_flight);
        let mut reorder: BinaryHeap<Reverse<Sequenced>> = BinaryHeap::new();
        let mut in_flight = 0usize;
        let mut reader_done = false;
        let mut next_expected = 0u64;
        let mut blocks_scanned = 0u64;

        loop {
            while let Ok((analysis, buffer)) = result_rx.try_recv() {
                buffer_pool.push(buffer);
                in_flight -= 1;
                reorder.push(Reverse(Sequenced(analysis)));
            }

            while reorder
                .peek()
                .is_some_and(|Reverse(Sequenced(b))| b.offset == next_expected)
            {
                let Some(Reverse(Sequenced(block))) = reorder.pop() else {
                    break;
                };
                next_expected = block.offset + block.len as u64;
                blocks_scanned += 1;
                aggregator.push(block)?;
            }

            if !running.load(Ordering::Relaxed) {
                // Let in-flight workers finish against a live channel, then
                // discard their output.
                while in_flight > 0 {
                    if result_rx.recv().is_err() {
                        break;
                    }
                    in_flight -= 1;
                }
                info!(blocks_scanned, "scan cancelled");
                return Ok(ScanOutcome::Cancelled);
            }

            if reader_done && in_flight == 0 && reorder.is_empty() {
                break;
            }

            if !reader_done && in_flight < max_in_flight {
                let mut buf = buffer_pool.pop().unwrap_or_default();
                match reader.next_block_into(&mut buf)? {
                    Some(offset) => {
                        let tx = result_tx.clone();
                        let registry = Arc::clone(&self.registry);
                        rayon::spawn(move || {
                            let analysis = BlockAnalysis {
                                offset,
                                len: buf.len(),
                                entropy: normalized_entropy(&buf),
                                hits: registry.match_block(offset, &buf),
                            };
                            let _ = tx.send((analysis, buf));
                        });
                        in_flight += 1;
                        continue;
                    }
                    None => {
                        reader_done = true;
                    }
                }
            }

            if in_flight > 0 {
                match result_rx.recv_timeout(Duration::from_millis(500)) {
                    Ok((analysis, buffer)) => {
                        buffer_pool.push(buffer);
                        in_flight -= 1;
                        reorder.push(Reverse(Sequenced(analysis)));
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        }

        let regions = aggregator.finish();
        info!(blocks_scanned, regions = regions.len(), "block pass finished");

        let classifier = FormatClassifier::new(&self.registry, self.config.confidence_floor);
        let validator = Validator::new(&self.registry);

        let mut classified = Vec::with_capacity(regions.len());
        let mut verdicts = Vec::with_capacity(regions.len());
        for region in regions {
            let labeled = classifier.classify(region);
            debug!(
                start = labeled.region.start,
                end = labeled.region.end,
                format = %labeled.label.format,
                confidence = labeled.label.confidence,
                "region classified"
            );
            verdicts.push(validator.validate(&mut reader, &labeled)?);
            classified.push(labeled);
        }

        let context = FindingContext {
            source_image: source_id
                .map(str::to_owned)
                .unwrap_or_else(|| image.display().to_string()),
            image_sha256: image_sha256.clone(),
            scanned_at: Utc::now(),
        };
        let records = build_findings(classified, verdicts, &context)?;
        info!(findings = records.len(), "scan finished");

        Ok(ScanOutcome::Completed(Box::new(ScanReport {
            source_image: context.source_image,
            image_sha256,
            config: self.config.clone(),
            blocks_scanned,
            records,
        })))
    }
}
