use std::collections::VecDeque;

/// Shannon entropy of a byte slice in bits per byte (0..=8).
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &counts {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Shannon entropy normalized to [0, 1]. Short tail blocks are scored on
/// their actual length, never padded.
pub fn normalized_entropy(data: &[u8]) -> f64 {
    shannon_entropy(data) / 8.0
}

/// Bounded rolling mean over per-block entropy scores.
///
/// Applied at the sequential aggregation stage so the smoothed value depends
/// only on block order, never on worker completion order.
pub struct EntropySmoother {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl EntropySmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            sum: 0.0,
        }
    }

    /// Pushes the next block's score and returns the smoothed value.
    pub fn push(&mut self, score: f64) -> f64 {
        if self.window.len() == self.capacity {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.window.push_back(score);
        self.sum += score;
        self.sum / self.window.len() as f64
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}
