//! Metrics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop). They are
//! computed batch-by-batch during training and evaluation without allocating per step.

/// Incremental mean: `running += (value - running) / (n + 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    value: f32,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, value: f32) {
        self.value += (value - self.value) / (self.count + 1) as f32;
        self.count += 1;
    }

    /// Current mean; 0.0 before the first update.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Index of the largest score; ties resolve to the lowest index.
///
/// Panics if `scores` is empty.
#[inline]
pub fn argmax(scores: &[f32]) -> usize {
    assert!(!scores.is_empty(), "argmax of empty scores");
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

/// Indices of the `k` largest scores in descending order; `k` is clamped to
/// `scores.len()`.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    // Stable sort keeps lower indices first among equal scores.
    idx.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    idx.truncate(k.min(scores.len()));
    idx
}

/// Counts argmax hits for one batch of row-major logits.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchAccuracy {
    correct: usize,
    total: usize,
}

impl BatchAccuracy {
    #[inline]
    pub fn observe(&mut self, scores: &[f32], label: usize) {
        if argmax(scores) == label {
            self.correct += 1;
        }
        self.total += 1;
    }

    /// Fraction correct in `[0, 1]`; 0.0 for an empty batch.
    #[inline]
    pub fn value(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }
}
