//! Softmax and class-weighted cross-entropy.
//!
//! These are small, allocation-free helpers intended to be used like:
//!
//! - run `classifier.forward(...)` to get logits
//! - compute `d_logits` via [`WeightedCrossEntropy::backward`]
//! - run `classifier.backward(...)`
//! - update parameters with an optimizer
//!
//! The batch loss is the weighted mean
//! `L = sum_i w[y_i] * ce_i / sum_i w[y_i]`, where `ce_i = -log softmax(logits_i)[y_i]`.

use crate::{Error, Result};

/// Writes `softmax(logits)` into `out`.
#[inline]
pub fn softmax_into(logits: &[f32], out: &mut [f32]) {
    assert_eq!(
        logits.len(),
        out.len(),
        "logits len {} does not match out len {}",
        logits.len(),
        out.len()
    );
    if logits.is_empty() {
        return;
    }

    let (_, max_logit) = log_sum_exp_and_max(logits);
    let mut sum_exp = 0.0_f32;
    for (o, &x) in out.iter_mut().zip(logits) {
        *o = (x - max_logit).exp();
        sum_exp += *o;
    }
    let inv_sum = 1.0 / sum_exp;
    for o in out.iter_mut() {
        *o *= inv_sum;
    }
}

/// Unweighted cross-entropy of one sample: `log_sum_exp(logits) - logits[label]`.
#[inline]
pub fn cross_entropy(logits: &[f32], label: usize) -> f32 {
    assert!(
        label < logits.len(),
        "label {label} out of range for {} classes",
        logits.len()
    );
    let (lse, _) = log_sum_exp_and_max(logits);
    lse - logits[label]
}

/// Cross-entropy with per-class weights, reduced as a weighted mean over the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCrossEntropy {
    weights: Vec<f32>,
}

impl WeightedCrossEntropy {
    pub fn new(weights: Vec<f32>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidConfig(
                "class weights must not be empty".to_owned(),
            ));
        }
        if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "class weights must be finite and > 0, got {w}"
            )));
        }
        Ok(Self { weights })
    }

    /// Every class weighted 1.0, i.e. plain mean cross-entropy.
    pub fn uniform(num_classes: usize) -> Result<Self> {
        Self::new(vec![1.0; num_classes])
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// `sum_i w[y_i]` for a batch; the denominator of the weighted mean.
    #[inline]
    pub fn normalizer(&self, labels: &[usize]) -> f32 {
        labels.iter().map(|&y| self.weights[y]).sum()
    }

    /// Contribution of one sample to the batch loss: `w[label] * ce / normalizer`.
    #[inline]
    pub fn forward(&self, logits: &[f32], label: usize, normalizer: f32) -> f32 {
        self.weights[label] * cross_entropy(logits, label) / normalizer
    }

    /// Loss contribution + gradient w.r.t. logits for one sample.
    ///
    /// Writes `d_logits = w[label] * (softmax(logits) - onehot(label)) / normalizer`
    /// and returns the same value as [`Self::forward`].
    #[inline]
    pub fn backward(
        &self,
        logits: &[f32],
        label: usize,
        normalizer: f32,
        d_logits: &mut [f32],
    ) -> f32 {
        assert_eq!(
            logits.len(),
            self.weights.len(),
            "logits len {} does not match {} classes",
            logits.len(),
            self.weights.len()
        );

        let scale = self.weights[label] / normalizer;
        let ce = cross_entropy(logits, label);
        softmax_into(logits, d_logits);
        d_logits[label] -= 1.0;
        for d in d_logits.iter_mut() {
            *d *= scale;
        }
        scale * ce
    }
}

#[inline]
fn log_sum_exp_and_max(xs: &[f32]) -> (f32, f32) {
    let mut max_x = xs[0];
    for &x in xs.iter().skip(1) {
        if x > max_x {
            max_x = x;
        }
    }
    let mut sum_exp = 0.0_f32;
    for &x in xs {
        sum_exp += (x - max_x).exp();
    }
    (max_x + sum_exp.ln(), max_x)
}
