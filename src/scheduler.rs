//! Learning-rate reduction on a validation plateau.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A metric counts as improved only when it beats the best by this relative margin.
pub const DEFAULT_THRESHOLD: f32 = 1e-4;

/// Reductions smaller than this are ignored.
const MIN_DELTA: f32 = 1e-8;

/// Hyperparameters for [`ReduceLrOnPlateau`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateauConfig {
    /// Multiplier applied to the rate on a plateau, in (0, 1).
    pub factor: f32,
    /// Non-improving epochs tolerated before a reduction.
    pub patience: usize,
    /// Floor for the learning rate.
    pub min_lr: f32,
    /// Relative improvement threshold.
    pub threshold: f32,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 1,
            min_lr: 0.0,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl PlateauConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.factor.is_finite() && self.factor > 0.0 && self.factor < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "scheduler factor must be in (0, 1), got {}",
                self.factor
            )));
        }
        if !(self.min_lr.is_finite() && self.min_lr >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "scheduler min_lr must be finite and >= 0, got {}",
                self.min_lr
            )));
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "scheduler threshold must be finite and >= 0, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Multiplies the learning rate by `factor` once a minimized metric has failed to
/// improve for more than `patience` consecutive steps.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    cfg: PlateauConfig,
    lr: f32,
    best: f32,
    num_bad_epochs: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(initial_lr: f32, cfg: PlateauConfig) -> Result<Self> {
        cfg.validate()?;
        if !(initial_lr.is_finite() && initial_lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {initial_lr}"
            )));
        }
        Ok(Self {
            cfg,
            lr: initial_lr,
            best: f32::INFINITY,
            num_bad_epochs: 0,
        })
    }

    #[inline]
    pub fn lr(&self) -> f32 {
        self.lr
    }

    #[inline]
    pub fn num_bad_epochs(&self) -> usize {
        self.num_bad_epochs
    }

    /// Feeds one metric observation and returns the (possibly reduced) learning rate.
    pub fn step(&mut self, metric: f32) -> f32 {
        if metric < self.best * (1.0 - self.cfg.threshold) {
            self.best = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.num_bad_epochs > self.cfg.patience {
            let new_lr = (self.lr * self.cfg.factor).max(self.cfg.min_lr);
            if self.lr - new_lr > MIN_DELTA {
                tracing::debug!(old_lr = self.lr, new_lr, "reducing learning rate");
                self.lr = new_lr;
            }
            self.num_bad_epochs = 0;
        }
        self.lr
    }
}
