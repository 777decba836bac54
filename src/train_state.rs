//! Per-run training bookkeeping and the early-stopping rule.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Running,
    StoppedEarly,
    Completed,
    /// Stopped by the interrupt flag; the last epoch may be partial.
    Interrupted,
}

/// Everything the training loop records about one run.
///
/// Histories are append-only, one entry per finished epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainState {
    pub epoch_index: usize,
    pub learning_rate: f32,
    pub train_loss: Vec<f32>,
    pub train_acc: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_acc: Vec<f32>,
    pub early_stopping_step: usize,
    /// `None` until the first finite validation loss is checkpointed.
    pub early_stopping_best_val: Option<f32>,
    pub stop_early: bool,
    pub status: TrainingStatus,
    pub model_path: PathBuf,
    pub test_loss: Option<f32>,
    pub test_acc: Option<f32>,
}

impl TrainState {
    pub fn new(learning_rate: f32, model_path: impl Into<PathBuf>) -> Self {
        Self {
            epoch_index: 0,
            learning_rate,
            train_loss: Vec::new(),
            train_acc: Vec::new(),
            val_loss: Vec::new(),
            val_acc: Vec::new(),
            early_stopping_step: 0,
            early_stopping_best_val: None,
            stop_early: false,
            status: TrainingStatus::Running,
            model_path: model_path.into(),
            test_loss: None,
            test_acc: None,
        }
    }

    /// Number of epochs with a recorded validation pass.
    #[inline]
    pub fn epochs_completed(&self) -> usize {
        self.val_loss.len()
    }

    /// Appends one finished epoch to all four histories at once.
    pub fn push_epoch(&mut self, train_loss: f32, train_acc: f32, val_loss: f32, val_acc: f32) {
        self.train_loss.push(train_loss);
        self.train_acc.push(train_acc);
        self.val_loss.push(val_loss);
        self.val_acc.push(val_acc);
    }

    /// Whether this run has written a checkpoint to `model_path`.
    #[inline]
    pub fn checkpoint_written(&self) -> bool {
        self.early_stopping_best_val.is_some()
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidData(format!("failed to serialize train state: {e}")))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::Io(format!("failed to write {}: {e}", p.display())))
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::Io(format!("failed to read {}: {e}", p.display())))?;
        serde_json::from_str(&s)
            .map_err(|e| Error::InvalidData(format!("failed to parse train state json: {e}")))
    }
}

/// What to do with the model after a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointAction {
    /// New best validation loss: persist the parameters.
    Save,
    Skip,
}

/// Stop after `patience` consecutive epochs without a strictly lower validation loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStopping {
    patience: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Result<Self> {
        if patience == 0 {
            return Err(Error::InvalidConfig(
                "early stopping patience must be > 0".to_owned(),
            ));
        }
        Ok(Self { patience })
    }

    #[inline]
    pub fn patience(&self) -> usize {
        self.patience
    }

    /// Folds the latest entry of `state.val_loss` into the early-stopping fields.
    ///
    /// The first finite loss always saves. Later epochs save only on strict improvement;
    /// a tie counts as no improvement. A non-finite loss never saves.
    pub fn update(&self, state: &mut TrainState) -> CheckpointAction {
        let Some(&val) = state.val_loss.last() else {
            return CheckpointAction::Skip;
        };

        let action = match state.early_stopping_best_val {
            _ if !val.is_finite() => {
                state.early_stopping_step += 1;
                CheckpointAction::Skip
            }
            Some(best) if val >= best => {
                state.early_stopping_step += 1;
                CheckpointAction::Skip
            }
            _ => {
                state.early_stopping_best_val = Some(val);
                state.early_stopping_step = 0;
                CheckpointAction::Save
            }
        };

        state.stop_early = state.early_stopping_step >= self.patience;
        action
    }
}
