//! Training loop.
//!
//! One epoch is a training pass over every full batch of the train split followed by a
//! validation pass. After validation the early-stopping rule decides whether the
//! parameters are written to the checkpoint, and the plateau scheduler sees the
//! validation loss. When the loop ends the best checkpoint is reloaded and scored on the
//! test split.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::metrics::{BatchAccuracy, RunningMean};
use crate::{
    Batch, CheckpointAction, EarlyStopping, Error, Gradients, Optimizer, PlateauConfig,
    ReduceLrOnPlateau, Result, Scratch, Shuffle, Split, SurnameClassifier, SurnameDataset,
    TrainState, TrainingStatus, WeightedCrossEntropy,
};

/// Hyperparameters for [`SurnameClassifier::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub hidden_dim: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub num_epochs: usize,
    pub early_stopping_patience: usize,
    pub scheduler: PlateauConfig,
    pub optimizer: Optimizer,
    /// Seeds parameter init and the per-epoch batch permutations.
    pub seed: u64,
    /// Permute rows every epoch. When false, batches follow corpus order.
    pub shuffle: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 300,
            batch_size: 64,
            learning_rate: 1e-3,
            num_epochs: 100,
            early_stopping_patience: 5,
            scheduler: PlateauConfig::default(),
            optimizer: Optimizer::default(),
            seed: 1337,
            shuffle: true,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_dim == 0 {
            return Err(Error::InvalidConfig("hidden_dim must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if self.num_epochs == 0 {
            return Err(Error::InvalidConfig("num_epochs must be > 0".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if self.early_stopping_patience == 0 {
            return Err(Error::InvalidConfig(
                "early_stopping_patience must be > 0".to_owned(),
            ));
        }
        self.scheduler.validate()?;
        self.optimizer.validate()
    }

    /// Reads a JSON config; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::Io(format!("failed to read {}: {e}", p.display())))?;
        let cfg: Self = serde_json::from_str(&s)
            .map_err(|e| Error::InvalidConfig(format!("invalid config {}: {e}", p.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Batch order for `epoch`.
    #[inline]
    pub fn shuffle_for(&self, epoch: usize) -> Shuffle {
        if self.shuffle {
            Shuffle::Seeded(self.seed.wrapping_add(epoch as u64))
        } else {
            Shuffle::None
        }
    }
}

/// Mean batch loss and accuracy over one pass of a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub loss: f32,
    /// Fraction in `[0, 1]`.
    pub accuracy: f32,
    /// Full batches seen; 0 means the split was smaller than one batch.
    pub batches: usize,
}

impl SurnameClassifier {
    /// Trains on `dataset` and writes the best parameters to `model_path`.
    ///
    /// `interrupt`, when set, is polled between batches; a raised flag ends the run with
    /// [`TrainingStatus::Interrupted`] without touching the checkpoint for the partial
    /// epoch.
    pub fn fit(
        &mut self,
        dataset: &mut SurnameDataset,
        cfg: &TrainConfig,
        model_path: &Path,
        interrupt: Option<&AtomicBool>,
    ) -> Result<TrainState> {
        cfg.validate()?;
        self.check_dataset(dataset)?;

        // Both splits must yield at least one full batch every epoch.
        for split in [Split::Train, Split::Val] {
            if dataset.split_len(split) < cfg.batch_size {
                return Err(Error::InvalidConfig(format!(
                    "{split} split has {} rows, fewer than batch_size {}",
                    dataset.split_len(split),
                    cfg.batch_size
                )));
            }
        }

        let loss_fn = WeightedCrossEntropy::new(dataset.class_weights().to_vec())?;
        let mut optimizer = cfg.optimizer.state(self)?;
        let mut scheduler = ReduceLrOnPlateau::new(cfg.learning_rate, cfg.scheduler)?;
        let stopper = EarlyStopping::new(cfg.early_stopping_patience)?;

        let mut state = TrainState::new(cfg.learning_rate, model_path);
        let mut scratch = self.scratch();
        let mut grads = self.gradients();
        let interrupted = || interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed));

        'epochs: for epoch in 0..cfg.num_epochs {
            state.epoch_index = epoch;

            dataset.set_split(Split::Train);
            let mut train_loss = RunningMean::new();
            let mut train_acc = RunningMean::new();
            for batch in dataset.batches(cfg.batch_size, cfg.shuffle_for(epoch))? {
                if interrupted() {
                    state.status = TrainingStatus::Interrupted;
                    break 'epochs;
                }
                let (loss, acc) = self.train_batch(&batch, &loss_fn, &mut scratch, &mut grads);
                optimizer.step(self, &mut grads, scheduler.lr());
                train_loss.update(loss);
                train_acc.update(acc);
            }

            if interrupted() {
                state.status = TrainingStatus::Interrupted;
                break;
            }

            let val = self.eval_split(dataset, Split::Val, cfg, epoch, &loss_fn, &mut scratch)?;
            state.push_epoch(train_loss.value(), train_acc.value(), val.loss, val.accuracy);

            if stopper.update(&mut state) == CheckpointAction::Save {
                self.save_json(model_path)?;
                tracing::debug!(
                    epoch,
                    val_loss = val.loss,
                    path = %model_path.display(),
                    "saved checkpoint"
                );
            }

            state.learning_rate = scheduler.step(val.loss);

            tracing::info!(
                epoch,
                train_loss = train_loss.value(),
                train_acc = train_acc.value(),
                val_loss = val.loss,
                val_acc = val.accuracy,
                lr = state.learning_rate,
                "epoch finished"
            );

            if state.stop_early {
                state.status = TrainingStatus::StoppedEarly;
                tracing::info!(
                    epoch,
                    best_val = ?state.early_stopping_best_val,
                    "early stopping"
                );
                break;
            }
        }

        if state.status == TrainingStatus::Running {
            state.status = TrainingStatus::Completed;
        }

        if state.status == TrainingStatus::Interrupted {
            tracing::warn!(epoch = state.epoch_index, "training interrupted");
            return Ok(state);
        }
        if !state.checkpoint_written() {
            tracing::warn!(
                "no finite validation loss; skipping checkpoint reload and test evaluation"
            );
            return Ok(state);
        }

        // Score the best parameters, not the last ones.
        self.load_json_into(model_path)?;
        let test = self.evaluate(dataset, Split::Test, cfg.batch_size)?;
        if test.batches > 0 {
            state.test_loss = Some(test.loss);
            state.test_acc = Some(test.accuracy);
            tracing::info!(test_loss = test.loss, test_acc = test.accuracy, "test evaluation");
        } else {
            tracing::warn!("test split is smaller than one batch; skipping test evaluation");
        }

        Ok(state)
    }

    /// Mean weighted loss and accuracy over `split`, in corpus order.
    ///
    /// Leaves `split` active on `dataset`.
    pub fn evaluate(
        &self,
        dataset: &mut SurnameDataset,
        split: Split,
        batch_size: usize,
    ) -> Result<EvalReport> {
        self.check_dataset(dataset)?;
        let loss_fn = WeightedCrossEntropy::new(dataset.class_weights().to_vec())?;
        let cfg = TrainConfig {
            batch_size,
            shuffle: false,
            ..TrainConfig::default()
        };
        let mut scratch = self.scratch();
        self.eval_split(dataset, split, &cfg, 0, &loss_fn, &mut scratch)
    }

    fn check_dataset(&self, dataset: &SurnameDataset) -> Result<()> {
        let vectorizer = dataset.vectorizer();
        if vectorizer.input_dim() != self.input_dim() {
            return Err(Error::DimensionMismatch(format!(
                "vectorizer input_dim {} does not match model input_dim {}",
                vectorizer.input_dim(),
                self.input_dim()
            )));
        }
        if vectorizer.num_classes() != self.output_dim() {
            return Err(Error::DimensionMismatch(format!(
                "vectorizer has {} nationalities but model output_dim is {}",
                vectorizer.num_classes(),
                self.output_dim()
            )));
        }
        Ok(())
    }

    fn eval_split(
        &self,
        dataset: &mut SurnameDataset,
        split: Split,
        cfg: &TrainConfig,
        epoch: usize,
        loss_fn: &WeightedCrossEntropy,
        scratch: &mut Scratch,
    ) -> Result<EvalReport> {
        dataset.set_split(split);
        let mut loss = RunningMean::new();
        let mut acc = RunningMean::new();
        for batch in dataset.batches(cfg.batch_size, cfg.shuffle_for(epoch))? {
            let (l, a) = self.eval_batch(&batch, loss_fn, scratch);
            loss.update(l);
            acc.update(a);
        }
        Ok(EvalReport {
            loss: loss.value(),
            accuracy: acc.value(),
            batches: loss.count(),
        })
    }

    /// Forward + backward over one batch. Leaves the summed parameter gradients in
    /// `grads` and returns `(batch loss, batch accuracy)`.
    fn train_batch(
        &self,
        batch: &Batch,
        loss_fn: &WeightedCrossEntropy,
        scratch: &mut Scratch,
        grads: &mut Gradients,
    ) -> (f32, f32) {
        grads.zero();
        let norm = loss_fn.normalizer(batch.labels());
        let mut loss = 0.0_f32;
        let mut acc = BatchAccuracy::default();

        for (i, &label) in batch.labels().iter().enumerate() {
            let input = batch.input(i);
            let logits = self.forward(input, scratch, false);
            acc.observe(logits, label);
            loss += loss_fn.backward(logits, label, norm, grads.d_logits_mut());
            self.backward(input, scratch, grads);
        }
        (loss, acc.value())
    }

    fn eval_batch(
        &self,
        batch: &Batch,
        loss_fn: &WeightedCrossEntropy,
        scratch: &mut Scratch,
    ) -> (f32, f32) {
        let norm = loss_fn.normalizer(batch.labels());
        let mut loss = 0.0_f32;
        let mut acc = BatchAccuracy::default();

        for (i, &label) in batch.labels().iter().enumerate() {
            let logits = self.forward(batch.input(i), scratch, false);
            acc.observe(logits, label);
            loss += loss_fn.forward(logits, label, norm);
        }
        (loss, acc.value())
    }
}
