//! Surname nationality classifier.
//!
//! `surname-mlp` turns a surname into a multi-hot bag of its letters and scores it with a
//! two-layer perceptron, one output per nationality. Around that small network sits the
//! full pipeline: vocabularies with unknown-token fallback, stratified train/val/test
//! splits, class-weighted loss, a training loop with early stopping and learning-rate
//! decay on plateau, and top-k inference.
//!
//! # Panics vs `Result`
//!
//! This crate exposes two layers of API:
//!
//! - Low-level hot path (panics on misuse):
//!   - [`SurnameClassifier::forward`], [`SurnameClassifier::backward`]
//!   - [`WeightedCrossEntropy::backward`], [`OptimizerState::step`]
//!
//!   Shape mismatches are treated as programmer error and will panic via `assert!`.
//!
//! - High-level APIs (checked):
//!   - [`SurnameClassifier::fit`], [`SurnameClassifier::evaluate`]
//!   - [`predict_top1`], [`predict_topk`], [`Predictor`]
//!
//!   These validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - A [`Batch`] stores its inputs as one flat row-major buffer of
//!   `len * input_dim` scalars.
//!
//! # Quick start
//!
//! ```rust
//! use surname_mlp::{predict_top1, Split, SurnameClassifier, SurnameDataset, SurnameRecord, TrainConfig};
//!
//! # fn main() -> surname_mlp::Result<()> {
//! let rows = vec![
//!     SurnameRecord::new("a", "X", Split::Train),
//!     SurnameRecord::new("b", "Y", Split::Train),
//!     SurnameRecord::new("a", "X", Split::Val),
//!     SurnameRecord::new("b", "Y", Split::Test),
//! ];
//! let mut dataset = SurnameDataset::with_new_vectorizer(rows)?;
//!
//! let cfg = TrainConfig { hidden_dim: 8, batch_size: 1, num_epochs: 5, ..TrainConfig::default() };
//! let v = dataset.vectorizer();
//! let mut model = SurnameClassifier::new_with_seed(v.input_dim(), cfg.hidden_dim, v.num_classes(), cfg.seed)?;
//!
//! let dir = std::env::temp_dir().join("surname-mlp-doctest");
//! std::fs::create_dir_all(&dir).map_err(|e| surname_mlp::Error::Io(e.to_string()))?;
//! let state = model.fit(&mut dataset, &cfg, &dir.join("model.json"), None)?;
//! assert!(!state.val_loss.is_empty());
//!
//! let pred = predict_top1("a", &model, dataset.vectorizer())?;
//! assert!((0.0..=1.0).contains(&pred.probability));
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod checkpoint;
pub mod classifier;
pub mod corpus;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod scheduler;
pub mod train;
pub mod train_state;
pub mod vectorizer;
pub mod vocab;

pub use activation::Activation;
pub use checkpoint::{SerializedClassifier, MODEL_FORMAT_VERSION};
pub use classifier::{Gradients, Scratch, SurnameClassifier};
pub use corpus::{RawSurname, Split, SplitFractions, SurnameRecord};
pub use dataset::{Batch, Batches, Example, Shuffle, SurnameDataset};
pub use error::{Error, Result};
pub use inference::{predict_top1, predict_topk, Prediction, Predictor};
pub use layer::{Init, Layer};
pub use loss::WeightedCrossEntropy;
pub use optim::{Optimizer, OptimizerState};
pub use scheduler::{PlateauConfig, ReduceLrOnPlateau};
pub use train::{EvalReport, TrainConfig};
pub use train_state::{CheckpointAction, EarlyStopping, TrainState, TrainingStatus};
pub use vectorizer::{SurnameVectorizer, VectorizerRecord};
pub use vocab::{Vocabulary, VocabularyRecord};
