//! Classifier checkpoints.
//!
//! This module defines a versioned, stable on-disk format for [`SurnameClassifier`].
//!
//! Design notes:
//! - We do NOT directly serialize internal `Layer` structs, to keep the file format
//!   stable even if internal representation changes.
//! - All deserialization validates dimensions, parameter lengths, and that all
//!   parameters are finite.
//! - Saves go through a sibling temp file and a rename, so an interrupted write never
//!   leaves a truncated checkpoint behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, Result, SurnameClassifier};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedClassifier {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: SerializedActivation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Relu,
    Identity,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::ReLU => SerializedActivation::Relu,
            Activation::Identity => SerializedActivation::Identity,
        }
    }
}

impl From<SerializedActivation> for Activation {
    fn from(value: SerializedActivation) -> Self {
        match value {
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::Identity => Activation::Identity,
        }
    }
}

impl SerializedClassifier {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.len() != SurnameClassifier::NUM_LAYERS {
            return Err(Error::InvalidData(format!(
                "checkpoint has {} layers; expected {}",
                self.layers.len(),
                SurnameClassifier::NUM_LAYERS
            )));
        }
        Ok(())
    }

    /// `(input, hidden, output)` widths recorded in the file.
    pub fn dims(&self) -> Option<(usize, usize, usize)> {
        match self.layers.as_slice() {
            [fc1, fc2] => Some((fc1.in_dim, fc1.out_dim, fc2.out_dim)),
            _ => None,
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            activation: layer.activation().into(),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl From<&SurnameClassifier> for SerializedClassifier {
    fn from(model: &SurnameClassifier) -> Self {
        let layers = (0..SurnameClassifier::NUM_LAYERS)
            .filter_map(|i| model.layer(i))
            .map(SerializedLayer::from)
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers,
        }
    }
}

impl TryFrom<SerializedClassifier> for SurnameClassifier {
    type Error = Error;

    fn try_from(value: SerializedClassifier) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let mut layers = value.layers.into_iter().enumerate().map(|(i, l)| {
            // Layer::from_parts performs shape validation and finiteness checks.
            Layer::from_parts(l.in_dim, l.out_dim, l.activation.into(), l.weights, l.biases)
                .map_err(|e| match e {
                    Error::DimensionMismatch(msg) => {
                        Error::DimensionMismatch(format!("layer {i}: {msg}"))
                    }
                    other => Error::InvalidData(format!("layer {i} invalid: {other}")),
                })
        });

        match (layers.next(), layers.next()) {
            (Some(fc1), Some(fc2)) => SurnameClassifier::from_layers(fc1?, fc2?),
            _ => Err(Error::InvalidData(
                "checkpoint is missing layers".to_owned(),
            )),
        }
    }
}

impl SurnameClassifier {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&SerializedClassifier::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedClassifier = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the model to a JSON file, replacing any previous file atomically.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        let tmp = tmp_path(p);
        std::fs::write(&tmp, s)
            .map_err(|e| Error::Io(format!("failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, p).map_err(|e| {
            Error::Io(format!(
                "failed to move {} to {}: {e}",
                tmp.display(),
                p.display()
            ))
        })?;
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::Io(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }

    /// Replace this model's parameters with the ones stored at `path`.
    ///
    /// Fails with [`Error::DimensionMismatch`] unless the file's input/hidden/output
    /// widths equal this model's.
    pub fn load_json_into<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = Self::load_json(path)?;
        if loaded.dims() != self.dims() {
            return Err(Error::DimensionMismatch(format!(
                "checkpoint widths {:?} do not match classifier widths {:?}",
                loaded.dims(),
                self.dims()
            )));
        }
        *self = loaded;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
