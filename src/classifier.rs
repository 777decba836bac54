//! Two-layer surname classifier.
//!
//! `hidden = ReLU(W1 x + b1)`, `logits = W2 hidden + b2`, optionally followed by a
//! softmax. Input width is the character vocabulary size and output width the number
//! of nationalities.
//!
//! The per-sample hot path is allocation-free: activations live in a reusable
//! [`Scratch`] and gradients in a reusable [`Gradients`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::loss::softmax_into;
use crate::{Activation, Error, Init, Layer, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SurnameClassifier {
    fc1: Layer,
    fc2: Layer,
}

/// Reusable buffers for [`SurnameClassifier::forward`].
#[derive(Debug, Clone)]
pub struct Scratch {
    hidden: Vec<f32>,
    logits: Vec<f32>,
    probs: Vec<f32>,
}

/// Parameter gradients, accumulated over a batch.
///
/// Allocate once via [`SurnameClassifier::gradients`], call [`Gradients::zero`] before
/// each batch.
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: [Vec<f32>; 2],
    d_biases: [Vec<f32>; 2],
    d_hidden: Vec<f32>,
    d_logits: Vec<f32>,
}

impl SurnameClassifier {
    pub const NUM_LAYERS: usize = 2;

    pub fn new_with_seed(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(input_dim, hidden_dim, output_dim, &mut rng)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if input_dim == 0 || hidden_dim == 0 || output_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "classifier dims must be > 0, got {input_dim}/{hidden_dim}/{output_dim}"
            )));
        }
        let fc1 = Layer::new_with_rng(
            input_dim,
            hidden_dim,
            Init::for_activation(Activation::ReLU),
            Activation::ReLU,
            rng,
        )?;
        let fc2 = Layer::new_with_rng(
            hidden_dim,
            output_dim,
            Init::for_activation(Activation::Identity),
            Activation::Identity,
            rng,
        )?;
        Ok(Self { fc1, fc2 })
    }

    /// Assembles a classifier from two layers; widths and activations must line up.
    pub fn from_layers(fc1: Layer, fc2: Layer) -> Result<Self> {
        if fc1.out_dim() != fc2.in_dim() {
            return Err(Error::DimensionMismatch(format!(
                "fc1 out_dim {} does not match fc2 in_dim {}",
                fc1.out_dim(),
                fc2.in_dim()
            )));
        }
        if fc1.activation() != Activation::ReLU || fc2.activation() != Activation::Identity {
            return Err(Error::InvalidData(format!(
                "expected ReLU hidden layer and Identity output layer, got {:?}/{:?}",
                fc1.activation(),
                fc2.activation()
            )));
        }
        Ok(Self { fc1, fc2 })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.fc1.in_dim()
    }

    #[inline]
    pub fn hidden_dim(&self) -> usize {
        self.fc1.out_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.fc2.out_dim()
    }

    /// `(input, hidden, output)` widths.
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.input_dim(), self.hidden_dim(), self.output_dim())
    }

    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        match idx {
            0 => Some(&self.fc1),
            1 => Some(&self.fc2),
            _ => None,
        }
    }

    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        match idx {
            0 => Some(&mut self.fc1),
            1 => Some(&mut self.fc2),
            _ => None,
        }
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Returns logits, or class probabilities when `apply_softmax` is set. Both stay
    /// available in `scratch` afterwards.
    ///
    /// Shape contract: `input.len() == self.input_dim()` and `scratch` built for this
    /// classifier.
    pub fn forward<'a>(
        &self,
        input: &[f32],
        scratch: &'a mut Scratch,
        apply_softmax: bool,
    ) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.hidden.len(),
            self.hidden_dim(),
            "scratch hidden len {} does not match model hidden_dim {}",
            scratch.hidden.len(),
            self.hidden_dim()
        );
        assert_eq!(
            scratch.logits.len(),
            self.output_dim(),
            "scratch logits len {} does not match model output_dim {}",
            scratch.logits.len(),
            self.output_dim()
        );

        self.fc1.forward(input, &mut scratch.hidden);
        self.fc2.forward(&scratch.hidden, &mut scratch.logits);

        if apply_softmax {
            softmax_into(&scratch.logits, &mut scratch.probs);
            &scratch.probs
        } else {
            &scratch.logits
        }
    }

    /// Backward pass for a single sample.
    ///
    /// Call `forward` first with the same `input` and `scratch`, and write
    /// `dL/d(logits)` into `grads.d_logits_mut()`. Parameter gradients are added to
    /// `grads`.
    pub fn backward(&self, input: &[f32], scratch: &Scratch, grads: &mut Gradients) {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            grads.d_hidden.len(),
            self.hidden_dim(),
            "grads hidden len {} does not match model hidden_dim {}",
            grads.d_hidden.len(),
            self.hidden_dim()
        );

        let Gradients {
            d_weights,
            d_biases,
            d_hidden,
            d_logits,
        } = grads;
        let [dw1, dw2] = d_weights;
        let [db1, db2] = d_biases;

        self.fc2.backward(
            &scratch.hidden,
            &scratch.logits,
            d_logits,
            Some(d_hidden.as_mut_slice()),
            dw2,
            db2,
        );
        self.fc1
            .backward(input, &scratch.hidden, d_hidden, None, dw1, db1);
    }

    /// Applies an SGD update to both layers.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        self.fc1
            .sgd_step(&grads.d_weights[0], &grads.d_biases[0], lr);
        self.fc2
            .sgd_step(&grads.d_weights[1], &grads.d_biases[1], lr);
    }
}

impl Scratch {
    pub fn new(model: &SurnameClassifier) -> Self {
        Self {
            hidden: vec![0.0; model.hidden_dim()],
            logits: vec![0.0; model.output_dim()],
            probs: vec![0.0; model.output_dim()],
        }
    }

    /// Logits of the most recent forward pass.
    #[inline]
    pub fn logits(&self) -> &[f32] {
        &self.logits
    }
}

impl Gradients {
    pub fn new(model: &SurnameClassifier) -> Self {
        let (input, hidden, output) = model.dims();
        Self {
            d_weights: [vec![0.0; input * hidden], vec![0.0; hidden * output]],
            d_biases: [vec![0.0; hidden], vec![0.0; output]],
            d_hidden: vec![0.0; hidden],
            d_logits: vec![0.0; output],
        }
    }

    /// Resets accumulated parameter gradients.
    pub fn zero(&mut self) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            g.fill(0.0);
        }
    }

    /// Upstream gradient buffer for the logits.
    #[inline]
    pub fn d_logits_mut(&mut self) -> &mut [f32] {
        &mut self.d_logits
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }
}
