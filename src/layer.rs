use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::{Activation, Error, Result};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Glorot uniform: `U(-sqrt(6 / (in + out)), +sqrt(6 / (in + out)))`.
    Xavier,
    /// Kaiming uniform for ReLU: `U(-sqrt(6 / in), +sqrt(6 / in))`.
    He,
}

impl Init {
    /// Default initializer for a layer followed by `act`.
    #[inline]
    pub fn for_activation(act: Activation) -> Self {
        match act {
            Activation::ReLU => Init::He,
            Activation::Identity => Init::Xavier,
        }
    }

    fn limit(self, in_dim: usize, out_dim: usize) -> f32 {
        match self {
            Init::Xavier => (6.0 / (in_dim + out_dim) as f32).sqrt(),
            Init::He => (6.0 / in_dim as f32).sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// Random weights from `init`, zero biases.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let limit = init.limit(in_dim, out_dim);
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect();

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Builds a layer from explicit parameters, validating shapes and finiteness.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidData(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::DimensionMismatch(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::DimensionMismatch(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Forward pass for a single sample: `outputs = activation(W * inputs + b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `outputs.len() == self.out_dim`
    #[inline]
    pub fn forward(&self, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        for o in 0..self.out_dim {
            let row = &self.weights[o * self.in_dim..(o + 1) * self.in_dim];
            let mut sum = self.biases[o];
            for (w, x) in row.iter().zip(inputs) {
                sum = w.mul_add(*x, sum);
            }
            outputs[o] = self.activation.forward(sum);
        }
    }

    /// Backward pass for a single sample.
    ///
    /// Accumulate semantics: `d_weights` and `d_biases` are added to, so a batch is
    /// processed by zeroing them once and calling this per sample. `d_inputs`, when
    /// given, is overwritten.
    ///
    /// Inputs:
    /// - `inputs`: the same inputs passed to `forward`
    /// - `outputs`: the outputs previously produced by `forward` (post-activation)
    /// - `d_outputs`: upstream gradient dL/d(outputs)
    #[inline]
    pub fn backward(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &[f32],
        mut d_inputs: Option<&mut [f32]>,
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(d_outputs.len(), self.out_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        if let Some(d_in) = d_inputs.as_deref_mut() {
            debug_assert_eq!(d_in.len(), self.in_dim);
            d_in.fill(0.0);
        }

        for o in 0..self.out_dim {
            let d_z = d_outputs[o] * self.activation.grad_from_output(outputs[o]);
            if d_z == 0.0 {
                continue;
            }
            d_biases[o] += d_z;

            let row = o * self.in_dim;
            for i in 0..self.in_dim {
                d_weights[row + i] = d_z.mul_add(inputs[i], d_weights[row + i]);
            }
            if let Some(d_in) = d_inputs.as_deref_mut() {
                for i in 0..self.in_dim {
                    d_in[i] = self.weights[row + i].mul_add(d_z, d_in[i]);
                }
            }
        }
    }

    /// `param -= lr * d_param` for weights and biases.
    #[inline]
    pub fn sgd_step(&mut self, d_weights: &[f32], d_biases: &[f32], lr: f32) {
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.biases.len());

        for (w, g) in self.weights.iter_mut().zip(d_weights) {
            *w -= lr * g;
        }
        for (b, g) in self.biases.iter_mut().zip(d_biases) {
            *b -= lr * g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn init_respects_limits() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Layer::new_with_rng(6, 4, Init::He, Activation::ReLU, &mut rng).unwrap();
        let limit = 1.0_f32;
        assert!(layer.weights().iter().all(|w| w.abs() <= limit));
        assert!(layer.biases().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn forward_applies_affine_then_activation() {
        let layer = Layer::from_parts(
            2,
            2,
            Activation::ReLU,
            vec![1.0, 2.0, -1.0, -1.0],
            vec![0.5, 0.0],
        )
        .unwrap();
        let mut out = [0.0_f32; 2];
        layer.forward(&[1.0, 1.0], &mut out);
        assert_eq!(out, [3.5, 0.0]);
    }

    #[test]
    fn backward_accumulates_parameter_gradients() {
        let layer =
            Layer::from_parts(2, 1, Activation::Identity, vec![2.0, 3.0], vec![0.0]).unwrap();
        let mut out = [0.0_f32];
        let mut dw = [0.0_f32; 2];
        let mut db = [0.0_f32];
        let mut d_in = [9.0_f32; 2];

        layer.forward(&[1.0, -1.0], &mut out);
        layer.backward(&[1.0, -1.0], &out, &[1.0], Some(&mut d_in), &mut dw, &mut db);
        layer.backward(&[1.0, -1.0], &out, &[1.0], None, &mut dw, &mut db);

        assert_eq!(dw, [2.0, -2.0]);
        assert_eq!(db, [2.0]);
        assert_eq!(d_in, [2.0, 3.0]);
    }

    #[test]
    fn from_parts_rejects_bad_shapes() {
        let err = Layer::from_parts(2, 2, Activation::ReLU, vec![0.0; 3], vec![0.0; 2]);
        assert!(matches!(err, Err(Error::DimensionMismatch(_))));
        let err = Layer::from_parts(1, 1, Activation::ReLU, vec![f32::NAN], vec![0.0]);
        assert!(matches!(err, Err(Error::InvalidData(_))));
    }
}
