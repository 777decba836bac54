//! Optimizers.
//!
//! Small, allocation-free-per-step optimizers that update a [`SurnameClassifier`] from a
//! set of accumulated [`Gradients`].
//!
//! Optimizer *state* (momentum/Adam moments) lives outside the model. The training loop
//! owns it and reuses it across steps.

use serde::{Deserialize, Serialize};

use crate::{Error, Gradients, Result, SurnameClassifier};

/// Optimizer choice for training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Optimizer {
    /// Plain SGD.
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Optimizer {
    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state(self, model: &SurnameClassifier) -> Result<OptimizerState> {
        self.validate()?;

        match self {
            Optimizer::Sgd => Ok(OptimizerState::Sgd),
            Optimizer::SgdMomentum { momentum } => Ok(OptimizerState::SgdMomentum {
                momentum,
                v_weights: zeros_like_weights(model),
                v_biases: zeros_like_biases(model),
            }),
            Optimizer::Adam { beta1, beta2, eps } => Ok(OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t: 0,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m_weights: zeros_like_weights(model),
                m_biases: zeros_like_biases(model),
                v_weights: zeros_like_weights(model),
                v_biases: zeros_like_biases(model),
            }),
        }
    }
}

type PerLayer = [Vec<f32>; SurnameClassifier::NUM_LAYERS];

/// Owned optimizer state.
#[derive(Debug, Clone)]
pub enum OptimizerState {
    Sgd,
    SgdMomentum {
        momentum: f32,
        v_weights: PerLayer,
        v_biases: PerLayer,
    },
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        t: u64,
        beta1_pow: f32,
        beta2_pow: f32,
        m_weights: PerLayer,
        m_biases: PerLayer,
        v_weights: PerLayer,
        v_biases: PerLayer,
    },
}

impl OptimizerState {
    /// Number of steps taken so far (Adam only; 0 for the SGD variants).
    pub fn steps(&self) -> u64 {
        match self {
            OptimizerState::Adam { t, .. } => *t,
            _ => 0,
        }
    }

    /// Apply one optimizer step.
    ///
    /// `lr` comes from the training loop so the plateau scheduler can change it between
    /// epochs. `grads` may be overwritten with the update direction.
    pub fn step(&mut self, model: &mut SurnameClassifier, grads: &mut Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");

        match self {
            OptimizerState::Sgd => {
                model.sgd_step(grads, lr);
            }
            OptimizerState::SgdMomentum {
                momentum,
                v_weights,
                v_biases,
            } => {
                for layer_idx in 0..SurnameClassifier::NUM_LAYERS {
                    let vw = &mut v_weights[layer_idx];
                    let vb = &mut v_biases[layer_idx];
                    for (v, &g) in vw.iter_mut().zip(grads.d_weights(layer_idx)) {
                        *v = *momentum * *v + g;
                    }
                    for (v, &g) in vb.iter_mut().zip(grads.d_biases(layer_idx)) {
                        *v = *momentum * *v + g;
                    }
                    grads.d_weights_mut(layer_idx).copy_from_slice(vw);
                    grads.d_biases_mut(layer_idx).copy_from_slice(vb);
                }
                model.sgd_step(grads, lr);
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t,
                beta1_pow,
                beta2_pow,
                m_weights,
                m_biases,
                v_weights,
                v_biases,
            } => {
                *t += 1;
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;

                let moments = AdamMoments {
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    corr1: 1.0 - *beta1_pow,
                    corr2: 1.0 - *beta2_pow,
                };

                // Overwrite `grads` with the Adam update direction and then reuse `sgd_step`.
                for layer_idx in 0..SurnameClassifier::NUM_LAYERS {
                    moments.apply(
                        grads.d_weights_mut(layer_idx),
                        &mut m_weights[layer_idx],
                        &mut v_weights[layer_idx],
                    );
                    moments.apply(
                        grads.d_biases_mut(layer_idx),
                        &mut m_biases[layer_idx],
                        &mut v_biases[layer_idx],
                    );
                }

                model.sgd_step(grads, lr);
            }
        }
    }
}

struct AdamMoments {
    beta1: f32,
    beta2: f32,
    eps: f32,
    corr1: f32,
    corr2: f32,
}

impl AdamMoments {
    #[inline]
    fn apply(&self, upd: &mut [f32], m: &mut [f32], v: &mut [f32]) {
        debug_assert_eq!(upd.len(), m.len());
        debug_assert_eq!(upd.len(), v.len());

        for ((u, m), v) in upd.iter_mut().zip(m.iter_mut()).zip(v.iter_mut()) {
            let g = *u;
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * (g * g);

            let m_hat = *m / self.corr1;
            let v_hat = *v / self.corr2;
            *u = m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

fn zeros_like_weights(model: &SurnameClassifier) -> PerLayer {
    let (input, hidden, output) = model.dims();
    [vec![0.0; input * hidden], vec![0.0; hidden * output]]
}

fn zeros_like_biases(model: &SurnameClassifier) -> PerLayer {
    let (_, hidden, output) = model.dims();
    [vec![0.0; hidden], vec![0.0; output]]
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, Layer};

    /// 1 -> 1 -> 1 classifier with known parameters.
    fn unit_model() -> SurnameClassifier {
        let fc1 = Layer::from_parts(1, 1, Activation::ReLU, vec![1.0], vec![2.0]).unwrap();
        let fc2 = Layer::from_parts(1, 1, Activation::Identity, vec![1.0], vec![1.0]).unwrap();
        SurnameClassifier::from_layers(fc1, fc2).unwrap()
    }

    fn params(model: &SurnameClassifier, layer_idx: usize) -> (f32, f32) {
        let layer = model.layer(layer_idx).unwrap();
        (layer.weights()[0], layer.biases()[0])
    }

    #[test]
    fn default_is_adam() {
        assert!(matches!(Optimizer::default(), Optimizer::Adam { .. }));
        assert!(Optimizer::default().validate().is_ok());
    }

    #[test]
    fn optimizer_validation_rejects_bad_hyperparams() {
        assert!(Optimizer::SgdMomentum { momentum: 1.0 }.validate().is_err());
        assert!(Optimizer::SgdMomentum { momentum: -0.1 }
            .validate()
            .is_err());
        assert!(Optimizer::Adam {
            beta1: 1.0,
            beta2: 0.999,
            eps: 1e-8
        }
        .validate()
        .is_err());
        assert!(Optimizer::Adam {
            beta1: 0.9,
            beta2: 1.0,
            eps: 1e-8
        }
        .validate()
        .is_err());
        assert!(Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 0.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn sgd_momentum_updates_like_sgd_on_first_step() {
        let mut model = unit_model();
        let mut grads = model.gradients();
        grads.d_weights_mut(0)[0] = 3.0;
        grads.d_biases_mut(0)[0] = 4.0;

        let mut opt = Optimizer::SgdMomentum { momentum: 0.9 }
            .state(&model)
            .unwrap();
        opt.step(&mut model, &mut grads, 0.1);

        let (w, b) = params(&model, 0);
        assert!((w - (1.0 - 0.1 * 3.0)).abs() < 1e-6);
        assert!((b - (2.0 - 0.1 * 4.0)).abs() < 1e-6);
    }

    #[test]
    fn sgd_momentum_accumulates_velocity() {
        let mut model = unit_model();
        let mut opt = Optimizer::SgdMomentum { momentum: 0.5 }
            .state(&model)
            .unwrap();

        for _ in 0..2 {
            let mut grads = model.gradients();
            grads.d_weights_mut(1)[0] = 1.0;
            opt.step(&mut model, &mut grads, 0.1);
        }

        // v1 = 1, v2 = 0.5 * 1 + 1 = 1.5; total step = 0.1 * 2.5.
        let (w, _) = params(&model, 1);
        assert!((w - (1.0 - 0.25)).abs() < 1e-6);
    }

    #[test]
    fn adam_first_step_matches_expected_direction_for_unit_grad() {
        let mut model = unit_model();
        let mut grads = model.gradients();
        grads.d_weights_mut(1)[0] = 1.0;
        grads.d_biases_mut(1)[0] = 1.0;

        let mut opt = Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1.0,
        }
        .state(&model)
        .unwrap();
        opt.step(&mut model, &mut grads, 0.1);
        assert_eq!(opt.steps(), 1);

        // With eps=1.0 and unit grad, the first bias-corrected step has update ~= 1/(1+eps) = 0.5.
        let (w, b) = params(&model, 1);
        assert!((w - (1.0 - 0.1 * 0.5)).abs() < 1e-6);
        assert!((b - (1.0 - 0.1 * 0.5)).abs() < 1e-6);

        // Zero gradients leave the untouched layer alone.
        assert_eq!(params(&model, 0), (1.0, 2.0));
    }

    #[test]
    fn optimizer_config_roundtrips_through_json() {
        let json = serde_json::to_string(&Optimizer::SgdMomentum { momentum: 0.5 }).unwrap();
        assert_eq!(json, r#"{"kind":"sgd_momentum","momentum":0.5}"#);
        let back: Optimizer = serde_json::from_str(r#"{"kind":"sgd"}"#).unwrap();
        assert_eq!(back, Optimizer::Sgd);
    }
}
