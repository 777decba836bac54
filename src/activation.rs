//! Activation functions.
//!
//! A dense layer computes `z = W x + b` and then `y = activation(z)` element-wise.
//! Only post-activation outputs are cached; backprop derives `dy/dz` from `y`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Element-wise activation function.
pub enum Activation {
    ReLU,
    /// Linear output, used for the logits layer.
    Identity,
}

impl Activation {
    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Identity => x,
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Identity => 1.0,
        }
    }
}
