//! The first-order optimizer driving the particle update.
//!
//! SVGD only needs one operation from its optimizer: "apply this gradient to
//! that parameter tensor, in place, using your own accumulated state". The
//! [`GradientOptimizer`] trait is that seam; [`Adam`] is the stock
//! implementation with bias-corrected first and second moments.
//!
//! Note the convention: optimizers *subtract* the applied gradient. SVGD's
//! transport is additive, so the update loop pre-negates the direction
//! before handing it over (see [`crate::svgd`]).

use crate::error::{Result, SvgdError};
use burn::prelude::*;
use burn::tensor::backend::Backend;

/// A first-order optimizer over an `[n, k]` parameter tensor.
///
/// Implementations own their per-parameter state (moment accumulators and
/// the like); one optimizer instance must serve exactly one parameter
/// tensor.
pub trait GradientOptimizer<B: Backend> {
    /// Applies one descent step: mutates `params` in place using `gradient`
    /// and the accumulated internal state.
    fn apply_gradient(&mut self, gradient: Tensor<B, 2>, params: &mut Tensor<B, 2>) -> Result<()>;
}

/// Adam with bias correction and the stock decay hyperparameters
/// (β₁ = 0.9, β₂ = 0.999, ε = 1e-8).
///
/// Moment tensors are allocated lazily from the first gradient; their shape
/// is pinned from then on.
#[derive(Debug, Clone)]
pub struct Adam<B: Backend> {
    learning_rate: f64,
    beta_1: f64,
    beta_2: f64,
    epsilon: f64,
    step_count: usize,
    first_moment: Option<Tensor<B, 2>>,
    second_moment: Option<Tensor<B, 2>>,
}

impl<B: Backend> Adam<B> {
    /// Adam with the given learning rate and default decay hyperparameters.
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            step_count: 0,
            first_moment: None,
            second_moment: None,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of steps applied so far.
    pub fn step_count(&self) -> usize {
        self.step_count
    }
}

impl<B: Backend> GradientOptimizer<B> for Adam<B> {
    fn apply_gradient(&mut self, gradient: Tensor<B, 2>, params: &mut Tensor<B, 2>) -> Result<()> {
        if gradient.dims() != params.dims() {
            return Err(SvgdError::InvalidInput(format!(
                "gradient shape {:?} does not match parameter shape {:?}",
                gradient.dims(),
                params.dims()
            )));
        }

        let grad = gradient.detach();
        let first_moment = match self.first_moment.take() {
            Some(m) if m.dims() != grad.dims() => {
                return Err(SvgdError::InvalidInput(format!(
                    "optimizer state shape {:?} does not match gradient shape {:?}; \
                     one Adam instance serves exactly one parameter tensor",
                    m.dims(),
                    grad.dims()
                )));
            }
            Some(m) => m,
            None => grad.zeros_like(),
        };
        let second_moment = self
            .second_moment
            .take()
            .unwrap_or_else(|| grad.zeros_like());

        self.step_count += 1;

        let first_moment =
            first_moment.mul_scalar(self.beta_1) + grad.clone().mul_scalar(1.0 - self.beta_1);
        let second_moment = second_moment.mul_scalar(self.beta_2)
            + grad.powi_scalar(2).mul_scalar(1.0 - self.beta_2);

        let bias_1 = 1.0 - self.beta_1.powi(self.step_count as i32);
        let bias_2 = 1.0 - self.beta_2.powi(self.step_count as i32);
        let step = first_moment
            .clone()
            .div_scalar(bias_1)
            .div(second_moment.clone().div_scalar(bias_2).sqrt().add_scalar(self.epsilon))
            .mul_scalar(self.learning_rate);

        params.inplace(|p| (p - step).detach());

        self.first_moment = Some(first_moment);
        self.second_moment = Some(second_moment);
        Ok(())
    }
}
