//! The SVGD update loop.
//!
//! Each iteration combines the kernel-smoothed score with the repulsive
//! kernel gradient into a transport direction and feeds it through the
//! optimizer:
//!
//! ```text
//! φ  =  −(K · ∇log p  +  Gk) / n
//! ```
//!
//! where `K` is the Gram matrix, `∇log p` the per-particle score and `Gk`
//! the aggregate kernel gradient. The leading minus is the *second* of the
//! two sign conventions in this crate (the first lives in
//! [`crate::gradients::kernel_gram_and_grad`]): the optimizer subtracts the
//! gradient it is given, while SVGD's transport is additive, so the
//! direction is pre-negated such that the subtraction lands on the correct
//! additive update. The two corrections live in separate places and each is
//! pinned by its own test.
//!
//! Iterations are strictly sequential: step `i + 1` reads the particle
//! positions produced by step `i`. Errors abort the call immediately;
//! positions mutated by completed earlier iterations are retained.

use crate::adam::{Adam, GradientOptimizer};
use crate::distributions::BatchedDensityTarget;
use crate::error::{Result, SvgdError};
use crate::gradients::{ensure_finite, kernel_gram_and_grad, score_gradient};
use crate::kernel::Kernel;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Element;
use num_traits::Float;
use std::marker::PhantomData;

/// A Stein Variational Gradient Descent engine.
///
/// Owns the kernel, the target density and the optimizer (including its
/// moment state, which persists across iterations and across `update`
/// calls). The particle tensor itself is owned by the caller and borrowed
/// mutably for the duration of each `update`; it must not be aliased or
/// mutated elsewhere while an update runs.
///
/// # Type Parameters
///
/// * `T`: Floating-point type for numerical calculations.
/// * `B`: Autodiff backend from the `burn` crate.
/// * `K`: The kernel type implementing the [`Kernel`] trait.
/// * `D`: The target density type implementing [`BatchedDensityTarget`].
/// * `O`: The optimizer, [`Adam`] unless overridden via `with_optimizer`.
#[derive(Debug)]
pub struct Svgd<T, B, K, D, O = Adam<B>>
where
    B: AutodiffBackend,
{
    kernel: K,
    target: D,
    optimizer: O,
    _phantom: PhantomData<(T, B)>,
}

impl<T, B, K, D> Svgd<T, B, K, D, Adam<B>>
where
    T: Float + Element,
    B: AutodiffBackend<FloatElem = T>,
    K: Kernel<T, B>,
    D: BatchedDensityTarget<T, B>,
{
    /// Creates an SVGD engine driven by Adam with the given learning rate
    /// and default decay hyperparameters.
    pub fn new(kernel: K, target: D, learning_rate: f64) -> Self {
        Self {
            kernel,
            target,
            optimizer: Adam::new(learning_rate),
            _phantom: PhantomData,
        }
    }
}

impl<T, B, K, D, O> Svgd<T, B, K, D, O>
where
    T: Float + Element,
    B: AutodiffBackend<FloatElem = T>,
    K: Kernel<T, B>,
    D: BatchedDensityTarget<T, B>,
    O: GradientOptimizer<B>,
{
    /// Creates an SVGD engine with a caller-supplied optimizer.
    ///
    /// The optimizer's accumulated state must not be shared with any other
    /// particle set.
    pub fn with_optimizer(kernel: K, target: D, optimizer: O) -> Self {
        Self {
            kernel,
            target,
            optimizer,
            _phantom: PhantomData,
        }
    }

    /// Runs `n_iterations` SVGD steps, mutating `particles` in place.
    ///
    /// # Errors
    ///
    /// * [`SvgdError::InvalidInput`] if the particle matrix has fewer than
    ///   two rows or zero columns (checked up front, particles untouched),
    ///   or if the target density is non-positive at any particle.
    /// * [`SvgdError::NumericalDegeneracy`] if all particles coincide (the
    ///   median bandwidth collapses to zero) or any gradient goes
    ///   non-finite. Positions from completed earlier iterations are
    ///   retained.
    pub fn update(&mut self, particles: &mut Tensor<B, 2>, n_iterations: usize) -> Result<()> {
        self.validate(particles)?;
        for _ in 0..n_iterations {
            self.step(particles)?;
        }
        Ok(())
    }

    /// Same as [`Svgd::update`] but displays an `indicatif` progress bar
    /// with a live read-out of the mean transport magnitude.
    pub fn update_progress(
        &mut self,
        particles: &mut Tensor<B, 2>,
        n_iterations: usize,
    ) -> Result<()> {
        use indicatif::{ProgressBar, ProgressStyle};

        self.validate(particles)?;

        let pb = ProgressBar::new(n_iterations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.cyan/blue} {pos}/{len} ({eta}) | {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb.set_prefix("SVGD");

        let mut last_sync = std::time::Instant::now();
        let sync_interval = std::time::Duration::from_millis(500);

        for step_idx in 0..n_iterations {
            let direction = self.step(particles)?;
            pb.inc(1);

            if step_idx + 1 == n_iterations || last_sync.elapsed() >= sync_interval {
                let data = direction.abs().mean().to_data();
                if let Ok(slice) = data.as_slice::<T>() {
                    let magnitude = burn::tensor::cast::ToElement::to_f64(&slice[0]);
                    pb.set_message(format!("mean |φ|≈{magnitude:.2e}"));
                }
                last_sync = std::time::Instant::now();
            }
        }
        pb.finish_with_message("Done!");
        Ok(())
    }

    /// Performs one SVGD step on all particles simultaneously and returns
    /// the (detached) transport direction that was applied.
    pub fn step(&mut self, particles: &mut Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let (gram, kernel_grad) = kernel_gram_and_grad(&self.kernel, particles)?;
        let score = score_gradient(&self.target, particles)?;

        let n = particles.dims()[0];
        let direction = (gram.matmul(score) + kernel_grad)
            .neg()
            .div_scalar(T::from(n).unwrap())
            .detach();
        ensure_finite(&direction, "transport direction")?;

        self.optimizer.apply_gradient(direction.clone(), particles)?;
        Ok(direction)
    }

    fn validate(&self, particles: &Tensor<B, 2>) -> Result<()> {
        let [n, d] = particles.dims();
        if n < 2 {
            return Err(SvgdError::InvalidInput(format!(
                "SVGD needs at least two particles, got {n}"
            )));
        }
        if d == 0 {
            return Err(SvgdError::InvalidInput(
                "particles must have at least one coordinate".to_string(),
            ));
        }
        Ok(())
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{FlatDensity, IsotropicGaussian};
    use crate::kernel::RbfKernel;
    use crate::particles::particles_from;
    use crate::stats::to_array2;
    use burn::backend::{Autodiff, NdArray};

    type BackendType = Autodiff<NdArray>;

    fn tensor_of(rows: Vec<Vec<f32>>) -> Tensor<BackendType, 2> {
        particles_from(rows).unwrap()
    }

    #[test]
    fn test_flat_density_pure_repulsion_drives_particles_apart() {
        let mut x = tensor_of(vec![vec![0.0, 0.0], vec![1.0, 0.0]]);
        let mut svgd =
            Svgd::<f32, BackendType, _, _>::new(RbfKernel::new(), FlatDensity, 0.05);
        svgd.update(&mut x, 1).unwrap();

        let p = to_array2::<f32, BackendType>(&x);
        let sep = ((p[[0, 0]] - p[[1, 0]]).powi(2) + (p[[0, 1]] - p[[1, 1]]).powi(2)).sqrt();
        assert!(
            sep > 1.0,
            "repulsion must strictly increase the separation, got {sep}"
        );
    }

    #[test]
    fn test_single_particle_is_rejected_unmodified() {
        let mut x = tensor_of(vec![vec![2.5, -1.5]]);
        let before = x.to_data().as_slice::<f32>().unwrap().to_vec();

        let mut svgd =
            Svgd::<f32, BackendType, _, _>::new(RbfKernel::new(), FlatDensity, 0.1);
        let err = svgd.update(&mut x, 10).unwrap_err();
        assert!(matches!(err, SvgdError::InvalidInput(_)), "got {err:?}");

        let after = x.to_data().as_slice::<f32>().unwrap().to_vec();
        assert_eq!(before, after, "particles must be untouched on rejection");
    }

    #[test]
    fn test_coincident_particles_raise_degeneracy() {
        let mut x = tensor_of(vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
        let mut svgd =
            Svgd::<f32, BackendType, _, _>::new(RbfKernel::new(), FlatDensity, 0.1);
        let err = svgd.update(&mut x, 1).unwrap_err();
        assert!(
            matches!(err, SvgdError::NumericalDegeneracy(_)),
            "got {err:?}"
        );
    }

    #[test]
    fn test_zero_iterations_is_a_noop() {
        let mut x = tensor_of(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        let before = x.to_data().as_slice::<f32>().unwrap().to_vec();
        let mut svgd =
            Svgd::<f32, BackendType, _, _>::new(RbfKernel::new(), FlatDensity, 0.1);
        svgd.update(&mut x, 0).unwrap();
        let after = x.to_data().as_slice::<f32>().unwrap().to_vec();
        assert_eq!(before, after);
    }

    #[test]
    fn test_particles_move_toward_isotropic_target() {
        // 8 particles started around (4, 4); after a few hundred steps the
        // centroid must be much closer to the origin than where it began.
        let start = crate::particles::init_around(8, &[4.0_f32, 4.0], 0.5, 42);
        let mut x: Tensor<BackendType, 2> = particles_from(start).unwrap();

        let mut svgd = Svgd::<f32, BackendType, _, _>::new(
            RbfKernel::new(),
            IsotropicGaussian::new(1.0),
            0.1,
        );
        svgd.update(&mut x, 300).unwrap();

        let p = to_array2::<f32, BackendType>(&x);
        let n = p.nrows() as f32;
        let centroid = [
            p.column(0).iter().sum::<f32>() / n,
            p.column(1).iter().sum::<f32>() / n,
        ];
        let dist = (centroid[0].powi(2) + centroid[1].powi(2)).sqrt();
        assert!(
            dist < 1.0,
            "centroid should approach the origin, still at distance {dist}"
        );
    }

    #[test]
    fn test_step_returns_pre_negated_direction() {
        // With a flat target, φ = −Gk / n where Gk is repulsive; the
        // returned direction must therefore point the particles *toward*
        // each other (the optimizer's subtraction flips it back).
        let mut x = tensor_of(vec![vec![0.0, 0.0], vec![1.0, 0.0]]);
        let mut svgd =
            Svgd::<f32, BackendType, _, _>::new(RbfKernel::new(), FlatDensity, 0.05);
        let direction = svgd.step(&mut x).unwrap();
        let d = to_array2::<f32, BackendType>(&direction);
        assert!(d[[0, 0]] > 0.0, "got {}", d[[0, 0]]);
        assert!(d[[1, 0]] < 0.0, "got {}", d[[1, 0]]);
    }
}
