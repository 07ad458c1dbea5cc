/*!
Target densities for SVGD.

This module is generic over the floating-point precision (e.g. `f32` or
`f64`) using [`num_traits::Float`]. It defines the
[`BatchedDensityTarget`] trait, a density `p: ℝᵏ → ℝ≥0` evaluated for a
whole batch of particles at once, plus a few ready-made targets:

- [`DiffableGaussian2D`] for a full-covariance 2D Gaussian,
- [`IsotropicGaussian`] for an any-dimension spherical Gaussian,
- [`FlatDensity`], constant everywhere, for isolating kernel repulsion.

SVGD only ever consumes the density through `log p` and its gradient, so
targets may be unnormalized.
*/

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Element;
use num_traits::Float;

/// A batched target density evaluated per particle.
///
/// Implement this trait for your target distribution. The returned values
/// must be strictly positive wherever particles can land (SVGD takes their
/// logarithm) and the computation must stay on differentiable tensor
/// primitives so the backend can propagate gradients through it.
///
/// # Type Parameters
///
/// * `T`: The floating-point type (e.g., f32 or f64).
/// * `B`: The autodiff backend from the `burn` crate.
pub trait BatchedDensityTarget<T: Float, B: AutodiffBackend> {
    /// Density values for a batch of particles.
    ///
    /// `positions` has shape `[n, k]`; the result has shape `[n]` with entry
    /// `i` equal to `p(xᵢ)`.
    fn density_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1>;
}

/// A 2D Gaussian density parameterized by mean and covariance.
///
/// The covariance inverse and normalization constant are precomputed so the
/// batched density evaluation is two small matmuls and an `exp`.
#[derive(Debug, Clone)]
pub struct DiffableGaussian2D<T: Float> {
    pub mean: [T; 2],
    pub cov: [[T; 2]; 2],
    inv_cov: [[T; 2]; 2],
    norm_const: T,
}

impl<T> DiffableGaussian2D<T>
where
    T: Float + std::fmt::Debug + num_traits::FloatConst,
{
    /// Create a new 2D Gaussian with the specified mean and covariance.
    pub fn new(mean: [T; 2], cov: [[T; 2]; 2]) -> Self {
        let det_cov = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
        // Inverse of a 2x2: [a, b; c, d]^-1 = (1/det) [d, -b; -c, a]
        let inv_det = T::one() / det_cov;
        let inv_cov = [
            [cov[1][1] * inv_det, -cov[0][1] * inv_det],
            [-cov[1][0] * inv_det, cov[0][0] * inv_det],
        ];
        // log normalizer: -1/2 [2 ln(2π) + ln(det Σ)]
        let two = T::one() + T::one();
        let norm_const = -(two * (two * T::PI()).ln() + det_cov.ln()) / two;

        Self {
            mean,
            cov,
            inv_cov,
            norm_const,
        }
    }
}

impl<T, B> BatchedDensityTarget<T, B> for DiffableGaussian2D<T>
where
    T: Float + Element + std::fmt::Debug,
    B: AutodiffBackend<FloatElem = T>,
{
    /// Evaluate the density for a batch of positions of shape `[n, 2]`.
    fn density_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1> {
        let (n, dim) = (positions.dims()[0], positions.dims()[1]);
        assert_eq!(dim, 2, "DiffableGaussian2D: expected dimension=2.");

        let device = B::Device::default();
        // TensorData keeps the constants at the backend's own precision; a
        // float-literal construction would round them through f32.
        let mean_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(vec![self.mean[0], self.mean[1]], [1, 2]),
            &device,
        )
        .expand([n, 2]);

        let delta = positions - mean_tensor;

        let inv_cov_t = Tensor::<B, 2>::from_data(
            TensorData::new(
                vec![
                    self.inv_cov[0][0],
                    self.inv_cov[0][1],
                    self.inv_cov[1][0],
                    self.inv_cov[1][1],
                ],
                [2, 2],
            ),
            &device,
        );

        let z = delta.clone().matmul(inv_cov_t); // [n, 2]
        let quad = (z * delta).sum_dim(1).squeeze(1); // [n]
        let half = T::from(0.5).unwrap();
        quad.mul_scalar(half).neg().add_scalar(self.norm_const).exp()
    }
}

/// An isotropic Gaussian density of any dimension, centered at the origin.
///
/// Unnormalized: `p(x) = exp(−‖x‖² / (2σ²))`. SVGD is insensitive to the
/// missing constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsotropicGaussian<T: Float> {
    pub std: T,
}

impl<T: Float> IsotropicGaussian<T> {
    pub fn new(std: T) -> Self {
        Self { std }
    }
}

impl<T, B> BatchedDensityTarget<T, B> for IsotropicGaussian<T>
where
    T: Float + Element,
    B: AutodiffBackend<FloatElem = T>,
{
    fn density_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1> {
        let half = T::from(0.5).unwrap();
        let var = self.std * self.std;
        let quad = positions.powi_scalar(2).sum_dim(1).squeeze(1);
        quad.mul_scalar(half / var).neg().exp()
    }
}

/// A constant (improper) density, `p ≡ 1` everywhere.
///
/// Its score gradient is exactly zero, which reduces the SVGD direction to
/// pure kernel repulsion. Useful for tests and for watching the repulsive
/// term in isolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlatDensity;

impl<T, B> BatchedDensityTarget<T, B> for FlatDensity
where
    T: Float + Element,
    B: AutodiffBackend<FloatElem = T>,
{
    fn density_batch(&self, positions: Tensor<B, 2>) -> Tensor<B, 1> {
        // The zero-weighted term keeps the output attached to the autodiff
        // graph, so the score gradient is a defined (zero) tensor rather
        // than a missing one.
        positions.mul_scalar(0.0).sum_dim(1).squeeze(1).add_scalar(1.0)
    }
}
