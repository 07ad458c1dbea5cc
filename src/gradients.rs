//! Kernel and score gradients via the autodiff backend.
//!
//! Both computations follow the same scoped pattern: re-track the particle
//! tensor (`detach().require_grad()`), record the forward computation, run
//! the backward pass on a scalar reduction, and read the gradient back out
//! of the graph. Everything returned from this module is detached.
//!
//! The kernel gradient carries the single most error-prone sign in the
//! system; see [`kernel_gram_and_grad`].

use crate::distributions::BatchedDensityTarget;
use crate::error::{Result, SvgdError};
use crate::kernel::Kernel;
use burn::prelude::*;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Element;
use num_traits::Float;

/// Rejects NaN/Inf entries with a [`SvgdError::NumericalDegeneracy`].
pub(crate) fn ensure_finite<T, B, const D: usize>(tensor: &Tensor<B, D>, what: &str) -> Result<()>
where
    T: Float + Element,
    B: Backend<FloatElem = T>,
{
    let data = tensor.to_data();
    let values = data
        .as_slice::<T>()
        .expect("Tensor data expected to be dense");
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SvgdError::NumericalDegeneracy(format!(
            "{what} contains non-finite values"
        )));
    }
    Ok(())
}

/// The kernel matrix and its aggregate gradient with respect to the
/// particles.
///
/// Returns `(K, G)` where `K` is the detached `[n, n]` Gram matrix and `G`
/// is the `[n, k]` matrix whose row `i` is the repulsive transport term for
/// particle `i`: the gradient of the summed kernel matrix with respect to
/// `x_i`, negated.
///
/// The negation is deliberate and must happen exactly once, here. The
/// backward pass of the summed Gram matrix aggregates contributions over
/// both kernel axes; with the prime copy of the particles held constant
/// inside the pairwise distance, that aggregate is the *negative* of the
/// repulsive direction `Σⱼ ∇_{xⱼ} k(xⱼ, xᵢ)` that SVGD adds to each
/// particle. Folding the sign into the kernel or the distance computation
/// instead would silently break if either convention changed.
pub fn kernel_gram_and_grad<T, B, K>(
    kernel: &K,
    particles: &Tensor<B, 2>,
) -> Result<(Tensor<B, 2>, Tensor<B, 2>)>
where
    T: Float + Element,
    B: AutodiffBackend<FloatElem = T>,
    K: Kernel<T, B>,
{
    let tracked = particles.clone().detach().require_grad();
    let gram = kernel.gram(tracked.clone())?;

    let grads = gram.clone().sum().backward();
    let grad_inner = tracked.grad(&grads).ok_or_else(|| {
        SvgdError::NumericalDegeneracy(
            "kernel matrix is not connected to the particle tensor".to_string(),
        )
    })?;

    let grad = Tensor::<B, 2>::from_inner(grad_inner).neg();
    ensure_finite(&grad, "kernel gradient")?;
    Ok((gram.detach(), grad))
}

/// The score function `∇ₓ log p(x)` evaluated at every particle.
///
/// Differentiates `Σᵢ log p(xᵢ)` with respect to the whole `[n, k]` particle
/// matrix in one backward pass; because each `p(xᵢ)` depends only on row
/// `i`, row `i` of the result is exactly `∇_{xᵢ} log p(xᵢ)`.
///
/// # Errors
///
/// * [`SvgdError::InvalidInput`] if the density is ≤ 0 at any particle
///   (the logarithm is undefined there).
/// * [`SvgdError::NumericalDegeneracy`] if the density or the resulting
///   gradient contains NaN/Inf.
pub fn score_gradient<T, B, D>(target: &D, particles: &Tensor<B, 2>) -> Result<Tensor<B, 2>>
where
    T: Float + Element,
    B: AutodiffBackend<FloatElem = T>,
    D: BatchedDensityTarget<T, B>,
{
    let tracked = particles.clone().detach().require_grad();
    let density = target.density_batch(tracked.clone());

    {
        let data = density.to_data();
        let values = data
            .as_slice::<T>()
            .expect("Tensor data expected to be dense");
        if values.iter().any(|p| !p.is_finite()) {
            return Err(SvgdError::NumericalDegeneracy(
                "target density produced non-finite values".to_string(),
            ));
        }
        if values.iter().any(|p| *p <= T::zero()) {
            return Err(SvgdError::InvalidInput(
                "target density must be strictly positive at every particle".to_string(),
            ));
        }
    }

    let grads = density.log().sum().backward();
    let grad_inner = tracked.grad(&grads).ok_or_else(|| {
        SvgdError::NumericalDegeneracy(
            "log-density is not connected to the particle tensor".to_string(),
        )
    })?;

    let grad = Tensor::<B, 2>::from_inner(grad_inner);
    ensure_finite(&grad, "score gradient")?;
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{DiffableGaussian2D, FlatDensity, IsotropicGaussian};
    use crate::kernel::{pairwise_sq_distances, RbfKernel};
    use crate::particles::particles_from;
    use crate::stats::to_array2;
    use burn::backend::{Autodiff, NdArray};

    // f64 precision so finite differences resolve cleanly.
    type BackendType = Autodiff<NdArray<f64>>;

    fn fixture() -> Vec<Vec<f64>> {
        vec![
            vec![0.3, -1.2],
            vec![1.1, 0.4],
            vec![-0.7, 0.9],
            vec![0.05, -0.45],
        ]
    }

    /// Pins the sign convention: the kernel gradient equals the
    /// *negated* central finite difference of the per-particle kernel row
    /// sum (with the bandwidth held fixed), i.e. it points away from the
    /// other particles.
    #[test]
    fn test_kernel_gradient_matches_finite_difference() {
        let positions = fixture();
        let x: Tensor<BackendType, 2> = particles_from(positions.clone()).unwrap();
        let kernel = RbfKernel::new();

        let h_sq: f64 = kernel.bandwidth_sq(&pairwise_sq_distances(&x)).unwrap();
        let (_, grad) = kernel_gram_and_grad(&kernel, &x).unwrap();
        let grad = to_array2::<f64, BackendType>(&grad);

        let row_sum = |v: &[f64]| -> f64 {
            positions
                .iter()
                .map(|xj| {
                    let dsq: f64 = v.iter().zip(xj).map(|(a, b)| (a - b) * (a - b)).sum();
                    (-dsq / (2.0 * h_sq)).exp()
                })
                .sum()
        };

        let eps = 1e-6;
        for i in 0..positions.len() {
            for c in 0..2 {
                let mut plus = positions[i].clone();
                let mut minus = positions[i].clone();
                plus[c] += eps;
                minus[c] -= eps;
                let fd = (row_sum(&plus) - row_sum(&minus)) / (2.0 * eps);

                let diff = (grad[[i, c]] + fd).abs();
                assert!(
                    diff < 1e-7,
                    "kernel gradient [{i}, {c}] = {} must equal negated FD {} (diff {diff})",
                    grad[[i, c]],
                    -fd,
                );
            }
        }
    }

    #[test]
    fn test_kernel_gradient_points_apart_for_two_particles() {
        let x: Tensor<BackendType, 2> =
            particles_from(vec![vec![0.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let (_, grad) = kernel_gram_and_grad(&RbfKernel::new(), &x).unwrap();
        let grad = to_array2::<f64, BackendType>(&grad);
        // Particle 0 sits left of particle 1: repulsion pushes it further left
        // and particle 1 further right, with no vertical component.
        assert!(grad[[0, 0]] < 0.0, "got {}", grad[[0, 0]]);
        assert!(grad[[1, 0]] > 0.0, "got {}", grad[[1, 0]]);
        assert!(grad[[0, 1]].abs() < 1e-10 && grad[[1, 1]].abs() < 1e-10);
    }

    #[test]
    fn test_score_gradient_matches_gaussian_analytic() {
        let mean = [0.5, -1.0];
        let cov = [[2.0, 0.3], [0.3, 1.5]];
        let target = DiffableGaussian2D::new(mean, cov);

        let positions = fixture();
        let x: Tensor<BackendType, 2> = particles_from(positions.clone()).unwrap();
        let grad = to_array2::<f64, BackendType>(&score_gradient(&target, &x).unwrap());

        // ∇ log p = −Σ⁻¹ (x − μ)
        let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
        let inv = [
            [cov[1][1] / det, -cov[0][1] / det],
            [-cov[1][0] / det, cov[0][0] / det],
        ];
        for (i, pos) in positions.iter().enumerate() {
            let d = [pos[0] - mean[0], pos[1] - mean[1]];
            let expected = [
                -(inv[0][0] * d[0] + inv[0][1] * d[1]),
                -(inv[1][0] * d[0] + inv[1][1] * d[1]),
            ];
            for c in 0..2 {
                assert!(
                    (grad[[i, c]] - expected[c]).abs() < 1e-9,
                    "score gradient [{i}, {c}]: got {}, expected {}",
                    grad[[i, c]],
                    expected[c]
                );
            }
        }
    }

    #[test]
    fn test_score_gradient_of_isotropic_gaussian() {
        let target = IsotropicGaussian::new(2.0);
        let x: Tensor<BackendType, 2> =
            particles_from(vec![vec![4.0, -8.0], vec![0.0, 0.0]]).unwrap();
        let grad = to_array2::<f64, BackendType>(&score_gradient(&target, &x).unwrap());
        // ∇ log p = −x / σ²
        assert!((grad[[0, 0]] + 1.0).abs() < 1e-10);
        assert!((grad[[0, 1]] - 2.0).abs() < 1e-10);
        assert!(grad[[1, 0]].abs() < 1e-10 && grad[[1, 1]].abs() < 1e-10);
    }

    #[test]
    fn test_flat_density_has_zero_score() {
        let x: Tensor<BackendType, 2> = particles_from(fixture()).unwrap();
        let grad = to_array2::<f64, BackendType>(&score_gradient(&FlatDensity, &x).unwrap());
        assert!(
            grad.iter().all(|v| v.abs() < 1e-12),
            "flat density must have a zero score gradient, got {grad:?}"
        );
    }

    #[test]
    fn test_nonpositive_density_is_invalid_input() {
        // A density that goes negative for particles left of the origin.
        struct LinearDensity;
        impl BatchedDensityTarget<f64, BackendType> for LinearDensity {
            fn density_batch(&self, positions: Tensor<BackendType, 2>) -> Tensor<BackendType, 1> {
                positions.sum_dim(1).squeeze(1)
            }
        }

        let x: Tensor<BackendType, 2> =
            particles_from(vec![vec![1.0, 1.0], vec![-5.0, 0.0]]).unwrap();
        let err = score_gradient(&LinearDensity, &x).unwrap_err();
        assert!(matches!(err, SvgdError::InvalidInput(_)), "got {err:?}");
    }
}
