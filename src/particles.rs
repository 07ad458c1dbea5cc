//! Particle-set initialization and conversion helpers.
//!
//! SVGD owns no randomness of its own: the update loop is deterministic
//! given the starting particles. These helpers draw starting clouds from
//! Gaussians and convert host positions into the `[n, k]` tensor the update
//! loop works on.

use crate::error::{Result, SvgdError};
use burn::prelude::*;
use burn::tensor::backend::Backend;
use burn::tensor::Element;
use num_traits::{Float, FromPrimitive};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Draws `n` starting particles from the `d`-dimensional standard normal.
///
/// Non-deterministic; use [`init_with_seed`] for reproducible clouds.
pub fn init<T>(n: usize, d: usize) -> Vec<Vec<T>>
where
    T: Float + FromPrimitive,
{
    init_with_seed(n, d, rand::rng().random::<u64>())
}

/// Deterministic variant of [`init`].
pub fn init_with_seed<T>(n: usize, d: usize, seed: u64) -> Vec<Vec<T>>
where
    T: Float + FromPrimitive,
{
    init_around(n, &vec![T::zero(); d], T::one(), seed)
}

/// Draws `n` particles from an isotropic Gaussian centered at `center` with
/// standard deviation `std`.
///
/// Useful for starting the cloud away from the target's mass, e.g. a unit
/// cloud at `(5, 5)` when the target sits at the origin.
pub fn init_around<T>(n: usize, center: &[T], std: T, seed: u64) -> Vec<Vec<T>>
where
    T: Float + FromPrimitive,
{
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            center
                .iter()
                .map(|&c| {
                    let noise: f64 = rng.sample(StandardNormal);
                    c + T::from_f64(noise).unwrap() * std
                })
                .collect()
        })
        .collect()
}

/// Converts host positions of shape `[n][k]` into an `[n, k]` tensor.
///
/// # Errors
///
/// [`SvgdError::InvalidInput`] if the positions are empty, zero-dimensional
/// or ragged (rows of differing lengths).
pub fn particles_from<T, B>(positions: Vec<Vec<T>>) -> Result<Tensor<B, 2>>
where
    T: Float + Element,
    B: Backend<FloatElem = T>,
{
    let n = positions.len();
    if n == 0 {
        return Err(SvgdError::InvalidInput(
            "particle set must not be empty".to_string(),
        ));
    }
    let dim = positions[0].len();
    if dim == 0 {
        return Err(SvgdError::InvalidInput(
            "particles must have at least one coordinate".to_string(),
        ));
    }
    if positions.iter().any(|row| row.len() != dim) {
        return Err(SvgdError::InvalidInput(format!(
            "ragged particle set: expected every row to have length {dim}"
        )));
    }

    let flat: Vec<T> = positions.into_iter().flatten().collect();
    let td = TensorData::new(flat, [n, dim]);
    Ok(Tensor::<B, 2>::from_data(td, &B::Device::default()))
}
