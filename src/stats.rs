//! Host-side summaries of particle sets.
//!
//! Diagnostics and end-to-end tests judge convergence by the first two
//! empirical moments of the particle cloud; these helpers read a particle
//! tensor back to the host and compute them with `ndarray`.

use crate::error::{Result, SvgdError};
use burn::prelude::*;
use burn::tensor::backend::Backend;
use burn::tensor::Element;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_stats::CorrelationExt;
use num_traits::FromPrimitive;

/// Reads an `[n, k]` tensor back into a host `ndarray` matrix.
pub fn to_array2<T: Element, B: Backend>(tensor: &Tensor<B, 2>) -> Array2<T> {
    let dims = tensor.dims();
    let data = tensor.to_data();
    let slice = data
        .as_slice::<T>()
        .expect("Tensor data expected to be dense");
    Array2::from_shape_vec((dims[0], dims[1]), slice.to_vec()).expect("Shape mismatch")
}

/// Per-coordinate mean of the particle cloud (the centroid).
pub fn sample_mean<T>(particles: ArrayView2<T>) -> Result<Array1<T>>
where
    T: ndarray::NdFloat + FromPrimitive,
{
    particles.mean_axis(Axis(0)).ok_or_else(|| {
        SvgdError::InvalidInput("cannot summarize an empty particle matrix".to_string())
    })
}

/// Unbiased empirical covariance of the particle cloud, shape `[k, k]`.
pub fn sample_cov<T>(particles: ArrayView2<T>) -> Result<Array2<T>>
where
    T: ndarray::NdFloat + FromPrimitive,
{
    particles
        .t()
        .cov(T::one())
        .map_err(|e| SvgdError::InvalidInput(format!("covariance undefined: {e}")))
}
