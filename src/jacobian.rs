use nalgebra::DVector;

use crate::differentiate::central_partial;
use crate::error::{GeometryError, Result};
use crate::state_space::StateSpace;

/// Default relative bump size, as a fraction of a dimension's span, used by
/// [`Jacobian::compute`] and [`Jacobian::compute_direct`] when no explicit `h` is
/// given.
pub const DEFAULT_BUMP: f64 = 1e-4;

/// First partial derivatives of a scalar function at a point, computed by central
/// finite differences.
///
/// `compute` reads through a [`StateSpace`]'s multilinear interpolation;
/// `compute_direct` evaluates an arbitrary callable directly. The gradient is only
/// meaningful while `valid()` is true.
#[derive(Debug, Clone)]
pub struct Jacobian {
    n: usize,
    point: Vec<f64>,
    grad: DVector<f64>,
    center: f64,
    valid: bool,
}

impl Jacobian {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            point: vec![0.0; n],
            grad: DVector::zeros(n),
            center: 0.0,
            valid: false,
        }
    }

    pub fn ndim(&self) -> usize {
        self.n
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn center_value(&self) -> f64 {
        self.center
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn get(&self, i: usize) -> Result<f64> {
        self.grad
            .get(i)
            .copied()
            .ok_or_else(|| GeometryError::InvalidArgument(format!("axis {i} out of range")))
    }

    /// Computes the gradient of `space`'s interpolated price surface at `point`.
    ///
    /// Scales the bump per dimension: `h_d = bump * (max_d - min_d)`.
    pub fn compute(&mut self, space: &StateSpace, point: &[f64]) -> Result<()> {
        self.compute_with_bump(space, point, DEFAULT_BUMP)
    }

    pub fn compute_with_bump(&mut self, space: &StateSpace, point: &[f64], bump: f64) -> Result<()> {
        if point.is_empty() {
            return Err(GeometryError::NullPointer("jacobian compute point"));
        }
        if space.ndim() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: space.ndim(),
            });
        }
        if point.len() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: point.len(),
            });
        }
        if !space.prices_valid() {
            return Err(GeometryError::NotInitialized("prices not mapped"));
        }

        let center = space.interpolate(point)?;
        let mut scratch = point.to_vec();
        let mut grad = DVector::zeros(self.n);
        for d in 0..self.n {
            let h_d = bump * (space.dims()[d].max() - space.dims()[d].min());
            let x0 = scratch[d];
            scratch[d] = x0 + h_d;
            let f_plus = space.interpolate(&scratch)?;
            scratch[d] = x0 - h_d;
            let f_minus = space.interpolate(&scratch)?;
            scratch[d] = x0;
            grad[d] = (f_plus - f_minus) / (2.0 * h_d);
        }

        self.point = point.to_vec();
        self.grad = grad;
        self.center = center;
        self.valid = true;
        Ok(())
    }

    /// Computes the gradient of an arbitrary callable at `point` directly, with a
    /// caller-supplied absolute step `h`.
    pub fn compute_direct(&mut self, f: &dyn Fn(&[f64]) -> f64, point: &[f64], h: f64) -> Result<()> {
        if point.is_empty() {
            return Err(GeometryError::NullPointer("jacobian compute_direct point"));
        }
        if point.len() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: point.len(),
            });
        }

        let mut scratch = point.to_vec();
        let center = f(&scratch);
        let mut grad = DVector::zeros(self.n);
        for d in 0..self.n {
            grad[d] = central_partial(f, &mut scratch, d, h);
        }

        self.point = point.to_vec();
        self.grad = grad;
        self.center = center;
        self.valid = true;
        Ok(())
    }

    pub fn norm(&self) -> f64 {
        self.grad.norm()
    }

    pub fn linf_norm(&self) -> f64 {
        self.grad.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()))
    }

    /// Index of the axis with the largest-magnitude partial derivative.
    pub fn most_sensitive_dim(&self) -> Option<usize> {
        if self.n == 0 {
            return None;
        }
        self.grad
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
            .map(|(i, _)| i)
    }

    /// Unit gradient direction; the zero vector if the gradient norm is below
    /// `1e-15`.
    pub fn direction(&self) -> DVector<f64> {
        let norm = self.norm();
        if norm < 1e-15 {
            DVector::zeros(self.n)
        } else {
            &self.grad / norm
        }
    }

    /// Directional derivative `sum_i d_i * v_i`.
    pub fn directional_derivative(&self, v: &[f64]) -> Result<f64> {
        if v.len() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: v.len(),
            });
        }
        Ok(self.grad.iter().zip(v.iter()).map(|(g, x)| g * x).sum())
    }
}
