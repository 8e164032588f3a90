use nalgebra::DMatrix;

use crate::differentiate::{diagonal_second_partial, mixed_second_partial};
use crate::error::{GeometryError, Result};
use crate::jacobian::DEFAULT_BUMP;
use crate::state_space::StateSpace;

const JACOBI_TOLERANCE: f64 = 1e-12;
const JACOBI_MAX_SWEEPS: usize = 100;
const EIGENVALUE_FLOOR: f64 = 1e-15;
const CONDITION_SENTINEL: f64 = 1e15;

/// Strict sign classification of a Hessian's eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Definiteness {
    PositiveDefinite,
    NegativeDefinite,
    Indefinite,
}

/// The symmetric matrix of second partial derivatives at a point, plus its cached
/// Jacobi eigendecomposition.
///
/// Writing `H` (via `compute`/`compute_direct`) invalidates the eigenvalue cache;
/// [`Hessian::eigenvalues`] repopulates it on demand from a working copy, so `H`
/// itself is never mutated by the eigensolver.
#[derive(Debug, Clone)]
pub struct Hessian {
    n: usize,
    point: Vec<f64>,
    h: DMatrix<f64>,
    eigenvalues: Option<DVectorCache>,
    valid: bool,
}

type DVectorCache = nalgebra::DVector<f64>;

impl Hessian {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            point: vec![0.0; n],
            h: DMatrix::zeros(n, n),
            eigenvalues: None,
            valid: false,
        }
    }

    pub fn ndim(&self) -> usize {
        self.n
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn eigen_valid(&self) -> bool {
        self.eigenvalues.is_some()
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn get(&self, i: usize, j: usize) -> Result<f64> {
        if i >= self.n || j >= self.n {
            return Err(GeometryError::InvalidArgument(format!(
                "index ({i}, {j}) out of range for a {0}x{0} Hessian",
                self.n
            )));
        }
        Ok(self.h[(i, j)])
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.h
    }

    fn invalidate_eigen(&mut self) {
        self.eigenvalues = None;
    }

    /// Grid-backed compute. Per §4.4: `h_d` is pinned to the dimension's step size
    /// when it is finite and non-trivial, never to the raw configured bump --
    /// bumping by less than a grid step collapses adjacent stencil points to the
    /// same node under nearest-neighbour/interpolated evaluation and explodes the
    /// second derivative.
    pub fn compute(&mut self, space: &StateSpace, point: &[f64]) -> Result<()> {
        if point.is_empty() {
            return Err(GeometryError::NullPointer("hessian compute point"));
        }
        if space.ndim() != self.n || point.len() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: space.ndim().max(point.len()),
            });
        }
        if !space.prices_valid() {
            return Err(GeometryError::NotInitialized("prices not mapped"));
        }

        let steps: Vec<f64> = (0..self.n)
            .map(|d| {
                let step = space.dims()[d].step();
                if step.is_finite() && step > 0.0 {
                    step
                } else {
                    DEFAULT_BUMP
                }
            })
            .collect();

        let mut scratch = point.to_vec();
        let f0 = space.interpolate(&scratch)?;
        let mut h = DMatrix::zeros(self.n, self.n);
        for i in 0..self.n {
            h[(i, i)] = diagonal_second_partial_grid(space, &mut scratch, i, steps[i], f0)?;
        }
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                let v = mixed_second_partial_grid(space, &mut scratch, i, j, steps[i], steps[j])?;
                h[(i, j)] = v;
                h[(j, i)] = v;
            }
        }

        self.point = point.to_vec();
        self.h = h;
        self.valid = true;
        self.invalidate_eigen();
        Ok(())
    }

    /// Direct compute against an arbitrary callable with a caller-supplied absolute
    /// step `h`.
    pub fn compute_direct(&mut self, f: &dyn Fn(&[f64]) -> f64, point: &[f64], h: f64) -> Result<()> {
        if point.is_empty() {
            return Err(GeometryError::NullPointer("hessian compute_direct point"));
        }
        if point.len() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: point.len(),
            });
        }

        let mut scratch = point.to_vec();
        let mut hm = DMatrix::zeros(self.n, self.n);
        for i in 0..self.n {
            hm[(i, i)] = diagonal_second_partial(f, &mut scratch, i, h);
        }
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                let v = mixed_second_partial(f, &mut scratch, i, j, h, h);
                hm[(i, j)] = v;
                hm[(j, i)] = v;
            }
        }

        self.point = point.to_vec();
        self.h = hm;
        self.valid = true;
        self.invalidate_eigen();
        Ok(())
    }

    pub fn trace(&self) -> f64 {
        (0..self.n).map(|i| self.h[(i, i)]).sum()
    }

    pub fn frobenius(&self) -> f64 {
        self.h.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Classical Jacobi eigenvalue iteration on a working copy of `H`, so `H` is
    /// never mutated. Eigenvalues are cached sorted descending by absolute value.
    pub fn eigenvalues(&mut self) -> Result<&[f64]> {
        if self.eigenvalues.is_none() {
            let mut work = self.h.clone();
            let n = self.n;

            let off_diag_norm = |m: &DMatrix<f64>| -> f64 {
                let mut s = 0.0;
                for i in 0..n {
                    for j in (i + 1)..n {
                        s += m[(i, j)] * m[(i, j)];
                    }
                }
                (2.0 * s).sqrt()
            };

            let mut converged = n <= 1;
            for _sweep in 0..JACOBI_MAX_SWEEPS {
                if off_diag_norm(&work) < JACOBI_TOLERANCE {
                    converged = true;
                    break;
                }
                // Find the off-diagonal entry of largest magnitude.
                let mut p = 0usize;
                let mut q = 1usize;
                let mut largest = 0.0f64;
                for i in 0..n {
                    for j in (i + 1)..n {
                        if work[(i, j)].abs() > largest {
                            largest = work[(i, j)].abs();
                            p = i;
                            q = j;
                        }
                    }
                }

                let theta = if (work[(q, q)] - work[(p, p)]).abs() < f64::EPSILON {
                    std::f64::consts::FRAC_PI_4
                } else {
                    0.5 * (2.0 * work[(p, q)]).atan2(work[(q, q)] - work[(p, p)])
                };
                let c = theta.cos();
                let s = theta.sin();

                // Apply the symmetric Givens rotation to rows/cols p and q.
                let mut rotated = work.clone();
                for k in 0..n {
                    if k != p && k != q {
                        let wkp = work[(k, p)];
                        let wkq = work[(k, q)];
                        rotated[(k, p)] = c * wkp - s * wkq;
                        rotated[(p, k)] = rotated[(k, p)];
                        rotated[(k, q)] = s * wkp + c * wkq;
                        rotated[(q, k)] = rotated[(k, q)];
                    }
                }
                let wpp = work[(p, p)];
                let wqq = work[(q, q)];
                let wpq = work[(p, q)];
                rotated[(p, p)] = c * c * wpp - 2.0 * s * c * wpq + s * s * wqq;
                rotated[(q, q)] = s * s * wpp + 2.0 * s * c * wpq + c * c * wqq;
                rotated[(p, q)] = 0.0;
                rotated[(q, p)] = 0.0;
                work = rotated;
            }

            if !converged {
                return Err(GeometryError::NumericalInstability(
                    "Jacobi eigendecomposition did not converge within 100 sweeps".into(),
                ));
            }

            let mut diag: Vec<f64> = (0..n).map(|i| work[(i, i)]).collect();
            diag.sort_by(|a, b| b.abs().total_cmp(&a.abs()));
            self.eigenvalues = Some(nalgebra::DVector::from_vec(diag));
        }

        Ok(self.eigenvalues.as_ref().unwrap().as_slice())
    }

    /// `|lambda_max| / |lambda_min|` over non-negligible eigenvalues. Returns a
    /// large sentinel when the smallest retained `|lambda|` is below the
    /// negligibility floor.
    pub fn condition(&mut self) -> Result<f64> {
        let eigs = self.eigenvalues()?;
        let retained: Vec<f64> = eigs.iter().copied().filter(|l| l.abs() >= EIGENVALUE_FLOOR).collect();
        if retained.is_empty() {
            return Ok(CONDITION_SENTINEL);
        }
        let max = retained.iter().map(|l| l.abs()).fold(0.0f64, f64::max);
        let min = retained.iter().map(|l| l.abs()).fold(f64::INFINITY, f64::min);
        if min < EIGENVALUE_FLOOR {
            return Ok(CONDITION_SENTINEL);
        }
        Ok(max / min)
    }

    pub fn definiteness(&mut self) -> Result<Definiteness> {
        let eigs = self.eigenvalues()?;
        if eigs.iter().all(|&l| l > 0.0) {
            Ok(Definiteness::PositiveDefinite)
        } else if eigs.iter().all(|&l| l < 0.0) {
            Ok(Definiteness::NegativeDefinite)
        } else {
            Ok(Definiteness::Indefinite)
        }
    }
}

fn diagonal_second_partial_grid(
    space: &StateSpace,
    scratch: &mut [f64],
    i: usize,
    h: f64,
    f0: f64,
) -> Result<f64> {
    let x0 = scratch[i];
    scratch[i] = x0 + h;
    let f_plus = space.interpolate(scratch)?;
    scratch[i] = x0 - h;
    let f_minus = space.interpolate(scratch)?;
    scratch[i] = x0;
    Ok((f_plus - 2.0 * f0 + f_minus) / (h * h))
}

fn mixed_second_partial_grid(
    space: &StateSpace,
    scratch: &mut [f64],
    i: usize,
    j: usize,
    h_i: f64,
    h_j: f64,
) -> Result<f64> {
    let xi0 = scratch[i];
    let xj0 = scratch[j];

    scratch[i] = xi0 + h_i;
    scratch[j] = xj0 + h_j;
    let f_pp = space.interpolate(scratch)?;

    scratch[i] = xi0 + h_i;
    scratch[j] = xj0 - h_j;
    let f_pm = space.interpolate(scratch)?;

    scratch[i] = xi0 - h_i;
    scratch[j] = xj0 + h_j;
    let f_mp = space.interpolate(scratch)?;

    scratch[i] = xi0 - h_i;
    scratch[j] = xj0 - h_j;
    let f_mm = space.interpolate(scratch)?;

    scratch[i] = xi0;
    scratch[j] = xj0;

    Ok((f_pp - f_pm - f_mp + f_mm) / (4.0 * h_i * h_j))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Dimension, RiskFactorKind};
    use pretty_assertions::assert_eq;

    fn quadratic_space() -> StateSpace {
        let mut space = StateSpace::new();
        space
            .add_dimension(Dimension::new(RiskFactorKind::Spot, "x", -5.0, 5.0, 21).unwrap())
            .unwrap();
        space
            .add_dimension(Dimension::new(RiskFactorKind::Spot, "y", -5.0, 5.0, 21).unwrap())
            .unwrap();
        space.map_prices(&|c| c[0] * c[0] + c[1] * c[1]).unwrap();
        space
    }

    #[test]
    fn hessian_of_paraboloid_at_2_3() {
        let space = quadratic_space();
        let mut hess = Hessian::new(2);
        hess.compute(&space, &[2.0, 3.0]).unwrap();
        assert!((hess.get(0, 0).unwrap() - 2.0).abs() < 0.2);
        assert!((hess.get(1, 1).unwrap() - 2.0).abs() < 0.2);
        assert!((hess.get(0, 1).unwrap()).abs() < 0.2);
        assert!((hess.trace() - 4.0).abs() < 0.4);
    }

    #[test]
    fn hessian_is_symmetric_by_construction() {
        let space = quadratic_space();
        let mut hess = Hessian::new(2);
        hess.compute(&space, &[1.0, -2.0]).unwrap();
        assert_eq!(hess.get(0, 1).unwrap(), hess.get(1, 0).unwrap());
    }

    #[test]
    fn eigenvalues_of_isotropic_paraboloid_are_both_two() {
        let space = quadratic_space();
        let mut hess = Hessian::new(2);
        hess.compute(&space, &[2.0, 3.0]).unwrap();
        let eigs = hess.eigenvalues().unwrap().to_vec();
        assert!((eigs[0] - 2.0).abs() < 0.2);
        assert!((eigs[1] - 2.0).abs() < 0.2);
    }

    #[test]
    fn condition_number_near_one_for_isotropic_paraboloid() {
        let space = quadratic_space();
        let mut hess = Hessian::new(2);
        hess.compute(&space, &[2.0, 3.0]).unwrap();
        let cond = hess.condition().unwrap();
        assert!((cond - 1.0).abs() < 0.2);
    }

    #[test]
    fn trace_and_frobenius_match_eigenvalue_sums() {
        let space = quadratic_space();
        let mut hess = Hessian::new(2);
        hess.compute(&space, &[2.0, 3.0]).unwrap();
        let trace = hess.trace();
        let frob = hess.frobenius();
        let eigs = hess.eigenvalues().unwrap().to_vec();
        let eig_sum: f64 = eigs.iter().sum();
        let eig_sq_sum: f64 = eigs.iter().map(|l| l * l).sum();
        assert!((trace - eig_sum).abs() / trace.abs().max(1.0) < 1e-6);
        assert!((frob * frob - eig_sq_sum).abs() / (frob * frob).max(1.0) < 1e-6);
    }

    #[test]
    fn kinked_payoff_has_large_curvature_at_strike_and_near_zero_away_from_it() {
        let mut space = StateSpace::new();
        space
            .add_dimension(Dimension::new(RiskFactorKind::Spot, "s", 80.0, 120.0, 41).unwrap())
            .unwrap();
        space.map_prices(&|c| (c[0] - 100.0).max(0.0)).unwrap();

        let mut at_strike = Hessian::new(1);
        at_strike.compute(&space, &[100.0]).unwrap();
        assert!(at_strike.get(0, 0).unwrap() > 1.0);

        let mut away = Hessian::new(1);
        away.compute(&space, &[90.0]).unwrap();
        assert!(away.get(0, 0).unwrap().abs() < 1e-6);
    }

    #[test]
    fn positive_definite_classification() {
        let space = quadratic_space();
        let mut hess = Hessian::new(2);
        hess.compute(&space, &[2.0, 3.0]).unwrap();
        assert_eq!(hess.definiteness().unwrap(), Definiteness::PositiveDefinite);
    }
}
