//! Central, forward, and mixed finite-difference stencils over an arbitrary
//! callable.
//!
//! Every routine here takes a scratch coordinate buffer it temporarily bumps and
//! restores byte-for-byte before returning, and never retains the callable past
//! its own call.

/// Forward partial derivative in direction `i`: `(f(x+h*e_i) - f(x))/h`, O(h).
pub fn forward_partial(f: &dyn Fn(&[f64]) -> f64, scratch: &mut [f64], i: usize, h: f64) -> f64 {
    let x0 = scratch[i];
    let f0 = f(scratch);
    scratch[i] = x0 + h;
    let f_plus = f(scratch);
    scratch[i] = x0;
    (f_plus - f0) / h
}

/// Central partial derivative in direction `i`: `(f(x+h*e_i) - f(x-h*e_i))/(2h)`,
/// O(h^2). The default stencil used by [`crate::jacobian::Jacobian`].
pub fn central_partial(f: &dyn Fn(&[f64]) -> f64, scratch: &mut [f64], i: usize, h: f64) -> f64 {
    let x0 = scratch[i];
    scratch[i] = x0 + h;
    let f_plus = f(scratch);
    scratch[i] = x0 - h;
    let f_minus = f(scratch);
    scratch[i] = x0;
    (f_plus - f_minus) / (2.0 * h)
}

/// Five-point partial derivative in direction `i`, O(h^4):
/// `(-f(x+2h) + 8f(x+h) - 8f(x-h) + f(x-2h))/(12h)`.
pub fn five_point_partial(f: &dyn Fn(&[f64]) -> f64, scratch: &mut [f64], i: usize, h: f64) -> f64 {
    let x0 = scratch[i];
    scratch[i] = x0 + 2.0 * h;
    let f_p2 = f(scratch);
    scratch[i] = x0 + h;
    let f_p1 = f(scratch);
    scratch[i] = x0 - h;
    let f_m1 = f(scratch);
    scratch[i] = x0 - 2.0 * h;
    let f_m2 = f(scratch);
    scratch[i] = x0;
    (-f_p2 + 8.0 * f_p1 - 8.0 * f_m1 + f_m2) / (12.0 * h)
}

/// Diagonal second partial `d^2f/dx_i^2` via the three-point stencil:
/// `(f(x+h) - 2f(x) + f(x-h))/h^2`.
pub fn diagonal_second_partial(
    f: &dyn Fn(&[f64]) -> f64,
    scratch: &mut [f64],
    i: usize,
    h: f64,
) -> f64 {
    let x0 = scratch[i];
    let f0 = f(scratch);
    scratch[i] = x0 + h;
    let f_plus = f(scratch);
    scratch[i] = x0 - h;
    let f_minus = f(scratch);
    scratch[i] = x0;
    (f_plus - 2.0 * f0 + f_minus) / (h * h)
}

/// Mixed second partial `d^2f/(dx_i dx_j)` via the four-corner stencil:
/// `(f_++ - f_+- - f_-+ + f_--)/(4 h_i h_j)`.
pub fn mixed_second_partial(
    f: &dyn Fn(&[f64]) -> f64,
    scratch: &mut [f64],
    i: usize,
    j: usize,
    h_i: f64,
    h_j: f64,
) -> f64 {
    debug_assert!(i != j, "mixed partial requires two distinct axes");
    let xi0 = scratch[i];
    let xj0 = scratch[j];

    scratch[i] = xi0 + h_i;
    scratch[j] = xj0 + h_j;
    let f_pp = f(scratch);

    scratch[i] = xi0 + h_i;
    scratch[j] = xj0 - h_j;
    let f_pm = f(scratch);

    scratch[i] = xi0 - h_i;
    scratch[j] = xj0 + h_j;
    let f_mp = f(scratch);

    scratch[i] = xi0 - h_i;
    scratch[j] = xj0 - h_j;
    let f_mm = f(scratch);

    scratch[i] = xi0;
    scratch[j] = xj0;

    (f_pp - f_pm - f_mp + f_mm) / (4.0 * h_i * h_j)
}
