use crate::dimension::{D_MAX, Dimension};
use crate::error::{GeometryError, Result};

/// The Cartesian product of a sequence of [`Dimension`]s, with an optional sampled
/// value grid and multilinear interpolation over it.
///
/// Strides are row-major with the last dimension varying fastest: `stride[d-1] ==
/// 1`, `stride[d] == stride[d+1] * len(dims[d+1])`.
#[derive(Debug, Clone)]
pub struct StateSpace {
    dims: Vec<Dimension>,
    strides: Vec<usize>,
    total_points: usize,
    prices: Option<Vec<f64>>,
}

impl Default for StateSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSpace {
    pub fn new() -> Self {
        Self {
            dims: Vec::new(),
            strides: Vec::new(),
            total_points: 1,
            prices: None,
        }
    }

    /// Appends a dimension and recomputes strides/total size in O(n).
    ///
    /// Invalidates any previously mapped `prices`: the flat buffer's layout depends
    /// on the full dimension list.
    pub fn add_dimension(&mut self, dim: Dimension) -> Result<()> {
        if self.dims.len() >= D_MAX {
            return Err(GeometryError::InvalidArgument(format!(
                "state space cannot hold more than {D_MAX} dimensions"
            )));
        }
        self.dims.push(dim);
        self.recompute_strides();
        self.prices = None;
        Ok(())
    }

    fn recompute_strides(&mut self) {
        let d = self.dims.len();
        let mut strides = vec![1usize; d];
        for i in (0..d.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1].len();
        }
        self.total_points = if d == 0 {
            0
        } else {
            self.dims.iter().map(Dimension::len).product()
        };
        self.strides = strides;
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    pub fn prices_valid(&self) -> bool {
        self.prices.is_some()
    }

    fn check_point_len(&self, point: &[f64]) -> Result<()> {
        if point.len() != self.ndim() {
            return Err(GeometryError::DimensionMismatch {
                expected: self.ndim(),
                got: point.len(),
            });
        }
        Ok(())
    }

    /// Flat index from a multi-index: `sum_d i_d * stride_d`.
    pub fn flat_index(&self, multi: &[usize]) -> Result<usize> {
        if multi.len() != self.ndim() {
            return Err(GeometryError::DimensionMismatch {
                expected: self.ndim(),
                got: multi.len(),
            });
        }
        let mut flat = 0usize;
        for (d, &i) in multi.iter().enumerate() {
            if i >= self.dims[d].len() {
                return Err(GeometryError::InvalidArgument(format!(
                    "index {i} out of range for dimension {d} of length {}",
                    self.dims[d].len()
                )));
            }
            flat += i * self.strides[d];
        }
        Ok(flat)
    }

    /// Multi-index from a flat index, by iterative division with remainder in
    /// stride order.
    pub fn multi_index(&self, mut flat: usize) -> Result<Vec<usize>> {
        if flat >= self.total_points {
            return Err(GeometryError::InvalidArgument(format!(
                "flat index {flat} out of range for {} total points",
                self.total_points
            )));
        }
        let mut multi = vec![0usize; self.ndim()];
        for d in 0..self.ndim() {
            multi[d] = flat / self.strides[d];
            flat %= self.strides[d];
        }
        Ok(multi)
    }

    /// Reconstructs the coordinate vector at a flat grid index.
    pub fn coords_at(&self, flat: usize) -> Result<Vec<f64>> {
        let multi = self.multi_index(flat)?;
        Ok(multi
            .iter()
            .enumerate()
            .map(|(d, &i)| self.dims[d].node(i))
            .collect())
    }

    /// Visits every flat index in order, reconstructs coordinates, and invokes
    /// `pricer` on a fresh coordinate copy -- never a pointer into grid storage.
    /// Marks `prices` valid on completion.
    pub fn map_prices(&mut self, pricer: &dyn Fn(&[f64]) -> f64) -> Result<()> {
        if self.ndim() == 0 {
            return Err(GeometryError::InvalidArgument(
                "cannot map prices over a state space with no dimensions".into(),
            ));
        }
        let mut prices = vec![0.0; self.total_points];
        for flat in 0..self.total_points {
            let coords = self.coords_at(flat)?;
            prices[flat] = pricer(&coords);
        }
        self.prices = Some(prices);
        Ok(())
    }

    pub fn get_price(&self, flat: usize) -> Result<f64> {
        let prices = self
            .prices
            .as_ref()
            .ok_or(GeometryError::NotInitialized("prices not mapped"))?;
        prices
            .get(flat)
            .copied()
            .ok_or_else(|| GeometryError::InvalidArgument(format!("flat index {flat} out of range")))
    }

    /// Index of the grid node nearest to `point`, per-dimension.
    pub fn nearest(&self, point: &[f64]) -> Result<usize> {
        self.check_point_len(point)?;
        let multi: Vec<usize> = self
            .dims
            .iter()
            .zip(point.iter())
            .map(|(dim, &v)| dim.nearest_index(v))
            .collect();
        self.flat_index(&multi)
    }

    /// Multilinear interpolation of `prices` at an arbitrary coordinate `x`.
    ///
    /// At or beyond a boundary, interpolation collapses to the boundary value (no
    /// extrapolation). Fails with `NotInitialized` if prices are not valid.
    pub fn interpolate(&self, x: &[f64]) -> Result<f64> {
        self.check_point_len(x)?;
        let prices = self
            .prices
            .as_ref()
            .ok_or(GeometryError::NotInitialized("prices not mapped"))?;

        let n = self.ndim();
        let mut lo = vec![0usize; n];
        let mut hi = vec![0usize; n];
        let mut t = vec![0.0f64; n];
        for d in 0..n {
            let (l, h) = self.dims[d].bracket(x[d]);
            lo[d] = l;
            hi[d] = h;
            t[d] = if h == l {
                0.0
            } else {
                let denom = self.dims[d].node(h) - self.dims[d].node(l);
                if denom.abs() < f64::EPSILON {
                    0.0
                } else {
                    (x[d].clamp(self.dims[d].min(), self.dims[d].max()) - self.dims[d].node(l)) / denom
                }
            };
        }

        let corners = 1usize << n;
        let mut acc = 0.0;
        let mut multi = vec![0usize; n];
        for c in 0..corners {
            let mut weight = 1.0;
            for d in 0..n {
                let bit_set = (c >> d) & 1 == 1;
                multi[d] = if bit_set { hi[d] } else { lo[d] };
                weight *= if bit_set { t[d] } else { 1.0 - t[d] };
            }
            if weight == 0.0 {
                continue;
            }
            let flat = self.flat_index(&multi)?;
            acc += weight * prices[flat];
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::RiskFactorKind;
    use pretty_assertions::assert_eq;

    fn two_d_space() -> StateSpace {
        let mut space = StateSpace::new();
        space
            .add_dimension(Dimension::new(RiskFactorKind::Spot, "x", -5.0, 5.0, 21).unwrap())
            .unwrap();
        space
            .add_dimension(Dimension::new(RiskFactorKind::Spot, "y", -5.0, 5.0, 21).unwrap())
            .unwrap();
        space
    }

    #[test]
    fn strides_and_total_points() {
        let space = two_d_space();
        assert_eq!(space.total_points(), 21 * 21);
        assert_eq!(space.strides(), &[21, 1]);
    }

    #[test]
    fn flat_multi_roundtrip() {
        let space = two_d_space();
        for flat in 0..space.total_points() {
            let multi = space.multi_index(flat).unwrap();
            assert_eq!(space.flat_index(&multi).unwrap(), flat);
        }
    }

    #[test]
    fn map_prices_then_interpolate_at_node_matches_exactly() {
        let mut space = two_d_space();
        space.map_prices(&|c| c[0] * c[0] + c[1] * c[1]).unwrap();
        for flat in [0usize, 10, 220, 440] {
            let coords = space.coords_at(flat).unwrap();
            let interp = space.interpolate(&coords).unwrap();
            let exact = space.get_price(flat).unwrap();
            assert!((interp - exact).abs() < 1e-9, "flat={flat}");
        }
    }

    #[test]
    fn interpolate_without_mapping_fails() {
        let space = two_d_space();
        assert!(matches!(
            space.interpolate(&[0.0, 0.0]),
            Err(GeometryError::NotInitialized(_))
        ));
    }

    #[test]
    fn interpolate_clamps_beyond_boundary() {
        let mut space = two_d_space();
        space.map_prices(&|c| c[0] + c[1]).unwrap();
        let at_bound = space.interpolate(&[5.0, 5.0]).unwrap();
        let beyond = space.interpolate(&[50.0, 50.0]).unwrap();
        assert!((at_bound - beyond).abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn linear_function_interpolates_exactly_anywhere(
            xt in 0.0f64..1.0, yt in 0.0f64..1.0,
        ) {
            let mut space = two_d_space();
            space.map_prices(&|c| 2.0 * c[0] - 3.0 * c[1] + 1.0).unwrap();
            let x = -5.0 + xt * 10.0;
            let y = -5.0 + yt * 10.0;
            let got = space.interpolate(&[x, y]).unwrap();
            let exact = 2.0 * x - 3.0 * y + 1.0;
            prop_assert!((got - exact).abs() < 1e-6);
        }
    }
}
