use nalgebra::DMatrix;

use crate::error::{GeometryError, Result};

/// Maximum number of samples a [`TransportMetric`] may hold.
pub const S_MAX: usize = 1024;

/// Number of straight-line segments the midpoint rule discretises a geodesic
/// query into.
const GEODESIC_STEPS: usize = 100;

const INV_DISTANCE_EPS: f64 = 1e-10;
const INV_DISTANCE_POWER: f64 = 2.0;

struct Sample {
    x: Vec<f64>,
    g: DMatrix<f64>,
}

/// A sampled Riemannian tensor field: at each point `x`, an inner product
/// `<u, v>_x = u^T G(x) v`.
///
/// Interpolates between up to [`S_MAX`] samples by inverse-distance weighting and
/// falls back to a default tensor (identity unless overridden) wherever no sample
/// is in range.
pub struct TransportMetric {
    n: usize,
    samples: Vec<Sample>,
    default: DMatrix<f64>,
    interpolation_radius: f64,
}

impl TransportMetric {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            samples: Vec::new(),
            default: DMatrix::identity(n, n),
            interpolation_radius: 0.0,
        }
    }

    pub fn ndim(&self) -> usize {
        self.n
    }

    pub fn set_default_tensor(&mut self, g: DMatrix<f64>) -> Result<()> {
        self.check_matrix_shape(&g)?;
        self.default = g;
        Ok(())
    }

    pub fn set_interpolation_radius(&mut self, r: f64) -> Result<()> {
        if r < 0.0 {
            return Err(GeometryError::InvalidArgument(format!(
                "interpolation radius must be non-negative, got {r}"
            )));
        }
        self.interpolation_radius = r;
        Ok(())
    }

    fn check_point_len(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: x.len(),
            });
        }
        Ok(())
    }

    fn check_matrix_shape(&self, g: &DMatrix<f64>) -> Result<()> {
        if g.nrows() != self.n || g.ncols() != self.n {
            return Err(GeometryError::DimensionMismatch {
                expected: self.n,
                got: g.nrows(),
            });
        }
        Ok(())
    }

    /// Adds a sample `(x, G)`. `G` is assumed symmetric positive-definite (the
    /// producer's responsibility; not re-verified here).
    pub fn add_sample(&mut self, x: Vec<f64>, g: DMatrix<f64>) -> Result<()> {
        if self.samples.len() >= S_MAX {
            return Err(GeometryError::InvalidArgument(format!(
                "transport metric cannot hold more than {S_MAX} samples"
            )));
        }
        self.check_point_len(&x)?;
        self.check_matrix_shape(&g)?;
        self.samples.push(Sample { x, g });
        Ok(())
    }

    /// Inverse-distance-weighted metric tensor at `x`.
    ///
    /// With no samples, or no sample within `interpolation_radius` (`0` means "all
    /// samples"), falls back to the default tensor.
    pub fn tensor_at(&self, x: &[f64]) -> Result<DMatrix<f64>> {
        self.check_point_len(x)?;
        if self.samples.is_empty() {
            return Ok(self.default.clone());
        }

        let mut weighted_sum = DMatrix::zeros(self.n, self.n);
        let mut weight_sum = 0.0f64;
        for sample in &self.samples {
            let d = euclidean_distance(x, &sample.x);
            if self.interpolation_radius > 0.0 && d > self.interpolation_radius {
                continue;
            }
            let w = 1.0 / (d + INV_DISTANCE_EPS).powf(INV_DISTANCE_POWER);
            weighted_sum += &sample.g * w;
            weight_sum += w;
        }

        if weight_sum < INV_DISTANCE_EPS {
            return Ok(self.default.clone());
        }
        Ok(weighted_sum / weight_sum)
    }

    /// Geodesic cost from `a` to `b`: midpoint-rule integration of `sqrt(dx^T G dx)`
    /// over `GEODESIC_STEPS` straight-line segments.
    pub fn transport_distance(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        self.check_point_len(a)?;
        self.check_point_len(b)?;

        let n = self.n;
        let delta: Vec<f64> = (0..n).map(|d| (b[d] - a[d]) / GEODESIC_STEPS as f64).collect();

        let mut cost = 0.0;
        for s in 0..GEODESIC_STEPS {
            let t = (s as f64 + 0.5) / GEODESIC_STEPS as f64;
            let x: Vec<f64> = (0..n).map(|d| a[d] + t * (b[d] - a[d])).collect();
            let g = self.tensor_at(&x)?;
            let mut quad = 0.0;
            for i in 0..n {
                for j in 0..n {
                    quad += delta[i] * g[(i, j)] * delta[j];
                }
            }
            cost += quad.max(0.0).sqrt();
        }
        Ok(cost)
    }

    /// Sum of segment geodesic costs over a polyline.
    pub fn path_cost(&self, polyline: &[Vec<f64>]) -> Result<f64> {
        if polyline.len() < 2 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for pair in polyline.windows(2) {
            total += self.transport_distance(&pair[0], &pair[1])?;
        }
        Ok(total)
    }

    /// `transport_distance / euclidean_distance`; reported as `1` for coincident
    /// endpoints (undefined otherwise).
    pub fn friction_ratio(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        let euclid = euclidean_distance(a, b);
        if euclid < 1e-15 {
            return Ok(1.0);
        }
        Ok(self.transport_distance(a, b)? / euclid)
    }

    /// Diagonal liquidity tensor: `G_ii = 1 / max(liq_i, eps)`.
    pub fn from_liquidity(liquidity: &[f64]) -> DMatrix<f64> {
        let eps = 1e-8;
        DMatrix::from_diagonal(&nalgebra::DVector::from_iterator(
            liquidity.len(),
            liquidity.iter().map(|&l| 1.0 / l.max(eps)),
        ))
    }

    /// Diagonal market-impact tensor: `G_ii = 1 + kappa_i * |pos_i|`.
    pub fn from_market_impact(kappa: &[f64], positions: &[f64]) -> DMatrix<f64> {
        debug_assert_eq!(kappa.len(), positions.len());
        DMatrix::from_diagonal(&nalgebra::DVector::from_iterator(
            kappa.len(),
            kappa.iter().zip(positions).map(|(k, p)| 1.0 + k * p.abs()),
        ))
    }

    /// Symmetric average of a buy-side and sell-side tensor.
    pub fn symmetric_average(buy: &DMatrix<f64>, sell: &DMatrix<f64>) -> DMatrix<f64> {
        (buy + sell) * 0.5
    }
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_metric_distance_equals_euclidean() {
        let metric = TransportMetric::new(2);
        let d = metric.transport_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 0.05);
    }

    #[test]
    fn two_identity_samples_still_give_euclidean_distance() {
        let mut metric = TransportMetric::new(2);
        metric.add_sample(vec![0.0, 0.0], DMatrix::identity(2, 2)).unwrap();
        metric.add_sample(vec![10.0, 0.0], DMatrix::identity(2, 2)).unwrap();
        let d = metric.transport_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 0.05);
    }

    #[test]
    fn friction_ratio_is_one_for_identity_metric() {
        let metric = TransportMetric::new(2);
        let r = metric.friction_ratio(&[1.0, 1.0], &[4.0, 5.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn friction_ratio_is_one_for_coincident_endpoints() {
        let metric = TransportMetric::new(2);
        let r = metric.friction_ratio(&[2.0, 2.0], &[2.0, 2.0]).unwrap();
        assert_eq!(r, 1.0);
    }

    #[test]
    fn high_cost_sample_increases_friction() {
        let mut metric = TransportMetric::new(1);
        metric
            .add_sample(vec![0.5], DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![100.0])))
            .unwrap();
        let r = metric.friction_ratio(&[0.0], &[1.0]).unwrap();
        assert!(r > 1.0);
    }

    #[test]
    fn path_cost_sums_segments() {
        let metric = TransportMetric::new(2);
        let polyline = vec![vec![0.0, 0.0], vec![3.0, 0.0], vec![3.0, 4.0]];
        let total = metric.path_cost(&polyline).unwrap();
        let seg1 = metric.transport_distance(&[0.0, 0.0], &[3.0, 0.0]).unwrap();
        let seg2 = metric.transport_distance(&[3.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((total - (seg1 + seg2)).abs() < 1e-9);
    }

    #[test]
    fn liquidity_factory_penalizes_thin_liquidity() {
        let g = TransportMetric::from_liquidity(&[0.1, 10.0]);
        assert!(g[(0, 0)] > g[(1, 1)]);
    }
}
