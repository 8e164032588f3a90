use crate::constraint::ConstraintSurface;
use crate::error::{GeometryError, Result};
use crate::hessian::Hessian;
use crate::jacobian::Jacobian;
use crate::state_space::StateSpace;

/// Weights, scales, and thresholds used to combine the four fragility components.
///
/// Defaults follow §4.7/§4.8: weights `(0.25, 0.30, 0.25, 0.20)`, unit-order
/// normalisation scales, a condition threshold of `1e6`, a constraint-distance
/// threshold of `1.0`, and a fragility classification cutoff of `0.5`.
#[derive(Debug, Clone, Copy)]
pub struct FragilityConfig {
    pub w_gradient: f64,
    pub w_curvature: f64,
    pub w_condition: f64,
    pub w_constraint: f64,
    pub gradient_scale: f64,
    pub curvature_scale: f64,
    pub condition_threshold: f64,
    pub constraint_threshold: f64,
    pub fragility_threshold: f64,
}

impl Default for FragilityConfig {
    fn default() -> Self {
        Self {
            w_gradient: 0.25,
            w_curvature: 0.30,
            w_condition: 0.25,
            w_constraint: 0.20,
            gradient_scale: 1.0,
            curvature_scale: 1.0,
            condition_threshold: 1.0e6,
            constraint_threshold: 1.0,
            fragility_threshold: 0.5,
        }
    }
}

impl FragilityConfig {
    pub fn with_weights(mut self, w_gradient: f64, w_curvature: f64, w_condition: f64, w_constraint: f64) -> Self {
        self.w_gradient = w_gradient;
        self.w_curvature = w_curvature;
        self.w_condition = w_condition;
        self.w_constraint = w_constraint;
        self
    }

    pub fn with_scales(mut self, gradient_scale: f64, curvature_scale: f64) -> Self {
        self.gradient_scale = gradient_scale;
        self.curvature_scale = curvature_scale;
        self
    }

    pub fn with_fragility_threshold(mut self, threshold: f64) -> Self {
        self.fragility_threshold = threshold;
        self
    }
}

/// Saturating, scale-free rational sigmoid `x/(1+x)` with `x = m/scale`. Maps `0`
/// to `0` and saturates to `1` as `m` grows; fixed as the one mapping this crate
/// uses for gradient/curvature components (§4.7, §9).
fn rational_sigmoid(m: f64, scale: f64) -> f64 {
    let x = (m / scale).max(0.0);
    x / (1.0 + x)
}

/// Log-scale conditioning map: `0` for `kappa <= 1`, `log(kappa) / log(threshold^2)`
/// clamped to `[0, 1]` otherwise.
fn condition_component(kappa: f64, threshold: f64) -> f64 {
    if kappa <= 1.0 {
        return 0.0;
    }
    (kappa.ln() / (threshold * threshold).ln()).clamp(0.0, 1.0)
}

/// Linear ramp for constraint proximity: `1` once `d <= 0`, `0` once `d >=
/// threshold`, linear in between.
fn constraint_component(d: f64, threshold: f64) -> f64 {
    if d <= 0.0 {
        1.0
    } else if d >= threshold {
        0.0
    } else {
        1.0 - d / threshold
    }
}

/// Bounded composite score classification (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragilityClass {
    Stable,
    Sensitive,
    Fragile,
    Critical,
}

pub fn classify(score: f64) -> FragilityClass {
    if score < 0.25 {
        FragilityClass::Stable
    } else if score < 0.50 {
        FragilityClass::Sensitive
    } else if score < 0.75 {
        FragilityClass::Fragile
    } else {
        FragilityClass::Critical
    }
}

/// A single recorded fragile region: a coordinate copy plus the measurements that
/// produced its score.
#[derive(Debug, Clone)]
pub struct FragilePoint {
    pub coords: Vec<f64>,
    pub score: f64,
    pub curvature: f64,
    pub gradient_norm: f64,
    pub near_constraint: bool,
}

/// Aggregate statistics published after [`FragilityMap::compute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FragilityStatistics {
    pub max: f64,
    pub mean: f64,
    pub fragile_fraction: f64,
}

/// Sweeps a [`StateSpace`], scoring every grid node by combining gradient norm,
/// Hessian Frobenius norm, Hessian condition number, and (when a
/// [`ConstraintSurface`] is attached) constraint proximity into a bounded `[0, 1]`
/// fragility score.
pub struct FragilityMap<'a> {
    space: &'a StateSpace,
    constraints: Option<&'a ConstraintSurface>,
    config: FragilityConfig,
    grid_scores: Vec<f64>,
    fragile_points: Vec<FragilePoint>,
    statistics: FragilityStatistics,
    computed: bool,
}

impl<'a> FragilityMap<'a> {
    pub fn new(space: &'a StateSpace, config: FragilityConfig) -> Self {
        Self {
            space,
            constraints: None,
            config,
            grid_scores: Vec::new(),
            fragile_points: Vec::new(),
            statistics: FragilityStatistics::default(),
            computed: false,
        }
    }

    pub fn with_constraints(mut self, constraints: &'a ConstraintSurface) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn config(&self) -> &FragilityConfig {
        &self.config
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    pub fn grid_scores(&self) -> &[f64] {
        &self.grid_scores
    }

    pub fn statistics(&self) -> FragilityStatistics {
        self.statistics
    }

    pub fn num_fragile_regions(&self) -> usize {
        self.fragile_points.len()
    }

    pub fn get_region(&self, i: usize) -> Result<&FragilePoint> {
        self.fragile_points
            .get(i)
            .ok_or_else(|| GeometryError::InvalidArgument(format!("no fragile region at index {i}")))
    }

    /// `grid_scores[nearest(x)]` if computed, `0` otherwise.
    pub fn fragility_at(&self, x: &[f64]) -> Result<f64> {
        if !self.computed {
            return Ok(0.0);
        }
        let idx = self.space.nearest(x)?;
        Ok(self.grid_scores.get(idx).copied().unwrap_or(0.0))
    }

    /// Sweeps every grid node. Numerical failures on individual nodes (degenerate
    /// boundary neighbourhoods) are skipped silently rather than aborting the
    /// whole sweep -- see §4.8/§7.
    pub fn compute(&mut self) -> Result<()> {
        if !self.space.prices_valid() {
            return Err(GeometryError::NotInitialized("prices not mapped"));
        }
        let n = self.space.ndim();
        let total = self.space.total_points();
        let mut grid_scores = vec![0.0; total];
        let mut fragile_points = Vec::with_capacity(64);
        let mut max = 0.0f64;
        let mut sum = 0.0f64;

        for flat in 0..total {
            let coords = self.space.coords_at(flat)?;

            let mut jac = Jacobian::new(n);
            let mut hess = Hessian::new(n);
            if jac.compute(self.space, &coords).is_err() {
                continue;
            }
            if hess.compute(self.space, &coords).is_err() {
                continue;
            }

            let gradient_norm = jac.norm();
            let curvature = hess.frobenius();
            let condition = match hess.condition() {
                Ok(c) => c,
                Err(_) => continue,
            };
            let min_distance = match self.constraints {
                Some(surface) => surface.distance(&coords)?,
                None => f64::INFINITY,
            };

            let g_score = rational_sigmoid(gradient_norm, self.config.gradient_scale);
            let c_score = rational_sigmoid(curvature, self.config.curvature_scale);
            let k_score = condition_component(condition, self.config.condition_threshold);
            let b_score = if min_distance.is_finite() {
                constraint_component(min_distance, self.config.constraint_threshold)
            } else {
                0.0
            };

            let score = (self.config.w_gradient * g_score
                + self.config.w_curvature * c_score
                + self.config.w_condition * k_score
                + self.config.w_constraint * b_score)
                .clamp(0.0, 1.0);

            grid_scores[flat] = score;
            max = max.max(score);
            sum += score;

            if score >= self.config.fragility_threshold {
                fragile_points.push(FragilePoint {
                    coords,
                    score,
                    curvature,
                    gradient_norm,
                    near_constraint: min_distance < self.config.constraint_threshold,
                });
            }
        }

        self.statistics = FragilityStatistics {
            max,
            mean: if total > 0 { sum / total as f64 } else { 0.0 },
            fragile_fraction: if total > 0 {
                fragile_points.len() as f64 / total as f64
            } else {
                0.0
            },
        };
        self.grid_scores = grid_scores;
        self.fragile_points = fragile_points;
        self.computed = true;
        Ok(())
    }

    /// A short text report summarising the top `top_n` fragile regions by score,
    /// for the caller to print, log, or write out as they see fit.
    pub fn report(&self, top_n: usize) -> String {
        let mut ranked: Vec<&FragilePoint> = self.fragile_points.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut out = format!(
            "fragility: {} region(s), max={:.4}, mean={:.4}, fragile_fraction={:.4}\n",
            self.fragile_points.len(),
            self.statistics.max,
            self.statistics.mean,
            self.statistics.fragile_fraction
        );
        for (rank, point) in ranked.into_iter().take(top_n).enumerate() {
            out.push_str(&format!(
                "  #{rank}: score={:.4} class={:?} coords={:?} grad_norm={:.4} curvature={:.4}\n",
                point.score,
                classify(point.score),
                point.coords,
                point.gradient_norm,
                point.curvature,
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintKind, Direction, Hardness};
    use crate::dimension::{Dimension, RiskFactorKind};
    use test_case::test_case;

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

    #[test_case(0.1, FragilityClass::Stable; "well inside stable band")]
    #[test_case(0.3, FragilityClass::Sensitive; "sensitive band")]
    #[test_case(0.6, FragilityClass::Fragile; "fragile band")]
    #[test_case(0.9, FragilityClass::Critical; "critical band")]
    fn classification_bands(score: f64, expected: FragilityClass) {
        assert_eq!(classify(score), expected);
    }

    #[test]
    fn every_score_is_in_unit_interval() {
        let space = quadratic_space();
        let mut map = FragilityMap::new(&space, FragilityConfig::default());
        map.compute().unwrap();
        assert_eq!(map.grid_scores().len(), space.total_points());
        for &s in map.grid_scores() {
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn origin_is_more_stable_than_corner() {
        let space = quadratic_space();
        let mut map = FragilityMap::new(&space, FragilityConfig::default());
        map.compute().unwrap();
        let origin_score = map.fragility_at(&[0.0, 0.0]).unwrap();
        let corner_score = map.fragility_at(&[-5.0, -5.0]).unwrap();
        assert!(origin_score < 0.25);
        assert!(corner_score >= origin_score);
    }

    #[test]
    fn fragility_at_before_compute_is_zero() {
        let space = quadratic_space();
        let map = FragilityMap::new(&space, FragilityConfig::default());
        assert_eq!(map.fragility_at(&[0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn attaching_constraint_surface_raises_score_near_boundary() {
        let space = quadratic_space();
        let mut surface = ConstraintSurface::new();
        surface
            .add_full(ConstraintKind::Liquidity, "x-cap", Direction::Upper, Hardness::Soft, 0, 0.5, 5.0)
            .unwrap();

        let mut unconstrained = FragilityMap::new(&space, FragilityConfig::default());
        unconstrained.compute().unwrap();
        let baseline = unconstrained.fragility_at(&[0.4, 0.0]).unwrap();

        let mut constrained = FragilityMap::new(&space, FragilityConfig::default()).with_constraints(&surface);
        constrained.compute().unwrap();
        let near_boundary = constrained.fragility_at(&[0.4, 0.0]).unwrap();

        assert!(near_boundary >= baseline);
    }

    #[test]
    fn report_lists_top_n_regions_sorted_descending() {
        let space = quadratic_space();
        let mut map = FragilityMap::new(&space, FragilityConfig::default().with_fragility_threshold(0.1));
        map.compute().unwrap();
        let report = map.report(3);
        assert!(report.contains("fragility:"));
    }
}
