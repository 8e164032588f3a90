use crate::error::{GeometryError, Result};

/// Maximum number of constraints a [`ConstraintSurface`] may hold.
pub const C_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Liquidity,
    PositionLimit,
    Margin,
    Regulatory,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upper,
    Lower,
    Equality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hardness {
    Hard,
    Soft,
    Dynamic,
}

/// Where a constraint gets the value it compares against its threshold.
enum Evaluator {
    /// Compare the coordinate of a single dimension against the threshold.
    DimensionValue(usize),
    /// Evaluate an arbitrary function of the full coordinate vector.
    Custom(Box<dyn Fn(&[f64]) -> f64>),
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Evaluator::DimensionValue(d) => write!(f, "DimensionValue({d})"),
            Evaluator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Equality-constraint tolerance, used when `direction == Direction::Equality`.
pub const EQUALITY_TOLERANCE: f64 = 1e-6;

/// A single tagged constraint record: threshold-based (compares a dimension's
/// coordinate) or callback-based (evaluates an arbitrary function of the point).
#[derive(Debug)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub name: String,
    pub direction: Direction,
    pub hardness: Hardness,
    pub threshold: f64,
    pub penalty_rate: f64,
    pub active: bool,
    evaluator: Evaluator,
}

impl Constraint {
    fn value(&self, point: &[f64]) -> Result<f64> {
        match &self.evaluator {
            Evaluator::DimensionValue(d) => point.get(*d).copied().ok_or_else(|| {
                GeometryError::InvalidArgument(format!(
                    "constraint '{}' references dimension {d}, point has {} dims",
                    self.name,
                    point.len()
                ))
            }),
            Evaluator::Custom(f) => Ok(f(point)),
        }
    }

    /// Signed distance: positive inside, zero on the boundary, negative when
    /// violated. Inactive constraints return `+infinity`.
    pub fn signed_distance(&self, point: &[f64]) -> Result<f64> {
        if !self.active {
            return Ok(f64::INFINITY);
        }
        let v = self.value(point)?;
        Ok(match self.direction {
            Direction::Upper => self.threshold - v,
            Direction::Lower => v - self.threshold,
            Direction::Equality => EQUALITY_TOLERANCE - (v - self.threshold).abs(),
        })
    }

    pub fn is_violated(&self, point: &[f64]) -> Result<bool> {
        if !self.active {
            return Ok(false);
        }
        Ok(self.signed_distance(point)? < 0.0)
    }

    /// `penalty_rate * max(0, -signed_distance)` for soft constraints; hard and
    /// dynamic constraints carry no penalty here (escalation is a higher layer's
    /// responsibility).
    pub fn penalty(&self, point: &[f64]) -> Result<f64> {
        if self.hardness != Hardness::Soft {
            return Ok(0.0);
        }
        let d = self.signed_distance(point)?;
        Ok(self.penalty_rate * (-d).max(0.0))
    }
}

/// Type-appropriate defaults for [`ConstraintSurface::add`]: `(direction,
/// hardness, penalty_rate)`.
fn defaults_for_kind(kind: ConstraintKind) -> (Direction, Hardness, f64) {
    match kind {
        ConstraintKind::Liquidity => (Direction::Lower, Hardness::Soft, 10.0),
        ConstraintKind::PositionLimit => (Direction::Upper, Hardness::Hard, 0.0),
        ConstraintKind::Margin => (Direction::Upper, Hardness::Hard, 0.0),
        ConstraintKind::Regulatory => (Direction::Upper, Hardness::Hard, 0.0),
        ConstraintKind::Custom => (Direction::Upper, Hardness::Soft, 1.0),
    }
}

/// An ordered collection of up to [`C_MAX`] constraints, queried as a whole.
#[derive(Debug, Default)]
pub struct ConstraintSurface {
    constraints: Vec<Constraint>,
}

impl ConstraintSurface {
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.constraints.len() >= C_MAX {
            return Err(GeometryError::InvalidArgument(format!(
                "constraint surface cannot hold more than {C_MAX} constraints"
            )));
        }
        Ok(())
    }

    /// Simple threshold constraint on a single dimension's coordinate, with
    /// type-appropriate defaults for direction/hardness/penalty.
    pub fn add(
        &mut self,
        kind: ConstraintKind,
        name: impl Into<String>,
        dim: usize,
        threshold: f64,
    ) -> Result<usize> {
        let (direction, hardness, penalty_rate) = defaults_for_kind(kind);
        self.add_full(kind, name, direction, hardness, dim, threshold, penalty_rate)
    }

    /// Threshold constraint with every field specified explicitly.
    #[allow(clippy::too_many_arguments)]
    pub fn add_full(
        &mut self,
        kind: ConstraintKind,
        name: impl Into<String>,
        direction: Direction,
        hardness: Hardness,
        dim: usize,
        threshold: f64,
        penalty_rate: f64,
    ) -> Result<usize> {
        self.ensure_capacity()?;
        self.constraints.push(Constraint {
            kind,
            name: name.into(),
            direction,
            hardness,
            threshold,
            penalty_rate,
            active: true,
            evaluator: Evaluator::DimensionValue(dim),
        });
        Ok(self.constraints.len() - 1)
    }

    /// Callback-based constraint: `eval_fn` computes the constrained quantity from
    /// the full coordinate vector.
    pub fn add_custom(
        &mut self,
        name: impl Into<String>,
        eval_fn: Box<dyn Fn(&[f64]) -> f64>,
        direction: Direction,
        threshold: f64,
        hardness: Hardness,
    ) -> Result<usize> {
        self.ensure_capacity()?;
        let penalty_rate = if hardness == Hardness::Soft { 1.0 } else { 0.0 };
        self.constraints.push(Constraint {
            kind: ConstraintKind::Custom,
            name: name.into(),
            direction,
            hardness,
            threshold,
            penalty_rate,
            active: true,
            evaluator: Evaluator::Custom(eval_fn),
        });
        Ok(self.constraints.len() - 1)
    }

    pub fn get(&self, idx: usize) -> Result<&Constraint> {
        self.constraints
            .get(idx)
            .ok_or_else(|| GeometryError::InvalidArgument(format!("no constraint at index {idx}")))
    }

    pub fn set_active(&mut self, idx: usize, active: bool) -> Result<()> {
        let c = self
            .constraints
            .get_mut(idx)
            .ok_or_else(|| GeometryError::InvalidArgument(format!("no constraint at index {idx}")))?;
        c.active = active;
        Ok(())
    }

    pub fn is_violated(&self, idx: usize, point: &[f64]) -> Result<bool> {
        self.get(idx)?.is_violated(point)
    }

    /// `true` if any active constraint is violated at `point`.
    pub fn check(&self, point: &[f64]) -> Result<bool> {
        for c in &self.constraints {
            if c.is_violated(point)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Minimum signed distance across all constraints (`+infinity` if empty or all
    /// inactive).
    pub fn distance(&self, point: &[f64]) -> Result<f64> {
        let mut min = f64::INFINITY;
        for c in &self.constraints {
            min = min.min(c.signed_distance(point)?);
        }
        Ok(min)
    }

    /// Index of the most-binding (minimum signed distance) constraint.
    pub fn nearest(&self, point: &[f64]) -> Result<Option<usize>> {
        let mut best_idx = None;
        let mut best_dist = f64::INFINITY;
        for (i, c) in self.constraints.iter().enumerate() {
            let d = c.signed_distance(point)?;
            if d < best_dist {
                best_dist = d;
                best_idx = Some(i);
            }
        }
        Ok(best_idx)
    }

    pub fn penalty(&self, idx: usize, point: &[f64]) -> Result<f64> {
        self.get(idx)?.penalty(point)
    }

    pub fn total_penalty(&self, point: &[f64]) -> Result<f64> {
        let mut total = 0.0;
        for c in &self.constraints {
            total += c.penalty(point)?;
        }
        Ok(total)
    }

    pub fn any_hard_violation(&self, point: &[f64]) -> Result<bool> {
        for c in &self.constraints {
            if c.hardness == Hardness::Hard && c.is_violated(point)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(98.0, false, 2.0, 0.0; "inside upper limit: not violated, distance +2, no penalty")]
    #[test_case(101.0, true, -1.0, 10.0; "beyond upper limit: violated, distance -1, penalty 10")]
    fn upper_limit_soft_constraint(spot: f64, violated: bool, distance: f64, penalty: f64) {
        let mut surface = ConstraintSurface::new();
        let idx = surface
            .add_full(
                ConstraintKind::Liquidity,
                "spot-cap",
                Direction::Upper,
                Hardness::Soft,
                0,
                100.0,
                10.0,
            )
            .unwrap();
        let point = [spot];
        assert_eq!(surface.is_violated(idx, &point).unwrap(), violated);
        assert!((surface.distance(&point).unwrap() - distance).abs() < 1e-9);
        assert!((surface.penalty(idx, &point).unwrap() - penalty).abs() < 1e-9);
    }

    #[test_case(Direction::Upper, 99.0, false; "upper: v < T satisfied")]
    #[test_case(Direction::Upper, 101.0, true; "upper: v > T violated")]
    #[test_case(Direction::Lower, 1.0, false; "lower: v > T satisfied")]
    #[test_case(Direction::Lower, -1.0, true; "lower: v < T violated")]
    #[test_case(Direction::Equality, 0.0, false; "equality: within tolerance satisfied")]
    #[test_case(Direction::Equality, 1.0, true; "equality: beyond tolerance violated")]
    fn direction_truth_table(direction: Direction, value: f64, expect_violated: bool) {
        let mut surface = ConstraintSurface::new();
        let idx = surface
            .add_full(ConstraintKind::Custom, "c", direction, Hardness::Soft, 0, 0.0, 1.0)
            .unwrap();
        assert_eq!(surface.is_violated(idx, &[value]).unwrap(), expect_violated);
    }

    #[test]
    fn signed_distance_zero_at_boundary() {
        let mut surface = ConstraintSurface::new();
        let idx = surface
            .add_full(ConstraintKind::Margin, "m", Direction::Upper, Hardness::Hard, 0, 50.0, 0.0)
            .unwrap();
        assert!((surface.distance(&[50.0]).unwrap()).abs() < 1e-12);
        assert_eq!(surface.is_violated(idx, &[50.0]).unwrap(), false);
    }

    #[test]
    fn inactive_constraint_never_violated_and_contributes_infinite_distance() {
        let mut surface = ConstraintSurface::new();
        let idx = surface
            .add_full(ConstraintKind::Margin, "m", Direction::Upper, Hardness::Hard, 0, 10.0, 0.0)
            .unwrap();
        surface.set_active(idx, false).unwrap();
        assert_eq!(surface.is_violated(idx, &[1000.0]).unwrap(), false);
        assert_eq!(surface.distance(&[1000.0]).unwrap(), f64::INFINITY);
    }

    #[test]
    fn hard_constraints_carry_no_penalty() {
        let mut surface = ConstraintSurface::new();
        let idx = surface
            .add_full(ConstraintKind::Margin, "m", Direction::Upper, Hardness::Hard, 0, 10.0, 5.0)
            .unwrap();
        assert_eq!(surface.penalty(idx, &[100.0]).unwrap(), 0.0);
    }

    #[test]
    fn custom_evaluator_applies_arbitrary_function() {
        let mut surface = ConstraintSurface::new();
        let idx = surface
            .add_custom(
                "norm-cap",
                Box::new(|p: &[f64]| (p[0] * p[0] + p[1] * p[1]).sqrt()),
                Direction::Upper,
                5.0,
                Hardness::Soft,
            )
            .unwrap();
        assert!(surface.is_violated(idx, &[3.0, 4.0]).unwrap() == false);
        assert!(surface.is_violated(idx, &[3.0, 5.0]).unwrap());
    }

    #[test]
    fn nearest_picks_most_binding_constraint() {
        let mut surface = ConstraintSurface::new();
        surface
            .add_full(ConstraintKind::Margin, "tight", Direction::Upper, Hardness::Hard, 0, 10.0, 0.0)
            .unwrap();
        let loose_idx = surface
            .add_full(ConstraintKind::Margin, "loose", Direction::Upper, Hardness::Hard, 0, 1000.0, 0.0)
            .unwrap();
        // "tight" is the most-binding except when the point is near 1000, where "loose" becomes tighter.
        assert_eq!(surface.nearest(&[5.0]).unwrap(), Some(0));
        let _ = loose_idx;
    }
}
