//! Local differential geometry of a scalar pricing function over a gridded state
//! space of risk factors.
//!
//! Given a user-supplied pricing function sampled onto a [`state_space::StateSpace`],
//! this crate computes first-order sensitivity ([`jacobian::Jacobian`]), second-order
//! curvature and conditioning ([`hessian::Hessian`]), proximity to admissibility
//! boundaries ([`constraint::ConstraintSurface`]), and a path-cost metric over the
//! space ([`transport::TransportMetric`]). [`fragility::FragilityMap`] combines the
//! first three into a bounded `[0, 1]` fragility score and sweeps a grid to find the
//! regions where it is highest.

pub mod constraint;
pub mod dimension;
pub mod differentiate;
pub mod error;
pub mod fragility;
pub mod hessian;
pub mod jacobian;
pub mod state_space;
pub mod transport;

pub mod prelude {
    pub use crate::constraint::{
        Constraint, ConstraintKind, ConstraintSurface, Direction, Hardness, C_MAX,
    };
    pub use crate::dimension::{Dimension, RiskFactorKind, D_MAX};
    pub use crate::differentiate::{
        central_partial, diagonal_second_partial, five_point_partial, forward_partial,
        mixed_second_partial,
    };
    pub use crate::error::{GeometryError, Result};
    pub use crate::fragility::{
        classify, FragilityClass, FragilityConfig, FragilityMap, FragilePoint, FragilityStatistics,
    };
    pub use crate::hessian::{Definiteness, Hessian};
    pub use crate::jacobian::{Jacobian, DEFAULT_BUMP};
    pub use crate::state_space::StateSpace;
    pub use crate::transport::{TransportMetric, S_MAX};

    pub use nalgebra;
}
