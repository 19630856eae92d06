//! Shape analysis: heap regions, points-to edges, memory-safety checks

pub mod domain;
pub mod state;

pub use domain::ShapeDomain;
pub use state::{MemoryProperty, MemoryViolation, PointsTo, Region, RegionId, RegionStatus, ShapeState};
