pub mod partition;
pub mod problem_set;
pub mod normaliser;
pub mod extreme_points;
pub mod solver;
pub mod violator;
pub mod signature;
pub mod quotient;
pub mod lumper;

pub use lumper::{can_lump, lump, lump_with_backend, LumpResult, Lumper};
