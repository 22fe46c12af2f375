pub mod project;
pub mod solver;

pub use project::{
    optimize_project, HorizonCandidate, Objective, OptimizationRequest, OptimizedValue,
    ProjectOptimum, VariableBound,
};
pub use solver::{minimize, Bound, OptimizationResult};
