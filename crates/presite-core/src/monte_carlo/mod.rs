pub mod simulation;

pub use simulation::{
    simulate, Distribution, IrrHistogramBin, IrrPercentiles, IrrStatistics, SimulationBatch,
    SimulationTrial, UncertainParameter,
};
