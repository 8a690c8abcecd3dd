//! Workload iteration: policy resolution, dimension participation, per-policy
//! pass plans and the state machine that drives them.

mod dims;
mod driver;
mod error;
mod file;
mod layer;
mod params;
mod pipeline;
mod policy;
mod state;
mod strategy;
mod tracker;

pub use dims::{DimensionDecoder, InvolvedDimensions, ParticipationTable, Phase};
pub use driver::{Workload, WorkloadOptions};
pub use error::{Result, WorkloadError};
pub use file::{WorkloadDescription, count_layers};
pub use layer::{Layer, PhaseCost};
pub use params::ParallelismParams;
pub use pipeline::{PipelineAction, PipelineOrder, PipelineShape};
pub use policy::ParallelismPolicy;
pub use state::{CommMode, LoopState, WorkUnit};
pub use strategy::{IterationStrategy, strategy_for};
pub use tracker::{CompletionTracker, InFlight};
