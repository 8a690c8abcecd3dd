//! Collective operations and their cost model.

pub mod analytical;
pub mod collective;

pub use analytical::{AnalyticalComm, CommGenerator, DimensionLink};
pub use collective::{CollectiveOp, CommType, GroupScope};
