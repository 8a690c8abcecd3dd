//! 系统层：workload 与仿真引擎、通信模型之间的边界。

mod api;
mod config;
mod system;

pub use api::{
    CallData, CollectiveDone, CollectiveId, CollectiveRequest, DimensionUsage, EventKind, SysApi,
};
pub use config::{ConfigError, DimensionConfig, SystemConfig};
pub use system::{StreamLedger, Sys};
