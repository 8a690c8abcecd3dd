//! 时间轴事件记录
//!
//! 每条事件带仿真时间与设备号，仿真结束后整体写成一个 JSON 数组，
//! 供离线回放按设备过滤。

mod types;

pub use types::{VizDimInfo, VizEvent, VizEventKind, VizLogger};
