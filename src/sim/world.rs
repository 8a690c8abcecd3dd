//! 世界 trait
//!
//! 定义仿真世界接口：事件通过它把通知投递给系统层（每个设备上的 workload）。

use super::simulator::Simulator;
use crate::sys::{CallData, EventKind};

/// 仿真世界：由系统层实现，持有所有设备的 workload。
pub trait World {
    /// 把一次回调（事件类型 + 事件数据）投递给 `npu` 上的 workload。
    fn notify(&mut self, npu: usize, kind: EventKind, data: CallData, sim: &mut Simulator);

    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
