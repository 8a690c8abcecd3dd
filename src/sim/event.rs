//! 事件 trait
//!
//! 定义仿真事件接口，以及系统层使用的唯一具体事件：向某个设备投递通知。

use super::simulator::Simulator;
use super::world::World;
use crate::sys::{CallData, EventKind};

/// 事件：可被调度执行。使用 `self: Box<Self>` 以支持 move/所有权转移。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}

/// 事件：在调度时间点把 `kind` + `data` 交给 `npu` 上的 workload。
#[derive(Debug)]
pub struct Notify {
    pub npu: usize,
    pub kind: EventKind,
    pub data: CallData,
}

impl Event for Notify {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Notify { npu, kind, data } = *self;
        world.notify(npu, kind, data, sim);
    }
}
