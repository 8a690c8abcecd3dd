use crate::workload::{LoopState, Phase};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// 时间轴事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VizEventKind {
    /// 运行元信息（作为 t=0 的第一条事件）
    Meta {
        run_name: String,
        policy: String,
        npus: usize,
        dims: Vec<VizDimInfo>,
    },
    /// 一个 work unit 的本地计算区间
    Compute {
        layer: usize,
        state: LoopState,
        micro_batch: usize,
        duration_ns: u64,
    },
    /// 发起集合通信
    CollectiveIssued {
        id: u64,
        layer: usize,
        phase: Phase,
        op: String,
        bytes: u64,
        dims: Vec<usize>,
        blocking: bool,
    },
    /// 集合通信完成
    CollectiveDone { id: u64, duration_ns: u64 },
    /// 一个 pass 结束
    PassFinished { pass: u32 },
    /// 该设备所有 pass 结束且流已排空
    SimFinished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizDimInfo {
    pub npus: usize,
    /// 单向带宽（Gbps）
    pub bandwidth_gbps: f64,
    pub latency_ns: u64,
}

/// 一个可回放的事件（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    pub npu: Option<usize>,
    #[serde(flatten)]
    pub kind: VizEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct VizLogger {
    pub events: Vec<VizEvent>,
}

impl VizLogger {
    pub fn push(&mut self, ev: VizEvent) {
        self.events.push(ev);
    }

    /// 记录某设备上的事件
    pub fn record(&mut self, t_ns: u64, npu: usize, kind: VizEventKind) {
        self.push(VizEvent {
            t_ns,
            npu: Some(npu),
            kind,
        });
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.events).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }
}
