//! Per-layer, per-phase time accumulators.

use crate::workload::Phase;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimes {
    pub compute_ns: u64,
    /// Issue-to-completion time of every collective, overlapped or not.
    pub total_comm_ns: u64,
    /// Time the workload sat idle waiting on collectives.
    pub exposed_comm_ns: u64,
}

impl PhaseTimes {
    fn add(&mut self, other: &PhaseTimes) {
        self.compute_ns += other.compute_ns;
        self.total_comm_ns += other.total_comm_ns;
        self.exposed_comm_ns += other.exposed_comm_ns;
    }
}

#[derive(Debug, Clone, Default)]
pub struct LayerTimes {
    layers: Vec<[PhaseTimes; 3]>,
}

impl LayerTimes {
    pub fn new(layers: usize) -> Self {
        Self {
            layers: vec![[PhaseTimes::default(); 3]; layers],
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, layer: usize, phase: Phase) -> PhaseTimes {
        self.layers[layer][phase.index()]
    }

    fn slot(&mut self, layer: usize, phase: Phase) -> &mut PhaseTimes {
        &mut self.layers[layer][phase.index()]
    }

    pub fn add_compute(&mut self, layer: usize, phase: Phase, ns: u64) {
        self.slot(layer, phase).compute_ns += ns;
    }

    pub fn add_comm(&mut self, layer: usize, phase: Phase, ns: u64) {
        self.slot(layer, phase).total_comm_ns += ns;
    }

    pub fn add_exposed(&mut self, layer: usize, phase: Phase, ns: u64) {
        self.slot(layer, phase).exposed_comm_ns += ns;
    }

    /// Sum over layers of one phase.
    pub fn phase_total(&self, phase: Phase) -> PhaseTimes {
        let mut total = PhaseTimes::default();
        for layer in &self.layers {
            total.add(&layer[phase.index()]);
        }
        total
    }

    /// Sum over every layer and phase.
    pub fn total(&self) -> PhaseTimes {
        let mut total = PhaseTimes::default();
        for phase in Phase::ALL {
            total.add(&self.phase_total(phase));
        }
        total
    }
}
