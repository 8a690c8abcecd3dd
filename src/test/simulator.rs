use crate::sim::{Event, SimTime, Simulator, World};
use crate::sys::{CallData, EventKind};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingWorld {
    ticks: usize,
    notified: Vec<(u64, usize, EventKind)>,
}

impl World for RecordingWorld {
    fn notify(&mut self, npu: usize, kind: EventKind, _data: CallData, sim: &mut Simulator) {
        self.notified.push((sim.now().as_nanos(), npu, kind));
    }

    fn on_tick(&mut self, _sim: &mut Simulator) {
        self.ticks = self.ticks.saturating_add(1);
    }
}

struct Push {
    id: u32,
    log: Arc<Mutex<Vec<u32>>>,
}

impl Event for Push {
    fn execute(self: Box<Self>, _sim: &mut Simulator, _world: &mut dyn World) {
        let Push { id, log } = *self;
        log.lock().expect("log lock").push(id);
    }
}

/// Wakes `npu` again after `delay` until `left` runs out.
struct Rearm {
    npu: usize,
    delay: u64,
    left: u32,
}

impl Event for Rearm {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        world.notify(self.npu, EventKind::WorkloadWait, CallData::None, sim);
        if self.left > 1 {
            sim.schedule_in(
                self.delay,
                Rearm {
                    left: self.left - 1,
                    ..*self
                },
            );
        }
    }
}

#[test]
fn same_time_events_keep_schedule_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    for (at, id) in [(10, 1), (5, 2), (10, 3), (5, 4)] {
        sim.schedule(
            SimTime(at),
            Push {
                id,
                log: Arc::clone(&log),
            },
        );
    }

    let mut world = RecordingWorld::default();
    sim.run(&mut world);

    assert_eq!(&*log.lock().expect("log lock"), &[2, 4, 1, 3]);
    assert_eq!(world.ticks, 4);
    assert_eq!(sim.executed(), 4);
    assert_eq!(sim.now(), SimTime(10));
}

#[test]
fn notify_in_reaches_world_at_delay() {
    let mut sim = Simulator::default();
    sim.notify_in(7, 2, EventKind::CollectiveComplete, CallData::None);
    sim.notify_in(0, 0, EventKind::General, CallData::None);
    assert_eq!(sim.pending(), 2);

    let mut world = RecordingWorld::default();
    sim.run(&mut world);

    assert_eq!(
        world.notified,
        vec![
            (0, 0, EventKind::General),
            (7, 2, EventKind::CollectiveComplete)
        ]
    );
}

#[test]
fn events_in_the_past_are_clamped_to_now() {
    let mut sim = Simulator::default();
    let mut world = RecordingWorld::default();
    sim.run_until(SimTime(100), &mut world);

    sim.schedule(
        SimTime(3),
        Push {
            id: 1,
            log: Arc::new(Mutex::new(Vec::new())),
        },
    );
    sim.run(&mut world);
    assert_eq!(sim.now(), SimTime(100));
}

#[test]
fn run_until_stops_before_later_events() {
    let mut sim = Simulator::default();
    sim.schedule(
        SimTime::ZERO,
        Rearm {
            npu: 1,
            delay: 10,
            left: 3,
        },
    );

    let mut world = RecordingWorld::default();
    sim.run_until(SimTime(10), &mut world);
    assert_eq!(world.notified.len(), 2);
    assert_eq!(sim.now(), SimTime(10));
    assert_eq!(sim.pending(), 1);

    sim.run(&mut world);
    let times: Vec<u64> = world.notified.iter().map(|(t, _, _)| *t).collect();
    assert_eq!(times, vec![0, 10, 20]);
}

#[test]
fn run_until_advances_time_without_events() {
    let mut sim = Simulator::default();
    let mut world = RecordingWorld::default();

    sim.run_until(SimTime(7), &mut world);
    assert_eq!(sim.now(), SimTime(7));
    assert_eq!(world.ticks, 0);
}
