use crate::workload::{PipelineAction, PipelineOrder, PipelineShape};
use std::collections::HashMap;

fn shape(stages: usize, virtual_stages: usize, micro_batches: usize, stage: usize) -> PipelineShape {
    PipelineShape {
        stages,
        virtual_stages,
        micro_batches,
        stage,
    }
}

fn f(chunk: usize, micro_batch: usize) -> PipelineAction {
    PipelineAction::Forward { chunk, micro_batch }
}

fn b(chunk: usize, micro_batch: usize) -> PipelineAction {
    PipelineAction::Backward { chunk, micro_batch }
}

#[test]
fn warmup_depends_on_stage_depth() {
    assert_eq!(shape(4, 1, 8, 0).warmup(), 3);
    assert_eq!(shape(4, 1, 8, 2).warmup(), 1);
    assert_eq!(shape(4, 1, 8, 3).warmup(), 0);
    // Capped by the number of forwards.
    assert_eq!(shape(4, 1, 2, 0).warmup(), 2);
    // Interleaved: (pp - stage - 1) * 2 + (vpp - 1) * pp.
    assert_eq!(shape(2, 2, 4, 0).warmup(), 4);
    assert_eq!(shape(4, 2, 8, 1).warmup(), 8);
    assert_eq!(shape(4, 2, 8, 3).warmup(), 4);
}

#[test]
fn last_stage_alternates_from_the_start() {
    let actions = shape(4, 1, 3, 3).schedule(PipelineOrder::Interleaved1F1B);
    assert_eq!(actions, vec![f(0, 0), b(0, 0), f(0, 1), b(0, 1), f(0, 2), b(0, 2)]);
}

#[test]
fn first_stage_warms_up_then_drains() {
    let actions = shape(2, 1, 3, 0).schedule(PipelineOrder::Interleaved1F1B);
    assert_eq!(actions, vec![f(0, 0), f(0, 1), b(0, 0), f(0, 2), b(0, 1), b(0, 2)]);
}

#[test]
fn all_forward_all_backward_order() {
    let actions = shape(2, 1, 2, 1).schedule(PipelineOrder::AllForwardAllBackward);
    assert_eq!(actions, vec![f(0, 0), f(0, 1), b(0, 0), b(0, 1)]);
}

#[test]
fn virtual_chunks_go_forward_in_order_and_backward_reversed() {
    let actions = shape(2, 2, 2, 0).schedule(PipelineOrder::Interleaved1F1B);
    assert_eq!(
        actions,
        vec![
            f(0, 0),
            f(0, 1),
            f(1, 0),
            f(1, 1),
            b(1, 0),
            b(1, 1),
            b(0, 0),
            b(0, 1),
        ]
    );
}

#[test]
fn every_backward_follows_its_forward() {
    for order in [PipelineOrder::Interleaved1F1B, PipelineOrder::AllForwardAllBackward] {
        for stages in 1..=4 {
            for virtual_stages in 1..=3 {
                for micro_batches in 1..=6 {
                    for stage in 0..stages {
                        let s = shape(stages, virtual_stages, micro_batches, stage);
                        let actions = s.schedule(order);
                        assert_eq!(actions.len(), 2 * micro_batches * virtual_stages, "{s:?}");

                        let mut forward_at = HashMap::new();
                        let mut backward_seen = HashMap::new();
                        for (pos, action) in actions.iter().enumerate() {
                            match *action {
                                PipelineAction::Forward { chunk, micro_batch } => {
                                    assert!(
                                        forward_at.insert((chunk, micro_batch), pos).is_none(),
                                        "{s:?}: duplicate forward"
                                    );
                                }
                                PipelineAction::Backward { chunk, micro_batch } => {
                                    assert!(
                                        forward_at.contains_key(&(chunk, micro_batch)),
                                        "{s:?} {order:?}: backward before forward of ({chunk}, {micro_batch})"
                                    );
                                    assert!(
                                        backward_seen.insert((chunk, micro_batch), pos).is_none(),
                                        "{s:?}: duplicate backward"
                                    );
                                }
                            }
                        }
                        assert_eq!(backward_seen.len(), micro_batches * virtual_stages);
                    }
                }
            }
        }
    }
}
