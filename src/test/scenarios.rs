use super::support::{description, layer, layers, simulate};
use crate::cc::{AnalyticalComm, DimensionLink};
use crate::sim::Simulator;
use crate::sys::Sys;
use crate::workload::{
    DimensionDecoder, LoopState, ParallelismParams, ParallelismPolicy, Phase, PipelineOrder,
    Workload, WorkloadOptions,
};

fn opts(total_pass: u32) -> WorkloadOptions {
    WorkloadOptions {
        total_pass,
        ..WorkloadOptions::default()
    }
}

#[test]
fn data_parallel_timeline_and_exposed_comm() {
    // F0 0-10, F1 10-20, WG1 20-30 + 5 comm, IG1 35-45, WG0 45-55 + 5 comm.
    let desc = description(
        ParallelismPolicy::Data,
        ParallelismParams::default(),
        layers(2, 10, "ALLREDUCE", 1024),
    );
    let out = simulate(&desc, vec![2], 1, opts(1), 5);

    assert!(out.all_finished);
    assert_eq!(out.end.as_nanos(), 60);
    let s = &out.summaries[0];
    assert_eq!(s.finished_ns, 60);
    assert_eq!(s.collectives_issued, 2);
    assert_eq!(s.total_compute_ns, 50);
    assert_eq!(s.total_comm_ns, 10);
    assert_eq!(s.total_exposed_comm_ns, 10);
}

#[test]
fn every_device_finishes_every_pass() {
    let desc = description(
        ParallelismPolicy::Data,
        ParallelismParams::default(),
        layers(4, 10, "ALLREDUCE", 1024),
    );
    let out = simulate(&desc, vec![2, 2], 4, opts(2), 25);

    assert!(out.all_finished);
    assert_eq!(out.summaries.len(), 4);
    assert!(out.states.iter().all(|s| *s == LoopState::WaitForSimFinish));
    assert!(out.passes.iter().all(|p| *p == 2));
    for npu in 0..4 {
        let reqs = out.requests_for(npu);
        assert_eq!(reqs.len(), 8);
        assert!(reqs.iter().all(|r| r.dims == vec![false, true]));
    }
    // Identical devices finish together.
    let first = out.summaries[0].finished_ns;
    assert!(out.summaries.iter().all(|s| s.finished_ns == first));
}

#[test]
fn model_parallel_orders_forward_then_reverse_input_gradients() {
    let desc = description(
        ParallelismPolicy::Model,
        ParallelismParams::default(),
        layers(3, 10, "ALLGATHER", 256),
    );
    let out = simulate(&desc, vec![4], 2, opts(1), 3);
    assert!(out.all_finished);
    let seen: Vec<(Phase, usize)> = out
        .requests_for(1)
        .iter()
        .map(|r| (r.phase, r.layer))
        .collect();
    assert_eq!(
        seen,
        vec![
            (Phase::Forward, 0),
            (Phase::Forward, 1),
            (Phase::Forward, 2),
            (Phase::InputGradient, 2),
            (Phase::InputGradient, 1),
            (Phase::InputGradient, 0),
        ]
    );
}

#[test]
fn pipelined_transformer_syncs_weights_once_per_pass() {
    let params = ParallelismParams {
        pipeline_model_parallelism: 2,
        gradient_accumulation: 2,
        pp_stage: 1,
        ..ParallelismParams::default()
    };
    let desc = description(
        ParallelismPolicy::Transformer,
        params,
        layers(2, 10, "ALLREDUCE", 2048),
    );
    for order in [PipelineOrder::Interleaved1F1B, PipelineOrder::AllForwardAllBackward] {
        let out = simulate(
            &desc,
            vec![2, 2],
            2,
            WorkloadOptions {
                pipeline_order: order,
                ..opts(1)
            },
            4,
        );
        assert!(out.all_finished, "{order:?}");
        let reqs = out.requests_for(0);
        let wg: Vec<_> = reqs
            .iter()
            .filter(|r| r.phase == Phase::WeightGradient)
            .collect();
        assert_eq!(wg.len(), 2, "{order:?}");
        assert!(wg.iter().all(|r| r.micro_batch == 1 && r.dims == vec![false, true]));
        let activations = reqs.iter().filter(|r| r.phase != Phase::WeightGradient).count();
        assert_eq!(activations, 8, "{order:?}");
    }
}

#[test]
fn recompute_workload_replays_forwards() {
    let params = ParallelismParams {
        checkpoints: vec![0],
        checkpoint_initiates: vec![1],
        ..ParallelismParams::default()
    };
    let desc = description(
        ParallelismPolicy::TransformerFwdInBckwd,
        params,
        layers(2, 10, "ALLREDUCE", 2048),
    );
    let out = simulate(&desc, vec![2, 2], 1, opts(1), 4);
    assert!(out.all_finished);
    // Two forwards plus two replayed ones.
    let fwd = out
        .requests
        .iter()
        .filter(|r| r.phase == Phase::Forward)
        .count();
    assert_eq!(fwd, 4);
}

#[test]
fn dlrm_overlaps_embedding_alltoall() {
    let params = ParallelismParams {
        dlrm_last_bottom_layer: Some(1),
        ..ParallelismParams::default()
    };
    let layers = vec![
        layer("emb", 10, "ALLTOALL", 4096),
        layer("bot", 10, "ALLREDUCE", 1024),
        layer("top", 10, "ALLREDUCE", 1024),
    ];
    for policy in [ParallelismPolicy::Dlrm, ParallelismPolicy::DlrmEnhanced] {
        let desc = description(policy, params.clone(), layers.clone());
        let out = simulate(&desc, vec![4, 2], 2, opts(2), 30);
        assert!(out.all_finished, "{policy}");
        let reqs = out.requests_for(0);
        // Per pass: embedding fwd, dense wg x2. Layer 0 has no input gradient.
        assert_eq!(reqs.len(), 6, "{policy}");
        assert!(
            reqs.iter()
                .filter(|r| r.layer == 0)
                .all(|r| r.phase == Phase::Forward)
        );
    }
}

#[test]
fn zero_latency_collectives_still_complete() {
    let desc = description(
        ParallelismPolicy::MicroBenchmark,
        ParallelismParams::default(),
        layers(3, 0, "ALLREDUCE", 64),
    );
    let out = simulate(&desc, vec![8], 2, opts(3), 0);
    assert!(out.all_finished);
    assert_eq!(out.end.as_nanos(), 0);
    assert!(out.summaries.iter().all(|s| s.collectives_issued == 9));
}

#[test]
fn every_policy_runs_to_completion() {
    for policy in ParallelismPolicy::all() {
        let params = ParallelismParams {
            dlrm_last_bottom_layer: policy.is_dlrm().then_some(1),
            ..ParallelismParams::default()
        };
        let mut layers = layers(2, 10, "ALLREDUCE", 512);
        if policy == ParallelismPolicy::HybridCustomized {
            layers[0] = layers[0].clone().with_override("DATA");
        }
        let desc = description(policy, params, layers);
        let out = simulate(&desc, vec![2, 4], 2, opts(2), 11);
        assert!(out.all_finished, "{policy}");
        assert!(out.summaries.iter().all(|s| s.passes == 2), "{policy}");
    }
}

#[test]
fn analytical_model_reports_dimension_busy_time() {
    let desc = description(
        ParallelismPolicy::Data,
        ParallelismParams::default(),
        layers(2, 100, "ALLREDUCE", 1000),
    );
    let decoder = DimensionDecoder::new(vec![4]).unwrap();
    let w = Workload::new(opts(1), &desc, &decoder).unwrap();
    let link = DimensionLink {
        npus: 4,
        bandwidth_gbps: 100.0,
        latency_ns: 1000,
    };
    let mut sys = Sys::new(vec![w], Box::new(AnalyticalComm::new(vec![link])));
    let mut sim = Simulator::default();
    sys.start(&mut sim);
    sim.run(&mut sys);

    assert!(sys.all_finished());
    let ledger = sys.ledger(0);
    assert_eq!((ledger.injected, ledger.finished), (2, 2));
    assert!(ledger.announced);

    // 6 ring steps of (1000 ns + 250 B at 100 Gbps) per all-reduce.
    let summary = &sys.summaries()[0];
    assert_eq!(summary.total_comm_ns, 2 * 6_120);
    assert_eq!(summary.dimension_usage.len(), 1);
    assert_eq!(summary.dimension_usage[0].busy_ns, 2 * 6_120);
    assert_eq!(summary.finished_ns, 500 + 2 * 6_120);
}
