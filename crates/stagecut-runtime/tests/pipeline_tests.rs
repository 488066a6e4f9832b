//! End-to-end: split the toy training graph into three stages and run them
//! concurrently under the wait/record protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use stagecut_runtime::{
    Binding, EventPlan, EventRegistry, Fetch, MicroBatchEvents, PartEvents, PipelineDriver,
    ReferenceSession, RuntimeError, Session, StageEvents,
};
use stagecut_split::testing::{toy_cuts, toy_graph, toy_inputs};
use stagecut_types::config::{RuntimeConfig, SyncConfig};
use stagecut_types::event::{DataEventId, EventNamespace, PipelineEventId};
use stagecut_types::tensor::Tensor;

fn config(timeout: Duration) -> RuntimeConfig {
    RuntimeConfig {
        wait_timeout: Some(timeout),
        sync: SyncConfig::default(),
    }
}

fn driver(timeout: Duration) -> PipelineDriver {
    let subs = stagecut_split::split(&toy_graph(), &toy_cuts()).unwrap();
    PipelineDriver::new(subs, &config(timeout))
}

fn batch(b: usize) -> HashMap<String, Tensor> {
    toy_inputs(b).into_iter().collect()
}

/// Gradients of the unsplit graph for micro-batch `b`.
fn reference(b: usize) -> HashMap<String, Tensor> {
    let session = ReferenceSession::new(
        toy_graph(),
        Arc::new(EventRegistry::new()),
        SyncConfig::default(),
        None,
    );
    let feeds = toy_inputs(b)
        .into_iter()
        .map(|(k, v)| (k, Binding::Value(v)))
        .collect();
    let names = ["T6_grad", "W1_grad", "W2_grad", "loss"];
    let fetches: Vec<Fetch> = names.iter().map(|n| Fetch::value(*n)).collect();
    let values = session.run(&feeds, &fetches).unwrap();
    names.iter().map(|n| n.to_string()).zip(values).collect()
}

fn part(wd: Option<i64>, wp: Option<i64>, rp: Option<i64>, rd: Option<i64>) -> PartEvents {
    PartEvents {
        wait_data: wd.map(DataEventId),
        wait_pipeline: wp.map(PipelineEventId),
        record_pipeline: rp.map(PipelineEventId),
        record_data: rd.map(DataEventId),
    }
}

/// Data events hand tensors from stage to stage; pipeline waits are unused.
fn single_batch_plan() -> EventPlan {
    EventPlan {
        micro_batches: vec![MicroBatchEvents {
            stages: vec![
                StageEvents {
                    forward: part(None, None, Some(100), Some(0)),
                    backward: part(Some(3), None, Some(101), None),
                },
                StageEvents {
                    forward: part(Some(0), None, Some(200), Some(1)),
                    backward: part(Some(2), None, Some(201), Some(3)),
                },
                StageEvents {
                    forward: part(Some(1), None, None, None),
                    backward: part(None, None, Some(300), Some(2)),
                },
            ],
        }],
    }
}

/// One-forward-one-backward schedule over six micro-batches. Data ids are
/// `4b..4b+3`; each pipeline pair is (wait, record) for, in order, stage 0
/// forward, stage 1 forward, stage 2, stage 1 backward, stage 0 backward.
fn six_batch_plan() -> EventPlan {
    const PIPELINE: [[(i64, i64); 5]; 6] = [
        [(-1, 100), (-1, 200), (-1, 300), (202, 203), (104, 105)],
        [(100, 101), (200, 201), (300, 301), (204, 205), (106, 107)],
        [(101, 102), (201, 202), (301, 302), (206, 207), (107, 108)],
        [(102, 103), (203, 204), (302, 303), (208, 209), (108, 109)],
        [(103, 104), (205, 206), (303, 304), (209, 210), (109, 110)],
        [(105, 106), (207, 208), (304, 305), (210, 211), (110, 111)],
    ];
    let wait = |id: i64| (id >= 0).then_some(id);

    let micro_batches = PIPELINE
        .iter()
        .enumerate()
        .map(|(b, p)| {
            let d = |i: i64| Some(4 * b as i64 + i);
            MicroBatchEvents {
                stages: vec![
                    StageEvents {
                        forward: part(None, wait(p[0].0), Some(p[0].1), d(0)),
                        backward: part(d(3), wait(p[4].0), Some(p[4].1), None),
                    },
                    StageEvents {
                        forward: part(d(0), wait(p[1].0), Some(p[1].1), d(1)),
                        backward: part(d(2), wait(p[3].0), Some(p[3].1), d(3)),
                    },
                    StageEvents {
                        forward: part(d(1), wait(p[2].0), None, None),
                        backward: part(None, None, Some(p[2].1), d(2)),
                    },
                ],
            }
        })
        .collect();
    EventPlan { micro_batches }
}

#[tokio::test(flavor = "multi_thread")]
async fn three_stages_match_unsplit_gradients() {
    let driver = driver(Duration::from_secs(10));
    let outputs = driver.run(vec![batch(0)], &single_batch_plan()).await.unwrap();
    assert_eq!(outputs.len(), 3);

    let want = reference(0);
    let stage = |s: u32| outputs.iter().find(|o| o.stage == s).unwrap();
    assert_eq!(stage(2).get("T6_grad_sync"), Some(&want["T6_grad"]));
    assert_eq!(stage(2).get("loss"), Some(&want["loss"]));
    assert_eq!(stage(1).get("W2_grad"), Some(&want["W2_grad"]));
    assert_eq!(stage(0).get("W1_grad"), Some(&want["W1_grad"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn six_interleaved_micro_batches_complete() {
    let driver = driver(Duration::from_secs(10));
    let batches = (0..6).map(batch).collect();
    let outputs = driver.run(batches, &six_batch_plan()).await.unwrap();
    assert_eq!(outputs.len(), 18);

    for b in 0..6 {
        let want = reference(b);
        let of = |s: u32| {
            outputs
                .iter()
                .find(|o| o.micro_batch == b && o.stage == s)
                .unwrap()
        };
        assert_eq!(of(0).get("W1_grad"), Some(&want["W1_grad"]), "micro-batch {b}");
        assert_eq!(of(1).get("W2_grad"), Some(&want["W2_grad"]), "micro-batch {b}");
        assert_eq!(of(2).get("loss"), Some(&want["loss"]), "micro-batch {b}");
    }

    let order: Vec<_> = outputs.iter().map(|o| (o.micro_batch, o.stage)).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
}

#[tokio::test(flavor = "multi_thread")]
async fn driver_can_be_rerun() {
    let driver = driver(Duration::from_secs(10));
    for _ in 0..2 {
        let outputs = driver.run(vec![batch(1)], &single_batch_plan()).await.unwrap();
        assert_eq!(outputs.len(), 3);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_stage_aborts_dependents() {
    let driver = driver(Duration::from_secs(30));
    let mut inputs = batch(0);
    inputs.remove("labels");
    let err = driver.run(vec![inputs], &single_batch_plan()).await.unwrap_err();
    assert!(
        matches!(err, RuntimeError::MissingInput { stage: 2, ref name } if name == "labels"),
        "{err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cyclic_numbering_times_out() {
    let driver = driver(Duration::from_millis(200));
    let mut plan = single_batch_plan();
    // Stage 1 forward now waits for stage 2 backward, which needs stage 1 forward.
    plan.micro_batches[0].stages[1].forward.wait_pipeline = Some(PipelineEventId(300));
    let err = driver.run(vec![batch(0)], &plan).await.unwrap_err();
    assert!(matches!(err, RuntimeError::EventTimeout { .. }), "{err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_plan_is_rejected_before_running() {
    let driver = driver(Duration::from_secs(1));
    let mut plan = single_batch_plan();
    plan.micro_batches[0].stages[0].forward.record_data = Some(DataEventId(1));
    let err = driver.run(vec![batch(0)], &plan).await.unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidPlan(_)));
    assert!(!driver.registry().is_recorded(EventNamespace::Pipeline, 100));

    let err = driver.run(vec![batch(0), batch(1)], &single_batch_plan()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidPlan(_)));
}
