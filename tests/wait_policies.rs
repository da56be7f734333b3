//! Wait-policy behavior as seen in compiled graphs, plus the catalog hook
//! failure semantics.

use std::cell::RefCell;

use chrono::{TimeDelta, TimeZone, Utc};
use dagforge::graph::builder::compile_graph;
use dagforge::graph::dag::TaskKind;
use dagforge::graph::hooks::CatalogHook;
use dagforge::schedule::WaitPolicy;
use dagforge_test_utils::builders::{test_config, test_profiles, JobBuilder, ManifestBuilder};
use dagforge_test_utils::init_tracing;

#[test]
fn all_policy_materializes_one_wait_per_upstream_instant() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_job(
            "transform.a.a1",
            JobBuilder::transform("a", "a1").schedule("@hourly").build(),
        )
        .with_job(
            "transform.b.b1",
            JobBuilder::transform("b", "b1")
                .depends_on("transform.a.a1")
                .wait_policy("transform.a.a1", WaitPolicy::All)
                .build(),
        )
        .build();

    let dags = compile_graph(&test_config(), &manifest, &test_profiles(&["prod"]), None).unwrap();
    let b = dags.get("b__daily").unwrap();

    // Daily on hourly under "all": 24 wait nodes, one per hour.
    let mut wait_ids: Vec<&str> = b
        .task_ids()
        .filter(|id| id.starts_with("wait__a1"))
        .collect();
    assert_eq!(wait_ids.len(), 24);
    wait_ids.sort();
    assert!(wait_ids.contains(&"wait__a1__0"));
    assert!(wait_ids.contains(&"wait__a1__23"));

    let execution = Utc.with_ymd_and_hms(2023, 10, 12, 0, 0, 0).unwrap();
    for i in 0..24 {
        let id = format!("wait__a1__{i}");
        match &b.task(&id).unwrap().kind {
            TaskKind::ExternalWait { wait, .. } => {
                assert_eq!(wait.iteration, Some(i));
                assert_eq!(
                    wait.target_instant(execution).unwrap(),
                    execution + TimeDelta::hours(i as i64)
                );
            }
            other => panic!("expected an external wait, got {other:?}"),
        }
    }

    // Every wait node feeds the consumer.
    let b1 = dagforge::graph::dag::NodeRef::Task("b1".to_string());
    assert_eq!(b.upstream_of(&b1).len(), 24);
}

#[test]
fn last_policy_stays_single_even_across_levels() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_job(
            "transform.a.a1",
            JobBuilder::transform("a", "a1").schedule("@every15minutes").build(),
        )
        .with_job(
            "transform.b.b1",
            JobBuilder::transform("b", "b1")
                .schedule("@monthly")
                .depends_on("transform.a.a1")
                .build(),
        )
        .build();

    let dags = compile_graph(&test_config(), &manifest, &test_profiles(&["prod"]), None).unwrap();
    let b = dags.get("b__monthly").unwrap();

    let waits: Vec<&str> = b.task_ids().filter(|id| id.starts_with("wait__")).collect();
    assert_eq!(waits, vec!["wait__a1"]);
}

#[test]
fn shift_alignment_matches_the_upstream_schedule() {
    init_tracing();
    // Downstream hourly shifted by 15 minutes, upstream hourly shifted by
    // 30: at 16:15 the wait instant is exactly 15:30.
    let manifest = ManifestBuilder::new()
        .with_job(
            "transform.a.a1",
            JobBuilder::transform("a", "a1").schedule("@hourly").shift(0, 0, 30).build(),
        )
        .with_job(
            "transform.b.b1",
            JobBuilder::transform("b", "b1")
                .schedule("@hourly")
                .shift(0, 0, 15)
                .depends_on("transform.a.a1")
                .build(),
        )
        .build();

    let dags = compile_graph(&test_config(), &manifest, &test_profiles(&["prod"]), None).unwrap();
    let b = dags.get("b__hourly_shift_15_minutes").unwrap();
    assert!(b.has_group("a__hourly_shift_30_minutes__dependencies__group"));

    match &b.task("wait__a1").unwrap().kind {
        TaskKind::ExternalWait { upstream_dag, wait, .. } => {
            assert_eq!(upstream_dag, "a__hourly_shift_30_minutes");
            let execution = Utc.with_ymd_and_hms(2023, 10, 12, 16, 15, 0).unwrap();
            assert_eq!(
                wait.target_instant(execution).unwrap(),
                Utc.with_ymd_and_hms(2023, 10, 12, 15, 30, 0).unwrap()
            );
        }
        other => panic!("expected an external wait, got {other:?}"),
    }
}

struct RecordingHook {
    seen: RefCell<Vec<String>>,
    fail: bool,
}

impl CatalogHook for RecordingHook {
    fn on_node_built(&self, dag_name: &str, task: &dagforge::graph::dag::TaskNode) -> anyhow::Result<()> {
        self.seen.borrow_mut().push(format!("{dag_name}/{}", task.id));
        if self.fail {
            anyhow::bail!("catalog unreachable");
        }
        Ok(())
    }
}

#[test]
fn catalog_hook_failures_are_swallowed_unless_required() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_job("transform.a.a1", JobBuilder::transform("a", "a1").build())
        .build();
    let profiles = test_profiles(&["prod"]);

    let mut config = test_config();
    config.catalog.enabled = true;

    let hook = RecordingHook { seen: RefCell::new(Vec::new()), fail: true };
    let dags = compile_graph(&config, &manifest, &profiles, Some(&hook)).unwrap();
    assert!(dags.get("a__daily").is_some());
    // Scheduled and backfill model nodes both reported.
    assert!(hook.seen.borrow().contains(&"a__daily/a1".to_string()));
    assert!(hook.seen.borrow().contains(&"a__backfill/a1__bf".to_string()));

    config.catalog.success_required = true;
    let strict = RecordingHook { seen: RefCell::new(Vec::new()), fail: true };
    let err = compile_graph(&config, &manifest, &profiles, Some(&strict))
        .unwrap_err()
        .to_string();
    assert!(err.contains("catalog"), "{err}");
}

#[test]
fn disabled_catalog_never_invokes_the_hook() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_job("transform.a.a1", JobBuilder::transform("a", "a1").build())
        .build();

    let hook = RecordingHook { seen: RefCell::new(Vec::new()), fail: false };
    compile_graph(&test_config(), &manifest, &test_profiles(&["prod"]), Some(&hook)).unwrap();
    assert!(hook.seen.borrow().is_empty());
}
