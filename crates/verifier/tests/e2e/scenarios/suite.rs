//! Suite runner E2E tests using the shipped demo suite.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use meshprobe_verifier::{ScenarioOutcome, SuiteConfig, SuiteRunner, VerifierError};

use crate::helpers::config::{demo_path, impatient_config, test_config};
use crate::helpers::mesh::FakeMesh;

async fn demo_suite() -> SuiteConfig {
    SuiteConfig::load(demo_path("suite.toml"))
        .await
        .expect("demo suite should load")
}

#[tokio::test(start_paused = true)]
async fn test_e2e_demo_suite_passes() {
    // Given: a healthy mesh and the demo suite
    let mesh = Arc::new(FakeMesh::new());
    let runner = SuiteRunner::new(Arc::clone(&mesh), test_config());

    // When: running the whole suite
    let report = runner.run(&demo_suite().await).await.unwrap();

    // Then: reachability and all four scenarios passed, in order
    assert_eq!(report.namespace, "mesh-e2e");
    assert_eq!(report.reachability.cells, 54);
    let names: Vec<&str> = report.scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        ["default-route", "weighted-route", "content-route", "fault-policy"]
    );
    assert_eq!(mesh.applied(), names);

    match &report.scenarios[1].outcome {
        ScenarioOutcome::Routing(routing) => {
            assert_eq!(routing.observed["v1"], 75);
            assert_eq!(routing.observed["v2"], 25);
        }
        other => panic!("unexpected: {other:?}"),
    }
    match &report.scenarios[3].outcome {
        ScenarioOutcome::Fault(fault) => {
            assert_eq!(fault.observed_status, 503);
            assert_eq!(fault.observed_latency_ms, 5000);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_e2e_suite_report_serializes_check_tags() {
    // Given: a passed suite
    let mesh = Arc::new(FakeMesh::new());
    let report = SuiteRunner::new(mesh, test_config())
        .run(&demo_suite().await)
        .await
        .unwrap();

    // When: rendering as JSON
    let json = serde_json::to_value(&report).unwrap();

    // Then: scenarios carry their check kind next to the report fields
    assert_eq!(json["scenarios"][0]["name"], "default-route");
    assert_eq!(json["scenarios"][0]["check"], "routing");
    assert_eq!(json["scenarios"][0]["observed"]["v1"], 100);
    assert_eq!(json["scenarios"][3]["check"], "fault");
    assert_eq!(json["reachability"]["mode"]["parallel"]["max_in_flight"], 64);
    assert_eq!(json["routing_skipped"], false);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_skip_routing_runs_reachability_only() {
    // Given: routing scenarios disabled
    let mesh = Arc::new(FakeMesh::new());
    let runner = SuiteRunner::new(Arc::clone(&mesh), test_config()).skip_routing(true);

    // When: running the demo suite
    let report = runner.run(&demo_suite().await).await.unwrap();

    // Then: nothing was applied and no scenario ran
    assert!(report.routing_skipped);
    assert!(report.scenarios.is_empty());
    assert!(mesh.applied().is_empty());
    assert_eq!(mesh.world_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_suite_stops_at_first_failed_scenario() {
    // Given: the weighted rule never reaches the proxies
    let mesh = Arc::new(FakeMesh::new().ignoring("weighted-route"));
    let runner = SuiteRunner::new(Arc::clone(&mesh), impatient_config());

    // When: running the suite
    let err = runner.run(&demo_suite().await).await.unwrap_err();

    // Then: the suite halted there and later rules were never applied
    assert!(
        matches!(err, VerifierError::BudgetExceeded { ref operation, .. } if operation.starts_with("restart epoch of hello")),
        "{err:?}"
    );
    assert_eq!(mesh.applied(), ["default-route", "weighted-route"]);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_teardown_dumps_proxy_logs_after_failure() {
    // Given: proxy log dumping enabled and a failing scenario
    let mut config = impatient_config();
    config.general.dump_proxy_logs = true;
    let mesh = Arc::new(FakeMesh::new().ignoring("default-route"));
    let runner = SuiteRunner::new(Arc::clone(&mesh), config);

    // When: the suite fails
    runner.run(&demo_suite().await).await.unwrap_err();

    // Then: correlation read a and b once, teardown read them again
    assert_eq!(mesh.log_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_teardown_skips_log_dump_by_default() {
    // Given: default configuration and a failing scenario
    let mesh = Arc::new(FakeMesh::new().ignoring("default-route"));
    let runner = SuiteRunner::new(Arc::clone(&mesh), impatient_config());

    // When: the suite fails
    runner.run(&demo_suite().await).await.unwrap_err();

    // Then: only correlation read the proxy logs
    assert_eq!(mesh.log_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_missing_rule_file_fails_before_touching_cluster() {
    // Given: a suite referencing a rule file that does not exist
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("suite.toml");
    tokio::fs::write(
        &path,
        r#"
[[scenarios]]
name = "default-route"
kind = "RouteRule"
rule_file = "rules/missing.yaml"
src = "hello"
dst = "world"

[scenarios.expect]
v1 = 100
"#,
    )
    .await
    .unwrap();
    let suite = SuiteConfig::load(&path).await.unwrap();
    let mesh = Arc::new(FakeMesh::new());

    // When: running it
    let err = SuiteRunner::new(Arc::clone(&mesh), test_config())
        .run(&suite)
        .await
        .unwrap_err();

    // Then: a configuration error, with no cluster call made
    match err {
        VerifierError::Config(reason) => assert!(reason.contains("missing.yaml"), "{reason}"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(mesh.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_reachability_only_run() {
    // Given: a healthy mesh
    let mesh = Arc::new(FakeMesh::new());

    // When: running only the reachability phase
    let report = SuiteRunner::new(Arc::clone(&mesh), test_config())
        .run_reachability()
        .await
        .unwrap();

    // Then: the hello/world workloads were never needed
    assert_eq!(report.correlated.len(), 2);
    assert!(mesh.applied().is_empty());
}
