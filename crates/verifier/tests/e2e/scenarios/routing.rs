//! Routing E2E tests.
//!
//! Each test applies one of the demo route rules, waits for the `hello`
//! proxy to restart and samples traffic to `world`.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use meshprobe_cluster::ConfigKind;
use meshprobe_verifier::{
    ExpectedDistribution, Header, RoutingCheck, VerifierError, VersionMismatch,
};

use crate::helpers::config::{demo_rule, impatient_config, test_config, verifier_for};
use crate::helpers::mesh::FakeMesh;

fn check(header: Option<Header>, expected: &[(&str, u32)]) -> RoutingCheck {
    RoutingCheck {
        src: "hello".to_owned(),
        dst: "world".to_owned(),
        header,
        samples: 100,
        expected: expected.iter().copied().collect::<ExpectedDistribution>(),
        epsilon: 5,
    }
}

#[tokio::test(start_paused = true)]
async fn test_e2e_default_route_sends_everything_to_v1() {
    // Given: a mesh splitting world traffic round-robin
    let mesh = Arc::new(FakeMesh::new());
    let verifier = verifier_for(&mesh, &test_config(), &["hello"]).await;
    let rule = demo_rule(ConfigKind::RouteRule, "default-route").await;

    // When: applying the default route
    let report = verifier
        .run_routing_check(&rule, &check(None, &[("v1", 100), ("v2", 0)]))
        .await
        .unwrap();

    // Then: every sample reached v1
    assert_eq!(mesh.applied(), vec!["default-route"]);
    assert_eq!(report.observed["v1"], 100);
    assert_eq!(report.observed["v2"], 0);
    assert_eq!(report.unmatched, 0);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_weighted_route_splits_traffic() {
    // Given: a mesh already routing to v1
    let mesh = Arc::new(FakeMesh::new());
    let verifier = verifier_for(&mesh, &test_config(), &["hello"]).await;
    let default = demo_rule(ConfigKind::RouteRule, "default-route").await;
    verifier
        .run_routing_check(&default, &check(None, &[("v1", 100)]))
        .await
        .unwrap();

    // When: applying the 75/25 rule
    let weighted = demo_rule(ConfigKind::RouteRule, "weighted-route").await;
    let report = verifier
        .run_routing_check(&weighted, &check(None, &[("v1", 75), ("v2", 25)]))
        .await
        .unwrap();

    // Then: the split matches the weights
    assert_eq!(report.observed["v1"], 75);
    assert_eq!(report.observed["v2"], 25);
    assert_eq!(mesh.world_requests(), 200);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_weighted_route_outside_tolerance_is_mismatch() {
    // Given: a 75/25 rule but a 60/40 expectation
    let mesh = Arc::new(FakeMesh::new());
    let verifier = verifier_for(&mesh, &test_config(), &["hello"]).await;
    let weighted = demo_rule(ConfigKind::RouteRule, "weighted-route").await;

    // When: verifying
    let err = verifier
        .run_routing_check(&weighted, &check(None, &[("v1", 60), ("v2", 40)]))
        .await
        .unwrap_err();

    // Then: both versions are reported with their counts
    match err {
        VerifierError::DistributionMismatch {
            src,
            dst,
            mismatches,
        } => {
            assert_eq!((src.as_str(), dst.as_str()), ("hello", "world"));
            assert_eq!(
                mismatches,
                vec![
                    VersionMismatch {
                        version: "v1".to_owned(),
                        expected: 60,
                        observed: 75,
                    },
                    VersionMismatch {
                        version: "v2".to_owned(),
                        expected: 40,
                        observed: 25,
                    },
                ]
            );
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_e2e_content_route_matches_header() {
    // Given: traffic weighted towards v1
    let mesh = Arc::new(FakeMesh::new());
    let verifier = verifier_for(&mesh, &test_config(), &["hello"]).await;
    let weighted = demo_rule(ConfigKind::RouteRule, "weighted-route").await;
    verifier
        .run_routing_check(&weighted, &check(None, &[("v1", 75), ("v2", 25)]))
        .await
        .unwrap();

    // When: applying the header rule and probing with `version: v2`
    let content = demo_rule(ConfigKind::RouteRule, "content-route").await;
    let report = verifier
        .run_routing_check(
            &content,
            &check(
                Some(Header::new("version", "v2")),
                &[("v1", 0), ("v2", 100)],
            ),
        )
        .await
        .unwrap();

    // Then: all header-carrying traffic went to v2
    assert_eq!(report.observed["v2"], 100);
    assert_eq!(report.observed["v1"], 0);
    // header-routed requests never touch the weighted split
    assert_eq!(mesh.world_requests(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_rule_that_never_propagates_times_out() {
    // Given: the control plane accepts the rule but never pushes it
    let mesh = Arc::new(FakeMesh::new().ignoring("default-route"));
    let verifier = verifier_for(&mesh, &impatient_config(), &["hello"]).await;
    let rule = demo_rule(ConfigKind::RouteRule, "default-route").await;

    // When: verifying
    let err = verifier
        .run_routing_check(&rule, &check(None, &[("v1", 100)]))
        .await
        .unwrap_err();

    // Then: the convergence wait gives up and no sample is sent
    match err {
        VerifierError::BudgetExceeded {
            operation,
            attempts,
            last_reason,
        } => {
            assert_eq!(operation, "restart epoch of hello to exceed 1");
            assert_eq!(attempts, 6);
            assert_eq!(last_reason, "epoch 1 not above baseline 1");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(mesh.world_requests(), 0);
    // one baseline read plus six polls
    assert_eq!(mesh.exec_calls.load(Ordering::SeqCst), 7);
}
