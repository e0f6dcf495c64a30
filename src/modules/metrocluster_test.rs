//! Unit tests for the MetroCluster reconciler
//!
//! Covers: create from scratch with job polling, idempotent no-op, job
//! failure surfacing, check mode, legacy dialect refusal, fetch errors, input
//! rejected before any create, and the compare step on partner/DR-pair
//! mismatches.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::client::{
        HttpMethod, OntapRestApi, RequestResult, ScriptedTransport, END_OF_SEQUENCE_MESSAGE,
    };
    use crate::config::{JobPollConfig, UseRest};
    use crate::dialect::{ApiDialect, Backend};
    use crate::error::Error;
    use crate::jobs::JobPoller;
    use crate::modules::{
        DrPair, MetroClusterReconciler, MetroClusterSpec, ObservedMetroCluster, ReconcileAction,
        METROCLUSTER_API,
    };

    const JOB_UUID: &str = "fde79888-692a-11ea-80c2-005056b39fe7";

    // -------------------------------------------------------------------------
    // Canned responses
    // -------------------------------------------------------------------------

    fn is_rest() -> RequestResult {
        RequestResult::from_parts(200, Some(json!({})), None)
    }

    fn is_legacy() -> RequestResult {
        RequestResult::from_parts(400, Some(json!({})), Some("Unreachable"))
    }

    fn generic_error() -> RequestResult {
        RequestResult::from_parts(400, None, Some("Expected error"))
    }

    fn metrocluster_with_results() -> RequestResult {
        RequestResult::ok(
            200,
            Some(json!({"local": {
                "cluster": {"name": "cluster1"},
                "configuration_state": "configuration_error",
                "partner_cluster_reachable": "true",
            }})),
        )
    }

    fn metrocluster_with_no_results() -> RequestResult {
        RequestResult::ok(200, None)
    }

    fn metrocluster_post() -> RequestResult {
        RequestResult::ok(
            200,
            Some(json!({"job": {
                "uuid": JOB_UUID,
                "_links": {"self": {"href": format!("/api/cluster/jobs/{JOB_UUID}")}}
            }})),
        )
    }

    fn job(state: &str, message: &str) -> RequestResult {
        RequestResult::ok(
            200,
            Some(json!({
                "uuid": "cca3d070-58c6-11ea-8c0c-005056826c14",
                "description": "POST /api/cluster/metrocluster",
                "state": state,
                "message": message,
                "code": 2432836,
                "start_time": "2020-02-26T10:35:44-08:00",
                "end_time": "2020-02-26T10:47:38-08:00",
            })),
        )
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn spec() -> MetroClusterSpec {
        MetroClusterSpec {
            partner_cluster_name: "cluster1".to_string(),
            dr_pairs: vec![DrPair::new("carchi_vsim1", "carchi_vsim3")],
        }
    }

    fn reconciler() -> MetroClusterReconciler {
        MetroClusterReconciler::new(
            spec(),
            JobPoller::new(JobPollConfig {
                interval: Duration::ZERO,
                max_attempts: 5,
                max_consecutive_errors: 3,
            }),
        )
    }

    async fn connect(responses: Vec<RequestResult>) -> (Backend, ScriptedTransport) {
        let transport = ScriptedTransport::new(responses);
        let api = OntapRestApi::new(transport.clone(), UseRest::Auto);
        let backend = Backend::connect(api, "test_host").await.unwrap();
        (backend, transport)
    }

    fn posts(transport: &ScriptedTransport) -> usize {
        transport
            .requests()
            .iter()
            .filter(|r| r.method == HttpMethod::Post)
            .count()
    }

    // -------------------------------------------------------------------------
    // Create path
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_rest_successful_create() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            metrocluster_with_no_results(),
            metrocluster_post(),
            job("success", "Complete"),
        ])
        .await;

        let outcome = reconciler().reconcile(&mut backend).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.extra["action"], "create");
        assert_eq!(outcome.extra["job"], JOB_UUID);

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[1].path, METROCLUSTER_API);
        assert_eq!(
            requests[1].query,
            vec![("fields".to_string(), "*".to_string())]
        );
        assert_eq!(
            requests[2].body,
            Some(json!({
                "partner_cluster": {"name": "cluster1"},
                "dr_pairs": [{"node": {"name": "carchi_vsim1"}, "partner": {"name": "carchi_vsim3"}}]
            }))
        );
        assert_eq!(requests[3].path, format!("cluster/jobs/{JOB_UUID}"));
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_create_job_failure_surfaces_message() {
        let (mut backend, _) = connect(vec![
            is_rest(),
            metrocluster_with_no_results(),
            metrocluster_post(),
            job("failure", "There are not enough disks in Pool1."),
        ])
        .await;

        let err = reconciler().reconcile(&mut backend).await.unwrap_err();
        assert!(matches!(err, Error::JobFailed(_)));
        assert_eq!(err.to_string(), "There are not enough disks in Pool1.");
    }

    #[tokio::test]
    async fn test_synchronous_create_without_job() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            metrocluster_with_no_results(),
            RequestResult::ok(201, None),
        ])
        .await;

        let outcome = reconciler().reconcile(&mut backend).await.unwrap();
        assert!(outcome.changed);
        assert!(!outcome.extra.contains_key("job"));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_not_found_means_create() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            RequestResult::failed(Some(404), "entry doesn't exist"),
            metrocluster_post(),
            job("success", "Complete"),
        ])
        .await;

        assert!(reconciler().reconcile(&mut backend).await.unwrap().changed);
        assert_eq!(posts(&transport), 1);
    }

    #[tokio::test]
    async fn test_not_configured_state_means_create() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            RequestResult::ok(
                200,
                Some(json!({"local": {"configuration_state": "not_configured"}})),
            ),
            metrocluster_post(),
            job("success", "Complete"),
        ])
        .await;

        assert!(reconciler().reconcile(&mut backend).await.unwrap().changed);
        assert_eq!(posts(&transport), 1);
    }

    #[tokio::test]
    async fn test_create_error_is_fatal() {
        let (mut backend, _) = connect(vec![
            is_rest(),
            metrocluster_with_no_results(),
            generic_error(),
        ])
        .await;

        let err = reconciler().reconcile(&mut backend).await.unwrap_err();
        assert_eq!(err.to_string(), "Expected error");
        assert_eq!(backend.diagnostics().errors(), ["Expected error".to_string()]);
    }

    // -------------------------------------------------------------------------
    // Idempotency
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_rest_create_idempotency() {
        let (mut backend, transport) =
            connect(vec![is_rest(), metrocluster_with_results()]).await;

        let outcome = reconciler().reconcile(&mut backend).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.extra["action"], "none");
        assert_eq!(outcome.extra["configuration_state"], "configuration_error");
        assert_eq!(posts(&transport), 0);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_partner_mismatch_reissues_create() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            RequestResult::ok(
                200,
                Some(json!({
                    "local": {"configuration_state": "configured"},
                    "remote": {"cluster": {"name": "other_cluster"}}
                })),
            ),
            metrocluster_post(),
            job("success", "Complete"),
        ])
        .await;

        let outcome = reconciler().reconcile(&mut backend).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.extra["action"], "modify");
        assert_eq!(posts(&transport), 1);
    }

    // -------------------------------------------------------------------------
    // Check mode, dialect and fetch failures
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_check_mode_reports_change_without_create() {
        let (mut backend, transport) =
            connect(vec![is_rest(), metrocluster_with_no_results()]).await;

        let outcome = reconciler()
            .with_check_mode(true)
            .reconcile(&mut backend)
            .await
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(posts(&transport), 0);
    }

    #[tokio::test]
    async fn test_legacy_dialect_is_refused() {
        let (mut backend, transport) = connect(vec![is_legacy()]).await;
        assert_eq!(backend.dialect(), ApiDialect::Legacy);

        let err = reconciler().reconcile(&mut backend).await.unwrap_err();
        assert!(matches!(err, Error::RestRequired(_)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_is_fatal() {
        let (mut backend, transport) = connect(vec![is_rest(), generic_error()]).await;

        let err = reconciler().reconcile(&mut backend).await.unwrap_err();
        assert_eq!(err.to_string(), "Expected error");
        assert_eq!(posts(&transport), 0);
    }

    #[tokio::test]
    async fn test_unexpected_extra_call_hits_sentinel() {
        // POST answers, but the job status call finds the script exhausted
        let (mut backend, _) = connect(vec![
            is_rest(),
            metrocluster_with_no_results(),
            metrocluster_post(),
        ])
        .await;

        let err = reconciler().reconcile(&mut backend).await.unwrap_err();
        assert_eq!(err.to_string(), END_OF_SEQUENCE_MESSAGE);
    }

    #[tokio::test]
    async fn test_invalid_spec_issues_no_requests() {
        let (mut backend, transport) = connect(vec![is_rest()]).await;
        let reconciler = MetroClusterReconciler::new(
            MetroClusterSpec {
                partner_cluster_name: "cluster1".to_string(),
                dr_pairs: vec![],
            },
            JobPoller::default(),
        );

        let err = reconciler.reconcile(&mut backend).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempt_poller_is_rejected_before_create() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            metrocluster_with_no_results(),
            metrocluster_post(),
            job("success", "Complete"),
        ])
        .await;
        let reconciler = MetroClusterReconciler::new(
            spec(),
            JobPoller::new(JobPollConfig {
                interval: Duration::ZERO,
                max_attempts: 0,
                max_consecutive_errors: 3,
            }),
        );

        let err = reconciler.reconcile(&mut backend).await.unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert_eq!(posts(&transport), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_dr_pairs_are_rejected() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            RequestResult::ok(
                200,
                Some(json!({
                    "local": {"configuration_state": "configured"},
                    "remote": {"cluster": {"name": "cluster1"}},
                    "dr_pairs": [{"node": {"name": "n1"}, "partner": {"name": "n3"}}]
                })),
            ),
        ])
        .await;
        let reconciler = MetroClusterReconciler::new(
            MetroClusterSpec {
                partner_cluster_name: "cluster1".to_string(),
                dr_pairs: vec![DrPair::new("n1", "n3"), DrPair::new("n1", "n3")],
            },
            JobPoller::default(),
        );

        let err = reconciler.reconcile(&mut backend).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert!(err.to_string().contains("n1:n3"));
        assert_eq!(posts(&transport), 0);
    }

    #[tokio::test]
    async fn test_malformed_reported_pair_is_unexpected_response() {
        let (mut backend, transport) = connect(vec![
            is_rest(),
            RequestResult::ok(
                200,
                Some(json!({
                    "local": {"configuration_state": "configured"},
                    "dr_pairs": [
                        {"node": {"name": "carchi_vsim1"}, "partner": {"name": "carchi_vsim3"}},
                        {"node": {"name": 7}}
                    ]
                })),
            ),
        ])
        .await;

        let err = reconciler().reconcile(&mut backend).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
        assert_eq!(posts(&transport), 0);
    }

    // -------------------------------------------------------------------------
    // Compare step
    // -------------------------------------------------------------------------

    fn observed(payload: Value) -> Option<ObservedMetroCluster> {
        ObservedMetroCluster::from_payload(&payload).unwrap()
    }

    #[test]
    fn test_observed_parses_reachability_strings_and_bools() {
        let current = observed(json!({"local": {"partner_cluster_reachable": "true"}})).unwrap();
        assert_eq!(current.partner_cluster_reachable, Some(true));

        let current = observed(json!({"local": {"partner_cluster_reachable": false}})).unwrap();
        assert_eq!(current.partner_cluster_reachable, Some(false));
    }

    #[test]
    fn test_observed_absent_for_empty_document() {
        assert!(observed(json!({})).is_none());
        assert!(observed(json!({"local": {"configuration_state": "not_configured"}})).is_none());
    }

    #[test]
    fn test_dr_pairs_compare_ignores_order() {
        let desired = MetroClusterSpec {
            partner_cluster_name: "cluster2".to_string(),
            dr_pairs: vec![DrPair::new("a1", "b1"), DrPair::new("a2", "b2")],
        };
        let current = observed(json!({
            "local": {"configuration_state": "configured"},
            "remote": {"cluster": {"name": "cluster2"}},
            "dr_pairs": [
                {"node": {"name": "a2"}, "partner": {"name": "b2"}},
                {"node": {"name": "a1"}, "partner": {"name": "b1"}}
            ]
        }))
        .unwrap();

        assert_eq!(
            ReconcileAction::plan(Some(&current), &desired),
            ReconcileAction::NoChange
        );
    }

    #[test]
    fn test_dr_pairs_mismatch_is_reported() {
        let desired = spec();
        let current = observed(json!({
            "local": {"configuration_state": "configured"},
            "dr_pairs": [{"node": {"name": "carchi_vsim1"}, "partner": {"name": "carchi_vsim4"}}]
        }))
        .unwrap();

        match ReconcileAction::plan(Some(&current), &desired) {
            ReconcileAction::Modify(diffs) => {
                assert_eq!(diffs.len(), 1);
                assert!(diffs[0].starts_with("dr_pairs"));
            }
            other => panic!("expected modify, got {other:?}"),
        }
        assert_eq!(ReconcileAction::plan(None, &desired), ReconcileAction::Create);
    }
}
