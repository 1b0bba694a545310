mod helpers;

use ferrous_replay_application::use_cases::PlayScenarioUseCase;
use ferrous_replay_domain::config::PlayerConfig;
use ferrous_replay_domain::{
    Assertion, Entry, Range, Scenario, ScenarioError, Step, StepType, SutEndpoint, Transport,
};
use helpers::{answer_a, check_step, mock_ports, query_step, MockSutTransport};
use hickory_proto::op::Query;
use hickory_proto::rr::{Name, RecordType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn endpoints() -> Vec<SutEndpoint> {
    vec!["127.0.0.1:5353".parse().unwrap()]
}

fn player_config() -> PlayerConfig {
    PlayerConfig {
        query_timeout_ms: 200,
        ..Default::default()
    }
}

fn scenario(steps: Vec<Step>) -> Scenario {
    Scenario::new("test", "test.rpl", vec![], vec![], steps)
}

fn make_use_case(transport: MockSutTransport) -> (PlayScenarioUseCase, Arc<MockSutTransport>) {
    let (transport, clock, flooder) = mock_ports(transport);
    let use_case = PlayScenarioUseCase::new(transport.clone(), clock, flooder, player_config());
    (use_case, transport)
}

// ── QUERY / CHECK_ANSWER ───────────────────────────────────────────────────

#[tokio::test]
async fn test_query_then_check_answer_passes() {
    let (use_case, transport) = make_use_case(MockSutTransport::answering_a("192.0.2.1"));
    let scenario = scenario(vec![
        query_step(0, "example.", 10),
        check_step(1, "example.", "192.0.2.1", 20),
    ]);

    let report = use_case.execute(&scenario, &endpoints()).await.unwrap();

    assert_eq!(report.steps_executed, 2);
    assert_eq!(report.retries, 0);
    assert_eq!(transport.request_count(), 1);
    let request = &transport.requests()[0];
    assert_eq!(request.destination, endpoints()[0].address);
    assert_eq!(request.transport, Transport::Udp);
    assert_eq!(request.timeout, Duration::from_millis(200));
    assert_eq!(scenario.current_step_id(), 1);
}

#[tokio::test]
async fn test_mismatch_names_file_step_and_criterion() {
    let (use_case, _) = make_use_case(MockSutTransport::answering_a("192.0.2.99"));
    let scenario = scenario(vec![
        query_step(0, "example.", 10),
        check_step(1, "example.", "192.0.2.1", 20),
    ]);

    let err = use_case.execute(&scenario, &endpoints()).await.unwrap_err();

    match &err {
        ScenarioError::StepFailed { file, step, .. } => {
            assert_eq!(file, "test.rpl");
            assert_eq!(*step, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.criterion(), Some("answer"));
}

#[tokio::test]
async fn test_query_timeout_fails_step() {
    let (use_case, _) = make_use_case(MockSutTransport::silent());
    let scenario = scenario(vec![query_step(0, "example.", 10)]);

    let err = use_case.execute(&scenario, &endpoints()).await.unwrap_err();

    let ScenarioError::StepFailed { source, .. } = err else {
        panic!("expected step failure");
    };
    assert!(matches!(*source, ScenarioError::Timeout(_)));
}

#[tokio::test]
async fn test_tcp_and_source_arguments_reach_transport() {
    let (use_case, transport) = make_use_case(MockSutTransport::answering_a("192.0.2.1"));
    let mut step = query_step(0, "example.", 10);
    step.args = vec!["TCP".to_string(), "SOURCE=127.0.0.7".to_string()];

    use_case
        .execute(&scenario(vec![step]), &endpoints())
        .await
        .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.transport, Transport::Tcp);
    assert_eq!(request.source, Some("127.0.0.7".parse().unwrap()));
}

// ── retry / branch ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repeat_next_retries_then_passes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let transport = MockSutTransport::new(move |query| {
        let addr = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            "192.0.2.99"
        } else {
            "192.0.2.1"
        };
        Some(answer_a(query, addr))
    });
    let (use_case, transport) = make_use_case(transport);

    let mut check = check_step(6, "example.", "192.0.2.1", 20);
    check.repeat_count = 2;
    check.pause = Duration::from_millis(100);
    check.next_on_failure = Some(5);
    let scenario = scenario(vec![query_step(5, "example.", 10), check]);

    let started = Instant::now();
    let report = use_case.execute(&scenario, &endpoints()).await.unwrap();

    assert_eq!(transport.request_count(), 2);
    assert_eq!(report.retries, 1);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_repeat_exhausted_fails_after_two_retries() {
    let (use_case, transport) = make_use_case(MockSutTransport::answering_a("192.0.2.99"));

    let mut check = check_step(6, "example.", "192.0.2.1", 20);
    check.repeat_count = 2;
    check.pause = Duration::from_millis(100);
    check.next_on_failure = Some(5);
    let scenario = scenario(vec![query_step(5, "example.", 10), check]);

    let started = Instant::now();
    let err = use_case.execute(&scenario, &endpoints()).await.unwrap_err();

    assert!(matches!(err, ScenarioError::StepFailed { step: 6, .. }));
    assert_eq!(transport.request_count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_repeat_without_next_retries_same_step() {
    let (use_case, transport) = make_use_case(MockSutTransport::silent());
    transport.push_scripted(None);
    let mut step = query_step(0, "example.", 10);
    step.repeat_count = 1;

    let err = use_case
        .execute(&scenario(vec![step]), &endpoints())
        .await
        .unwrap_err();

    assert!(matches!(err, ScenarioError::StepFailed { step: 0, .. }));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn test_unknown_next_target() {
    let (use_case, _) = make_use_case(MockSutTransport::answering_a("192.0.2.99"));
    let mut check = check_step(1, "example.", "192.0.2.1", 20);
    check.repeat_count = 1;
    check.next_on_failure = Some(42);
    let scenario = scenario(vec![query_step(0, "example.", 10), check]);

    let err = use_case.execute(&scenario, &endpoints()).await.unwrap_err();

    assert!(matches!(
        &err,
        ScenarioError::BranchTargetNotFound { step: 1, target: 42, .. }
    ));
    assert!(err.to_string().starts_with(&scenario.file));
}

// ── mandatory entries ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_unfired_mandatory_entry_fails_at_teardown() {
    let (use_case, _) = make_use_case(MockSutTransport::answering_a("192.0.2.1"));
    let mut range = Range::new(0, 100, 3);
    let mut entry = Entry::new(4);
    entry.mandatory = true;
    range.entries.push(entry);
    let scenario = Scenario::new(
        "test",
        "test.rpl",
        vec![],
        vec![range],
        vec![query_step(0, "other.", 10)],
    );

    let err = use_case.execute(&scenario, &endpoints()).await.unwrap_err();

    assert!(matches!(
        err,
        ScenarioError::MandatoryUnfired { line: 4, .. }
    ));
}

// ── other step types ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_time_passes_advances_clock() {
    let (transport, clock, flooder) = mock_ports(MockSutTransport::silent());
    let use_case = PlayScenarioUseCase::new(transport, clock.clone(), flooder, player_config());
    let step = Step::new(
        0,
        StepType::TimePasses,
        vec!["ELAPSE".to_string(), "3600".to_string()],
        1,
    );

    use_case
        .execute(&scenario(vec![step]), &endpoints())
        .await
        .unwrap();

    assert_eq!(clock.advances(), vec![3600.0]);
}

#[tokio::test]
async fn test_time_passes_requires_seconds() {
    let (use_case, _) = make_use_case(MockSutTransport::silent());
    let step = Step::new(0, StepType::TimePasses, vec!["ELAPSE".to_string()], 1);

    let result = use_case.execute(&scenario(vec![step]), &endpoints()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_replay_scales_and_never_fails() {
    let (transport, clock, flooder) = mock_ports(MockSutTransport::silent());
    flooder.set_should_fail(true);
    let config = PlayerConfig {
        replay_multiplier: 3,
        replay_window: 4,
        ..player_config()
    };
    let use_case = PlayScenarioUseCase::new(transport, clock, flooder.clone(), config);
    let mut step = Step::new(0, StepType::Replay, vec![], 1);
    step.queries = vec![
        Query::query(Name::from_ascii("a.example.").unwrap(), RecordType::A),
        Query::query(Name::from_ascii("b.example.").unwrap(), RecordType::AAAA),
    ];

    use_case
        .execute(&scenario(vec![step]), &endpoints())
        .await
        .unwrap();

    let requests = flooder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].count, 6);
    assert_eq!(requests[0].queries.len(), 2);
    assert_eq!(requests[0].window, 4);
}

#[tokio::test]
async fn test_assert_step_reads_scenario_state() {
    let (use_case, _) = make_use_case(MockSutTransport::silent());
    let tokens = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
    let mut passing = Step::new(7, StepType::Assert, vec![], 1);
    passing.assertion = Some(Assertion::parse_tokens(&tokens("step == 7")).unwrap());
    let mut failing = Step::new(8, StepType::Assert, vec![], 2);
    failing.assertion = Some(Assertion::parse_tokens(&tokens("range[0].sent == 0")).unwrap());

    assert!(use_case
        .execute(&scenario(vec![passing]), &endpoints())
        .await
        .is_ok());
    let err = use_case
        .execute(&scenario(vec![failing]), &endpoints())
        .await
        .unwrap_err();
    assert!(matches!(err, ScenarioError::StepFailed { step: 8, .. }));
}

#[tokio::test]
async fn test_passive_steps_are_no_ops() {
    let (use_case, transport) = make_use_case(MockSutTransport::silent());
    let steps = vec![
        Step::new(0, StepType::Log, vec!["hello".to_string()], 1),
        Step::new(1, StepType::CheckOutQuery, vec![], 2),
        Step::new(2, StepType::Mock, vec![], 3),
        Step::new(3, StepType::Reply, vec![], 4),
    ];

    let report = use_case
        .execute(&scenario(steps), &endpoints())
        .await
        .unwrap();

    assert_eq!(report.steps_executed, 4);
    assert_eq!(transport.request_count(), 0);
}
