//! Supervisor behaviour against the mock process table

use super::*;
use crate::credentials::load_api_key_from;
use crate::process::mock::{MockInstruction, MockProcessControl};
use std::fs;
use tempfile::{tempdir, TempDir};

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        startup_wait_ms: 60,
        poll_interval_ms: 10,
        graceful_timeout_ms: 30,
        ..SupervisorConfig::default()
    }
}

fn harness() -> (Supervisor, MockProcessControl, TempDir) {
    let dir = tempdir().expect("tempdir");
    let mock = MockProcessControl::new();
    let supervisor = Supervisor::new(
        fast_config(),
        RecordStore::new(dir.path()),
        Arc::new(mock.clone()),
    );
    (supervisor, mock, dir)
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

#[tokio::test]
async fn start_records_pid_and_second_start_is_a_no_op() {
    let (sup, mock, _dir) = harness();

    let first = sup.start(9999).await.expect("start");
    let pid = match first {
        StartOutcome::Started { pid, .. } => pid,
        other => panic!("expected Started, got {:?}", other),
    };

    let path = sup.records().path_for(9999);
    assert!(path.ends_with("context7-mcp-9999.pid"));
    assert_eq!(fs::read_to_string(&path).unwrap(), pid.to_string());

    let second = sup.start(9999).await.expect("second start");
    assert_eq!(second, StartOutcome::AlreadyRunning { pid });
    assert_eq!(mock.spawned().len(), 1, "no duplicate helper");
    assert_eq!(fs::read_to_string(&path).unwrap(), pid.to_string());
}

#[tokio::test]
async fn start_passes_port_to_helper() {
    let (sup, mock, _dir) = harness();
    sup.start(9123).await.expect("start");

    let spawned = mock.spawned();
    assert_eq!(spawned[0].program, "npx");
    assert!(spawned[0]
        .args
        .windows(2)
        .any(|w| w[0] == "--port" && w[1] == "9123"));
    assert!(spawned[0].env.is_empty());
}

#[tokio::test]
async fn start_reports_listening_helper() {
    let (sup, _mock, _dir) = harness();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let outcome = sup.start(port).await.expect("start");
    assert!(matches!(
        outcome,
        StartOutcome::Started {
            readiness: Readiness::Listening,
            ..
        }
    ));
}

#[tokio::test]
async fn start_without_listener_waits_out_the_window() {
    let (sup, _mock, _dir) = harness();
    let port = free_port();

    let begin = std::time::Instant::now();
    let outcome = sup.start(port).await.expect("start");
    assert!(matches!(
        outcome,
        StartOutcome::Started {
            readiness: Readiness::Alive,
            ..
        }
    ));
    assert!(begin.elapsed() >= std::time::Duration::from_millis(60));
}

#[tokio::test]
async fn start_failure_leaves_no_record() {
    let (sup, mock, _dir) = harness();
    mock.add_instruction(MockInstruction::crashes());

    let err = sup.start(9999).await.unwrap_err();
    assert!(matches!(err, CoreError::StartFailed { port: 9999, .. }));
    assert!(!sup.records().path_for(9999).exists());

    // a retry after the failure starts cleanly
    let outcome = sup.start(9999).await.expect("retry");
    assert!(matches!(outcome, StartOutcome::Started { .. }));
}

#[tokio::test]
async fn spawn_failure_leaves_no_record() {
    let (sup, mock, _dir) = harness();
    mock.add_instruction(MockInstruction::unspawnable());

    let err = sup.start(8809).await.unwrap_err();
    assert!(matches!(err, CoreError::ProcessSpawn(_)));
    assert!(!sup.records().path_for(8809).exists());
}

#[tokio::test]
async fn start_replaces_stale_record() {
    let (sup, mock, _dir) = harness();
    sup.records()
        .save(SupervisedProcess { port: 8809, pid: 77 })
        .unwrap();

    let outcome = sup.start(8809).await.expect("start");
    let StartOutcome::Started { pid, .. } = outcome else {
        panic!("expected Started, got {:?}", outcome);
    };
    assert_ne!(pid, 77);
    assert_eq!(mock.spawned().len(), 1);
    assert_eq!(
        sup.records().load(8809).unwrap(),
        RecordState::Present(SupervisedProcess { port: 8809, pid })
    );
}

#[tokio::test]
async fn stop_terminates_recorded_helper_and_removes_record() {
    let (sup, mock, _dir) = harness();
    let StartOutcome::Started { pid, .. } = sup.start(8809).await.unwrap() else {
        panic!("expected Started");
    };

    let outcome = sup.stop(8809).await.expect("stop");
    assert_eq!(outcome, StopOutcome::Stopped { pid, forced: false });
    assert!(!mock.alive(pid));
    assert_eq!(mock.terminations(), vec![(pid, false)]);
    assert!(!sup.records().path_for(8809).exists());
}

#[tokio::test]
async fn stop_escalates_when_graceful_request_is_ignored() {
    let (sup, mock, _dir) = harness();
    mock.add_instruction(MockInstruction::stubborn());
    let StartOutcome::Started { pid, .. } = sup.start(8809).await.unwrap() else {
        panic!("expected Started");
    };

    let outcome = sup.stop(8809).await.expect("stop");
    assert_eq!(outcome, StopOutcome::Stopped { pid, forced: true });
    assert_eq!(mock.terminations(), vec![(pid, false), (pid, true)]);
    assert!(!mock.alive(pid));
}

#[tokio::test]
async fn stop_with_stale_record_reports_and_removes() {
    let (sup, mock, _dir) = harness();
    sup.records()
        .save(SupervisedProcess { port: 8809, pid: 31337 })
        .unwrap();

    let outcome = sup.stop(8809).await.expect("stop");
    assert_eq!(outcome, StopOutcome::StaleRecord { pid: Some(31337) });
    assert!(mock.terminations().is_empty());
    assert!(!sup.records().path_for(8809).exists());
}

#[tokio::test]
async fn stop_with_corrupt_record_removes_it() {
    let (sup, _mock, _dir) = harness();
    fs::write(sup.records().path_for(8809), "garbage").unwrap();

    let outcome = sup.stop(8809).await.expect("stop");
    assert_eq!(outcome, StopOutcome::StaleRecord { pid: None });
    assert!(!sup.records().path_for(8809).exists());
}

#[tokio::test]
async fn stop_removes_record_holding_binary_bytes() {
    let (sup, mock, _dir) = harness();
    fs::write(sup.records().path_for(8809), [0xff, 0xfe, 0x00, 0x31]).unwrap();

    let outcome = sup.stop(8809).await.expect("stop");
    assert_eq!(outcome, StopOutcome::StaleRecord { pid: None });
    assert!(!sup.records().path_for(8809).exists());
    assert!(mock.terminations().is_empty());

    // the port is usable again afterwards
    assert!(matches!(
        sup.start(8809).await.unwrap(),
        StartOutcome::Started { .. }
    ));
}

#[tokio::test]
async fn stop_without_record_or_process_is_not_running() {
    let (sup, mock, _dir) = harness();
    mock.insert_process(600, "node context7-mcp --port 9000");

    assert_eq!(sup.stop(8809).await.unwrap(), StopOutcome::NotRunning);
    assert!(mock.terminations().is_empty());
}

#[tokio::test]
async fn stop_twice_is_idempotent() {
    let (sup, _mock, _dir) = harness();
    sup.start(8809).await.unwrap();

    assert!(matches!(
        sup.stop(8809).await.unwrap(),
        StopOutcome::Stopped { .. }
    ));
    assert_eq!(sup.stop(8809).await.unwrap(), StopOutcome::NotRunning);
    assert_eq!(sup.stop(8809).await.unwrap(), StopOutcome::NotRunning);
    assert!(!sup.records().path_for(8809).exists());
}

#[tokio::test]
async fn stop_without_record_falls_back_to_process_search() {
    let (sup, mock, _dir) = harness();
    mock.insert_process(700, "node /opt/context7-mcp/dist/index.js --port 8809");
    mock.insert_stubborn_process(701, "npx -y @upstash/context7-mcp --port=8809");
    mock.insert_process(702, "npx -y @upstash/context7-mcp --port 8810");

    let outcome = sup.stop(8809).await.expect("stop");
    assert_eq!(
        outcome,
        StopOutcome::StoppedByPattern {
            pids: vec![700, 701]
        }
    );
    assert!(!mock.alive(700));
    assert!(!mock.alive(701));
    assert!(mock.alive(702));
    assert!(mock.terminations().contains(&(701, true)));
}

#[tokio::test]
async fn status_reports_and_discards_stale_records() {
    let (sup, _mock, _dir) = harness();
    assert_eq!(sup.status(8809).await.unwrap(), HelperStatus::NotRunning);

    let StartOutcome::Started { pid, .. } = sup.start(8809).await.unwrap() else {
        panic!("expected Started");
    };
    assert_eq!(sup.status(8809).await.unwrap(), HelperStatus::Running { pid });

    sup.records()
        .save(SupervisedProcess { port: 9000, pid: 4 })
        .unwrap();
    assert_eq!(
        sup.status(9000).await.unwrap(),
        HelperStatus::StaleRecord { pid: Some(4) }
    );
    assert!(!sup.records().path_for(9000).exists());
}

#[tokio::test]
async fn port_zero_is_rejected() {
    let (sup, mock, _dir) = harness();
    assert!(matches!(
        sup.start(0).await,
        Err(CoreError::ValidationError(_))
    ));
    assert!(matches!(sup.stop(0).await, Err(CoreError::ValidationError(_))));
    assert!(mock.spawned().is_empty());
}

#[tokio::test]
async fn api_key_is_passed_through_environment_only() {
    let (sup, mock, _dir) = harness();
    let sup = sup.with_api_key(load_api_key_from(Some("ctx7sk-abcdef0123456789"), None, None));

    sup.start(8809).await.unwrap();
    let spawned = &mock.spawned()[0];
    assert_eq!(
        spawned.env,
        vec![(
            "CONTEXT7_API_KEY".to_string(),
            "ctx7sk-abcdef0123456789".to_string()
        )]
    );
    assert!(!spawned.display_line().contains("ctx7sk"));
    assert!(!format!("{:?}", sup).contains("abcdef0123456789"));
}
