//! Message transport against fake engines.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use pkll::{Envelope, MessageCode};
use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::fixture::{fixture, start, wait_for_exit, ECHO, EXITS, SILENT};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct EvaluateRequest {
    request_id: u64,
    evaluator_id: i64,
    module_uri: String,
    expr: Option<String>,
}

#[test]
fn test_round_trip_typed_request() {
    let mut fx = fixture(ECHO);
    start(&mut fx.server);

    let request = EvaluateRequest {
        request_id: fx.server.next_request_id(),
        evaluator_id: -135,
        module_uri: "file:///tmp/config.pkl".into(),
        expr: None,
    };
    let envelope = Envelope::new(MessageCode::Evaluate, &request).unwrap();

    let replies: Vec<Envelope> = fx
        .server
        .send_and_receive(&envelope)
        .unwrap()
        .envelopes()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, MessageCode::Evaluate);
    assert_eq!(replies[0].field("moduleUri"), Some(&Value::from("file:///tmp/config.pkl")));
    assert_eq!(replies[0].field("expr"), Some(&Value::Nil));
    assert_eq!(replies[0].body_as::<EvaluateRequest>().unwrap(), request);
}

#[test]
fn test_multiple_messages_in_one_read() {
    let mut fx = fixture(ECHO);
    start(&mut fx.server);

    let log_message = |message: &str| {
        Envelope::new(MessageCode::EvaluateLog, &BTreeMap::from([("message", message)])).unwrap()
    };
    let first = log_message("one");
    let second = log_message("two");
    fx.server.send(&first).unwrap();
    fx.server.send(&second).unwrap();
    // Let cat echo both before draining.
    std::thread::sleep(Duration::from_millis(200));

    let replies: Vec<Envelope> = fx
        .server
        .receive(None, false)
        .unwrap()
        .envelopes()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(replies, vec![first, second]);
}

#[test]
fn test_receive_timeout_with_empty_break() {
    let mut fx = fixture(SILENT);
    start(&mut fx.server);

    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    let messages = fx.server.receive(Some(timeout), true).unwrap();
    let elapsed = started.elapsed();

    assert!(messages.is_empty());
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "blocked for {:?}", elapsed);
    assert!(fx.server.is_running());
}

#[test]
fn test_receive_returns_when_engine_exits() {
    let mut fx = fixture(EXITS);
    start(&mut fx.server);

    let started = Instant::now();
    let messages = fx.server.receive(Some(Duration::from_millis(50)), false).unwrap();
    assert!(messages.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(wait_for_exit(&fx.server));
}

#[test]
fn test_stderr_goes_to_diagnostics() {
    let mut fx = fixture("echo 'engine warming up' >&2\nexec cat");
    start(&mut fx.server);

    let replies: Vec<String> = fx
        .server
        .send_and_receive("ping")
        .unwrap()
        .deserialize()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(replies, vec!["ping".to_string()]);
    assert!(fx.stderr_text().contains("engine warming up"));
}

#[test]
fn test_retry_returns_delayed_response() {
    let mut fx = fixture("sleep 0.3\nexec cat");
    start(&mut fx.server);

    fx.server.send("late").unwrap();
    let replies: Vec<String> = fx
        .server
        .receive_with_retry(20)
        .unwrap()
        .deserialize()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(replies, vec!["late".to_string()]);
}

#[test]
fn test_retry_budget_exhausted_returns_empty() {
    let mut fx = fixture(SILENT);
    start(&mut fx.server);

    let started = Instant::now();
    let messages = fx.server.receive_with_retry(3).unwrap();
    assert!(messages.is_empty());
    // 4 attempts of 100ms each.
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(fx.server.is_running());
}

#[test]
fn test_retry_stops_when_engine_exits() {
    let mut fx = fixture(EXITS);
    start(&mut fx.server);

    let started = Instant::now();
    let messages = fx.server.receive_with_retry(50).unwrap();
    assert!(messages.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}
