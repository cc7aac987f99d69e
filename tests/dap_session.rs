//! End-to-end scenarios driving the compiled `yadap` binary over real
//! stdio pipes: spawn the process, speak the real framed protocol at it,
//! assert on its responses and events. Reuses the crate's own
//! transport/json types rather than a third-party JSON crate on the test
//! side.

use std::io::{BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use yadap::json::JsonValue;
use yadap::transport::FramedTransport;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

struct TestClient {
    child: Child,
    transport: FramedTransport<BufReader<ChildStdout>, ChildStdin>,
    next_seq: i64,
}

impl TestClient {
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_yadap"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("spawn yadap");
        let stdin = child.stdin.take().unwrap();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        TestClient {
            child,
            transport: FramedTransport::new(stdout, stdin),
            next_seq: 1,
        }
    }

    fn send(&mut self, command: &str, arguments: JsonValue) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut request = JsonValue::object();
        request.insert("seq", JsonValue::Number(seq as f64));
        request.insert("type", JsonValue::from("request"));
        request.insert("command", JsonValue::from(command));
        request.insert("arguments", arguments);
        self.transport.write_message(&request).expect("write request");
        seq
    }

    fn recv(&mut self) -> JsonValue {
        let deadline = Instant::now() + REQUEST_TIMEOUT;
        loop {
            if Instant::now() > deadline {
                panic!("timed out waiting for a message from yadap");
            }
            match self.transport.read_message() {
                Ok(Some(msg)) => return msg,
                Ok(None) => panic!("yadap closed stdout unexpectedly"),
                Err(e) => panic!("reading from yadap failed: {e}"),
            }
        }
    }

    /// Reads messages until a response to `seq` is found, buffering any
    /// events encountered along the way.
    fn response_to(&mut self, seq: i64, events: &mut Vec<JsonValue>) -> JsonValue {
        loop {
            let msg = self.recv();
            match msg.get("type").and_then(JsonValue::as_str) {
                Some("response") if msg.get("request_seq").and_then(JsonValue::as_i64) == Some(seq) => {
                    return msg;
                }
                Some("event") => events.push(msg),
                _ => {}
            }
        }
    }

    fn event_named(&mut self, name: &str, events: &mut Vec<JsonValue>) -> JsonValue {
        if let Some(pos) = events
            .iter()
            .position(|e| e.get("event").and_then(JsonValue::as_str) == Some(name))
        {
            return events.remove(pos);
        }
        loop {
            let msg = self.recv();
            if msg.get("type").and_then(JsonValue::as_str) == Some("event") {
                if msg.get("event").and_then(JsonValue::as_str) == Some(name) {
                    return msg;
                }
                events.push(msg);
            }
        }
    }
}

impl Drop for TestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_fixture(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("target.lua");
    std::fs::write(&path, contents).expect("write fixture script");
    path
}

#[test]
fn handshake_then_configuration_done() {
    let mut client = TestClient::spawn();
    let mut events = Vec::new();

    let seq = client.send("initialize", JsonValue::object());
    let response = client.response_to(seq, &mut events);
    assert_eq!(response.get("success"), Some(&JsonValue::Bool(true)));
    client.event_named("initialized", &mut events);

    let seq = client.send("configurationDone", JsonValue::object());
    let response = client.response_to(seq, &mut events);
    assert_eq!(response.get("success"), Some(&JsonValue::Bool(true)));
}

#[test]
fn set_breakpoints_reports_new_then_duplicate() {
    let mut client = TestClient::spawn();
    let mut events = Vec::new();
    client.send("initialize", JsonValue::object());
    client.event_named("initialized", &mut events);

    let mut source = JsonValue::object();
    source.insert("path", JsonValue::from("/tmp/target.lua"));
    let mut bp_line = JsonValue::object();
    bp_line.insert("line", JsonValue::Number(3.0));
    let mut args = JsonValue::object();
    args.insert("source", source.clone());
    args.insert("breakpoints", JsonValue::Array(vec![bp_line.clone()]));

    let seq = client.send("setBreakpoints", args.clone());
    let first = client.response_to(seq, &mut events);
    let first_bps = first
        .get("body")
        .and_then(|b| b.get("breakpoints"))
        .and_then(JsonValue::as_array)
        .unwrap();
    assert_eq!(first_bps.len(), 1);
    assert_eq!(first_bps[0].get("verified"), Some(&JsonValue::Bool(true)));
    let id = first_bps[0].get("id").and_then(JsonValue::as_i64).unwrap();

    let seq = client.send("setBreakpoints", args);
    let second = client.response_to(seq, &mut events);
    let second_bps = second
        .get("body")
        .and_then(|b| b.get("breakpoints"))
        .and_then(JsonValue::as_array)
        .unwrap();
    assert_eq!(second_bps[0].get("verified"), Some(&JsonValue::Bool(false)));
    assert_eq!(second_bps[0].get("id").and_then(JsonValue::as_i64), Some(id));
}

#[test]
fn launch_runs_to_completion_and_reports_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_fixture(&dir, "local x = 1\nlocal y = 2\nprint(x + y)\n");

    let mut client = TestClient::spawn();
    let mut events = Vec::new();
    client.send("initialize", JsonValue::object());
    client.event_named("initialized", &mut events);

    let seq = client.send("configurationDone", JsonValue::object());
    client.response_to(seq, &mut events);

    let mut launch_args = JsonValue::object();
    launch_args.insert("program", JsonValue::from(script.to_string_lossy().into_owned()));
    let seq = client.send("launch", launch_args);
    let response = client.response_to(seq, &mut events);
    assert_eq!(response.get("success"), Some(&JsonValue::Bool(true)));

    let output = client.event_named("output", &mut events);
    let text = output
        .get("body")
        .and_then(|b| b.get("output"))
        .and_then(JsonValue::as_str)
        .unwrap();
    assert!(text.contains('3'));

    let exited = client.event_named("exited", &mut events);
    assert_eq!(
        exited.get("body").and_then(|b| b.get("exitCode")),
        Some(&JsonValue::Number(0.0))
    );
}

#[test]
fn breakpoint_hit_allows_inspection_then_continue() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_fixture(
        &dir,
        "local total = 0\nfor i = 1, 3 do\n  total = total + i\nend\nprint(total)\n",
    );
    let script_path = script.to_string_lossy().into_owned();

    let mut client = TestClient::spawn();
    let mut events = Vec::new();
    client.send("initialize", JsonValue::object());
    client.event_named("initialized", &mut events);

    let mut source = JsonValue::object();
    source.insert("path", JsonValue::from(script_path.clone()));
    let mut bp_line = JsonValue::object();
    bp_line.insert("line", JsonValue::Number(3.0));
    let mut bp_args = JsonValue::object();
    bp_args.insert("source", source);
    bp_args.insert("breakpoints", JsonValue::Array(vec![bp_line]));
    let seq = client.send("setBreakpoints", bp_args);
    client.response_to(seq, &mut events);

    let seq = client.send("configurationDone", JsonValue::object());
    client.response_to(seq, &mut events);

    let mut launch_args = JsonValue::object();
    launch_args.insert("program", JsonValue::from(script_path));
    let seq = client.send("launch", launch_args);
    client.response_to(seq, &mut events);

    let stopped = client.event_named("stopped", &mut events);
    assert_eq!(
        stopped.get("body").and_then(|b| b.get("reason")),
        Some(&JsonValue::from("breakpoint"))
    );

    let seq = client.send("threads", JsonValue::object());
    let threads = client.response_to(seq, &mut events);
    let thread_id = threads
        .get("body")
        .and_then(|b| b.get("threads"))
        .and_then(JsonValue::as_array)
        .and_then(|arr| arr.first())
        .and_then(|t| t.get("id"))
        .and_then(JsonValue::as_i64)
        .unwrap();
    assert_eq!(thread_id, 1);

    let seq = client.send("stackTrace", JsonValue::object());
    let trace = client.response_to(seq, &mut events);
    let frames = trace
        .get("body")
        .and_then(|b| b.get("stackFrames"))
        .and_then(JsonValue::as_array)
        .unwrap();
    assert!(!frames.is_empty());
    let frame_id = frames[0].get("id").and_then(JsonValue::as_i64).unwrap();

    let mut scope_args = JsonValue::object();
    scope_args.insert("frameId", JsonValue::Number(frame_id as f64));
    let seq = client.send("scopes", scope_args);
    let scopes_response = client.response_to(seq, &mut events);
    let scopes = scopes_response
        .get("body")
        .and_then(|b| b.get("scopes"))
        .and_then(JsonValue::as_array)
        .unwrap();
    assert_eq!(scopes.len(), 1);
    let variables_ref = scopes[0]
        .get("variablesReference")
        .and_then(JsonValue::as_i64)
        .unwrap();

    let mut var_args = JsonValue::object();
    var_args.insert("variablesReference", JsonValue::Number(variables_ref as f64));
    let seq = client.send("variables", var_args);
    let variables_response = client.response_to(seq, &mut events);
    let variables = variables_response
        .get("body")
        .and_then(|b| b.get("variables"))
        .and_then(JsonValue::as_array)
        .unwrap();
    assert!(variables.iter().any(|v| v.get("name").and_then(JsonValue::as_str) == Some("total")));

    let seq = client.send("continue", JsonValue::object());
    let response = client.response_to(seq, &mut events);
    assert_eq!(response.get("success"), Some(&JsonValue::Bool(true)));

    let exited = client.event_named("exited", &mut events);
    assert_eq!(
        exited.get("body").and_then(|b| b.get("exitCode")),
        Some(&JsonValue::Number(0.0))
    );
}

#[test]
fn unrecognized_command_is_fatal_and_exits_nonzero() {
    let mut client = TestClient::spawn();
    let mut events = Vec::new();
    client.send("initialize", JsonValue::object());
    client.event_named("initialized", &mut events);

    client.send("notACommand", JsonValue::object());

    let output = client.event_named("output", &mut events);
    assert_eq!(
        output.get("body").and_then(|b| b.get("category")),
        Some(&JsonValue::from("console"))
    );

    let status = client
        .child
        .wait()
        .expect("yadap should exit after a protocol error");
    assert!(!status.success());
}

#[test]
fn load_failure_still_reports_exited() {
    let mut client = TestClient::spawn();
    let mut events = Vec::new();
    client.send("initialize", JsonValue::object());
    client.event_named("initialized", &mut events);

    let mut launch_args = JsonValue::object();
    launch_args.insert("program", JsonValue::from("/no/such/file.lua"));
    let seq = client.send("launch", launch_args);
    client.response_to(seq, &mut events);

    let exited = client.event_named("exited", &mut events);
    assert_eq!(
        exited.get("body").and_then(|b| b.get("exitCode")),
        Some(&JsonValue::Number(1.0))
    );
}

#[test]
fn next_steps_one_line_then_stops_with_reason_step() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_fixture(
        &dir,
        "local total = 0\nfor i = 1, 3 do\n  total = total + i\nend\nprint(total)\n",
    );
    let script_path = script.to_string_lossy().into_owned();

    let mut client = TestClient::spawn();
    let mut events = Vec::new();
    client.send("initialize", JsonValue::object());
    client.event_named("initialized", &mut events);

    let mut source = JsonValue::object();
    source.insert("path", JsonValue::from(script_path.clone()));
    let mut bp_line = JsonValue::object();
    bp_line.insert("line", JsonValue::Number(3.0));
    let mut bp_args = JsonValue::object();
    bp_args.insert("source", source);
    bp_args.insert("breakpoints", JsonValue::Array(vec![bp_line]));
    let seq = client.send("setBreakpoints", bp_args);
    client.response_to(seq, &mut events);

    let seq = client.send("configurationDone", JsonValue::object());
    client.response_to(seq, &mut events);

    let mut launch_args = JsonValue::object();
    launch_args.insert("program", JsonValue::from(script_path));
    let seq = client.send("launch", launch_args);
    client.response_to(seq, &mut events);

    let stopped = client.event_named("stopped", &mut events);
    assert_eq!(
        stopped.get("body").and_then(|b| b.get("reason")),
        Some(&JsonValue::from("breakpoint"))
    );

    let seq = client.send("next", JsonValue::object());
    let response = client.response_to(seq, &mut events);
    assert_eq!(response.get("success"), Some(&JsonValue::Bool(true)));

    let output = client.event_named("output", &mut events);
    assert_eq!(
        output.get("body").and_then(|b| b.get("category")),
        Some(&JsonValue::from("console"))
    );

    let stopped = client.event_named("stopped", &mut events);
    assert_eq!(
        stopped.get("body").and_then(|b| b.get("reason")),
        Some(&JsonValue::from("step"))
    );

    let seq = client.send("continue", JsonValue::object());
    let response = client.response_to(seq, &mut events);
    assert_eq!(response.get("success"), Some(&JsonValue::Bool(true)));

    let exited = client.event_named("exited", &mut events);
    assert_eq!(
        exited.get("body").and_then(|b| b.get("exitCode")),
        Some(&JsonValue::Number(0.0))
    );
}
