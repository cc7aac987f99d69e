//! Session state machine: owns the framed transport, the breakpoint
//! registry, the embedded interpreter, and the run/pause stack. Drives a
//! cooperative, reentrant pump rather than an `mpsc`-channeled background
//! thread talking to a separate OS process, since here the debuggee runs
//! in-process inside the same interpreter call.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;

use log::{debug, error, warn};

use crate::breakpoints::BreakpointRegistry;
use crate::config::Config;
use crate::error::AdapterError;
use crate::hook::{HookSink, LineHookDriver, StopReason};
use crate::interp::lua::LuaInterpreter;
use crate::interp::{HookAction, Interpreter};
use crate::json::JsonValue;
use crate::logger::WireTracer;
use crate::protocol::{Event, Request, Response};
use crate::snapshot::StackSnapshot;
use crate::transport::FramedTransport;

const MAIN_THREAD_ID: i64 = 1;

enum ResumeKind {
    Continue,
    Next,
}

/// A fatal error (protocol error or peer disconnect) observed from
/// *inside* a nested pump, while the debuggee was paused mid-call-stack.
/// `HookAction::Abort` only gets a message string back to the interpreter,
/// so the original error is recorded here and re-raised once control
/// returns to `run_debuggee`/`run`, outside the hook callback.
#[derive(Debug, Clone)]
enum FatalOutcome {
    PeerClosed,
    Protocol(String),
}

/// What the top-level pump should do after a dispatched request.
enum DispatchEffect {
    None,
    Resume,
    Launch { path: PathBuf, args: Vec<String> },
}

pub struct Session<R, W> {
    transport: FramedTransport<R, W>,
    next_seq: i64,
    breakpoints: BreakpointRegistry,
    interp: LuaInterpreter,
    snapshot: Option<StackSnapshot>,
    step_pending: bool,
    pause_depth: u32,
    resume_kind: Option<ResumeKind>,
    output_rx: mpsc::Receiver<String>,
    wire_tracer: Option<WireTracer>,
    fatal: Option<FatalOutcome>,
}

impl<R: std::io::BufRead, W: std::io::Write> Session<R, W> {
    pub fn new(reader: R, writer: W, config: &Config) -> anyhow::Result<Self> {
        let interp = LuaInterpreter::new();
        let (tx, output_rx) = mpsc::channel();
        interp.rebind_print(Box::new(move |line| {
            let _ = tx.send(line);
        }));

        let wire_tracer = match (&config.log_file, config.trace_wire) {
            (Some(path), true) => Some(WireTracer::open(path)?),
            _ => None,
        };

        Ok(Session {
            transport: FramedTransport::new(reader, writer),
            next_seq: 1,
            breakpoints: BreakpointRegistry::new(),
            interp,
            snapshot: None,
            step_pending: false,
            pause_depth: 0,
            resume_kind: None,
            output_rx,
            wire_tracer,
            fatal: None,
        })
    }

    fn next_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn send_response(&mut self, response: Response) -> Result<(), AdapterError> {
        let seq = self.next_seq();
        let json = response.into_json(seq);
        self.trace_outbound(&json);
        self.transport.write_message(&json)
    }

    fn send_event(&mut self, event: impl Into<String>, body: Option<JsonValue>) -> Result<(), AdapterError> {
        let seq = self.next_seq();
        let json = Event::new(event, body).into_json(seq);
        self.trace_outbound(&json);
        self.transport.write_message(&json)
    }

    fn trace_outbound(&self, json: &JsonValue) {
        if let Some(tracer) = &self.wire_tracer {
            tracer.outbound(&crate::json::encode(json));
        }
    }

    fn trace_inbound(&self, json: &JsonValue) {
        if let Some(tracer) = &self.wire_tracer {
            tracer.inbound(&crate::json::encode(json));
        }
    }

    /// Forwards any debuggee `print` output queued since the last drain,
    /// as DAP `output` events, preserving call order.
    fn drain_output(&mut self) -> Result<(), AdapterError> {
        while let Ok(line) = self.output_rx.try_recv() {
            let mut body = JsonValue::object();
            body.insert("category", JsonValue::from("stdout"));
            body.insert("output", JsonValue::from(format!("{line}\n")));
            self.send_event("output", Some(body))?;
        }
        Ok(())
    }

    /// Emits `exited`, regardless of whether the debuggee failed: skipping
    /// it on a load/runtime failure would leave clients showing a
    /// debuggee that looks still running. `exited` is always the last
    /// event the adapter emits.
    fn emit_exit(&mut self, exit_code: i64) -> Result<(), AdapterError> {
        let mut body = JsonValue::object();
        body.insert("exitCode", JsonValue::Number(exit_code as f64));
        self.send_event("exited", Some(body))
    }

    fn dispatch(&mut self, req: &Request) -> Result<DispatchEffect, AdapterError> {
        debug!("{}: {:?}", req.seq, req.command);
        match req.command.as_str() {
            "initialize" => {
                let mut caps = JsonValue::object();
                caps.insert("supportsConfigurationDoneRequest", JsonValue::Bool(true));
                self.send_response(Response::success(req.seq, "initialize", Some(caps)))?;
                self.send_event("initialized", None)?;
                Ok(DispatchEffect::None)
            }
            "setBreakpoints" => {
                let source_path = req
                    .arguments
                    .get("source")
                    .and_then(|s| s.get("path"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or("")
                    .to_owned();
                let lines: Vec<u32> = req
                    .arguments
                    .get("breakpoints")
                    .and_then(JsonValue::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|bp| bp.get("line").and_then(JsonValue::as_i64))
                            .map(|n| n as u32)
                            .collect()
                    })
                    .unwrap_or_default();

                let results = self.breakpoints.set_for_source(&source_path, &lines);
                let breakpoints_json: Vec<JsonValue> = results
                    .into_iter()
                    .map(|bp| {
                        let mut obj = JsonValue::object();
                        obj.insert("id", JsonValue::Number(bp.id as f64));
                        obj.insert("verified", JsonValue::Bool(bp.verified));
                        obj.insert("line", JsonValue::Number(bp.line as f64));
                        obj
                    })
                    .collect();
                let mut body = JsonValue::object();
                body.insert("breakpoints", JsonValue::Array(breakpoints_json));
                self.send_response(Response::success(req.seq, "setBreakpoints", Some(body)))?;
                Ok(DispatchEffect::None)
            }
            "configurationDone" => {
                self.send_response(Response::success(req.seq, "configurationDone", None))?;
                Ok(DispatchEffect::None)
            }
            "threads" => {
                let mut thread = JsonValue::object();
                thread.insert("id", JsonValue::Number(MAIN_THREAD_ID as f64));
                thread.insert("name", JsonValue::from("main"));
                let mut body = JsonValue::object();
                body.insert("threads", JsonValue::Array(vec![thread]));
                self.send_response(Response::success(req.seq, "threads", Some(body)))?;
                Ok(DispatchEffect::None)
            }
            "stackTrace" => {
                let frames: Vec<JsonValue> = self
                    .snapshot
                    .as_ref()
                    .map(|s| {
                        s.frames
                            .iter()
                            .map(|f| {
                                let mut obj = JsonValue::object();
                                obj.insert("id", JsonValue::Number(f.id as f64));
                                obj.insert("name", JsonValue::from(f.name.clone()));
                                obj.insert("line", JsonValue::Number(f.line as f64));
                                obj.insert("column", JsonValue::Number(f.column as f64));
                                if let Some(path) = &f.source_path {
                                    let mut source = JsonValue::object();
                                    source.insert("path", JsonValue::from(path.clone()));
                                    obj.insert("source", source);
                                }
                                obj
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let mut body = JsonValue::object();
                body.insert("totalFrames", JsonValue::Number(frames.len() as f64));
                body.insert("stackFrames", JsonValue::Array(frames));
                self.send_response(Response::success(req.seq, "stackTrace", Some(body)))?;
                Ok(DispatchEffect::None)
            }
            "scopes" => {
                let frame_id = req
                    .arguments
                    .get("frameId")
                    .and_then(JsonValue::as_i64)
                    .unwrap_or(0) as u32;
                let scopes: Vec<JsonValue> = self
                    .snapshot
                    .as_ref()
                    .map(|s| {
                        s.scopes_for(frame_id)
                            .iter()
                            .map(|scope| {
                                let mut obj = JsonValue::object();
                                obj.insert("name", JsonValue::from(scope.name));
                                obj.insert("presentationHint", JsonValue::from(scope.presentation_hint));
                                obj.insert("variablesReference", JsonValue::Number(scope.variables_ref as f64));
                                obj.insert("expensive", JsonValue::Bool(scope.expensive));
                                obj
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let mut body = JsonValue::object();
                body.insert("scopes", JsonValue::Array(scopes));
                self.send_response(Response::success(req.seq, "scopes", Some(body)))?;
                Ok(DispatchEffect::None)
            }
            "variables" => {
                let variables_ref = req
                    .arguments
                    .get("variablesReference")
                    .and_then(JsonValue::as_i64)
                    .unwrap_or(0) as u32;
                let variables: Vec<JsonValue> = self
                    .snapshot
                    .as_ref()
                    .map(|s| {
                        s.variables_for(variables_ref)
                            .iter()
                            .map(|v| {
                                let mut obj = JsonValue::object();
                                obj.insert("name", JsonValue::from(v.name.clone()));
                                obj.insert("value", JsonValue::from(v.value.clone()));
                                if let Some(type_name) = &v.type_name {
                                    obj.insert("type", JsonValue::from(type_name.clone()));
                                }
                                obj.insert("variablesReference", JsonValue::Number(0.0));
                                obj
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let mut body = JsonValue::object();
                body.insert("variables", JsonValue::Array(variables));
                self.send_response(Response::success(req.seq, "variables", Some(body)))?;
                Ok(DispatchEffect::None)
            }
            "continue" => {
                if self.pause_depth == 0 {
                    // Recognized command, nothing to resume: still answer
                    // success, per the current release's invariant that
                    // success=false is reserved for future conditional
                    // failures.
                    self.send_response(Response::success(req.seq, "continue", None))?;
                    return Ok(DispatchEffect::None);
                }
                self.resume_kind = Some(ResumeKind::Continue);
                let mut body = JsonValue::object();
                body.insert("allThreadsContinued", JsonValue::Bool(true));
                self.send_response(Response::success(req.seq, "continue", Some(body)))?;
                Ok(DispatchEffect::Resume)
            }
            "next" => {
                if self.pause_depth == 0 {
                    self.send_response(Response::success(req.seq, "next", None))?;
                    return Ok(DispatchEffect::None);
                }
                self.resume_kind = Some(ResumeKind::Next);
                self.send_response(Response::success(req.seq, "next", None))?;
                Ok(DispatchEffect::Resume)
            }
            "launch" => {
                let path = req
                    .arguments
                    .get("program")
                    .and_then(JsonValue::as_str)
                    .map(PathBuf::from)
                    .unwrap_or_default();
                let args: Vec<String> = req
                    .arguments
                    .get("args")
                    .and_then(JsonValue::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(JsonValue::as_str)
                            .map(ToOwned::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                self.send_response(Response::success(req.seq, "launch", None))?;
                Ok(DispatchEffect::Launch { path, args })
            }
            other => {
                error!("unsupported command: {other}");
                let mut body = JsonValue::object();
                body.insert("category", JsonValue::from("console"));
                body.insert(
                    "output",
                    JsonValue::from(format!("protocol error: unsupported command '{other}'\n")),
                );
                let _ = self.send_event("output", Some(body));
                Err(AdapterError::Protocol(format!("unsupported command: {other}")))
            }
        }
    }

    /// The nested pump, entered every time the debuggee is paused. Reads
    /// and dispatches requests exactly like the top-level loop, except it
    /// returns as soon as a `continue`/`next` resumes execution (or the
    /// peer disconnects, which is fatal mid-pause: there is no client left
    /// to drive the rest of the session).
    fn pump_while_paused(&mut self) -> Result<(), AdapterError> {
        self.pause_depth += 1;
        let result = self.pump_loop();
        self.pause_depth -= 1;
        result
    }

    fn pump_loop(&mut self) -> Result<(), AdapterError> {
        loop {
            let message = self.transport.read_message()?.ok_or(AdapterError::PeerClosed)?;
            self.trace_inbound(&message);
            let request = Request::from_json(&message)?;
            match self.dispatch(&request)? {
                DispatchEffect::Resume => return Ok(()),
                DispatchEffect::Launch { .. } => {
                    // A second `launch` while paused is a protocol misuse;
                    // already answered inside dispatch, nothing more to do.
                }
                DispatchEffect::None => {}
            }
        }
    }
}

impl<R: std::io::BufRead, W: std::io::Write> HookSink for Session<R, W> {
    fn should_stop(&self, source_path: Option<&str>, line: u32) -> Option<StopReason> {
        if self.step_pending {
            return Some(StopReason::Step);
        }
        let source = source_path?;
        self.breakpoints.matches(source, line).map(|bp| StopReason::Breakpoint(bp.id))
    }

    fn on_stopped(
        &mut self,
        interp: &dyn Interpreter,
        stack_level: u32,
        reason: StopReason,
    ) -> HookAction {
        self.step_pending = false;

        if reason == StopReason::Step {
            let mut body = JsonValue::object();
            body.insert("category", JsonValue::from("console"));
            body.insert("output", JsonValue::from("stepping\n".to_owned()));
            if let Err(e) = self.send_event("output", Some(body)) {
                return HookAction::Abort(e.to_string());
            }
        }

        self.snapshot = Some(StackSnapshot::capture(interp, stack_level));

        if let Err(e) = self.drain_output() {
            return HookAction::Abort(e.to_string());
        }

        let mut body = JsonValue::object();
        body.insert("reason", JsonValue::from(reason.as_dap_str()));
        body.insert("threadId", JsonValue::Number(MAIN_THREAD_ID as f64));
        body.insert("allThreadsStopped", JsonValue::Bool(true));
        if let StopReason::Breakpoint(id) = reason {
            let mut ids = Vec::new();
            ids.push(JsonValue::Number(id as f64));
            body.insert("hitBreakpointIds", JsonValue::Array(ids));
        }
        if let Err(e) = self.send_event("stopped", Some(body)) {
            return HookAction::Abort(e.to_string());
        }

        let outcome = self.pump_while_paused();
        self.snapshot = None;

        match outcome {
            Ok(()) => match self.resume_kind.take() {
                Some(ResumeKind::Next) => {
                    self.step_pending = true;
                    HookAction::Continue
                }
                Some(ResumeKind::Continue) | None => HookAction::Continue,
            },
            Err(e) => {
                debug!("pump ended with error while paused: {e}");
                self.fatal = Some(match &e {
                    AdapterError::PeerClosed => FatalOutcome::PeerClosed,
                    other => FatalOutcome::Protocol(other.to_string()),
                });
                HookAction::Abort(e.to_string())
            }
        }
    }
}

/// Runs the adapter to completion: reads and dispatches requests until the
/// peer disconnects or an unrecognized command is received, launching the
/// debuggee in between when asked to. Takes ownership of the session and
/// shares it, via `Rc<RefCell<_>>`, with the interpreter's line hook - the
/// only other thing that ever touches session state, and only while
/// re-entrantly called from within `chunk.invoke()` below, never from a
/// genuinely concurrent context.
pub fn run<R, W>(session: Session<R, W>) -> Result<(), AdapterError>
where
    R: std::io::BufRead + 'static,
    W: std::io::Write + 'static,
{
    let interp = session.interp.clone();
    let session = Rc::new(RefCell::new(session));
    let driver = LineHookDriver::new(session.clone());
    interp.install_hook(Rc::new(RefCell::new(driver)));

    loop {
        let message = {
            let mut s = session.borrow_mut();
            match s.transport.read_message() {
                Ok(Some(m)) => m,
                Ok(None) => break,
                Err(AdapterError::PeerClosed) => break,
                Err(e) => return Err(e),
            }
        };
        session.borrow().trace_inbound(&message);
        let request = Request::from_json(&message)?;

        let effect = session.borrow_mut().dispatch(&request)?;
        match effect {
            DispatchEffect::None | DispatchEffect::Resume => {}
            DispatchEffect::Launch { path, args } => {
                match run_debuggee(&session, &interp, path, args) {
                    Ok(()) => {}
                    Err(AdapterError::PeerClosed) => break,
                    Err(e) => {
                        interp.remove_hook();
                        return Err(e);
                    }
                }
            }
        }
    }

    interp.remove_hook();
    Ok(())
}

/// Loads and invokes the debuggee chunk. Crucially, no borrow of `session`
/// is held across `chunk.invoke()`: the hook re-enters through `session`
/// on this same call stack while the debuggee is running, so holding a
/// borrow here would deadlock the `RefCell` the first time a breakpoint or
/// step stop fired.
fn run_debuggee<R, W>(
    session: &Rc<RefCell<Session<R, W>>>,
    interp: &LuaInterpreter,
    path: PathBuf,
    args: Vec<String>,
) -> Result<(), AdapterError>
where
    R: std::io::BufRead,
    W: std::io::Write,
{
    let chunk = match interp.load(&path) {
        Ok(c) => c,
        Err(e) => {
            let mut s = session.borrow_mut();
            s.drain_output()?;
            warn!("debuggee failed to load: {e}");
            let mut body = JsonValue::object();
            body.insert("category", JsonValue::from("console"));
            body.insert("output", JsonValue::from(format!("{e}\n")));
            s.send_event("output", Some(body))?;
            s.emit_exit(1)?;
            return Ok(());
        }
    };

    let result = chunk.invoke(&args);

    let mut s = session.borrow_mut();
    if let Some(fatal) = s.fatal.take() {
        // The chunk's own result is just "the abort unwound the Lua call" -
        // the real outcome is whatever fatal condition the nested pump hit
        // (peer disconnect or a protocol error), which takes priority over
        // reporting this as an ordinary debuggee failure.
        return Err(match fatal {
            FatalOutcome::PeerClosed => AdapterError::PeerClosed,
            FatalOutcome::Protocol(msg) => AdapterError::Protocol(msg),
        });
    }
    s.drain_output()?;
    match result {
        Ok(exit_code) => s.emit_exit(exit_code)?,
        Err(e) => {
            warn!("debuggee runtime error: {e}");
            let mut body = JsonValue::object();
            body.insert("category", JsonValue::from("console"));
            body.insert("output", JsonValue::from(format!("{e}\n")));
            s.send_event("output", Some(body))?;
            s.emit_exit(1)?;
        }
    }
    Ok(())
}
