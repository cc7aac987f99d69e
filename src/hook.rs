//! Line-hook driver (C5): the `LineHook` implementation installed into the
//! interpreter. Every line notification passes through here first; the
//! driver only decides *whether* to stop, and hands the actual pausing
//! (snapshot capture, `stopped` event, nested pump) off to whatever
//! implements `HookSink` - the session state machine (C6), kept separate
//! so this module can be tested without a live interpreter or transport.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interp::{HookAction, Interpreter, LineHook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Step,
    Breakpoint(u32),
}

impl StopReason {
    pub fn as_dap_str(&self) -> &'static str {
        match self {
            StopReason::Step => "step",
            StopReason::Breakpoint(_) => "breakpoint",
        }
    }
}

/// Implemented by whatever owns breakpoints and the pause/run stack
/// (session.rs). Split out of `LineHookDriver` so this module has no
/// dependency on the transport or the session's dispatch table.
pub trait HookSink {
    /// Called once per line, before any stopping decision is made. `None`
    /// means "keep running".
    fn should_stop(&self, source_path: Option<&str>, line: u32) -> Option<StopReason>;

    /// Called only when `should_stop` returned `Some`. Expected to capture
    /// a snapshot at `stack_level`, emit the `stopped` event, and run the
    /// nested pump until the debuggee is told to resume.
    fn on_stopped(
        &mut self,
        interp: &dyn Interpreter,
        stack_level: u32,
        reason: StopReason,
    ) -> HookAction;
}

pub struct LineHookDriver {
    sink: Rc<RefCell<dyn HookSink>>,
}

impl LineHookDriver {
    pub fn new(sink: Rc<RefCell<dyn HookSink>>) -> Self {
        LineHookDriver { sink }
    }
}

impl LineHook for LineHookDriver {
    fn on_line(&mut self, interp: &dyn Interpreter, stack_level: u32, line: u32) -> HookAction {
        let source_path = interp.frame(stack_level).and_then(|f| f.source_path);
        let reason = {
            let sink = self.sink.borrow();
            sink.should_stop(source_path.as_deref(), line)
        };
        match reason {
            Some(reason) => self.sink.borrow_mut().on_stopped(interp, stack_level, reason),
            None => HookAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{Chunk, FrameInfo, LocalVar};
    use std::path::Path;

    struct NullInterpreter;
    impl Interpreter for NullInterpreter {
        fn frame(&self, _level: u32) -> Option<FrameInfo> {
            Some(FrameInfo {
                name: None,
                source_path: Some("/t.lua".to_owned()),
                line: 5,
            })
        }
        fn locals(&self, _level: u32) -> Vec<LocalVar> {
            Vec::new()
        }
        fn load(&self, _path: &Path) -> Result<Box<dyn Chunk>, crate::error::AdapterError> {
            unimplemented!()
        }
        fn rebind_print(&self, _sink: Box<dyn Fn(String) + Send>) {}
        fn temporary_value_marker(&self) -> &'static str {
            "(*temp*)"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        stops: Vec<(u32, StopReason)>,
        armed: bool,
    }

    impl HookSink for RecordingSink {
        fn should_stop(&self, _source_path: Option<&str>, line: u32) -> Option<StopReason> {
            if self.armed {
                Some(StopReason::Step)
            } else if line == 7 {
                Some(StopReason::Breakpoint(1))
            } else {
                None
            }
        }

        fn on_stopped(
            &mut self,
            _interp: &dyn Interpreter,
            stack_level: u32,
            reason: StopReason,
        ) -> HookAction {
            self.stops.push((stack_level, reason));
            HookAction::Continue
        }
    }

    #[test]
    fn continues_when_sink_declines() {
        let sink = Rc::new(RefCell::new(RecordingSink::default()));
        let mut driver = LineHookDriver::new(sink.clone());
        driver.on_line(&NullInterpreter, 1, 3);
        assert!(sink.borrow().stops.is_empty());
    }

    #[test]
    fn stops_on_breakpoint_line() {
        let sink = Rc::new(RefCell::new(RecordingSink::default()));
        let mut driver = LineHookDriver::new(sink.clone());
        driver.on_line(&NullInterpreter, 1, 7);
        assert_eq!(sink.borrow().stops, vec![(1, StopReason::Breakpoint(1))]);
    }

    #[test]
    fn stops_every_line_while_step_armed() {
        let sink = Rc::new(RefCell::new(RecordingSink {
            armed: true,
            ..Default::default()
        }));
        let mut driver = LineHookDriver::new(sink.clone());
        driver.on_line(&NullInterpreter, 1, 1);
        driver.on_line(&NullInterpreter, 1, 2);
        assert_eq!(sink.borrow().stops.len(), 2);
    }
}
