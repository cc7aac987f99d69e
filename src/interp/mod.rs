//! The `Interpreter` trait is the seam between the adapter's core
//! (breakpoint registry, snapshot builder, line-hook driver, session state
//! machine) and the embedded scripting engine: the core only ever talks to
//! the engine through this trait. The engine's own semantics are out of
//! scope here - `lua` below is the one concrete, peripheral binding.

pub mod lua;

use crate::error::AdapterError;
use std::path::Path;

/// A chunk marker source path that never corresponds to a real file on
/// disk. Any loaded code tagged with this name is adapter-internal and
/// must never be surfaced as a debuggee frame - the debugger must not
/// pause on its own source. The current `lua` binding never actually
/// loads Lua source under this name - `print` is rebound natively rather
/// than via an injected prelude chunk - so this exists purely as the
/// documented escape hatch a future binding (or one that *does* need a
/// Lua-side prelude) would rely on.
pub const ADAPTER_CHUNK_MARKER: &str = "=[yadap]";

/// One executing call-stack level's identifying information, as reported
/// by the interpreter's introspection primitives.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub name: Option<String>,
    /// `None` when the interpreter reports no `@`-prefixed source for
    /// this frame: such frames are skipped for source-path purposes but
    /// still counted for id assignment.
    pub source_path: Option<String>,
    pub line: u32,
}

/// One local variable slot, as reported by ascending-index enumeration.
#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
}

/// A script loaded as an invocable chunk: the file has been read and
/// compiled, but not yet run.
pub trait Chunk {
    /// Invokes the chunk with the given positional arguments. Any runtime
    /// failure is caught rather than allowed to unwind through the caller;
    /// the return value distinguishes "ran to completion" from "failed"
    /// without panicking the adapter.
    fn invoke(&self, args: &[String]) -> Result<i64, AdapterError>;
}

/// What the interpreter binding should do once a line notification has
/// been handled.
pub enum HookAction {
    Continue,
    /// Abort the running chunk immediately, surfacing `message` through
    /// the interpreter's own error-propagation path (`Chunk::invoke`'s
    /// `Err`) rather than unwinding past it. Used when the adapter's
    /// peer has gone away while the debuggee was paused.
    Abort(String),
}

/// Receives per-line notifications from the interpreter's hook.
/// Implemented by the line-hook driver; installed once, for the lifetime
/// of a single debuggee run.
pub trait LineHook {
    /// `stack_level` is the interpreter's own level indexing (1 = nearest
    /// caller) at the point of interruption.
    fn on_line(&mut self, interp: &dyn Interpreter, stack_level: u32, line: u32) -> HookAction;
}

/// The capability set the embedded interpreter must expose.
pub trait Interpreter {
    /// Reports name/source/line for the given stack level, or `None` past
    /// the bottom of the stack.
    fn frame(&self, level: u32) -> Option<FrameInfo>;

    /// Enumerates local variables at `level` by ascending index,
    /// terminating at the first `None` (a nil name in the source
    /// interpreter's own terms).
    fn locals(&self, level: u32) -> Vec<LocalVar>;

    /// Loads `path` as an invocable chunk, with an environment the caller
    /// can still mutate (e.g. to rebind `print`) before `Chunk::invoke`.
    fn load(&self, path: &Path) -> Result<Box<dyn Chunk>, AdapterError>;

    /// Rebinds the interpreter's global `print`-equivalent so that each
    /// call is surfaced as a DAP `output` event instead of going to the
    /// process's own stdout (which is reserved for the protocol stream).
    fn rebind_print(&self, sink: Box<dyn Fn(String) + Send>);

    /// The interpreter's own name for an unnamed compiler-internal
    /// temporary slot, filtered from the innermost frame's locals only.
    fn temporary_value_marker(&self) -> &'static str;
}
