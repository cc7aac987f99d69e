//! A concrete, peripheral binding of the `Interpreter` trait onto a real
//! embedded Lua runtime via `mlua`. The engine's own semantics aren't
//! specified here - this module only adapts Lua's `debug` library (itself
//! an ordinary table of Lua functions, reachable from Rust the same way
//! any other global is) onto the `Interpreter` capability set.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::{Function, HookTriggers, Lua, MultiValue, Table, Value, VmState};

use super::{Chunk, FrameInfo, HookAction, Interpreter, LineHook, LocalVar};
use crate::error::AdapterError;

/// Lua's own name for an unnamed compiler temporary, as reported by
/// `debug.getlocal`. Filtered out of the innermost frame's locals by the
/// snapshot builder, never the outer frames.
pub const TEMPORARY_MARKER: &str = "(*temporary)";

#[derive(Clone)]
pub struct LuaInterpreter {
    lua: Lua,
}

impl LuaInterpreter {
    pub fn new() -> Self {
        LuaInterpreter { lua: Lua::new() }
    }

    fn debug_table(&self) -> Option<Table> {
        self.lua.globals().get::<_, Table>("debug").ok()
    }

    /// Installs `hook` as the interpreter's per-line callback. Must be
    /// called once, before the debuggee chunk is invoked.
    pub fn install_hook(&self, hook: Rc<RefCell<dyn LineHook>>) {
        let interp = self.clone();
        self.lua.set_hook(
            HookTriggers::new().on_every_line(true),
            move |_lua, debug| {
                let line = debug.curr_line();
                if line < 0 {
                    return Ok(VmState::Continue);
                }
                match hook.borrow_mut().on_line(&interp, 1, line as u32) {
                    HookAction::Continue => Ok(VmState::Continue),
                    HookAction::Abort(message) => Err(mlua::Error::RuntimeError(message)),
                }
            },
        );
    }

    pub fn remove_hook(&self) {
        self.lua.remove_hook();
    }
}

impl Default for LuaInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter for LuaInterpreter {
    fn frame(&self, level: u32) -> Option<FrameInfo> {
        let debug_tbl = self.debug_table()?;
        let getinfo: Function = debug_tbl.get("getinfo").ok()?;
        let info: Table = getinfo.call((level, "nSl")).ok()?;

        let source: Option<String> = info.get("source").ok();
        let line: Option<i64> = info.get("currentline").ok();
        let name: Option<String> = info.get("name").ok();

        // `@` prefixes a real loaded file; anything else (a C function, a
        // string chunk, or our own `ADAPTER_CHUNK_MARKER`) has no usable
        // source path but still counts as a frame.
        let source_path = source.and_then(|s| {
            if s == super::ADAPTER_CHUNK_MARKER {
                None
            } else {
                s.strip_prefix('@').map(ToOwned::to_owned)
            }
        });

        Some(FrameInfo {
            name: name.filter(|n| !n.is_empty()),
            source_path,
            line: line.unwrap_or(0).max(0) as u32,
        })
    }

    fn locals(&self, level: u32) -> Vec<LocalVar> {
        let mut out = Vec::new();
        let Some(debug_tbl) = self.debug_table() else {
            return out;
        };
        let Ok(getlocal) = debug_tbl.get::<_, Function>("getlocal") else {
            return out;
        };

        let mut index = 1u32;
        loop {
            let result: mlua::Result<MultiValue> = getlocal.call((level, index));
            let Ok(values) = result else { break };
            let mut iter = values.into_iter();
            let Some(name_value) = iter.next() else { break };
            let Value::String(name) = name_value else {
                break;
            };
            let name = name.to_string_lossy().into_owned();
            let value = iter.next().unwrap_or(Value::Nil);
            out.push(LocalVar {
                type_name: Some(lua_type_name(&value).to_owned()),
                value: render_value(&value),
                name,
            });
            index += 1;
        }
        out
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Chunk>, AdapterError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::DebuggeeLoad(format!("{}: {e}", path.display())))?;

        let chunk_name = format!("@{}", path.display());
        let func = self
            .lua
            .load(&source)
            .set_name(chunk_name)
            .into_function()
            .map_err(|e| AdapterError::DebuggeeLoad(e.to_string()))?;

        Ok(Box::new(LuaChunk {
            lua: self.lua.clone(),
            func,
        }))
    }

    fn rebind_print(&self, sink: Box<dyn Fn(String) + Send>) {
        let func = self
            .lua
            .create_function(move |_, args: MultiValue| {
                let rendered = args
                    .iter()
                    .map(render_value)
                    .collect::<Vec<_>>()
                    .join("\t");
                sink(rendered);
                Ok(())
            })
            .expect("rebinding print never fails for a host-created function");
        let _ = self.lua.globals().set("print", func);
    }

    fn temporary_value_marker(&self) -> &'static str {
        TEMPORARY_MARKER
    }
}

struct LuaChunk {
    lua: Lua,
    func: Function,
}

impl Chunk for LuaChunk {
    fn invoke(&self, args: &[String]) -> Result<i64, AdapterError> {
        let mut values = MultiValue::new();
        for arg in args {
            let s = self
                .lua
                .create_string(arg)
                .map_err(|e| AdapterError::DebuggeeRuntime(e.to_string()))?;
            values.push_back(Value::String(s));
        }

        match self.func.call::<_, Value>(values) {
            Ok(Value::Integer(n)) => Ok(n),
            Ok(Value::Number(n)) => Ok(n as i64),
            Ok(_) => Ok(0),
            Err(e) => Err(AdapterError::DebuggeeRuntime(e.to_string())),
        }
    }
}

fn lua_type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::LightUserData(_) => "userdata",
        Value::Integer(_) | Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Table(_) => "table",
        Value::Function(_) => "function",
        Value::Thread(_) => "thread",
        Value::UserData(_) => "userdata",
        Value::Error(_) => "error",
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().into_owned(),
        Value::Table(_) => "table".to_owned(),
        Value::Function(_) => "function".to_owned(),
        Value::Thread(_) => "thread".to_owned(),
        Value::UserData(_) | Value::LightUserData(_) => "userdata".to_owned(),
        Value::Error(e) => e.to_string(),
    }
}
