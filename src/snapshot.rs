//! Stack snapshot builder.
//!
//! Rebuilt on every pause and discarded on resume: a `StackSnapshot` only
//! makes sense while the debuggee is actually suspended inside the
//! interpreter's line hook.

use indexmap::IndexMap;

use crate::interp::{Interpreter, ADAPTER_CHUNK_MARKER};

#[derive(Debug, Clone)]
pub struct FrameView {
    /// Equal to the interpreter stack level at capture.
    pub id: u32,
    pub name: String,
    pub source_path: Option<String>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub struct ScopeView {
    pub name: &'static str,
    pub presentation_hint: &'static str,
    /// 1-based index into `StackSnapshot::variables`.
    pub variables_ref: u32,
    pub expensive: bool,
}

#[derive(Debug, Clone)]
pub struct VariableView {
    pub name: String,
    pub value: String,
    /// Only populated for the innermost frame.
    pub type_name: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct StackSnapshot {
    pub frames: Vec<FrameView>,
    pub scopes: IndexMap<u32, Vec<ScopeView>>,
    /// Index 0 is an unused sentinel - `variables_ref = 0` means "leaf, no
    /// children" and must never resolve to a real entry.
    pub variables: Vec<Vec<VariableView>>,
}

impl StackSnapshot {
    /// Walks outward from `start_level` (the level at which the hook
    /// fired) until the interpreter reports no further frame, or a frame
    /// tagged as adapter-internal is reached.
    pub fn capture(interp: &dyn Interpreter, start_level: u32) -> StackSnapshot {
        let mut snapshot = StackSnapshot {
            frames: Vec::new(),
            scopes: IndexMap::new(),
            variables: vec![Vec::new()], // index 0 sentinel
        };

        let mut level = start_level;
        loop {
            let Some(frame) = interp.frame(level) else {
                break;
            };
            if frame.source_path.as_deref() == Some(ADAPTER_CHUNK_MARKER) {
                break;
            }

            snapshot.frames.push(FrameView {
                id: level,
                name: frame.name.unwrap_or_else(|| "?".to_owned()),
                source_path: frame.source_path,
                line: frame.line,
                column: 1,
            });

            let locals = interp.locals(level);
            let is_innermost = level == start_level;
            let marker = interp.temporary_value_marker();

            let vars: Vec<VariableView> = locals
                .into_iter()
                .filter(|v| !(is_innermost && v.name == marker))
                .map(|v| VariableView {
                    name: v.name,
                    value: v.value,
                    type_name: if is_innermost { v.type_name } else { None },
                })
                .collect();

            let variables_ref = snapshot.variables.len() as u32;
            snapshot.variables.push(vars);

            snapshot.scopes.insert(
                level,
                vec![ScopeView {
                    name: "Locals",
                    presentation_hint: "locals",
                    variables_ref,
                    expensive: false,
                }],
            );

            level += 1;
        }

        snapshot
    }

    pub fn scopes_for(&self, frame_id: u32) -> &[ScopeView] {
        self.scopes
            .get(&frame_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn variables_for(&self, variables_ref: u32) -> &[VariableView] {
        self.variables
            .get(variables_ref as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
